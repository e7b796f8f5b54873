//! Inline cache configuration
//!
//! Read from the `[ic]` table of a TOML file:
//!
//! ```toml
//! [ic]
//! max_polymorphism = 2
//! max_shapes = 65536
//! ```

use serde::Deserialize;
use thiserror::Error;

/// Upper bound on transition pairs a feedback cell can hold
pub const MAX_POLYMORPHISM: usize = 4;

/// Default shape budget per shape table
pub const DEFAULT_MAX_SHAPES: usize = 1 << 20;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Polymorphism limit outside `1..=MAX_POLYMORPHISM`
    #[error("max_polymorphism must be between 1 and 4, got {0}")]
    InvalidPolymorphism(usize),

    /// Shape budget of zero
    #[error("max_shapes must be greater than zero")]
    InvalidShapeLimit,
}

/// IC tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IcConfig {
    /// Transition pairs a site may record before going megamorphic (K).
    /// Default: 4
    pub max_polymorphism: usize,

    /// Shapes a shape table may keep alive before raising `OutOfMemory`.
    /// Default: 1048576
    pub max_shapes: usize,
}

impl Default for IcConfig {
    fn default() -> Self {
        Self {
            max_polymorphism: MAX_POLYMORPHISM,
            max_shapes: DEFAULT_MAX_SHAPES,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    ic: IcConfig,
}

impl IcConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polymorphism limit
    pub fn max_polymorphism(mut self, limit: usize) -> Self {
        self.max_polymorphism = limit;
        self
    }

    /// Set the shape budget
    pub fn max_shapes(mut self, limit: usize) -> Self {
        self.max_shapes = limit;
        self
    }

    /// Parse the `[ic]` table of a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.ic.validate()?;
        Ok(file.ic)
    }

    /// Check that the values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_polymorphism == 0 || self.max_polymorphism > MAX_POLYMORPHISM {
            return Err(ConfigError::InvalidPolymorphism(self.max_polymorphism));
        }
        if self.max_shapes == 0 {
            return Err(ConfigError::InvalidShapeLimit);
        }
        Ok(())
    }
}
