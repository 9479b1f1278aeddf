use serde::Deserialize;

use crate::error::ConfigError;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// Construction-time allocator settings.
///
/// ```rust
/// use segalloc::AllocatorConfig;
///
/// let config = AllocatorConfig::from_toml_str("block_size = 16").unwrap();
/// assert_eq!(config.block_size(), 16);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
  block_size: usize,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      block_size: DEFAULT_BLOCK_SIZE,
    }
  }
}

impl AllocatorConfig {
  /// Creates a config with the given block size, which must be a power of two.
  pub fn new(block_size: usize) -> Result<Self, ConfigError> {
    Self { block_size }.validate()
  }

  pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(source)?;
    config.validate()
  }

  pub fn block_size(&self) -> usize {
    self.block_size
  }

  fn validate(self) -> Result<Self, ConfigError> {
    if !self.block_size.is_power_of_two() {
      return Err(ConfigError::InvalidBlockSize(self.block_size));
    }
    Ok(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_block_size() {
    assert_eq!(AllocatorConfig::default().block_size(), 8);
  }

  #[test]
  fn test_new_rejects_non_power_of_two() {
    assert!(AllocatorConfig::new(1).is_ok());
    assert!(AllocatorConfig::new(64).is_ok());
    assert!(matches!(AllocatorConfig::new(0), Err(ConfigError::InvalidBlockSize(0))));
    assert!(matches!(AllocatorConfig::new(12), Err(ConfigError::InvalidBlockSize(12))));
  }

  #[test]
  fn test_from_toml() {
    assert_eq!(AllocatorConfig::from_toml_str("block_size = 32").unwrap().block_size(), 32);
    assert_eq!(AllocatorConfig::from_toml_str("").unwrap(), AllocatorConfig::default());
    assert!(matches!(
      AllocatorConfig::from_toml_str("block_size = 3"),
      Err(ConfigError::InvalidBlockSize(3))
    ));
    assert!(matches!(
      AllocatorConfig::from_toml_str("blocks = 8"),
      Err(ConfigError::Parse(_))
    ));
  }
}
