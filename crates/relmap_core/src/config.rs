//! Database configuration.

use crate::error::{CoreError, CoreResult};

/// Configuration for a database facade.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entities handed to a mapper in one call, and the
    /// maximum number of key tuples in one existence lookup.
    pub batch_size: usize,

    /// Maximum number of offending keys rendered in an error message.
    pub error_sample_size: usize,

    /// Upper bound on intermediate rows a join may materialise.
    pub max_join_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            error_sample_size: 5,
            max_join_rows: 100_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the number of keys shown in error messages.
    #[must_use]
    pub const fn error_sample_size(mut self, size: usize) -> Self {
        self.error_sample_size = size;
        self
    }

    /// Sets the join row limit.
    #[must_use]
    pub const fn max_join_rows(mut self, rows: usize) -> Self {
        self.max_join_rows = rows;
        self
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_size == 0 {
            return Err(CoreError::invalid_operation("batch_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.error_sample_size, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .batch_size(2)
            .error_sample_size(3)
            .max_join_rows(10);

        assert_eq!(config.batch_size, 2);
        assert_eq!(config.error_sample_size, 3);
        assert_eq!(config.max_join_rows, 10);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = Config::new().batch_size(0);
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}
