/// Configuration for the block pool and completion workers.
///
/// The write-path protocol constants ([`MAX_PENDING_WRITES`],
/// [`MAX_BYTES_PRE_COMPLETED`], [`BLOCK_CAPACITY`]) are compile-time and not
/// configurable here.
///
/// [`MAX_PENDING_WRITES`]: crate::output::MAX_PENDING_WRITES
/// [`MAX_BYTES_PRE_COMPLETED`]: crate::output::MAX_BYTES_PRE_COMPLETED
/// [`BLOCK_CAPACITY`]: crate::block::BLOCK_CAPACITY
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of blocks allocated up front when the pool is created.
    pub initial_blocks: usize,
    /// Maximum number of free blocks the pool retains. Blocks returned
    /// beyond this are dropped instead of kept on the free list.
    pub max_free_blocks: usize,
    /// Number of worker threads completing producer promises.
    pub completion_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_blocks: 64,
            max_free_blocks: 256,
            completion_threads: 1,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.completion_threads == 0 {
            return Err(crate::error::Error::Config(
                "completion_threads must be > 0".into(),
            ));
        }
        if self.max_free_blocks < self.initial_blocks {
            return Err(crate::error::Error::Config(
                "max_free_blocks must be >= initial_blocks".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_completion_threads_rejected() {
        let config = Config {
            completion_threads: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn free_list_smaller_than_initial_rejected() {
        let config = Config {
            initial_blocks: 32,
            max_free_blocks: 16,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
