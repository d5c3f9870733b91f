use std::env;

/// Validator configuration.
///
/// Reads from `SQLVET_*` environment variables, falling back to
/// compile-time defaults when unset or unparsable.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum number of query tasks in flight at once.
    pub concurrency: usize,
    /// Profiler inclusion floor, in seconds of query runtime.
    pub runtime_threshold: u64,
    /// Subdivision window: an errored query wider than twice this
    /// splits into consecutive windows of this size instead of halves.
    pub chunk_size: usize,
}

impl ValidatorConfig {
    pub const DEFAULT_CONCURRENCY: usize = 10;
    pub const DEFAULT_RUNTIME_THRESHOLD: u64 = 5;
    pub const DEFAULT_CHUNK_SIZE: usize = 500;

    /// Build a config from the environment.
    ///
    /// Recognized variables: `SQLVET_CONCURRENCY`,
    /// `SQLVET_RUNTIME_THRESHOLD`, `SQLVET_CHUNK_SIZE`.
    pub fn from_env() -> Self {
        Self {
            concurrency: env_or("SQLVET_CONCURRENCY", Self::DEFAULT_CONCURRENCY),
            runtime_threshold: env_or("SQLVET_RUNTIME_THRESHOLD", Self::DEFAULT_RUNTIME_THRESHOLD),
            chunk_size: env_or("SQLVET_CHUNK_SIZE", Self::DEFAULT_CHUNK_SIZE),
        }
    }

    /// Set the concurrency budget.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the profiler runtime threshold, in seconds.
    pub fn runtime_threshold(mut self, seconds: u64) -> Self {
        self.runtime_threshold = seconds;
        self
    }

    /// Set the subdivision window size.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            concurrency: Self::DEFAULT_CONCURRENCY,
            runtime_threshold: Self::DEFAULT_RUNTIME_THRESHOLD,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
