//! Parallel processing utilities for contour extraction
//!
//! This module provides configurable thread pool management for the
//! extraction passes. All parallel work in this crate runs through the
//! global pool configured here.

use labelmesh_core::Result;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Mutex, OnceLock};

/// Global thread pool for extraction passes
static GLOBAL_THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
static THREAD_POOL_CONFIG: Mutex<ThreadPoolConfig> = Mutex::new(ThreadPoolConfig::new());

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = automatic)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Minimum work-item count before a map runs in parallel
    pub min_chunk_size: usize,
}

impl ThreadPoolConfig {
    const fn new() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: String::new(),
            enabled: true,
            min_chunk_size: 100,
        }
    }

    /// Create default configuration
    pub fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: Some(8 * 1024 * 1024),
            thread_name_prefix: "labelmesh".to_string(),
            enabled: true,
            min_chunk_size: 100,
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set thread stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the serial-fallback threshold for parallel maps
    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }
}

/// Initialize the global thread pool with custom configuration
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if GLOBAL_THREAD_POOL.get().is_some() {
        return Ok(()); // Already initialized
    }

    let mut builder = ThreadPoolBuilder::new();

    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    let pool = builder.build().map_err(|e| {
        labelmesh_core::Error::Algorithm(format!("Failed to create thread pool: {}", e))
    })?;

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = config;
    }

    GLOBAL_THREAD_POOL.set(Arc::new(pool)).map_err(|_| {
        labelmesh_core::Error::Algorithm("Thread pool already initialized".to_string())
    })?;

    Ok(())
}

/// Get the global thread pool, initializing with defaults if needed
pub fn get_thread_pool() -> Arc<ThreadPool> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| {
            let config = ThreadPoolConfig::default();
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_threads.unwrap_or_else(num_cpus::get))
                .stack_size(config.stack_size.unwrap_or(8 * 1024 * 1024))
                .thread_name(|index| format!("labelmesh-{}", index))
                .build()
                .expect("Failed to create default thread pool");
            Arc::new(pool)
        })
        .clone()
}

/// Get current thread pool configuration
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .map(|config| config.clone())
        .unwrap_or_else(|_| ThreadPoolConfig::default())
}

/// Check if parallel processing is enabled
pub fn is_parallel_enabled() -> bool {
    get_config().enabled
}

/// Execute a parallel operation with the global thread pool
pub fn execute_parallel<F, R>(op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    if is_parallel_enabled() {
        get_thread_pool().install(op)
    } else {
        op()
    }
}

/// Parallel map operation with a serial fallback for small inputs
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if !is_parallel_enabled() || data.len() < get_config().min_chunk_size {
        return data.iter().map(f).collect();
    }

    execute_parallel(|| data.par_iter().map(f).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default()
            .with_threads(4)
            .with_stack_size(16 * 1024 * 1024)
            .with_enabled(true);

        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.stack_size, Some(16 * 1024 * 1024));
        assert!(config.enabled);
    }

    #[test]
    fn test_parallel_map_small_input_runs_serial() {
        let data = vec![1, 2, 3, 4, 5];
        let result = parallel_map(&data, |x| x * 2);
        assert_eq!(result, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_parallel_map_large_input() {
        let data: Vec<usize> = (0..10_000).collect();
        let result = parallel_map(&data, |x| x + 1);
        assert_eq!(result.len(), data.len());
        assert_eq!(result[0], 1);
        assert_eq!(result[9_999], 10_000);
    }

    #[test]
    fn test_execute_parallel_returns_value() {
        let sum = execute_parallel(|| (0..100).sum::<i32>());
        assert_eq!(sum, 4950);
    }
}
