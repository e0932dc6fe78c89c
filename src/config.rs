use serde::Deserialize;
use std::time::Duration;

/// Tuning knobs for a [`Server`](crate::server::Server).
///
/// Deserializable from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Compute pool size. `0` lets the pool pick one thread per CPU.
    pub worker_threads: usize,
    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
    /// Computations allowed in flight at once. A dispatch beyond this bound
    /// fails the topic with a scheduling error instead of queueing it.
    pub max_in_flight: usize,
    /// Delay inserted before every kernel run, in milliseconds. Useful to keep
    /// the "calculating" placeholder visible in demos.
    pub simulated_latency_ms: u64,
    /// How long `terminate` waits for in-flight computations, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name_prefix: "ctc-worker".to_owned(),
            max_in_flight: 1024,
            simulated_latency_ms: 0,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Sets [`ServerConfig::worker_threads`].
    #[must_use]
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Sets [`ServerConfig::thread_name_prefix`].
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets [`ServerConfig::max_in_flight`].
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Sets [`ServerConfig::simulated_latency_ms`].
    #[must_use]
    pub fn with_simulated_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets [`ServerConfig::shutdown_timeout_ms`].
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// [`ServerConfig::simulated_latency_ms`] as a `Duration`.
    #[must_use]
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    /// [`ServerConfig::shutdown_timeout_ms`] as a `Duration`.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
