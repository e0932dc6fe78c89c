//! Asynchronous topic-compute server.
//!
//! A poller subscribes topics (an externally assigned integer id plus a
//! function name and arguments). The server answers at once with a
//! "calculating" placeholder, runs the named kernel on a background pool,
//! caches the result per topic and signals the poller, which then re-reads
//! every topic in one `refresh_all` call. The poller may also unsubscribe a
//! topic or probe liveness at any time without coordinating with the
//! computations in flight.
//!
//! It:
//! - Never blocks `subscribe` on a computation and never dispatches the same
//!   pending topic twice.
//! - Stamps every subscription with a generation, so a computation that
//!   finishes after its topic was unsubscribed (or re-subscribed) is dropped
//!   instead of resurrecting or clobbering the topic.
//! - Turns every per-topic failure (unknown function, missing arguments,
//!   out-of-range input, panicking kernel, saturated pool) into a failed topic
//!   with a fixed message rather than an error for the caller.
//!
//! Key modules:
//! - `server`: the poll interface (`start`, `subscribe`, `unsubscribe`,
//!   `refresh_all`, `heartbeat`, `terminate`) and the dispatcher behind it.
//! - `store`: the topic store and the per-topic state machine.
//! - `kernel`: the `Kernel` trait, the name-to-kernel registry and the
//!   built-in kernels.
//! - `notifier`: the coalescing "fresh data available" signal.
//! - `config`: `ServerConfig`.
//!
//! Quick start:
//! 1. Build a [`Notifier`](notifier::Notifier), from a callback or with
//!    `Notifier::channel()`.
//! 2. Call [`Server::start`](server::Server::start) with it, a
//!    [`KernelRegistry`](kernel::KernelRegistry) and a
//!    [`ServerConfig`](config::ServerConfig).
//! 3. `subscribe` topics; on every signal call `refresh_all` and display the
//!    returned values.

/// Server configuration.
pub mod config;
/// Kernels and the registry that resolves them by name.
pub mod kernel;
/// The signal through which the server tells the poller to refresh.
pub mod notifier;
/// The poll interface and the background dispatcher.
///
/// Owns the topic store, the notifier and the compute pool for one session.
pub mod server;
/// The topic store: per-topic state shared by the poll interface and the
/// compute workers.
pub mod store;
mod sync;
/// Topic ids, values, requests and the fixed display strings.
pub mod types;
