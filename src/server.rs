mod dispatch;

use crate::{
    config::ServerConfig,
    kernel::KernelRegistry,
    notifier::Notifier,
    server::dispatch::{Dispatched, Dispatcher},
    store::{Topic, TopicStore},
    types::{Request, TOO_FEW_PARAMETERS, TopicId, Value},
};
use derive_more::Debug;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Structural failures reported by [`Server::start`] and [`Server::terminate`].
///
/// Everything that goes wrong for an individual topic is recorded as topic
/// state instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The configuration cannot be served.
    #[error("invalid server configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The compute pool could not be built.
    #[error("failed to build compute pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    /// Computations were still running when the shutdown timeout expired.
    #[error("{in_flight} computation(s) still in flight after {timeout:?}")]
    ShutdownTimeout {
        /// Computations still running.
        in_flight: usize,
        /// How long `terminate` waited.
        timeout: Duration,
    },
}

/// Snapshot returned by [`Server::refresh_all`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Refresh {
    /// Every subscribed topic with its display value, in subscription order.
    pub topics: Vec<(TopicId, Value)>,
}

impl Refresh {
    /// Number of topics in the snapshot.
    #[must_use]
    pub fn count(&self) -> usize {
        self.topics.len()
    }

    /// Display value of `id`, if it was subscribed at snapshot time.
    #[must_use]
    pub fn get(&self, id: TopicId) -> Option<&Value> {
        self.topics
            .iter()
            .find_map(|(topic_id, value)| (*topic_id == id).then_some(value))
    }
}

impl IntoIterator for Refresh {
    type Item = (TopicId, Value);
    type IntoIter = std::vec::IntoIter<(TopicId, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.topics.into_iter()
    }
}

/// The topic-compute server: the poller-facing side of one session.
///
/// A session begins with [`Server::start`] and ends with
/// [`Server::terminate`]. In between, `subscribe`, `unsubscribe`,
/// `refresh_all` and `heartbeat` never block on a computation: work runs on the
/// compute pool and the poller is signalled through its [`Notifier`] when a
/// result lands.
#[must_use]
#[derive(Debug)]
pub struct Server {
    store: Arc<TopicStore>,
    #[debug(skip)]
    notifier: Arc<Notifier>,
    dispatcher: Dispatcher,
    shutdown_timeout: Duration,
}

impl Server {
    /// Starts a session with an empty topic store.
    ///
    /// # Errors
    /// If the configuration is invalid or the compute pool cannot be built.
    pub fn start(
        notifier: Notifier,
        registry: KernelRegistry,
        config: &ServerConfig,
    ) -> Result<Self, ServerError> {
        let store = Arc::new(TopicStore::new());
        let notifier = Arc::new(notifier);
        let dispatcher =
            Dispatcher::new(config, registry, Arc::clone(&store), Arc::clone(&notifier))?;
        info!(
            worker_threads = dispatcher.worker_threads(),
            kernels = dispatcher.kernels().len(),
            max_in_flight = config.max_in_flight,
            "Topic server started"
        );
        Ok(Self {
            store,
            notifier,
            dispatcher,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Subscribes `id` to `request` and returns what the poller should display.
    ///
    /// Returns `None` when `wants_fresh` is false: the poller already shows a
    /// cached value and the store is neither consulted nor changed. Otherwise:
    /// - a live topic returns its current display value (the placeholder while
    ///   pending) and is never dispatched twice;
    /// - a request without arguments fails the topic with
    ///   [`TOO_FEW_PARAMETERS`], and an unregistered function with
    ///   [`FUNCTION_NOT_FOUND`](crate::types::FUNCTION_NOT_FOUND); neither is
    ///   ever seen pending;
    /// - a new topic is dispatched and the placeholder returned, unless the
    ///   dispatch is rejected on the spot, in which case its message is.
    pub fn subscribe(&self, id: TopicId, request: Request, wants_fresh: bool) -> Option<Value> {
        if !wants_fresh {
            return None;
        }
        if let Some(topic) = self.store.get(id) {
            return Some(topic.state.display());
        }
        debug!(topic_id = id, function = %request.function, args = ?request.args, "Subscribe");
        if request.args.is_empty() {
            return Some(self.reject(id, request, TOO_FEW_PARAMETERS.to_owned()));
        }
        let kernel = match self.dispatcher.kernels().resolve(&request.function) {
            Ok(kernel) => Arc::clone(kernel),
            Err(err) => {
                debug!(topic_id = id, function = %request.function, "Function not found");
                return Some(self.reject(id, request, err.to_string()));
            }
        };
        let Ok(ticket) = self.store.insert_pending(id, request.clone()) else {
            // Another caller subscribed the same id in between.
            return Some(self.current(id));
        };
        Some(match self.dispatcher.dispatch(ticket, kernel, &request) {
            Dispatched::Launched => Value::calculating(),
            Dispatched::Rejected(message) => Value::Text(message),
        })
    }

    /// [`Server::subscribe`] for a raw topic array whose first element names
    /// the function and whose remaining elements are its arguments.
    ///
    /// An empty array fails the topic with [`TOO_FEW_PARAMETERS`].
    pub fn subscribe_topics<S: AsRef<str>>(
        &self,
        id: TopicId,
        topics: &[S],
        wants_fresh: bool,
    ) -> Option<Value> {
        match Request::from_topics(topics) {
            Some(request) => self.subscribe(id, request, wants_fresh),
            None => self.subscribe(id, Request::new(String::new(), Vec::<String>::new()), wants_fresh),
        }
    }

    /// Drops `id`. A computation still running for it finishes, but its
    /// result is discarded. Returns whether `id` was subscribed.
    pub fn unsubscribe(&self, id: TopicId) -> bool {
        let removed = self.store.remove(id);
        debug!(topic_id = id, removed = removed.is_some(), "Unsubscribe");
        removed.is_some()
    }

    /// Every subscribed topic with its display value.
    ///
    /// Also re-arms the notifier: the next completion signals the poller again.
    #[must_use]
    pub fn refresh_all(&self) -> Refresh {
        // Re-arm first: a completion the snapshot misses then signals anew.
        self.notifier.rearm();
        Refresh {
            topics: self.store.snapshot(),
        }
    }

    /// Liveness probe. Always true for a running server.
    #[must_use]
    pub fn heartbeat(&self) -> bool {
        true
    }

    /// The stored entry for `id`, if subscribed.
    #[must_use]
    pub fn topic(&self, id: TopicId) -> Option<Topic> {
        self.store.get(id)
    }

    /// Computations currently scheduled or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Ends the session.
    ///
    /// Silences the notifier, drops every topic and waits for running
    /// computations to finish; their results are discarded.
    ///
    /// # Errors
    /// [`ServerError::ShutdownTimeout`] if computations are still running when
    /// the configured shutdown timeout expires.
    pub fn terminate(self) -> Result<(), ServerError> {
        self.notifier.disconnect();
        let dropped = self.store.clear();
        info!(dropped_topics = dropped, in_flight = self.in_flight(), "Terminating topic server");
        self.dispatcher
            .drain(self.shutdown_timeout)
            .map_err(|in_flight| {
                warn!(in_flight, timeout = ?self.shutdown_timeout, "Shutdown timed out");
                ServerError::ShutdownTimeout {
                    in_flight,
                    timeout: self.shutdown_timeout,
                }
            })
    }

    /// Records `id` as failed with `message` in one step, so it never reads
    /// as pending.
    fn reject(&self, id: TopicId, request: Request, message: String) -> Value {
        match self.store.insert_failed(id, request, message.clone()) {
            Ok(_) => Value::Text(message),
            Err(_) => self.current(id),
        }
    }

    fn current(&self, id: TopicId) -> Value {
        self.store
            .get(id)
            .map_or_else(Value::calculating, |topic| topic.state.display())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Jobs outlive the session on the pool; keep them from calling back.
        self.notifier.disconnect();
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::{
        kernel::{Kernel, KernelError},
        store::TopicState,
        types::{CALCULATING, FUNCTION_NOT_FOUND, SCHEDULING_FAILED},
    };

    #[derive(std::fmt::Debug)]
    struct Panics;

    impl Kernel for Panics {
        fn name(&self) -> &str {
            "Panics"
        }

        fn call(&self, _args: &[String]) -> Result<Value, KernelError> {
            panic!("kernel bug")
        }
    }

    fn server(registry: KernelRegistry, config: &ServerConfig) -> (Server, flume::Receiver<()>) {
        let (notifier, rx) = Notifier::channel();
        (Server::start(notifier, registry, config).unwrap(), rx)
    }

    fn settle(server: &Server, rx: &flume::Receiver<()>, id: TopicId) -> TopicState {
        loop {
            // Re-arm before looking so the completion cannot slip past unsignalled.
            let _ = server.refresh_all();
            let state = server.topic(id).unwrap().state;
            if !state.is_pending() {
                return state;
            }
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }

    #[test]
    fn zero_max_in_flight_is_rejected() {
        let config = ServerConfig::default().with_max_in_flight(0);
        let err = Server::start(Notifier::noop(), KernelRegistry::default(), &config).unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig { .. }));
    }

    #[test]
    fn cached_subscribe_is_a_no_op() {
        let (server, _rx) = server(KernelRegistry::default(), &ServerConfig::default());
        assert_eq!(server.subscribe(1, Request::new("Fibonacci", ["7"]), false), None);
        assert!(server.topic(1).is_none());
        assert_eq!(server.refresh_all().count(), 0);
        server.terminate().unwrap();
    }

    #[test]
    fn unknown_function_fails_without_dispatch() {
        let (server, _rx) = server(KernelRegistry::default(), &ServerConfig::default());
        let value = server.subscribe(3, Request::new("NoSuchFunction", ["1"]), true);
        assert_eq!(value, Some(Value::from(FUNCTION_NOT_FOUND)));
        assert_eq!(server.in_flight(), 0);
        assert_eq!(
            server.topic(3).unwrap().state,
            TopicState::Failed(FUNCTION_NOT_FOUND.into())
        );
        server.terminate().unwrap();
    }

    #[test]
    fn raw_topic_arrays() {
        let (server, rx) = server(KernelRegistry::default(), &ServerConfig::default());
        assert_eq!(
            server.subscribe_topics::<&str>(1, &[], true),
            Some(Value::from(TOO_FEW_PARAMETERS))
        );
        assert_eq!(
            server.subscribe_topics(2, &["Fibonacci"], true),
            Some(Value::from(TOO_FEW_PARAMETERS))
        );
        assert_eq!(
            server.subscribe_topics(3, &["Fibonacci", "8"], true),
            Some(Value::from(CALCULATING))
        );
        assert_eq!(settle(&server, &rx, 3), TopicState::Ready(Value::Integer(13)));
        server.terminate().unwrap();
    }

    #[test]
    fn kernel_panic_becomes_failed_topic() {
        let registry = KernelRegistry::default().with_kernel(Panics);
        let (server, rx) = server(registry, &ServerConfig::default());
        assert_eq!(
            server.subscribe(1, Request::new("Panics", ["x"]), true),
            Some(Value::calculating())
        );
        assert_eq!(settle(&server, &rx, 1), TopicState::Failed("Panics() failed.".into()));
        assert!(server.heartbeat());
        server.terminate().unwrap();
    }

    #[test]
    fn saturated_pool_rejects_with_scheduling_error() {
        let config = ServerConfig::default()
            .with_max_in_flight(1)
            .with_simulated_latency(Duration::from_millis(300));
        let (server, _rx) = server(KernelRegistry::default(), &config);
        assert_eq!(
            server.subscribe(1, Request::new("Fibonacci", ["5"]), true),
            Some(Value::calculating())
        );
        assert_eq!(
            server.subscribe(2, Request::new("Fibonacci", ["6"]), true),
            Some(Value::from(SCHEDULING_FAILED))
        );
        assert_eq!(
            server.topic(2).unwrap().state,
            TopicState::Failed(SCHEDULING_FAILED.into())
        );
        server.terminate().unwrap();
    }

    #[test]
    fn terminate_times_out_on_slow_computations() {
        let config = ServerConfig::default()
            .with_simulated_latency(Duration::from_millis(500))
            .with_shutdown_timeout(Duration::from_millis(20));
        let (server, _rx) = server(KernelRegistry::default(), &config);
        let _ = server.subscribe(1, Request::new("Fibonacci", ["5"]), true);
        let err = server.terminate().unwrap_err();
        assert!(matches!(err, ServerError::ShutdownTimeout { in_flight: 1, .. }));
    }

    #[test]
    fn refresh_lookup() {
        let refresh = Refresh {
            topics: vec![(4, Value::Integer(2)), (7, Value::calculating())],
        };
        assert_eq!(refresh.count(), 2);
        assert_eq!(refresh.get(7), Some(&Value::calculating()));
        assert_eq!(refresh.get(5), None);
        let ids: Vec<_> = refresh.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, [4, 7]);
    }
}
