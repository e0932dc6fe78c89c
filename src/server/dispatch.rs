use crate::{
    config::ServerConfig,
    kernel::{Kernel, KernelRegistry},
    notifier::Notifier,
    server::ServerError,
    store::{Completion, Outcome, Ticket, TopicStore},
    sync::{AtomicUsize, Ordering},
    types::{Request, SCHEDULING_FAILED},
};
use derive_more::Debug;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// What became of a dispatch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Dispatched {
    /// The computation runs in the background.
    Launched,
    /// The topic was failed on the spot with this message.
    Rejected(String),
}

/// Runs kernels on the compute pool and settles topics when they finish.
///
/// Launching never blocks the caller. At most `max_in_flight` computations are
/// scheduled at once; each holds a [`Slot`] until its completion has been
/// written to the store and the poller signalled.
#[derive(Debug)]
pub(super) struct Dispatcher {
    registry: KernelRegistry,
    store: Arc<TopicStore>,
    notifier: Arc<Notifier>,
    pool: rayon::ThreadPool,
    #[debug(skip)]
    in_flight: Arc<AtomicUsize>,
    #[debug(skip)]
    idle_tx: flume::Sender<()>,
    #[debug(skip)]
    idle: flume::Receiver<()>,
    max_in_flight: usize,
    latency: Duration,
}

impl Dispatcher {
    pub(super) fn new(
        config: &ServerConfig,
        registry: KernelRegistry,
        store: Arc<TopicStore>,
        notifier: Arc<Notifier>,
    ) -> Result<Self, ServerError> {
        if config.max_in_flight == 0 {
            return Err(ServerError::InvalidConfig {
                reason: "max_in_flight must be at least 1",
            });
        }
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            // Kernel panics are caught per job; this covers panicking notifier
            // callbacks, which would otherwise abort the process.
            .panic_handler(|_| warn!("Compute job panicked outside its kernel"))
            .build()?;
        let (idle_tx, idle) = flume::bounded(1);
        Ok(Self {
            registry,
            store,
            notifier,
            pool,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle_tx,
            idle,
            max_in_flight: config.max_in_flight,
            latency: config.simulated_latency(),
        })
    }

    pub(super) fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub(super) fn kernels(&self) -> &KernelRegistry {
        &self.registry
    }

    pub(super) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Launches `kernel` for `ticket` on the compute pool.
    ///
    /// A full pool fails the topic on the spot and signals the poller, without
    /// running anything.
    pub(super) fn dispatch(&self, ticket: Ticket, kernel: Arc<dyn Kernel>, request: &Request) -> Dispatched {
        let Some(slot) = self.reserve_slot() else {
            warn!(
                topic_id = ticket.id,
                function = %request.function,
                max_in_flight = self.max_in_flight,
                "Cannot schedule computation"
            );
            if self.store.complete(ticket, Err(SCHEDULING_FAILED.to_owned())) == Completion::Applied {
                self.notifier.signal();
            }
            return Dispatched::Rejected(SCHEDULING_FAILED.to_owned());
        };
        debug!(
            topic_id = ticket.id,
            generation = %ticket.generation,
            function = %request.function,
            "Computation dispatched"
        );
        let job = Job {
            ticket,
            function: request.function.clone(),
            args: request.args.clone(),
            kernel,
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            latency: self.latency,
            slot,
        };
        self.pool.spawn(move || job.run());
        Dispatched::Launched
    }

    /// Waits until no computation is in flight, or `timeout` elapses.
    ///
    /// Returns the number still in flight on timeout.
    pub(super) fn drain(&self, timeout: Duration) -> Result<(), usize> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight() == 0 {
                return Ok(());
            }
            // The last slot released posts to `idle`; a stale post only costs
            // one more look at the counter.
            if self.idle.recv_deadline(deadline).is_err() {
                return match self.in_flight() {
                    0 => Ok(()),
                    in_flight => Err(in_flight),
                };
            }
        }
    }

    fn reserve_slot(&self) -> Option<Slot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_in_flight).then_some(n + 1)
            })
            .ok()
            .map(|_| Slot {
                in_flight: Arc::clone(&self.in_flight),
                idle: self.idle_tx.clone(),
            })
    }
}

/// One reserved unit of `max_in_flight`, released on drop.
struct Slot {
    in_flight: Arc<AtomicUsize>,
    idle: flume::Sender<()>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Full means a wakeup is already pending.
            let _ = self.idle.try_send(());
        }
    }
}

struct Job {
    ticket: Ticket,
    function: String,
    args: Vec<String>,
    kernel: Arc<dyn Kernel>,
    store: Arc<TopicStore>,
    notifier: Arc<Notifier>,
    latency: Duration,
    slot: Slot,
}

impl Job {
    fn run(self) {
        let Self {
            ticket,
            function,
            args,
            kernel,
            store,
            notifier,
            latency,
            slot,
        } = self;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let started = Instant::now();
        let outcome: Outcome = match panic::catch_unwind(AssertUnwindSafe(|| kernel.call(&args))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => {
                warn!(topic_id = ticket.id, function = %function, "Kernel panicked");
                Err(format!("{function}() failed."))
            }
        };
        debug!(
            topic_id = ticket.id,
            generation = %ticket.generation,
            function = %function,
            ok = outcome.is_ok(),
            elapsed = ?started.elapsed(),
            "Computation finished"
        );
        if store.complete(ticket, outcome) == Completion::Applied {
            notifier.signal();
        }
        // Released only after the signal, so a drained dispatcher has no
        // callback left to run.
        drop(slot);
    }
}
