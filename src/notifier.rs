use crate::sync::{AtomicBool, Ordering};
use derive_more::Debug;

/// One-slot "come and re-read" signal registered by the poller.
///
/// The signal carries no payload: the poller answers it by calling
/// `refresh_all`. Completions are coalesced. After the callback fires, further
/// completions stay silent until the poller re-arms the notifier by refreshing.
/// After [`Notifier::disconnect`] the callback is never invoked again.
#[derive(Debug)]
pub struct Notifier {
    #[debug(skip)]
    callback: Box<dyn Fn() + Send + Sync>,
    signalled: AtomicBool,
    connected: AtomicBool,
}

impl Notifier {
    /// Wraps a callback invoked whenever fresh data may be available.
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            signalled: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    /// A notifier that posts to a single-slot channel instead of calling back.
    ///
    /// The receiver holds at most one pending signal.
    #[must_use]
    pub fn channel() -> (Self, flume::Receiver<()>) {
        let (tx, rx) = flume::bounded(1);
        let notifier = Self::new(move || {
            // Full means a signal is already waiting; disconnected means nobody
            // listens any more. Neither needs a second signal.
            let _ = tx.try_send(());
        });
        (notifier, rx)
    }

    /// A notifier that never calls anyone.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Signals the poller unless a signal is already outstanding.
    ///
    /// Returns whether the callback ran.
    pub(crate) fn signal(&self) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            return false;
        }
        if self.signalled.swap(true, Ordering::AcqRel) {
            return false;
        }
        (self.callback)();
        true
    }

    /// Allows the next completion to signal again.
    ///
    /// Must happen before the poller reads the store, so that any completion
    /// the read misses is guaranteed to signal afresh.
    pub(crate) fn rearm(&self) {
        self.signalled.store(false, Ordering::Release);
    }

    /// Stops all further signals.
    pub(crate) fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Whether the notifier still delivers signals.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}


#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::*;
    use crate::{
        store::{Completion, TopicStore},
        types::{Request, Value},
    };
    use loom::{
        sync::{Arc, atomic::AtomicUsize},
        thread,
    };

    #[test]
    fn loom_refresh_never_misses_a_completion() {
        loom::model(|| {
            let store = Arc::new(TopicStore::new());
            let ticket = store.insert_pending(1, Request::new("Fibonacci", ["7"])).unwrap();
            let count = Arc::new(AtomicUsize::new(0));
            let notifier = Arc::new(Notifier::new({
                let count = count.clone();
                move || {
                    count.fetch_add(1, Ordering::Relaxed);
                }
            }));
            // An earlier completion already signalled; the poller owes a refresh.
            assert!(notifier.signal());

            let worker = {
                let (store, notifier) = (store.clone(), notifier.clone());
                thread::spawn(move || {
                    if store.complete(ticket, Ok(Value::Integer(8))) == Completion::Applied {
                        notifier.signal();
                    }
                })
            };
            // The poller refreshes: re-arm, then read.
            notifier.rearm();
            let seen = !store.snapshot()[0].1.is_calculating();
            worker.join().unwrap();

            // Either the refresh saw the value or the worker signalled again.
            assert!(seen || count.load(Ordering::Relaxed) == 2);
        });
    }
}
