use crate::{
    sync::{Mutex, lock},
    types::{Generation, IndexMap, Request, TopicId, Value},
};
use core::fmt;
use indexmap::map::Entry;
use thiserror::Error;
use tracing::debug;

/// Computation outcome handed to [`TopicStore::complete`]: a value, or the
/// message to display instead of one.
pub type Outcome = Result<Value, String>;

/// Where a topic is in its lifecycle.
///
/// `Pending` moves to `Ready` or `Failed` exactly once; both are terminal for
/// the subscription instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicState {
    /// The computation has not completed yet.
    Pending,
    /// The computation produced a value.
    Ready(Value),
    /// The computation (or the request itself) failed with this message.
    Failed(String),
}

impl TopicState {
    /// Whether the computation is still outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// What the poller should display for this state.
    #[must_use]
    pub fn display(&self) -> Value {
        match self {
            Self::Pending => Value::calculating(),
            Self::Ready(value) => value.clone(),
            Self::Failed(message) => Value::Text(message.clone()),
        }
    }
}

/// A subscribed topic as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Poller-assigned id.
    pub id: TopicId,
    /// Subscription instance this entry belongs to.
    pub generation: Generation,
    /// The request that produced this topic.
    pub request: Request,
    /// Current state.
    pub state: TopicState,
}

/// Handle to one subscription instance, used to complete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    /// Topic id.
    pub id: TopicId,
    /// Instance of `id` the ticket was issued for.
    pub generation: Generation,
}

/// Whether [`TopicStore::complete`] changed anything.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The pending topic took the outcome.
    Applied,
    /// The topic was gone, re-subscribed or already settled; the outcome was
    /// dropped.
    Discarded,
}

/// Errors returned by [`TopicStore`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// The id already has a live entry.
    #[error("topic {id} is already subscribed")]
    AlreadySubscribed {
        /// The id that was inserted twice.
        id: TopicId,
    },
}

#[derive(Default)]
struct Topics {
    entries: IndexMap<TopicId, Topic>,
    next_generation: u64,
}

/// Concurrency-safe mapping from topic id to topic state.
///
/// Every operation takes the same lock, so each one is atomic with respect to
/// all the others and readers never observe a half-applied transition. Entries
/// live until they are removed; nothing expires on its own.
pub struct TopicStore {
    inner: Mutex<Topics>,
}

impl TopicStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Topics::default()),
        }
    }

    /// A copy of the entry for `id`, if subscribed.
    #[must_use]
    pub fn get(&self, id: TopicId) -> Option<Topic> {
        lock(&self.inner).entries.get(&id).cloned()
    }

    /// Creates a `Pending` entry for `id` under a fresh generation.
    ///
    /// # Errors
    /// [`StoreError::AlreadySubscribed`] if `id` is live; the existing entry,
    /// and any computation in flight for it, is left untouched.
    pub fn insert_pending(&self, id: TopicId, request: Request) -> Result<Ticket, StoreError> {
        self.insert(id, request, TopicState::Pending)
    }

    /// Creates an entry for `id` that is `Failed` with `message` from the
    /// start. Readers never see it as `Pending`.
    ///
    /// # Errors
    /// [`StoreError::AlreadySubscribed`] if `id` is live.
    pub fn insert_failed(
        &self,
        id: TopicId,
        request: Request,
        message: impl Into<String>,
    ) -> Result<Ticket, StoreError> {
        self.insert(id, request, TopicState::Failed(message.into()))
    }

    fn insert(&self, id: TopicId, request: Request, state: TopicState) -> Result<Ticket, StoreError> {
        let mut topics = lock(&self.inner);
        let Topics {
            entries,
            next_generation,
        } = &mut *topics;
        match entries.entry(id) {
            Entry::Occupied(_) => Err(StoreError::AlreadySubscribed { id }),
            Entry::Vacant(vacant) => {
                let generation = Generation(*next_generation);
                *next_generation += 1;
                vacant.insert(Topic {
                    id,
                    generation,
                    request,
                    state,
                });
                Ok(Ticket { id, generation })
            }
        }
    }

    /// Settles the instance named by `ticket` with `outcome`.
    ///
    /// Only a live, still `Pending` entry of the same generation takes the
    /// outcome. Anything else is a late completion racing an unsubscribe (or a
    /// re-subscribe) and is discarded.
    pub fn complete(&self, ticket: Ticket, outcome: Outcome) -> Completion {
        let mut topics = lock(&self.inner);
        let Some(topic) = topics.entries.get_mut(&ticket.id) else {
            debug!(topic_id = ticket.id, generation = %ticket.generation, "Discarding completion for unsubscribed topic");
            return Completion::Discarded;
        };
        if topic.generation != ticket.generation {
            debug!(
                topic_id = ticket.id,
                generation = %ticket.generation,
                live_generation = %topic.generation,
                "Discarding completion for a stale subscription"
            );
            return Completion::Discarded;
        }
        if !topic.state.is_pending() {
            debug!(topic_id = ticket.id, generation = %ticket.generation, "Discarding completion for settled topic");
            return Completion::Discarded;
        }
        topic.state = match outcome {
            Ok(value) => TopicState::Ready(value),
            Err(message) => TopicState::Failed(message),
        };
        Completion::Applied
    }

    /// Removes `id`, returning its last entry.
    pub fn remove(&self, id: TopicId) -> Option<Topic> {
        lock(&self.inner).entries.shift_remove(&id)
    }

    /// Every live topic with its display value, in subscription order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(TopicId, Value)> {
        lock(&self.inner)
            .entries
            .values()
            .map(|topic| (topic.id, topic.state.display()))
            .collect()
    }

    /// Drops every entry, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut topics = lock(&self.inner);
        let count = topics.entries.len();
        topics.entries.clear();
        count
    }

    /// Number of live topics.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Whether no topic is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TopicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TopicStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicStore").field("len", &self.len()).finish()
    }
}
