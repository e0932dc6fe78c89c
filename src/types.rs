use derive_more::{Display, From};
use indexmap::IndexMap as _IndexMap;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap as _HashMap;

/// Placeholder shown for a topic whose computation has not finished yet.
pub const CALCULATING: &str = "Calculating ...";
/// Shown when the requested function is not registered.
pub const FUNCTION_NOT_FOUND: &str = "Function not found.";
/// Shown when a subscription names no arguments.
pub const TOO_FEW_PARAMETERS: &str = "Too few parameters.";
/// Shown when a computation could not be scheduled.
pub const SCHEDULING_FAILED: &str = "Scheduling failed: too many computations in flight.";

/// Identifier of a topic.
///
/// Assigned by the poller, never generated by the server. An id is reused only
/// after the poller has unsubscribed it.
pub type TopicId = i32;

/// Subscription instance of a topic id.
///
/// Every time an id enters the store it is stamped with a fresh generation, so
/// a computation started for an earlier instance of the same id can be told
/// apart from the current one when it completes.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Generation(pub(crate) u64);

/// Value displayed to the poller for a topic.
#[derive(Debug, Display, From, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Numeric kernel result.
    #[display("{_0}")]
    Integer(i64),
    /// Textual result, placeholder or error message.
    #[display("{_0}")]
    Text(String),
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl Value {
    /// The "still computing" placeholder.
    #[must_use]
    pub fn calculating() -> Self {
        Self::Text(CALCULATING.to_owned())
    }

    /// Whether this is the "still computing" placeholder.
    #[must_use]
    pub fn is_calculating(&self) -> bool {
        matches!(self, Self::Text(text) if text == CALCULATING)
    }
}

/// A function name plus the ordered arguments it is invoked with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    /// Kernel name resolved through the registry.
    pub function: String,
    /// Arguments exactly as the poller supplied them.
    pub args: Vec<String>,
}

impl Request {
    /// Builds a request from a function name and its arguments.
    pub fn new<S: Into<String>>(function: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            function: function.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a request from a raw topic array whose first element is the
    /// function name. Returns `None` for an empty array.
    pub fn from_topics<S: AsRef<str>>(topics: &[S]) -> Option<Self> {
        let (function, args) = topics.split_first()?;
        Some(Self::new(
            function.as_ref(),
            args.iter().map(|arg| arg.as_ref().to_owned()),
        ))
    }
}

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
/// `IndexMap` type with fast hasher.
pub type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
