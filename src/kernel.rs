mod fibonacci;
mod isamax;

pub use crate::kernel::{fibonacci::Fibonacci, isamax::Isamax};
use crate::types::{FUNCTION_NOT_FOUND, HashMap, Value};
use core::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// A named, pure computation the dispatcher can run in the background.
///
/// Kernels must not mutate anything outside their own return value. Several
/// implementations (a CPU one and an accelerator-backed one, say) may stand
/// behind the same name; the registry only cares about the name a kernel is
/// registered under.
pub trait Kernel: Debug + Send + Sync {
    /// Name the kernel is registered under by default.
    fn name(&self) -> &str;
    /// Compute a value from the ordered arguments of a subscription.
    ///
    /// # Errors
    /// A [`KernelError`] whose message is displayed to the poller in place of a
    /// value.
    fn call(&self, args: &[String]) -> Result<Value, KernelError>;
}

/// Domain errors produced by kernels.
///
/// The `Display` output is exactly what the poller shows for a failed topic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KernelError {
    /// The requested term lies outside the supported range.
    #[error("N-th term requested must be in the range {min}..{max}")]
    TermOutOfRange {
        /// Smallest supported term.
        min: u32,
        /// Largest supported term.
        max: u32,
    },
    /// An argument could not be parsed as a number.
    #[error("Argument `{arg}` is not a number.")]
    NotANumber {
        /// The offending argument.
        arg: String,
    },
    /// A vector kernel received no elements.
    #[error("Vector of length zero passed to {kernel}() function.")]
    EmptyVector {
        /// Kernel that rejected the input.
        kernel: &'static str,
    },
}

/// Returned by [`KernelRegistry::resolve`] for an unregistered name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", FUNCTION_NOT_FOUND)]
pub struct KernelNotFound {
    /// The name that was looked up.
    pub name: String,
}

/// Name-to-kernel mapping, fixed once the server has started.
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<dyn Kernel>>,
}

impl KernelRegistry {
    /// A registry without any kernels.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kernels: HashMap::default(),
        }
    }

    /// Register `kernel` under its own name, replacing any previous entry.
    #[must_use]
    pub fn with_kernel(self, kernel: impl Kernel + 'static) -> Self {
        let name = kernel.name().to_owned();
        self.with_kernel_as(name, kernel)
    }

    /// Register `kernel` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with_kernel_as(mut self, name: impl Into<String>, kernel: impl Kernel + 'static) -> Self {
        self.kernels.insert(name.into(), Arc::new(kernel));
        self
    }

    /// Look up the kernel registered under `name`.
    ///
    /// # Errors
    /// [`KernelNotFound`] if nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn Kernel>, KernelNotFound> {
        self.kernels.get(name).ok_or_else(|| KernelNotFound {
            name: name.to_owned(),
        })
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(String::as_str)
    }

    /// Number of registered kernels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Whether no kernel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl Default for KernelRegistry {
    /// The built-in kernels: [`Fibonacci`] and [`Isamax`].
    fn default() -> Self {
        Self::empty().with_kernel(Fibonacci).with_kernel(Isamax)
    }
}
