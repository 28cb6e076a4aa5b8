//! Uniform, comparable error values for the effect boundary.
//!
//! Operations may fail with any error type. At the boundary the failure is
//! captured once into a [`WrappedError`]: a plain value that can be cloned
//! across tasks, compared in tests and serialized for diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use thiserror::Error;

/// Marker error an operation returns when it stops because it was cancelled.
///
/// Wraps to the task-cancelled signature, so the runtime swallows it instead
/// of reporting it.
#[derive(Error, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[error("task was cancelled")]
pub struct Cancelled;

/// Errors that know their own domain and code.
///
/// Implement this for client errors that carry a protocol-level status
/// (for example a request layer reporting a cancelled request), then wrap them
/// with [`WrappedError::from_domain`].
pub trait DomainError: Error {
    /// Error domain, e.g. `"http"`
    fn domain(&self) -> &str;

    /// Numeric code within the domain
    fn code(&self) -> i64;

    /// Auxiliary context to attach
    fn context(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// A captured failure: description, code, domain, type name and flattened context.
///
/// Two wrapped errors are equal when every field is equal.
///
/// # Example
///
/// ```
/// use unflow_core::WrappedError;
///
/// let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.toml");
/// let wrapped = WrappedError::wrap(&io);
///
/// assert_eq!(wrapped.description(), "missing.toml");
/// assert!(wrapped.type_name().starts_with("std::io"));
/// assert!(!wrapped.is_cancellation());
///
/// // Wrapping a wrapped error is lossless
/// assert_eq!(WrappedError::wrap(&wrapped), wrapped);
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[error("{description}")]
pub struct WrappedError {
    description: String,
    code: i64,
    domain: String,
    type_name: String,
    context: BTreeMap<String, String>,
}

impl WrappedError {
    /// Domain of the task-cancelled signature
    pub const TASK_CANCELLED_DOMAIN: &'static str = "unflow.task";

    /// Code of the task-cancelled signature
    pub const TASK_CANCELLED_CODE: i64 = 1;

    /// Domain of the request-cancelled signature
    pub const REQUEST_CANCELLED_DOMAIN: &'static str = "unflow.request";

    /// Code of the request-cancelled signature
    pub const REQUEST_CANCELLED_CODE: i64 = -999;

    /// Create a wrapped error from its parts
    #[must_use]
    pub fn new(description: impl Into<String>, code: i64, domain: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            code,
            domain: domain.into(),
            type_name: std::any::type_name::<Self>().to_string(),
            context: BTreeMap::new(),
        }
    }

    /// The task-cancelled signature
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(
            Cancelled.to_string(),
            Self::TASK_CANCELLED_CODE,
            Self::TASK_CANCELLED_DOMAIN,
        )
        .with_type_name(std::any::type_name::<Cancelled>())
    }

    /// The request-cancelled signature
    #[must_use]
    pub fn request_cancelled() -> Self {
        Self::new(
            "request was cancelled",
            Self::REQUEST_CANCELLED_CODE,
            Self::REQUEST_CANCELLED_DOMAIN,
        )
    }

    /// Capture an arbitrary error
    ///
    /// An error that already is a `WrappedError` is returned as-is, and
    /// [`Cancelled`] maps to the task-cancelled signature. Anything else gets
    /// its type name as domain, code `1`, and its `source()` chain flattened
    /// into the context under `source.0`, `source.1`, ...
    #[must_use]
    pub fn wrap<E>(error: &E) -> Self
    where
        E: Error + 'static,
    {
        let dyn_error: &(dyn Error + 'static) = error;

        if let Some(wrapped) = dyn_error.downcast_ref::<Self>() {
            return wrapped.clone();
        }
        if dyn_error.is::<Cancelled>() {
            return Self::cancelled();
        }

        let type_name = std::any::type_name::<E>();
        let mut wrapped = Self::new(error.to_string(), 1, type_name);
        wrapped.context = flatten_sources(dyn_error);
        wrapped
    }

    /// Capture an error that reports its own domain and code
    #[must_use]
    pub fn from_domain<E>(error: &E) -> Self
    where
        E: DomainError + 'static,
    {
        let mut context = flatten_sources(error);
        context.extend(error.context());

        Self {
            description: error.to_string(),
            code: error.code(),
            domain: error.domain().to_string(),
            type_name: std::any::type_name::<E>().to_string(),
            context,
        }
    }

    /// Override the recorded type name
    #[must_use]
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Attach a context entry
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Numeric code
    #[must_use]
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// Error domain
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Type name of the original error
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Flattened auxiliary context
    #[must_use]
    pub const fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Whether this records a cancellation rather than a failure
    ///
    /// True for the task-cancelled and request-cancelled signatures only.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        (self.domain == Self::TASK_CANCELLED_DOMAIN && self.code == Self::TASK_CANCELLED_CODE)
            || (self.domain == Self::REQUEST_CANCELLED_DOMAIN
                && self.code == Self::REQUEST_CANCELLED_CODE)
    }
}

fn flatten_sources(error: &(dyn Error + 'static)) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    let mut source = error.source();
    let mut depth = 0;
    while let Some(cause) = source {
        context.insert(format!("source.{depth}"), cause.to_string());
        source = cause.source();
        depth += 1;
    }
    context
}
