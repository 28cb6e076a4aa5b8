//! The async unit of work behind a `Run` effect.

use crate::error::WrappedError;
use futures::future::{BoxFuture, FutureExt};
use std::error::Error;
use std::future::Future;

/// What an operation resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<A> {
    /// Feed this action back into the reducer
    Action(A),
    /// Finished without a follow-up action
    None,
    /// Failed; routed to the reducer's error hook unless it is a cancellation
    Error(WrappedError),
}

impl<A> Outcome<A> {
    /// Map the carried action
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Outcome<B>
    where
        F: FnOnce(A) -> B,
    {
        match self {
            Self::Action(action) => Outcome::Action(f(action)),
            Self::None => Outcome::None,
            Self::Error(error) => Outcome::Error(error),
        }
    }
}

impl<A> From<Option<A>> for Outcome<A> {
    fn from(action: Option<A>) -> Self {
        action.map_or(Self::None, Self::Action)
    }
}

/// A single asynchronous unit of work producing an [`Outcome`].
///
/// The wrapped future is lazy: nothing runs until the runtime spawns it.
/// Operations have no identity worth comparing, so two operations are never
/// equal, not even an operation and itself. Compare the surrounding effects
/// by kind and id instead.
pub struct Operation<A> {
    future: BoxFuture<'static, Outcome<A>>,
}

impl<A> Operation<A>
where
    A: Send + 'static,
{
    /// Wrap a future that resolves to an explicit outcome
    #[must_use]
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Outcome<A>> + Send + 'static,
    {
        Self {
            future: future.boxed(),
        }
    }

    /// Wrap a future that may produce a follow-up action
    #[must_use]
    pub fn from_optional<F>(future: F) -> Self
    where
        F: Future<Output = Option<A>> + Send + 'static,
    {
        Self::new(future.map(Outcome::from))
    }

    /// Wrap a fallible future
    ///
    /// The error is captured with [`WrappedError::wrap`] when the future
    /// resolves, so a `WrappedError` returned by the future passes through
    /// unchanged.
    #[must_use]
    pub fn fallible<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<Option<A>, E>> + Send + 'static,
        E: Error + Send + 'static,
    {
        Self::new(future.map(|result| match result {
            Ok(action) => Outcome::from(action),
            Err(error) => Outcome::Error(WrappedError::wrap(&error)),
        }))
    }

    /// Lift the produced action into another action type
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Operation<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        Operation::new(self.future.map(move |outcome| outcome.map(f)))
    }

    /// Consume the operation, yielding its future
    #[must_use]
    pub fn into_future(self) -> BoxFuture<'static, Outcome<A>> {
        self.future
    }
}

impl<A> std::fmt::Debug for Operation<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation(<future>)")
    }
}

impl<A> PartialEq for Operation<A> {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}
