//! Effect descriptions.
//!
//! Effects are NOT executed by the reducer. They are values describing what
//! should happen next, returned from `reduce` and interpreted by the store.

use crate::error::WrappedError;
use crate::operation::{Operation, Outcome};
use smallvec::SmallVec;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The effect list returned by a reducer
pub type Effects<Action, Id> = SmallVec<[Effect<Action, Id>; 4]>;

/// Effect type - describes a side effect to be executed
///
/// # Type Parameters
///
/// - `Action`: The action type that effects feed back into the reducer
/// - `Id`: The cancellation key type
///
/// # Cancellation slots
///
/// `Run`, `SleepThen` and `Timer` take an optional id. A keyed effect occupies
/// the slot for that id: starting another keyed effect with the same id
/// cancels the previous one first, and `Cancel(id)` stops it. Unkeyed effects
/// are fire-and-forget.
///
/// # Equality
///
/// Structural, except for `Run`: operations are opaque, so two `Run`
/// effects are equal when their ids are equal.
pub enum Effect<Action, Id> {
    /// No-op effect
    None,

    /// Re-dispatch an action immediately, before sibling effects run
    Dispatch(Action),

    /// Run an async operation in the background
    Run {
        /// Slot to occupy, if any
        id: Option<Id>,
        /// The work itself
        operation: Operation<Action>,
    },

    /// Cancel whatever task occupies the slot
    Cancel(Id),

    /// Run the async effects in parallel; the rest follow once they finish
    Concurrent(Vec<Effect<Action, Id>>),

    /// Wait on the injected timer, then dispatch an action
    SleepThen {
        /// Slot to occupy, if any
        id: Option<Id>,
        /// How long to wait
        duration: Duration,
        /// Action to dispatch afterwards
        action: Action,
    },

    /// Dispatch an action on every tick of the injected timer until cancelled
    Timer {
        /// Slot to occupy, if any
        id: Option<Id>,
        /// Tick period
        interval: Duration,
        /// Action to dispatch on each tick
        action: Action,
    },
}

impl<Action, Id> Effect<Action, Id>
where
    Action: Send + 'static,
{
    /// Dispatch `action` synchronously
    #[must_use]
    pub const fn send(action: Action) -> Self {
        Self::Dispatch(action)
    }

    /// Fire-and-forget async work that may produce an action
    #[must_use]
    pub fn run<F>(future: F) -> Self
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Self::Run {
            id: None,
            operation: Operation::from_optional(future),
        }
    }

    /// Async work occupying the `id` slot
    #[must_use]
    pub fn run_cancellable<F>(id: Id, future: F) -> Self
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Self::Run {
            id: Some(id),
            operation: Operation::from_optional(future),
        }
    }

    /// Fire-and-forget fallible async work
    ///
    /// Errors reach the reducer's `handle_error` unless they are cancellations.
    #[must_use]
    pub fn try_run<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<Option<Action>, E>> + Send + 'static,
        E: Error + Send + 'static,
    {
        Self::Run {
            id: None,
            operation: Operation::fallible(future),
        }
    }

    /// Fallible async work occupying the `id` slot
    #[must_use]
    pub fn try_run_cancellable<F, E>(id: Id, future: F) -> Self
    where
        F: Future<Output = Result<Option<Action>, E>> + Send + 'static,
        E: Error + Send + 'static,
    {
        Self::Run {
            id: Some(id),
            operation: Operation::fallible(future),
        }
    }

    /// Wrap an already-built operation
    #[must_use]
    pub const fn operation(id: Option<Id>, operation: Operation<Action>) -> Self {
        Self::Run { id, operation }
    }

    /// Cancel the task in the `id` slot
    #[must_use]
    pub const fn cancel(id: Id) -> Self {
        Self::Cancel(id)
    }

    /// Run effects concurrently
    #[must_use]
    pub const fn concurrent(effects: Vec<Self>) -> Self {
        Self::Concurrent(effects)
    }

    /// Dispatch `action` after `duration`
    #[must_use]
    pub const fn sleep_then(id: Option<Id>, duration: Duration, action: Action) -> Self {
        Self::SleepThen {
            id,
            duration,
            action,
        }
    }

    /// Restartable delay: each new debounce on `id` replaces the pending one
    #[must_use]
    pub const fn debounce(id: Id, duration: Duration, action: Action) -> Self {
        Self::sleep_then(Some(id), duration, action)
    }

    /// Dispatch `action` every `interval` until cancelled
    #[must_use]
    pub const fn timer(id: Option<Id>, interval: Duration, action: Action) -> Self {
        Self::Timer {
            id,
            interval,
            action,
        }
    }

    /// Whether interpreting this effect starts background work
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(
            self,
            Self::Run { .. } | Self::SleepThen { .. } | Self::Timer { .. }
        )
    }

    /// The slot this effect occupies or targets
    #[must_use]
    pub const fn cancel_id(&self) -> Option<&Id> {
        match self {
            Self::Run { id, .. } | Self::SleepThen { id, .. } | Self::Timer { id, .. } => {
                id.as_ref()
            },
            Self::Cancel(id) => Some(id),
            Self::None | Self::Dispatch(_) | Self::Concurrent(_) => None,
        }
    }

    /// Lift this effect into a parent action type
    ///
    /// Used when a parent feature embeds a child feature and wraps the
    /// child's actions in one of its own variants.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B, Id>
    where
        B: Send + 'static,
        F: Fn(Action) -> B + Send + Sync + 'static,
    {
        self.map_shared(&Arc::new(f))
    }

    fn map_shared<B, F>(self, f: &Arc<F>) -> Effect<B, Id>
    where
        B: Send + 'static,
        F: Fn(Action) -> B + Send + Sync + 'static,
    {
        match self {
            Self::None => Effect::None,
            Self::Dispatch(action) => Effect::Dispatch(f(action)),
            Self::Run { id, operation } => {
                let f = Arc::clone(f);
                Effect::Run {
                    id,
                    operation: operation.map(move |action| f(action)),
                }
            },
            Self::Cancel(id) => Effect::Cancel(id),
            Self::Concurrent(effects) => Effect::Concurrent(
                effects
                    .into_iter()
                    .map(|effect| effect.map_shared(f))
                    .collect(),
            ),
            Self::SleepThen {
                id,
                duration,
                action,
            } => Effect::SleepThen {
                id,
                duration,
                action: f(action),
            },
            Self::Timer {
                id,
                interval,
                action,
            } => Effect::Timer {
                id,
                interval,
                action: f(action),
            },
        }
    }

    /// Fire-and-forget work that reports an explicit [`Outcome`]
    ///
    /// Useful when the operation wants to fail with a ready-made
    /// [`WrappedError`] instead of a typed error.
    #[must_use]
    pub fn run_outcome<F>(id: Option<Id>, future: F) -> Self
    where
        F: Future<Output = Outcome<Action>> + Send + 'static,
    {
        Self::Run {
            id,
            operation: Operation::new(future),
        }
    }

    /// An operation that fails immediately with `error`
    #[must_use]
    pub fn fail(error: WrappedError) -> Self {
        Self::run_outcome(None, async move { Outcome::Error(error) })
    }
}

// Manual Debug implementation since Operation wraps a future
impl<Action, Id> std::fmt::Debug for Effect<Action, Id>
where
    Action: std::fmt::Debug,
    Id: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Dispatch(action) => f.debug_tuple("Effect::Dispatch").field(action).finish(),
            Self::Run { id, .. } => f
                .debug_struct("Effect::Run")
                .field("id", id)
                .field("operation", &"<operation>")
                .finish(),
            Self::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            Self::Concurrent(effects) => {
                f.debug_tuple("Effect::Concurrent").field(effects).finish()
            },
            Self::SleepThen {
                id,
                duration,
                action,
            } => f
                .debug_struct("Effect::SleepThen")
                .field("id", id)
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Self::Timer {
                id,
                interval,
                action,
            } => f
                .debug_struct("Effect::Timer")
                .field("id", id)
                .field("interval", interval)
                .field("action", action)
                .finish(),
        }
    }
}

impl<Action, Id> PartialEq for Effect<Action, Id>
where
    Action: PartialEq,
    Id: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Dispatch(a), Self::Dispatch(b)) => a == b,
            (Self::Run { id: a, .. }, Self::Run { id: b, .. }) => a == b,
            (Self::Cancel(a), Self::Cancel(b)) => a == b,
            (Self::Concurrent(a), Self::Concurrent(b)) => a == b,
            (
                Self::SleepThen {
                    id: id_a,
                    duration: duration_a,
                    action: action_a,
                },
                Self::SleepThen {
                    id: id_b,
                    duration: duration_b,
                    action: action_b,
                },
            ) => id_a == id_b && duration_a == duration_b && action_a == action_b,
            (
                Self::Timer {
                    id: id_a,
                    interval: interval_a,
                    action: action_a,
                },
                Self::Timer {
                    id: id_b,
                    interval: interval_b,
                    action: action_b,
                },
            ) => id_a == id_b && interval_a == interval_b && action_a == action_b,
            _ => false,
        }
    }
}
