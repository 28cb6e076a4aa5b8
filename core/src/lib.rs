//! # Unflow Core
//!
//! Core traits and types for the unflow architecture.
//!
//! This crate provides the pure half of a unidirectional data flow: a host
//! feature turns raw inputs into actions, reduces actions against its state,
//! and answers with [`Effect`] descriptions that the runtime schedules.
//!
//! ## Core Concepts
//!
//! - **State**: Feature state, owned by the store and mutated only by `reduce`
//! - **Input**: Raw external events, fanned out into actions by `transform`
//! - **Action**: Everything that can happen to the state
//! - **Effect**: Declarative description of follow-up work (not execution)
//! - **Operation**: The async unit of work behind a `Run` effect
//! - **`CancelId`**: Key of an at-most-one-task slot
//! - **Environment**: Injected dependencies
//!
//! ## Example
//!
//! ```
//! use unflow_core::{smallvec, Effect, Effects, Reducer, SmallVec};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterAction {
//!     Increment,
//!     IncrementCompleted,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = Counter;
//!     type Input = CounterAction;
//!     type Action = CounterAction;
//!     type CancelId = &'static str;
//!     type Environment = ();
//!
//!     fn transform(&self, input: CounterAction) -> SmallVec<[CounterAction; 4]> {
//!         smallvec![input]
//!     }
//!
//!     fn reduce(
//!         &self,
//!         state: &mut Counter,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> Effects<CounterAction, &'static str> {
//!         match action {
//!             CounterAction::Increment => {
//!                 state.count += 1;
//!                 smallvec![Effect::run(async { Some(CounterAction::IncrementCompleted) })]
//!             },
//!             CounterAction::IncrementCompleted => smallvec![Effect::None],
//!         }
//!     }
//! }
//!
//! let mut state = Counter::default();
//! let effects = CounterReducer.reduce(&mut state, CounterAction::Increment, &());
//! assert_eq!(state.count, 1);
//! assert!(effects[0].is_async());
//! ```

// Re-export SmallVec for ergonomic effect lists
pub use smallvec::{smallvec, SmallVec};

/// Effect module - Side effect descriptions
pub mod effect;

/// Operation module - The async work wrapped by `Run` effects
pub mod operation;

/// Error module - Uniform error representation at the operation boundary
pub mod error;

/// Timer module - Injectable sleep provider for delayed and repeating effects
pub mod timer;

/// Declarative macros for effect construction
pub mod effect_macros;

pub use effect::{Effect, Effects};
pub use error::{Cancelled, DomainError, WrappedError};
pub use operation::{Operation, Outcome};
pub use reducer::Reducer;
pub use timer::{SystemTimer, Timer};

/// Reducer module - The host feature contract
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// The store owns the state and calls into the reducer from a single serialized
/// context, so a reducer never observes concurrent mutation.
pub mod reducer {
    use super::effect::Effects;
    use super::error::WrappedError;
    use smallvec::SmallVec;

    /// The Reducer trait - the feature the store drives
    ///
    /// # Type Parameters
    ///
    /// - `State`: The feature state; compared with `PartialEq` to detect changes
    /// - `Input`: Raw external events accepted by `Store::send`
    /// - `Action`: The action vocabulary processed by `reduce`
    /// - `CancelId`: Keys for cancellable task slots
    /// - `Environment`: Injected dependencies
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SearchReducer {
    ///     type State = SearchState;
    ///     type Input = SearchInput;
    ///     type Action = SearchAction;
    ///     type CancelId = SearchTask;
    ///     type Environment = SearchEnvironment;
    ///
    ///     fn transform(&self, input: SearchInput) -> SmallVec<[SearchAction; 4]> {
    ///         match input {
    ///             SearchInput::QueryEdited(q) => smallvec![SearchAction::SetQuery(q)],
    ///         }
    ///     }
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SearchState,
    ///         action: SearchAction,
    ///         env: &SearchEnvironment,
    ///     ) -> Effects<SearchAction, SearchTask> {
    ///         match action {
    ///             SearchAction::SetQuery(q) => {
    ///                 state.query = q;
    ///                 smallvec![Effect::debounce(SearchTask::Query, env.delay, SearchAction::Submit)]
    ///             },
    ///             // ...
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The raw input vocabulary accepted from the outside world
        type Input;

        /// The action type this reducer processes
        type Action;

        /// Identifier of a cancellable task slot
        type CancelId;

        /// The environment type with injected dependencies
        type Environment;

        /// Map one input to the ordered list of actions it stands for
        ///
        /// Must be pure. An empty list means the input is ignored.
        fn transform(&self, input: Self::Input) -> SmallVec<[Self::Action; 4]>;

        /// Reduce an action into state changes and effects
        ///
        /// Updates state in place and returns effect descriptions. The
        /// effects are interpreted in list order once this returns.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action, Self::CancelId>;

        /// Turn a failed operation into an action
        ///
        /// Called on the store's serialized context exactly once per failing
        /// operation, never for cancellations. The returned action, if any, is
        /// dispatched like any other.
        fn handle_error(
            &self,
            error: WrappedError,
            env: &Self::Environment,
        ) -> Option<Self::Action> {
            let _ = (error, env);
            None
        }
    }
}
