//! # Counter Example
//!
//! A counter that exercises every kind of effect the store schedules.
//!
//! This example showcases:
//! - Raw UI events mapped to actions through `transform`
//! - A debounced autosave that restarts on every change
//! - A cancellable, fallible fact lookup whose failures reach `handle_error`
//! - A repeating ticker started and stopped under one task id
//! - Reset cancelling every in-flight task at once
//!
//! ## Example
//!
//! ```no_run
//! use counter::{CounterEnvironment, CounterEvent, CounterReducer, CounterState};
//! use unflow_runtime::Store;
//!
//! # async fn example() {
//! let store = Store::new(
//!     CounterState::default(),
//!     CounterReducer,
//!     CounterEnvironment::system(),
//! );
//!
//! store.send(CounterEvent::PlusTapped);
//! assert_eq!(store.state(|s| s.count), 1);
//! # }
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use unflow_core::{smallvec, Effect, Effects, Reducer, SmallVec, SystemTimer, Timer, WrappedError};

/// How long the counter must sit still before it is saved
pub const AUTOSAVE_DELAY: Duration = Duration::from_millis(500);

/// Interval of the automatic ticker
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
    /// Last value written by autosave
    pub saved: Option<i64>,
    /// Latest fact about the count
    pub fact: Option<String>,
    /// A fact lookup is in flight
    pub loading: bool,
    /// The ticker is running
    pub ticking: bool,
    /// Last failure reported by an operation
    pub error: Option<String>,
}

/// Raw events coming from the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterEvent {
    /// The `+` button
    PlusTapped,
    /// The `-` button
    MinusTapped,
    /// The stepper was dragged by `delta`
    Stepped(i64),
    /// The reset button
    ResetTapped,
    /// The "fact" button
    FactTapped,
    /// The ticker switch
    TickerToggled,
    /// Pull-to-refresh: look up a fact, then save
    Refreshed,
}

/// Counter actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterAction {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Reset the counter and cancel all work
    Reset,
    /// Look up a fact about the current count
    FetchFact,
    /// A fact arrived
    FactLoaded(String),
    /// A lookup failed
    FactFailed(String),
    /// Start the ticker
    StartTicking,
    /// Stop the ticker
    StopTicking,
    /// One ticker beat
    Tick,
    /// Write the current count
    Save,
    /// Fetch a fact and save once it arrives
    Refresh,
}

/// Keys of the cancellable task slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterTask {
    /// The debounced autosave
    Autosave,
    /// The fact lookup
    Fact,
    /// The repeating ticker
    Ticker,
}

/// Fact lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactError {
    /// Nothing is known about this number
    #[error("no fact known for {0}")]
    Unknown(i64),
}

/// Source of number facts
pub trait FactClient: Send + Sync {
    /// Look up a fact about `number`
    fn fact(&self, number: i64) -> BoxFuture<'static, Result<String, FactError>>;
}

/// Facts computed locally after a simulated round trip
#[derive(Clone)]
pub struct LocalFacts {
    timer: Arc<dyn Timer>,
    latency: Duration,
}

impl LocalFacts {
    /// Answer after `latency` measured on `timer`
    #[must_use]
    pub fn new(timer: Arc<dyn Timer>, latency: Duration) -> Self {
        Self { timer, latency }
    }
}

impl std::fmt::Debug for LocalFacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFacts")
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl FactClient for LocalFacts {
    fn fact(&self, number: i64) -> BoxFuture<'static, Result<String, FactError>> {
        let sleep = self.timer.sleep(self.latency);
        async move {
            sleep.await;
            match number {
                n if n < 0 => Err(FactError::Unknown(n)),
                0 => Ok("0 is the additive identity".to_string()),
                n if n % 2 == 0 => Ok(format!("{n} is even")),
                n => Ok(format!("{n} is odd")),
            }
        }
        .boxed()
    }
}

/// Counter environment
#[derive(Clone)]
pub struct CounterEnvironment {
    /// Where facts come from
    pub facts: Arc<dyn FactClient>,
}

impl CounterEnvironment {
    /// Create an environment around a fact client
    #[must_use]
    pub fn new(facts: Arc<dyn FactClient>) -> Self {
        Self { facts }
    }

    /// Local facts with a short wall-clock latency
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(LocalFacts::new(
            Arc::new(SystemTimer),
            Duration::from_millis(200),
        )))
    }
}

impl std::fmt::Debug for CounterEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterEnvironment").finish_non_exhaustive()
    }
}

/// Counter reducer
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer;

impl CounterReducer {
    fn fetch(state: &CounterState, env: &CounterEnvironment) -> Effect<CounterAction, CounterTask> {
        let fact = env.facts.fact(state.count);
        Effect::try_run_cancellable(CounterTask::Fact, async move {
            fact.await.map(|text| Some(CounterAction::FactLoaded(text)))
        })
    }
}

impl Reducer for CounterReducer {
    type State = CounterState;
    type Input = CounterEvent;
    type Action = CounterAction;
    type CancelId = CounterTask;
    type Environment = CounterEnvironment;

    fn transform(&self, input: CounterEvent) -> SmallVec<[CounterAction; 4]> {
        match input {
            CounterEvent::PlusTapped => smallvec![CounterAction::Increment],
            CounterEvent::MinusTapped => smallvec![CounterAction::Decrement],
            CounterEvent::Stepped(delta) => {
                let step = if delta < 0 {
                    CounterAction::Decrement
                } else {
                    CounterAction::Increment
                };
                (0..delta.unsigned_abs()).map(|_| step.clone()).collect()
            },
            CounterEvent::ResetTapped => smallvec![CounterAction::Reset],
            CounterEvent::FactTapped => smallvec![CounterAction::FetchFact],
            CounterEvent::TickerToggled => smallvec![CounterAction::StartTicking],
            CounterEvent::Refreshed => smallvec![CounterAction::Refresh],
        }
    }

    fn reduce(
        &self,
        state: &mut CounterState,
        action: CounterAction,
        env: &CounterEnvironment,
    ) -> Effects<CounterAction, CounterTask> {
        match action {
            CounterAction::Increment | CounterAction::Decrement | CounterAction::Tick => {
                state.count += if action == CounterAction::Decrement { -1 } else { 1 };
                smallvec![Effect::debounce(
                    CounterTask::Autosave,
                    AUTOSAVE_DELAY,
                    CounterAction::Save
                )]
            },
            CounterAction::Reset => {
                *state = CounterState::default();
                smallvec![
                    Effect::cancel(CounterTask::Autosave),
                    Effect::cancel(CounterTask::Fact),
                    Effect::cancel(CounterTask::Ticker),
                ]
            },
            CounterAction::FetchFact => {
                state.loading = true;
                state.error = None;
                smallvec![Self::fetch(state, env)]
            },
            CounterAction::FactLoaded(text) => {
                state.loading = false;
                state.fact = Some(text);
                smallvec![Effect::None]
            },
            CounterAction::FactFailed(message) => {
                state.loading = false;
                state.error = Some(message);
                smallvec![Effect::None]
            },
            CounterAction::StartTicking if state.ticking => {
                smallvec![Effect::send(CounterAction::StopTicking)]
            },
            CounterAction::StartTicking => {
                state.ticking = true;
                smallvec![Effect::timer(
                    Some(CounterTask::Ticker),
                    TICK_INTERVAL,
                    CounterAction::Tick
                )]
            },
            CounterAction::StopTicking => {
                state.ticking = false;
                smallvec![Effect::cancel(CounterTask::Ticker)]
            },
            CounterAction::Save => {
                tracing::debug!(count = state.count, "Saving counter");
                state.saved = Some(state.count);
                smallvec![Effect::None]
            },
            CounterAction::Refresh => {
                state.loading = true;
                smallvec![Effect::concurrent(vec![
                    Self::fetch(state, env),
                    Effect::send(CounterAction::Save),
                ])]
            },
        }
    }

    fn handle_error(&self, error: WrappedError, _env: &CounterEnvironment) -> Option<CounterAction> {
        tracing::warn!(domain = error.domain(), "Fact lookup failed: {}", error);
        Some(CounterAction::FactFailed(error.description().to_string()))
    }
}
