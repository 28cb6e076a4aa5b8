//! # Unflow Testing
//!
//! Testing utilities and helpers for the unflow architecture.
//!
//! This crate provides:
//! - [`TestTimer`]: virtual time for `SleepThen` and `Timer` effects
//! - Recorders that plug into the store's observer hooks
//! - A Given-When-Then harness for reducers
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use unflow_testing::helpers::recording_store;
//!
//! #[tokio::test]
//! async fn test_debounced_search() {
//!     let harness = recording_store(SearchState::default(), SearchReducer, env());
//!
//!     harness.store.send(SearchInput::Typed("ru".into()));
//!     harness.store.send(SearchInput::Typed("rust".into()));
//!     harness.timer.advance(Duration::from_millis(300)).await;
//!
//!     assert_eq!(harness.actions.actions().last(), Some(&SearchAction::Submit));
//! }
//! ```


/// Mock implementations of injected collaborators
pub mod mocks {
    use futures::future::{self, BoxFuture, FutureExt};
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use unflow_core::Timer;

    /// Scheduler hops granted to woken tasks after each timer step
    const SETTLE_YIELDS: usize = 64;

    #[derive(Default)]
    struct Clock {
        now: Duration,
        next_seq: u64,
        sleepers: BTreeMap<(Duration, u64), oneshot::Sender<()>>,
    }

    /// Virtual-time [`Timer`] driven by the test itself
    ///
    /// Nothing sleeps on the wall clock. A sleep registers a deadline of
    /// `now() + duration` when `sleep` is called; it resolves only when the
    /// test moves virtual time past that deadline with [`advance`] or
    /// [`flush`]. Sleepers with equal deadlines fire in registration order.
    ///
    /// Meant for the current-thread runtime `#[tokio::test]` uses by default:
    /// between steps the timer yields so woken tasks can run, deliver their
    /// actions, and re-arm.
    ///
    /// [`advance`]: TestTimer::advance
    /// [`flush`]: TestTimer::flush
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use unflow_core::Timer;
    /// use unflow_testing::mocks::TestTimer;
    ///
    /// # tokio_test::block_on(async {
    /// let timer = TestTimer::new();
    /// let sleep = timer.sleep(Duration::from_secs(1));
    ///
    /// timer.advance(Duration::from_secs(1)).await;
    /// sleep.await;
    /// assert_eq!(timer.now(), Duration::from_secs(1));
    /// # });
    /// ```
    #[derive(Clone, Default)]
    pub struct TestTimer {
        clock: Arc<Mutex<Clock>>,
    }

    impl TestTimer {
        /// Create a timer at virtual time zero
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, Clock> {
            self.clock.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Current virtual time, measured from creation
        #[must_use]
        pub fn now(&self) -> Duration {
            self.lock().now
        }

        /// Number of sleeps still waiting for their deadline
        #[must_use]
        pub fn pending_sleepers(&self) -> usize {
            self.lock()
                .sleepers
                .values()
                .filter(|sleeper| !sleeper.is_closed())
                .count()
        }

        /// Move virtual time forward by `by`
        ///
        /// Fires every sleeper whose deadline falls within the window, in
        /// deadline order, including sleeps registered by tasks woken along
        /// the way. Each step sets `now()` to that sleeper's deadline first.
        pub async fn advance(&self, by: Duration) {
            let target = self.now() + by;
            settle().await;

            loop {
                let due = {
                    let mut clock = self.lock();
                    let next = clock.sleepers.keys().next().map(|(deadline, _)| *deadline);
                    match next {
                        Some(deadline) if deadline <= target => {
                            clock.now = deadline;
                            clock.sleepers.pop_first().map(|(_, sleeper)| sleeper)
                        },
                        _ => None,
                    }
                };
                let Some(sleeper) = due else {
                    break;
                };
                // The sleeping task may have been cancelled meanwhile
                let _ = sleeper.send(());
                settle().await;
            }

            let mut clock = self.lock();
            if clock.now < target {
                clock.now = target;
            }
        }

        /// Advance to the latest deadline currently scheduled
        ///
        /// Sleeps registered while flushing past that point (a repeating
        /// timer re-arming) stay pending.
        pub async fn flush(&self) {
            let (now, last) = {
                let clock = self.lock();
                let last = clock
                    .sleepers
                    .iter()
                    .filter(|(_, sleeper)| !sleeper.is_closed())
                    .map(|((deadline, _), _)| *deadline)
                    .max();
                (clock.now, last)
            };

            match last {
                Some(deadline) if deadline > now => self.advance(deadline - now).await,
                _ => self.advance(Duration::ZERO).await,
            }
        }
    }

    impl Timer for TestTimer {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            if duration.is_zero() {
                return future::ready(()).boxed();
            }

            let (tx, rx) = oneshot::channel();
            {
                let mut clock = self.lock();
                let deadline = clock.now + duration;
                let seq = clock.next_seq;
                clock.next_seq += 1;
                clock.sleepers.insert((deadline, seq), tx);
            }

            async move {
                // A dropped timer never fires
                if rx.await.is_err() {
                    future::pending::<()>().await;
                }
            }
            .boxed()
        }
    }

    impl fmt::Debug for TestTimer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("TestTimer")
                .field("now", &self.now())
                .field("pending_sleepers", &self.pending_sleepers())
                .finish()
        }
    }

    async fn settle() {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use crate::mocks::TestTimer;
    use std::fmt;
    use std::hash::Hash;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use unflow_core::Reducer;
    use unflow_runtime::Store;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records every action a store dispatches, in order
    ///
    /// # Example
    ///
    /// ```ignore
    /// let recorder = ActionRecorder::new();
    /// let store = Store::builder(state, reducer, env)
    ///     .on_action(recorder.observer())
    ///     .build();
    ///
    /// store.send(Input::Go);
    /// assert_eq!(recorder.actions(), vec![Action::A, Action::B, Action::C]);
    /// ```
    #[derive(Debug)]
    pub struct ActionRecorder<A> {
        actions: Arc<Mutex<Vec<A>>>,
    }

    impl<A> Clone for ActionRecorder<A> {
        fn clone(&self) -> Self {
            Self {
                actions: Arc::clone(&self.actions),
            }
        }
    }

    impl<A> Default for ActionRecorder<A> {
        fn default() -> Self {
            Self {
                actions: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl<A> ActionRecorder<A>
    where
        A: Clone + Send + 'static,
    {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Observer to pass to `StoreBuilder::on_action`
        #[must_use]
        pub fn observer(&self) -> impl Fn(&A) + Send + Sync + 'static {
            let actions = Arc::clone(&self.actions);
            move |action: &A| lock(&actions).push(action.clone())
        }

        /// Everything recorded so far
        #[must_use]
        pub fn actions(&self) -> Vec<A> {
            lock(&self.actions).clone()
        }

        /// Number of recorded actions
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.actions).len()
        }

        /// Whether nothing has been recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            lock(&self.actions).is_empty()
        }

        /// Forget everything recorded so far
        pub fn clear(&self) {
            lock(&self.actions).clear();
        }
    }

    /// Records the state after every reduce that changed it
    #[derive(Debug)]
    pub struct StateRecorder<S> {
        states: Arc<Mutex<Vec<S>>>,
    }

    impl<S> Clone for StateRecorder<S> {
        fn clone(&self) -> Self {
            Self {
                states: Arc::clone(&self.states),
            }
        }
    }

    impl<S> Default for StateRecorder<S> {
        fn default() -> Self {
            Self {
                states: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl<S> StateRecorder<S>
    where
        S: Clone + Send + 'static,
    {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Observer to pass to `StoreBuilder::on_state_change`
        #[must_use]
        pub fn observer(&self) -> impl Fn(&S, &S) + Send + Sync + 'static {
            let states = Arc::clone(&self.states);
            move |_before: &S, after: &S| lock(&states).push(after.clone())
        }

        /// Every recorded state, oldest first
        #[must_use]
        pub fn states(&self) -> Vec<S> {
            lock(&self.states).clone()
        }

        /// The most recent recorded state
        #[must_use]
        pub fn last(&self) -> Option<S> {
            lock(&self.states).last().cloned()
        }
    }

    /// A store wired to a [`TestTimer`] and both recorders
    pub struct RecordingStore<R: Reducer> {
        /// The store under test
        pub store: Store<R>,
        /// Virtual time driving the store's delayed effects
        pub timer: TestTimer,
        /// Every dispatched action
        pub actions: ActionRecorder<R::Action>,
        /// Every changed state
        pub states: StateRecorder<R::State>,
    }

    impl<R: Reducer> fmt::Debug for RecordingStore<R> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RecordingStore")
                .field("timer", &self.timer)
                .finish_non_exhaustive()
        }
    }

    /// Build a store with virtual time and recorders attached
    #[must_use]
    pub fn recording_store<R>(
        initial_state: R::State,
        reducer: R,
        environment: R::Environment,
    ) -> RecordingStore<R>
    where
        R: Reducer + Send + Sync + 'static,
        R::State: Clone + PartialEq + Send + 'static,
        R::Action: Clone + Send + 'static,
        R::CancelId: Clone + Eq + Hash + fmt::Debug + Send + 'static,
        R::Environment: Send + Sync + 'static,
    {
        recording_store_with_timer(TestTimer::new(), initial_state, reducer, environment)
    }

    /// [`recording_store`] with a timer the environment already holds
    ///
    /// Use this when operations sleep on the same virtual clock as the store.
    #[must_use]
    pub fn recording_store_with_timer<R>(
        timer: TestTimer,
        initial_state: R::State,
        reducer: R,
        environment: R::Environment,
    ) -> RecordingStore<R>
    where
        R: Reducer + Send + Sync + 'static,
        R::State: Clone + PartialEq + Send + 'static,
        R::Action: Clone + Send + 'static,
        R::CancelId: Clone + Eq + Hash + fmt::Debug + Send + 'static,
        R::Environment: Send + Sync + 'static,
    {
        let actions = ActionRecorder::new();
        let states = StateRecorder::new();

        let store = Store::builder(initial_state, reducer, environment)
            .timer(Arc::new(timer.clone()))
            .on_action(actions.observer())
            .on_state_change(states.observer())
            .build();

        RecordingStore {
            store,
            timer,
            actions,
            states,
        }
    }

    /// Install a test-friendly tracing subscriber
    ///
    /// Honors `RUST_LOG`, defaulting to `unflow_runtime=debug`. Safe to call
    /// from every test; only the first call installs anything.
    pub fn init_tracing() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "unflow_runtime=debug".into());

        // Already installed by an earlier test
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest
pub mod properties {
    use proptest::prelude::*;

    /// One step of a random slot workload
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SlotOp {
        /// Start keyed work in `slot`, taking `ticks` units of virtual time
        Start {
            /// Slot index
            slot: u8,
            /// Duration of the work in timer ticks
            ticks: u8,
        },
        /// Cancel whatever runs in `slot`
        Cancel {
            /// Slot index
            slot: u8,
        },
        /// Let `ticks` units of virtual time pass
        Wait {
            /// Ticks to advance
            ticks: u8,
        },
    }

    /// Random start/cancel/wait sequences over `slots` slots
    pub fn slot_ops(slots: u8, max_len: usize) -> impl Strategy<Value = Vec<SlotOp>> {
        let slots = slots.max(1);
        let op = prop_oneof![
            3 => (0..slots, 1..=5_u8).prop_map(|(slot, ticks)| SlotOp::Start { slot, ticks }),
            1 => (0..slots).prop_map(|slot| SlotOp::Cancel { slot }),
            1 => (0..=3_u8).prop_map(|ticks| SlotOp::Wait { ticks }),
        ];
        prop::collection::vec(op, 0..=max_len)
    }
}

pub use helpers::{
    recording_store, recording_store_with_timer, ActionRecorder, RecordingStore, StateRecorder,
};
pub use mocks::TestTimer;
pub use reducer_test::ReducerTest;
