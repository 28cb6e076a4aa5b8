//! The store: reducer loop and effect interpreter.
//!
//! All state and registry mutation happens while holding the store's core
//! lock. That lock is the single serialized "main context": reducers,
//! registry updates and action dispatch never run concurrently with each
//! other. Operations run on spawned tokio tasks and re-acquire the lock only to
//! deliver their result.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::registry::{Completion, TaskEntry, TaskRegistry};
use futures::future::{self, BoxFuture, FutureExt};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use unflow_core::{Effect, Outcome, Reducer, SystemTimer, Timer, WrappedError};

/// Domain of the error reported when an operation panics
pub const OPERATION_PANICKED_DOMAIN: &str = "unflow.runtime";

type ActionObserver<A> = Box<dyn Fn(&A) + Send + Sync>;
type StateObserver<S> = Box<dyn Fn(&S, &S) + Send + Sync>;

type StoreEffect<R> = Effect<<R as Reducer>::Action, <R as Reducer>::CancelId>;

/// State and registry, guarded together by the core lock
struct Core<S, Id> {
    state: S,
    registry: TaskRegistry<Id>,
}

/// Keeps the pending-task count up while a spawned task is alive
struct PendingGuard(Arc<watch::Sender<usize>>);

impl PendingGuard {
    fn new(pending: &Arc<watch::Sender<usize>>) -> Self {
        pending.send_modify(|count| *count += 1);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// The Store - runtime coordinator for a reducer
///
/// The Store owns:
/// 1. State and the task registry (behind one lock, the main context)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
/// 4. The injected [`Timer`] every delayed or repeating effect waits on
///
/// Cloning a store is cheap and yields another handle to the same loop.
///
/// # Runtime
///
/// Entry points that interpret effects spawn tokio tasks, so they must be
/// called from within a Tokio runtime.
///
/// # Observers
///
/// Observer hooks run on the main context. They must not call back into the
/// store.
///
/// # Example
///
/// ```ignore
/// let store = Store::new(CounterState::default(), CounterReducer, env);
///
/// store.send(CounterInput::IncrementTapped);
/// store.wait_for_idle().await;
///
/// assert_eq!(store.state(|s| s.count), 1);
/// ```
pub struct Store<R: Reducer> {
    inner: Arc<Inner<R>>,
}

struct Inner<R: Reducer> {
    core: Mutex<Core<R::State, R::CancelId>>,
    reducer: R,
    environment: R::Environment,
    timer: Arc<dyn Timer>,
    config: StoreConfig,
    shutdown: AtomicBool,
    pending: Arc<watch::Sender<usize>>,
    action_broadcast: broadcast::Sender<R::Action>,
    on_action: Option<ActionObserver<R::Action>>,
    on_state_change: Option<StateObserver<R::State>>,
}

/// Builder for [`Store`]
///
/// Supplies the collaborators a store needs beyond the reducer itself. Every
/// one of them has a default.
pub struct StoreBuilder<R: Reducer> {
    state: R::State,
    reducer: R,
    environment: R::Environment,
    timer: Option<Arc<dyn Timer>>,
    config: StoreConfig,
    on_action: Option<ActionObserver<R::Action>>,
    on_state_change: Option<StateObserver<R::State>>,
}

impl<R> StoreBuilder<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Clone + PartialEq + Send + 'static,
    R::Action: Clone + Send + 'static,
    R::CancelId: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    R::Environment: Send + Sync + 'static,
{
    /// Inject the timer used by `SleepThen` and `Timer` effects
    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Use `config` instead of [`StoreConfig::default`]
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Observe every action just before it is reduced
    #[must_use]
    pub fn on_action<F>(mut self, observer: F) -> Self
    where
        F: Fn(&R::Action) + Send + Sync + 'static,
    {
        self.on_action = Some(Box::new(observer));
        self
    }

    /// Observe `(before, after)` whenever a reduce changes the state
    #[must_use]
    pub fn on_state_change<F>(mut self, observer: F) -> Self
    where
        F: Fn(&R::State, &R::State) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(observer));
        self
    }

    /// Build the store
    #[must_use]
    pub fn build(self) -> Store<R> {
        let (action_broadcast, _) = broadcast::channel(self.config.broadcast_capacity.max(1));
        let (pending, _) = watch::channel(0);

        Store {
            inner: Arc::new(Inner {
                core: Mutex::new(Core {
                    state: self.state,
                    registry: TaskRegistry::new(),
                }),
                reducer: self.reducer,
                environment: self.environment,
                timer: self.timer.unwrap_or_else(|| Arc::new(SystemTimer)),
                config: self.config,
                shutdown: AtomicBool::new(false),
                pending: Arc::new(pending),
                action_broadcast,
                on_action: self.on_action,
                on_state_change: self.on_state_change,
            }),
        }
    }
}

impl<R> Store<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Clone + PartialEq + Send + 'static,
    R::Action: Clone + Send + 'static,
    R::CancelId: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    R::Environment: Send + Sync + 'static,
{
    /// Create a store with the system timer and default configuration
    #[must_use]
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment) -> Self {
        Self::builder(initial_state, reducer, environment).build()
    }

    /// Start building a store with custom collaborators
    #[must_use]
    pub fn builder(
        initial_state: R::State,
        reducer: R,
        environment: R::Environment,
    ) -> StoreBuilder<R> {
        StoreBuilder {
            state: initial_state,
            reducer,
            environment,
            timer: None,
            config: StoreConfig::default(),
            on_action: None,
            on_state_change: None,
        }
    }

    /// Feed a raw input into the store
    ///
    /// The reducer's `transform` fans the input out into actions, which are
    /// dispatched in order. Each action's synchronous follow-ups are drained
    /// depth-first before the next action starts. Never suspends; background
    /// work is only launched.
    ///
    /// Inputs sent after [`shutdown`](Self::shutdown) has begun are dropped.
    #[tracing::instrument(skip(self, input), name = "store_send")]
    pub fn send(&self, input: R::Input) {
        if self.reject_if_shutting_down() {
            return;
        }

        let actions = self.inner.reducer.transform(input);
        if actions.is_empty() {
            tracing::trace!("Input produced no actions");
            return;
        }

        let mut core = self.inner.lock();
        for action in actions {
            self.inner.dispatch(&mut core, action, 0);
        }
    }

    /// Dispatch an action directly, bypassing `transform`
    #[tracing::instrument(skip(self, action), name = "store_perform")]
    pub fn perform(&self, action: R::Action) {
        if self.reject_if_shutting_down() {
            return;
        }

        let mut core = self.inner.lock();
        self.inner.dispatch(&mut core, action, 0);
    }

    fn reject_if_shutting_down(&self) -> bool {
        let shutting_down = self.is_shutting_down();
        if shutting_down {
            tracing::warn!("Rejected input: store is shutting down");
            metrics::counter!("store.shutdown.rejected_actions").increment(1);
        }
        shutting_down
    }

    /// Read current state via a closure
    ///
    /// ```ignore
    /// let count = store.state(|s| s.count);
    /// ```
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&R::State) -> T,
    {
        f(&self.inner.lock().state)
    }

    /// Clone of the current state
    #[must_use]
    pub fn snapshot(&self) -> R::State {
        self.inner.lock().state.clone()
    }

    /// Whether a task currently occupies `id`'s slot
    #[must_use]
    pub fn is_active(&self, id: &R::CancelId) -> bool {
        self.inner.lock().registry.contains(id)
    }

    /// Ids of every occupied slot, in no particular order
    #[must_use]
    pub fn active_ids(&self) -> Vec<R::CancelId> {
        self.inner.lock().registry.ids()
    }

    /// Number of occupied slots
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    /// Number of background tasks still alive, keyed or not
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Whether [`shutdown`](Self::shutdown) has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// The configuration this store was built with
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Subscribe to every action the store dispatches
    ///
    /// Each action is broadcast right after it has been reduced. A receiver
    /// that falls more than `broadcast_capacity` actions behind gets
    /// [`broadcast::error::RecvError::Lagged`].
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<R::Action> {
        self.inner.action_broadcast.subscribe()
    }

    /// Send an input and wait for a dispatched action matching `predicate`
    ///
    /// Subscribes before sending, so an action dispatched synchronously by
    /// the input itself is seen too.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] if nothing matched within `timeout`
    /// - [`StoreError::ChannelClosed`] if the broadcast channel closed
    pub async fn send_and_wait_for<F>(
        &self,
        input: R::Input,
        predicate: F,
        timeout: Duration,
    ) -> Result<R::Action, StoreError>
    where
        F: Fn(&R::Action) -> bool,
    {
        let mut rx = self.subscribe_actions();

        self.send(input);

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Action observer lagged, {} actions skipped", skipped);
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Resolve once no background task is alive
    ///
    /// A running repeating timer keeps the store busy until it is cancelled.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.inner.pending.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// [`wait_for_idle`](Self::wait_for_idle) with an upper bound
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if tasks were still alive after `timeout`.
    pub async fn wait_for_idle_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .map_err(|_| StoreError::Timeout)
    }

    /// Stop the store
    ///
    /// 1. Stops accepting input and launching tasks
    /// 2. Cancels every keyed task
    /// 3. Waits up to `timeout` for unkeyed tasks to finish
    /// 4. Aborts whatever is left
    ///
    /// Results delivered after shutdown has begun are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] with the number of tasks that
    /// were still alive when the timeout expired.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating graceful shutdown");
        metrics::counter!("store.shutdown.initiated").increment(1);

        self.inner.shutdown.store(true, Ordering::Release);

        let cancelled = self.inner.lock().registry.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled keyed tasks for shutdown");
            metrics::counter!("store.tasks.cancelled").increment(cancelled as u64);
        }

        if self.wait_for_idle_timeout(timeout).await.is_ok() {
            tracing::info!("All effects completed, shutdown successful");
            metrics::counter!("store.shutdown.completed").increment(1);
            return Ok(());
        }

        let pending = self.pending_effects();
        let aborted = self.inner.lock().registry.abort_detached();
        tracing::error!(
            pending_effects = pending,
            aborted,
            "Shutdown timeout: {} effects still running",
            pending
        );
        metrics::counter!("store.shutdown.timeout").increment(1);
        Err(StoreError::ShutdownTimeout(pending))
    }

    /// [`shutdown`](Self::shutdown) with the configured timeout
    ///
    /// # Errors
    ///
    /// See [`shutdown`](Self::shutdown).
    pub async fn shutdown_with_default_timeout(&self) -> Result<(), StoreError> {
        self.shutdown(self.inner.config.shutdown_timeout).await
    }
}

impl<R: Reducer> Clone for Store<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Reducer> fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("pending_effects", &*self.inner.pending.borrow())
            .field("shutdown", &self.inner.shutdown.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<R> Inner<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Clone + PartialEq + Send + 'static,
    R::Action: Clone + Send + 'static,
    R::CancelId: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    R::Environment: Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, Core<R::State, R::CancelId>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Reduce one action and interpret its effects, in order
    fn dispatch(
        self: &Arc<Self>,
        core: &mut Core<R::State, R::CancelId>,
        action: R::Action,
        depth: usize,
    ) {
        if depth > self.config.max_dispatch_depth {
            tracing::error!(
                depth,
                max_dispatch_depth = self.config.max_dispatch_depth,
                "Synchronous dispatch chain too deep, dropping action"
            );
            metrics::counter!("store.actions.dropped").increment(1);
            return;
        }

        metrics::counter!("store.actions.total").increment(1);

        if let Some(observer) = &self.on_action {
            observer(&action);
        }

        let broadcast = (self.action_broadcast.receiver_count() > 0).then(|| action.clone());
        let before = self.on_state_change.as_ref().map(|_| core.state.clone());

        let effects = self.reducer.reduce(&mut core.state, action, &self.environment);
        tracing::trace!(effects = effects.len(), depth, "Reducer completed");

        if let (Some(observer), Some(before)) = (&self.on_state_change, before) {
            if before != core.state {
                observer(&before, &core.state);
            }
        }

        if let Some(action) = broadcast {
            // No receivers left is not an error
            let _ = self.action_broadcast.send(action);
        }

        for effect in effects {
            self.interpret(core, effect, depth);
        }
    }

    fn interpret(
        self: &Arc<Self>,
        core: &mut Core<R::State, R::CancelId>,
        effect: StoreEffect<R>,
        depth: usize,
    ) {
        match effect {
            Effect::None => {
                metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            },
            Effect::Dispatch(action) => {
                metrics::counter!("store.effects.executed", "type" => "dispatch").increment(1);
                self.dispatch(core, action, depth + 1);
            },
            Effect::Cancel(id) => {
                metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                if core.registry.cancel(&id).is_some() {
                    tracing::debug!(id = ?id, "Cancelled task");
                    metrics::counter!("store.tasks.cancelled").increment(1);
                } else {
                    tracing::trace!(id = ?id, "Nothing to cancel");
                }
            },
            Effect::Concurrent(effects) => {
                metrics::counter!("store.effects.executed", "type" => "concurrent").increment(1);
                self.interpret_concurrent(core, effects, depth);
            },
            effect @ (Effect::Run { .. } | Effect::SleepThen { .. } | Effect::Timer { .. }) => {
                // Completion handles only matter inside `Concurrent`
                let _ = self.spawn_effect(core, effect);
            },
        }
    }

    /// Launch an async effect, returning its completion if a task started
    fn spawn_effect(
        self: &Arc<Self>,
        core: &mut Core<R::State, R::CancelId>,
        effect: StoreEffect<R>,
    ) -> Option<Completion> {
        match effect {
            Effect::Run { id, operation } => {
                metrics::counter!("store.effects.executed", "type" => "run").increment(1);
                let future = operation.into_future();
                let key = id.clone();
                self.spawn_task(core, id, move |store, token| async move {
                    let outcome = AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Outcome::Error(panic_error(&*payload)));
                    if let Some(store) = store.upgrade() {
                        store.complete(key.as_ref(), token, outcome);
                    }
                })
            },
            Effect::SleepThen {
                id,
                duration,
                action,
            } => {
                metrics::counter!("store.effects.executed", "type" => "sleep_then").increment(1);
                // The deadline is fixed now, not when the task first runs
                let sleep = self.timer.sleep(duration);
                let key = id.clone();
                self.spawn_task(core, id, move |store, token| async move {
                    sleep.await;
                    if let Some(store) = store.upgrade() {
                        store.complete(key.as_ref(), token, Outcome::Action(action));
                    }
                })
            },
            Effect::Timer {
                id,
                interval,
                action,
            } => {
                metrics::counter!("store.effects.executed", "type" => "timer").increment(1);
                if interval.is_zero() {
                    tracing::warn!(id = ?id, "Ignoring timer with a zero interval");
                    return None;
                }
                let sleep = self.timer.sleep(interval);
                let key = id.clone();
                self.spawn_task(core, id, move |store, token| async move {
                    let mut sleep = sleep;
                    loop {
                        sleep.await;
                        let Some(inner) = store.upgrade() else {
                            break;
                        };
                        match inner.tick(key.as_ref(), token, action.clone(), interval) {
                            Some(next) => sleep = next,
                            None => break,
                        }
                    }
                })
            },
            // Only async effects are routed here
            Effect::None | Effect::Dispatch(_) | Effect::Cancel(_) | Effect::Concurrent(_) => None,
        }
    }

    /// Spawn a background task, superseding whatever held `id`'s slot
    ///
    /// The new task waits for the superseded one to terminate before running
    /// `body`, and the registry points at the new task before this returns.
    fn spawn_task<F, Fut>(
        self: &Arc<Self>,
        core: &mut Core<R::State, R::CancelId>,
        id: Option<R::CancelId>,
        body: F,
    ) -> Option<Completion>
    where
        F: FnOnce(Weak<Self>, u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            tracing::debug!(id = ?id, "Store is shutting down, not starting task");
            return None;
        }

        let token = core.registry.next_token();
        let prior = id.as_ref().and_then(|id| core.registry.cancel(id));
        if prior.is_some() {
            tracing::debug!(id = ?id, "Superseding running task");
            metrics::counter!("store.tasks.superseded").increment(1);
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let done = done_rx.shared();
        let guard = PendingGuard::new(&self.pending);
        let task = body(Arc::downgrade(self), token);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let _done = done_tx;
            if let Some(prior) = prior {
                // Resolves with an error once the aborted task is dropped
                let _ = prior.done.await;
            }
            task.await;
        });
        let abort = handle.abort_handle();

        match id {
            Some(id) => {
                tracing::trace!(id = ?id, token, "Registered task");
                let entry = TaskEntry {
                    token,
                    abort,
                    done: done.clone(),
                };
                // The slot was emptied above
                let _ = core.registry.register(id, entry);
            },
            None => core.registry.track_detached(token, abort),
        }

        Some(done)
    }

    fn interpret_concurrent(
        self: &Arc<Self>,
        core: &mut Core<R::State, R::CancelId>,
        effects: Vec<StoreEffect<R>>,
        depth: usize,
    ) {
        let mut parallel = Vec::new();
        let mut rest = Vec::new();
        partition(effects, &mut parallel, &mut rest);

        let completions: Vec<Completion> = parallel
            .into_iter()
            .filter_map(|effect| self.spawn_effect(core, effect))
            .collect();

        if completions.is_empty() {
            for effect in rest {
                self.interpret(core, effect, depth);
            }
            return;
        }
        if rest.is_empty() {
            return;
        }

        // The rest run once every parallel task has terminated
        let token = core.registry.next_token();
        let guard = PendingGuard::new(&self.pending);
        let store = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            future::join_all(completions).await;
            if let Some(store) = store.upgrade() {
                store.resume(token, rest);
            }
        });
        core.registry.track_detached(token, handle.abort_handle());
    }

    /// Interpret effects held back by a `Concurrent` group
    fn resume(self: &Arc<Self>, token: u64, effects: Vec<StoreEffect<R>>) {
        let mut core = self.lock();
        if !core.registry.complete_detached(token) || self.is_shutting_down() {
            tracing::trace!("Discarding effects of an aborted concurrent group");
            return;
        }
        for effect in effects {
            self.interpret(&mut core, effect, 0);
        }
    }

    /// Deliver a finished task's outcome on the main context
    fn complete(self: &Arc<Self>, id: Option<&R::CancelId>, token: u64, outcome: Outcome<R::Action>) {
        let mut core = self.lock();

        let live = match id {
            Some(id) => core.registry.complete(id, token),
            None => core.registry.complete_detached(token),
        };
        if !live {
            tracing::trace!(id = ?id, token, "Discarding result of cancelled task");
            return;
        }
        if self.is_shutting_down() {
            tracing::debug!(id = ?id, "Store is shutting down, discarding task result");
            return;
        }

        match outcome {
            Outcome::Action(action) => self.dispatch(&mut core, action, 0),
            Outcome::None => tracing::trace!(id = ?id, "Task finished without an action"),
            Outcome::Error(error) if error.is_cancellation() => {
                tracing::debug!(id = ?id, "Operation reported cancellation");
                metrics::counter!("store.operations.cancelled").increment(1);
            },
            Outcome::Error(error) => {
                tracing::warn!(
                    id = ?id,
                    domain = error.domain(),
                    code = error.code(),
                    error = %error,
                    "Operation failed"
                );
                metrics::counter!("store.operations.failed").increment(1);
                if let Some(action) = self.reducer.handle_error(error, &self.environment) {
                    self.dispatch(&mut core, action, 0);
                }
            },
        }
    }

    /// Deliver one timer tick; returns the next sleep while the timer is live
    fn tick(
        self: &Arc<Self>,
        id: Option<&R::CancelId>,
        token: u64,
        action: R::Action,
        interval: Duration,
    ) -> Option<BoxFuture<'static, ()>> {
        let mut core = self.lock();
        if !self.timer_is_live(&core, id, token) {
            return None;
        }

        tracing::trace!(id = ?id, "Timer tick");
        self.dispatch(&mut core, action, 0);

        // The tick itself may have cancelled the timer
        if !self.timer_is_live(&core, id, token) {
            return None;
        }
        Some(self.timer.sleep(interval))
    }

    fn timer_is_live(
        &self,
        core: &Core<R::State, R::CancelId>,
        id: Option<&R::CancelId>,
        token: u64,
    ) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        match id {
            Some(id) => core.registry.is_current(id, token),
            None => core.registry.is_detached(token),
        }
    }
}

/// Split a `Concurrent` group into async effects and the rest, flattening
/// nested groups
fn partition<A, Id>(
    effects: Vec<Effect<A, Id>>,
    parallel: &mut Vec<Effect<A, Id>>,
    rest: &mut Vec<Effect<A, Id>>,
) where
    A: Send + 'static,
{
    for effect in effects {
        match effect {
            Effect::Concurrent(nested) => partition(nested, parallel, rest),
            effect if effect.is_async() => parallel.push(effect),
            effect => rest.push(effect),
        }
    }
}

fn panic_error(payload: &(dyn Any + Send)) -> WrappedError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string());

    tracing::error!(message = %message, "Operation panicked");
    WrappedError::new(message, 1, OPERATION_PANICKED_DOMAIN).with_type_name("panic")
}
