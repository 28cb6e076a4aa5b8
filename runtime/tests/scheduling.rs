//! Ordering and timing of interpreted effects.
//!
//! Every test drives time through a `TestTimer`, so nothing here waits on the
//! wall clock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::future::Future;
use std::time::Duration;
use unflow_core::{smallvec, Effect, Effects, Reducer, SmallVec, Timer};
use unflow_runtime::StoreError;
use unflow_testing::{recording_store_with_timer, RecordingStore, TestTimer};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
struct LabState {
    count: i64,
    fast: bool,
    slow: bool,
    fired: u32,
    submitted: u32,
}

#[derive(Clone, Debug, PartialEq)]
enum LabAction {
    A,
    B,
    C,
    D,
    Race,
    RaceThenReport,
    FastDone,
    SlowDone,
    AllDone,
    Delay,
    Fired,
    Increment,
    IncrementCompleted,
    StartClock,
    Tick,
    StopClock,
    Typed,
    Submit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Task {
    Slow,
    Fast,
    Delay,
    Clock,
    Search,
}

struct LabEnv {
    timer: TestTimer,
}

impl LabEnv {
    /// Operation that resolves to `action` after `duration` of virtual time
    fn after(
        &self,
        duration: Duration,
        action: LabAction,
    ) -> impl Future<Output = Option<LabAction>> + Send + 'static {
        let sleep = self.timer.sleep(duration);
        async move {
            sleep.await;
            Some(action)
        }
    }
}

struct LabReducer;

impl Reducer for LabReducer {
    type State = LabState;
    type Input = LabAction;
    type Action = LabAction;
    type CancelId = Task;
    type Environment = LabEnv;

    fn transform(&self, input: LabAction) -> SmallVec<[LabAction; 4]> {
        smallvec![input]
    }

    fn reduce(
        &self,
        state: &mut LabState,
        action: LabAction,
        env: &LabEnv,
    ) -> Effects<LabAction, Task> {
        match action {
            LabAction::A => smallvec![
                Effect::send(LabAction::B),
                Effect::run(async { Some(LabAction::D) }),
            ],
            LabAction::B => smallvec![Effect::send(LabAction::C)],
            LabAction::C | LabAction::D | LabAction::AllDone => {
                state.count += 1;
                smallvec![Effect::None]
            },
            LabAction::Race => smallvec![Effect::concurrent(vec![
                Effect::run_cancellable(
                    Task::Slow,
                    env.after(Duration::from_secs(2), LabAction::SlowDone)
                ),
                Effect::run_cancellable(
                    Task::Fast,
                    env.after(Duration::from_secs(1), LabAction::FastDone)
                ),
            ])],
            LabAction::RaceThenReport => smallvec![Effect::concurrent(vec![
                Effect::run(env.after(Duration::from_secs(2), LabAction::SlowDone)),
                Effect::send(LabAction::AllDone),
                Effect::run(env.after(Duration::from_secs(1), LabAction::FastDone)),
            ])],
            LabAction::FastDone => {
                state.fast = true;
                smallvec![Effect::None]
            },
            LabAction::SlowDone => {
                state.slow = true;
                smallvec![Effect::None]
            },
            LabAction::Delay => smallvec![Effect::sleep_then(
                Some(Task::Delay),
                Duration::from_secs(1),
                LabAction::Fired
            )],
            LabAction::Fired => {
                state.fired += 1;
                smallvec![Effect::None]
            },
            LabAction::Increment => {
                state.count += 1;
                smallvec![Effect::run(async { Some(LabAction::IncrementCompleted) })]
            },
            LabAction::IncrementCompleted => smallvec![Effect::None],
            LabAction::StartClock => smallvec![Effect::timer(
                Some(Task::Clock),
                Duration::from_secs(1),
                LabAction::Tick
            )],
            LabAction::Tick => {
                state.count += 1;
                smallvec![Effect::None]
            },
            LabAction::StopClock => smallvec![Effect::cancel(Task::Clock)],
            LabAction::Typed => smallvec![Effect::debounce(
                Task::Search,
                Duration::from_millis(300),
                LabAction::Submit
            )],
            LabAction::Submit => {
                state.submitted += 1;
                smallvec![Effect::None]
            },
        }
    }
}

fn lab() -> RecordingStore<LabReducer> {
    let timer = TestTimer::new();
    recording_store_with_timer(
        timer.clone(),
        LabState::default(),
        LabReducer,
        LabEnv { timer },
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_synchronous_chain_drains_before_async_work() -> Result<(), StoreError> {
    let lab = lab();

    lab.store.send(LabAction::A);

    // send() returned: the chain is fully drained, the async sibling is not
    assert_eq!(
        lab.actions.actions(),
        vec![LabAction::A, LabAction::B, LabAction::C]
    );
    assert_eq!(lab.store.state(|s| s.count), 1);

    lab.store.wait_for_idle_timeout(Duration::from_secs(1)).await?;

    assert_eq!(
        lab.actions.actions(),
        vec![LabAction::A, LabAction::B, LabAction::C, LabAction::D]
    );
    assert_eq!(lab.store.state(|s| s.count), 2);
    Ok(())
}

#[tokio::test]
async fn test_counter_increment_round_trip() -> Result<(), StoreError> {
    let lab = lab();

    lab.store.send(LabAction::Increment);
    lab.store.wait_for_idle_timeout(Duration::from_secs(1)).await?;

    assert_eq!(
        lab.actions.actions(),
        vec![LabAction::Increment, LabAction::IncrementCompleted]
    );
    assert_eq!(lab.store.state(|s| s.count), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_branches_deliver_in_completion_order() {
    let lab = lab();

    lab.store.send(LabAction::Race);
    assert_eq!(lab.store.active_count(), 2);

    lab.timer.advance(Duration::from_secs(1)).await;
    assert_eq!(
        lab.store.state(|s| (s.fast, s.slow)),
        (true, false),
        "the faster branch lands first despite being declared second"
    );

    lab.timer.advance(Duration::from_secs(1)).await;
    assert_eq!(lab.store.state(|s| (s.fast, s.slow)), (true, true));
    assert_eq!(
        lab.actions.actions(),
        vec![LabAction::Race, LabAction::FastDone, LabAction::SlowDone]
    );

    // Two separate reduce passes, one per branch
    assert_eq!(lab.states.states().len(), 2);
    assert_eq!(lab.store.active_count(), 0);
}

#[tokio::test]
async fn test_concurrent_rest_runs_after_parallel_work() {
    let lab = lab();

    lab.store.send(LabAction::RaceThenReport);
    assert_eq!(lab.actions.actions(), vec![LabAction::RaceThenReport]);

    lab.timer.advance(Duration::from_secs(1)).await;
    assert_eq!(lab.store.state(|s| s.count), 0);

    lab.timer.advance(Duration::from_secs(1)).await;
    assert_eq!(
        lab.actions.actions(),
        vec![
            LabAction::RaceThenReport,
            LabAction::FastDone,
            LabAction::SlowDone,
            LabAction::AllDone,
        ]
    );
    assert_eq!(lab.store.state(|s| s.count), 1);
}

#[tokio::test]
async fn test_sleep_then_waits_for_virtual_time() {
    let lab = lab();

    lab.store.send(LabAction::Delay);
    assert!(lab.store.is_active(&Task::Delay));

    lab.timer.advance(Duration::from_millis(500)).await;
    assert_eq!(lab.store.state(|s| s.fired), 0);
    assert!(!lab.actions.actions().contains(&LabAction::Fired));

    lab.timer.advance(Duration::from_millis(500)).await;
    assert_eq!(lab.store.state(|s| s.fired), 1);
    assert!(!lab.store.is_active(&Task::Delay));
}

#[tokio::test]
async fn test_sleep_then_fires_once_past_deadline() {
    let lab = lab();

    lab.store.send(LabAction::Delay);
    lab.timer.advance(Duration::from_secs(3)).await;

    assert_eq!(lab.store.state(|s| s.fired), 1);
    assert_eq!(lab.timer.now(), Duration::from_secs(3));
}

#[tokio::test]
async fn test_timer_ticks_until_cancelled() -> Result<(), StoreError> {
    let lab = lab();

    lab.store.send(LabAction::StartClock);
    lab.timer.advance(Duration::from_secs(3)).await;
    assert_eq!(lab.store.state(|s| s.count), 3);
    assert!(lab.store.is_active(&Task::Clock));

    lab.store.send(LabAction::StopClock);
    assert!(!lab.store.is_active(&Task::Clock));

    lab.timer.advance(Duration::from_secs(5)).await;
    assert_eq!(lab.store.state(|s| s.count), 3);

    lab.store.wait_for_idle_timeout(Duration::from_secs(1)).await?;
    assert_eq!(lab.store.pending_effects(), 0);
    Ok(())
}

#[tokio::test]
async fn test_restarting_timer_resets_its_phase() {
    let lab = lab();

    lab.store.send(LabAction::StartClock);
    lab.timer.advance(Duration::from_millis(700)).await;

    // Restart under the same id: the next tick is a full interval away
    lab.store.send(LabAction::StartClock);
    lab.timer.advance(Duration::from_millis(700)).await;
    assert_eq!(lab.store.state(|s| s.count), 0);

    lab.timer.advance(Duration::from_millis(300)).await;
    assert_eq!(lab.store.state(|s| s.count), 1);
    assert_eq!(lab.store.active_ids(), vec![Task::Clock]);
}

#[tokio::test]
async fn test_debounce_restarts_on_each_input() {
    let lab = lab();

    lab.store.send(LabAction::Typed);
    lab.timer.advance(Duration::from_millis(200)).await;
    lab.store.send(LabAction::Typed);
    lab.timer.advance(Duration::from_millis(200)).await;

    assert_eq!(lab.store.state(|s| s.submitted), 0);

    lab.timer.advance(Duration::from_millis(100)).await;
    assert_eq!(lab.store.state(|s| s.submitted), 1);

    lab.timer.advance(Duration::from_secs(1)).await;
    assert_eq!(lab.store.state(|s| s.submitted), 1);
}

#[tokio::test]
async fn test_flush_drains_scheduled_delays() {
    let lab = lab();

    lab.store.send(LabAction::Race);
    lab.store.send(LabAction::Delay);
    lab.timer.flush().await;

    assert_eq!(
        lab.store.state(|s| (s.fast, s.slow, s.fired)),
        (true, true, 1)
    );
    assert_eq!(lab.store.active_count(), 0);
}
