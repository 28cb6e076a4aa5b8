//! Cancellation, supersession and error routing.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use unflow_core::{
    smallvec, Cancelled, DomainError, Effect, Effects, Outcome, Reducer, SmallVec, Timer,
    WrappedError,
};
use unflow_runtime::StoreError;
use unflow_testing::properties::{slot_ops, SlotOp};
use unflow_testing::{recording_store_with_timer, RecordingStore, TestTimer};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
struct JobState {
    loaded: Vec<u32>,
    failures: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
enum JobAction {
    Fetch { value: u32, millis: u64 },
    FetchNow(u32),
    Loaded(u32),
    CancelFetch,
    CancelTwice,
    ThrowCancelled,
    ThrowRequestCancelled,
    ThrowDomainCancelled,
    ThrowFailure,
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Job {
    Fetch,
}

/// A client error that knows its protocol status
#[derive(Debug, thiserror::Error)]
enum HttpError {
    #[error("request cancelled by client")]
    Cancelled,
}

impl DomainError for HttpError {
    fn domain(&self) -> &str {
        WrappedError::REQUEST_CANCELLED_DOMAIN
    }

    fn code(&self) -> i64 {
        WrappedError::REQUEST_CANCELLED_CODE
    }

    fn context(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("url".to_string(), "https://example.test".to_string())])
    }
}

struct JobEnv {
    timer: TestTimer,
    errors: Arc<Mutex<Vec<WrappedError>>>,
}

fn after<A: Send + 'static>(
    timer: &TestTimer,
    duration: Duration,
    action: A,
) -> impl Future<Output = Option<A>> + Send + 'static {
    let sleep = timer.sleep(duration);
    async move {
        sleep.await;
        Some(action)
    }
}

struct JobReducer;

impl Reducer for JobReducer {
    type State = JobState;
    type Input = JobAction;
    type Action = JobAction;
    type CancelId = Job;
    type Environment = JobEnv;

    fn transform(&self, input: JobAction) -> SmallVec<[JobAction; 4]> {
        smallvec![input]
    }

    fn reduce(
        &self,
        state: &mut JobState,
        action: JobAction,
        env: &JobEnv,
    ) -> Effects<JobAction, Job> {
        match action {
            JobAction::Fetch { value, millis } => smallvec![Effect::run_cancellable(
                Job::Fetch,
                after(
                    &env.timer,
                    Duration::from_millis(millis),
                    JobAction::Loaded(value)
                )
            )],
            JobAction::FetchNow(value) => smallvec![Effect::run_cancellable(
                Job::Fetch,
                async move { Some(JobAction::Loaded(value)) }
            )],
            JobAction::Loaded(value) => {
                state.loaded.push(value);
                smallvec![Effect::None]
            },
            JobAction::CancelFetch => smallvec![Effect::cancel(Job::Fetch)],
            JobAction::CancelTwice => {
                smallvec![Effect::cancel(Job::Fetch), Effect::cancel(Job::Fetch)]
            },
            JobAction::ThrowCancelled => {
                smallvec![Effect::try_run(async { Err::<Option<JobAction>, _>(Cancelled) })]
            },
            JobAction::ThrowRequestCancelled => {
                smallvec![Effect::fail(WrappedError::request_cancelled())]
            },
            JobAction::ThrowDomainCancelled => smallvec![Effect::run_outcome(None, async {
                Outcome::Error(WrappedError::from_domain(&HttpError::Cancelled))
            })],
            JobAction::ThrowFailure => smallvec![Effect::try_run(async {
                Err::<Option<JobAction>, _>(std::io::Error::other("disk on fire"))
            })],
            JobAction::Failed(description) => {
                state.failures.push(description);
                smallvec![Effect::None]
            },
        }
    }

    fn handle_error(&self, error: WrappedError, env: &JobEnv) -> Option<JobAction> {
        let description = error.description().to_string();
        env.errors.lock().unwrap().push(error);
        Some(JobAction::Failed(description))
    }
}

struct Jobs {
    harness: RecordingStore<JobReducer>,
    errors: Arc<Mutex<Vec<WrappedError>>>,
}

fn jobs() -> Jobs {
    let timer = TestTimer::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let harness = recording_store_with_timer(
        timer.clone(),
        JobState::default(),
        JobReducer,
        JobEnv {
            timer,
            errors: Arc::clone(&errors),
        },
    );
    Jobs { harness, errors }
}

// ============================================================================
// Supersession and cancellation
// ============================================================================

#[tokio::test]
async fn test_superseded_task_never_delivers() -> Result<(), StoreError> {
    let jobs = jobs();
    let store = &jobs.harness.store;

    // The first task is ready but has not run yet when it is replaced
    store.send(JobAction::FetchNow(1));
    store.send(JobAction::FetchNow(2));
    assert_eq!(store.active_count(), 1);

    store.wait_for_idle_timeout(Duration::from_secs(1)).await?;

    assert_eq!(store.state(|s| s.loaded.clone()), vec![2]);
    Ok(())
}

#[tokio::test]
async fn test_superseded_slow_task_never_delivers() {
    let jobs = jobs();
    let store = &jobs.harness.store;
    let timer = &jobs.harness.timer;

    store.send(JobAction::Fetch {
        value: 1,
        millis: 1000,
    });
    timer.advance(Duration::from_millis(500)).await;
    store.send(JobAction::Fetch {
        value: 2,
        millis: 2000,
    });

    // Past the first task's deadline
    timer.advance(Duration::from_millis(1000)).await;
    assert!(store.state(|s| s.loaded.is_empty()));

    timer.advance(Duration::from_millis(1000)).await;
    assert_eq!(store.state(|s| s.loaded.clone()), vec![2]);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let jobs = jobs();
    let store = &jobs.harness.store;
    let timer = &jobs.harness.timer;

    // Nothing running: both cancels are no-ops
    store.send(JobAction::CancelTwice);
    assert_eq!(store.active_count(), 0);
    assert_eq!(jobs.harness.actions.actions(), vec![JobAction::CancelTwice]);

    store.send(JobAction::Fetch {
        value: 7,
        millis: 100,
    });
    assert!(store.is_active(&Job::Fetch));

    store.send(JobAction::CancelTwice);
    assert!(!store.is_active(&Job::Fetch));

    timer.advance(Duration::from_secs(1)).await;
    assert!(store.state(|s| s.loaded.is_empty()));
    assert_eq!(store.pending_effects(), 0);
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() -> Result<(), StoreError> {
    let jobs = jobs();
    let store = &jobs.harness.store;

    store.send(JobAction::FetchNow(3));
    store.wait_for_idle_timeout(Duration::from_secs(1)).await?;
    store.send(JobAction::CancelFetch);

    assert_eq!(store.state(|s| s.loaded.clone()), vec![3]);
    assert_eq!(store.active_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancel_before_delivery_drops_result() -> Result<(), StoreError> {
    let jobs = jobs();
    let store = &jobs.harness.store;

    store.send(JobAction::FetchNow(5));
    store.send(JobAction::CancelFetch);
    store.wait_for_idle_timeout(Duration::from_secs(1)).await?;

    assert!(store.state(|s| s.loaded.is_empty()));
    Ok(())
}

// ============================================================================
// Error routing
// ============================================================================

#[tokio::test]
async fn test_cancellation_errors_are_swallowed() -> Result<(), StoreError> {
    let jobs = jobs();
    let store = &jobs.harness.store;

    store.send(JobAction::ThrowCancelled);
    store.send(JobAction::ThrowRequestCancelled);
    store.send(JobAction::ThrowDomainCancelled);
    store.wait_for_idle_timeout(Duration::from_secs(1)).await?;

    assert!(jobs.errors.lock().unwrap().is_empty());
    assert!(store.state(|s| s.failures.is_empty()));
    assert_eq!(
        jobs.harness.actions.actions(),
        vec![
            JobAction::ThrowCancelled,
            JobAction::ThrowRequestCancelled,
            JobAction::ThrowDomainCancelled,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_failure_reaches_handle_error_once() -> Result<(), StoreError> {
    let jobs = jobs();
    let store = &jobs.harness.store;

    store.send(JobAction::ThrowFailure);
    store.wait_for_idle_timeout(Duration::from_secs(1)).await?;

    let errors = jobs.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].description(), "disk on fire");
    assert!(!errors[0].is_cancellation());

    assert_eq!(
        jobs.harness.actions.actions(),
        vec![
            JobAction::ThrowFailure,
            JobAction::Failed("disk on fire".to_string()),
        ]
    );
    assert_eq!(
        store.state(|s| s.failures.clone()),
        vec!["disk on fire".to_string()]
    );
    Ok(())
}

// ============================================================================
// At most one task per slot
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
struct SlotState {
    latest: HashMap<u8, u64>,
    next_seq: u64,
    delivered: u32,
    stale: u32,
}

#[derive(Clone, Debug, PartialEq)]
enum SlotAction {
    Start { slot: u8, ticks: u8 },
    Cancel { slot: u8 },
    Done { slot: u8, seq: u64 },
}

const TICK: Duration = Duration::from_millis(100);

struct SlotReducer;

impl Reducer for SlotReducer {
    type State = SlotState;
    type Input = SlotAction;
    type Action = SlotAction;
    type CancelId = u8;
    type Environment = TestTimer;

    fn transform(&self, input: SlotAction) -> SmallVec<[SlotAction; 4]> {
        smallvec![input]
    }

    fn reduce(
        &self,
        state: &mut SlotState,
        action: SlotAction,
        timer: &TestTimer,
    ) -> Effects<SlotAction, u8> {
        match action {
            SlotAction::Start { slot, ticks } => {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.latest.insert(slot, seq);
                smallvec![Effect::run_cancellable(
                    slot,
                    after(timer, TICK * u32::from(ticks), SlotAction::Done { slot, seq })
                )]
            },
            SlotAction::Cancel { slot } => {
                state.latest.remove(&slot);
                smallvec![Effect::cancel(slot)]
            },
            SlotAction::Done { slot, seq } => {
                if state.latest.get(&slot) == Some(&seq) {
                    state.latest.remove(&slot);
                    state.delivered += 1;
                } else {
                    state.stale += 1;
                }
                smallvec![Effect::None]
            },
        }
    }
}

async fn check_slot_workload(ops: Vec<SlotOp>) -> Result<(), TestCaseError> {
    let timer = TestTimer::new();
    let harness =
        recording_store_with_timer(timer.clone(), SlotState::default(), SlotReducer, timer);
    let store = &harness.store;

    for op in ops {
        match op {
            SlotOp::Start { slot, ticks } => store.send(SlotAction::Start { slot, ticks }),
            SlotOp::Cancel { slot } => store.send(SlotAction::Cancel { slot }),
            SlotOp::Wait { ticks } => harness.timer.advance(TICK * u32::from(ticks)).await,
        }

        // Let aborted tasks unwind
        harness.timer.advance(Duration::ZERO).await;

        let state = store.snapshot();
        prop_assert_eq!(state.stale, 0, "a cancelled or superseded task delivered");
        prop_assert_eq!(store.active_count(), state.latest.len());
        prop_assert_eq!(store.pending_effects(), store.active_count());

        let mut active = store.active_ids();
        let before = active.len();
        active.sort_unstable();
        active.dedup();
        prop_assert_eq!(active.len(), before);
    }

    harness.timer.flush().await;
    prop_assert_eq!(store.active_count(), 0);
    prop_assert_eq!(store.pending_effects(), 0);
    prop_assert_eq!(store.state(|s| s.stale), 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_at_most_one_task_per_slot(ops in slot_ops(3, 24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        runtime.block_on(check_slot_workload(ops))?;
    }
}
