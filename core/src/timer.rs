//! Injectable sleep provider.
//!
//! Every delayed or repeating effect waits through a [`Timer`], never through
//! a raw system sleep, so the same reducer logic runs against wall-clock time
//! in production and against virtual time in tests.

use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;

/// Sleep provider injected into the store
///
/// # Contract
///
/// The deadline is fixed when `sleep` is called, not when the returned future
/// is first polled. The runtime relies on this: it calls `sleep` while
/// interpreting an effect, and only later hands the future to a background
/// task.
///
/// # Examples
///
/// ```ignore
/// // Production - tokio's clock
/// let timer: Arc<dyn Timer> = Arc::new(SystemTimer);
///
/// // Test - virtual time driven by the test itself
/// let timer = TestTimer::new();
/// let store = Store::builder(state, reducer, env)
///     .timer(Arc::new(timer.clone()))
///     .build();
/// timer.advance(Duration::from_secs(1)).await;
/// ```
pub trait Timer: Send + Sync {
    /// Resolve once `duration` has elapsed
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock timer backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimer;

impl Timer for SystemTimer {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}
