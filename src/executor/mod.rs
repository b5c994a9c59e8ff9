mod bounded;
mod reentrant;
mod serial;
mod throttled;
mod unbounded;

pub use bounded::BoundedExecutor;
pub use reentrant::ReentrantExecutor;
pub use serial::SerialExecutor;
pub use throttled::ThrottledExecutor;
pub use unbounded::UnboundedExecutor;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::scope::Scope;

/// A unit of work submitted to an executor. Owned solely by the executor it
/// was submitted to until it completes.
pub type Task = BoxFuture<'static, ()>;

/// Runs submitted work under a concurrency policy and supports waiting for
/// all submitted work to complete.
///
/// None of the strategies recover panics; that responsibility belongs to the
/// fan-out layer, which isolates its callbacks before submission.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Enqueues `task` for execution. Returns without running the task for
    /// the concurrent strategies; the serial strategy runs it inline and the
    /// throttled strategy blocks the submitter while its cap is saturated.
    async fn execute(&self, task: Task);

    /// An executor that is safe to submit nested work to from inside a task
    /// running on this executor. Shares this executor's concurrency bound
    /// but drains a structurally separate queue; created lazily and cached,
    /// so every caller at the same nesting depth gets the same instance.
    /// The stateless serial strategy returns a fresh value instead, since
    /// its children are indistinguishable.
    fn child(&self) -> Arc<dyn Executor>;

    /// Resolves once every submitted task has completed, including tasks
    /// submitted while waiting, or once `scope` is cancelled, whichever
    /// comes first. Observing cancellation marks the executor cancelled so
    /// queued-but-unstarted work is skipped.
    async fn wait(&self, scope: &Scope);
}

/// Returns an executor for the requested concurrency: negative for
/// unbounded, zero for serial inline execution, positive for a bounded
/// executor draining at most that many tasks at once.
pub fn new_executor(max_concurrency: isize) -> Arc<dyn Executor> {
    if max_concurrency < 0 {
        Arc::new(UnboundedExecutor::new())
    } else if max_concurrency == 0 {
        Arc::new(SerialExecutor)
    } else {
        Arc::new(BoundedExecutor::new(max_concurrency as usize))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records the highest number of simultaneous holders of its guard.
    #[derive(Debug, Default)]
    pub(crate) struct ConcurrencyGauge {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    impl ConcurrencyGauge {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn enter(self: &Arc<Self>) -> GaugeGuard {
            let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            let mut max = self.max.load(Ordering::SeqCst);
            while current > max {
                match self.max.compare_exchange(
                    max,
                    current,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => break,
                    Err(actual) => max = actual,
                }
            }
            GaugeGuard(Arc::clone(self))
        }

        pub(crate) fn max(&self) -> usize {
            self.max.load(Ordering::SeqCst)
        }
    }

    pub(crate) struct GaugeGuard(Arc<ConcurrencyGauge>);

    impl Drop for GaugeGuard {
        fn drop(&mut self) {
            self.0.current.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
