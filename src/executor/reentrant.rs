use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Executor, Task};
use crate::scope::Scope;

static NEXT_MARKER: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Marker ids of every reentrant wrapper whose dispatch the current task
    /// is running inside of.
    static ACTIVE_MARKERS: Vec<u64>;
}

/// Wraps a delegate executor so that work submitted from inside this
/// wrapper's own dispatch runs inline on the current task instead of being
/// queued. Queuing it could deadlock a bounded delegate whose only free slot
/// is held by the very task making the inner submission.
///
/// Each wrapper instance has its own marker identity: nested submissions
/// through a different wrapper around the same delegate are queued normally,
/// so independent call sites can share one underlying bounded executor
/// without falsely inlining each other's work.
pub struct ReentrantExecutor {
    marker: u64,
    delegate: Arc<dyn Executor>,
}

impl ReentrantExecutor {
    pub fn new(delegate: Arc<dyn Executor>) -> Self {
        Self {
            marker: NEXT_MARKER.fetch_add(1, Ordering::Relaxed),
            delegate,
        }
    }

    fn current_markers() -> Vec<u64> {
        ACTIVE_MARKERS
            .try_with(|markers| markers.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Executor for ReentrantExecutor {
    async fn execute(&self, task: Task) {
        if Self::current_markers().contains(&self.marker) {
            // already inside our own dispatch
            task.await;
            return;
        }
        let marker = self.marker;
        self.delegate
            .execute(Box::pin(async move {
                // resolve the ambient markers where the task actually runs: a
                // task queued onto an independent drainer must not inherit the
                // submitter's dispatch path
                let mut markers = Self::current_markers();
                markers.push(marker);
                ACTIVE_MARKERS.scope(markers, task).await;
            }))
            .await;
    }

    fn child(&self) -> Arc<dyn Executor> {
        Arc::new(ReentrantExecutor::new(self.delegate.child()))
    }

    async fn wait(&self, scope: &Scope) {
        self.delegate.wait(scope).await;
    }
}
