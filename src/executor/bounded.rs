use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use tracing::trace;

use super::{Executor, Task};
use crate::scope::Scope;
use crate::wait_group::{Done, WaitGroup};

/// Queue-driven bounded executor: submission enqueues in O(1) without
/// blocking the submitter, and at most `max_concurrency` drainer tasks work
/// the queue at any time.
pub struct BoundedExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    max_concurrency: usize,
    executing: AtomicUsize,
    queue: SegQueue<Task>,
    wg: Arc<WaitGroup>,
    canceled: Arc<AtomicBool>,
    child: RwLock<Option<Arc<BoundedExecutor>>>,
}

impl BoundedExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrency: max_concurrency.max(1),
                executing: AtomicUsize::new(0),
                queue: SegQueue::new(),
                wg: WaitGroup::new(),
                canceled: Arc::new(AtomicBool::new(false)),
                child: RwLock::new(None),
            }),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }
}

#[async_trait]
impl Executor for BoundedExecutor {
    async fn execute(&self, task: Task) {
        let inner = &self.inner;
        if inner.canceled.load(Ordering::Acquire) {
            return;
        }
        inner.wg.add(1);
        let done = Done(Arc::clone(&inner.wg));
        let canceled = Arc::clone(&inner.canceled);
        inner.queue.push(Box::pin(async move {
            let _done = done;
            if canceled.load(Ordering::Acquire) {
                return;
            }
            task.await;
        }));
        if inner.executing.load(Ordering::Acquire) < inner.max_concurrency {
            spawn_drain(Arc::clone(inner));
        }
    }

    fn child(&self) -> Arc<dyn Executor> {
        if let Some(child) = self
            .inner
            .child
            .read()
            .expect("child lock poisoned")
            .as_ref()
        {
            return Arc::clone(child) as Arc<dyn Executor>;
        }
        let mut slot = self.inner.child.write().expect("child lock poisoned");
        let child = slot
            .get_or_insert_with(|| Arc::new(BoundedExecutor::new(self.inner.max_concurrency)));
        Arc::clone(child) as Arc<dyn Executor>
    }

    async fn wait(&self, scope: &Scope) {
        tokio::select! {
            _ = scope.cancelled() => self.inner.canceled.store(true, Ordering::Release),
            _ = self.inner.wg.wait() => {}
        }
    }
}

fn spawn_drain(inner: Arc<Inner>) {
    tokio::spawn(drain(inner));
}

async fn drain(inner: Arc<Inner>) {
    if inner.executing.fetch_add(1, Ordering::SeqCst) + 1 > inner.max_concurrency {
        // a racing submission already started enough drainers
        inner.executing.fetch_sub(1, Ordering::SeqCst);
        return;
    }
    trace!(max = inner.max_concurrency, "drainer started");
    while let Some(task) = inner.queue.pop() {
        task.await;
    }
    inner.executing.fetch_sub(1, Ordering::SeqCst);
    // a push can land between the final pop and the decrement above; restart
    // so it is not stranded until the next submission
    if !inner.queue.is_empty() && inner.executing.load(Ordering::Acquire) < inner.max_concurrency {
        spawn_drain(inner);
    } else {
        trace!("drainer exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ConcurrencyGauge;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn run_bound_check(max_concurrency: usize, count: usize) {
        let executor = BoundedExecutor::new(max_concurrency);
        let gauge = ConcurrencyGauge::new();
        let executed = Arc::new(AtomicUsize::new(0));

        for _ in 0..count {
            let gauge = Arc::clone(&gauge);
            let executed = Arc::clone(&executed);
            executor
                .execute(Box::pin(async move {
                    let _guard = gauge.enter();
                    executed.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(1)).await;
                }))
                .await;
        }
        executor.wait(&Scope::new()).await;

        assert_eq!(executed.load(Ordering::SeqCst), count);
        assert!(gauge.max() >= 1);
        assert!(
            gauge.max() <= executor.max_concurrency(),
            "observed {} concurrent tasks with a bound of {}",
            gauge.max(),
            executor.max_concurrency()
        );
    }

    #[test]
    fn zero_bound_is_clamped_to_one() {
        assert_eq!(BoundedExecutor::new(0).max_concurrency(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn single_drainer_respects_bound() {
        run_bound_check(1, 100).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dual_drainers_respect_bound() {
        run_bound_check(2, 200).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ten_drainers_respect_bound() {
        run_bound_check(10, 500).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tasks_submitted_from_running_work_are_waited_on() {
        let executor = Arc::new(BoundedExecutor::new(2));
        let executed = Arc::new(AtomicUsize::new(0));

        let nested_executor = Arc::clone(&executor);
        let nested_executed = Arc::clone(&executed);
        executor
            .execute(Box::pin(async move {
                nested_executed.fetch_add(1, Ordering::SeqCst);
                let executed = Arc::clone(&nested_executed);
                nested_executor
                    .execute(Box::pin(async move {
                        executed.fetch_add(1, Ordering::SeqCst);
                    }))
                    .await;
            }))
            .await;

        executor.wait(&Scope::new()).await;
        assert_eq!(executed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_returns_early_on_cancellation() {
        let executor = BoundedExecutor::new(1);
        executor
            .execute(Box::pin(async {
                sleep(Duration::from_secs(30)).await;
            }))
            .await;

        let scope = Scope::new();
        scope.cancel();
        tokio::time::timeout(Duration::from_secs(1), executor.wait(&scope))
            .await
            .expect("wait should return once the scope is cancelled");
    }

    #[test]
    fn child_is_created_once_and_shared() {
        let executor = BoundedExecutor::new(3);
        let first = executor.child();
        let second = executor.child();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
