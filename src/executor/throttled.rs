use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::warn;

use super::{Executor, Task};
use crate::scope::Scope;
use crate::wait_group::{Done, WaitGroup};

/// Semaphore-limited bounded executor: once `max_concurrency` tasks are in
/// flight, submission blocks the producer instead of growing a queue,
/// trading queue growth for backpressure.
pub struct ThrottledExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
    wg: Arc<WaitGroup>,
    canceled: Arc<AtomicBool>,
    child: RwLock<Option<Arc<ThrottledExecutor>>>,
}

impl ThrottledExecutor {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                max_concurrency,
                semaphore: Arc::new(Semaphore::new(max_concurrency)),
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
impl Executor for ThrottledExecutor {
    async fn execute(&self, task: Task) {
        self.inner.wg.add(1);
        let done = Done(Arc::clone(&self.inner.wg));
        let permit = match Arc::clone(&self.inner.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("semaphore closed, dropping task");
                return;
            }
        };
        let canceled = Arc::clone(&self.inner.canceled);
        tokio::spawn(async move {
            let _done = done;
            let _permit = permit;
            if canceled.load(Ordering::Acquire) {
                return;
            }
            task.await;
        });
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
            .get_or_insert_with(|| Arc::new(ThrottledExecutor::new(self.inner.max_concurrency)));
        Arc::clone(child) as Arc<dyn Executor>
    }

    async fn wait(&self, scope: &Scope) {
        tokio::select! {
            _ = scope.cancelled() => self.inner.canceled.store(true, Ordering::Release),
            _ = self.inner.wg.wait() => {}
        }
    }
}
