use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Executor, Task};
use crate::scope::Scope;
use crate::wait_group::{Done, WaitGroup};

/// Spawns one task per submission with no cap. Suitable when callers already
/// bound concurrency externally.
pub struct UnboundedExecutor {
    canceled: Arc<AtomicBool>,
    wg: Arc<WaitGroup>,
    child: RwLock<Option<Arc<UnboundedExecutor>>>,
}

impl UnboundedExecutor {
    pub fn new() -> Self {
        Self {
            canceled: Arc::new(AtomicBool::new(false)),
            wg: WaitGroup::new(),
            child: RwLock::new(None),
        }
    }
}

impl Default for UnboundedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for UnboundedExecutor {
    async fn execute(&self, task: Task) {
        self.wg.add(1);
        let done = Done(Arc::clone(&self.wg));
        let canceled = Arc::clone(&self.canceled);
        tokio::spawn(async move {
            let _done = done;
            if canceled.load(Ordering::Acquire) {
                return;
            }
            task.await;
        });
    }

    fn child(&self) -> Arc<dyn Executor> {
        if let Some(child) = self.child.read().expect("child lock poisoned").as_ref() {
            return Arc::clone(child) as Arc<dyn Executor>;
        }
        let mut slot = self.child.write().expect("child lock poisoned");
        let child = slot.get_or_insert_with(|| Arc::new(UnboundedExecutor::new()));
        Arc::clone(child) as Arc<dyn Executor>
    }

    async fn wait(&self, scope: &Scope) {
        tokio::select! {
            _ = scope.cancelled() => self.canceled.store(true, Ordering::Release),
            _ = self.wg.wait() => {}
        }
    }
}
