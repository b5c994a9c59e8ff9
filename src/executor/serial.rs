use std::sync::Arc;

use async_trait::async_trait;

use super::{Executor, Task};
use crate::scope::Scope;

/// Runs work inline on the caller. The safe zero-configuration default: no
/// parallel resource use, guaranteed forward progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

#[async_trait]
impl Executor for SerialExecutor {
    async fn execute(&self, task: Task) {
        task.await;
    }

    fn child(&self) -> Arc<dyn Executor> {
        Arc::new(SerialExecutor)
    }

    async fn wait(&self, _scope: &Scope) {}
}
