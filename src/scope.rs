use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::executor::{Executor, SerialExecutor};

/// Carries cancellation and named executor bindings through a tree of
/// parallel calls. Cloning is cheap; executor bindings are copy-on-write, so
/// a scope handed to nested work is read-only from the parent's perspective.
#[derive(Clone, Default)]
pub struct Scope {
    cancel: CancellationToken,
    executors: Arc<HashMap<String, Arc<dyn Executor>>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A derived scope whose cancellation is tied to this one: cancelling the
    /// parent cancels the child, not the reverse.
    pub fn child(&self) -> Scope {
        Scope {
            cancel: self.cancel.child_token(),
            executors: Arc::clone(&self.executors),
        }
    }

    /// Cancels this scope and its descendants. Cooperative: running work is
    /// not interrupted, but admission of new work stops and waiters return.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once this scope is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Binds `executor` under `name` for the returned scope and its
    /// descendants.
    pub fn with_executor(&self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Scope {
        let mut executors = (*self.executors).clone();
        executors.insert(name.into(), executor);
        Scope {
            cancel: self.cancel.clone(),
            executors: Arc::new(executors),
        }
    }

    /// The executor bound under `name`, or a serial executor when none is
    /// bound, so lookups always make progress without parallel resource use.
    pub fn executor(&self, name: &str) -> Arc<dyn Executor> {
        match self.executors.get(name) {
            Some(executor) => Arc::clone(executor),
            None => {
                debug!(name, "no executor bound, falling back to serial");
                Arc::new(SerialExecutor)
            }
        }
    }

    /// Whether an executor is bound under `name`, without fallback
    /// substitution.
    pub fn has_executor(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Looks up `name` for the purpose of submitting nested work: returns the
    /// bound executor together with a scope that has the executor's child
    /// bound in its place. Work running on the returned executor that looks
    /// up the same name through the returned scope gets a structurally
    /// separate queue, so a bounded executor is never re-entered by a task it
    /// is currently draining. Unbound names resolve to the serial fallback
    /// with the scope unchanged.
    pub fn executor_scoped(&self, name: &str) -> (Arc<dyn Executor>, Scope) {
        if !self.has_executor(name) {
            // the serial fallback needs no substitution, and binding it would
            // make the name look configured to nested work
            return (self.executor(name), self.clone());
        }
        let executor = self.executor(name);
        let scope = self.with_executor(name, executor.child());
        (executor, scope)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancelled", &self.is_cancelled())
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
