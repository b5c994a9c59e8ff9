use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::executor::Executor;
use crate::wait_group::{Done, WaitGroup};

/// Fan-in decoupled from any single fan-out call: values are provided over
/// time and drained on demand. Only work submitted through [`provide`] is
/// tracked; unrelated work on the same executor is never waited on.
///
/// [`provide`]: Collector::provide
pub struct Collector<T> {
    executor: Arc<dyn Executor>,
    state: Arc<State<T>>,
}

struct State<T> {
    results: Mutex<Vec<T>>,
    wg: Arc<WaitGroup>,
}

impl<T: Send + 'static> Collector<T> {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            state: Arc::new(State {
                results: Mutex::new(Vec::new()),
                wg: WaitGroup::new(),
            }),
        }
    }

    /// Submits `producer` to the executor; its return value is appended to
    /// the pending results once it completes.
    pub async fn provide<F, Fut>(&self, producer: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.state.wg.add(1);
        let done = Done(Arc::clone(&self.state.wg));
        let state = Arc::clone(&self.state);
        self.executor
            .execute(Box::pin(async move {
                let _done = done;
                let value = producer().await;
                state
                    .results
                    .lock()
                    .expect("results lock poisoned")
                    .push(value);
            }))
            .await;
    }

    /// Waits for every outstanding producer, then drains and returns the
    /// accumulated results. Values are never returned twice: a subsequent
    /// call with no new providers returns an empty vector.
    pub async fn collect(&self) -> Vec<T> {
        self.state.wg.wait().await;
        std::mem::take(&mut *self.state.results.lock().expect("results lock poisoned"))
    }
}
