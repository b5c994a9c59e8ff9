use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{JoinedError, PanicError, TaskError};
use crate::scope::Scope;

enum Outcome<From, To> {
    Done(From, To),
    Failed(TaskError),
}

/// Runs `processor` over `inputs` in parallel on the executor bound under
/// `executor_name`, applying `accumulate` to each (input, result) pair as
/// results arrive.
///
/// `accumulate` is applied by the single fan-in driver, so it never runs
/// concurrently with itself and may borrow caller state. The scope handed to
/// each `processor` call carries the executor's child bound under the same
/// name, so nested parallel calls make progress on a separate queue.
///
/// Errors returned by `processor` and panics recovered from either callback
/// are joined into the returned error. Cancelling `scope` stops admission of
/// further inputs and ends the final drain early; results applied before the
/// cancellation are kept, and cancellation alone is not an error.
pub async fn collect<I, From, To, P, Fut, A>(
    scope: &Scope,
    executor_name: &str,
    inputs: I,
    processor: P,
    mut accumulate: A,
) -> Result<(), JoinedError>
where
    I: IntoIterator<Item = From>,
    From: Clone + Send + 'static,
    To: Send + 'static,
    P: Fn(Scope, From) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<To, anyhow::Error>> + Send + 'static,
    A: FnMut(From, To),
{
    let (executor, task_scope) = scope.executor_scoped(executor_name);
    let processor = Arc::new(processor);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut joined = JoinedError::default();

    for input in inputs {
        // stop admitting new work once the scope is cancelled
        if scope.is_cancelled() {
            break;
        }
        // apply results that are already available, so a long input stream
        // does not buffer every outcome until submission finishes
        while let Ok(outcome) = rx.try_recv() {
            apply(&mut accumulate, &mut joined, outcome);
        }
        let tx = tx.clone();
        let processor = Arc::clone(&processor);
        let task_scope = task_scope.clone();
        executor
            .execute(Box::pin(async move {
                // we may have queued many tasks before cancellation
                if task_scope.is_cancelled() {
                    return;
                }
                let key = input.clone();
                let result = AssertUnwindSafe(async move { processor(task_scope, input).await })
                    .catch_unwind()
                    .await;
                let outcome = match result {
                    Ok(Ok(value)) => Outcome::Done(key, value),
                    Ok(Err(error)) => Outcome::Failed(TaskError::Failed(error)),
                    Err(payload) => Outcome::Failed(TaskError::Panicked(PanicError::new(
                        payload,
                        Backtrace::force_capture(),
                    ))),
                };
                let _ = tx.send(outcome);
            }))
            .await;
    }
    drop(tx);

    loop {
        tokio::select! {
            biased;
            outcome = rx.recv() => match outcome {
                Some(outcome) => apply(&mut accumulate, &mut joined, outcome),
                None => break,
            },
            _ = scope.cancelled() => break,
        }
    }

    if !joined.is_empty() {
        debug!(
            executor = executor_name,
            failures = joined.len(),
            "fan-out completed with failures"
        );
    }
    joined.into_result()
}

fn apply<From, To, A>(accumulate: &mut A, joined: &mut JoinedError, outcome: Outcome<From, To>)
where
    A: FnMut(From, To),
{
    match outcome {
        Outcome::Done(input, value) => {
            if let Err(payload) =
                std::panic::catch_unwind(AssertUnwindSafe(|| accumulate(input, value)))
            {
                joined.push(TaskError::Panicked(PanicError::new(
                    payload,
                    Backtrace::force_capture(),
                )));
            }
        }
        Outcome::Failed(error) => joined.push(error),
    }
}

/// Specialization of [`collect`] that appends results to `results`. Order
/// reflects completion order, not input order.
pub async fn collect_slice<I, From, To, P, Fut>(
    scope: &Scope,
    executor_name: &str,
    inputs: I,
    processor: P,
    results: &mut Vec<To>,
) -> Result<(), JoinedError>
where
    I: IntoIterator<Item = From>,
    From: Clone + Send + 'static,
    To: Send + 'static,
    P: Fn(Scope, From) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<To, anyhow::Error>> + Send + 'static,
{
    collect(scope, executor_name, inputs, processor, |_, value| {
        results.push(value)
    })
    .await
}

/// Specialization of [`collect`] that fills a map using each input as the
/// key for its result.
pub async fn collect_map<I, From, To, P, Fut>(
    scope: &Scope,
    executor_name: &str,
    inputs: I,
    processor: P,
    results: &mut HashMap<From, To>,
) -> Result<(), JoinedError>
where
    I: IntoIterator<Item = From>,
    From: Clone + Eq + Hash + Send + 'static,
    To: Send + 'static,
    P: Fn(Scope, From) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<To, anyhow::Error>> + Send + 'static,
{
    collect(scope, executor_name, inputs, processor, |key, value| {
        results.insert(key, value);
    })
    .await
}

/// Two-key variant of [`collect`]: inputs are pairs, and both halves are
/// handed to the processor and the accumulator.
pub async fn collect_pairs<I, K, V, To, P, Fut, A>(
    scope: &Scope,
    executor_name: &str,
    inputs: I,
    processor: P,
    mut accumulate: A,
) -> Result<(), JoinedError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
    To: Send + 'static,
    P: Fn(Scope, K, V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<To, anyhow::Error>> + Send + 'static,
    A: FnMut(K, V, To),
{
    collect(
        scope,
        executor_name,
        inputs,
        move |scope, (key, value)| processor(scope, key, value),
        |(key, value), to| accumulate(key, value, to),
    )
    .await
}

/// Runs every function in parallel on the named executor, joining any errors
/// they return or panics they raise.
pub async fn parallel<I, F, Fut>(
    scope: &Scope,
    executor_name: &str,
    funcs: I,
) -> Result<(), JoinedError>
where
    I: IntoIterator<Item = F>,
    F: FnOnce(Scope) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    let (executor, task_scope) = scope.executor_scoped(executor_name);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut joined = JoinedError::default();

    for func in funcs {
        if scope.is_cancelled() {
            break;
        }
        let tx = tx.clone();
        let task_scope = task_scope.clone();
        executor
            .execute(Box::pin(async move {
                if task_scope.is_cancelled() {
                    return;
                }
                let result = AssertUnwindSafe(async move { func(task_scope).await })
                    .catch_unwind()
                    .await;
                let error = match result {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => TaskError::Failed(error),
                    Err(payload) => {
                        TaskError::Panicked(PanicError::new(payload, Backtrace::force_capture()))
                    }
                };
                let _ = tx.send(error);
            }))
            .await;
    }
    drop(tx);

    loop {
        tokio::select! {
            biased;
            error = rx.recv() => match error {
                Some(error) => joined.push(error),
                None => break,
            },
            _ = scope.cancelled() => break,
        }
    }

    joined.into_result()
}
