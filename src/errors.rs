use std::any::Any;
use std::fmt;

use thiserror::Error;

/// An error synthesized from a recovered panic, carrying the panic payload
/// and the backtrace captured at the recovery point. A panic whose value was
/// itself an error keeps it: [`source`] yields the original error.
///
/// [`source`]: std::error::Error::source
#[derive(Debug, Error)]
#[error("panic: {payload} at:\n{backtrace}")]
pub struct PanicError {
    payload: String,
    backtrace: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl PanicError {
    /// Wraps a payload recovered from `catch_unwind`.
    pub fn new(payload: Box<dyn Any + Send>, backtrace: std::backtrace::Backtrace) -> Self {
        let backtrace = backtrace.to_string();
        match payload.downcast::<anyhow::Error>() {
            Ok(error) => Self {
                payload: format!("{error:#}"),
                backtrace,
                source: Some(*error),
            },
            Err(payload) => Self {
                payload: payload_message(payload.as_ref()),
                backtrace,
                source: None,
            },
        }
    }

    /// The panic payload, rendered as a string.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The backtrace captured when the panic was recovered.
    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }

    /// The original error, when the panic value was one.
    pub fn original_error(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<opaque panic payload>".to_string()
    }
}

/// A single failed unit of work within a parallel operation.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A processing function returned an error.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// A processing or accumulation function panicked.
    #[error(transparent)]
    Panicked(#[from] PanicError),
}

/// Aggregates every per-item failure from one fan-out operation. No failure
/// is swallowed: callers can inspect the individual causes via [`errors`].
///
/// [`errors`]: JoinedError::errors
#[derive(Debug, Default)]
pub struct JoinedError {
    errors: Vec<TaskError>,
}

impl JoinedError {
    pub(crate) fn push(&mut self, error: TaskError) {
        self.errors.push(error);
    }

    /// `Ok` when no task failed, otherwise the aggregate.
    pub(crate) fn into_result(self) -> Result<(), JoinedError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// The individual underlying errors.
    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TaskError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for JoinedError {}
