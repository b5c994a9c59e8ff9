//! Concurrency toolkit: pluggable executor strategies, scope-bound executor
//! lookup with deadlock-safe child substitution, and fan-out/fan-in
//! primitives that aggregate results, errors, and recovered panics into a
//! single outcome.
//!
//! A caller binds named executors into a [`Scope`], hands the scope to
//! parallel operations like [`collect`], and the operation fans work out to
//! the named executor while funneling results back through an accumulator
//! that is never run concurrently with itself. Nested parallel calls looking
//! up the same name receive a child executor, so a bounded executor is never
//! re-entered by work it is currently running.
//!
//! ```no_run
//! use fanout::{collect_map, new_executor, Scope};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let scope = Scope::new().with_executor("cpu", new_executor(4));
//!
//! let mut squares = std::collections::HashMap::new();
//! collect_map(
//!     &scope,
//!     "cpu",
//!     0..64,
//!     |_scope, n: u64| async move { Ok(n * n) },
//!     &mut squares,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod collect;
pub mod collector;
pub mod errors;
pub mod executor;
pub mod scope;

mod wait_group;

pub use collect::{collect, collect_map, collect_pairs, collect_slice, parallel};
pub use collector::Collector;
pub use errors::{JoinedError, PanicError, TaskError};
pub use executor::{
    new_executor, BoundedExecutor, Executor, ReentrantExecutor, SerialExecutor, Task,
    ThrottledExecutor, UnboundedExecutor,
};
pub use scope::Scope;
