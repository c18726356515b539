//! Generic worker pool runtime.
//!
//! One pool per task kind. A pool pulls deliveries from its kind's topic,
//! runs up to `concurrency_limit` handlers at once, and settles each delivery
//! in one of three ways: publish the handler's outputs, requeue the task with
//! a bumped attempt after a backoff, or route it to the error topic.

mod config;
mod handler;
mod runner;
mod types;

pub use config::PoolConfig;
pub use handler::{HandlerError, TaskContext, TaskHandler};
pub use runner::WorkerPool;
pub use types::PoolStatus;
