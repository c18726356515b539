//! The seam between the pool runtime and the per-kind work.

use async_trait::async_trait;
use thiserror::Error;

use crate::bus::BusError;
use crate::legislative::LegislativeError;
use crate::model::ModelError;
use crate::probe::ProbeError;
use crate::store::StoreError;
use crate::task::{FailureKind, Outgoing, Task, TaskKind};

/// Per-delivery facts a handler may use to adjust behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskContext {
    /// 0-based attempt number carried by the task.
    pub attempt: u32,
    pub max_attempts: u32,
    /// How many times the bus has handed out this exact message.
    pub delivery_count: u32,
}

impl TaskContext {
    /// True when a retryable failure now would exhaust the task.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt + 1 >= self.max_attempts
    }

    pub fn has_attempts_left(&self) -> bool {
        !self.is_final_attempt()
    }
}

/// Handler failure taxonomy. Decides retry versus error topic.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Worth another attempt after backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying cannot help.
    #[error("permanent: {0}")]
    Permanent(String),

    /// The task decoded but its contents are unusable.
    #[error("malformed task: {0}")]
    Malformed(String),

    /// Pipeline state contradicts the readiness gate.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl HandlerError {
    pub fn transient(msg: impl Into<String>) -> Self {
        HandlerError::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        HandlerError::Permanent(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }

    /// How the failure is labelled on the error topic.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            HandlerError::Transient(_) => FailureKind::Exhausted,
            HandlerError::Permanent(_) => FailureKind::Permanent,
            HandlerError::Malformed(_) => FailureKind::Malformed,
            HandlerError::InvariantViolation(_) => FailureKind::InvariantViolation,
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        if e.is_retryable() {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

impl From<BusError> for HandlerError {
    fn from(e: BusError) -> Self {
        HandlerError::Transient(e.to_string())
    }
}

impl From<LegislativeError> for HandlerError {
    fn from(e: LegislativeError) -> Self {
        if e.is_retryable() {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

impl From<ModelError> for HandlerError {
    fn from(e: ModelError) -> Self {
        if e.is_retryable() {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

impl From<ProbeError> for HandlerError {
    fn from(e: ProbeError) -> Self {
        match e {
            ProbeError::InvalidUrl(_) => HandlerError::Permanent(e.to_string()),
            _ => HandlerError::Transient(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Permanent(format!("serialization: {}", e))
    }
}

/// Work for one task kind. Handlers must be idempotent: the bus delivers at
/// least once, and a retried task replays everything before the failure.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Do the work and return what to publish. Outputs are published only
    /// when the whole call succeeds.
    async fn handle(&self, task: &Task, ctx: &TaskContext) -> Result<Vec<Outgoing>, HandlerError>;
}
