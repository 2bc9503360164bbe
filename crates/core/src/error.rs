//! Error taxonomy for the patient-flow engine.
//!
//! Every fallible operation in the engine returns [`FlowResult`]. The
//! variants map one-to-one onto the failure classes callers are expected to
//! handle differently: validation failures are final, conflicts carry the
//! competing resources, concurrency failures are retried once, and storage
//! failures propagate unchanged.

use crate::ids::{AppointmentId, VisitId};
use crate::queue::QueueStatus;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Input violated a named constraint. Not retryable.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A requested appointment overlaps existing active appointments.
    ///
    /// Carries the ids of the conflicting appointments so the caller can
    /// display them or ask for alternatives.
    #[error("appointment overlaps {} existing appointment(s)", conflicts.len())]
    Conflict { conflicts: Vec<AppointmentId> },

    /// The visit already has a queue entry; a visit is queued at most once.
    #[error("visit {visit} is already in the queue")]
    DuplicateQueueEntry { visit: VisitId },

    /// The requested queue status change is not in the transition table.
    #[error("cannot move queue entry from '{from}' to '{to}'")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },

    /// A referenced record does not exist (or does not satisfy a required
    /// filter, e.g. an inactive staff member looked up as a doctor).
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// `call_next` was invoked with no waiting patients.
    #[error("no patients are waiting in the queue")]
    EmptyQueue,

    /// A lost update was detected on a claim or recalculation. Callers
    /// should retry once; a repeat failure is surfaced as transient.
    #[error("concurrent update detected: {0}")]
    Concurrency(String),

    /// An unexpected persistence failure. Fatal for the current request.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;

impl From<flow_types::PrimitiveError> for FlowError {
    fn from(err: flow_types::PrimitiveError) -> Self {
        FlowError::Validation(err.to_string())
    }
}
