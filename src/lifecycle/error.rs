use super::validation::ValidationError;
use crate::access::Unauthorized;
use crate::complaint::{Status, TransitionError};
use crate::store::StoreError;
use std::fmt;

/// Errors returned to the boundary layer.
///
/// Storage failures are collapsed into [`ComplaintError::Storage`]; their detail goes to
/// the log, not to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplaintError {
    Validation(ValidationError),
    NotFound(String),
    Unauthorized,
    InvalidStatus(String),
    IllegalTransition { from: Status, to: Status },
    /// Reference code collisions persisted through every retry. Transient.
    AllocationExhausted { attempts: u32 },
    Storage,
}

impl ComplaintError {
    /// Whether the caller can fix the request and resend it.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ComplaintError::Storage | ComplaintError::AllocationExhausted { .. }
        )
    }
}

impl fmt::Display for ComplaintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplaintError::Validation(e) => write!(f, "{e}"),
            ComplaintError::NotFound(code) => write!(f, "Complaint not found: {code}"),
            ComplaintError::Unauthorized => write!(f, "Unauthorized"),
            ComplaintError::InvalidStatus(status) => write!(
                f,
                "Invalid status {status:?}; expected one of Pending, Assigned, Resolved"
            ),
            ComplaintError::IllegalTransition { from, to } => {
                write!(f, "Cannot change status from {from} to {to}")
            }
            ComplaintError::AllocationExhausted { attempts } => write!(
                f,
                "Could not assign a reference code after {attempts} attempts, try again"
            ),
            ComplaintError::Storage => write!(f, "Internal storage error"),
        }
    }
}

impl std::error::Error for ComplaintError {}

impl From<ValidationError> for ComplaintError {
    fn from(err: ValidationError) -> Self {
        ComplaintError::Validation(err)
    }
}

impl From<Unauthorized> for ComplaintError {
    fn from(_: Unauthorized) -> Self {
        ComplaintError::Unauthorized
    }
}

impl From<TransitionError> for ComplaintError {
    fn from(err: TransitionError) -> Self {
        ComplaintError::IllegalTransition {
            from: err.from,
            to: err.to,
        }
    }
}

impl From<StoreError> for ComplaintError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transition(e) => e.into(),
            other => {
                log::error!("Complaint store failure: {}", other);
                ComplaintError::Storage
            }
        }
    }
}
