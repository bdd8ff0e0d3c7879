//! Complaint persistence.
//!
//! [`ComplaintStore`] is the one shared mutable resource in the system. Backends:
//! [`PgComplaintStore`] for PostgreSQL and [`MemoryStore`] for tests and single-process
//! deployments.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgComplaintStore;

use crate::allocator::{AllocationError, ReferenceCode, SequenceExhausted};
use crate::complaint::{Complaint, NewComplaint, Status, TransitionError};
use crate::executor::DbError;
use crate::pool::PoolError;
use crate::transaction::TransactionError;
use chrono::{DateTime, Utc};
use std::fmt;

/// Upper bound on a single listing read, whatever the caller asks for.
pub const MAX_LIST_LIMIT: u64 = 1000;

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Caps `limit` at `max` and at [`MAX_LIST_LIMIT`].
    pub fn clamped(self, max: u64) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.min(max).min(MAX_LIST_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Creation order, oldest first (public listing).
    Insertion,
    /// `created_at` descending, newest first (staff dashboard).
    NewestFirst,
}

/// A status write together with the status it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub previous: Status,
    pub complaint: Complaint,
}

#[derive(Debug)]
pub enum StoreError {
    /// A reference code collided with an existing row
    ConstraintViolation(String),
    /// The database aborted a transaction to keep concurrent writers consistent
    Conflict(String),
    /// The requested status change goes backwards
    Transition(TransitionError),
    /// The year's sequence cannot grow further
    SequenceExhausted(SequenceExhausted),
    /// A stored row could not be decoded
    Corrupt(String),
    Database(DbError),
    Pool(PoolError),
    /// The backend cannot serve requests (e.g. poisoned lock)
    Unavailable(String),
}

impl StoreError {
    /// Errors worth re-deriving the reference code and trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConstraintViolation(_) | StoreError::Conflict(_)
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConstraintViolation(msg) => write!(f, "Constraint violation: {msg}"),
            StoreError::Conflict(msg) => write!(f, "Concurrent update conflict: {msg}"),
            StoreError::Transition(e) => write!(f, "{e}"),
            StoreError::SequenceExhausted(e) => write!(f, "{e}"),
            StoreError::Corrupt(msg) => write!(f, "Corrupt complaint row: {msg}"),
            StoreError::Database(e) => write!(f, "{e}"),
            StoreError::Pool(e) => write!(f, "{e}"),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            StoreError::ConstraintViolation(err.to_string())
        } else if err.is_serialization_failure() {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::from(DbError::from(err))
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        StoreError::Pool(err)
    }
}

impl From<AllocationError> for StoreError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Database(e) => StoreError::from(e),
            AllocationError::Exhausted(e) => StoreError::SequenceExhausted(e),
        }
    }
}

impl From<SequenceExhausted> for StoreError {
    fn from(err: SequenceExhausted) -> Self {
        StoreError::SequenceExhausted(err)
    }
}

impl From<TransitionError> for StoreError {
    fn from(err: TransitionError) -> Self {
        StoreError::Transition(err)
    }
}

/// Durable complaint storage.
///
/// Every write is durable when the call returns and reads see the latest committed
/// state; nothing is cached in process.
pub trait ComplaintStore: Send + Sync {
    /// Allocates the next reference code for the year of `created_at` and inserts the
    /// complaint as `Pending` stamped with `created_at`, atomically.
    ///
    /// `attempt` starts at 1. Later attempts follow a retryable failure and ask the
    /// backend to re-derive the sequence from stored codes instead of trusting any
    /// cached counter.
    fn create(
        &self,
        created_at: DateTime<Utc>,
        complaint: &NewComplaint,
        attempt: u32,
    ) -> Result<Complaint, StoreError>;

    fn find_by_reference_code(&self, code: &ReferenceCode)
        -> Result<Option<Complaint>, StoreError>;

    /// Reads one page; `page.limit` is capped at [`MAX_LIST_LIMIT`].
    fn list(&self, page: Page, order: ListOrder) -> Result<Vec<Complaint>, StoreError>;

    /// Read-check-write of the status against the current row.
    ///
    /// `Ok(None)` when no complaint has `code`; [`StoreError::Transition`] when the
    /// move is illegal, in which case nothing is written.
    fn update_status(
        &self,
        code: &ReferenceCode,
        target: Status,
    ) -> Result<Option<StatusChange>, StoreError>;

    fn check_health(&self) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamp() {
        assert_eq!(Page::new(5, 50).clamped(1000), Page::new(5, 50));
        assert_eq!(Page::new(0, 5000).clamped(1000), Page::new(0, 1000));
        assert_eq!(Page::new(0, 5000).clamped(200), Page::new(0, 200));
        assert_eq!(Page::new(0, 5000).clamped(u64::MAX), Page::new(0, MAX_LIST_LIMIT));
    }

    #[test]
    fn test_store_error_classification() {
        let err = StoreError::from(DbError::Other(
            "duplicate key value violates unique constraint".to_string(),
        ));
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert!(err.is_retryable());

        let err = StoreError::from(DbError::Other(
            "could not serialize access due to concurrent update".to_string(),
        ));
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(err.is_retryable());

        let err = StoreError::from(DbError::QueryError("syntax error".to_string()));
        assert!(matches!(err, StoreError::Database(_)));
        assert!(!err.is_retryable());
    }
}
