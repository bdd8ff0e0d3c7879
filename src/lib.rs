//! # Adumuo
//!
//! Complaint lifecycle core for a municipal complaint desk: intake with year-scoped
//! reference codes (`MPM-2025-0042`), public status lookup, and staff-only status
//! changes, on PostgreSQL through the `may` coroutine runtime.
//!
//! Start with [`ComplaintService`]. It needs a [`ComplaintStore`]
//! ([`PgComplaintStore`] over a [`DbPool`], or [`MemoryStore`]) and an
//! [`AccessGate`].
//!
//! ```ignore
//! let config = AppConfig::load()?;
//! let pool = DbPool::new(&config.database)?;
//! schema::initialize_schema(&pool.acquire()?.executor())?;
//!
//! let gate = Arc::new(StaticTokenGate::new(&config.access.admin_tokens));
//! let service = ComplaintService::from_config(
//!     Arc::new(PgComplaintStore::new(pool)),
//!     gate,
//!     &config,
//! );
//! let complaint = service.create_complaint(
//!     "Aminah", "Drainage", "Blocked drain flooding the road", None, None,
//! )?;
//! ```

pub mod access;
pub mod allocator;
pub mod clock;
pub mod complaint;
pub mod config;
pub mod connection;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
pub mod schema;
pub mod store;
pub mod transaction;

pub use access::{AccessGate, AdminSessions, GateChain, Principal, StaticTokenGate, Unauthorized};
pub use allocator::ReferenceCode;
pub use clock::{Clock, ManualClock, SystemClock};
pub use complaint::{
    Complaint, ComplaintRecord, ComplaintStatusView, Coordinates, NewComplaint, Status,
};
pub use config::AppConfig;
pub use executor::{DbError, PgExecutor, SqlExecutor};
pub use lifecycle::{Audience, ComplaintError, ComplaintService, ValidationError};
pub use pool::{DbPool, PoolError};
pub use store::{ComplaintStore, ListOrder, MemoryStore, Page, PgComplaintStore, StoreError};
pub use transaction::Transaction;
