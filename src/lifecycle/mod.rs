//! Complaint lifecycle: intake, lookup, listing and status changes.
//!
//! [`ComplaintService`] is the only entry point the boundary layer needs. It validates
//! input before touching the store, retries reference-code collisions a bounded number
//! of times, and gates every staff-only operation through an [`AccessGate`].

pub mod error;
pub mod validation;

pub use error::ComplaintError;
pub use validation::{pair_coordinates, validate_new_complaint, FieldViolation, ValidationError};

use crate::access::{AccessGate, Principal};
use crate::allocator::ReferenceCode;
use crate::clock::{Clock, SystemClock};
use crate::complaint::{Complaint, ComplaintStatusView, Coordinates, NewComplaint, Status};
use crate::config::{AppConfig, ListingConfig};
use crate::store::{ComplaintStore, ListOrder, Page};
use chrono::Datelike;
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Who is asking for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    /// Anyone; complaints come back in creation order.
    Public,
    /// Staff dashboard, newest first. Carries the caller's bearer token.
    Admin(&'a str),
}

pub struct ComplaintService {
    store: Arc<dyn ComplaintStore>,
    gate: Arc<dyn AccessGate>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    listing: ListingConfig,
}

impl ComplaintService {
    pub fn new(store: Arc<dyn ComplaintStore>, gate: Arc<dyn AccessGate>) -> Self {
        let config = AppConfig::default();
        Self {
            store,
            gate,
            clock: Arc::new(SystemClock),
            max_attempts: config.allocation.max_attempts,
            listing: config.listing,
        }
    }

    pub fn from_config(
        store: Arc<dyn ComplaintStore>,
        gate: Arc<dyn AccessGate>,
        config: &AppConfig,
    ) -> Self {
        Self::new(store, gate)
            .with_max_attempts(config.allocation.max_attempts)
            .with_listing(config.listing.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_listing(mut self, listing: ListingConfig) -> Self {
        self.listing = listing;
        self
    }

    /// First page at the configured default size.
    pub fn default_page(&self) -> Page {
        Page::new(0, self.listing.default_limit)
    }

    /// Records a new complaint as `Pending` under a fresh reference code.
    pub fn create_complaint(
        &self,
        citizen_name: &str,
        category: &str,
        description: &str,
        image_reference: Option<&str>,
        coordinates: Option<Coordinates>,
    ) -> Result<Complaint, ComplaintError> {
        self.submit(&NewComplaint {
            citizen_name: citizen_name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            image_reference: image_reference.map(str::to_string),
            coordinates,
        })
    }

    /// Same as [`create_complaint`](Self::create_complaint) for an already assembled
    /// intake record.
    pub fn submit(&self, input: &NewComplaint) -> Result<Complaint, ComplaintError> {
        let checked = validate_new_complaint(input)?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::create_complaint_span(&checked.category).entered();

        // One instant for both the code's year and the stored timestamp.
        let created_at = self.clock.now();
        let year = created_at.year();
        for attempt in 1..=self.max_attempts {
            match self.store.create(created_at, &checked, attempt) {
                Ok(complaint) => {
                    #[cfg(feature = "metrics")]
                    METRICS.record_complaint_created();
                    log::info!(
                        "Complaint {} created (category: {})",
                        complaint.reference_code,
                        complaint.category
                    );
                    return Ok(complaint);
                }
                Err(err) if err.is_retryable() => {
                    #[cfg(feature = "metrics")]
                    METRICS.record_allocation_retry();
                    log::warn!(
                        "Reference code allocation attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_attempts,
                        year,
                        err
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        log::error!(
            "Giving up on reference code allocation for {} after {} attempts",
            year,
            self.max_attempts
        );
        Err(ComplaintError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Public status lookup. Codes that are not well formed cannot exist and are
    /// reported as not found.
    pub fn get_status(&self, code: &str) -> Result<ComplaintStatusView, ComplaintError> {
        let parsed = Self::parse_code(code)?;
        self.store
            .find_by_reference_code(&parsed)?
            .map(ComplaintStatusView::from)
            .ok_or_else(|| ComplaintError::NotFound(code.to_string()))
    }

    pub fn list_complaints(
        &self,
        page: Page,
        audience: Audience<'_>,
    ) -> Result<Vec<Complaint>, ComplaintError> {
        let order = match audience {
            Audience::Public => ListOrder::Insertion,
            Audience::Admin(token) => {
                self.authenticate(token)?;
                ListOrder::NewestFirst
            }
        };
        let page = page.clamped(self.listing.max_limit);
        Ok(self.store.list(page, order)?)
    }

    /// Staff-only status change.
    ///
    /// Checks run in a fixed order: credential, status literal, existence, transition.
    /// Nothing is written unless all of them pass.
    pub fn update_status(
        &self,
        code: &str,
        new_status: &str,
        caller_token: &str,
    ) -> Result<Complaint, ComplaintError> {
        let principal = self.authenticate(caller_token)?;
        let target: Status = new_status
            .parse()
            .map_err(|_| ComplaintError::InvalidStatus(new_status.to_string()))?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::update_status_span(code, target.as_str()).entered();

        let parsed = Self::parse_code(code)?;
        let change = self
            .store
            .update_status(&parsed, target)?
            .ok_or_else(|| ComplaintError::NotFound(code.to_string()))?;

        #[cfg(feature = "metrics")]
        METRICS.record_status_update(target.as_str());
        log::info!(
            "audit: {} changed complaint {} status {} -> {}",
            principal,
            parsed,
            change.previous,
            change.complaint.status
        );
        Ok(change.complaint)
    }

    pub fn check_health(&self) -> bool {
        match self.store.check_health() {
            Ok(healthy) => healthy,
            Err(err) => {
                log::error!("Complaint store health check failed: {}", err);
                false
            }
        }
    }

    fn authenticate(&self, token: &str) -> Result<Principal, ComplaintError> {
        self.gate.authenticate(token).map_err(|e| {
            log::warn!("Rejected staff request: {}", e);
            ComplaintError::from(e)
        })
    }

    fn parse_code(code: &str) -> Result<ReferenceCode, ComplaintError> {
        ReferenceCode::parse(code).ok_or_else(|| ComplaintError::NotFound(code.to_string()))
    }
}
