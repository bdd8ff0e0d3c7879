//! Complaint records and the shapes handed to the boundary layer.

pub mod status;

pub use status::{Status, TransitionError, UnknownStatus};

use crate::allocator::ReferenceCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Intake data for a complaint, before it has a code.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NewComplaint {
    pub citizen_name: String,
    pub category: String,
    pub description: String,
    pub image_reference: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// A stored complaint.
///
/// Latitude and longitude are kept apart so rows written before pairing was enforced
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Complaint {
    pub id: i64,
    pub reference_code: ReferenceCode,
    pub citizen_name: String,
    pub category: String,
    pub description: String,
    pub image_reference: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl Complaint {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

/// Full representation for staff listings and creation responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplaintRecord {
    pub id: i64,
    pub reference_code: ReferenceCode,
    pub citizen_name: String,
    pub category: String,
    pub description: String,
    pub image_reference: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl From<Complaint> for ComplaintRecord {
    fn from(c: Complaint) -> Self {
        Self {
            id: c.id,
            reference_code: c.reference_code,
            citizen_name: c.citizen_name,
            category: c.category,
            description: c.description,
            image_reference: c.image_reference,
            latitude: c.latitude,
            longitude: c.longitude,
            status: c.status,
            created_at: c.created_at,
        }
    }
}

/// Public status lookup; leaves out the surrogate id and the location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplaintStatusView {
    pub reference_code: ReferenceCode,
    pub citizen_name: String,
    pub category: String,
    pub description: String,
    pub image_reference: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl From<Complaint> for ComplaintStatusView {
    fn from(c: Complaint) -> Self {
        Self {
            reference_code: c.reference_code,
            citizen_name: c.citizen_name,
            category: c.category,
            description: c.description,
            image_reference: c.image_reference,
            status: c.status,
            created_at: c.created_at,
        }
    }
}
