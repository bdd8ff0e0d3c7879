//! Intake validation.

use crate::complaint::{Coordinates, NewComplaint};
use std::fmt;

pub const MAX_CITIZEN_NAME_LEN: usize = 255;
pub const MAX_CATEGORY_LEN: usize = 100;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MAX_IMAGE_REFERENCE_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// Every field problem found in one request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid complaint")?;
        for (i, v) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} {}", v.field, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Whitespace-only counts as missing. Lengths are counted on the value as given.
fn required_text(errors: &mut ValidationError, field: &'static str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.push(field, "is required");
    } else if value.chars().count() > max {
        errors.push(field, format!("must be at most {max} characters"));
    }
}

/// Checks `input` and returns the record to store.
///
/// Text is stored exactly as submitted. The one rewrite is the image reference: a
/// blank one means no image and comes back as `None`.
pub fn validate_new_complaint(input: &NewComplaint) -> Result<NewComplaint, ValidationError> {
    let mut errors = ValidationError::default();

    required_text(
        &mut errors,
        "citizen_name",
        &input.citizen_name,
        MAX_CITIZEN_NAME_LEN,
    );
    required_text(&mut errors, "category", &input.category, MAX_CATEGORY_LEN);

    if input.description.trim().is_empty() {
        errors.push("description", "is required");
    } else if input.description.chars().count() < MIN_DESCRIPTION_LEN {
        errors.push(
            "description",
            format!("must be at least {MIN_DESCRIPTION_LEN} characters"),
        );
    }

    let image_reference = input
        .image_reference
        .clone()
        .filter(|s| !s.trim().is_empty());
    if let Some(image) = &image_reference {
        if image.chars().count() > MAX_IMAGE_REFERENCE_LEN {
            errors.push(
                "image_reference",
                format!("must be at most {MAX_IMAGE_REFERENCE_LEN} characters"),
            );
        }
    }

    if let Some(Coordinates {
        latitude,
        longitude,
    }) = input.coordinates
    {
        if !(-90.0..=90.0).contains(&latitude) {
            errors.push("latitude", "must be between -90 and 90");
        }
        if !(-180.0..=180.0).contains(&longitude) {
            errors.push("longitude", "must be between -180 and 180");
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewComplaint {
        image_reference,
        ..input.clone()
    })
}

/// Pairs independently supplied latitude and longitude. Either both or neither.
pub fn pair_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<Coordinates>, ValidationError> {
    let mut errors = ValidationError::default();
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => return Ok(Some(Coordinates::new(lat, lon))),
        (None, None) => return Ok(None),
        (Some(_), None) => errors.push("longitude", "is required when latitude is given"),
        (None, Some(_)) => errors.push("latitude", "is required when longitude is given"),
    }
    Err(errors)
}
