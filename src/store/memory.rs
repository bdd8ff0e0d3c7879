//! In-process complaint store.
//!
//! All state sits behind one `may` mutex, so code derivation and insertion form a
//! single critical section: concurrent creators always see each other's codes.

use super::{ComplaintStore, ListOrder, Page, StatusChange, StoreError, MAX_LIST_LIMIT};
use crate::allocator::{
    highest_sequence, latest_in_year, next_sequence, ReferenceCode, SequenceExhausted,
};
use crate::complaint::{Complaint, NewComplaint, Status};
use chrono::{DateTime, Datelike, Utc};
use may::sync::{Mutex, MutexGuard};
use std::collections::HashMap;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<Complaint>,
    by_code: HashMap<String, usize>,
}

impl MemoryState {
    fn insert(&mut self, complaint: Complaint) -> Result<(), StoreError> {
        let code = complaint.reference_code.as_str().to_string();
        if self.by_code.contains_key(&code) {
            return Err(StoreError::ConstraintViolation(format!(
                "reference code {code} already exists"
            )));
        }
        self.next_id = self.next_id.max(complaint.id);
        self.by_code.insert(code, self.rows.len());
        self.rows.push(complaint);
        Ok(())
    }
}

pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Loads an existing record as-is, e.g. history carried over from another system.
    ///
    /// Codes are not validated, so malformed legacy codes can be reproduced; the
    /// uniqueness of `reference_code` is still enforced.
    pub fn import(&self, complaint: Complaint) -> Result<(), StoreError> {
        self.lock()?.insert(complaint)
    }

    /// Row count. Still readable after a panic poisoned the lock.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl ComplaintStore for MemoryStore {
    fn create(
        &self,
        created_at: DateTime<Utc>,
        complaint: &NewComplaint,
        attempt: u32,
    ) -> Result<Complaint, StoreError> {
        let year = created_at.year();
        let mut state = self.lock()?;

        let codes: Vec<&str> = state.rows.iter().map(|c| c.reference_code.as_str()).collect();
        let mut sequence = next_sequence(latest_in_year(codes.iter().copied(), year), year)?;
        if attempt > 1 {
            // Step past corrupted codes by trusting only the ones that parse.
            if let Some(highest) = highest_sequence(codes.iter().copied(), year) {
                let after = highest.checked_add(1).ok_or(SequenceExhausted { year })?;
                sequence = sequence.max(after);
            }
        }

        let record = Complaint {
            id: state.next_id + 1,
            reference_code: ReferenceCode::new(year, sequence),
            citizen_name: complaint.citizen_name.clone(),
            category: complaint.category.clone(),
            description: complaint.description.clone(),
            image_reference: complaint.image_reference.clone(),
            latitude: complaint.coordinates.map(|c| c.latitude),
            longitude: complaint.coordinates.map(|c| c.longitude),
            status: Status::Pending,
            created_at,
        };
        state.insert(record.clone())?;
        Ok(record)
    }

    fn find_by_reference_code(
        &self,
        code: &ReferenceCode,
    ) -> Result<Option<Complaint>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .by_code
            .get(code.as_str())
            .map(|&index| state.rows[index].clone()))
    }

    fn list(&self, page: Page, order: ListOrder) -> Result<Vec<Complaint>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<&Complaint> = state.rows.iter().collect();
        match order {
            ListOrder::Insertion => rows.sort_by_key(|c| c.id),
            ListOrder::NewestFirst => {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
            }
        }

        let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit.min(MAX_LIST_LIMIT)).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_status(
        &self,
        code: &ReferenceCode,
        target: Status,
    ) -> Result<Option<StatusChange>, StoreError> {
        let mut state = self.lock()?;
        let Some(&index) = state.by_code.get(code.as_str()) else {
            return Ok(None);
        };

        let row = &mut state.rows[index];
        let previous = row.status;
        previous.transition_to(target)?;
        row.status = target;

        Ok(Some(StatusChange {
            previous,
            complaint: row.clone(),
        }))
    }

    fn check_health(&self) -> Result<bool, StoreError> {
        self.lock().map(|_| true)
    }
}
