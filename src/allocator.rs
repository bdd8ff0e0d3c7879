//! Reference code allocation.
//!
//! Codes look like `MPM-2025-0042`: a fixed prefix, the calendar year at allocation
//! time, and a per-year sequence zero-padded to four digits. Sequences past 9999 widen
//! (`MPM-2025-10000`) rather than wrap.
//!
//! Two strategies share the scan rule in [`latest_in_year`] and [`next_sequence`]:
//!
//! - PostgreSQL keeps a counter row per year in `complaint_sequences`. [`allocate`]
//!   advances it inside the caller's transaction, so the row lock serializes every
//!   allocation for that year until the complaint insert commits or rolls back. The row
//!   is seeded from the scan rule the first time a year is seen.
//! - The memory store applies the scan rule directly under its own mutex.

use crate::executor::{DbError, SqlExecutor};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CODE_PREFIX: &str = "MPM";

static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^MPM-(\d{4})-(\d{4,})$").expect("reference code pattern compiles"));

/// A complaint's public identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceCode(String);

impl ReferenceCode {
    pub fn new(year: i32, sequence: u32) -> Self {
        Self(format!("{}{sequence:04}", year_prefix(year)))
    }

    /// Parses a well-formed code; `None` for anything else.
    pub fn parse(code: &str) -> Option<Self> {
        CODE_PATTERN
            .is_match(code)
            .then(|| Self(code.to_string()))
    }

    /// Wraps a code read back from storage without re-validating it.
    pub fn from_stored(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn year(&self) -> Option<i32> {
        CODE_PATTERN
            .captures(&self.0)
            .and_then(|caps| caps[1].parse().ok())
    }

    pub fn sequence(&self) -> Option<u32> {
        CODE_PATTERN
            .captures(&self.0)
            .and_then(|caps| caps[2].parse().ok())
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `MPM-<year>-`, the prefix shared by every code of that year.
pub fn year_prefix(year: i32) -> String {
    format!("{CODE_PREFIX}-{year:04}-")
}

/// The year's code with the numerically greatest suffix.
///
/// Longer suffixes win before lexicographic order, so `...-10000` beats `...-9999`.
pub fn latest_in_year<'a>(codes: impl IntoIterator<Item = &'a str>, year: i32) -> Option<&'a str> {
    let prefix = year_prefix(year);
    codes
        .into_iter()
        .filter(|code| code.starts_with(&prefix))
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
}

/// Greatest sequence among the year's codes that parse, skipping corrupted ones.
pub fn highest_sequence<'a>(codes: impl IntoIterator<Item = &'a str>, year: i32) -> Option<u32> {
    let prefix = year_prefix(year);
    codes
        .into_iter()
        .filter_map(|code| code.strip_prefix(&prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceExhausted {
    pub year: i32,
}

impl fmt::Display for SequenceExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reference code sequence for {} is exhausted", self.year)
    }
}

impl std::error::Error for SequenceExhausted {}

/// Sequence that follows `latest`, the year's current greatest code.
///
/// A suffix that does not parse means corrupted data. Allocation restarts at 1 rather
/// than failing, which can collide with an existing code; the unique constraint and
/// the bounded retry catch that.
pub fn next_sequence(latest: Option<&str>, year: i32) -> Result<u32, SequenceExhausted> {
    let Some(code) = latest else {
        return Ok(1);
    };

    let suffix = code.strip_prefix(&year_prefix(year)).unwrap_or(code);
    match suffix.parse::<u32>() {
        Ok(last) => last.checked_add(1).ok_or(SequenceExhausted { year }),
        Err(e) => {
            log::warn!(
                "data integrity: cannot parse sequence of reference code {code:?} ({e}); \
                 restarting {year} at 1, duplicates are possible"
            );
            Ok(1)
        }
    }
}

#[derive(Debug)]
pub enum AllocationError {
    Database(DbError),
    Exhausted(SequenceExhausted),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::Database(e) => write!(f, "allocation failed: {e}"),
            AllocationError::Exhausted(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AllocationError {}

impl From<DbError> for AllocationError {
    fn from(err: DbError) -> Self {
        AllocationError::Database(err)
    }
}

impl From<SequenceExhausted> for AllocationError {
    fn from(err: SequenceExhausted) -> Self {
        AllocationError::Exhausted(err)
    }
}

const ADVANCE_COUNTER_SQL: &str = "UPDATE complaint_sequences SET last_value = last_value + 1 \
     WHERE year = $1 RETURNING last_value";

const LATEST_CODE_SQL: &str = "SELECT reference_code FROM complaints WHERE reference_code LIKE $1 \
     ORDER BY char_length(reference_code) DESC, reference_code DESC LIMIT 1";

// GREATEST lets a re-derived scan value push a lagging counter forward.
const SEED_COUNTER_SQL: &str = "INSERT INTO complaint_sequences (year, last_value) VALUES ($1, $2) \
     ON CONFLICT (year) DO UPDATE SET last_value = \
     GREATEST(complaint_sequences.last_value + 1, EXCLUDED.last_value) \
     RETURNING last_value";

/// Allocates the next code for `year` through the counter table.
///
/// Must run inside the transaction that inserts the complaint: the counter row stays
/// locked until that transaction ends, and a rollback returns the sequence value. With
/// `rederive` set the counter is reconciled against the greatest stored code first,
/// which is how a retry after a unique violation moves past rows the counter never saw.
pub fn allocate(
    executor: &dyn SqlExecutor,
    year: i32,
    rederive: bool,
) -> Result<ReferenceCode, AllocationError> {
    if !rederive {
        if let Some(row) = executor.query_opt(ADVANCE_COUNTER_SQL, &[&year])? {
            let value: i64 = row
                .try_get(0)
                .map_err(|e| DbError::ParseError(e.to_string()))?;
            return Ok(ReferenceCode::new(year, sequence_from_counter(value, year)?));
        }
    }

    let pattern = format!("{}%", year_prefix(year));
    let latest: Option<String> = executor
        .query_opt(LATEST_CODE_SQL, &[&pattern])?
        .map(|row| row.try_get(0))
        .transpose()
        .map_err(|e| DbError::ParseError(e.to_string()))?;
    let seed = i64::from(next_sequence(latest.as_deref(), year)?);

    let row = executor.query_one(SEED_COUNTER_SQL, &[&year, &seed])?;
    let value: i64 = row
        .try_get(0)
        .map_err(|e| DbError::ParseError(e.to_string()))?;
    Ok(ReferenceCode::new(year, sequence_from_counter(value, year)?))
}

fn sequence_from_counter(value: i64, year: i32) -> Result<u32, SequenceExhausted> {
    u32::try_from(value).map_err(|_| SequenceExhausted { year })
}
