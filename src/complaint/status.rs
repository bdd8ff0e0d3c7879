use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a complaint is in its handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Pending,
    Assigned,
    Resolved,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Pending, Status::Assigned, Status::Resolved];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Assigned => "Assigned",
            Status::Resolved => "Resolved",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Assigned => 1,
            Status::Resolved => 2,
        }
    }

    /// Checks a move from `self` to `target`.
    ///
    /// Handling only moves forward: `Pending → Assigned → Resolved`, with
    /// `Pending → Resolved` allowed directly. Re-applying the current status is
    /// accepted.
    pub fn transition_to(self, target: Status) -> Result<(), TransitionError> {
        if target.rank() >= self.rank() {
            Ok(())
        } else {
            Err(TransitionError {
                from: self,
                to: target,
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status literal outside the three accepted spellings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown status {:?}; must be one of: Pending, Assigned, Resolved",
            self.0
        )
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
    type Err = UnknownStatus;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: Status,
    pub to: Status,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move a complaint from {} back to {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}
