//! Last-writer-wins register for the observed position.

use serde::{Deserialize, Serialize};

use crate::LocationRecord;

/// How an incoming record is weighed against the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyPolicy {
    /// Every arrival replaces the current record, whatever its timestamp.
    /// An out-of-order push can regress the displayed position.
    #[default]
    LastArrival,
    /// An arrival older than the current record is ignored. Equal
    /// timestamps still apply.
    NewerTimestamp,
}

/// Result of offering a record to the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record became the current value.
    Applied,
    /// The record was older than the current value and was dropped.
    Superseded,
}

/// Holds the most recently applied record for one subject.
#[derive(Debug, Clone, Default)]
pub struct LatestLocation {
    current: Option<LocationRecord>,
    policy: ApplyPolicy,
    applied: u64,
}

impl LatestLocation {
    #[must_use]
    pub const fn new(policy: ApplyPolicy) -> Self {
        Self {
            current: None,
            policy,
            applied: 0,
        }
    }

    /// Offer an arrival from any path (point read, push, re-read).
    pub fn offer(&mut self, record: LocationRecord) -> ApplyOutcome {
        if let (ApplyPolicy::NewerTimestamp, Some(current)) = (self.policy, &self.current) {
            if record.timestamp < current.timestamp {
                return ApplyOutcome::Superseded;
            }
        }
        self.current = Some(record);
        self.applied = self.applied.saturating_add(1);
        ApplyOutcome::Applied
    }

    #[must_use]
    pub const fn current(&self) -> Option<&LocationRecord> {
        self.current.as_ref()
    }

    /// Number of arrivals that were applied.
    #[must_use]
    pub const fn applied(&self) -> u64 {
        self.applied
    }

    #[must_use]
    pub const fn policy(&self) -> ApplyPolicy {
        self.policy
    }
}
