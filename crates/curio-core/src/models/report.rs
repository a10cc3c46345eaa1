//! Result and report types surfaced to the caller.
//!
//! Drains, validations, and repairs never propagate their per-entity failures
//! as errors; everything is aggregated into these types for the UI or ops
//! tooling to act on.

use serde::{Deserialize, Serialize};

use crate::models::operation::EntityKind;
use crate::util::unix_timestamp_ms;

/// How urgently a consistency finding needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Threshold above which a count drift is considered severe
const COUNT_DRIFT_HIGH_THRESHOLD: i64 = 10;

/// A parent's cached child count disagrees with the actual child count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    /// Parent collection identifier
    pub parent_id: String,
    /// Cached count stored on the parent
    pub stored_count: i64,
    /// Count computed from actual children
    pub actual_count: i64,
}

impl CountMismatch {
    /// High when the drift exceeds the threshold, Medium otherwise
    #[must_use]
    pub const fn severity(&self) -> Severity {
        if (self.actual_count - self.stored_count).abs() > COUNT_DRIFT_HIGH_THRESHOLD {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// A child references a parent that no longer exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedChild {
    /// Orphaned item identifier
    pub child_id: String,
    /// Parent id the child still references
    pub missing_parent_id: String,
}

impl OrphanedChild {
    /// Orphans are always High severity
    #[must_use]
    pub const fn severity(&self) -> Severity {
        Severity::High
    }
}

/// An entity violates a structural invariant (e.g. wrong owner)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipViolation {
    /// Offending entity identifier
    pub entity_id: String,
    /// Kind of the offending entity
    pub entity_kind: EntityKind,
    /// Human-readable description of the violation
    pub description: String,
    /// High for owner mismatches, lower for decode problems
    pub severity: Severity,
}

/// Result of one consistency validation run. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Owner whose data was audited
    pub owner_id: String,
    /// Validation timestamp (Unix ms)
    pub validated_at: i64,
    /// Wall-clock duration of the run in seconds
    pub duration_secs: f64,
    /// Cached-count drift findings
    pub count_mismatches: Vec<CountMismatch>,
    /// Children referencing missing parents
    pub orphaned_children: Vec<OrphanedChild>,
    /// Structural invariant violations
    pub relationship_violations: Vec<RelationshipViolation>,
}

impl ConsistencyReport {
    /// True iff no findings of any kind were produced
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.count_mismatches.is_empty()
            && self.orphaned_children.is_empty()
            && self.relationship_violations.is_empty()
    }

    /// Total number of findings across all three checks
    #[must_use]
    pub fn total_findings(&self) -> usize {
        self.count_mismatches.len()
            + self.orphaned_children.len()
            + self.relationship_violations.len()
    }
}

/// Outcome of applying repairs for one report. Partial-failure tolerant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    /// Findings the repairer was asked to process
    pub total_findings: usize,
    /// Findings fixed successfully
    pub fixed_count: usize,
    /// Findings that failed or were skipped
    pub failed_count: usize,
    /// One message per failed/skipped finding
    pub errors: Vec<String>,
    /// Repair timestamp (Unix ms)
    pub fixed_at: i64,
}

/// Outcome of one queue drain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Operations processed in this drain
    pub total_operations: usize,
    /// Operations applied successfully
    pub success_count: usize,
    /// Operations that failed this pass (including retained retries)
    pub failed_count: usize,
    /// Operations routed to the conflict store
    pub conflict_count: usize,
    /// Drain completion timestamp (Unix ms)
    pub synced_at: i64,
}

impl SyncResult {
    /// Empty result for a drain that processed nothing
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_operations: 0,
            success_count: 0,
            failed_count: 0,
            conflict_count: 0,
            synced_at: unix_timestamp_ms(),
        }
    }

    /// Whether any operation failed this pass
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.failed_count > 0
    }

    /// Whether any operation was routed to the conflict store
    #[must_use]
    pub const fn has_conflicts(&self) -> bool {
        self.conflict_count > 0
    }
}
