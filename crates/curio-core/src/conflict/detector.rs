//! Snapshot divergence detection.
//!
//! Pure comparison only: no merging, no resolution policy. Volatile
//! bookkeeping fields are excluded so two copies of an entity that differ
//! only in when they were last touched do not count as conflicting.

use serde_json::Value;

use crate::models::{ConflictRecord, EntityKind};

/// Bookkeeping fields ignored when comparing snapshots
pub const VOLATILE_FIELDS: &[&str] = &["updated_at", "synced_at"];

/// Whether two snapshots diverge on any non-volatile field
#[must_use]
pub fn diverges(local: &Value, remote: &Value) -> bool {
    match (local.as_object(), remote.as_object()) {
        (Some(local_map), Some(remote_map)) => {
            let keys = local_map
                .keys()
                .chain(remote_map.keys())
                .filter(|key| !VOLATILE_FIELDS.contains(&key.as_str()));
            for key in keys {
                if local_map.get(key) != remote_map.get(key) {
                    return true;
                }
            }
            false
        }
        // non-object snapshots compare wholesale
        _ => local != remote,
    }
}

/// Compare snapshots and produce a conflict record when they diverge.
///
/// Both snapshots are retained verbatim on the record.
#[must_use]
pub fn detect(
    entity_kind: EntityKind,
    entity_id: &str,
    local: &Value,
    remote: &Value,
) -> Option<ConflictRecord> {
    if diverges(local, remote) {
        Some(ConflictRecord::new(
            entity_kind,
            entity_id,
            local.clone(),
            remote.clone(),
        ))
    } else {
        None
    }
}

/// Whether the remote copy is strictly newer than the local snapshot,
/// judged by the volatile `updated_at` timestamp. Missing timestamps on
/// either side mean the remote cannot be proven newer.
#[must_use]
pub fn remote_is_newer(local: &Value, remote: &Value) -> bool {
    let local_ts = local.get("updated_at").and_then(Value::as_i64);
    let remote_ts = remote.get("updated_at").and_then(Value::as_i64);
    match (local_ts, remote_ts) {
        (Some(local_ts), Some(remote_ts)) => remote_ts > local_ts,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_snapshots_do_not_diverge() {
        let snapshot = json!({"id": "i1", "name": "Penny", "updated_at": 100});
        assert!(!diverges(&snapshot, &snapshot));
        assert!(detect(EntityKind::Item, "i1", &snapshot, &snapshot).is_none());
    }

    #[test]
    fn volatile_fields_are_ignored() {
        let local = json!({"id": "i1", "name": "Penny", "updated_at": 100, "synced_at": 90});
        let remote = json!({"id": "i1", "name": "Penny", "updated_at": 500, "synced_at": 480});
        assert!(!diverges(&local, &remote));
    }

    #[test]
    fn mutable_field_divergence_is_detected() {
        let local = json!({"id": "i1", "name": "Penny", "updated_at": 100});
        let remote = json!({"id": "i1", "name": "Nickel", "updated_at": 100});
        assert!(diverges(&local, &remote));

        let record = detect(EntityKind::Item, "i1", &local, &remote).unwrap();
        assert_eq!(record.entity_id, "i1");
        assert_eq!(record.local_snapshot["name"], "Penny");
        assert_eq!(record.remote_snapshot["name"], "Nickel");
    }

    #[test]
    fn missing_field_counts_as_divergence() {
        let local = json!({"id": "i1", "name": "Penny", "notes": "rare"});
        let remote = json!({"id": "i1", "name": "Penny"});
        assert!(diverges(&local, &remote));
    }

    #[test]
    fn remote_newer_requires_both_timestamps() {
        let local = json!({"updated_at": 100});
        let newer = json!({"updated_at": 200});
        let older = json!({"updated_at": 50});
        let missing = json!({});

        assert!(remote_is_newer(&local, &newer));
        assert!(!remote_is_newer(&local, &older));
        assert!(!remote_is_newer(&local, &local));
        assert!(!remote_is_newer(&local, &missing));
        assert!(!remote_is_newer(&missing, &newer));
    }
}
