//! Read-only audit of derived aggregates and referential integrity.
//!
//! The remote store offers no cross-read transaction, so a report reflects a
//! single point in time and may be stale if writes race the validation.
//! That is accepted; findings are advisory until the repairer acts on them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::models::{
    CollectionRecord, ConsistencyReport, CountMismatch, EntityKind, ItemRecord, OrphanedChild,
    RelationshipViolation, Severity,
};
use crate::store::RemoteStore;
use crate::util::unix_timestamp_ms;

/// Audits one owner's data for count drift, orphans, and ownership violations
pub struct ConsistencyValidator {
    remote: Arc<dyn RemoteStore>,
}

impl ConsistencyValidator {
    /// Create a validator over the given remote store
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    /// Run all three checks for the given owner. Read-only.
    pub async fn validate(&self, owner_id: &str) -> Result<ConsistencyReport> {
        let started = Instant::now();
        tracing::info!(owner_id, "starting consistency validation");

        let mut report = ConsistencyReport {
            owner_id: owner_id.to_string(),
            validated_at: unix_timestamp_ms(),
            duration_secs: 0.0,
            count_mismatches: Vec::new(),
            orphaned_children: Vec::new(),
            relationship_violations: Vec::new(),
        };

        let collection_values = self
            .remote
            .list_owned(EntityKind::Collection, owner_id)
            .await?;
        let item_values = self.remote.list_owned(EntityKind::Item, owner_id).await?;

        let mut collections = Vec::new();
        for value in &collection_values {
            match CollectionRecord::from_value(value) {
                Ok(collection) => collections.push(collection),
                Err(error) => report.relationship_violations.push(RelationshipViolation {
                    entity_id: entity_id_of(value),
                    entity_kind: EntityKind::Collection,
                    description: format!("undecodable collection record: {error}"),
                    severity: Severity::Medium,
                }),
            }
        }

        let mut items = Vec::new();
        for value in &item_values {
            match ItemRecord::from_value(value) {
                Ok(item) => items.push(item),
                Err(error) => report.relationship_violations.push(RelationshipViolation {
                    entity_id: entity_id_of(value),
                    entity_kind: EntityKind::Item,
                    description: format!("undecodable item record: {error}"),
                    severity: Severity::Medium,
                }),
            }
        }

        self.check_counts(&collections, &mut report).await?;
        Self::check_orphans(&collections, &items, &mut report);
        Self::check_relationships(owner_id, &collections, &items, &mut report);

        report.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            owner_id,
            findings = report.total_findings(),
            duration_secs = report.duration_secs,
            "consistency validation complete"
        );
        Ok(report)
    }

    /// Count check: cached `stored_count` vs actual children in the store
    async fn check_counts(
        &self,
        collections: &[CollectionRecord],
        report: &mut ConsistencyReport,
    ) -> Result<()> {
        for collection in collections {
            let actual_count = self
                .remote
                .count_children(EntityKind::Collection, &collection.id)
                .await?;
            if actual_count != collection.stored_count {
                report.count_mismatches.push(CountMismatch {
                    parent_id: collection.id.clone(),
                    stored_count: collection.stored_count,
                    actual_count,
                });
            }
        }
        Ok(())
    }

    /// Orphan check: every item's parent must exist among the owner's collections
    fn check_orphans(
        collections: &[CollectionRecord],
        items: &[ItemRecord],
        report: &mut ConsistencyReport,
    ) {
        let parent_ids: HashSet<&str> = collections.iter().map(|c| c.id.as_str()).collect();
        for item in items {
            if !parent_ids.contains(item.collection_id.as_str()) {
                report.orphaned_children.push(OrphanedChild {
                    child_id: item.id.clone(),
                    missing_parent_id: item.collection_id.clone(),
                });
            }
        }
    }

    /// Relationship check: owner fields must match the audited owner.
    /// A mismatch here indicates a structural bug, not ordinary drift.
    fn check_relationships(
        owner_id: &str,
        collections: &[CollectionRecord],
        items: &[ItemRecord],
        report: &mut ConsistencyReport,
    ) {
        for collection in collections {
            if collection.owner_id != owner_id {
                report.relationship_violations.push(RelationshipViolation {
                    entity_id: collection.id.clone(),
                    entity_kind: EntityKind::Collection,
                    description: format!(
                        "collection owner is {} but was returned for {owner_id}",
                        collection.owner_id
                    ),
                    severity: Severity::High,
                });
            }
        }
        for item in items {
            if item.owner_id != owner_id {
                report.relationship_violations.push(RelationshipViolation {
                    entity_id: item.id.clone(),
                    entity_kind: EntityKind::Item,
                    description: format!(
                        "item owner is {} but was returned for {owner_id}",
                        item.owner_id
                    ),
                    severity: Severity::High,
                });
            }
        }
    }
}

fn entity_id_of(value: &serde_json::Value) -> String {
    value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRemoteStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn seed_collection(remote: &MemoryRemoteStore, id: &str, owner: &str, stored: i64) {
        remote
            .seed(
                EntityKind::Collection,
                id,
                json!({"id": id, "owner_id": owner, "name": id, "stored_count": stored}),
            )
            .await;
    }

    async fn seed_item(remote: &MemoryRemoteStore, id: &str, owner: &str, parent: &str) {
        remote
            .seed(
                EntityKind::Item,
                id,
                json!({"id": id, "owner_id": owner, "collection_id": parent, "name": id}),
            )
            .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_data_validates_consistent() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed_collection(&remote, "c1", "u1", 2).await;
        seed_item(&remote, "i1", "u1", "c1").await;
        seed_item(&remote, "i2", "u1", "c1").await;

        let validator = ConsistencyValidator::new(remote);
        let report = validator.validate("u1").await.unwrap();

        assert!(report.is_consistent());
        assert_eq!(report.owner_id, "u1");
        assert!(report.validated_at > 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn count_drift_flagged_with_severity() {
        let remote = Arc::new(MemoryRemoteStore::new());
        // stored 5, actual 7: Medium
        seed_collection(&remote, "c1", "u1", 5).await;
        for i in 0..7 {
            seed_item(&remote, &format!("i{i}"), "u1", "c1").await;
        }
        // stored 20, actual 0: High
        seed_collection(&remote, "c2", "u1", 20).await;

        let validator = ConsistencyValidator::new(remote);
        let report = validator.validate("u1").await.unwrap();

        assert_eq!(report.count_mismatches.len(), 2);
        let c1 = report
            .count_mismatches
            .iter()
            .find(|m| m.parent_id == "c1")
            .unwrap();
        assert_eq!((c1.stored_count, c1.actual_count), (5, 7));
        assert_eq!(c1.severity(), Severity::Medium);

        let c2 = report
            .count_mismatches
            .iter()
            .find(|m| m.parent_id == "c2")
            .unwrap();
        assert_eq!(c2.severity(), Severity::High);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn orphaned_item_flagged() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed_collection(&remote, "c1", "u1", 0).await;
        seed_item(&remote, "i1", "u1", "c-deleted").await;

        let validator = ConsistencyValidator::new(remote);
        let report = validator.validate("u1").await.unwrap();

        assert_eq!(report.orphaned_children.len(), 1);
        assert_eq!(report.orphaned_children[0].child_id, "i1");
        assert_eq!(report.orphaned_children[0].missing_parent_id, "c-deleted");
        assert_eq!(report.orphaned_children[0].severity(), Severity::High);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn owner_mismatch_is_high_violation() {
        let remote = Arc::new(MemoryRemoteStore::new());
        // a store-side filtering bug returns another owner's collection
        remote
            .seed(
                EntityKind::Collection,
                "c1",
                json!({"id": "c1", "owner_id": "u1", "name": "Coins", "stored_count": 0}),
            )
            .await;

        let validator = ConsistencyValidator::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);
        let report = validator.validate("u1").await.unwrap();
        assert!(report.is_consistent());

        // simulate the violation by flipping the owner while the id stays listed
        struct MisfilteredStore(Arc<MemoryRemoteStore>);

        #[async_trait::async_trait]
        impl RemoteStore for MisfilteredStore {
            async fn create(
                &self,
                kind: EntityKind,
                id: &str,
                data: &serde_json::Value,
            ) -> std::result::Result<(), crate::error::RemoteError> {
                self.0.create(kind, id, data).await
            }
            async fn update(
                &self,
                kind: EntityKind,
                id: &str,
                data: &serde_json::Value,
            ) -> std::result::Result<(), crate::error::RemoteError> {
                self.0.update(kind, id, data).await
            }
            async fn delete(
                &self,
                kind: EntityKind,
                id: &str,
            ) -> std::result::Result<(), crate::error::RemoteError> {
                self.0.delete(kind, id).await
            }
            async fn get(
                &self,
                kind: EntityKind,
                id: &str,
            ) -> std::result::Result<Option<serde_json::Value>, crate::error::RemoteError>
            {
                self.0.get(kind, id).await
            }
            async fn count_children(
                &self,
                parent_kind: EntityKind,
                parent_id: &str,
            ) -> std::result::Result<i64, crate::error::RemoteError> {
                self.0.count_children(parent_kind, parent_id).await
            }
            async fn list_children(
                &self,
                parent_kind: EntityKind,
                parent_id: &str,
            ) -> std::result::Result<Vec<serde_json::Value>, crate::error::RemoteError>
            {
                self.0.list_children(parent_kind, parent_id).await
            }
            async fn list_owned(
                &self,
                kind: EntityKind,
                _owner_id: &str,
            ) -> std::result::Result<Vec<serde_json::Value>, crate::error::RemoteError>
            {
                // returns everything regardless of owner
                match kind {
                    EntityKind::Collection => Ok(vec![json!({
                        "id": "c-other",
                        "owner_id": "u2",
                        "name": "Stamps",
                        "stored_count": 0
                    })]),
                    EntityKind::Item => Ok(vec![]),
                }
            }
        }

        let validator = ConsistencyValidator::new(Arc::new(MisfilteredStore(remote)));
        let report = validator.validate("u1").await.unwrap();

        assert_eq!(report.relationship_violations.len(), 1);
        assert_eq!(report.relationship_violations[0].severity, Severity::High);
        assert!(report.relationship_violations[0]
            .description
            .contains("owner is u2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_record_is_medium_violation() {
        let remote = Arc::new(MemoryRemoteStore::new());
        // item lacking its parent reference cannot be decoded
        remote
            .seed(EntityKind::Item, "i1", json!({"id": "i1", "owner_id": "u1"}))
            .await;

        let validator = ConsistencyValidator::new(remote);
        let report = validator.validate("u1").await.unwrap();

        assert_eq!(report.relationship_violations.len(), 1);
        assert_eq!(report.relationship_violations[0].severity, Severity::Medium);
        assert_eq!(report.relationship_violations[0].entity_id, "i1");
    }
}
