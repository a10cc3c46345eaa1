//! Deterministic repair of safe consistency findings.
//!
//! Count drift and orphaned children have mechanical, idempotent fixes.
//! Relationship violations never do: they indicate a structural bug and are
//! always surfaced for manual intervention.
//!
//! Fixes patch only the fields the sync core owns on the raw remote
//! document; everything else in it belongs to the application and passes
//! through untouched.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{CollectionRecord, ConsistencyReport, EntityKind, FixResult};
use crate::store::RemoteStore;
use crate::util::unix_timestamp_ms;

/// Collection names recognized as an existing recovery bucket
pub const RECOVERY_BUCKET_LABELS: &[&str] = &["uncategorized", "misc", "other"];

/// Name given to a recovery bucket the repairer has to create itself
const RECOVERY_BUCKET_NAME: &str = "Uncategorized";

/// Applies safe corrections for validator findings
pub struct ConsistencyRepairer {
    remote: Arc<dyn RemoteStore>,
}

impl ConsistencyRepairer {
    /// Create a repairer over the given remote store
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    /// Apply fixes for every finding in the report.
    ///
    /// One finding's failure never aborts the rest; every outcome lands in
    /// the returned [`FixResult`].
    pub async fn auto_fix(&self, report: &ConsistencyReport) -> FixResult {
        let mut fixed_count = 0;
        let mut failed_count = 0;
        let mut errors = Vec::new();

        tracing::info!(
            owner_id = %report.owner_id,
            findings = report.total_findings(),
            "starting auto-fix"
        );

        for mismatch in &report.count_mismatches {
            match self
                .fix_count(&mismatch.parent_id, mismatch.actual_count)
                .await
            {
                Ok(()) => fixed_count += 1,
                Err(error) => {
                    failed_count += 1;
                    errors.push(format!(
                        "count fix for {} failed: {error}",
                        mismatch.parent_id
                    ));
                }
            }
        }

        // one bucket per run, reused across findings and across runs
        let mut bucket: Option<CollectionRecord> = None;
        for orphan in &report.orphaned_children {
            let result = async {
                if bucket.is_none() {
                    bucket = Some(self.find_or_create_bucket(&report.owner_id).await?);
                }
                let bucket = bucket.as_ref().ok_or_else(|| {
                    Error::InvalidInput("recovery bucket unavailable".to_string())
                })?;
                self.reassign_orphan(&orphan.child_id, &bucket.id).await
            }
            .await;

            match result {
                Ok(()) => fixed_count += 1,
                Err(error) => {
                    failed_count += 1;
                    errors.push(format!(
                        "orphan fix for {} failed: {error}",
                        orphan.child_id
                    ));
                }
            }
        }

        // keep the bucket's cached count honest after reassignments
        if let Some(bucket) = &bucket {
            if let Err(error) = self.refresh_bucket_count(&bucket.id).await {
                tracing::warn!(bucket_id = %bucket.id, %error, "recovery bucket recount failed");
            }
        }

        for violation in &report.relationship_violations {
            failed_count += 1;
            errors.push(format!(
                "relationship violation on {} {} requires manual intervention: {}",
                violation.entity_kind, violation.entity_id, violation.description
            ));
        }

        let result = FixResult {
            total_findings: report.total_findings(),
            fixed_count,
            failed_count,
            errors,
            fixed_at: unix_timestamp_ms(),
        };
        tracing::info!(
            fixed = result.fixed_count,
            failed = result.failed_count,
            "auto-fix complete"
        );
        result
    }

    /// Overwrite a collection's cached count, leaving other fields untouched
    async fn fix_count(&self, parent_id: &str, actual_count: i64) -> Result<()> {
        let mut value = self
            .remote
            .get(EntityKind::Collection, parent_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("collection {parent_id} vanished")))?;
        let fields = value.as_object_mut().ok_or_else(|| {
            Error::InvalidInput(format!("collection {parent_id} is not an object"))
        })?;

        fields.insert("stored_count".to_string(), Value::from(actual_count));
        fields.insert("updated_at".to_string(), Value::from(unix_timestamp_ms()));
        self.remote
            .update(EntityKind::Collection, parent_id, &value)
            .await?;

        tracing::debug!(parent_id, actual_count, "stored count repaired");
        Ok(())
    }

    /// Find an existing recovery bucket for the owner, creating one when absent
    async fn find_or_create_bucket(&self, owner_id: &str) -> Result<CollectionRecord> {
        let collections = self
            .remote
            .list_owned(EntityKind::Collection, owner_id)
            .await?;

        for value in &collections {
            if let Ok(collection) = CollectionRecord::from_value(value) {
                if RECOVERY_BUCKET_LABELS.contains(&collection.name.to_lowercase().as_str()) {
                    tracing::debug!(bucket_id = %collection.id, "reusing recovery bucket");
                    return Ok(collection);
                }
            }
        }

        let bucket = CollectionRecord::new(owner_id, RECOVERY_BUCKET_NAME);
        self.remote
            .create(EntityKind::Collection, &bucket.id, &bucket.to_value()?)
            .await?;
        tracing::info!(bucket_id = %bucket.id, owner_id, "created recovery bucket");
        Ok(bucket)
    }

    /// Point an orphaned item at the recovery bucket, leaving other fields untouched
    async fn reassign_orphan(&self, child_id: &str, bucket_id: &str) -> Result<()> {
        let mut value = self
            .remote
            .get(EntityKind::Item, child_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("item {child_id} vanished")))?;
        let fields = value
            .as_object_mut()
            .ok_or_else(|| Error::InvalidInput(format!("item {child_id} is not an object")))?;

        fields.insert("collection_id".to_string(), Value::from(bucket_id));
        fields.insert("updated_at".to_string(), Value::from(unix_timestamp_ms()));
        self.remote
            .update(EntityKind::Item, child_id, &value)
            .await?;

        tracing::debug!(child_id, bucket_id, "orphan reassigned");
        Ok(())
    }

    async fn refresh_bucket_count(&self, bucket_id: &str) -> Result<()> {
        let actual = self
            .remote
            .count_children(EntityKind::Collection, bucket_id)
            .await?;
        self.fix_count(bucket_id, actual).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::ConsistencyValidator;
    use crate::store::MemoryRemoteStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn seed_collection(remote: &MemoryRemoteStore, id: &str, owner: &str, name: &str, stored: i64) {
        remote
            .seed(
                EntityKind::Collection,
                id,
                json!({"id": id, "owner_id": owner, "name": name, "stored_count": stored}),
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
    async fn count_repair_matches_actual_and_converges() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed_collection(&remote, "c1", "u1", "Coins", 5).await;
        for i in 0..7 {
            seed_item(&remote, &format!("i{i}"), "u1", "c1").await;
        }

        let validator = ConsistencyValidator::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);
        let repairer = ConsistencyRepairer::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);

        let report = validator.validate("u1").await.unwrap();
        assert_eq!(report.count_mismatches.len(), 1);

        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.fixed_count, 1);
        assert_eq!(fix.failed_count, 0);

        let repaired = remote.entity(EntityKind::Collection, "c1").await.unwrap();
        assert_eq!(repaired["stored_count"], 7);

        // second run over fresh data finds nothing
        let report = validator.validate("u1").await.unwrap();
        assert!(report.count_mismatches.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn orphan_repair_creates_bucket_once() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed_item(&remote, "i1", "u1", "c-deleted").await;
        seed_item(&remote, "i2", "u1", "c-deleted").await;

        let validator = ConsistencyValidator::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);
        let repairer = ConsistencyRepairer::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);

        let report = validator.validate("u1").await.unwrap();
        assert_eq!(report.orphaned_children.len(), 2);

        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.fixed_count, 2);

        // exactly one bucket created, both orphans attached to it
        assert_eq!(remote.count_of_kind(EntityKind::Collection).await, 1);
        let i1 = remote.entity(EntityKind::Item, "i1").await.unwrap();
        let i2 = remote.entity(EntityKind::Item, "i2").await.unwrap();
        assert_eq!(i1["collection_id"], i2["collection_id"]);

        // bucket count was refreshed after reassignment
        let buckets = remote.list_owned(EntityKind::Collection, "u1").await.unwrap();
        assert_eq!(buckets[0]["stored_count"], 2);
        assert_eq!(buckets[0]["name"], "Uncategorized");

        // revalidation reports no orphans and no second bucket appears
        let report = validator.validate("u1").await.unwrap();
        assert!(report.orphaned_children.is_empty());
        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.total_findings, 0);
        assert_eq!(remote.count_of_kind(EntityKind::Collection).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repairs_leave_application_fields_untouched() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote
            .seed(
                EntityKind::Collection,
                "c1",
                json!({
                    "id": "c1", "owner_id": "u1", "name": "Coins", "stored_count": 5,
                    "cover_image": "coins.png", "description": "pocket change"
                }),
            )
            .await;
        remote
            .seed(
                EntityKind::Item,
                "i1",
                json!({
                    "id": "i1", "owner_id": "u1", "collection_id": "c-deleted",
                    "name": "Steel cent", "notes": "rare 1943 steel",
                    "photos": ["front.png", "back.png"]
                }),
            )
            .await;

        let validator = ConsistencyValidator::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);
        let repairer = ConsistencyRepairer::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);

        let report = validator.validate("u1").await.unwrap();
        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.failed_count, 0);

        // the count repair rewrote only the fields the sync core owns
        let collection = remote.entity(EntityKind::Collection, "c1").await.unwrap();
        assert_eq!(collection["stored_count"], 0);
        assert_eq!(collection["cover_image"], "coins.png");
        assert_eq!(collection["description"], "pocket change");

        // the orphan repair likewise kept the application's item fields
        let item = remote.entity(EntityKind::Item, "i1").await.unwrap();
        assert_eq!(item["notes"], "rare 1943 steel");
        assert_eq!(item["photos"], json!(["front.png", "back.png"]));

        let collections = remote.list_owned(EntityKind::Collection, "u1").await.unwrap();
        let bucket = collections
            .iter()
            .find(|c| c["name"] == "Uncategorized")
            .unwrap();
        assert_eq!(item["collection_id"], bucket["id"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn orphan_repair_reuses_recognized_labels() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed_collection(&remote, "c-misc", "u1", "Misc", 0).await;
        seed_item(&remote, "i1", "u1", "c-deleted").await;

        let validator = ConsistencyValidator::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);
        let repairer = ConsistencyRepairer::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);

        let report = validator.validate("u1").await.unwrap();
        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.fixed_count, 1);

        let item = remote.entity(EntityKind::Item, "i1").await.unwrap();
        assert_eq!(item["collection_id"], "c-misc");
        assert_eq!(remote.count_of_kind(EntityKind::Collection).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn relationship_violations_are_never_auto_fixed() {
        let remote = Arc::new(MemoryRemoteStore::new());
        let repairer = ConsistencyRepairer::new(remote as Arc<dyn RemoteStore>);

        let report = ConsistencyReport {
            owner_id: "u1".into(),
            validated_at: unix_timestamp_ms(),
            duration_secs: 0.0,
            count_mismatches: vec![],
            orphaned_children: vec![],
            relationship_violations: vec![crate::models::RelationshipViolation {
                entity_id: "c1".into(),
                entity_kind: EntityKind::Collection,
                description: "collection owner is u2 but was returned for u1".into(),
                severity: crate::models::Severity::High,
            }],
        };

        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.fixed_count, 0);
        assert_eq!(fix.failed_count, 1);
        assert!(fix.errors[0].contains("manual intervention"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failed_fix_does_not_abort_the_rest() {
        let remote = Arc::new(MemoryRemoteStore::new());
        seed_collection(&remote, "c1", "u1", "Coins", 5).await;
        seed_item(&remote, "i1", "u1", "c1").await;

        let validator = ConsistencyValidator::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);
        let repairer = ConsistencyRepairer::new(Arc::clone(&remote) as Arc<dyn RemoteStore>);

        let report = validator.validate("u1").await.unwrap();
        assert_eq!(report.count_mismatches.len(), 1);

        // delete the collection between validation and repair
        remote.delete(EntityKind::Collection, "c1").await.unwrap();

        let fix = repairer.auto_fix(&report).await;
        assert_eq!(fix.failed_count, 1);
        assert!(fix.errors[0].contains("c1"));
        // the batch itself completed and reported, no panic, no early abort
        assert_eq!(fix.total_findings, 1);
    }
}
