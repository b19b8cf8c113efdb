use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::error::PipelineError;
use crate::model::employee::UnmappedEmployee;
use crate::model::punch_log::{CanonicalPunch, UnmappedBiometricId};
use crate::repository::{BiometricRepository, StoreError};

/// Column width of `biometric_logs.biometric_user_id`.
const MAX_BIOMETRIC_ID_LEN: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

/// Both sides of the biometric id mapping gap.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnmappedReport {
    pub unmapped_biometric_ids: Vec<UnmappedBiometricId>,
    pub employees_without_biometric_id: Vec<UnmappedEmployee>,
}

/// Idempotent store of raw punches.
#[derive(Clone)]
pub struct PunchLogStore {
    repo: Arc<dyn BiometricRepository>,
}

impl PunchLogStore {
    pub fn new(repo: Arc<dyn BiometricRepository>) -> Self {
        Self { repo }
    }

    /// Stores each punch not already held for `(device, user, time)`.
    ///
    /// A punch that already exists, or that loses an insert race to a
    /// concurrent sync, counts as skipped. A punch that fails validation or
    /// hits any other database error is logged and counted as neither, so
    /// one bad row never aborts the batch.
    pub async fn upsert_batch(&self, device_id: &str, punches: &[CanonicalPunch]) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();

        for punch in punches {
            if let Err(reason) = validate(punch) {
                warn!(device_id, reason, "Rejecting punch");
                continue;
            }

            match self.repo.punch_exists(punch.key(device_id)).await {
                Ok(true) => {
                    outcome.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(device_id, biometric_user_id = %punch.biometric_user_id, error = %e, "Punch lookup failed");
                    continue;
                }
            }

            match self.repo.insert_punch(device_id, punch).await {
                Ok(()) => outcome.inserted += 1,
                Err(StoreError::Duplicate) => {
                    debug!(device_id, biometric_user_id = %punch.biometric_user_id, "Punch stored concurrently");
                    outcome.skipped += 1;
                }
                Err(e) => {
                    error!(
                        device_id,
                        biometric_user_id = %punch.biometric_user_id,
                        punch_time = %punch.punch_time,
                        error = %e,
                        "Error inserting biometric log"
                    );
                }
            }
        }

        outcome
    }

    pub async fn find_unmapped(&self) -> Result<UnmappedReport, PipelineError> {
        Ok(UnmappedReport {
            unmapped_biometric_ids: self.repo.unmapped_biometric_ids().await?,
            employees_without_biometric_id: self.repo.employees_without_biometric_id().await?,
        })
    }
}

fn validate(punch: &CanonicalPunch) -> Result<(), &'static str> {
    let id = punch.biometric_user_id.trim();
    if id.is_empty() {
        return Err("empty biometric user id");
    }
    if id.chars().count() > MAX_BIOMETRIC_ID_LEN {
        return Err("biometric user id too long");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device::DeviceStatus;
    use crate::model::punch_log::PunchType;
    use crate::repository::memory::MemoryRepository;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    fn punch(user: &str, time: &str) -> CanonicalPunch {
        CanonicalPunch {
            biometric_user_id: user.to_string(),
            punch_time: NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S").unwrap(),
            punch_type: PunchType::In,
            raw_payload: json!({ "userId": user, "punchTime": time }),
        }
    }

    fn store() -> (MemoryRepository, PunchLogStore) {
        let repo = MemoryRepository::new();
        repo.add_device("DEV001", DeviceStatus::Active);
        let store = PunchLogStore::new(Arc::new(repo.clone()));
        (repo, store)
    }

    #[tokio::test]
    async fn second_ingestion_of_same_batch_only_skips() {
        let (repo, store) = store();
        let batch = vec![
            punch("B123", "2026-01-10 09:02:00"),
            punch("B123", "2026-01-10 18:15:00"),
        ];

        let first = store.upsert_batch("DEV001", &batch).await;
        let second = store.upsert_batch("DEV001", &batch).await;

        assert_eq!(first, UpsertOutcome { inserted: 2, skipped: 0 });
        assert_eq!(second, UpsertOutcome { inserted: 0, skipped: 2 });
        assert_eq!(repo.punches().len(), 2);
        assert!(repo.punches().iter().all(|p| !p.processed));
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_are_skipped() {
        let (repo, store) = store();
        let batch = vec![
            punch("B123", "2026-01-10 09:02:00"),
            punch("B123", "2026-01-10 09:02:00"),
        ];

        let outcome = store.upsert_batch("DEV001", &batch).await;

        assert_eq!(outcome, UpsertOutcome { inserted: 1, skipped: 1 });
        assert_eq!(repo.punches().len(), 1);
    }

    #[tokio::test]
    async fn lost_insert_race_counts_as_skipped() {
        let (repo, store) = store();
        let batch = vec![punch("B123", "2026-01-10 09:02:00")];
        store.upsert_batch("DEV001", &batch).await;

        repo.set_stale_reads(true);
        let outcome = store.upsert_batch("DEV001", &batch).await;

        assert_eq!(outcome, UpsertOutcome { inserted: 0, skipped: 1 });
        assert_eq!(repo.punches().len(), 1);
    }

    #[tokio::test]
    async fn failing_rows_do_not_abort_the_batch() {
        let (repo, store) = store();
        repo.poison_biometric_id("B666");
        let batch = vec![
            punch("B666", "2026-01-10 09:00:00"),
            punch("", "2026-01-10 09:01:00"),
            punch("B123", "2026-01-10 09:02:00"),
        ];

        let outcome = store.upsert_batch("DEV001", &batch).await;

        assert_eq!(outcome, UpsertOutcome { inserted: 1, skipped: 0 });
        assert_eq!(repo.punches().len(), 1);
        assert_eq!(repo.punches()[0].biometric_user_id, "B123");
    }

    #[tokio::test]
    async fn id_length_limit_counts_characters() {
        let (repo, store) = store();
        let multibyte = "é".repeat(60);
        let batch = vec![
            punch(&multibyte, "2026-01-10 09:00:00"),
            punch(&"x".repeat(101), "2026-01-10 09:01:00"),
        ];

        let outcome = store.upsert_batch("DEV001", &batch).await;

        assert_eq!(outcome, UpsertOutcome { inserted: 1, skipped: 0 });
        assert_eq!(repo.punches().len(), 1);
        assert_eq!(repo.punches()[0].biometric_user_id, multibyte);
    }

    #[tokio::test]
    async fn unmapped_report_lists_both_sides() {
        let (repo, store) = store();
        repo.add_employee(42, Some("B123"), true);
        repo.add_employee(43, None, true);
        store
            .upsert_batch(
                "DEV001",
                &[
                    punch("B123", "2026-01-10 09:02:00"),
                    punch("B999", "2026-01-09 09:00:00"),
                    punch("B999", "2026-01-10 09:00:00"),
                ],
            )
            .await;

        let report = store.find_unmapped().await.unwrap();

        assert_eq!(report.unmapped_biometric_ids.len(), 1);
        let unmapped = &report.unmapped_biometric_ids[0];
        assert_eq!(unmapped.biometric_user_id, "B999");
        assert_eq!(unmapped.punch_count, 2);
        assert_eq!(unmapped.distinct_days, 2);
        assert_eq!(unmapped.first_seen.date(), NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());

        assert_eq!(report.employees_without_biometric_id.len(), 1);
        assert_eq!(report.employees_without_biometric_id[0].id, 43);
    }
}
