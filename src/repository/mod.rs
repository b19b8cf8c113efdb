//! Storage seam for the biometric pipeline.
//!
//! Everything the pipeline persists goes through [`BiometricRepository`]; the
//! reconciliation merge runs inside a [`ReconcileTx`] so attendance rows and
//! processed flags commit together.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::model::attendance::AttendanceDay;
use crate::model::device::{Device, DeviceOverview};
use crate::model::employee::UnmappedEmployee;
use crate::model::punch_log::{CanonicalPunch, MappedPunch, PunchKey, UnmappedBiometricId};

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (device id, punch triple) already holds this row.
    #[error("record already exists")]
    Duplicate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Punch filter shared by the select and the processed-flag update of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFilter {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub device_id: Option<String>,
}

/// Counters for the integration health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub active_devices: i64,
    pub unprocessed_logs: i64,
    pub processed_logs: i64,
    pub last_sync: Option<NaiveDateTime>,
    pub mapped_employees: i64,
    pub unmapped_employees: i64,
}

#[async_trait]
pub trait BiometricRepository: Send + Sync {
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, StoreError>;

    /// Inserts an active device; `StoreError::Duplicate` when the id is taken.
    async fn insert_device(&self, device_id: &str, name: &str) -> Result<Device, StoreError>;

    async fn list_devices(&self) -> Result<Vec<DeviceOverview>, StoreError>;

    async fn active_devices(&self) -> Result<Vec<Device>, StoreError>;

    /// Removes the device and, through the cascade, its punch logs.
    async fn delete_device(&self, device_id: &str) -> Result<bool, StoreError>;

    async fn touch_sync(&self, device_id: &str, at: NaiveDateTime) -> Result<(), StoreError>;

    async fn punch_exists(&self, key: PunchKey<'_>) -> Result<bool, StoreError>;

    /// Stores an unprocessed punch; `StoreError::Duplicate` when the triple exists.
    async fn insert_punch(&self, device_id: &str, punch: &CanonicalPunch) -> Result<(), StoreError>;

    async fn unmapped_biometric_ids(&self) -> Result<Vec<UnmappedBiometricId>, StoreError>;

    async fn employees_without_biometric_id(&self) -> Result<Vec<UnmappedEmployee>, StoreError>;

    async fn stats(&self) -> Result<PipelineStats, StoreError>;

    async fn begin_reconcile(&self) -> Result<Box<dyn ReconcileTx>, StoreError>;
}

/// One reconciliation run. Nothing is visible to others until `commit`;
/// dropping the value rolls back.
#[async_trait]
pub trait ReconcileTx: Send {
    /// Unprocessed punches of active, mapped employees matching the filter.
    async fn unprocessed_punches(
        &mut self,
        filter: &ReconcileFilter,
    ) -> Result<Vec<MappedPunch>, StoreError>;

    async fn attendance_day(
        &mut self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, StoreError>;

    async fn insert_attendance_day(&mut self, day: &AttendanceDay) -> Result<(), StoreError>;

    async fn update_attendance_day(&mut self, day: &AttendanceDay) -> Result<(), StoreError>;

    /// Flips `processed` on every punch the filter selects; returns rows changed.
    async fn mark_processed(&mut self, filter: &ReconcileFilter) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
