//! Folds unprocessed punches into daily attendance.
//!
//! The grouping and the merge with an existing attendance day are pure
//! functions; [`ReconciliationEngine`] wraps them in one store transaction so
//! attendance rows and processed flags commit or roll back together.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::PipelineError;
use crate::model::attendance::{AttendanceDay, STATUS_PRESENT};
use crate::model::punch_log::MappedPunch;
use crate::repository::{BiometricRepository, ReconcileFilter};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Caller-supplied bounds; anything left out falls back to the last week.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub device_id: Option<String>,
}

impl ReconcileRequest {
    pub fn resolve(&self, today: NaiveDate) -> Result<ReconcileFilter, PipelineError> {
        let start_date = self
            .start_date
            .unwrap_or(today - Duration::days(DEFAULT_LOOKBACK_DAYS));
        let end_date = self.end_date.unwrap_or(today);

        if start_date > end_date {
            return Err(PipelineError::Validation(
                "startDate must not be after endDate".to_string(),
            ));
        }

        Ok(ReconcileFilter {
            start_date,
            end_date,
            device_id: self
                .device_id
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}

/// What one employee's punches on one date amount to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPunchSummary {
    pub employee_id: u64,
    pub date: NaiveDate,
    pub check_in: NaiveTime,
    pub check_out: NaiveTime,
    pub punch_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
#[schema(example = json!({
    "ProcessedFromDate": "2026-01-03",
    "ProcessedToDate": "2026-01-10",
    "LogsMarkedProcessed": 2,
    "EmployeesProcessed": 1,
    "AttendanceRecordsTouched": 1,
    "ProcessedAt": "2026-01-10T01:00:00"
}))]
pub struct ReconcileSummary {
    #[schema(value_type = String, format = "date")]
    pub processed_from_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub processed_to_date: NaiveDate,
    pub logs_marked_processed: u64,
    pub employees_processed: usize,
    pub attendance_records_touched: usize,
    #[schema(value_type = String, format = "date-time")]
    pub processed_at: NaiveDateTime,
}

/// Groups punches by (employee, date): earliest is check-in, latest is
/// check-out. One punch yields check-in == check-out.
pub fn aggregate_daily(punches: &[MappedPunch]) -> Vec<DailyPunchSummary> {
    let mut days: BTreeMap<(u64, NaiveDate), DailyPunchSummary> = BTreeMap::new();

    for punch in punches {
        let time = whole_seconds(punch.punch_time.time());
        days.entry((punch.employee_id, punch.punch_date()))
            .and_modify(|day| {
                day.check_in = day.check_in.min(time);
                day.check_out = day.check_out.max(time);
                day.punch_count += 1;
            })
            .or_insert(DailyPunchSummary {
                employee_id: punch.employee_id,
                date: punch.punch_date(),
                check_in: time,
                check_out: time,
                punch_count: 1,
            });
    }

    days.into_values().collect()
}

/// Fresh attendance day for a date with no row yet.
pub fn new_attendance_day(derived: &DailyPunchSummary) -> AttendanceDay {
    AttendanceDay {
        employee_id: derived.employee_id,
        date: derived.date,
        status: Some(STATUS_PRESENT.to_string()),
        check_in: Some(derived.check_in),
        check_out: Some(derived.check_out),
        remarks: Some(format!(
            "Auto-imported from biometric device ({} punch(es))",
            derived.punch_count
        )),
    }
}

/// Merges derived times into an existing row. The window only ever widens:
/// an earlier check-in or later check-out replaces the stored value, and a
/// null is filled.
pub fn merge_existing(existing: &AttendanceDay, derived: &DailyPunchSummary) -> AttendanceDay {
    let check_in = match existing.check_in {
        Some(current) => current.min(derived.check_in),
        None => derived.check_in,
    };
    let check_out = match existing.check_out {
        Some(current) => current.max(derived.check_out),
        None => derived.check_out,
    };

    let note = format!("[Biometric: {} punch(es)]", derived.punch_count);
    let remarks = match existing.remarks.as_deref() {
        Some(r) if !r.trim().is_empty() => format!("{r} {note}"),
        _ => note,
    };

    AttendanceDay {
        employee_id: existing.employee_id,
        date: existing.date,
        status: Some(STATUS_PRESENT.to_string()),
        check_in: Some(check_in),
        check_out: Some(check_out),
        remarks: Some(remarks),
    }
}

fn whole_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

pub struct ReconciliationEngine {
    repo: Arc<dyn BiometricRepository>,
}

impl ReconciliationEngine {
    pub fn new(repo: Arc<dyn BiometricRepository>) -> Self {
        Self { repo }
    }

    /// Runs one reconciliation over `request`, resolved against `today`.
    ///
    /// Punches of unmapped or inactive employees are neither merged nor
    /// marked, so they wait for a later run once the mapping exists.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        today: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<ReconcileSummary, PipelineError> {
        let filter = request.resolve(today)?;
        debug!(?filter, "Starting reconciliation");

        let mut tx = self.repo.begin_reconcile().await?;

        let punches = tx.unprocessed_punches(&filter).await?;
        let days = aggregate_daily(&punches);

        for day in &days {
            match tx.attendance_day(day.employee_id, day.date).await? {
                Some(existing) => {
                    tx.update_attendance_day(&merge_existing(&existing, day))
                        .await?
                }
                None => tx.insert_attendance_day(&new_attendance_day(day)).await?,
            }
        }

        let logs_marked_processed = if punches.is_empty() {
            0
        } else {
            tx.mark_processed(&filter).await?
        };

        tx.commit().await?;

        let mut employees: Vec<u64> = days.iter().map(|d| d.employee_id).collect();
        employees.dedup();

        let summary = ReconcileSummary {
            processed_from_date: filter.start_date,
            processed_to_date: filter.end_date,
            logs_marked_processed,
            employees_processed: employees.len(),
            attendance_records_touched: days.len(),
            processed_at: now,
        };

        info!(
            from = %summary.processed_from_date,
            to = %summary.processed_to_date,
            logs = summary.logs_marked_processed,
            employees = summary.employees_processed,
            records = summary.attendance_records_touched,
            "Biometric logs reconciled"
        );

        Ok(summary)
    }
}
