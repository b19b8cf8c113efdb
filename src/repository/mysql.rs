use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{MySql, MySqlPool, Transaction};

use super::{BiometricRepository, PipelineStats, ReconcileFilter, ReconcileTx, StoreError};
use crate::model::attendance::AttendanceDay;
use crate::model::device::{Device, DeviceOverview, DeviceStatus};
use crate::model::employee::UnmappedEmployee;
use crate::model::punch_log::{CanonicalPunch, MappedPunch, PunchKey, UnmappedBiometricId};

/// Unique-key violations become `Duplicate`; everything else stays a database error.
fn classify(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(e)
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: u64,
    device_id: String,
    device_name: Option<String>,
    status: String,
    last_sync: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|_| {
            tracing::warn!(device_id = %row.device_id, status = %row.status, "Unknown device status, treating as inactive");
            DeviceStatus::Inactive
        });

        Device {
            id: row.id,
            name: row.device_name.unwrap_or_else(|| row.device_id.clone()),
            device_id: row.device_id,
            status,
            last_sync: row.last_sync,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DeviceOverviewRow {
    #[sqlx(flatten)]
    device: DeviceRow,
    log_count: i64,
    unprocessed_count: i64,
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    active_devices: i64,
    unprocessed_logs: i64,
    processed_logs: i64,
    last_sync: Option<NaiveDateTime>,
    mapped_employees: i64,
    unmapped_employees: i64,
}

const DEVICE_COLUMNS: &str = "id, device_id, device_name, status, last_sync, created_at";

/// MySQL backed store. The pool is built in `main` and handed in.
#[derive(Clone)]
pub struct MySqlRepository {
    pool: MySqlPool,
}

impl MySqlRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BiometricRepository for MySqlRepository {
    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, StoreError> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM biometric_devices WHERE device_id = ?");

        let row = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Device::from))
    }

    async fn insert_device(&self, device_id: &str, name: &str) -> Result<Device, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO biometric_devices (device_id, device_name, status, created_at, updated_at)
            VALUES (?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(device_id)
        .bind(name)
        .bind(DeviceStatus::Active.as_ref())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        self.find_device(device_id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn list_devices(&self) -> Result<Vec<DeviceOverview>, StoreError> {
        let rows = sqlx::query_as::<_, DeviceOverviewRow>(
            r#"
            SELECT
                d.id,
                d.device_id,
                d.device_name,
                d.status,
                d.last_sync,
                d.created_at,
                (SELECT COUNT(*) FROM biometric_logs l WHERE l.device_id = d.device_id) AS log_count,
                (SELECT COUNT(*) FROM biometric_logs l
                  WHERE l.device_id = d.device_id AND l.processed = 0) AS unprocessed_count
            FROM biometric_devices d
            ORDER BY d.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DeviceOverview::new(r.device.into(), r.log_count, r.unprocessed_count))
            .collect())
    }

    async fn active_devices(&self) -> Result<Vec<Device>, StoreError> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM biometric_devices WHERE status = ? ORDER BY id"
        );

        let rows = sqlx::query_as::<_, DeviceRow>(&sql)
            .bind(DeviceStatus::Active.as_ref())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, StoreError> {
        // biometric_logs.device_id references the device ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM biometric_devices WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_sync(&self, device_id: &str, at: NaiveDateTime) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE biometric_devices SET last_sync = ?, updated_at = NOW() WHERE device_id = ?",
        )
        .bind(at)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn punch_exists(&self, key: PunchKey<'_>) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM biometric_logs
                WHERE device_id = ? AND biometric_user_id = ? AND punch_time = ?
            )
            "#,
        )
        .bind(key.device_id)
        .bind(key.biometric_user_id)
        .bind(key.punch_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists > 0)
    }

    async fn insert_punch(&self, device_id: &str, punch: &CanonicalPunch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO biometric_logs
                (device_id, biometric_user_id, punch_time, punch_type, raw_json, processed, created_at)
            VALUES (?, ?, ?, ?, ?, 0, NOW())
            "#,
        )
        .bind(device_id)
        .bind(&punch.biometric_user_id)
        .bind(punch.punch_time)
        .bind(punch.punch_type.as_ref())
        .bind(punch.raw_payload.to_string())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn unmapped_biometric_ids(&self) -> Result<Vec<UnmappedBiometricId>, StoreError> {
        let rows = sqlx::query_as::<_, UnmappedBiometricId>(
            r#"
            SELECT
                bl.biometric_user_id,
                COUNT(*)                          AS punch_count,
                MIN(bl.punch_time)                AS first_seen,
                MAX(bl.punch_time)                AS last_seen,
                COUNT(DISTINCT DATE(bl.punch_time)) AS distinct_days
            FROM biometric_logs bl
            LEFT JOIN employees e
                ON e.biometric_id = bl.biometric_user_id
               AND e.status = 'active'
            WHERE e.id IS NULL
            GROUP BY bl.biometric_user_id
            ORDER BY punch_count DESC, bl.biometric_user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn employees_without_biometric_id(&self) -> Result<Vec<UnmappedEmployee>, StoreError> {
        let rows = sqlx::query_as::<_, UnmappedEmployee>(
            r#"
            SELECT id, employee_code, first_name, last_name
            FROM employees
            WHERE status = 'active'
              AND (biometric_id IS NULL OR biometric_id = '')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn stats(&self) -> Result<PipelineStats, StoreError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM biometric_devices WHERE status = 'active') AS active_devices,
                (SELECT COUNT(*) FROM biometric_logs WHERE processed = 0)        AS unprocessed_logs,
                (SELECT COUNT(*) FROM biometric_logs WHERE processed = 1)        AS processed_logs,
                (SELECT MAX(last_sync) FROM biometric_devices)                   AS last_sync,
                (SELECT COUNT(*) FROM employees
                  WHERE status = 'active' AND biometric_id IS NOT NULL AND biometric_id <> '')
                                                                                 AS mapped_employees,
                (SELECT COUNT(*) FROM employees
                  WHERE status = 'active' AND (biometric_id IS NULL OR biometric_id = ''))
                                                                                 AS unmapped_employees
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PipelineStats {
            active_devices: row.active_devices,
            unprocessed_logs: row.unprocessed_logs,
            processed_logs: row.processed_logs,
            last_sync: row.last_sync,
            mapped_employees: row.mapped_employees,
            unmapped_employees: row.unmapped_employees,
        })
    }

    async fn begin_reconcile(&self) -> Result<Box<dyn ReconcileTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlReconcileTx { tx }))
    }
}

pub struct MySqlReconcileTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl ReconcileTx for MySqlReconcileTx {
    async fn unprocessed_punches(
        &mut self,
        filter: &ReconcileFilter,
    ) -> Result<Vec<MappedPunch>, StoreError> {
        // FOR UPDATE keeps a concurrent run from consuming the same rows
        let rows = sqlx::query_as::<_, MappedPunch>(
            r#"
            SELECT bl.id, bl.device_id, e.id AS employee_id, bl.punch_time
            FROM biometric_logs bl
            INNER JOIN employees e ON e.biometric_id = bl.biometric_user_id
            WHERE bl.processed = 0
              AND e.status = 'active'
              AND e.biometric_id IS NOT NULL
              AND DATE(bl.punch_time) BETWEEN ? AND ?
              AND (? IS NULL OR bl.device_id = ?)
            ORDER BY bl.punch_time
            FOR UPDATE
            "#,
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.device_id.as_deref())
        .bind(filter.device_id.as_deref())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows)
    }

    async fn attendance_day(
        &mut self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceDay>, StoreError> {
        let row = sqlx::query_as::<_, AttendanceDay>(
            r#"
            SELECT employee_id, date, status, check_in, check_out, remarks
            FROM attendance
            WHERE employee_id = ? AND date = ?
            FOR UPDATE
            "#,
        )
        .bind(employee_id)
        .bind(date)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row)
    }

    async fn insert_attendance_day(&mut self, day: &AttendanceDay) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attendance
                (employee_id, date, status, check_in, check_out, remarks)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(day.employee_id)
        .bind(day.date)
        .bind(day.status.as_deref())
        .bind(day.check_in)
        .bind(day.check_out)
        .bind(day.remarks.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn update_attendance_day(&mut self, day: &AttendanceDay) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE attendance
            SET status = ?, check_in = ?, check_out = ?, remarks = ?
            WHERE employee_id = ? AND date = ?
            "#,
        )
        .bind(day.status.as_deref())
        .bind(day.check_in)
        .bind(day.check_out)
        .bind(day.remarks.as_deref())
        .bind(day.employee_id)
        .bind(day.date)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn mark_processed(&mut self, filter: &ReconcileFilter) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE biometric_logs bl
            INNER JOIN employees e ON e.biometric_id = bl.biometric_user_id
            SET bl.processed = 1
            WHERE bl.processed = 0
              AND e.status = 'active'
              AND e.biometric_id IS NOT NULL
              AND DATE(bl.punch_time) BETWEEN ? AND ?
              AND (? IS NULL OR bl.device_id = ?)
            "#,
        )
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.device_id.as_deref())
        .bind(filter.device_id.as_deref())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MySqlReconcileTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
