use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::api::AppState;
use crate::auth::context::UserContext;
use crate::error::PipelineError;
use crate::services::reconciliation::ReconcileRequest;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectDeviceRequest {
    #[schema(example = "DEV001")]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SyncQuery {
    /// YYYY-MM-DD, defaults to the sync lookback window start
    pub start_date: Option<String>,
    /// YYYY-MM-DD, defaults to today
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[schema(example = "2026-01-10")]
    pub start_date: Option<String>,
    #[schema(example = "2026-01-10")]
    pub end_date: Option<String>,
    #[schema(example = "DEV001")]
    pub device_id: Option<String>,
}

/// Accepts a calendar date or an RFC 3339 timestamp, read in the configured zone.
fn parse_date_param(
    name: &str,
    value: Option<&str>,
    timezone: &Tz,
) -> Result<Option<NaiveDate>, PipelineError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(timezone).date_naive())
        })
        .map(Some)
        .ok_or_else(|| PipelineError::Validation(format!("Invalid {name}: {raw}")))
}

/// Connect a biometric device
#[utoipa::path(
    post,
    path = "/api/biometric/connect",
    request_body = ConnectDeviceRequest,
    responses(
        (status = 201, description = "Device connected", body = Object, example = json!({
            "success": true,
            "message": "Device connected successfully",
            "device": {
                "id": 1,
                "deviceId": "DEV001",
                "name": "Main Gate",
                "status": "active",
                "lastSync": null,
                "createdAt": "2026-01-01T09:00:00"
            }
        })),
        (status = 400, description = "Missing device id or rejected by eSSL ADMS"),
        (status = 409, description = "Device already connected"),
        (status = 503, description = "eSSL ADMS credentials not configured")
    ),
    tag = "Biometric"
)]
pub async fn connect_device(
    user: UserContext,
    state: web::Data<AppState>,
    payload: web::Json<ConnectDeviceRequest>,
) -> actix_web::Result<impl Responder> {
    let device_id = payload.device_id.as_deref().unwrap_or_default();
    tracing::info!(device_id, role = %user.role, "Connect device requested");

    let device = state.pipeline.connect_device(device_id).await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Device connected successfully",
        "device": device
    })))
}

/// List connected devices with punch counters
#[utoipa::path(
    get,
    path = "/api/biometric/devices",
    responses(
        (status = 200, description = "Connected devices", body = Object, example = json!({
            "success": true,
            "devices": [{
                "id": 1,
                "deviceId": "DEV001",
                "name": "Main Gate",
                "status": "active",
                "lastSync": "2026-01-10T00:30:02",
                "createdAt": "2026-01-01T09:00:00",
                "logCount": 120,
                "unprocessedCount": 4
            }]
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Biometric"
)]
pub async fn list_devices(state: web::Data<AppState>) -> actix_web::Result<impl Responder> {
    let devices = state.pipeline.registry.list().await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "devices": devices
    })))
}

/// Disconnect a device and drop its punch logs
#[utoipa::path(
    delete,
    path = "/api/biometric/devices/{device_id}",
    params(
        ("device_id" = String, Path, description = "Vendor device id")
    ),
    responses(
        (status = 200, description = "Device deleted", body = Object, example = json!({
            "success": true,
            "message": "Device deleted successfully"
        })),
        (status = 404, description = "Device not found")
    ),
    tag = "Biometric"
)]
pub async fn delete_device(
    user: UserContext,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let device_id = path.into_inner();
    tracing::info!(device_id = %device_id, role = %user.role, "Delete device requested");

    state.pipeline.registry.delete(&device_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Device deleted successfully"
    })))
}

/// Pull punches from one device now
#[utoipa::path(
    post,
    path = "/api/biometric/sync/{device_id}",
    params(
        ("device_id" = String, Path, description = "Vendor device id"),
        SyncQuery
    ),
    responses(
        (status = 200, description = "Device synced", body = Object, example = json!({
            "success": true,
            "message": "Synced 2 new records",
            "count": 2,
            "skipped": 0,
            "total": 2
        })),
        (status = 400, description = "Inactive device, bad dates or eSSL ADMS error"),
        (status = 404, description = "Device not found"),
        (status = 503, description = "eSSL ADMS credentials not configured")
    ),
    tag = "Biometric"
)]
pub async fn sync_device(
    user: UserContext,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SyncQuery>,
) -> actix_web::Result<impl Responder> {
    let device_id = path.into_inner();
    let timezone = state.pipeline.timezone();
    let start = parse_date_param("startDate", query.start_date.as_deref(), &timezone)?;
    let end = parse_date_param("endDate", query.end_date.as_deref(), &timezone)?;

    tracing::info!(device_id = %device_id, role = %user.role, "Manual device sync requested");

    let outcome = state.pipeline.sync_device(&device_id, start, end).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("Synced {} new records", outcome.count),
        "count": outcome.count,
        "skipped": outcome.skipped,
        "total": outcome.total
    })))
}

/// Queue a sync of every active device
#[utoipa::path(
    post,
    path = "/api/biometric/sync-all",
    responses(
        (status = 202, description = "Sync queued", body = Object, example = json!({
            "success": true,
            "message": "Sync started for all active devices",
            "jobId": "0b6f7c1e-6d0e-4a7c-9a53-2f3c1f7f6e10"
        })),
        (status = 503, description = "Credentials missing or sync queue full")
    ),
    tag = "Biometric"
)]
pub async fn sync_all_devices(
    user: UserContext,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    if !state.pipeline.credentials_configured() {
        return Err(PipelineError::credentials_missing().into());
    }

    let job_id = state.jobs.submit(state.pipeline.now())?;
    tracing::info!(job_id = %job_id, role = %user.role, "Sync of all devices requested");

    Ok(HttpResponse::Accepted().json(json!({
        "success": true,
        "message": "Sync started for all active devices",
        "jobId": job_id
    })))
}

/// Reconcile unprocessed punches into attendance
#[utoipa::path(
    post,
    path = "/api/biometric/process",
    request_body(content = ProcessRequest, description = "All fields optional; the window defaults to the last 7 days"),
    responses(
        (status = 200, description = "Logs processed", body = Object, example = json!({
            "success": true,
            "message": "Biometric logs processed successfully",
            "summary": {
                "ProcessedFromDate": "2026-01-10",
                "ProcessedToDate": "2026-01-10",
                "LogsMarkedProcessed": 2,
                "EmployeesProcessed": 1,
                "AttendanceRecordsTouched": 1,
                "ProcessedAt": "2026-01-11T01:00:00"
            }
        })),
        (status = 400, description = "Invalid date window"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Biometric"
)]
pub async fn process_logs(
    user: UserContext,
    state: web::Data<AppState>,
    payload: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let body = parse_process_body(&payload)?;
    let timezone = state.pipeline.timezone();

    let request = ReconcileRequest {
        start_date: parse_date_param("startDate", body.start_date.as_deref(), &timezone)?,
        end_date: parse_date_param("endDate", body.end_date.as_deref(), &timezone)?,
        device_id: body.device_id,
    };
    tracing::info!(?request, role = %user.role, "Manual reconciliation requested");

    let summary = state.pipeline.reconcile(&request).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Biometric logs processed successfully",
        "summary": summary
    })))
}

/// An empty body means every field takes its default.
fn parse_process_body(payload: &[u8]) -> Result<ProcessRequest, PipelineError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProcessRequest::default());
    }
    serde_json::from_slice(payload)
        .map_err(|e| PipelineError::Validation(format!("Invalid request body: {e}")))
}

/// Biometric ids and employees that do not line up
#[utoipa::path(
    get,
    path = "/api/biometric/unmapped",
    responses(
        (status = 200, description = "Mapping gaps", body = Object, example = json!({
            "success": true,
            "unmappedBiometricIds": [{
                "biometricUserId": "B999",
                "punchCount": 6,
                "firstSeen": "2026-01-08T09:01:00",
                "lastSeen": "2026-01-10T18:20:00",
                "distinctDays": 3
            }],
            "employeesWithoutBiometricId": [{
                "id": 43,
                "employeeCode": "EMP-043",
                "firstName": "Jane",
                "lastName": "Roe"
            }]
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Biometric"
)]
pub async fn unmapped(
    user: UserContext,
    state: web::Data<AppState>,
) -> actix_web::Result<impl Responder> {
    tracing::debug!(scope = %user.data_scope(), "Unmapped report requested");

    let report = state.pipeline.punches.find_unmapped().await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "unmappedBiometricIds": report.unmapped_biometric_ids,
        "employeesWithoutBiometricId": report.employees_without_biometric_id
    })))
}

/// Integration health
#[utoipa::path(
    get,
    path = "/api/biometric/status",
    responses(
        (status = 200, description = "Integration status", body = Object, example = json!({
            "success": true,
            "status": {
                "activeDevices": 2,
                "unprocessedLogs": 4,
                "processedLogs": 118,
                "lastSync": "2026-01-10T00:30:02",
                "mappedEmployees": 40,
                "unmappedEmployees": 3,
                "credentialsConfigured": true,
                "scheduler": {
                    "enabled": true,
                    "syncCron": "30 0 * * *",
                    "processCron": "0 1 * * *",
                    "syncDaysBack": 7,
                    "timezone": "Asia/Kolkata"
                }
            }
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Biometric"
)]
pub async fn status(state: web::Data<AppState>) -> actix_web::Result<impl Responder> {
    let stats = state.pipeline.stats().await?;
    let scheduler = &state.scheduler;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "status": {
            "activeDevices": stats.active_devices,
            "unprocessedLogs": stats.unprocessed_logs,
            "processedLogs": stats.processed_logs,
            "lastSync": stats.last_sync,
            "mappedEmployees": stats.mapped_employees,
            "unmappedEmployees": stats.unmapped_employees,
            "credentialsConfigured": state.pipeline.credentials_configured(),
            "scheduler": {
                "enabled": scheduler.enabled,
                "syncCron": scheduler.sync_cron,
                "processCron": scheduler.process_cron,
                "syncDaysBack": scheduler.sync_days_back,
                "timezone": scheduler.timezone.name()
            }
        }
    })))
}

/// Check the eSSL ADMS credentials against the vendor
#[utoipa::path(
    get,
    path = "/api/biometric/gateway/test",
    responses(
        (status = 200, description = "Vendor reachable", body = Object, example = json!({
            "success": true,
            "message": "Successfully connected to eSSL ADMS API",
            "deviceCount": 3
        })),
        (status = 400, description = "eSSL ADMS rejected the call"),
        (status = 503, description = "eSSL ADMS credentials not configured")
    ),
    tag = "Biometric"
)]
pub async fn test_gateway(state: web::Data<AppState>) -> actix_web::Result<impl Responder> {
    let device_count = state.pipeline.test_gateway().await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Successfully connected to eSSL ADMS API",
        "deviceCount": device_count
    })))
}
