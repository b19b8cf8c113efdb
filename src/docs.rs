use crate::api::biometric::{ConnectDeviceRequest, ProcessRequest};
use crate::model::device::{Device, DeviceOverview, DeviceStatus};
use crate::model::employee::UnmappedEmployee;
use crate::model::punch_log::UnmappedBiometricId;
use crate::services::reconciliation::ReconcileSummary;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Biometric Integration API",
        version = "1.0.0",
        description = r#"
## Biometric Attendance Integration

Connects eSSL ADMS biometric terminals to the HRM attendance register.

### 🔹 Pipeline
- **Devices**
  - Connect a terminal after the vendor confirms it, list it with punch counters, remove it
- **Sync**
  - Pull raw punches per device or for every active device; re-pulling never duplicates
- **Processing**
  - Fold unprocessed punches into one attendance row per employee and day

### 🕒 Scheduling
Sync and processing also run on cron schedules in the configured timezone.

### 📦 Response Format
- JSON bodies carrying a `success` flag
- Errors as `{ success: false, message, error }`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::biometric::connect_device,
        crate::api::biometric::list_devices,
        crate::api::biometric::delete_device,
        crate::api::biometric::sync_device,
        crate::api::biometric::sync_all_devices,
        crate::api::biometric::process_logs,
        crate::api::biometric::unmapped,
        crate::api::biometric::status,
        crate::api::biometric::test_gateway
    ),
    components(
        schemas(
            ConnectDeviceRequest,
            ProcessRequest,
            Device,
            DeviceOverview,
            DeviceStatus,
            UnmappedBiometricId,
            UnmappedEmployee,
            ReconcileSummary
        )
    ),
    tags(
        (name = "Biometric", description = "Biometric device and attendance sync APIs"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        assert_eq!(paths.len(), 9);
        assert!(doc.paths.paths.contains_key("/api/biometric/sync/{device_id}"));
        assert!(doc.paths.paths.contains_key("/api/biometric/gateway/test"));
    }
}
