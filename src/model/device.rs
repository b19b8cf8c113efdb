use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr, ToSchema,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

/// One registered biometric terminal.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": 1,
    "deviceId": "DEV001",
    "name": "Main Gate",
    "status": "active",
    "lastSync": "2026-01-10T00:30:02",
    "createdAt": "2026-01-01T09:00:00"
}))]
pub struct Device {
    pub id: u64,
    pub device_id: String,
    pub name: String,
    pub status: DeviceStatus,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub last_sync: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

impl Device {
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }
}

/// Device row plus punch counters, as shown on the device list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOverview {
    pub id: u64,
    pub device_id: String,
    pub name: String,
    pub status: DeviceStatus,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub last_sync: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(example = 120)]
    pub log_count: i64,
    #[schema(example = 4)]
    pub unprocessed_count: i64,
}

impl DeviceOverview {
    pub fn new(device: Device, log_count: i64, unprocessed_count: i64) -> Self {
        Self {
            id: device.id,
            device_id: device.device_id,
            name: device.name,
            status: device.status,
            last_sync: device.last_sync,
            created_at: device.created_at,
            log_count,
            unprocessed_count,
        }
    }
}
