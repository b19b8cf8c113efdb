use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum PunchType {
    #[strum(to_string = "IN", serialize = "I", serialize = "CHECKIN", serialize = "CHECK-IN", serialize = "CHECK_IN")]
    #[serde(rename = "IN")]
    In,
    #[strum(to_string = "OUT", serialize = "O", serialize = "CHECKOUT", serialize = "CHECK-OUT", serialize = "CHECK_OUT")]
    #[serde(rename = "OUT")]
    Out,
}

/// Vendor punch translated into the pipeline's own shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPunch {
    pub biometric_user_id: String,
    /// Wall-clock time in the configured zone, whole seconds.
    pub punch_time: NaiveDateTime,
    pub punch_type: PunchType,
    pub raw_payload: Value,
}

/// The dedup identity of a stored punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PunchKey<'a> {
    pub device_id: &'a str,
    pub biometric_user_id: &'a str,
    pub punch_time: NaiveDateTime,
}

impl CanonicalPunch {
    pub fn key<'a>(&'a self, device_id: &'a str) -> PunchKey<'a> {
        PunchKey {
            device_id,
            biometric_user_id: &self.biometric_user_id,
            punch_time: self.punch_time,
        }
    }
}

/// Unprocessed punch joined to the active employee its biometric id maps to.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MappedPunch {
    pub id: u64,
    pub device_id: String,
    pub employee_id: u64,
    pub punch_time: NaiveDateTime,
}

impl MappedPunch {
    pub fn punch_date(&self) -> NaiveDate {
        self.punch_time.date()
    }
}

/// Diagnostic row: a biometric id seen on devices with no active employee behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "biometricUserId": "B999",
    "punchCount": 6,
    "firstSeen": "2026-01-08T09:01:00",
    "lastSeen": "2026-01-10T18:20:00",
    "distinctDays": 3
}))]
pub struct UnmappedBiometricId {
    pub biometric_user_id: String,
    pub punch_count: i64,
    #[schema(value_type = String, format = "date-time")]
    pub first_seen: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub last_seen: NaiveDateTime,
    pub distinct_days: i64,
}
