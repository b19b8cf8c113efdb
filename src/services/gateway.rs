//! eSSL ADMS cloud API adapter.
//!
//! Every transport, status and body-shape problem is folded into a single
//! [`GatewayError`] here, so callers only branch on a closed set of variants.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use chrono_tz::Tz;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::GatewayCredentials;
use crate::model::punch_log::{CanonicalPunch, PunchType};

const VENDOR_DATE_FORMAT: &str = "%Y-%m-%d";
const NAIVE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("eSSL ADMS API did not answer in time")]
    Timeout,

    #[error("eSSL ADMS API rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Unexpected eSSL ADMS response: {0}")]
    Malformed(String),
}

/// What the vendor reports about a device it knows.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: Option<String>,
    pub status: Option<String>,
    pub model: Option<String>,
    pub location: Option<String>,
}

#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Confirms the device exists in the vendor account.
    async fn validate_device(&self, device_id: &str) -> Result<DeviceInfo, GatewayError>;

    /// Punches recorded by `device_id` between the two dates, inclusive.
    async fn fetch_punches(
        &self,
        device_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<CanonicalPunch>, GatewayError>;

    /// Lists vendor devices; returns how many the account holds.
    async fn test_connection(&self) -> Result<usize, GatewayError>;
}

#[derive(Debug, Default, Deserialize)]
struct VendorEnvelope {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    device: Option<VendorDevice>,
    logs: Option<Vec<Value>>,
    data: Option<Vec<Value>>,
    devices: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendorDevice {
    device_id: Option<String>,
    device_name: Option<String>,
    name: Option<String>,
    status: Option<String>,
    model: Option<String>,
    location: Option<String>,
}

pub struct EsslAdmsGateway {
    client: Client,
    base_url: String,
    bearer: String,
    timezone: Tz,
}

impl EsslAdmsGateway {
    pub fn new(
        credentials: &GatewayCredentials,
        timeout: Duration,
        timezone: Tz,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: credentials.api_url.trim().to_string(),
            bearer: credentials.bearer().to_string(),
            timezone,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Unavailable(format!("Invalid ESSL_ADMS_API_URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Unavailable("ESSL_ADMS_API_URL must be an http(s) URL".to_string())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_envelope(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<VendorEnvelope, GatewayError> {
        debug!(url = %url, "Calling eSSL ADMS API");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer)
            .query(query)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<VendorEnvelope>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| format!("eSSL ADMS API returned {status}"));
            return Err(classify_status(status, message));
        }

        response
            .json::<VendorEnvelope>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl DeviceGateway for EsslAdmsGateway {
    async fn validate_device(&self, device_id: &str) -> Result<DeviceInfo, GatewayError> {
        if device_id.trim().is_empty() {
            return Err(GatewayError::NotFound("Device ID is required".to_string()));
        }

        let body = self
            .get_envelope(self.endpoint(&["devices", device_id])?, &[])
            .await?;

        device_info_from(device_id, body)
    }

    async fn fetch_punches(
        &self,
        device_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<CanonicalPunch>, GatewayError> {
        let query = [
            ("startDate", format_vendor_date(start_date)),
            ("endDate", format_vendor_date(end_date)),
        ];

        let body = self
            .get_envelope(self.endpoint(&["devices", device_id, "attendance"])?, &query)
            .await?;

        if !body.success {
            return Err(GatewayError::Unavailable(
                body.message
                    .unwrap_or_else(|| "No attendance data found".to_string()),
            ));
        }

        let records = body.logs.or(body.data).unwrap_or_default();
        Ok(normalize_records(device_id, &records, &self.timezone))
    }

    async fn test_connection(&self) -> Result<usize, GatewayError> {
        let body = self.get_envelope(self.endpoint(&["devices"])?, &[]).await?;
        Ok(body.devices.map(|d| d.len()).unwrap_or(0))
    }
}

fn device_info_from(device_id: &str, body: VendorEnvelope) -> Result<DeviceInfo, GatewayError> {
    match (body.success, body.device) {
        (true, Some(device)) => Ok(DeviceInfo {
            device_id: device.device_id.unwrap_or_else(|| device_id.to_string()),
            device_name: device.device_name.or(device.name),
            status: device.status,
            model: device.model,
            location: device.location,
        }),
        (true, None) => Err(GatewayError::Malformed(
            "device validation succeeded without device details".to_string(),
        )),
        (false, _) => Err(GatewayError::NotFound(
            body.message
                .unwrap_or_else(|| "Device not found in ADMS account".to_string()),
        )),
    }
}

pub fn classify_status(status: StatusCode, message: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(message),
        StatusCode::NOT_FOUND => GatewayError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayError::Timeout,
        _ => GatewayError::Unavailable(message),
    }
}

fn classify_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_decode() {
        GatewayError::Malformed(e.to_string())
    } else {
        GatewayError::Unavailable(format!("Unable to connect to eSSL ADMS API: {e}"))
    }
}

pub fn format_vendor_date(date: NaiveDate) -> String {
    date.format(VENDOR_DATE_FORMAT).to_string()
}

/// Normalizes vendor records, dropping (and logging) the ones that lack a
/// user id or a readable time.
pub fn normalize_records(device_id: &str, records: &[Value], timezone: &Tz) -> Vec<CanonicalPunch> {
    records
        .iter()
        .filter_map(|record| match normalize_punch(record, timezone) {
            Ok(punch) => Some(punch),
            Err(reason) => {
                warn!(device_id, reason, record = %record, "Dropping unreadable vendor punch");
                None
            }
        })
        .collect()
}

pub fn normalize_punch(record: &Value, timezone: &Tz) -> Result<CanonicalPunch, &'static str> {
    let biometric_user_id = first_field(record, &["userId", "employeeId", "user_id"])
        .and_then(id_string)
        .ok_or("missing user id")?;

    let punch_time = first_field(record, &["punchTime", "timestamp", "time"])
        .ok_or("missing punch time")
        .and_then(|v| parse_punch_time(v, timezone).ok_or("unreadable punch time"))?;

    Ok(CanonicalPunch {
        biometric_user_id,
        punch_time,
        punch_type: derive_punch_type(record),
        raw_payload: record.clone(),
    })
}

/// Explicit type field, then the numeric verify/status code, then IN.
pub fn derive_punch_type(record: &Value) -> PunchType {
    for field in ["punchType", "type", "direction"] {
        if let Some(Value::String(s)) = record.get(field) {
            if let Ok(punch_type) = s.trim().parse::<PunchType>() {
                return punch_type;
            }
        }
    }

    let code = |field: &str| record.get(field).and_then(Value::as_i64);
    if code("verifyMode") == Some(0) || code("status") == Some(0) {
        return PunchType::In;
    }
    if code("verifyMode") == Some(1) || code("status") == Some(1) {
        return PunchType::Out;
    }

    PunchType::In
}

fn first_field<'a>(record: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| record.get(*name).filter(|v| !v.is_null()))
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Offset-carrying times are moved into `timezone`; bare times are already wall clock.
fn parse_punch_time(value: &Value, timezone: &Tz) -> Option<NaiveDateTime> {
    let local = match value {
        Value::String(s) => {
            let s = s.trim();
            match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => dt.with_timezone(timezone).naive_local(),
                Err(_) => NAIVE_TIME_FORMATS
                    .iter()
                    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())?,
            }
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // 13-digit values are epoch millis
            let secs = if raw.abs() >= 1_000_000_000_000 { raw / 1000 } else { raw };
            DateTime::from_timestamp(secs, 0)?
                .with_timezone(timezone)
                .naive_local()
        }
        _ => return None,
    };

    local.with_nanosecond(0)
}
