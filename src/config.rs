use std::env;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono_tz::Tz;

/// Marker left in `.env.example` values that were never filled in.
const PLACEHOLDER_MARKER: &str = "your_";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_dir: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub gateway: GatewayCredentials,
    pub gateway_timeout_secs: u64,

    pub scheduler: SchedulerSettings,
}

/// Vendor cloud API credentials. Token wins over api key when both are set.
#[derive(Clone, Debug)]
pub struct GatewayCredentials {
    pub api_url: String,
    pub token: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub sync_cron: String,
    pub process_cron: String,
    pub sync_days_back: u32,
    pub timezone: Tz,
}

impl GatewayCredentials {
    pub fn is_configured(&self) -> bool {
        if is_blank_or_placeholder(&self.api_url) {
            return false;
        }
        !(is_blank_or_placeholder(&self.token) && is_blank_or_placeholder(&self.api_key))
    }

    pub fn bearer(&self) -> &str {
        if is_blank_or_placeholder(&self.token) {
            &self.api_key
        } else {
            &self.token
        }
    }
}

fn is_blank_or_placeholder(value: &str) -> bool {
    value.trim().is_empty() || value.contains(PLACEHOLDER_MARKER)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let timezone_name = or_default("BIOMETRIC_TIMEZONE", "Asia/Kolkata");
        let timezone = Tz::from_str(&timezone_name)
            .map_err(|e| anyhow!("invalid BIOMETRIC_TIMEZONE {timezone_name:?}: {e}"))?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            api_prefix: or_default("API_PREFIX", "/api"),
            log_dir: or_default("LOG_DIR", "logs"),

            rate_protected_per_min: parse_number(&lookup, "RATE_PROTECTED_PER_MIN", "1000")?,

            gateway: GatewayCredentials {
                api_url: or_default("ESSL_ADMS_API_URL", "https://api.essl.cloud/v1"),
                token: or_default("ESSL_ADMS_TOKEN", ""),
                api_key: or_default("ESSL_ADMS_API_KEY", ""),
            },
            gateway_timeout_secs: parse_number(&lookup, "ESSL_ADMS_TIMEOUT_SECS", "30")?,

            scheduler: SchedulerSettings {
                // anything but an explicit "false" keeps the jobs on
                enabled: or_default("BIOMETRIC_SCHEDULER_ENABLED", "true") != "false",
                sync_cron: or_default("BIOMETRIC_SYNC_CRON", "30 0 * * *"),
                process_cron: or_default("BIOMETRIC_PROCESS_CRON", "0 1 * * *"),
                sync_days_back: parse_number(&lookup, "BIOMETRIC_SYNC_DAYS_BACK", "7")?,
                timezone,
            },
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: &str) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a number"))
}
