//! Sync orchestration: gateway fetch, punch ingestion and reconciliation for
//! one device or for every active device.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::error::PipelineError;
use crate::model::device::Device;
use crate::repository::{BiometricRepository, PipelineStats};
use crate::services::device_registry::DeviceRegistry;
use crate::services::gateway::DeviceGateway;
use crate::services::punch_store::PunchLogStore;
use crate::services::reconciliation::{ReconcileRequest, ReconcileSummary, ReconciliationEngine};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub credentials_configured: bool,
    pub sync_days_back: u32,
    pub timezone: Tz,
}

/// Result of pulling one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncOutcome {
    /// Newly stored punches.
    pub count: usize,
    pub skipped: usize,
    /// Punches the gateway returned.
    pub total: usize,
}

/// Totals of one pass over every active device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncAllReport {
    pub devices: usize,
    pub failed: usize,
    pub inserted: usize,
    pub skipped: usize,
}

pub struct BiometricPipeline {
    pub registry: DeviceRegistry,
    pub punches: PunchLogStore,
    pub reconciler: ReconciliationEngine,
    repo: Arc<dyn BiometricRepository>,
    gateway: Arc<dyn DeviceGateway>,
    settings: PipelineSettings,
}

impl BiometricPipeline {
    pub fn new(
        repo: Arc<dyn BiometricRepository>,
        gateway: Arc<dyn DeviceGateway>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(repo.clone(), gateway.clone()),
            punches: PunchLogStore::new(repo.clone()),
            reconciler: ReconciliationEngine::new(repo.clone()),
            repo,
            gateway,
            settings,
        }
    }

    pub fn credentials_configured(&self) -> bool {
        self.settings.credentials_configured
    }

    pub fn timezone(&self) -> Tz {
        self.settings.timezone
    }

    /// Wall clock in the configured zone, whole seconds.
    pub fn now(&self) -> NaiveDateTime {
        let now = Utc::now().with_timezone(&self.settings.timezone).naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn require_credentials(&self) -> Result<(), PipelineError> {
        if self.settings.credentials_configured {
            Ok(())
        } else {
            Err(PipelineError::credentials_missing())
        }
    }

    /// Missing bounds default to `sync_days_back` days ending today.
    pub fn sync_window(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(NaiveDate, NaiveDate), PipelineError> {
        let end = end.unwrap_or_else(|| self.today());
        let start = start.unwrap_or(end - Duration::days(i64::from(self.settings.sync_days_back)));
        if start > end {
            return Err(PipelineError::Validation(
                "startDate must not be after endDate".to_string(),
            ));
        }
        Ok((start, end))
    }

    pub async fn connect_device(&self, device_id: &str) -> Result<Device, PipelineError> {
        if device_id.trim().is_empty() {
            return Err(PipelineError::Validation("Device ID is required".to_string()));
        }
        self.require_credentials()?;
        self.registry.connect(device_id).await
    }

    /// On-demand pull of one registered, active device.
    pub async fn sync_device(
        &self,
        device_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<SyncOutcome, PipelineError> {
        if !self.registry.is_active(device_id).await? {
            return Err(PipelineError::Validation("Device is not active".to_string()));
        }
        self.require_credentials()?;

        let (start, end) = self.sync_window(start, end)?;
        self.pull(device_id, start, end).await
    }

    async fn pull(
        &self,
        device_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SyncOutcome, PipelineError> {
        info!(device_id, %start, %end, "Syncing biometric device");

        let punches = self
            .gateway
            .fetch_punches(device_id, start, end)
            .await
            .map_err(|e| {
                warn!(device_id, error = %e, "Fetching punches failed");
                PipelineError::Upstream(e)
            })?;

        let stored = self.punches.upsert_batch(device_id, &punches).await;
        self.registry.touch_sync(device_id, self.now()).await?;

        let outcome = SyncOutcome {
            count: stored.inserted,
            skipped: stored.skipped,
            total: punches.len(),
        };
        info!(
            device_id,
            inserted = outcome.count,
            skipped = outcome.skipped,
            total = outcome.total,
            "Device sync finished"
        );
        Ok(outcome)
    }

    /// Pulls every active device in turn over the default window. One
    /// device failing is logged and the pass moves on.
    pub async fn run_sync_all_devices(&self) -> SyncAllReport {
        let mut report = SyncAllReport::default();

        if !self.settings.credentials_configured {
            warn!("eSSL ADMS credentials not configured. Skipping sync");
            return report;
        }

        let devices = match self.registry.active().await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "Fatal error during biometric sync");
                return report;
            }
        };

        if devices.is_empty() {
            info!("No active biometric devices to sync");
            return report;
        }

        let (start, end) = match self.sync_window(None, None) {
            Ok(window) => window,
            Err(e) => {
                error!(error = %e, "Could not resolve sync window");
                return report;
            }
        };

        info!(devices = devices.len(), %start, %end, "Starting biometric sync");
        report.devices = devices.len();

        for device in &devices {
            match self.pull(&device.device_id, start, end).await {
                Ok(outcome) => {
                    report.inserted += outcome.count;
                    report.skipped += outcome.skipped;
                }
                Err(e) => {
                    report.failed += 1;
                    error!(device_id = %device.device_id, error = %e, "Error syncing device");
                }
            }
        }

        info!(
            devices = report.devices,
            failed = report.failed,
            inserted = report.inserted,
            skipped = report.skipped,
            "Biometric sync completed"
        );
        report
    }

    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconcileSummary, PipelineError> {
        let now = self.now();
        self.reconciler.reconcile(request, now.date(), now).await
    }

    /// Scheduled reconciliation over the default window. Failures are
    /// logged, never propagated.
    pub async fn run_reconciliation(&self) -> Option<ReconcileSummary> {
        info!("Starting biometric log processing");
        match self.reconcile(&ReconcileRequest::default()).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = %e, "Error processing biometric logs");
                None
            }
        }
    }

    pub async fn test_gateway(&self) -> Result<usize, PipelineError> {
        self.require_credentials()?;
        Ok(self.gateway.test_connection().await?)
    }

    pub async fn stats(&self) -> Result<PipelineStats, PipelineError> {
        Ok(self.repo.stats().await?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::repository::memory::MemoryRepository;
    use crate::services::gateway::fake::ScriptedGateway;

    pub fn settings(credentials_configured: bool) -> PipelineSettings {
        PipelineSettings {
            credentials_configured,
            sync_days_back: 7,
            timezone: chrono_tz::Asia::Kolkata,
        }
    }

    pub fn pipeline(
        repo: &MemoryRepository,
        gateway: Arc<ScriptedGateway>,
        credentials_configured: bool,
    ) -> BiometricPipeline {
        BiometricPipeline::new(
            Arc::new(repo.clone()),
            gateway,
            settings(credentials_configured),
        )
    }
}
