//! Cron-driven sync and reconciliation, plus the queue that runs operator
//! triggered sync-all jobs off the request path.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerSettings;
use crate::error::PipelineError;
use crate::services::pipeline::BiometricPipeline;

/// Pending sync-all requests allowed before new ones are refused.
pub const SYNC_QUEUE_CAPACITY: usize = 4;

/// Accepts standard 5-field cron by prepending a seconds field.
pub fn normalize_cron(expr: &str) -> anyhow::Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(anyhow!("cron expression {expr:?} has {n} fields, expected 5 to 7")),
    }
}

pub struct BiometricScheduler {
    scheduler: JobScheduler,
}

impl BiometricScheduler {
    /// Registers the sync and processing jobs in the configured zone and
    /// starts ticking. Returns `None` when scheduling is switched off.
    pub async fn start(
        pipeline: Arc<BiometricPipeline>,
        settings: &SchedulerSettings,
    ) -> anyhow::Result<Option<Self>> {
        if !settings.enabled {
            info!("Biometric scheduler is disabled");
            return Ok(None);
        }

        let sync_cron = normalize_cron(&settings.sync_cron).context("BIOMETRIC_SYNC_CRON")?;
        let process_cron =
            normalize_cron(&settings.process_cron).context("BIOMETRIC_PROCESS_CRON")?;

        let pipeline_has_credentials = pipeline.credentials_configured();
        let scheduler = JobScheduler::new().await?;

        let sync_pipeline = pipeline.clone();
        let sync_job = Job::new_async_tz(sync_cron.as_str(), settings.timezone, move |_uuid, _l| {
            let pipeline = sync_pipeline.clone();
            Box::pin(async move {
                info!("Scheduled biometric sync triggered");
                pipeline.run_sync_all_devices().await;
            })
        })
        .with_context(|| format!("invalid sync schedule {sync_cron:?}"))?;

        let process_pipeline = pipeline;
        let process_job =
            Job::new_async_tz(process_cron.as_str(), settings.timezone, move |_uuid, _l| {
                let pipeline = process_pipeline.clone();
                Box::pin(async move {
                    info!("Scheduled biometric processing triggered");
                    pipeline.run_reconciliation().await;
                })
            })
            .with_context(|| format!("invalid processing schedule {process_cron:?}"))?;

        scheduler.add(sync_job).await?;
        scheduler.add(process_job).await?;
        scheduler.start().await?;

        info!(
            sync_cron = %settings.sync_cron,
            process_cron = %settings.process_cron,
            timezone = %settings.timezone,
            sync_days_back = settings.sync_days_back,
            "Biometric scheduler started"
        );

        if !pipeline_has_credentials {
            warn!("eSSL ADMS credentials are not configured; scheduled syncs will be skipped");
        }

        Ok(Some(Self { scheduler }))
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.scheduler.shutdown().await?;
        info!("Biometric scheduler stopped");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SyncJob {
    pub id: Uuid,
    pub requested_at: NaiveDateTime,
}

/// Handle for queueing sync-all runs on the background worker.
#[derive(Clone)]
pub struct SyncJobQueue {
    sender: mpsc::Sender<SyncJob>,
}

impl SyncJobQueue {
    fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Spawns the worker that drains the queue one job at a time.
    pub fn spawn(pipeline: Arc<BiometricPipeline>, capacity: usize) -> Self {
        let (queue, receiver) = Self::channel(capacity);
        tokio::spawn(run_sync_worker(pipeline, receiver));
        queue
    }

    pub fn submit(&self, requested_at: NaiveDateTime) -> Result<Uuid, PipelineError> {
        let job = SyncJob {
            id: Uuid::new_v4(),
            requested_at,
        };
        let id = job.id;

        match self.sender.try_send(job) {
            Ok(()) => {
                info!(job_id = %id, "Sync-all job queued");
                Ok(id)
            }
            Err(TrySendError::Full(_)) => Err(PipelineError::Precondition(
                "Too many sync jobs are already queued. Try again later".to_string(),
            )),
            Err(TrySendError::Closed(_)) => Err(PipelineError::Precondition(
                "Sync worker is not running".to_string(),
            )),
        }
    }
}

/// Each job runs in its own task so a panic is logged and the worker keeps
/// draining.
async fn run_sync_worker(pipeline: Arc<BiometricPipeline>, mut receiver: mpsc::Receiver<SyncJob>) {
    while let Some(job) = receiver.recv().await {
        info!(job_id = %job.id, requested_at = %job.requested_at, "Starting queued sync");

        let pipeline = pipeline.clone();
        match tokio::spawn(async move { pipeline.run_sync_all_devices().await }).await {
            Ok(report) => info!(
                job_id = %job.id,
                devices = report.devices,
                failed = report.failed,
                inserted = report.inserted,
                skipped = report.skipped,
                "Queued sync finished"
            ),
            Err(e) => error!(job_id = %job.id, error = %e, "Queued sync aborted"),
        }
    }
    warn!("Sync worker stopped");
}
