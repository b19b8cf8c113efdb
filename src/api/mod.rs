use std::sync::Arc;

use crate::config::SchedulerSettings;
use crate::services::pipeline::BiometricPipeline;
use crate::services::scheduler::SyncJobQueue;

pub mod biometric;

/// Shared handler state, registered once as `web::Data`.
pub struct AppState {
    pub pipeline: Arc<BiometricPipeline>,
    pub jobs: SyncJobQueue,
    pub scheduler: SchedulerSettings,
}
