use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::device::{Device, DeviceOverview};
use crate::repository::{BiometricRepository, StoreError};
use crate::services::gateway::DeviceGateway;

/// Devices the organization has connected, keyed by the vendor's device id.
#[derive(Clone)]
pub struct DeviceRegistry {
    repo: Arc<dyn BiometricRepository>,
    gateway: Arc<dyn DeviceGateway>,
}

impl DeviceRegistry {
    pub fn new(repo: Arc<dyn BiometricRepository>, gateway: Arc<dyn DeviceGateway>) -> Self {
        Self { repo, gateway }
    }

    /// Confirms the device with the vendor, then registers it as active.
    pub async fn connect(&self, device_id: &str) -> Result<Device, PipelineError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(PipelineError::Validation("Device ID is required".to_string()));
        }

        let info = self.gateway.validate_device(device_id).await.map_err(|e| {
            warn!(device_id, error = %e, "Device validation failed");
            PipelineError::Upstream(e)
        })?;

        if self.repo.find_device(device_id).await?.is_some() {
            return Err(already_connected());
        }

        let name = info
            .device_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| device_id.to_string());

        let device = match self.repo.insert_device(device_id, &name).await {
            Ok(device) => device,
            // another request registered it between the lookup and the insert
            Err(StoreError::Duplicate) => return Err(already_connected()),
            Err(e) => return Err(e.into()),
        };

        info!(device_id, name = %device.name, "Biometric device connected");
        Ok(device)
    }

    pub async fn list(&self) -> Result<Vec<DeviceOverview>, PipelineError> {
        Ok(self.repo.list_devices().await?)
    }

    pub async fn active(&self) -> Result<Vec<Device>, PipelineError> {
        Ok(self.repo.active_devices().await?)
    }

    pub async fn get(&self, device_id: &str) -> Result<Device, PipelineError> {
        self.repo
            .find_device(device_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound("Device not found".to_string()))
    }

    /// Sync gate: unknown devices are `NotFound`, inactive ones answer false.
    pub async fn is_active(&self, device_id: &str) -> Result<bool, PipelineError> {
        Ok(self.get(device_id).await?.is_active())
    }

    /// Removes the device; its punch logs go with it.
    pub async fn delete(&self, device_id: &str) -> Result<(), PipelineError> {
        if !self.repo.delete_device(device_id).await? {
            return Err(PipelineError::NotFound("Device not found".to_string()));
        }
        info!(device_id, "Biometric device removed");
        Ok(())
    }

    pub async fn touch_sync(&self, device_id: &str, at: NaiveDateTime) -> Result<(), PipelineError> {
        Ok(self.repo.touch_sync(device_id, at).await?)
    }
}

fn already_connected() -> PipelineError {
    PipelineError::Conflict("Device already connected".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::device::DeviceStatus;
    use crate::repository::memory::MemoryRepository;
    use crate::services::gateway::fake::ScriptedGateway;

    fn registry(repo: &MemoryRepository, gateway: ScriptedGateway) -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(repo.clone()), Arc::new(gateway))
    }

    #[tokio::test]
    async fn connect_registers_validated_device_as_active() {
        let repo = MemoryRepository::new();
        let registry = registry(&repo, ScriptedGateway::default().with_device("DEV001", "Main Gate"));

        let device = registry.connect(" DEV001 ").await.unwrap();

        assert_eq!(device.device_id, "DEV001");
        assert_eq!(device.name, "Main Gate");
        assert_eq!(device.status, DeviceStatus::Active);
        assert!(device.last_sync.is_none());
        assert!(repo.device("DEV001").is_some());
    }

    #[tokio::test]
    async fn connect_twice_is_a_conflict() {
        let repo = MemoryRepository::new();
        let registry = registry(&repo, ScriptedGateway::default().with_device("DEV001", "Main Gate"));

        registry.connect("DEV001").await.unwrap();
        let err = registry.connect("DEV001").await.unwrap_err();

        assert!(matches!(err, PipelineError::Conflict(_)));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_rejects_blank_and_unknown_ids() {
        let repo = MemoryRepository::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let registry = DeviceRegistry::new(Arc::new(repo.clone()), gateway.clone());

        assert!(matches!(
            registry.connect("  ").await.unwrap_err(),
            PipelineError::Validation(_)
        ));
        assert!(gateway.calls().is_empty());

        assert!(matches!(
            registry.connect("DEV404").await.unwrap_err(),
            PipelineError::Upstream(_)
        ));
        assert!(repo.device("DEV404").is_none());
    }

    #[tokio::test]
    async fn delete_unknown_device_is_not_found() {
        let repo = MemoryRepository::new();
        repo.add_device("DEV001", DeviceStatus::Active);
        let registry = registry(&repo, ScriptedGateway::default());

        assert!(matches!(
            registry.delete("DEV999").await.unwrap_err(),
            PipelineError::NotFound(_)
        ));
        registry.delete("DEV001").await.unwrap();
        assert!(repo.device("DEV001").is_none());
    }

    #[tokio::test]
    async fn sync_gate_reports_status() {
        let repo = MemoryRepository::new();
        repo.add_device("DEV001", DeviceStatus::Active);
        repo.add_device("DEV002", DeviceStatus::Inactive);
        let registry = registry(&repo, ScriptedGateway::default());

        assert!(registry.is_active("DEV001").await.unwrap());
        assert!(!registry.is_active("DEV002").await.unwrap());
        assert!(matches!(
            registry.is_active("DEV003").await.unwrap_err(),
            PipelineError::NotFound(_)
        ));
        assert_eq!(registry.active().await.unwrap().len(), 1);
    }
}
