pub mod device_registry;
pub mod gateway;
pub mod pipeline;
pub mod punch_store;
pub mod reconciliation;
pub mod scheduler;
