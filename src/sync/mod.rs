pub mod actions;
pub mod client;
pub mod coordinator;
pub mod credentials;
pub mod job;

pub use client::{Device, GpodderClient, Provider};
pub use coordinator::{SyncCoordinator, SyncMode};
pub use credentials::CredentialStore;
pub use job::{SyncAccount, SyncJobOptions, SyncJobReport, SyncPhase, run_sync_job};
