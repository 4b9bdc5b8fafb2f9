pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod http;
pub mod refresh;
pub mod storage;
pub mod sync;

// Re-export main types for convenience
pub use config::{Config, SyncConfig};
pub use error::{ConfigError, CredentialError, FeedError, StoreError, SyncError};
pub use events::{Event, EventBus, FeedOutcome};
pub use feed::{ProcessOptions, RefreshOutcome, refresh_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use refresh::{RefreshGuard, RefreshOptions, RefreshResult, refresh_feeds};
pub use storage::Repository;
pub use sync::{Provider, SyncCoordinator, SyncMode};
