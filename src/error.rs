use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching, parsing or reconciling feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse feed: {0}")]
    ParseFailed(#[from] feed_rs::parser::ParseFeedError),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed {url} is not in the store")]
    UnknownFeed { url: String },

    #[error("Failed to move download directory '{from}' to '{to}': {source}")]
    StorageMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error while processing {url}: {source}")]
    Store {
        url: String,
        #[source]
        source: StoreError,
    },
}

/// Errors raised by the SQLite-backed store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: tokio_rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Errors that can occur while talking to a gpodder-compatible server
/// or while running a sync job
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for {url}")]
    ServerStatus { url: String, status: u16 },

    #[error("Unexpected response from {url}: {source}")]
    MalformedResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid credentials for {username}")]
    Unauthorized { username: String },

    #[error("No sync account is configured")]
    NotConfigured,

    #[error("Another sync job is already running")]
    AlreadyRunning,

    #[error("Sync aborted")]
    Aborted,

    #[error("Sync aborted during {phase}: {message}")]
    PhaseFailed { phase: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),
}

/// Errors around the on-disk configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
}

/// Errors around secret storage
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("No stored password for {username}")]
    NotFound { username: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
