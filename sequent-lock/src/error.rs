//! Error types for the store contract, the locker and its configuration.

use std::time::Duration;
use thiserror::Error;

/// Coordination store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Node does not exist: {0}")]
    NoNode(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Node has children: {0}")]
    NotEmpty(String),

    #[error("Version mismatch on node: {0}")]
    BadVersion(String),

    #[error("Ephemeral nodes cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Watch closed before firing")]
    WatchClosed,

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid value for {key}: {value}")]
    Env { key: String, value: String },
}

/// Distributed lock errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to provision base path {path}: {source}")]
    Provision {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to register lock request under {path}: {source}")]
    Register {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Lock request vanished before it could be ranked: {0}")]
    RequestVanished(String),

    #[error("Lock timeout after {waited:?} waiting for {predecessor}")]
    Timeout {
        predecessor: String,
        waited: Duration,
    },

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Invalid lock name: {0:?}")]
    InvalidLockName(String),

    #[error("Lock request already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LockError {
    /// Whether this is a wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }

    /// Whether the attempt failed while waiting on its predecessor.
    pub fn is_wait_failure(&self) -> bool {
        matches!(self, LockError::Timeout { .. } | LockError::Watch { .. })
    }
}
