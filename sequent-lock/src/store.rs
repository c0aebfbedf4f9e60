//! Coordination store contract.
//!
//! A coordination store is a tree of named nodes with atomic create/delete,
//! session-scoped ephemeral nodes, store-assigned sequence suffixes and
//! one-shot change notifications. The locker only ever talks to the store
//! through [`CoordinationStore`].

use crate::error::StoreError;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session
    Persistent,
    /// Removed by the store when the creating session ends
    Ephemeral,
    /// Persistent, with a store-assigned sequence suffix
    PersistentSequential,
    /// Ephemeral, with a store-assigned sequence suffix
    EphemeralSequential,
}

impl CreateMode {
    /// Whether the node's lifetime is bound to the creating session.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Whether the store appends a sequence suffix to the requested name.
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Access control list attached to a created node.
///
/// Passed through to the store untouched; the locker always uses the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acl {
    /// Every permission for everyone
    #[default]
    OpenUnsafe,
    /// Every permission for the creating identity only
    CreatorAll,
    /// Read-only for everyone
    ReadUnsafe,
}

/// Expected node version for a conditional mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Skip the version check
    Any,
    /// Fail with [`StoreError::BadVersion`] unless the node is at this version
    Exact(i32),
}

/// Kind of change reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// A fired watch notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened to the node
    pub kind: EventType,
    /// Full path of the watched node
    pub path: String,
}

impl WatchEvent {
    pub fn new(kind: EventType, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// One-shot notification registered by [`CoordinationStore::exists_watch`].
///
/// Dropping a `Watch` cancels it: the store side observes a closed channel
/// and discards the registration the next time it touches it.
#[derive(Debug)]
pub struct Watch {
    rx: oneshot::Receiver<WatchEvent>,
}

impl Watch {
    /// Create a watch and the sender a store uses to fire it.
    pub fn channel() -> (oneshot::Sender<WatchEvent>, Watch) {
        let (tx, rx) = oneshot::channel();
        (tx, Watch { rx })
    }

    /// Wait for the notification.
    ///
    /// Returns [`StoreError::WatchClosed`] if the store dropped the
    /// registration without firing it.
    pub async fn changed(self) -> StoreResult<WatchEvent> {
        self.rx.await.map_err(|_| StoreError::WatchClosed)
    }
}

/// Operations the locker requires from a coordination store.
///
/// Implementations are shared between concurrent lock attempts behind an
/// `Arc`, so they must be safe for concurrent use.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Check whether a node exists.
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Create a node and return its full path.
    ///
    /// For sequential modes the returned path carries the store-assigned
    /// suffix, a zero-padded decimal of fixed width.
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        acl: Acl,
    ) -> StoreResult<String>;

    /// List the names (not full paths) of a node's children.
    async fn children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Delete a node.
    async fn delete(&self, path: &str, version: Version) -> StoreResult<()>;

    /// Check whether a node exists and register a one-shot watch on it.
    ///
    /// The watch fires on the node's next creation, data change or deletion.
    async fn exists_watch(&self, path: &str) -> StoreResult<(bool, Watch)>;
}
