//! Distributed locks over a coordination store

use crate::config::LockerConfig;
use crate::error::{LockError, StoreError};
use crate::path::{self, ensure_path};
use crate::rank::{self, Rank};
use crate::store::{Acl, CoordinationStore, CreateMode, Version};
use crate::wait::wait_for_deletion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Domain used when no base path is configured
pub const DEFAULT_BASE_PATH: &str = "/distribute-locks";

/// Distributed lock trait
#[async_trait]
pub trait DistributedLock: Send {
    /// Block until the named lock is held
    async fn lock(&mut self, name: &str) -> Result<(), LockError>;

    /// Give the lock up; releasing twice is not an error
    async fn release(&mut self) -> Result<(), LockError>;
}

/// What happens to the caller's request node when waiting fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Keep the request queued; the caller decides whether to release
    #[default]
    LeaveRegistered,
    /// Delete the request before returning the error
    Release,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "leave_registered" | "leave" => Ok(TimeoutPolicy::LeaveRegistered),
            "release" => Ok(TimeoutPolicy::Release),
            other => Err(format!("unknown timeout policy: {other}")),
        }
    }
}

/// Progress of the current lock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Registered,
    Waiting,
    Acquired,
    Released,
    Failed,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockState::Idle => "idle",
            LockState::Registered => "registered",
            LockState::Waiting => "waiting",
            LockState::Acquired => "acquired",
            LockState::Released => "released",
            LockState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Fair mutex backed by ephemeral sequential nodes.
///
/// Each [`lock`](Locker::lock) registers one request node under the base
/// path. Requests for the same name are served in the order the store
/// sequenced them; every waiter watches only the request directly ahead of
/// it, so a release wakes exactly one waiter.
///
/// A locker tracks one request at a time and is not reentrant. Concurrent
/// callers each use their own locker over a shared store handle.
pub struct Locker {
    store: Arc<dyn CoordinationStore>,
    base_path: String,
    timeout: Option<Duration>,
    timeout_policy: TimeoutPolicy,
    lock_name: Option<String>,
    node: Option<String>,
    state: LockState,
}

impl Locker {
    /// Create a locker on [`DEFAULT_BASE_PATH`] with no timeout.
    ///
    /// The domain is not provisioned; use [`LockerBuilder`] for that.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use sequent_lock::{Locker, MemoryStore};
    /// use std::sync::Arc;
    ///
    /// let mut locker = Locker::new(Arc::new(MemoryStore::new()));
    /// locker.lock("orders").await?;
    /// ```
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            base_path: DEFAULT_BASE_PATH.to_string(),
            timeout: None,
            timeout_policy: TimeoutPolicy::default(),
            lock_name: None,
            node: None,
            state: LockState::Idle,
        }
    }

    /// Start building a locker
    pub fn builder() -> LockerBuilder {
        LockerBuilder::new()
    }

    /// Full path of the current request node, if one is registered
    pub fn name(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Name passed to the last `lock` call
    pub fn lock_name(&self) -> Option<&str> {
        self.lock_name.as_deref()
    }

    /// Domain the requests are registered under
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Wait bound; `None` waits indefinitely
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout_policy
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Acquire the named lock, waiting behind earlier requests.
    ///
    /// On a wait failure the request node stays queued unless the locker was
    /// built with [`TimeoutPolicy::Release`]; call [`release`](Locker::release)
    /// before locking again.
    pub async fn lock(&mut self, name: &str) -> Result<(), LockError> {
        validate_lock_name(name)?;

        if let Some(node) = &self.node {
            return Err(LockError::AlreadyRegistered(node.clone()));
        }

        self.lock_name = Some(name.to_string());
        self.state = LockState::Idle;

        match self.acquire(name).await {
            Ok(()) => {
                self.state = LockState::Acquired;
                Ok(())
            }
            Err(e) => {
                self.state = LockState::Failed;
                if e.is_wait_failure() && self.timeout_policy == TimeoutPolicy::Release {
                    self.discard_request().await;
                }
                Err(e)
            }
        }
    }

    /// Delete the current request node.
    ///
    /// Succeeds when there is nothing to release or the node is already
    /// gone, e.g. after its session expired.
    pub async fn release(&mut self) -> Result<(), LockError> {
        let Some(node) = self.node.take() else {
            debug!("Nothing to release");
            return Ok(());
        };

        info!("Releasing lock: {}", node);

        match delete_request(&*self.store, &node).await {
            Ok(()) => {
                self.state = LockState::Released;
                Ok(())
            }
            Err(e) => {
                self.node = Some(node);
                Err(e.into())
            }
        }
    }

    async fn acquire(&mut self, name: &str) -> Result<(), LockError> {
        let node = self.register(name).await?;
        self.state = LockState::Registered;
        let own = path::node_name(&node).to_string();

        let children = self
            .store
            .children(&self.base_path)
            .await
            .map_err(LockError::Store)?;

        let rank = rank::resolve(children, name, &own)
            .ok_or_else(|| LockError::RequestVanished(node.clone()))?;

        match rank {
            Rank::Holder => {
                info!("Acquired lock: {}", node);
                Ok(())
            }
            Rank::Waiter {
                position,
                predecessor,
            } => {
                let predecessor = path::join(&self.base_path, &predecessor);
                self.state = LockState::Waiting;
                info!(
                    "{} is waiting for {} (position {})",
                    node, predecessor, position
                );

                wait_for_deletion(&*self.store, &predecessor, self.timeout).await?;

                info!("Acquired lock: {}", node);
                Ok(())
            }
        }
    }

    async fn register(&mut self, name: &str) -> Result<String, LockError> {
        let prefix = path::join(&self.base_path, name);

        let node = self
            .store
            .create(&prefix, &[], CreateMode::EphemeralSequential, Acl::default())
            .await
            .map_err(|source| LockError::Register {
                path: self.base_path.clone(),
                source,
            })?;

        debug!("Registered lock request: {}", node);
        self.node = Some(node.clone());
        Ok(node)
    }

    async fn discard_request(&mut self) {
        if let Some(node) = self.node.take() {
            if let Err(e) = delete_request(&*self.store, &node).await {
                warn!("Failed to withdraw lock request {}: {}", node, e);
                self.node = Some(node);
            } else {
                debug!("Withdrew lock request: {}", node);
            }
        }
    }
}

impl fmt::Debug for Locker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("base_path", &self.base_path)
            .field("timeout", &self.timeout)
            .field("timeout_policy", &self.timeout_policy)
            .field("lock_name", &self.lock_name)
            .field("node", &self.node)
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl DistributedLock for Locker {
    async fn lock(&mut self, name: &str) -> Result<(), LockError> {
        Locker::lock(self, name).await
    }

    async fn release(&mut self) -> Result<(), LockError> {
        Locker::release(self).await
    }
}

async fn delete_request(store: &dyn CoordinationStore, node: &str) -> Result<(), StoreError> {
    if !store.exists(node).await? {
        debug!("Lock request already gone: {}", node);
        return Ok(());
    }

    match store.delete(node, Version::Any).await {
        Ok(()) | Err(StoreError::NoNode(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

fn validate_lock_name(name: &str) -> Result<(), LockError> {
    if name.is_empty() || name.contains(path::SEPARATOR) {
        Err(LockError::InvalidLockName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Locker builder
#[derive(Debug, Clone, Default)]
pub struct LockerBuilder {
    base_path: Option<String>,
    timeout: Option<Duration>,
    timeout_policy: TimeoutPolicy,
}

impl LockerBuilder {
    /// Create new locker builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded from configuration
    pub fn from_config(config: &LockerConfig) -> Self {
        Self {
            base_path: Some(config.base_path.clone()),
            timeout: config.timeout(),
            timeout_policy: config.on_timeout,
        }
    }

    /// Builder preloaded from `SEQUENT_LOCK_*` environment variables
    pub fn from_env() -> Result<Self, LockError> {
        Ok(Self::from_config(&LockerConfig::from_env()?))
    }

    /// Builder preloaded from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        Ok(Self::from_config(&LockerConfig::from_file(path)?))
    }

    /// Register requests under `path`, creating it on build if missing
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Bound each wait; zero means wait indefinitely
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Set what happens to the request node when waiting fails
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Build the locker, provisioning the base path if one was set
    pub async fn build(self, store: Arc<dyn CoordinationStore>) -> Result<Locker, LockError> {
        let mut locker = Locker::new(store);
        locker.timeout = self.timeout;
        locker.timeout_policy = self.timeout_policy;

        if let Some(base_path) = self.base_path {
            let base_path = path::normalize(&base_path);
            ensure_path(&*locker.store, &base_path).await?;
            locker.base_path = base_path;
        }

        Ok(locker)
    }
}
