//! Fair Distributed Locks for Sequent
//!
//! This crate provides a mutex coordinated through a hierarchical,
//! watch-capable coordination store.
//!
//! ## Features
//!
//! - **Strict FIFO** - Requests are granted in the order the store sequenced them
//! - **Crash Safety** - Requests are ephemeral and vanish with their session
//! - **No Polling** - Waiters watch only the request directly ahead of them
//! - **Bounded Waits** - Optional per-attempt timeout with an explicit policy
//! - **In-Memory Store** - A reference store for tests and single-process use
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sequent_lock::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any CoordinationStore implementation works here
//!     let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
//!
//!     let mut locker = Locker::builder()
//!         .with_base_path("/locks")
//!         .with_timeout(Duration::from_secs(10))
//!         .build(store)
//!         .await?;
//!
//!     locker.lock("billing").await?;
//!
//!     // Critical section
//!     println!("Holding {:?}", locker.name());
//!
//!     locker.release().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Timeouts
//!
//! A timed-out attempt keeps its request queued by default, so it can still
//! block later requests until it is released or its session ends. Build the
//! locker with [`TimeoutPolicy::Release`] to withdraw the request instead.

pub mod config;
pub mod error;
pub mod lock;
pub mod memory;
pub mod path;
pub mod rank;
pub mod store;
pub mod wait;

pub use config::LockerConfig;
pub use error::{ConfigError, LockError, StoreError};
pub use lock::{
    DEFAULT_BASE_PATH, DistributedLock, LockState, Locker, LockerBuilder, TimeoutPolicy,
};
pub use memory::MemoryStore;
pub use path::ensure_path;
pub use rank::{Rank, SEQUENCE_WIDTH};
pub use store::{
    Acl, CoordinationStore, CreateMode, EventType, StoreResult, Version, Watch, WatchEvent,
};
