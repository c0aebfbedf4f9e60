//! Lock domain paths and their provisioning.

use crate::error::{LockError, StoreError};
use crate::store::{Acl, CoordinationStore, CreateMode};
use tracing::{debug, info};

/// Path separator used by the coordination store
pub const SEPARATOR: char = '/';

/// Canonical form of a slash-delimited path: leading separator, no trailing
/// or repeated separators. Empty input is the root.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
    format!("{SEPARATOR}{}", segments.join("/"))
}

/// Full path of `name` directly under the normalized `base`.
pub fn join(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// The last segment of a full path.
pub fn node_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Ensure every prefix of `path` exists as a persistent node with no payload.
///
/// Existing nodes are left alone, and losing a creation race to another
/// client counts as success. Nothing is ever deleted.
pub async fn ensure_path(store: &dyn CoordinationStore, path: &str) -> Result<(), LockError> {
    let normalized = normalize(path);
    let mut current = String::new();

    for segment in normalized.split(SEPARATOR).filter(|s| !s.is_empty()) {
        current.push(SEPARATOR);
        current.push_str(segment);

        let exists = store
            .exists(&current)
            .await
            .map_err(|source| LockError::Provision {
                path: current.clone(),
                source,
            })?;

        if exists {
            continue;
        }

        match store
            .create(&current, &[], CreateMode::Persistent, Acl::default())
            .await
        {
            Ok(_) => info!("Created base node: {}", current),
            Err(StoreError::NodeExists(_)) => {
                debug!("Base node created concurrently: {}", current);
            }
            Err(source) => {
                return Err(LockError::Provision {
                    path: current,
                    source,
                });
            }
        }
    }

    Ok(())
}
