//! Waiting for a predecessor request to go away.

use crate::error::LockError;
use crate::store::{CoordinationStore, EventType};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Block until the node at `predecessor` is deleted.
///
/// With a `timeout`, gives up with [`LockError::Timeout`] once it elapses.
/// The deadline is fixed on entry, so re-arming the watch after a
/// non-deletion event never extends it. Whichever of watch and timer loses
/// the race is dropped, which also cancels the watch registration.
pub async fn wait_for_deletion(
    store: &dyn CoordinationStore,
    predecessor: &str,
    timeout: Option<Duration>,
) -> Result<(), LockError> {
    let deadline = timeout.map(|timeout| (Instant::now() + timeout, timeout));

    loop {
        let (exists, watch) =
            store
                .exists_watch(predecessor)
                .await
                .map_err(|source| LockError::Watch {
                    path: predecessor.to_string(),
                    source,
                })?;

        if !exists {
            debug!("Predecessor already gone: {}", predecessor);
            return Ok(());
        }

        let changed = match deadline {
            Some((deadline, timeout)) => {
                tokio::select! {
                    changed = watch.changed() => changed,
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!("Lock wait timed out after {:?} on {}", timeout, predecessor);
                        return Err(LockError::Timeout {
                            predecessor: predecessor.to_string(),
                            waited: timeout,
                        });
                    }
                }
            }
            None => watch.changed().await,
        };

        let event = changed.map_err(|source| LockError::Watch {
            path: predecessor.to_string(),
            source,
        })?;

        if event.kind == EventType::NodeDeleted {
            debug!("Predecessor deleted: {}", predecessor);
            return Ok(());
        }

        debug!(
            "Ignoring {:?} on {}, re-arming watch",
            event.kind, predecessor
        );
    }
}
