//! In-memory coordination store (for testing/development)
//!
//! Models the parts of a hierarchical coordination service the locker relies
//! on: a node tree, sessions owning ephemeral nodes, per-parent sequence
//! counters and one-shot existence watches. ACLs are accepted and ignored.

use crate::error::StoreError;
use crate::rank::SEQUENCE_WIDTH;
use crate::store::{
    Acl, CoordinationStore, CreateMode, EventType, StoreResult, Version, Watch, WatchEvent,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

const ROOT: &str = "/";

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    version: i32,
    owner: Option<u64>,
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, owner: Option<u64>) -> Self {
        Self {
            data,
            version: 0,
            owner,
            next_sequence: 0,
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    closed: HashSet<u64>,
    next_session: u64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), Node::new(Vec::new(), None));

        Self {
            nodes,
            watches: HashMap::new(),
            closed: HashSet::new(),
            next_session: 1,
        }
    }

    fn check_open(&self, session: u64) -> StoreResult<()> {
        if self.closed.contains(&session) {
            Err(StoreError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = child_prefix(path);
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .any(|(key, _)| key.len() > prefix.len())
    }

    /// Drop cancelled watches, and any path left with none.
    fn prune_watches(&mut self) {
        self.watches.retain(|_, senders| {
            senders.retain(|tx| !tx.is_closed());
            !senders.is_empty()
        });
    }

    fn fire(&mut self, path: &str, kind: EventType) {
        if let Some(senders) = self.watches.remove(path) {
            for tx in senders {
                // Receivers dropped by cancelled waits are skipped
                let _ = tx.send(WatchEvent::new(kind, path));
            }
        }
    }
}

/// In-memory coordination store.
///
/// Cloning shares both the tree and the session. Use [`MemoryStore::session`]
/// to connect another client to the same tree.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
    session: u64,
}

impl MemoryStore {
    /// Create a new tree containing only the root node, with one session.
    pub fn new() -> Self {
        let mut tree = Tree::new();
        let session = tree.next_session;
        tree.next_session += 1;

        Self {
            tree: Arc::new(Mutex::new(tree)),
            session,
        }
    }

    /// Open another session on the same tree.
    pub async fn session(&self) -> Self {
        let mut tree = self.tree.lock().await;
        let session = tree.next_session;
        tree.next_session += 1;

        Self {
            tree: self.tree.clone(),
            session,
        }
    }

    /// End this session, deleting its ephemeral nodes and firing their watches.
    ///
    /// Later calls through this session fail with [`StoreError::SessionClosed`].
    pub async fn close(&self) {
        let mut tree = self.tree.lock().await;
        if !tree.closed.insert(self.session) {
            return;
        }

        let owned: Vec<String> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(self.session))
            .map(|(path, _)| path.clone())
            .collect();

        debug!(
            "Closing session {} ({} ephemeral nodes)",
            self.session,
            owned.len()
        );

        for path in owned {
            tree.nodes.remove(&path);
            tree.fire(&path, EventType::NodeDeleted);
        }
    }

    /// Replace a node's payload, returning the new version.
    pub async fn set_data(&self, path: &str, data: &[u8], version: Version) -> StoreResult<i32> {
        validate_path(path)?;
        let mut tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        let node = tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;

        if let Version::Exact(expected) = version {
            if node.version != expected {
                return Err(StoreError::BadVersion(path.to_string()));
            }
        }

        node.data = data.to_vec();
        node.version += 1;
        let new_version = node.version;

        tree.fire(path, EventType::NodeDataChanged);
        Ok(new_version)
    }

    /// Read a node's payload.
    pub async fn get_data(&self, path: &str) -> StoreResult<Vec<u8>> {
        validate_path(path)?;
        let tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        tree.nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| StoreError::NoNode(path.to_string()))
    }

    /// Number of live watch registrations on a path.
    pub async fn watch_count(&self, path: &str) -> usize {
        let mut tree = self.tree.lock().await;
        tree.prune_watches();
        tree.watches.get(path).map_or(0, Vec::len)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        let tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        Ok(tree.nodes.contains_key(path))
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
        _acl: Acl,
    ) -> StoreResult<String> {
        validate_path(path)?;
        if path == ROOT {
            return Err(StoreError::NodeExists(path.to_string()));
        }

        let mut tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        let parent_path = parent(path);
        let parent = tree
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| StoreError::NoNode(parent_path.to_string()))?;

        if parent.owner.is_some() {
            return Err(StoreError::NoChildrenForEphemerals(parent_path.to_string()));
        }

        let sequence = parent.next_sequence;
        let full_path = if mode.is_sequential() {
            format!("{path}{sequence:0width$}", width = SEQUENCE_WIDTH)
        } else {
            path.to_string()
        };

        if tree.nodes.contains_key(&full_path) {
            return Err(StoreError::NodeExists(full_path));
        }

        if let Some(parent) = tree.nodes.get_mut(parent_path) {
            parent.next_sequence += 1;
        }

        let owner = mode.is_ephemeral().then_some(self.session);
        tree.nodes
            .insert(full_path.clone(), Node::new(data.to_vec(), owner));
        tree.fire(&full_path, EventType::NodeCreated);

        Ok(full_path)
    }

    async fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        validate_path(path)?;
        let tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        if !tree.nodes.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }

        let prefix = child_prefix(path);
        let children = tree
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| &key[prefix.len()..])
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(str::to_string)
            .collect();

        Ok(children)
    }

    async fn delete(&self, path: &str, version: Version) -> StoreResult<()> {
        validate_path(path)?;
        if path == ROOT {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let mut tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        let node = tree
            .nodes
            .get(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;

        if let Version::Exact(expected) = version {
            if node.version != expected {
                return Err(StoreError::BadVersion(path.to_string()));
            }
        }

        if tree.has_children(path) {
            return Err(StoreError::NotEmpty(path.to_string()));
        }

        tree.nodes.remove(path);
        tree.fire(path, EventType::NodeDeleted);

        Ok(())
    }

    async fn exists_watch(&self, path: &str) -> StoreResult<(bool, Watch)> {
        validate_path(path)?;
        let mut tree = self.tree.lock().await;
        tree.check_open(self.session)?;

        let exists = tree.nodes.contains_key(path);
        let (tx, watch) = Watch::channel();

        tree.prune_watches();
        tree.watches.entry(path.to_string()).or_default().push(tx);

        Ok((exists, watch))
    }
}

fn validate_path(path: &str) -> StoreResult<()> {
    if path == ROOT {
        return Ok(());
    }

    let valid = path.starts_with('/')
        && !path.ends_with('/')
        && path[1..].split('/').all(|segment| !segment.is_empty());

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

fn child_prefix(path: &str) -> String {
    if path == ROOT {
        ROOT.to_string()
    } else {
        format!("{path}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_exists() {
        let store = MemoryStore::new();

        let path = store
            .create("/app", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        assert_eq!(path, "/app");
        assert!(store.exists("/app").await.unwrap());
        assert!(!store.exists("/other").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_requires_parent() {
        let store = MemoryStore::new();

        let result = store
            .create("/missing/child", b"", CreateMode::Persistent, Acl::default())
            .await;

        assert!(matches!(result, Err(StoreError::NoNode(p)) if p == "/missing"));
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let store = MemoryStore::new();
        store
            .create("/app", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        let result = store
            .create("/app", b"", CreateMode::Persistent, Acl::default())
            .await;

        assert!(matches!(result, Err(StoreError::NodeExists(_))));
    }

    #[tokio::test]
    async fn test_sequential_suffix_is_fixed_width_and_increasing() {
        let store = MemoryStore::new();
        store
            .create("/locks", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        let first = store
            .create("/locks/res", b"", CreateMode::EphemeralSequential, Acl::default())
            .await
            .unwrap();
        let second = store
            .create("/locks/res", b"", CreateMode::EphemeralSequential, Acl::default())
            .await
            .unwrap();

        assert_eq!(first, "/locks/res0000000000");
        assert_eq!(second, "/locks/res0000000001");
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_sequence_shared_across_names_under_parent() {
        let store = MemoryStore::new();
        store
            .create("/locks", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        store
            .create("/locks/a", b"", CreateMode::EphemeralSequential, Acl::default())
            .await
            .unwrap();
        let b = store
            .create("/locks/b", b"", CreateMode::EphemeralSequential, Acl::default())
            .await
            .unwrap();

        assert_eq!(b, "/locks/b0000000001");
    }

    #[tokio::test]
    async fn test_children_are_relative_and_direct() {
        let store = MemoryStore::new();
        for path in ["/a", "/a/x", "/a/y", "/a/x/deep", "/ab"] {
            store
                .create(path, b"", CreateMode::Persistent, Acl::default())
                .await
                .unwrap();
        }

        let mut children = store.children("/a").await.unwrap();
        children.sort();
        assert_eq!(children, vec!["x".to_string(), "y".to_string()]);

        let mut root = store.children("/").await.unwrap();
        root.sort();
        assert_eq!(root, vec!["a".to_string(), "ab".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let store = MemoryStore::new();
        store
            .create("/a", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();
        store
            .create("/a/b", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        assert!(matches!(
            store.delete("/a", Version::Any).await,
            Err(StoreError::NotEmpty(_))
        ));
        assert!(matches!(
            store.delete("/a/b", Version::Exact(3)).await,
            Err(StoreError::BadVersion(_))
        ));

        store.delete("/a/b", Version::Exact(0)).await.unwrap();
        store.delete("/a", Version::Any).await.unwrap();

        assert!(matches!(
            store.delete("/a", Version::Any).await,
            Err(StoreError::NoNode(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected() {
        let store = MemoryStore::new();

        for path in ["", "relative", "/trailing/", "/double//slash"] {
            assert!(matches!(
                store.exists(path).await,
                Err(StoreError::InvalidPath(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_ephemeral_nodes_removed_on_close() {
        let store = MemoryStore::new();
        store
            .create("/locks", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        let other = store.session().await;
        let node = other
            .create("/locks/res", b"", CreateMode::EphemeralSequential, Acl::default())
            .await
            .unwrap();

        let (exists, watch) = store.exists_watch(&node).await.unwrap();
        assert!(exists);

        other.close().await;

        let event = watch.changed().await.unwrap();
        assert_eq!(event.kind, EventType::NodeDeleted);
        assert!(!store.exists(&node).await.unwrap());
        assert!(store.exists("/locks").await.unwrap());
        assert!(matches!(
            other.exists("/locks").await,
            Err(StoreError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_ephemeral_cannot_have_children() {
        let store = MemoryStore::new();
        store
            .create("/e", b"", CreateMode::Ephemeral, Acl::default())
            .await
            .unwrap();

        let result = store
            .create("/e/child", b"", CreateMode::Persistent, Acl::default())
            .await;

        assert!(matches!(result, Err(StoreError::NoChildrenForEphemerals(_))));
    }

    #[tokio::test]
    async fn test_watch_fires_on_data_change() {
        let store = MemoryStore::new();
        store
            .create("/a", b"one", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        let (_, watch) = store.exists_watch("/a").await.unwrap();
        let version = store.set_data("/a", b"two", Version::Any).await.unwrap();

        assert_eq!(version, 1);
        assert_eq!(store.get_data("/a").await.unwrap(), b"two".to_vec());
        assert_eq!(
            watch.changed().await.unwrap().kind,
            EventType::NodeDataChanged
        );
    }

    #[tokio::test]
    async fn test_watch_on_missing_node_fires_on_create() {
        let store = MemoryStore::new();

        let (exists, watch) = store.exists_watch("/later").await.unwrap();
        assert!(!exists);

        store
            .create("/later", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        assert_eq!(watch.changed().await.unwrap().kind, EventType::NodeCreated);
    }

    #[tokio::test]
    async fn test_watch_is_one_shot() {
        let store = MemoryStore::new();
        store
            .create("/a", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        let (_, watch) = store.exists_watch("/a").await.unwrap();
        store.set_data("/a", b"x", Version::Any).await.unwrap();
        watch.changed().await.unwrap();

        assert_eq!(store.watch_count("/a").await, 0);
    }

    #[tokio::test]
    async fn test_dropped_watch_is_pruned() {
        let store = MemoryStore::new();
        store
            .create("/a", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        let (_, watch) = store.exists_watch("/a").await.unwrap();
        assert_eq!(store.watch_count("/a").await, 1);

        drop(watch);
        assert_eq!(store.watch_count("/a").await, 0);
    }

    #[tokio::test]
    async fn test_root_children_exclude_root() {
        let store = MemoryStore::new();
        assert!(store.children("/").await.unwrap().is_empty());
        assert!(!store.tree.lock().await.has_children("/"));

        store
            .create("/a", b"", CreateMode::Persistent, Acl::default())
            .await
            .unwrap();

        assert_eq!(store.children("/").await.unwrap(), vec!["a".to_string()]);
        assert!(store.tree.lock().await.has_children("/"));
    }

    #[tokio::test]
    async fn test_cancelled_watch_on_missing_node_is_forgotten() {
        let store = MemoryStore::new();

        for path in ["/gone0000000001", "/gone0000000002", "/gone0000000003"] {
            let (exists, watch) = store.exists_watch(path).await.unwrap();
            assert!(!exists);
            drop(watch);
        }

        let (_, _live) = store.exists_watch("/other").await.unwrap();
        let tree = store.tree.lock().await;
        assert_eq!(tree.watches.len(), 1);
        assert!(tree.watches.contains_key("/other"));
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/a/b"), "/a");
        assert_eq!(parent("/a/b/c"), "/a/b");
    }
}
