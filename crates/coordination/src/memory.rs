//! In-process coordination store.
//!
//! One [`MemoryStore`] plays the ensemble; each [`MemorySession`] opened on
//! it plays one client session.  Ephemeral nodes belong to the session that
//! created them and vanish when it expires.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    ChildWatch, CoordinationClient, CoordinationError, CoordinationResult, CreateMode,
    WatchNotification,
};

type SessionId = u64;

struct Node {
    data: Vec<u8>,
    owner: Option<SessionId>,
    children: BTreeSet<String>,
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, owner: Option<SessionId>) -> Self {
        Self {
            data,
            owner,
            children: BTreeSet::new(),
            next_sequence: 0,
        }
    }
}

struct ArmedWatch {
    session: SessionId,
    tx: oneshot::Sender<WatchNotification>,
}

struct Inner {
    nodes: HashMap<String, Node>,
    child_watches: HashMap<String, Vec<ArmedWatch>>,
    expired: BTreeSet<SessionId>,
    next_session: SessionId,
    unavailable: bool,
    failing_listings: u32,
}

impl Inner {
    fn check(&self, session: SessionId) -> CoordinationResult<()> {
        if self.unavailable {
            return Err(CoordinationError::ConnectionLoss(
                "ensemble unavailable".into(),
            ));
        }
        if self.expired.contains(&session) {
            return Err(CoordinationError::SessionExpired);
        }
        Ok(())
    }

    /// Fire and disarm every child watch on `path`.
    fn fire(&mut self, path: &str, notification: WatchNotification) {
        if let Some(watches) = self.child_watches.remove(path) {
            tracing::trace!(path = %path, watchers = watches.len(), ?notification, "firing child watches");
            for w in watches {
                let _ = w.tx.send(notification);
            }
        }
    }

    fn remove_node(&mut self, path: &str) {
        self.nodes.remove(path);
        let (parent, name) = split_parent(path);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.remove(name);
        }
        self.fire(path, WatchNotification::NodeDeleted);
        self.fire(parent, WatchNotification::ChildrenChanged);
    }
}

/// Shared in-memory ensemble.  Cheap to clone.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), None));
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes,
                child_watches: HashMap::new(),
                expired: BTreeSet::new(),
                next_session: 1,
                unavailable: false,
                failing_listings: 0,
            })),
        }
    }

    /// Open a new session.  `servers` is recorded for diagnostics only.
    pub fn connect(&self, servers: &[String]) -> MemorySession {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_session;
            inner.next_session += 1;
            id
        };
        tracing::debug!(session = id, servers = ?servers, "memory session opened");
        MemorySession {
            id,
            servers: servers.to_vec(),
            store: self.clone(),
        }
    }

    /// Make every call on every session fail with `ConnectionLoss` until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Fail the next `count` `children_watch` calls with `ConnectionLoss`.
    pub fn fail_next_listings(&self, count: u32) {
        self.inner.lock().failing_listings = count;
    }

    /// Whether a node exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.inner.lock().nodes.contains_key(path)
    }

    /// Overwrite a node's payload without firing watches (payload changes
    /// are not children changes).
    pub fn set_data(&self, path: &str, data: Vec<u8>) -> CoordinationResult<()> {
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        node.data = data;
        Ok(())
    }

    /// Number of child watches currently armed on `path`.
    pub fn armed_watches(&self, path: &str) -> usize {
        self.inner
            .lock()
            .child_watches
            .get(path)
            .map(|w| w.len())
            .unwrap_or(0)
    }
}

/// One client session on a [`MemoryStore`].
pub struct MemorySession {
    id: SessionId,
    servers: Vec<String>,
    store: MemoryStore,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Expire this session: its own armed watches report `SessionExpired`,
    /// then its ephemeral nodes are removed (firing other sessions'
    /// watches), and every later call fails with `SessionExpired`.
    pub fn expire(&self) {
        let mut inner = self.store.inner.lock();
        if !inner.expired.insert(self.id) {
            return;
        }

        for watches in inner.child_watches.values_mut() {
            let (mine, others): (Vec<_>, Vec<_>) =
                watches.drain(..).partition(|w| w.session == self.id);
            *watches = others;
            for w in mine {
                let _ = w.tx.send(WatchNotification::SessionExpired);
            }
        }
        inner.child_watches.retain(|_, w| !w.is_empty());

        let owned: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.owner == Some(self.id))
            .map(|(p, _)| p.clone())
            .collect();
        for path in &owned {
            inner.remove_node(path);
        }
        tracing::info!(session = self.id, removed = owned.len(), "memory session expired");
    }
}

#[async_trait::async_trait]
impl CoordinationClient for MemorySession {
    async fn create(
        &self,
        path: &str,
        payload: Vec<u8>,
        mode: CreateMode,
    ) -> CoordinationResult<String> {
        let mut inner = self.store.inner.lock();
        inner.check(self.id)?;

        let (parent, _) = split_parent(path);
        let parent_node = inner
            .nodes
            .get_mut(parent)
            .ok_or_else(|| CoordinationError::NoNode(parent.to_string()))?;

        let actual = if mode.is_sequential() {
            let seq = parent_node.next_sequence;
            parent_node.next_sequence += 1;
            format!("{path}{seq:010}")
        } else {
            path.to_string()
        };
        if inner.nodes.contains_key(&actual) {
            return Err(CoordinationError::NodeExists(actual));
        }

        let owner = mode.is_ephemeral().then_some(self.id);
        let (parent, name) = split_parent(&actual);
        let parent = parent.to_string();
        if let Some(p) = inner.nodes.get_mut(&parent) {
            p.children.insert(name.to_string());
        }
        inner.nodes.insert(actual.clone(), Node::new(payload, owner));
        inner.fire(&parent, WatchNotification::ChildrenChanged);

        tracing::trace!(session = self.id, path = %actual, ?mode, "node created");
        Ok(actual)
    }

    async fn delete(&self, path: &str) -> CoordinationResult<()> {
        let mut inner = self.store.inner.lock();
        inner.check(self.id)?;

        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty(path.to_string()));
        }
        inner.remove_node(path);
        tracing::trace!(session = self.id, path = %path, "node deleted");
        Ok(())
    }

    async fn get_data(&self, path: &str) -> CoordinationResult<Vec<u8>> {
        let inner = self.store.inner.lock();
        inner.check(self.id)?;
        inner
            .nodes
            .get(path)
            .map(|n| n.data.clone())
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> CoordinationResult<(Vec<String>, ChildWatch)> {
        let mut inner = self.store.inner.lock();
        inner.check(self.id)?;
        if inner.failing_listings > 0 {
            inner.failing_listings -= 1;
            return Err(CoordinationError::ConnectionLoss(
                "injected listing failure".into(),
            ));
        }

        let children: Vec<String> = inner
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?
            .children
            .iter()
            .cloned()
            .collect();

        let (tx, watch) = ChildWatch::channel();
        let armed = inner.child_watches.entry(path.to_string()).or_default();
        // receivers dropped without firing are abandoned
        armed.retain(|w| !w.tx.is_closed());
        armed.push(ArmedWatch {
            session: self.id,
            tx,
        });
        Ok((children, watch))
    }
}

/// Split `/a/b/c` into (`/a/b`, `c`).  Children of the root have `/` as
/// their parent.
fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}
