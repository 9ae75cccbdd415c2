//! `ss-coordination`: the coordination store contract the serverset core
//! is written against.
//!
//! A coordination store is a strongly-consistent hierarchical directory
//! (ZooKeeper-style) with persistent, ephemeral and sequential nodes and
//! one-shot children-changed notifications.  This crate does not speak any
//! wire protocol: production deployments implement [`CoordinationClient`]
//! over their client library of choice, tests and the demo node use the
//! in-process [`MemoryStore`].
//!
//! # Contract
//!
//! - `create` with a sequential mode appends a 10-digit, per-parent,
//!   monotonically increasing suffix and returns the actual path.
//! - `create` of an existing non-sequential node fails with
//!   [`CoordinationError::NodeExists`]; a missing parent fails with
//!   [`CoordinationError::NoNode`].
//! - `delete` of an absent node fails with [`CoordinationError::NoNode`].
//! - `children_watch` lists and arms exactly one [`ChildWatch`] in one
//!   atomic step.  The watch fires once and must be re-armed.

pub mod memory;

use tokio::sync::oneshot;

pub use memory::{MemorySession, MemoryStore};
pub use ss_domain::CoordinationError;

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// Node flavour requested at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }
}

/// What a fired [`ChildWatch`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchNotification {
    /// A child was added under, or removed from, the watched path.
    ChildrenChanged,
    /// The watched node itself was deleted.
    NodeDeleted,
    /// The session that armed the watch expired.
    SessionExpired,
    /// The client dropped the watch without firing it.
    ConnectionLost,
}

/// A one-shot children-changed notification.
#[derive(Debug)]
pub struct ChildWatch {
    rx: oneshot::Receiver<WatchNotification>,
}

impl ChildWatch {
    /// Create an armed watch and the sender that fires it.
    pub fn channel() -> (oneshot::Sender<WatchNotification>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait for the notification.  A sender dropped without firing reads
    /// as [`WatchNotification::ConnectionLost`].
    pub async fn notified(self) -> WatchNotification {
        self.rx.await.unwrap_or(WatchNotification::ConnectionLost)
    }
}

/// Operations the serverset core needs from a coordination store session.
///
/// All calls may block on network I/O.  Session and reconnection policy
/// belong to the implementation.
#[async_trait::async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Create a node and return its actual path (which differs from `path`
    /// for sequential modes).
    async fn create(
        &self,
        path: &str,
        payload: Vec<u8>,
        mode: CreateMode,
    ) -> CoordinationResult<String>;

    /// Delete exactly the node at `path`.
    async fn delete(&self, path: &str) -> CoordinationResult<()>;

    /// Read a node's payload.
    async fn get_data(&self, path: &str) -> CoordinationResult<Vec<u8>>;

    /// List the children of `path` (bare names, not full paths) and arm one
    /// future notification for it.
    async fn children_watch(&self, path: &str)
        -> CoordinationResult<(Vec<String>, ChildWatch)>;
}
