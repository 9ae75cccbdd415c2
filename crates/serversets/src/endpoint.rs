//! A single live registration.

use std::fmt;
use std::sync::Arc;

use ss_coordination::{CoordinationClient, CoordinationError};
use ss_domain::error::Result;
use ss_domain::TraceEvent;

/// One ephemeral sequential member node, created by
/// [`ServerSet::register_endpoint`](crate::ServerSet::register_endpoint).
///
/// The node also disappears on its own if the registering session dies.
/// Dropping an `Endpoint` without closing it leaves the node in place until
/// then.
pub struct Endpoint {
    client: Arc<dyn CoordinationClient>,
    path: String,
    sequence: u64,
    host: String,
    port: u16,
    metadata: Option<Vec<u8>>,
    closed: bool,
}

impl Endpoint {
    pub(crate) fn new(
        client: Arc<dyn CoordinationClient>,
        path: String,
        sequence: u64,
        host: String,
        port: u16,
        metadata: Option<Vec<u8>>,
    ) -> Self {
        Self {
            client,
            path,
            sequence,
            host,
            port,
            metadata,
            closed: false,
        }
    }

    /// Delete this endpoint's node.
    ///
    /// Only the first successful call touches the store: later calls return
    /// `Ok(())` without deleting anything, so a node path the store has since
    /// handed out again is never removed by a stale handle.  A node that is
    /// already gone (session expiry) counts as closed.  On any other error
    /// the endpoint stays open and the call may be retried.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            tracing::debug!(path = %self.path, "endpoint already closed");
            return Ok(());
        }

        let already_gone = match self.client.delete(&self.path).await {
            Ok(()) => false,
            // an expired session has already taken its ephemeral nodes with it
            Err(CoordinationError::NoNode(_) | CoordinationError::SessionExpired) => true,
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "endpoint close failed");
                return Err(e.into());
            }
        };
        self.closed = true;

        TraceEvent::EndpointClosed {
            path: self.path.clone(),
            endpoint: self.to_string(),
            already_gone,
        }
        .emit();
        Ok(())
    }

    /// Sequence number the store assigned at registration.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    /// Full path of the member node.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("sequence", &self.sequence)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_coordination::{CreateMode, MemoryStore};

    async fn registered(store: &MemoryStore) -> Endpoint {
        let session = store.connect(&[]);
        session.create("/svc", vec![], CreateMode::Persistent).await.unwrap();
        let path = session
            .create("/svc/member_", vec![], CreateMode::EphemeralSequential)
            .await
            .unwrap();
        Endpoint::new(Arc::new(session), path, 0, "localhost".into(), 1, None)
    }

    #[tokio::test]
    async fn close_deletes_node_once() {
        let store = MemoryStore::new();
        let mut ep = registered(&store).await;
        let path = ep.path().to_string();

        ep.close().await.unwrap();
        assert!(ep.is_closed());
        assert!(!store.exists(&path));

        // A node recreated at the same path must survive a second close.
        let other = store.connect(&[]);
        other.create(&path, vec![], CreateMode::Ephemeral).await.unwrap();
        ep.close().await.unwrap();
        assert!(store.exists(&path));
    }

    #[tokio::test]
    async fn close_tolerates_vanished_node() {
        let store = MemoryStore::new();
        let mut ep = registered(&store).await;
        let admin = store.connect(&[]);
        admin.delete(ep.path()).await.unwrap();

        ep.close().await.unwrap();
        assert!(ep.is_closed());
    }

    #[tokio::test]
    async fn failed_close_can_be_retried() {
        let store = MemoryStore::new();
        let mut ep = registered(&store).await;

        store.set_unavailable(true);
        assert!(ep.close().await.is_err());
        assert!(!ep.is_closed());

        store.set_unavailable(false);
        ep.close().await.unwrap();
        assert!(!store.exists(ep.path()));
    }

    #[tokio::test]
    async fn displays_as_host_port() {
        let store = MemoryStore::new();
        let ep = registered(&store).await;
        assert_eq!(ep.to_string(), "localhost:1");
    }
}
