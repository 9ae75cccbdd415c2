//! `ss-serversets`: register service endpoints in a coordination store
//! and watch the live membership of a service.
//!
//! # Layout in the store
//!
//! ```text
//! /aurora/<environment>/<role>/<service>/member_0000000000   {"serviceEndpoint":{...},"status":"ALIVE"}
//!                                       /member_0000000001
//! ```
//!
//! Each member is an ephemeral sequential node: it disappears when the
//! registering session dies, and its sequence suffix fixes its position in
//! every watch's ordering.
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn demo() -> ss_serversets::Result<()> {
//! use std::sync::Arc;
//! use ss_serversets::{MemoryStore, ServerSet};
//!
//! let store = MemoryStore::new();
//! let set = ServerSet::new("prod", "www-data", "frontend", Arc::new(store.connect(&[])));
//!
//! let mut watch = set.watch().await?;
//! let mut endpoint = set.register_endpoint("10.0.0.1", 8080, None).await?;
//! watch.event().await;
//! assert_eq!(watch.endpoints(), vec!["10.0.0.1:8080"]);
//!
//! endpoint.close().await?;
//! watch.close();
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod instance;
pub mod path;
pub mod retry;
pub mod serverset;
pub mod watch;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use endpoint::Endpoint;
pub use instance::{HostPort, ServiceInstance, Status};
pub use path::{base_znode_path, split_paths};
pub use retry::RetryPolicy;
pub use serverset::ServerSet;
pub use watch::{Watch, WatchEvent};

pub use ss_coordination::{CoordinationClient, MemoryStore};
pub use ss_domain::{Error, Result, ServerSetConfig};
