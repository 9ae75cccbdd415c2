//! The serverset aggregate: identity plus a coordination session, and the
//! factory for [`Endpoint`]s and [`Watch`]es.

use std::sync::Arc;

use ss_coordination::{CoordinationClient, CoordinationError, CreateMode};
use ss_domain::error::{Error, Result};
use ss_domain::{ServerSetConfig, TraceEvent};

use crate::endpoint::Endpoint;
use crate::instance::{self, ServiceInstance};
use crate::path::{base_znode_path, member_path, parse_sequence, split_paths};
use crate::retry::RetryPolicy;
use crate::watch::Watch;

/// The members of one `(environment, role, service)` triple.
///
/// Construction makes no remote calls; the directory is created lazily by
/// the first registration or watch.  Endpoints and watches hold their own
/// handle on the client and outlive the `ServerSet` that made them.
#[derive(Clone)]
pub struct ServerSet {
    environment: String,
    role: String,
    service: String,
    client: Arc<dyn CoordinationClient>,
    retry: RetryPolicy,
}

impl ServerSet {
    pub fn new(
        environment: impl Into<String>,
        role: impl Into<String>,
        service: impl Into<String>,
        client: Arc<dyn CoordinationClient>,
    ) -> Self {
        Self {
            environment: environment.into(),
            role: role.into(),
            service: service.into(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Build from validated configuration.  `config.servers` is for whoever
    /// opened `client`; it is only logged here.
    pub fn from_config(config: &ServerSetConfig, client: Arc<dyn CoordinationClient>) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            environment = %config.environment,
            role = %config.role,
            service = %config.service,
            servers = ?config.servers,
            "serverset configured"
        );
        Ok(Self::new(
            config.environment.clone(),
            config.role.clone(),
            config.service.clone(),
            client,
        )
        .with_retry(RetryPolicy::from(&config.refresh)))
    }

    /// Override the refresh retry policy used by watches created afterwards.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Directory under which this serverset's member nodes live.
    pub fn directory_path(&self) -> String {
        base_znode_path(&self.environment, &self.role, &self.service)
    }

    /// Announce `host:port` as a member.
    ///
    /// Creates any missing ancestor of the directory, then one ephemeral
    /// sequential member node carrying host, port and `metadata`.  Failures
    /// are returned as [`Error::Registration`] and not retried.
    pub async fn register_endpoint(
        &self,
        host: &str,
        port: u16,
        metadata: Option<&[u8]>,
    ) -> Result<Endpoint> {
        let directory = self.directory_path();
        let registration = |source| Error::Registration {
            path: directory.clone(),
            source,
        };

        ensure_hierarchy(self.client.as_ref(), &directory)
            .await
            .map_err(registration)?;

        let payload = instance::encode(&ServiceInstance::new(host, port, metadata))?;
        let path = self
            .client
            .create(&member_path(&directory), payload, CreateMode::EphemeralSequential)
            .await
            .map_err(registration)?;

        let Some(sequence) = parse_sequence(&path) else {
            if let Err(e) = self.client.delete(&path).await {
                tracing::warn!(path = %path, error = %e, "could not remove unsequenced member");
            }
            return Err(registration(CoordinationError::MissingSequence(path)));
        };

        TraceEvent::EndpointRegistered {
            path: path.clone(),
            endpoint: format!("{host}:{port}"),
            sequence,
        }
        .emit();

        Ok(Endpoint::new(
            self.client.clone(),
            path,
            sequence,
            host.to_string(),
            port,
            metadata.map(<[u8]>::to_vec),
        ))
    }

    /// Open a live view of the current members.
    ///
    /// The directory is created if missing, so a service nobody has
    /// registered yet watches as empty.  The returned watch already holds
    /// the initial listing with an event count of zero.
    pub async fn watch(&self) -> Result<Watch> {
        let directory = self.directory_path();
        ensure_hierarchy(self.client.as_ref(), &directory)
            .await
            .map_err(|source| Error::WatchEstablishment {
                path: directory.clone(),
                source,
            })?;
        Watch::start(self.client.clone(), directory, self.retry.clone()).await
    }
}

impl std::fmt::Debug for ServerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSet")
            .field("directory", &self.directory_path())
            .finish()
    }
}

/// Create every missing persistent node along `directory`.  An existing
/// node is success.
pub(crate) async fn ensure_hierarchy(
    client: &dyn CoordinationClient,
    directory: &str,
) -> std::result::Result<(), CoordinationError> {
    for path in split_paths(directory) {
        match client.create(&path, Vec::new(), CreateMode::Persistent).await {
            Ok(_) => tracing::debug!(path = %path, "created directory node"),
            Err(CoordinationError::NodeExists(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
