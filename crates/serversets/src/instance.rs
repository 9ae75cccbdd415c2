//! Member node payload: the JSON service-instance record other serverset
//! clients (Finagle, Aurora) read.
//!
//! ```json
//! {"serviceEndpoint":{"host":"localhost","port":1},"additionalEndpoints":{},"status":"ALIVE"}
//! ```
//!
//! Caller metadata is an opaque blob carried hex-encoded in `metadata`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ss_domain::error::{Error, Result};

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Liveness status advertised in a member record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Dead,
    Starting,
    #[default]
    Alive,
    Stopping,
    Stopped,
    Warning,
    Unknown,
}

/// The record stored in each member node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub service_endpoint: HostPort,
    #[serde(default)]
    pub additional_endpoints: BTreeMap<String, HostPort>,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl ServiceInstance {
    /// An `ALIVE` record for `host:port` carrying `metadata` unchanged.
    pub fn new(host: impl Into<String>, port: u16, metadata: Option<&[u8]>) -> Self {
        Self {
            service_endpoint: HostPort::new(host, port),
            additional_endpoints: BTreeMap::new(),
            status: Status::Alive,
            metadata: metadata.map(hex::encode),
        }
    }

    /// The caller-supplied metadata blob, if any.
    pub fn metadata_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.metadata
            .as_deref()
            .map(|m| hex::decode(m).map_err(|e| Error::InvalidMetadata(e.to_string())))
            .transpose()
    }
}

pub fn encode(instance: &ServiceInstance) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(instance)?)
}

/// Decode a member payload.  Rejects an empty host or a zero port, which
/// no registration produces.
pub fn decode(payload: &[u8]) -> Result<ServiceInstance> {
    let instance: ServiceInstance = serde_json::from_slice(payload)?;
    if instance.service_endpoint.host.is_empty() || instance.service_endpoint.port == 0 {
        return Err(Error::InvalidMetadata(format!(
            "unusable service endpoint {}",
            instance.service_endpoint
        )));
    }
    Ok(instance)
}
