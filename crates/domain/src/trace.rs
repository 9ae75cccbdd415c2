use serde::Serialize;

/// Structured trace events emitted across all serversets crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    EndpointRegistered {
        path: String,
        endpoint: String,
        sequence: u64,
    },
    EndpointClosed {
        path: String,
        endpoint: String,
        already_gone: bool,
    },
    WatchOpened {
        directory: String,
        members: usize,
    },
    WatchRefreshed {
        directory: String,
        members: usize,
        skipped: usize,
        event_count: u64,
    },
    WatchClosed {
        directory: String,
        event_count: u64,
    },
    SessionLost {
        directory: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ss_event");
    }
}
