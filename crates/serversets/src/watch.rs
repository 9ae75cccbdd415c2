//! Live membership view of one serverset directory.
//!
//! A [`Watch`] keeps exactly one one-shot child notification armed with the
//! store.  Each time it fires, the background refresh task:
//!
//! 1. re-lists the directory, re-arming the next notification in the same
//!    call so no change between listing and arming can be missed,
//! 2. reads and decodes every member payload, skipping malformed or
//!    vanished entries,
//! 3. sorts the members by their store-assigned sequence number,
//! 4. under the state lock, swaps the cache, bumps the event counter and
//!    publishes one [`WatchEvent::Changed`].
//!
//! Refreshes of one watch never overlap: they all run on its single task.
//! Readers only ever see the state between two refreshes.

use std::sync::Arc;

use parking_lot::Mutex;
use ss_coordination::{ChildWatch, CoordinationClient, CoordinationError, WatchNotification};
use ss_domain::error::{Error, Result};
use ss_domain::TraceEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::instance::{self, ServiceInstance};
use crate::path::{parse_sequence, MEMBER_PREFIX};
use crate::retry::RetryPolicy;
use crate::serverset::ensure_hierarchy;

/// Signal delivered by [`Watch::event`].
///
/// `Changed` carries no diff; read [`Watch::endpoints`] for the new state.
#[derive(Debug)]
pub enum WatchEvent {
    /// One refresh completed.
    Changed,
    /// The watch stopped refreshing: the session was lost
    /// ([`Error::SessionLost`]) or retries ran out
    /// ([`Error::RefreshExhausted`]).  Reported once; no further events
    /// follow.
    Error(Error),
}

struct State {
    members: Vec<ServiceInstance>,
    event_count: u64,
    closed: bool,
}

struct Shared {
    directory: String,
    state: Mutex<State>,
}

impl Shared {
    /// Install a completed refresh.  Returns `false` once the watch is
    /// closed, in which case nothing is changed or signalled.
    fn publish(
        &self,
        events: &mpsc::UnboundedSender<WatchEvent>,
        members: Vec<ServiceInstance>,
        skipped: usize,
    ) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.members = members;
        state.event_count += 1;
        let _ = events.send(WatchEvent::Changed);

        TraceEvent::WatchRefreshed {
            directory: self.directory.clone(),
            members: state.members.len(),
            skipped,
            event_count: state.event_count,
        }
        .emit();
        true
    }

    /// Report a terminal refresh failure, unless already closed.
    fn fail(&self, events: &mpsc::UnboundedSender<WatchEvent>, error: Error) {
        let state = self.state.lock();
        if state.closed {
            return;
        }
        tracing::error!(directory = %self.directory, error = %error, "watch stopped refreshing");
        if matches!(error, Error::SessionLost) {
            TraceEvent::SessionLost {
                directory: self.directory.clone(),
            }
            .emit();
        }
        let _ = events.send(WatchEvent::Error(error));
    }
}

/// Continuously refreshed membership of a serverset.
///
/// Created by [`ServerSet::watch`](crate::ServerSet::watch).  Must be used
/// inside a Tokio runtime.
pub struct Watch {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Watch {
    /// Read the directory once, arm the first notification and start the
    /// refresh task.  The initial read does not count as an event.
    pub(crate) async fn start(
        client: Arc<dyn CoordinationClient>,
        directory: String,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let establishment = |source| Error::WatchEstablishment {
            path: directory.clone(),
            source,
        };
        let (members, skipped, armed) = read_members(client.as_ref(), &directory)
            .await
            .map_err(establishment)?;

        TraceEvent::WatchOpened {
            directory: directory.clone(),
            members: members.len(),
        }
        .emit();
        if skipped > 0 {
            tracing::warn!(directory = %directory, skipped, "skipped unreadable members");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            directory,
            state: Mutex::new(State {
                members,
                event_count: 0,
                closed: false,
            }),
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(
            client,
            shared.clone(),
            tx,
            cancel.clone(),
            retry,
            armed,
        ));

        Ok(Self {
            shared,
            events: rx,
            cancel,
            task: Some(task),
        })
    }

    /// Wait for the next signal.  Signals arrive in the order refreshes
    /// completed, one per refresh.  Returns `None` once the watch is closed,
    /// or after the terminal [`WatchEvent::Error`] has been received.
    ///
    /// The store may coalesce closely spaced changes into one notification,
    /// so a burst of mutations can yield fewer signals than mutations; the
    /// last signal always reflects the latest listing.
    pub async fn event(&mut self) -> Option<WatchEvent> {
        if self.is_closed() {
            return None;
        }
        self.events.recv().await
    }

    /// Current members as `host:port`, oldest registration first.
    pub fn endpoints(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .members
            .iter()
            .map(|m| m.service_endpoint.to_string())
            .collect()
    }

    /// Current decoded member records, oldest registration first.
    pub fn instances(&self) -> Vec<ServiceInstance> {
        self.shared.state.lock().members.clone()
    }

    /// Completed refreshes since the watch was opened.
    pub fn event_count(&self) -> u64 {
        self.shared.state.lock().event_count
    }

    pub fn directory(&self) -> &str {
        &self.shared.directory
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Stop watching.  Once this returns, the cache and counter are frozen
    /// and no further signal is delivered, even for a refresh that was
    /// already in flight.  Closing twice is a no-op.
    pub fn close(&mut self) {
        let event_count = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.event_count
        };

        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            // dropping the task drops the armed notification with it
            task.abort();
        }
        self.events.close();

        TraceEvent::WatchClosed {
            directory: self.shared.directory.clone(),
            event_count,
        }
        .emit();
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Watch")
            .field("directory", &self.shared.directory)
            .field("members", &state.members.len())
            .field("event_count", &state.event_count)
            .field("closed", &state.closed)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Refresh task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn refresh_loop(
    client: Arc<dyn CoordinationClient>,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
    retry: RetryPolicy,
    mut armed: ChildWatch,
) {
    let directory = shared.directory.clone();

    loop {
        let notification = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            n = armed.notified() => n,
        };

        match notification {
            WatchNotification::ChildrenChanged | WatchNotification::NodeDeleted => {
                tracing::debug!(directory = %directory, ?notification, "refreshing members");
            }
            WatchNotification::SessionExpired | WatchNotification::ConnectionLost => {
                shared.fail(&events, Error::SessionLost);
                return;
            }
        }

        let mut attempt: u32 = 0;
        let (members, skipped, next) = loop {
            let err = match read_members(client.as_ref(), &directory).await {
                Ok(read) => break read,
                Err(e) => e,
            };

            if err == CoordinationError::SessionExpired {
                shared.fail(&events, Error::SessionLost);
                return;
            }

            attempt += 1;
            if retry.should_give_up(attempt) {
                shared.fail(&events, Error::RefreshExhausted(attempt));
                return;
            }

            let delay = retry.delay_for_attempt(attempt - 1);
            tracing::warn!(
                directory = %directory,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "member refresh failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if matches!(err, CoordinationError::NoNode(_)) {
                if let Err(e) = ensure_hierarchy(client.as_ref(), &directory).await {
                    tracing::warn!(directory = %directory, error = %e, "could not recreate directory");
                }
            }
        };

        armed = next;
        if !shared.publish(&events, members, skipped) {
            return;
        }
    }
}

/// List, arm, and decode the current members of `directory`.
async fn read_members(
    client: &dyn CoordinationClient,
    directory: &str,
) -> std::result::Result<(Vec<ServiceInstance>, usize, ChildWatch), CoordinationError> {
    let (children, armed) = client.children_watch(directory).await?;

    let mut decoded = Vec::with_capacity(children.len());
    let mut skipped = 0;
    for child in children {
        let sequence = match parse_sequence(&child) {
            Some(seq) if child.starts_with(MEMBER_PREFIX) => seq,
            _ => {
                tracing::debug!(directory = %directory, child = %child, "ignoring non-member node");
                skipped += 1;
                continue;
            }
        };

        let path = format!("{directory}/{child}");
        let payload = match client.get_data(&path).await {
            Ok(p) => p,
            Err(CoordinationError::NoNode(_)) => {
                // removed after listing; the armed notification covers it
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        match instance::decode(&payload) {
            Ok(instance) => decoded.push((sequence, instance)),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "skipping malformed member");
                skipped += 1;
            }
        }
    }

    decoded.sort_by_key(|(sequence, _)| *sequence);
    let members = decoded.into_iter().map(|(_, instance)| instance).collect();
    Ok((members, skipped, armed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss_coordination::{CreateMode, MemorySession, MemoryStore};

    use crate::instance::encode;

    const DIR: &str = "/svc";

    async fn setup() -> (MemoryStore, Arc<MemorySession>) {
        let store = MemoryStore::new();
        let session = Arc::new(store.connect(&[]));
        session.create(DIR, vec![], CreateMode::Persistent).await.unwrap();
        (store, session)
    }

    async fn add(session: &MemorySession, port: u16) -> String {
        let payload = encode(&ServiceInstance::new("localhost", port, None)).unwrap();
        session
            .create(&format!("{DIR}/member_"), payload, CreateMode::EphemeralSequential)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn read_members_orders_by_sequence_not_value() {
        let (_store, session) = setup().await;
        add(&session, 9).await;
        add(&session, 1).await;
        add(&session, 5).await;

        let (members, skipped, _armed) = read_members(&*session, DIR).await.unwrap();
        let ports: Vec<u16> = members.iter().map(|m| m.service_endpoint.port).collect();
        assert_eq!(ports, vec![9, 1, 5]);
        assert_eq!(skipped, 0);
    }

    #[tokio::test]
    async fn read_members_skips_malformed_and_foreign_nodes() {
        let (_store, session) = setup().await;
        add(&session, 1).await;
        session
            .create(&format!("{DIR}/member_"), b"{oops".to_vec(), CreateMode::EphemeralSequential)
            .await
            .unwrap();
        session
            .create(&format!("{DIR}/lock"), vec![], CreateMode::Persistent)
            .await
            .unwrap();
        add(&session, 2).await;

        let (members, skipped, _armed) = read_members(&*session, DIR).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(skipped, 2);
    }

    #[tokio::test]
    async fn closed_watch_ignores_later_changes() {
        let (_store, session) = setup().await;
        let client: Arc<dyn CoordinationClient> = session.clone();
        let mut watch = Watch::start(client, DIR.into(), RetryPolicy::default())
            .await
            .unwrap();

        watch.close();
        add(&session, 1).await;
        tokio::task::yield_now().await;

        assert!(watch.event().await.is_none());
        assert!(watch.endpoints().is_empty());
        assert_eq!(watch.event_count(), 0);
        // second close is harmless
        watch.close();
        assert!(watch.is_closed());
    }

    #[tokio::test]
    async fn publish_after_close_is_discarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared = Shared {
            directory: DIR.into(),
            state: Mutex::new(State {
                members: vec![],
                event_count: 0,
                closed: true,
            }),
        };
        assert!(!shared.publish(&tx, vec![ServiceInstance::new("h", 1, None)], 0));
        shared.fail(&tx, Error::SessionLost);
        assert!(rx.try_recv().is_err());
        assert_eq!(shared.state.lock().event_count, 0);
    }
}
