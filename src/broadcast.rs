use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::ChannelMessage;

pub type ConnectionId = Uuid;

/// Registry of open channel connections and the fan-out over them.
///
/// Connections are never addressed individually: every notice goes to all
/// of them.
#[derive(Clone)]
pub struct Broadcaster {
    senders: Arc<DashMap<ConnectionId, mpsc::Sender<ChannelMessage>>>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(DashMap::new()),
        }
    }

    pub fn register_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ChannelMessage>,
    ) {
        self.senders.insert(connection_id, sender);
        debug!(%connection_id, "connection registered");
    }

    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        if self.senders.remove(connection_id).is_some() {
            debug!(%connection_id, "connection unregistered");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Sends one invalidation notice for `key` to every open connection.
    /// Connections that are closed or too far behind are dropped from the
    /// registry. Returns how many connections were reached.
    pub fn broadcast(&self, key: &str) -> usize {
        let msg = ChannelMessage::invalidate(key);

        let targets: Vec<(ConnectionId, mpsc::Sender<ChannelMessage>)> = self
            .senders
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();

        let mut delivered = 0;
        for (conn_id, sender) in targets {
            match sender.try_send(msg.clone()) {
                Ok(_) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(%conn_id, "send buffer full, disconnecting");
                    self.unregister_connection(&conn_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(%conn_id, "channel closed, cleaning up");
                    self.unregister_connection(&conn_id);
                }
            }
        }

        debug!(collection_key = key, delivered, "broadcast invalidation");
        delivered
    }
}
