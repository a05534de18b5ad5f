use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::QueryCache;
use crate::types::ChannelMessage;

/// Lifecycle of the invalidation listener. `Disconnected` is both the
/// starting state and, after teardown, the terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// Applies one raw channel message to the cache. Returns the invalidated key,
/// or `None` when the message was dropped.
pub fn handle_message<T>(cache: &QueryCache<T>, text: &str) -> Option<String>
where
    T: Clone + Send + Sync + 'static,
{
    match serde_json::from_str::<ChannelMessage>(text) {
        Ok(ChannelMessage::Invalidate { query_key }) if !query_key.is_empty() => {
            cache.invalidate(&query_key);
            Some(query_key)
        }
        Ok(_) => {
            debug!("dropping invalidation without a key");
            None
        }
        Err(e) => {
            debug!(error = %e, "dropping malformed channel message");
            None
        }
    }
}

/// Owner of a running listener. Dropping it cancels the listener without
/// waiting; [`ChannelHandle::teardown`] also waits for the socket to close.
pub struct ChannelHandle {
    state: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Closes the socket and cancels any pending reconnect.
    pub async fn teardown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens the invalidation channel at `url` and keeps it open, reconnecting
/// after `backoff` whenever it closes, until torn down.
pub fn spawn_listener<T>(url: &str, cache: QueryCache<T>, backoff: Duration) -> ChannelHandle
where
    T: Clone + Send + Sync + 'static,
{
    let (state_tx, state) = watch::channel(ChannelState::Disconnected);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_listener(
        url.to_string(),
        cache,
        backoff,
        cancel.clone(),
        state_tx,
    ));

    ChannelHandle {
        state,
        cancel,
        task: Some(task),
    }
}

async fn run_listener<T>(
    url: String,
    cache: QueryCache<T>,
    backoff: Duration,
    cancel: CancellationToken,
    state: watch::Sender<ChannelState>,
) where
    T: Clone + Send + Sync + 'static,
{
    'reconnect: loop {
        state.send_replace(ChannelState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break 'reconnect,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((mut socket, _)) => {
                state.send_replace(ChannelState::Open);
                info!(%url, "invalidation channel open");

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = socket.close(None).await;
                            break 'reconnect;
                        }
                        msg = socket.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                handle_message(&cache, &text);
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                debug!(error = %e, "invalidation channel read failed");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => {
                debug!(%url, error = %e, "invalidation channel connect failed");
            }
        }

        state.send_replace(ChannelState::Closed);
        debug!(backoff_ms = backoff.as_millis() as u64, "invalidation channel closed, retrying");

        tokio::select! {
            _ = cancel.cancelled() => break 'reconnect,
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    state.send_replace(ChannelState::Disconnected);
    info!(%url, "invalidation channel torn down");
}
