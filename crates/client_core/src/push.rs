use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use shared::{
    domain::UserId,
    protocol::{ClientNotice, PushEvent},
};

use crate::{ChatClient, ClientEvent};

/// Lifecycle of the live event connection. Driven by peer selection and
/// session token availability; `Disconnected` after teardown or once the
/// reconnect ladder is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One live push connection, owned by the orchestrator and torn down
/// deterministically on peer change, deselection, or logout. A fresh
/// connection is required to resume after teardown.
pub(crate) struct PushConnection {
    task: JoinHandle<()>,
}

impl PushConnection {
    pub(crate) fn spawn(
        client: Arc<ChatClient>,
        epoch: u64,
        peer_id: UserId,
        token: String,
    ) -> Self {
        let task = tokio::spawn(async move {
            client.run_push_loop(epoch, peer_id, token).await;
        });
        Self { task }
    }

    pub(crate) fn shutdown(self) {
        self.task.abort();
    }
}

impl ChatClient {
    /// Connect/read loop for one peer subscription. Reconnects with a capped
    /// exponential ladder and parks disconnected (with a report) once the
    /// ladder is exhausted; stale-epoch checks make delivery stop cleanly the
    /// moment the peer selection changes.
    pub(crate) async fn run_push_loop(self: &Arc<Self>, epoch: u64, peer_id: UserId, token: String) {
        let url = match self.config.push_url(&token) {
            Ok(url) => url,
            Err(err) => {
                error!(%err, "push channel endpoint construction failed");
                self.set_push_state(epoch, PushState::Disconnected).await;
                return;
            }
        };
        let policy = self.config.push_retry;
        let mut failures = 0u32;
        let mut delay = policy.initial_delay;

        loop {
            if self.is_stale(epoch).await {
                return;
            }
            self.set_push_state(epoch, PushState::Connecting).await;

            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    failures = 0;
                    delay = policy.initial_delay;
                    self.set_push_state(epoch, PushState::Connected).await;
                    info!(peer_id = %peer_id, "push channel connected");

                    let (mut writer, mut reader) = stream.split();
                    let notice = ClientNotice::MessageSeen {
                        sender_id: peer_id.clone(),
                    };
                    match serde_json::to_string(&notice) {
                        Ok(text) => {
                            if let Err(err) = writer.send(WsMessage::Text(text)).await {
                                warn!(%err, "failed to send viewing-peer notice");
                            }
                        }
                        Err(err) => warn!(%err, "failed to encode viewing-peer notice"),
                    }

                    while let Some(frame) = reader.next().await {
                        if self.is_stale(epoch).await {
                            return;
                        }
                        match frame {
                            Ok(WsMessage::Text(text)) => {
                                match serde_json::from_str::<PushEvent>(&text) {
                                    Ok(event) => self.apply_push_event(epoch, event).await,
                                    Err(err) => {
                                        debug!(%err, "ignoring unrecognized push frame")
                                    }
                                }
                            }
                            Ok(WsMessage::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                warn!(%err, "push channel receive failed");
                                break;
                            }
                        }
                    }

                    if self.is_stale(epoch).await {
                        return;
                    }
                    warn!(peer_id = %peer_id, "push channel dropped");
                }
                Err(err) => {
                    warn!(attempt = failures + 1, %err, "push channel connect failed");
                }
            }

            self.set_push_state(epoch, PushState::Disconnected).await;
            failures += 1;
            if failures >= policy.max_attempts {
                error!(
                    peer_id = %peer_id,
                    attempts = policy.max_attempts,
                    "push channel down; not retrying until the peer is reselected"
                );
                self.emit(ClientEvent::Error(format!(
                    "push channel down after {} attempts; live status updates paused",
                    policy.max_attempts
                )));
                return;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(policy.max_delay);
        }
    }
}
