use std::sync::{Arc, Mutex as StdMutex};

use reqwest::multipart;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use shared::{
    domain::{Message, MessageId, Peer, Profile, UserId},
    protocol::{
        ChatRecord, HistoryResponse, LoginRequest, LoginResponse, ProfileResponse, PushEvent,
        SendMessageRequest, SendResponse,
    },
};

pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod presence;
pub mod push;
pub mod resolver;

pub use config::{ClientConfig, PushRetryPolicy};
pub use conversation::{ConversationSnapshot, MediaUpload};
pub use directory::DirectorySnapshot;
pub use error::ClientError;
pub use push::PushState;
pub use resolver::{HttpResourceFetcher, MediaResolver, ResourceFetcher};

use conversation::Conversation;
use directory::DirectoryState;
use error::into_api_result;
use push::PushConnection;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Notifications fanned out to the UI layer. Snapshots carry the state;
/// events only signal that something changed or failed.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ConversationLoaded { peer_id: UserId },
    MessageAppended { message: Message },
    MessageSettled {
        provisional_id: MessageId,
        message_id: MessageId,
    },
    SendFailed {
        provisional_id: MessageId,
        reason: String,
    },
    SeenApplied { receiver_id: UserId },
    DirectoryUpdated,
    SearchUpdated,
    AvatarResolved { user_id: UserId, url: String },
    PushStateChanged(PushState),
    Error(String),
}

struct SessionIdentity {
    token: String,
    profile: Profile,
}

#[derive(Default)]
struct ClientState {
    session: Option<SessionIdentity>,
    /// Bumped on every peer (de)selection, login, and logout. Async
    /// completions re-check it under the lock and drop stale work instead of
    /// overwriting the now-active conversation.
    epoch: u64,
    conversation: Option<Conversation>,
    directory: DirectoryState,
    push_state: PushState,
}

/// Composition root of the synchronization core: owns the active peer, the
/// conversation store, the push connection, the directory state, and the
/// media resolver, and reconciles REST history, optimistic sends, and push
/// events into one consistent timeline.
pub struct ChatClient {
    http: reqwest::Client,
    config: ClientConfig,
    resolver: Arc<MediaResolver>,
    bearer: Arc<StdMutex<Option<String>>>,
    inner: Mutex<ClientState>,
    push: Mutex<Option<PushConnection>>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let http = reqwest::Client::new();
        let bearer = Arc::new(StdMutex::new(None));
        let fetcher = Arc::new(HttpResourceFetcher::new(
            http.clone(),
            config.api_base.clone(),
            Arc::clone(&bearer),
        ));
        Self::assemble(config, http, bearer, fetcher)
    }

    pub fn new_with_fetcher(config: ClientConfig, fetcher: Arc<dyn ResourceFetcher>) -> Arc<Self> {
        let http = reqwest::Client::new();
        let bearer = Arc::new(StdMutex::new(None));
        Self::assemble(config, http, bearer, fetcher)
    }

    fn assemble(
        config: ClientConfig,
        http: reqwest::Client,
        bearer: Arc<StdMutex<Option<String>>>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            http,
            config,
            resolver: Arc::new(MediaResolver::new(fetcher)),
            bearer,
            inner: Mutex::new(ClientState::default()),
            push: Mutex::new(None),
            events,
        })
    }

    // ---- session -----------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<Profile, ClientError> {
        let response = self
            .http
            .post(format!("{}/users/loginUser", self.config.api_base))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: LoginResponse = into_api_result(response).await?.json().await?;
        let profile = Profile::from(body.user);
        {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.conversation = None;
            guard.directory = DirectoryState::default();
            guard.push_state = PushState::Disconnected;
            guard.session = Some(SessionIdentity {
                token: body.access_token.clone(),
                profile: profile.clone(),
            });
        }
        *self.bearer.lock().expect("bearer token lock poisoned") = Some(body.access_token);
        if let Some(previous) = self.push.lock().await.take() {
            previous.shutdown();
        }
        info!(user_id = %profile.id, "session established");
        Ok(profile)
    }

    /// Asks the server who the session token belongs to. `Ok(None)` means
    /// logged out: either no token is held, or the server rejected it (in
    /// which case local session state is cleared rather than error-looped).
    pub async fn who_am_i(&self) -> Result<Option<Profile>, ClientError> {
        let token = {
            let guard = self.inner.lock().await;
            match guard.session.as_ref() {
                Some(session) => session.token.clone(),
                None => return Ok(None),
            }
        };
        let response = self
            .http
            .get(format!("{}/users/viewProfile", self.config.api_base))
            .bearer_auth(&token)
            .send()
            .await?;
        match into_api_result(response).await {
            Ok(response) => {
                let body: ProfileResponse = response.json().await?;
                let profile = Profile::from(body.user);
                let mut guard = self.inner.lock().await;
                if let Some(session) = guard.session.as_mut() {
                    session.profile = profile.clone();
                }
                Ok(Some(profile))
            }
            Err(ClientError::Unauthorized) => {
                warn!("session token rejected; treating as logged out");
                self.logout().await;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn fetch_peer_profile(&self, id: &UserId) -> Result<Profile, ClientError> {
        let (token, _) = self.session().await?;
        let response = self
            .http
            .get(format!(
                "{}/users/viewProfileById/{}",
                self.config.api_base, id
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        let body: ProfileResponse = into_api_result(response).await?.json().await?;
        Ok(Profile::from(body.user))
    }

    /// Terminates the push channel and clears all local session state.
    pub async fn logout(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.session = None;
            guard.conversation = None;
            guard.directory = DirectoryState::default();
            guard.push_state = PushState::Disconnected;
        }
        *self.bearer.lock().expect("bearer token lock poisoned") = None;
        if let Some(connection) = self.push.lock().await.take() {
            connection.shutdown();
        }
        info!("session cleared");
    }

    // ---- conversation ------------------------------------------------------

    /// Makes `peer` the active conversation: bumps the epoch (stale async
    /// results for the previous peer are discarded, not raced), subscribes
    /// the push channel to this peer, and loads the history.
    pub async fn select_peer(self: &Arc<Self>, peer: Peer) -> Result<(), ClientError> {
        let (token, _) = self.session().await?;
        let peer_id = peer.id.clone();
        let epoch = {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.conversation = Some(Conversation::new(peer));
            guard.push_state = PushState::Disconnected;
            guard.epoch
        };
        info!(peer_id = %peer_id, "conversation opened");
        let connection = PushConnection::spawn(Arc::clone(self), epoch, peer_id.clone(), token);
        {
            let mut push_guard = self.push.lock().await;
            if self.inner.lock().await.epoch == epoch {
                if let Some(previous) = push_guard.replace(connection) {
                    previous.shutdown();
                }
            } else {
                // A newer selection already owns the slot.
                connection.shutdown();
            }
        }
        self.load_history_guarded(epoch, &peer_id).await
    }

    /// Tears the active conversation down: the message list is dropped and
    /// the push subscription released.
    pub async fn deselect_peer(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.conversation = None;
            guard.push_state = PushState::Disconnected;
        }
        if let Some(connection) = self.push.lock().await.take() {
            connection.shutdown();
        }
        self.emit(ClientEvent::PushStateChanged(PushState::Disconnected));
        info!("conversation closed");
    }

    /// Re-fetches the active peer's history. On failure the current list is
    /// left untouched and the error is both returned and retrievable from
    /// the snapshot.
    pub async fn load_history(&self, peer_id: &UserId) -> Result<(), ClientError> {
        let epoch = {
            let guard = self.inner.lock().await;
            let conversation = guard
                .conversation
                .as_ref()
                .ok_or(ClientError::NoActiveConversation)?;
            if conversation.peer.id != *peer_id {
                return Err(ClientError::NoActiveConversation);
            }
            guard.epoch
        };
        self.load_history_guarded(epoch, peer_id).await
    }

    async fn load_history_guarded(&self, epoch: u64, peer_id: &UserId) -> Result<(), ClientError> {
        let token = {
            let mut guard = self.inner.lock().await;
            let session = guard.session.as_ref().ok_or(ClientError::NotLoggedIn)?;
            let token = session.token.clone();
            if guard.epoch == epoch {
                if let Some(conversation) = guard.conversation.as_mut() {
                    conversation.loading = true;
                }
            }
            token
        };

        let result = self.fetch_history(&token, peer_id).await;

        let mut guard = self.inner.lock().await;
        if guard.epoch != epoch {
            debug!(peer_id = %peer_id, "dropping stale history response");
            return Ok(());
        }
        let Some(conversation) = guard.conversation.as_mut() else {
            return Ok(());
        };
        conversation.loading = false;
        match result {
            Ok(messages) => {
                let count = messages.len();
                conversation.replace_history(messages);
                drop(guard);
                debug!(peer_id = %peer_id, count, "history replaced");
                self.emit(ClientEvent::ConversationLoaded {
                    peer_id: peer_id.clone(),
                });
                Ok(())
            }
            Err(err) => {
                conversation.last_error = Some(err.to_string());
                drop(guard);
                warn!(peer_id = %peer_id, %err, "history fetch failed");
                self.emit(ClientEvent::Error(format!("failed to load history: {err}")));
                Err(err)
            }
        }
    }

    async fn fetch_history(
        &self,
        token: &str,
        peer_id: &UserId,
    ) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(format!(
                "{}/chats/get-chats/{}",
                self.config.api_base, peer_id
            ))
            .bearer_auth(token)
            .send()
            .await?;
        let body: HistoryResponse = into_api_result(response).await?.json().await?;
        Ok(body.chats.into_iter().map(Message::from).collect())
    }

    /// Appends an optimistic entry immediately, clears staged input, then
    /// persists asynchronously. On acknowledgement the provisional entry is
    /// spliced against the server record; on failure it stays visible so the
    /// user can notice and resend.
    pub async fn send_message(
        &self,
        content: Option<String>,
        media: Option<MediaUpload>,
    ) -> Result<(), ClientError> {
        let content = content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if content.is_none() && media.is_none() {
            return Err(ClientError::EmptyMessage);
        }
        let (token, self_id) = self.session().await?;

        let (epoch, peer_id, provisional) = {
            let mut guard = self.inner.lock().await;
            let epoch = guard.epoch;
            let conversation = guard
                .conversation
                .as_mut()
                .ok_or(ClientError::NoActiveConversation)?;
            let provisional = Message::provisional(
                self_id,
                conversation.peer.id.clone(),
                content.clone(),
                media.as_ref().map(|upload| upload.kind),
            );
            conversation.append_optimistic(provisional.clone());
            conversation.clear_staged();
            (epoch, conversation.peer.id.clone(), provisional)
        };
        self.emit(ClientEvent::MessageAppended {
            message: provisional.clone(),
        });

        let result = self.post_send(&token, &peer_id, content, media).await;

        let mut guard = self.inner.lock().await;
        if guard.epoch != epoch {
            return result.map(|_| ());
        }
        let Some(conversation) = guard.conversation.as_mut() else {
            return result.map(|_| ());
        };
        match result {
            Ok(Some(record)) => {
                let persisted = Message::from(record);
                let message_id = persisted.id.clone();
                conversation.reconcile_provisional(&provisional.id, persisted);
                drop(guard);
                self.emit(ClientEvent::MessageSettled {
                    provisional_id: provisional.id,
                    message_id,
                });
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                conversation.last_error = Some(err.to_string());
                drop(guard);
                self.emit(ClientEvent::SendFailed {
                    provisional_id: provisional.id,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn post_send(
        &self,
        token: &str,
        peer_id: &UserId,
        content: Option<String>,
        media: Option<MediaUpload>,
    ) -> Result<Option<ChatRecord>, ClientError> {
        let request = self
            .http
            .post(format!(
                "{}/chats/create-chat/{}",
                self.config.api_base, peer_id
            ))
            .bearer_auth(token);
        let request = match media {
            Some(upload) => {
                let part = multipart::Part::bytes(upload.bytes)
                    .file_name(upload.filename)
                    .mime_str(&upload.mime_type)
                    .map_err(|err| ClientError::InvalidMedia(err.to_string()))?;
                let mut form = multipart::Form::new().part("image", part);
                if let Some(text) = content {
                    form = form.text("message", text);
                }
                request.multipart(form)
            }
            None => request.json(&SendMessageRequest { message: content }),
        };
        let response = into_api_result(request.send().await?).await?;
        // A body without the persisted record is still a successful send;
        // the provisional entry then simply stays as-is.
        Ok(response
            .json::<SendResponse>()
            .await
            .ok()
            .map(|body| body.chat))
    }

    /// Applies a push event to the active conversation. Idempotent: applying
    /// the same event twice yields the same state (and no second
    /// notification).
    pub async fn apply_status_event(&self, event: PushEvent) {
        let epoch = self.inner.lock().await.epoch;
        self.apply_push_event(epoch, event).await;
    }

    pub(crate) async fn apply_push_event(&self, epoch: u64, event: PushEvent) {
        match event {
            PushEvent::MessagesSeen { receiver_id } => {
                let changed = {
                    let mut guard = self.inner.lock().await;
                    if guard.epoch != epoch {
                        debug!(%receiver_id, "dropping seen receipt from stale push connection");
                        return;
                    }
                    match guard.conversation.as_mut() {
                        Some(conversation) => conversation.apply_seen(&receiver_id),
                        None => false,
                    }
                };
                if changed {
                    self.emit(ClientEvent::SeenApplied { receiver_id });
                }
            }
        }
    }

    // ---- staged input ------------------------------------------------------

    pub async fn stage_draft(&self, text: &str) -> Result<(), ClientError> {
        let mut guard = self.inner.lock().await;
        let conversation = guard
            .conversation
            .as_mut()
            .ok_or(ClientError::NoActiveConversation)?;
        conversation.draft = text.to_string();
        Ok(())
    }

    pub async fn stage_media(&self, upload: MediaUpload) -> Result<(), ClientError> {
        let mut guard = self.inner.lock().await;
        let conversation = guard
            .conversation
            .as_mut()
            .ok_or(ClientError::NoActiveConversation)?;
        conversation.staged_media = Some(upload);
        Ok(())
    }

    pub async fn send_staged(&self) -> Result<(), ClientError> {
        let (content, media) = {
            let guard = self.inner.lock().await;
            let conversation = guard
                .conversation
                .as_ref()
                .ok_or(ClientError::NoActiveConversation)?;
            (
                (!conversation.draft.trim().is_empty()).then(|| conversation.draft.clone()),
                conversation.staged_media.clone(),
            )
        };
        self.send_message(content, media).await
    }

    // ---- views -------------------------------------------------------------

    pub async fn conversation_snapshot(&self) -> Option<ConversationSnapshot> {
        let guard = self.inner.lock().await;
        guard
            .conversation
            .as_ref()
            .map(|conversation| ConversationSnapshot {
                peer: conversation.peer.clone(),
                messages: conversation.messages.clone(),
                loading: conversation.loading,
                last_error: conversation.last_error.clone(),
                draft: conversation.draft.clone(),
                push_state: guard.push_state,
            })
    }

    pub async fn directory_snapshot(&self) -> DirectorySnapshot {
        self.inner.lock().await.directory.snapshot()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|session| session.profile.clone())
    }

    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    // ---- internals ---------------------------------------------------------

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) async fn is_stale(&self, epoch: u64) -> bool {
        self.inner.lock().await.epoch != epoch
    }

    pub(crate) async fn set_push_state(&self, epoch: u64, next: PushState) {
        let changed = {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch || guard.push_state == next {
                false
            } else {
                guard.push_state = next;
                true
            }
        };
        if changed {
            self.emit(ClientEvent::PushStateChanged(next));
        }
    }

    pub(crate) async fn session(&self) -> Result<(String, UserId), ClientError> {
        let guard = self.inner.lock().await;
        let session = guard.session.as_ref().ok_or(ClientError::NotLoggedIn)?;
        Ok((session.token.clone(), session.profile.id.clone()))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
