use std::collections::HashMap;

use futures::future::join_all;
use tracing::info;

use shared::{
    domain::{MediaKey, Peer, SearchHit, UserId},
    protocol::{DirectoryResponse, SearchResponse},
};

use crate::{error::into_api_result, ChatClient, ClientError, ClientEvent};

/// Directory browsing plus the search overlay. Search results live in
/// separate vectors so clearing the query restores the browse list exactly
/// as it was; the avatar lookup is shared by both views.
#[derive(Debug, Default)]
pub(crate) struct DirectoryState {
    users: Vec<Peer>,
    search_users: Vec<Peer>,
    search_messages: Vec<SearchHit>,
    searching: bool,
    avatars: HashMap<UserId, String>,
}

impl DirectoryState {
    pub(crate) fn set_directory(&mut self, users: Vec<Peer>) {
        self.users = users;
    }

    pub(crate) fn set_search_results(&mut self, users: Vec<Peer>, messages: Vec<SearchHit>) {
        self.search_users = users;
        self.search_messages = messages;
        self.searching = true;
    }

    /// Leaves the browse list untouched; only the overlay is dropped.
    pub(crate) fn clear_search(&mut self) {
        self.search_users.clear();
        self.search_messages.clear();
        self.searching = false;
    }

    pub(crate) fn record_avatar(&mut self, user_id: UserId, url: String) -> bool {
        match self.avatars.get(&user_id) {
            Some(existing) if existing == &url => false,
            _ => {
                self.avatars.insert(user_id, url);
                true
            }
        }
    }

    pub(crate) fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            users: if self.searching {
                self.search_users.clone()
            } else {
                self.users.clone()
            },
            searching: self.searching,
            search_messages: self.search_messages.clone(),
            avatars: self.avatars.clone(),
        }
    }
}

/// What the sidebar renders: the visible peer list (browse or overlay), the
/// mode flag, message hits when searching, and resolved avatar URLs.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    pub users: Vec<Peer>,
    pub searching: bool,
    pub search_messages: Vec<SearchHit>,
    pub avatars: HashMap<UserId, String>,
}

impl ChatClient {
    /// Fetches the user directory, replacing the browse list, then eagerly
    /// resolves every surfaced avatar into the shared lookup.
    pub async fn list_users(&self) -> Result<Vec<Peer>, ClientError> {
        let (token, _) = self.session().await?;
        let response = self
            .http
            .get(format!("{}/users/get-users", self.config.api_base))
            .bearer_auth(&token)
            .send()
            .await?;
        let body: DirectoryResponse = into_api_result(response).await?.json().await?;
        let peers: Vec<Peer> = body.users.into_iter().map(Peer::from).collect();
        info!(count = peers.len(), "directory refreshed");
        {
            let mut guard = self.inner.lock().await;
            guard.directory.set_directory(peers.clone());
        }
        self.emit(ClientEvent::DirectoryUpdated);
        self.resolve_avatars(&peers).await;
        Ok(peers)
    }

    /// An empty or whitespace query clears search mode and restores the
    /// directory view; anything else fetches the combined user/message
    /// lookup into the overlay.
    pub async fn search(&self, query: &str) -> Result<(), ClientError> {
        if query.trim().is_empty() {
            {
                let mut guard = self.inner.lock().await;
                guard.directory.clear_search();
            }
            self.emit(ClientEvent::SearchUpdated);
            return Ok(());
        }

        let (token, _) = self.session().await?;
        let response = self
            .http
            .get(format!("{}/chats/searchApi", self.config.api_base))
            .query(&[("q", query)])
            .bearer_auth(&token)
            .send()
            .await?;
        let body: SearchResponse = into_api_result(response).await?.json().await?;
        let users: Vec<Peer> = body.users.into_iter().map(Peer::from).collect();
        let messages: Vec<SearchHit> = body.messages.into_iter().map(SearchHit::from).collect();
        {
            let mut guard = self.inner.lock().await;
            guard
                .directory
                .set_search_results(users.clone(), messages);
        }
        self.emit(ClientEvent::SearchUpdated);
        self.resolve_avatars(&users).await;
        Ok(())
    }

    /// Concurrent avatar fan-out; peers without an avatar key cost nothing,
    /// failed resolutions simply leave no entry.
    pub(crate) async fn resolve_avatars(&self, peers: &[Peer]) {
        let lookups: Vec<(UserId, MediaKey)> = peers
            .iter()
            .filter_map(|peer| peer.avatar.clone().map(|key| (peer.id.clone(), key)))
            .collect();
        if lookups.is_empty() {
            return;
        }

        let resolved = join_all(lookups.into_iter().map(|(user_id, key)| {
            let resolver = self.resolver.clone();
            async move { (user_id, resolver.resolve(key.as_str()).await) }
        }))
        .await;

        let mut updates = Vec::new();
        {
            let mut guard = self.inner.lock().await;
            for (user_id, url) in resolved {
                if let Some(url) = url {
                    if guard.directory.record_avatar(user_id.clone(), url.clone()) {
                        updates.push(ClientEvent::AvatarResolved { user_id, url });
                    }
                }
            }
        }
        for event in updates {
            self.emit(event);
        }
    }
}
