use crate::backend::ChatBackend;
use crate::models::{derive_title, Chat, Message, DEFAULT_CHAT_TITLE};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Shown in place of a reply when a send fails; the failure itself never
/// reaches the caller.
pub const SEND_ERROR_NOTICE: &str =
    "Sorry, something went wrong while sending your message. Please try again.";

const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Default)]
struct StoreState {
    chats: Vec<Chat>,
    current_chat_id: Option<Uuid>,
    is_typing: bool,
    is_loading: bool,
}

// Owns the chat list and the optimistic-update protocol. Cloning is cheap and
// shares the same state, so UI consumers and background tasks can hold their
// own handle.
#[derive(Clone)]
pub struct ChatStore {
    state: Arc<Mutex<StoreState>>,
    backend: Arc<dyn ChatBackend>,
    // Chats with an outstanding submit; a second send against one of these is
    // rejected rather than raced (see DESIGN.md).
    in_flight: Arc<DashMap<Uuid, ()>>,
    submit_timeout: Duration,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            backend,
            in_flight: Arc::new(DashMap::new()),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    /// Bounds how long a single submit may stay outstanding before it is
    /// treated as failed and rolled back.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    // --- read surface ---

    pub async fn chats(&self) -> Vec<Chat> {
        self.state.lock().await.chats.clone()
    }

    pub async fn current_chat(&self) -> Option<Chat> {
        let state = self.state.lock().await;
        let id = state.current_chat_id?;
        state.chats.iter().find(|c| c.id == id).cloned()
    }

    pub async fn current_chat_id(&self) -> Option<Uuid> {
        self.state.lock().await.current_chat_id
    }

    pub async fn is_typing(&self) -> bool {
        self.state.lock().await.is_typing
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.is_loading
    }

    // --- operations ---

    /// Hydrates the store from the backend. Called once at startup; a failure
    /// is logged and leaves the store empty.
    pub async fn load_chats(&self) {
        self.state.lock().await.is_loading = true;

        let loaded = self.backend.load_all().await;

        let mut state = self.state.lock().await;
        match loaded {
            Ok(chats) => {
                log::info!("Loaded {} chats", chats.len());
                state.chats = chats;
                // The pointer must keep referencing an existing chat; a held
                // id the backend no longer knows falls back to the first chat.
                let still_exists = state
                    .current_chat_id
                    .is_some_and(|id| state.chats.iter().any(|c| c.id == id));
                if !still_exists {
                    state.current_chat_id = state.chats.first().map(|c| c.id);
                }
            }
            Err(e) => {
                log::error!("Failed to load chats: {:?}", e);
            }
        }
        state.is_loading = false;
    }

    /// Creates a new empty chat, prepends it and makes it current. Never
    /// fails: if the backend refuses, the chat is allocated locally and the
    /// mismatch surfaces later through the normal send rollback path.
    pub async fn create_chat(&self) -> Chat {
        let chat = match self.backend.create(DEFAULT_CHAT_TITLE).await {
            Ok(chat) => chat,
            Err(e) => {
                log::error!("Backend failed to create chat, allocating locally: {:?}", e);
                Chat::new(DEFAULT_CHAT_TITLE)
            }
        };

        let mut state = self.state.lock().await;
        state.current_chat_id = Some(chat.id);
        state.chats.insert(0, chat.clone());
        chat
    }

    /// Makes `id` the current chat. Unknown ids are ignored; the UI only ever
    /// passes ids it got from this store.
    pub async fn switch_chat(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        if state.chats.iter().any(|c| c.id == id) {
            state.current_chat_id = Some(id);
        } else {
            log::debug!("Ignoring switch to unknown chat: {}", id);
        }
    }

    /// Removes a chat locally and requests backend-side deletion. If the
    /// deleted chat was current, the first remaining chat (if any) takes over.
    pub async fn delete_chat(&self, id: Uuid) {
        {
            let mut state = self.state.lock().await;
            let before = state.chats.len();
            state.chats.retain(|c| c.id != id);
            if state.chats.len() == before {
                log::debug!("Ignoring delete of unknown chat: {}", id);
                return;
            }
            if state.current_chat_id == Some(id) {
                state.current_chat_id = state.chats.first().map(|c| c.id);
            }
        }

        if let Err(e) = self.backend.delete(id).await {
            log::error!("Backend failed to delete chat {}: {:?}", id, e);
        }
    }

    /// Renames a chat locally, then asks the backend to persist the rename.
    pub async fn update_title(&self, id: Uuid, new_title: &str) {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            log::warn!("Ignoring empty title for chat {}", id);
            return;
        }

        {
            let mut state = self.state.lock().await;
            match state.chats.iter_mut().find(|c| c.id == id) {
                Some(chat) => chat.title = new_title.to_string(),
                None => {
                    log::debug!("Ignoring rename of unknown chat: {}", id);
                    return;
                }
            }
        }

        if let Err(e) = self.backend.rename(id, new_title).await {
            log::error!("Backend failed to rename chat {}: {:?}", id, e);
        }
    }

    /// Sends a user message through the optimistic-update protocol: the
    /// message appears immediately, the backend call runs with the typing
    /// indicator up, and the result either replaces the chat wholesale or
    /// rolls the message back and leaves an error notice in its place.
    pub async fn send_message(&self, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        let user_message = Message::user(content);
        let optimistic_id = user_message.id;

        // Optimistic apply under one short lock; the target chat id is fixed
        // here and resolution never re-reads the current pointer.
        let chat_id = {
            let mut state = self.state.lock().await;

            let chat_id = match state.current_chat_id {
                Some(id) => id,
                None => match state.chats.first().map(|c| c.id) {
                    Some(first) => {
                        state.current_chat_id = Some(first);
                        first
                    }
                    None => {
                        // No chat at all: create one and stop. The typed
                        // message is intentionally not replayed.
                        drop(state);
                        self.create_chat().await;
                        return;
                    }
                },
            };

            if self.in_flight.contains_key(&chat_id) {
                log::warn!("Rejecting overlapping send to chat {}", chat_id);
                return;
            }
            self.in_flight.insert(chat_id, ());

            // A failure here is absorbed like any other; the caller never
            // sees a panic out of a send.
            let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) else {
                log::error!("Current chat {} is missing from the chat list", chat_id);
                self.in_flight.remove(&chat_id);
                return;
            };
            if chat.messages.is_empty() {
                chat.title = derive_title(content);
            }
            chat.messages.push(user_message);
            state.is_typing = true;
            chat_id
        };

        // The single suspension point: the store stays unlocked and readable
        // while the backend round trip is outstanding.
        let result = tokio::time::timeout(
            self.submit_timeout,
            self.backend.submit(chat_id, content),
        )
        .await;

        let mut state = self.state.lock().await;
        match result {
            Ok(Ok(updated)) => {
                // Wholesale replacement: the optimistic message is superseded
                // by the authoritative record, never merged.
                match state.chats.iter_mut().find(|c| c.id == chat_id) {
                    Some(chat) => *chat = updated,
                    None => log::info!(
                        "Chat {} was deleted while its send was in flight",
                        chat_id
                    ),
                }
            }
            Ok(Err(e)) => {
                log::error!("Send to chat {} failed: {:?}", chat_id, e);
                Self::rollback(&mut state, chat_id, optimistic_id);
            }
            Err(_) => {
                log::error!(
                    "Send to chat {} timed out after {:?}",
                    chat_id,
                    self.submit_timeout
                );
                Self::rollback(&mut state, chat_id, optimistic_id);
            }
        }
        // Sends to different chats may overlap; the indicator stays up until
        // the last outstanding submit resolves.
        self.in_flight.remove(&chat_id);
        state.is_typing = !self.in_flight.is_empty();
    }

    // Removes the optimistic user message and substitutes a visible error
    // notice. A chat deleted mid-flight is left alone.
    fn rollback(state: &mut StoreState, chat_id: Uuid, optimistic_id: Uuid) {
        if let Some(chat) = state.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.messages.retain(|m| m.id != optimistic_id);
            chat.messages.push(Message::assistant(SEND_ERROR_NOTICE));
        }
    }
}
