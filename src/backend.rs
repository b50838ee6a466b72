use crate::models::{derive_title, Chat, Message};
use crate::simulator::ResponseSimulator;
use crate::storage::StorageManager;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;
use uuid::Uuid;

// Trait defining the backend a ChatStore reconciles against. Exactly one
// implementation is picked at construction time; the store never branches on
// which one it got.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Returns every known chat; called once at startup.
    async fn load_all(&self) -> Result<Vec<Chat>>;

    /// Allocates a new chat record with a backend-assigned id.
    async fn create(&self, title: &str) -> Result<Chat>;

    /// Appends the user message plus an assistant reply and returns the full
    /// updated chat. This is the call the typing indicator covers.
    async fn submit(&self, chat_id: Uuid, content: &str) -> Result<Chat>;

    async fn rename(&self, chat_id: Uuid, title: &str) -> Result<()>;

    async fn delete(&self, chat_id: Uuid) -> Result<()>;
}

// --- Remote backend: one HTTP call per operation against /api ---

#[derive(Serialize, Debug)]
struct CreateChatBody<'a> {
    title: &'a str,
}

#[derive(Deserialize, Debug)]
struct CreateChatResponse {
    success: bool,
    chat: Option<Chat>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize, Debug)]
struct SendMessageBody<'a> {
    content: &'a str,
    chat_id: Uuid,
}

#[derive(Serialize, Debug)]
struct UpdateTitleBody<'a> {
    title: &'a str,
}

pub struct RemoteBackend {
    client: Client,
    base_url: String,
}

impl RemoteBackend {
    /// `base_url` should point at the service's `/api` root.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        log::error!("Chat API request failed with status {}: {}", status, body);
        Err(anyhow::anyhow!(
            "Chat API request failed with status {}: {}",
            status,
            body
        ))
    }
}

#[async_trait]
impl ChatBackend for RemoteBackend {
    async fn load_all(&self) -> Result<Vec<Chat>> {
        log::info!("Loading chats from {}", self.base_url);
        let response = self
            .client
            .get(self.endpoint("/chats"))
            .send()
            .await
            .context("Failed to request chat list")?;
        Self::check(response)
            .await?
            .json::<Vec<Chat>>()
            .await
            .context("Failed to decode chat list")
    }

    async fn create(&self, title: &str) -> Result<Chat> {
        let response = self
            .client
            .post(self.endpoint("/chats"))
            .json(&CreateChatBody { title })
            .send()
            .await
            .context("Failed to send create-chat request")?;
        let body = Self::check(response)
            .await?
            .json::<CreateChatResponse>()
            .await
            .context("Failed to decode create-chat response")?;

        if !body.success {
            anyhow::bail!(
                "Chat service refused to create chat: {}",
                body.message.as_deref().unwrap_or("no reason given")
            );
        }
        body.chat
            .context("Chat service reported success without a chat record")
    }

    async fn submit(&self, chat_id: Uuid, content: &str) -> Result<Chat> {
        let response = self
            .client
            .post(self.endpoint(&format!("/chats/{}/messages", chat_id)))
            .json(&SendMessageBody { content, chat_id })
            .send()
            .await
            .context("Failed to send message request")?;
        Self::check(response)
            .await?
            .json::<Chat>()
            .await
            .context("Failed to decode updated chat")
    }

    async fn rename(&self, chat_id: Uuid, title: &str) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(&format!("/chats/{}/title", chat_id)))
            .json(&UpdateTitleBody { title })
            .send()
            .await
            .context("Failed to send rename request")?;
        Self::check(response).await.map(|_| ())
    }

    // Fire-and-forget: the store has already dropped the chat locally, so the
    // server-side delete runs in the background and only logs on failure.
    async fn delete(&self, chat_id: Uuid) -> Result<()> {
        let client = self.client.clone();
        let url = self.endpoint(&format!("/chats/{}", chat_id));
        tokio::spawn(async move {
            match client.delete(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    log::info!("Deleted chat {} on server", chat_id);
                }
                Ok(response) => {
                    log::warn!(
                        "Server-side delete of chat {} returned status {}",
                        chat_id,
                        response.status()
                    );
                }
                Err(e) => {
                    log::error!("Server-side delete of chat {} failed: {}", chat_id, e);
                }
            }
        });
        Ok(())
    }
}

// --- Simulated backend: local storage + canned replies ---

const DEFAULT_DELAY_MS: Range<u64> = 1000..3000;

pub struct SimulatedBackend {
    // Every operation is a read-modify-write over the one persisted document;
    // the lock serializes them so concurrent submits cannot clobber each
    // other's save.
    storage: tokio::sync::Mutex<StorageManager>,
    simulator: ResponseSimulator,
    delay_ms: Range<u64>,
}

impl SimulatedBackend {
    pub fn new(storage: StorageManager, simulator: ResponseSimulator) -> Self {
        Self {
            storage: tokio::sync::Mutex::new(storage),
            simulator,
            delay_ms: DEFAULT_DELAY_MS,
        }
    }

    /// Overrides the artificial reply latency; tests run with `0..0`.
    pub fn with_delay_ms(mut self, delay_ms: Range<u64>) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    async fn simulate_latency(&self) {
        let ms = if self.delay_ms.is_empty() {
            self.delay_ms.start
        } else {
            rand::thread_rng().gen_range(self.delay_ms.clone())
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl ChatBackend for SimulatedBackend {
    async fn load_all(&self) -> Result<Vec<Chat>> {
        Ok(self.storage.lock().await.load().await)
    }

    async fn create(&self, title: &str) -> Result<Chat> {
        let chat = Chat::new(title);
        let storage = self.storage.lock().await;
        let mut chats = storage.load().await;
        chats.insert(0, chat.clone());
        storage.save(&chats).await?;
        log::info!("Created chat {} in local storage", chat.id);
        Ok(chat)
    }

    async fn submit(&self, chat_id: Uuid, content: &str) -> Result<Chat> {
        self.simulate_latency().await;

        let storage = self.storage.lock().await;
        let mut chats = storage.load().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .with_context(|| format!("Chat {} not found", chat_id))?;

        chat.messages.push(Message::user(content));
        let reply = self.simulator.reply(content);
        chat.messages.push(Message::assistant(reply));

        // First exchange names the chat, same rule as the remote service
        if chat.messages.len() == 2 {
            chat.title = derive_title(content);
        }
        chat.updated_at = Utc::now();

        let updated = chat.clone();
        storage.save(&chats).await?;
        Ok(updated)
    }

    async fn rename(&self, chat_id: Uuid, title: &str) -> Result<()> {
        let storage = self.storage.lock().await;
        let mut chats = storage.load().await;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .with_context(|| format!("Chat {} not found", chat_id))?;
        chat.title = title.to_string();
        chat.updated_at = Utc::now();
        storage.save(&chats).await
    }

    async fn delete(&self, chat_id: Uuid) -> Result<()> {
        let storage = self.storage.lock().await;
        let mut chats = storage.load().await;
        let before = chats.len();
        chats.retain(|c| c.id != chat_id);
        if chats.len() == before {
            log::warn!("Attempted to delete non-existent chat: {}", chat_id);
        }
        storage.save(&chats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, TITLE_MAX_CHARS};

    async fn test_backend(dir: &std::path::Path) -> SimulatedBackend {
        let storage = StorageManager::new(dir).await.unwrap();
        SimulatedBackend::new(storage, ResponseSimulator::with_seed(3)).with_delay_ms(0..0)
    }

    #[tokio::test]
    async fn create_persists_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let backend = test_backend(dir.path()).await;

        let chat = backend.create("New Chat").await.unwrap();
        let all = backend.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, chat.id);
        assert_eq!(all[0].title, "New Chat");
    }

    #[tokio::test]
    async fn submit_appends_exchange_and_titles_chat() {
        let dir = tempfile::tempdir().unwrap();
        let backend = test_backend(dir.path()).await;

        let chat = backend.create("New Chat").await.unwrap();
        let updated = backend.submit(chat.id, "hello").await.unwrap();

        assert_eq!(updated.messages.len(), 2);
        assert_eq!(updated.messages[0].role, Role::User);
        assert_eq!(updated.messages[0].content, "hello");
        assert_eq!(updated.messages[1].role, Role::Assistant);
        assert_eq!(updated.title, "hello");

        // state survives through storage, and later sends keep the title
        let again = backend.submit(chat.id, "math question").await.unwrap();
        assert_eq!(again.messages.len(), 4);
        assert_eq!(again.title, "hello");
    }

    #[tokio::test]
    async fn submit_truncates_long_first_message_title() {
        let dir = tempfile::tempdir().unwrap();
        let backend = test_backend(dir.path()).await;

        let chat = backend.create("New Chat").await.unwrap();
        let content = "What is the capital of France and why is it Paris?";
        let updated = backend.submit(chat.id, content).await.unwrap();
        assert_eq!(updated.title, format!("{}...", &content[..TITLE_MAX_CHARS]));
    }

    #[tokio::test]
    async fn submit_to_unknown_chat_errors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = test_backend(dir.path()).await;
        assert!(backend.submit(Uuid::new_v4(), "hi").await.is_err());
    }

    #[tokio::test]
    async fn rename_and_delete_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let backend = test_backend(dir.path()).await;

        let a = backend.create("New Chat").await.unwrap();
        let b = backend.create("New Chat").await.unwrap();

        backend.rename(a.id, "physics notes").await.unwrap();
        backend.delete(b.id).await.unwrap();

        let all = backend.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[0].title, "physics notes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_submits_to_different_chats_both_persist() {
        let dir = tempfile::tempdir().unwrap();
        let backend = std::sync::Arc::new(test_backend(dir.path()).await);

        let a = backend.create("New Chat").await.unwrap();
        let b = backend.create("New Chat").await.unwrap();

        let (backend_a, backend_b) = (backend.clone(), backend.clone());
        let (a_id, b_id) = (a.id, b.id);
        let send_a = tokio::spawn(async move { backend_a.submit(a_id, "hello").await });
        let send_b = tokio::spawn(async move { backend_b.submit(b_id, "math question").await });
        send_a.await.unwrap().unwrap();
        send_b.await.unwrap().unwrap();

        // neither save may erase the other chat's exchange
        let all = backend.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        for chat in &all {
            assert_eq!(chat.messages.len(), 2, "chat {} lost its exchange", chat.id);
        }
    }

    #[test]
    fn remote_endpoint_tolerates_trailing_slash() {
        let backend = RemoteBackend::new("http://localhost:8000/api/");
        assert_eq!(
            backend.endpoint("/chats"),
            "http://localhost:8000/api/chats"
        );
    }
}
