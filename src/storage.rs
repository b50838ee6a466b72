use crate::models::Chat;
use anyhow::Context;
use std::path::{Path, PathBuf};

// The single durable record the simulated backend writes through. The whole
// chat list lives under this one key, serialized as a JSON array.
const CHATS_KEY: &str = "chats.json";

#[derive(Debug)]
pub struct StorageManager {
    path: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager rooted at `data_dir`, creating the
    /// directory if needed.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir)
            .await
            .context("Failed to create data directory")?;

        let path = data_dir.join(CHATS_KEY);
        log::info!("Chat storage at: {}", path.display());
        Ok(Self { path })
    }

    /// Loads the persisted chat list. An absent or unreadable record is an
    /// empty list; a corrupt record is logged and treated the same, so a bad
    /// payload never breaks startup.
    pub async fn load(&self) -> Vec<Chat> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No persisted chats at {}", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                log::error!("Failed to read persisted chats: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<Chat>>(&bytes) {
            Ok(chats) => {
                log::info!("Loaded {} persisted chats", chats.len());
                chats
            }
            Err(e) => {
                log::warn!("Persisted chat data is corrupt, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Serializes the full chat list and overwrites the stored record.
    pub async fn save(&self, chats: &[Chat]) -> Result<(), anyhow::Error> {
        log::debug!("Persisting {} chats", chats.len());
        let bytes =
            serde_json::to_vec_pretty(chats).context("Failed to serialize chat list")?;

        tokio::fs::write(&self.path, bytes)
            .await
            .context("Failed to write chat list to disk")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[tokio::test]
    async fn round_trips_chats() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).await.unwrap();

        let mut chat = Chat::new("New Chat");
        chat.messages.push(Message::user("hello"));
        chat.messages.push(Message::assistant("hi!"));
        storage.save(&[chat.clone()]).await.unwrap();

        let loaded = storage.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, chat.id);
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[0].content, "hello");
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).await.unwrap();
        assert!(storage.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join(CHATS_KEY), b"{not json")
            .await
            .unwrap();
        assert!(storage.load().await.is_empty());
    }

    #[tokio::test]
    async fn saving_a_loaded_list_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).await.unwrap();

        let mut chat = Chat::new("idempotence");
        chat.messages.push(Message::user("ping"));
        storage.save(&[chat]).await.unwrap();

        let first = tokio::fs::read(dir.path().join(CHATS_KEY)).await.unwrap();
        let reloaded = storage.load().await;
        storage.save(&reloaded).await.unwrap();
        let second = tokio::fs::read(dir.path().join(CHATS_KEY)).await.unwrap();

        assert_eq!(first, second);
    }
}
