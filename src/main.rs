// Minimal console consumer of the chat store. It only reads store state and
// invokes store operations; all session logic lives in the library.

use anyhow::Result;
use studychat::{BackendMode, ChatStore, Role};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mode = BackendMode::from_env()?;
    let backend = mode.build_backend().await?;
    let store = ChatStore::new(backend);
    store.load_chats().await;

    println!("studychat: /new, /list, /switch <n>, /delete <n>, /title <text>, /quit");
    print_current(&store).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        match line.split_once(' ').map_or((line.as_str(), ""), |(c, r)| (c, r.trim())) {
            ("/quit", _) | ("/exit", _) => break,
            ("/new", _) => {
                store.create_chat().await;
                print_current(&store).await;
            }
            ("/list", _) => {
                let current = store.current_chat_id().await;
                for (i, chat) in store.chats().await.iter().enumerate() {
                    let marker = if Some(chat.id) == current { "*" } else { " " };
                    println!("{} [{}] {}", marker, i, chat.title);
                }
            }
            ("/switch", arg) => {
                if let Some(chat) = chat_at(&store, arg).await {
                    store.switch_chat(chat).await;
                }
                print_current(&store).await;
            }
            ("/delete", arg) => {
                if let Some(chat) = chat_at(&store, arg).await {
                    store.delete_chat(chat).await;
                }
                print_current(&store).await;
            }
            ("/title", arg) => {
                if let Some(id) = store.current_chat_id().await {
                    store.update_title(id, arg).await;
                }
            }
            ("", _) => {}
            _ => {
                store.send_message(&line).await;
                if let Some(chat) = store.current_chat().await {
                    if let Some(reply) = chat
                        .messages
                        .iter()
                        .rev()
                        .find(|m| m.role == Role::Assistant)
                    {
                        println!("assistant: {}", reply.content);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn chat_at(store: &ChatStore, arg: &str) -> Option<uuid::Uuid> {
    let index: usize = arg.parse().ok()?;
    store.chats().await.get(index).map(|c| c.id)
}

async fn print_current(store: &ChatStore) {
    match store.current_chat().await {
        Some(chat) => println!("current chat: {}", chat.title),
        None => println!("no chats yet, type a message to start one"),
    }
}
