// Declare the modules
pub mod backend;
pub mod config;
pub mod models;
pub mod simulator;
pub mod storage;
pub mod store;

pub use backend::{ChatBackend, RemoteBackend, SimulatedBackend};
pub use config::BackendMode;
pub use models::{Chat, Message, Role};
pub use simulator::ResponseSimulator;
pub use storage::StorageManager;
pub use store::{ChatStore, SEND_ERROR_NOTICE};
