use crate::backend::{ChatBackend, RemoteBackend, SimulatedBackend};
use crate::simulator::ResponseSimulator;
use crate::storage::StorageManager;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

const MODE_VAR: &str = "STUDYCHAT_MODE";
const BASE_URL_VAR: &str = "STUDYCHAT_BASE_URL";
const DATA_DIR_VAR: &str = "STUDYCHAT_DATA_DIR";

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_DATA_DIR: &str = ".studychat";

/// Which backend the session runs against. Picked once at startup; there is
/// no mid-session switchover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendMode {
    /// Talk to the chat service at the given `/api` base URL.
    Remote { base_url: String },
    /// Simulate replies locally, persisting under the given directory.
    Simulated { data_dir: PathBuf },
}

impl BackendMode {
    /// Reads the mode from `STUDYCHAT_MODE` / `STUDYCHAT_BASE_URL` /
    /// `STUDYCHAT_DATA_DIR`, defaulting to local simulation.
    pub fn from_env() -> Result<Self> {
        let mode = std::env::var(MODE_VAR).unwrap_or_else(|_| "simulated".to_string());
        Self::parse(
            &mode,
            std::env::var(BASE_URL_VAR).ok().as_deref(),
            std::env::var(DATA_DIR_VAR).ok().as_deref(),
        )
    }

    fn parse(mode: &str, base_url: Option<&str>, data_dir: Option<&str>) -> Result<Self> {
        match mode.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote {
                base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
            }),
            "simulated" | "" => Ok(Self::Simulated {
                data_dir: PathBuf::from(data_dir.unwrap_or(DEFAULT_DATA_DIR)),
            }),
            other => anyhow::bail!(
                "Unsupported {} value '{}' (expected 'remote' or 'simulated')",
                MODE_VAR,
                other
            ),
        }
    }

    /// Builds the backend this mode describes.
    pub async fn build_backend(&self) -> Result<Arc<dyn ChatBackend>> {
        match self {
            Self::Remote { base_url } => {
                log::info!("Using remote chat backend at {}", base_url);
                Ok(Arc::new(RemoteBackend::new(base_url.clone())))
            }
            Self::Simulated { data_dir } => {
                log::info!("Using simulated chat backend in {}", data_dir.display());
                let storage = StorageManager::new(data_dir)
                    .await
                    .context("Failed to initialize chat storage")?;
                Ok(Arc::new(SimulatedBackend::new(
                    storage,
                    ResponseSimulator::new(),
                )))
            }
        }
    }
}
