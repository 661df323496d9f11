use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use action_primitives::snapshot::SnapshotDocument;
use draft_remote::HttpDraftApi;
use listing_state_center::{FileKvStore, InMemoryKvStore, KvStore};
use tokio::fs;
use tracing::debug;

use listing_pilot::{Engine, EngineConfig};

use super::output::OutputFormat;

pub struct CliContext {
    config: EngineConfig,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: EngineConfig, output: OutputFormat) -> Self {
        Self { config, output }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Configuration for one run; `immediate` drops settle delays.
    pub fn run_config(&self, immediate: bool) -> EngineConfig {
        if immediate {
            self.config.clone().with_immediate_timing()
        } else {
            self.config.clone()
        }
    }

    /// File-backed store under the state directory, or a throwaway one.
    pub async fn store(&self, ephemeral: bool) -> Result<Arc<dyn KvStore>> {
        if ephemeral {
            return Ok(InMemoryKvStore::new());
        }
        let dir = self.config.state_dir()?;
        debug!("Using state directory: {}", dir.display());
        let store = FileKvStore::open(&dir)
            .await
            .with_context(|| format!("Failed to open state directory {}", dir.display()))?;
        Ok(Arc::new(store))
    }

    pub fn engine(&self, config: EngineConfig, store: Arc<dyn KvStore>) -> Result<Engine> {
        let remote = config.remote.clone();
        let engine = Engine::new(config, store)?;
        Ok(match remote.base_url {
            Some(base) => {
                let api = HttpDraftApi::new(&base, Duration::from_millis(remote.timeout_ms))
                    .with_context(|| format!("Invalid remote draft url {base}"))?;
                engine.with_remote(Arc::new(api))
            }
            None => engine,
        })
    }
}

pub async fn read_page(path: &Path) -> Result<SnapshotDocument> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read page snapshot {}", path.display()))?;
    SnapshotDocument::from_json(&raw).with_context(|| format!("Invalid page snapshot {}", path.display()))
}
