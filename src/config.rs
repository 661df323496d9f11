//! Configuration management module
//!
//! `EngineConfig` gathers the policy structs of every crate. Values resolve
//! in three layers: built-in defaults, a YAML file (`--config FILE` or
//! `<config_dir>/listing-pilot/config.yaml`), then `LISTING_PILOT_*`
//! environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use action_flow::RetryPolicy;
use action_primitives::{CommitTempo, PollSpec};
use listing_model::PricingRule;
use perceiver_surface::DetectorConfig;
use serde::{Deserialize, Serialize};
use surface_lock::LockConfig;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;
use variation_axes::ResolverConfig;
use variation_builder::BuilderConfig;

use crate::errors::{EngineError, Result};

pub const APP_DIR: &str = "listing-pilot";
pub const ENV_PREFIX: &str = "LISTING_PILOT_";

/// Remote draft API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `None` disables the structured-write fallback.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 15_000,
        }
    }
}

/// Visible labels the engine clicks outside the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLabels {
    /// Opens the variation builder from the plain form.
    pub open_builder: Vec<String>,
    /// Commits an edit on an existing listing.
    pub save_changes: Vec<String>,
    pub end_listing: Vec<String>,
    pub confirm_end: Vec<String>,
    pub list_similar: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for PageLabels {
    fn default() -> Self {
        Self {
            open_builder: strings(&["Create variations", "Add variations", "Edit variations", "Manage variations"]),
            save_changes: strings(&["Save changes", "Save", "Update", "Revise"]),
            end_listing: strings(&["End listing", "End item", "End your listing"]),
            confirm_end: strings(&["End listing", "Confirm", "Yes, end it"]),
            list_similar: strings(&["Sell similar", "List similar", "Relist"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Time budget for one fill or revise run.
    pub run_budget_ms: u64,
    /// Separate budget for the final submit, which runs even after the
    /// fill budget is spent.
    pub submit_budget_ms: u64,
    /// Settle delays of the value commit sequence.
    pub tempo: CommitTempo,
    /// Bounded wait for a control to render.
    pub locate_poll: PollSpec,
    /// Per-strategy retry inside a field's fallback chain.
    pub retry: RetryPolicy,
    pub lock: LockConfig,
    pub detector: DetectorConfig,
    pub resolver: ResolverConfig,
    pub builder: BuilderConfig,
    pub pricing: PricingRule,
    /// Diagnostics log entries kept per scope.
    pub log_capacity: usize,
    /// Independent timer around every bus request.
    pub bus_timeout_ms: u64,
    /// Wait for the `builder-done` flag after a delegated run.
    pub handoff_poll: PollSpec,
    pub remote: RemoteConfig,
    /// Directory of the file-backed store; defaults below the data dir.
    pub state_dir: Option<PathBuf>,
    pub labels: PageLabels,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_budget_ms: 300_000,
            submit_budget_ms: 60_000,
            tempo: CommitTempo::default(),
            locate_poll: PollSpec::new(200, 25),
            retry: RetryPolicy::default(),
            lock: LockConfig::default(),
            detector: DetectorConfig::default(),
            resolver: ResolverConfig::default(),
            builder: BuilderConfig::default(),
            pricing: PricingRule::default(),
            log_capacity: listing_state_center::DEFAULT_LOG_CAPACITY,
            bus_timeout_ms: 120_000,
            handoff_poll: PollSpec::new(250, 40),
            remote: RemoteConfig::default(),
            state_dir: None,
            labels: PageLabels::default(),
        }
    }
}

impl EngineConfig {
    /// No settle delays and single-probe waits; for captured pages that
    /// react synchronously.
    pub fn immediate() -> Self {
        Self {
            tempo: CommitTempo::immediate(),
            locate_poll: PollSpec::new(0, 2),
            retry: RetryPolicy::new(2, 0, 0),
            lock: LockConfig {
                confirm_delay_ms: 0,
                ..LockConfig::default()
            },
            builder: BuilderConfig::immediate(),
            bus_timeout_ms: 5_000,
            handoff_poll: PollSpec::new(0, 3),
            ..Self::default()
        }
    }

    /// Keeps every policy but takes the timing of [`EngineConfig::immediate`].
    pub fn with_immediate_timing(self) -> Self {
        let fast = Self::immediate();
        Self {
            tempo: fast.tempo,
            locate_poll: fast.locate_poll,
            retry: fast.retry,
            lock: LockConfig {
                confirm_delay_ms: fast.lock.confirm_delay_ms,
                ..self.lock
            },
            builder: BuilderConfig {
                labels: self.builder.labels,
                required_axes: self.builder.required_axes,
                ..fast.builder
            },
            handoff_poll: fast.handoff_poll,
            ..self
        }
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_millis(self.run_budget_ms)
    }

    pub fn submit_budget(&self) -> Duration {
        Duration::from_millis(self.submit_budget_ms)
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_timeout_ms)
    }

    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
    }

    /// Store directory: configured, else `<data_dir>/listing-pilot/state`.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR).join("state"))
            .ok_or_else(|| EngineError::config("no data directory on this platform"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(raw).map_err(|err| EngineError::config(format!("invalid config yaml: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` (or the default location), then applies environment
    /// overrides. A missing default file falls back to defaults; a missing
    /// explicit file is an error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(&path)
                    .await
                    .map_err(|err| EngineError::config(format!("failed to read {}: {err}", path.display())))?;
                let config = Self::from_yaml(&raw)?;
                info!("Loaded configuration from: {}", path.display());
                config
            }
            Some(path) if explicit => {
                return Err(EngineError::config(format!("config file {} not found", path.display())));
            }
            Some(path) => {
                debug!("Config file not found, using defaults: {}", path.display());
                Self::default()
            }
            None => {
                warn!("No config directory available, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `LISTING_PILOT_*` values from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty());

        if let Some(dir) = var("STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = var("REMOTE_URL") {
            self.remote.base_url = Some(url);
        }
        if let Some(value) = var("REMOTE_TIMEOUT_MS") {
            self.remote.timeout_ms = parse_number("REMOTE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("RUN_BUDGET_MS") {
            self.run_budget_ms = parse_number("RUN_BUDGET_MS", &value)?;
        }
        if let Some(value) = var("BUS_TIMEOUT_MS") {
            self.bus_timeout_ms = parse_number("BUS_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("LOCK_TTL_MS") {
            self.lock.shared_ttl_ms = parse_number("LOCK_TTL_MS", &value)?;
        }
        if let Some(value) = var("LOG_CAPACITY") {
            self.log_capacity = parse_number("LOG_CAPACITY", &value)?;
        }
        if let Some(value) = var("PRICE_MULTIPLIER") {
            self.pricing.multiplier = parse_number("PRICE_MULTIPLIER", &value)?;
        }
        if let Some(value) = var("PRICE_ADDEND") {
            self.pricing.addend = parse_number("PRICE_ADDEND", &value)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.run_budget_ms == 0 || self.submit_budget_ms == 0 {
            return Err(EngineError::config("run_budget_ms and submit_budget_ms must be positive"));
        }
        if self.log_capacity == 0 {
            return Err(EngineError::config("log_capacity must be positive"));
        }
        if self.lock.local_ttl_ms == 0 || self.lock.shared_ttl_ms == 0 {
            return Err(EngineError::config("lock ttls must be positive"));
        }
        if !self.pricing.multiplier.is_finite() || self.pricing.multiplier <= 0.0 {
            return Err(EngineError::config("pricing.multiplier must be a positive number"));
        }
        if !self.pricing.addend.is_finite() {
            return Err(EngineError::config("pricing.addend must be a number"));
        }
        if self.resolver.max_axes == 0 {
            return Err(EngineError::config("resolver.max_axes must be at least 1"));
        }
        if let Some(base) = &self.remote.base_url {
            Url::parse(base).map_err(|err| EngineError::config(format!("remote.base_url {base:?}: {err}")))?;
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::config(format!("{ENV_PREFIX}{name}: {value:?} is not a valid number")))
}
