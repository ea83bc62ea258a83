// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - NODE
//
// HTTP backend for the mini-app: claim ledger API, profile lookup proxy,
// webhook sink, manifest, health and metrics.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use toad_core::config::{NodeConfig, StorageBackend};
use toad_core::service::ClaimLedger;
use toad_core::store::{JsonFileStore, LedgerStore};
use toad_core::{Clock, SystemClock};

pub mod api;
pub mod db;
pub mod manifest;
pub mod metrics;
pub mod profile;
pub mod rate_limiter;

use metrics::ToadMetrics;
use profile::ProfileResolver;

/// Safe mutex lock that recovers from poisoned state instead of panicking.
pub(crate) fn safe_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Everything the route handlers share.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ClaimLedger>,
    pub profiles: Arc<ProfileResolver>,
    pub metrics: Arc<ToadMetrics>,
    pub manifest: Arc<serde_json::Value>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        config: &NodeConfig,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, String> {
        let ledger = ClaimLedger::new(store, clock)
            .with_policies(config.streak_policy, config.amount_policy);
        let metrics = ToadMetrics::new().map_err(|e| format!("Failed to create metrics: {}", e))?;
        Ok(Self {
            ledger: Arc::new(ledger),
            profiles: Arc::new(ProfileResolver::new(&config.profile)?),
            metrics,
            manifest: Arc::new(manifest::build_manifest(&config.manifest)),
            started: Instant::now(),
        })
    }

    /// Production wiring: configured storage backend and the wall clock.
    pub fn from_config(config: &NodeConfig) -> Result<Self, String> {
        Self::new(config, open_store(config)?, Arc::new(SystemClock))
    }
}

/// Open the ledger store selected by `config.storage`.
pub fn open_store(config: &NodeConfig) -> Result<Arc<dyn LedgerStore>, String> {
    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        format!(
            "Failed to create data dir {}: {}",
            config.data_dir.display(),
            e
        )
    })?;
    let store: Arc<dyn LedgerStore> = match config.storage {
        StorageBackend::Json => Arc::new(JsonFileStore::new(config.ledger_path())),
        StorageBackend::Sled => Arc::new(db::SledStore::open(config.sled_path())?),
    };
    // Fail at startup, not on the first claim, if the ledger is unreadable
    store.load()?;
    Ok(store)
}
