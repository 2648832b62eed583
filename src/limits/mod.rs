//! Endpoint limit discovery and caching
//!
//! # Overview
//!
//! [`LimitRegistry`] is the process-wide store of per-endpoint limit facts:
//! populated once per endpoint (by [`LimitProber`] or a manual insert),
//! read-only afterwards, re-populated only on an explicit reset. Concurrent
//! first-time lookups for one endpoint are single-flight: exactly one probe
//! call runs and every caller awaits its result.
//!
//! With a cache path configured, probed facts persist as JSON across
//! processes; a missing or corrupt cache file is ignored.

mod prober;
mod types;

pub use prober::LimitProber;
pub use types::EndpointLimits;

use crate::error::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Process-wide store of per-endpoint limits
pub struct LimitRegistry {
    cells: Mutex<HashMap<String, Arc<OnceCell<EndpointLimits>>>>,
    cache_path: Option<PathBuf>,
}

impl LimitRegistry {
    /// Create an empty in-memory registry
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            cache_path: None,
        }
    }

    /// Create a registry backed by a JSON cache file, seeding it with any
    /// limits the file already holds
    pub fn with_cache(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut cells = HashMap::new();
        for (endpoint, limits) in load_cache(&path) {
            cells.insert(endpoint, Arc::new(OnceCell::new_with(Some(limits))));
        }
        Self {
            cells: Mutex::new(cells),
            cache_path: Some(path),
        }
    }

    fn cell(&self, endpoint: &str) -> Arc<OnceCell<EndpointLimits>> {
        let mut cells = self.cells.lock().unwrap();
        cells
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the cached limits for an endpoint, probing on first use.
    /// Failed probes leave the entry unpopulated so a later call may retry.
    pub async fn get_or_probe(
        &self,
        endpoint: &str,
        prober: &LimitProber,
    ) -> Result<EndpointLimits> {
        let cell = self.cell(endpoint);
        if let Some(limits) = cell.get() {
            return Ok(limits.clone());
        }

        let limits = cell
            .get_or_try_init(|| prober.probe(endpoint))
            .await?
            .clone();
        self.save();
        Ok(limits)
    }

    /// Return the cached limits without probing
    pub fn get(&self, endpoint: &str) -> Option<EndpointLimits> {
        let cells = self.cells.lock().unwrap();
        cells.get(endpoint).and_then(|cell| cell.get().cloned())
    }

    /// Install limits manually, replacing any probed entry. This is the
    /// fallback when probing fails and the caller knows the endpoint.
    pub fn insert(&self, limits: EndpointLimits) {
        let mut cells = self.cells.lock().unwrap();
        cells.insert(
            limits.endpoint.clone(),
            Arc::new(OnceCell::new_with(Some(limits))),
        );
        drop(cells);
        self.save();
    }

    /// Forget one endpoint; the next lookup re-probes
    pub fn reset(&self, endpoint: &str) {
        self.cells.lock().unwrap().remove(endpoint);
        debug!(endpoint, "limit registry entry reset");
        self.save();
    }

    /// Forget every endpoint
    pub fn reset_all(&self) {
        self.cells.lock().unwrap().clear();
        self.save();
    }

    /// Snapshot of every populated entry
    pub fn snapshot(&self) -> HashMap<String, EndpointLimits> {
        let cells = self.cells.lock().unwrap();
        cells
            .iter()
            .filter_map(|(name, cell)| cell.get().map(|l| (name.clone(), l.clone())))
            .collect()
    }

    fn save(&self) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let snapshot = self.snapshot();
        match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => {
                if let Err(e) = std::fs::write(path, text) {
                    warn!(path = %path.display(), error = %e, "failed to write limits cache");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize limits cache"),
        }
    }
}

impl Default for LimitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LimitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitRegistry")
            .field("entries", &self.snapshot().len())
            .field("cache_path", &self.cache_path)
            .finish()
    }
}

fn load_cache(path: &Path) -> HashMap<String, EndpointLimits> {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt limits cache");
                HashMap::new()
            }
        },
        Err(_) => HashMap::new(),
    }
}
