//! # Sheet Cache Module
//!
//! Named sheet URLs kept in memory. The whole snapshot is replaced through
//! `ArcSwap` on every write, so readers always see a complete map and never a
//! half-updated one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::errors::SourceError;
use crate::sheet::{Sheet, SheetSource};

type Snapshot = HashMap<String, Arc<Sheet>>;

/// Ordered set of named sheets with fetch-on-miss and periodic refresh
pub struct SheetCache {
    label: &'static str,
    entries: Vec<(String, String)>,
    source: Arc<dyn SheetSource>,
    snapshot: ArcSwap<Snapshot>,
}

impl SheetCache {
    /// `entries` are `(name, url)` pairs; their order is the lookup order.
    pub fn new(
        label: &'static str,
        entries: Vec<(String, String)>,
        source: Arc<dyn SheetSource>,
    ) -> Self {
        Self {
            label,
            entries,
            source,
            snapshot: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Names in configured order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn url_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, url)| url.as_str())
    }

    /// Cached copy only, no network
    pub fn cached(&self, name: &str) -> Option<Arc<Sheet>> {
        self.snapshot.load().get(name).cloned()
    }

    /// Sheet by name. `Ok(None)` means no URL is registered under that name.
    pub async fn get(&self, name: &str) -> Result<Option<Arc<Sheet>>, SourceError> {
        let Some(url) = self.url_of(name) else {
            return Ok(None);
        };

        if let Some(sheet) = self.cached(name) {
            return Ok(Some(sheet));
        }

        debug!(cache = self.label, name = %name, "Cache miss, fetching sheet");
        let sheet = Arc::new(self.source.fetch(url).await?);
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.insert(name.to_string(), Arc::clone(&sheet));
            next
        });

        Ok(Some(sheet))
    }

    /// Re-fetch every entry. Failed entries keep their previous snapshot.
    /// Returns how many entries were refreshed.
    pub async fn refresh(&self) -> usize {
        let mut fresh = Vec::with_capacity(self.entries.len());
        for (name, url) in &self.entries {
            match self.source.fetch(url).await {
                Ok(sheet) => fresh.push((name.clone(), Arc::new(sheet))),
                Err(e) => {
                    warn!(
                        cache = self.label,
                        name = %name,
                        error = %e,
                        "Refresh failed, keeping previous snapshot"
                    );
                }
            }
        }

        let refreshed = fresh.len();
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            for (name, sheet) in &fresh {
                next.insert(name.clone(), Arc::clone(sheet));
            }
            next
        });

        info!(
            cache = self.label,
            refreshed,
            total = self.entries.len(),
            "Cache refresh completed"
        );
        refreshed
    }

    /// Refresh on a fixed period, first run one period from now
    pub fn spawn_refresh(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}
