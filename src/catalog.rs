//! Counter catalog.
//!
//! Discovers the performance counters offered by vCenter once per session and
//! decides which of them are sampled each cycle.

use ahash::AHashMap as HashMap;
use tracing::{debug, info};

use crate::vsphere::{ApiError, Counter, ManagementApi};

/// Counters of the current session, in discovery order.
///
/// Counter ids are session-scoped: a catalog must be rebuilt after every
/// re-login and never persisted.
#[derive(Debug, Clone, Default)]
pub struct CounterCatalog {
    counters: Vec<Counter>,
    by_name: HashMap<String, i32>,
}

impl CounterCatalog {
    /// Queries counter metadata up to `level` and builds the catalog.
    pub async fn discover<A>(api: &A, level: i32) -> Result<Self, ApiError>
    where
        A: ManagementApi + ?Sized,
    {
        let counters = api.query_counters(level).await?;
        let catalog = Self::from_counters(counters);
        info!("Discovered {} performance counters", catalog.len());
        Ok(catalog)
    }

    pub fn from_counters(counters: Vec<Counter>) -> Self {
        let mut by_name = HashMap::with_capacity(counters.len());
        let mut unique = Vec::with_capacity(counters.len());

        for counter in counters {
            let full_name = counter.full_name();
            if by_name.contains_key(&full_name) {
                debug!(
                    "Ignoring duplicate counter {} (id {})",
                    full_name, counter.key
                );
                continue;
            }
            info!("Counter {}: {}", full_name, counter.key);
            by_name.insert(full_name, counter.key);
            unique.push(counter);
        }

        Self {
            counters: unique,
            by_name,
        }
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn id_of(&self, full_name: &str) -> Option<i32> {
        self.by_name.get(full_name).copied()
    }

    /// Counter ids to sample. With a non-empty allow-list only the listed
    /// counters that exist are returned (in allow-list order); unknown names
    /// are dropped. Otherwise every counter is sampled.
    pub fn select(&self, allow_list: Option<&[String]>) -> Vec<i32> {
        match allow_list {
            Some(names) if !names.is_empty() => names
                .iter()
                .filter_map(|name| {
                    let id = self.id_of(name);
                    if id.is_none() {
                        debug!("Configured counter {} not offered by vCenter, skipping", name);
                    }
                    id
                })
                .collect(),
            _ => self.counters.iter().map(|c| c.key).collect(),
        }
    }
}
