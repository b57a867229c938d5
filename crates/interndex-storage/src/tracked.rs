use std::collections::BTreeMap;

use interndex_core::TrackStatus;
use tracing::warn;

use crate::kv::{KeyValueStore, StoreError};

pub const TRACKED_STATUS_KEY: &str = "tracked_jobs";

/// Listing id -> application progress, written through to a [`KeyValueStore`].
pub struct TrackedStatusStore {
    store: Box<dyn KeyValueStore>,
    entries: BTreeMap<String, TrackStatus>,
}

impl std::fmt::Debug for TrackedStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedStatusStore")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl TrackedStatusStore {
    /// Never fails: absent or malformed state starts an empty map.
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let entries = store
            .get(TRACKED_STATUS_KEY)
            .map(|text| decode_entries(&text))
            .unwrap_or_default();
        Self { store, entries }
    }

    pub fn get(&self, id: &str) -> Option<TrackStatus> {
        self.entries.get(id).copied()
    }

    pub fn entries(&self) -> &BTreeMap<String, TrackStatus> {
        &self.entries
    }

    /// `None` untracks `id`. The whole map is persisted before the change is kept.
    pub fn set(&mut self, id: &str, status: Option<TrackStatus>) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        match status {
            Some(status) => {
                next.insert(id.to_string(), status);
            }
            None => {
                next.remove(id);
            }
        }
        let encoded = serde_json::to_string(&next)?;
        self.store.set(TRACKED_STATUS_KEY, &encoded)?;
        self.entries = next;
        Ok(())
    }

    pub fn into_store(self) -> Box<dyn KeyValueStore> {
        self.store
    }
}

fn decode_entries(text: &str) -> BTreeMap<String, TrackStatus> {
    let raw = match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(text) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "discarding malformed tracked-status state");
            return BTreeMap::new();
        }
    };
    raw.into_iter()
        .filter_map(|(id, value)| {
            let status = value.as_str()?.parse::<TrackStatus>().ok()?;
            Some((id, status))
        })
        .collect()
}
