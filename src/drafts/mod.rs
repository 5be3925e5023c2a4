mod manual;

pub(crate) use manual::{
    manual_draft_key, purge_manual_drafts, restore_tree, store_subsection_draft,
    subsection_draft_key, DraftSnapshot, SubsectionDraft,
};

use crate::storage::{KeyValueStore, LocalStorage, StorageError};
use crate::util::{BrowserScheduler, Debounced, Scheduler};
use leptos::logging::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Quiet period before a draft is mirrored to storage.
pub(crate) const DRAFT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Keyed JSON mirror of in-progress edits. A recovery cache only: every failure is
/// logged and swallowed so editing never breaks because storage did.
#[derive(Clone, Debug, Default)]
pub(crate) struct DraftStore<S: KeyValueStore = LocalStorage> {
    store: S,
}

impl<S: KeyValueStore> DraftStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.store.get_item(key) {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(v) => v,
                Err(e) => {
                    warn!("draft {key}: unreadable entry ignored: {e}");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                warn!("draft {key}: read failed: {e}");
                fallback
            }
        }
    }

    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_write(key, value) {
            warn!("draft {key}: write failed: {e}");
        }
    }

    /// Write a value derived from whatever is stored right now, not from a copy the
    /// caller read earlier.
    pub fn write_with<T, F>(&self, key: &str, fallback: T, f: F)
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let next = f(self.read(key, fallback));
        self.write(key, &next);
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove_item(key) {
            warn!("draft {key}: remove failed: {e}");
        }
    }

    fn try_write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value).map_err(|e| StorageError::Encode(e.to_string()))?;
        self.store.set_item(key, &json)
    }

    /// Debounced writer bound to one key.
    pub fn debounced<T, Sch>(&self, key: String, scheduler: Sch) -> Debounced<T, Sch>
    where
        T: Serialize + Send + 'static,
        S: Send + Sync,
        Sch: Scheduler,
    {
        let drafts = self.clone();
        Debounced::new(DRAFT_DEBOUNCE, scheduler, move |v: T| drafts.write(&key, &v))
    }
}

impl DraftStore<LocalStorage> {
    pub fn browser() -> Self {
        Self::new(LocalStorage)
    }

    pub fn browser_debounced<T>(&self, key: String) -> Debounced<T, BrowserScheduler>
    where
        T: Serialize + Send + 'static,
    {
        self.debounced(key, BrowserScheduler)
    }
}
