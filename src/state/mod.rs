pub(crate) mod manual_sync;

use crate::api::ApiClient;
use crate::state::manual_sync::SyncPacing;
use crate::storage::{KeyValueStore, LocalStorage, LAST_MANUAL_KEY};
use leptos::logging::warn;
use leptos::prelude::*;

#[derive(Clone, Copy)]
pub(crate) struct AppState {
    pub api_client: RwSignal<ApiClient>,

    /// Manual most recently opened in the builder, for the landing page shortcut.
    pub last_manual_id: RwSignal<Option<String>>,

    /// Delays the save walk leaves between requests.
    pub pacing: SyncPacing,
}

impl AppState {
    pub fn new() -> Self {
        let stored_client = ApiClient::load_from_storage();
        let last_manual_id = LocalStorage
            .get_item(LAST_MANUAL_KEY)
            .ok()
            .flatten()
            .filter(|id| !id.trim().is_empty());

        Self {
            api_client: RwSignal::new(stored_client),
            last_manual_id: RwSignal::new(last_manual_id),
            pacing: SyncPacing::default(),
        }
    }

    pub fn remember_manual(&self, manual_id: &str) {
        if self.last_manual_id.get_untracked().as_deref() == Some(manual_id) {
            return;
        }
        self.last_manual_id.set(Some(manual_id.to_string()));
        if let Err(e) = LocalStorage.set_item(LAST_MANUAL_KEY, manual_id) {
            warn!("could not remember manual {manual_id}: {e}");
        }
    }

    pub fn sign_out(&self) {
        self.api_client.update(|c| c.logout());
        self.last_manual_id.set(None);
        let _ = LocalStorage.remove_item(LAST_MANUAL_KEY);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
pub(crate) struct AppContext(pub AppState);
