use thiserror::Error;

pub(crate) const TOKEN_KEY: &str = "clinic_manuals_token";
pub(crate) const LAST_MANUAL_KEY: &str = "clinic_manuals_last_manual";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum StorageError {
    #[error("local storage is not available")]
    Unavailable,

    #[error("storage rejected the operation: {0}")]
    Rejected(String),

    #[error("stored value could not be encoded: {0}")]
    Encode(String),
}

/// Minimal string key-value surface the draft store needs.
pub(crate) trait KeyValueStore: Clone + 'static {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// `window.localStorage`, looked up on every call so the handle can be shared freely.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LocalStorage;

impl LocalStorage {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or(StorageError::Unavailable)
    }
}

fn js_err(e: wasm_bindgen::JsValue) -> StorageError {
    StorageError::Rejected(e.as_string().unwrap_or_else(|| format!("{e:?}")))
}

impl KeyValueStore for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::storage()?.get_item(key).map_err(js_err)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::storage()?.set_item(key, value).map_err(js_err)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        Self::storage()?.remove_item(key).map_err(js_err)
    }
}

#[cfg(test)]
pub(crate) use memory::MemoryStore;
