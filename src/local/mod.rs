//! Browser-style local storage.
//!
//! The guest cart, the buy-now selection and the last session survive restarts here, in one
//! JSON blob under [`ROOT_KEY`]. The resolved delivery location is cached separately under
//! two plain keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use crate::domain::aggregates::{CartEntry, UserSession};

pub const ROOT_KEY: &str = "persist:root";
pub const LOCATION_NAME_KEY: &str = "locationName";
pub const ZIP_CODE_KEY: &str = "userZipCode";
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum LocalStorageError {
    #[error("local storage i/o failed at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("could not encode {key}: {source}")]
    Encode { key: String, source: serde_json::Error },
    #[error("local storage lock poisoned")]
    Poisoned,
}

/// String key/value storage with the semantics of `window.localStorage`.
pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStorageError>;
    fn remove_item(&self, key: &str) -> Result<(), LocalStorageError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        Ok(self.items.lock().map_err(|_| LocalStorageError::Poisoned)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        self.items.lock().map_err(|_| LocalStorageError::Poisoned)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), LocalStorageError> {
        self.items.lock().map_err(|_| LocalStorageError::Poisoned)?.remove(key);
        Ok(())
    }
}

/// Keeps all items in one JSON object file, replaced on every change.
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LocalStorageError> {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => HashMap::new(),
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "local storage file is unreadable, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(LocalStorageError::Io { path, source }),
        };
        Ok(Self { path, items: Mutex::new(items) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self, items: &HashMap<String, String>) -> Result<(), LocalStorageError> {
        let io = |source: std::io::Error| LocalStorageError::Io { path: self.path.clone(), source };
        let text = serde_json::to_string_pretty(items).map_err(|source| LocalStorageError::Encode { key: ROOT_KEY.to_string(), source })?;
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(io)?;
        let file_name = self.path.file_name().and_then(|s| s.to_str()).unwrap_or("local");
        let tmp = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));
        {
            let mut file = fs::File::create(&tmp).map_err(io)?;
            file.write_all(text.as_bytes()).map_err(io)?;
            file.sync_all().map_err(io)?;
        }
        fs::rename(&tmp, &self.path).map_err(io)
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        Ok(self.items.lock().map_err(|_| LocalStorageError::Poisoned)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        let mut items = self.items.lock().map_err(|_| LocalStorageError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        self.flush(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), LocalStorageError> {
        let mut items = self.items.lock().map_err(|_| LocalStorageError::Poisoned)?;
        if items.remove(key).is_some() { self.flush(&items)?; }
        Ok(())
    }
}

/// State tree rehydrated on startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub products: Vec<CartEntry>,
    #[serde(default)]
    pub user_info: Option<UserSession>,
    #[serde(default)]
    pub buy_now_product: Option<CartEntry>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self { version: STATE_VERSION, products: Vec::new(), user_info: None, buy_now_product: None }
    }
}

/// Loads the persisted tree. Unreadable or foreign-version state is discarded, not fatal.
pub fn load_state(storage: &dyn LocalStorage) -> Result<PersistedState, LocalStorageError> {
    let Some(raw) = storage.get_item(ROOT_KEY)? else { return Ok(PersistedState::default()) };
    match serde_json::from_str::<PersistedState>(&raw) {
        Ok(state) if state.version == STATE_VERSION => Ok(state),
        Ok(state) => {
            tracing::warn!(found = state.version, expected = STATE_VERSION, "discarding persisted state from another version");
            Ok(PersistedState::default())
        }
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable persisted state");
            Ok(PersistedState::default())
        }
    }
}

pub fn save_state(storage: &dyn LocalStorage, state: &PersistedState) -> Result<(), LocalStorageError> {
    let raw = serde_json::to_string(state).map_err(|source| LocalStorageError::Encode { key: ROOT_KEY.to_string(), source })?;
    storage.set_item(ROOT_KEY, &raw)
}

/// Last delivery location the visitor picked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocation {
    pub location_name: String,
    pub user_zip_code: String,
}

pub fn load_location(storage: &dyn LocalStorage) -> Result<Option<DeliveryLocation>, LocalStorageError> {
    let name = storage.get_item(LOCATION_NAME_KEY)?;
    let zip = storage.get_item(ZIP_CODE_KEY)?;
    Ok(name.zip(zip).map(|(location_name, user_zip_code)| DeliveryLocation { location_name, user_zip_code }))
}

pub fn save_location(storage: &dyn LocalStorage, location: &DeliveryLocation) -> Result<(), LocalStorageError> {
    storage.set_item(LOCATION_NAME_KEY, &location.location_name)?;
    storage.set_item(ZIP_CODE_KEY, &location.user_zip_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::tests::entry;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("storefront-local-{}-{name}", std::process::id())).join("local.json")
    }

    #[test]
    fn test_state_round_trips_through_storage() {
        let storage = MemoryStorage::new();
        let state = PersistedState { products: vec![entry("A", 10, 2)], ..PersistedState::default() };
        save_state(&storage, &state).unwrap();
        assert_eq!(load_state(&storage).unwrap(), state);
    }

    #[test]
    fn test_garbage_state_starts_empty() {
        let storage = MemoryStorage::new();
        storage.set_item(ROOT_KEY, "{not json").unwrap();
        assert_eq!(load_state(&storage).unwrap(), PersistedState::default());
        storage.set_item(ROOT_KEY, r#"{"version": 9, "products": []}"#).unwrap();
        assert_eq!(load_state(&storage).unwrap(), PersistedState::default());
    }

    #[test]
    fn test_location_needs_both_keys() {
        let storage = MemoryStorage::new();
        storage.set_item(LOCATION_NAME_KEY, "Pune").unwrap();
        assert_eq!(load_location(&storage).unwrap(), None);
        save_location(&storage, &DeliveryLocation { location_name: "Pune".into(), user_zip_code: "411001".into() }).unwrap();
        assert_eq!(load_location(&storage).unwrap().unwrap().user_zip_code, "411001");
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);
        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set_item("k", "v").unwrap();
            storage.set_item("gone", "x").unwrap();
            storage.remove_item("gone").unwrap();
        }
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("k").unwrap().as_deref(), Some("v"));
        assert_eq!(reopened.get_item("gone").unwrap(), None);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_truncated_file_starts_empty() {
        let path = temp_path("truncated");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"persist:root": "{\"version\":1,\"prod"#).unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get_item(ROOT_KEY).unwrap(), None);
        assert_eq!(load_state(&storage).unwrap(), PersistedState::default());

        storage.set_item("k", "v").unwrap();
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(leftovers, ["local.json"]);
        assert_eq!(FileStorage::open(&path).unwrap().get_item("k").unwrap().as_deref(), Some("v"));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
