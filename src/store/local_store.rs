use moka::sync::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::models::{GuestIdentity, SyncError, UserSession};

const GUEST_KEY: &str = "guest";
const CREDENTIALS_KEY: &str = "credentials";

/// Per-user persisted state: guest identity, credential record and the
/// per-link document cache.
///
/// Values are JSON files under `dir`, fronted by an in-memory cache. A store
/// without a directory keeps everything in memory.
#[derive(Clone)]
pub struct LocalStore {
    dir: Option<PathBuf>,
    cache: Cache<String, String>,
}

impl LocalStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SyncError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            error!("Failed to create data directory {}: {}", dir.display(), e);
            SyncError::Store(format!("create {}: {}", dir.display(), e))
        })?;
        info!("Local store opened at {}", dir.display());
        Ok(Self { dir: Some(dir), cache: build_cache() })
    }

    pub fn in_memory() -> Self {
        Self { dir: None, cache: build_cache() }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let raw = match self.cache.get(key) {
            Some(raw) => Some(raw),
            None => self.read_file(key)?,
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        self.cache.insert(key.to_string(), raw.clone());
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let raw = serde_json::to_string(value)?;
        if let Some(path) = self.path_for(key) {
            std::fs::write(&path, &raw).map_err(|e| {
                error!("Failed to write {}: {}", path.display(), e);
                SyncError::Store(format!("write {}: {}", path.display(), e))
            })?;
        }
        self.cache.insert(key.to_string(), raw);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), SyncError> {
        self.cache.invalidate(key);
        if let Some(path) = self.path_for(key) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SyncError::Store(format!("remove {}: {}", path.display(), e))),
            }
        }
        Ok(())
    }

    /// Document text last seen for a session link
    pub fn cached_code(&self, link: &str) -> Option<String> {
        self.get(&code_key(link)).unwrap_or_else(|e| {
            error!("Failed to read cached document for {}: {}", link, e);
            None
        })
    }

    pub fn cache_code(&self, link: &str, code: &str) -> Result<(), SyncError> {
        debug!("Caching {} bytes of document text for {}", code.len(), link);
        self.put(&code_key(link), &code)
    }

    pub fn guest(&self) -> Option<GuestIdentity> {
        self.get(GUEST_KEY).unwrap_or_else(|e| {
            error!("Failed to read guest identity: {}", e);
            None
        })
    }

    pub fn save_guest(&self, guest: &GuestIdentity) -> Result<(), SyncError> {
        self.put(GUEST_KEY, guest)
    }

    pub fn credentials(&self) -> Option<UserSession> {
        self.get(CREDENTIALS_KEY).unwrap_or_else(|e| {
            error!("Failed to read credential record: {}", e);
            None
        })
    }

    pub fn save_credentials(&self, user: &UserSession) -> Result<(), SyncError> {
        self.put(CREDENTIALS_KEY, user)
    }

    pub fn clear_credentials(&self) -> Result<(), SyncError> {
        self.remove(CREDENTIALS_KEY)
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{}.json", key)))
    }

    fn read_file(&self, key: &str) -> Result<Option<String>, SyncError> {
        let Some(path) = self.path_for(key) else {
            return Ok(None);
        };
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Store(format!("read {}: {}", path.display(), e))),
        }
    }
}

fn build_cache() -> Cache<String, String> {
    Cache::builder().max_capacity(10_000).build()
}

/// Links are opaque tokens, so they are hex-encoded before becoming file names
fn code_key(link: &str) -> String {
    let mut key = String::from("code-");
    for b in link.as_bytes() {
        let _ = write!(key, "{:02x}", b);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn code_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.cache_code("ABC/../x", "x=2").unwrap();

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.cached_code("ABC/../x").as_deref(), Some("x=2"));
        assert_eq!(reopened.cached_code("other"), None);
    }

    #[test]
    fn credentials_can_be_cleared() {
        let store = LocalStore::in_memory();
        let user = UserSession { id: None, name: "Ada".into(), email: "ada@example.com".into(), token: None };
        store.save_credentials(&user).unwrap();
        assert_eq!(store.credentials(), Some(user));
        store.clear_credentials().unwrap();
        assert_eq!(store.credentials(), None);
    }

    #[test]
    fn guest_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let guest = GuestIdentity { name: "Grace".into(), email: None, joined_at: Utc::now() };
        store.save_guest(&guest).unwrap();
        assert_eq!(LocalStore::open(dir.path()).unwrap().guest(), Some(guest));
    }

    #[test]
    fn code_keys_are_file_safe() {
        assert_eq!(code_key("A/"), "code-412f");
    }
}
