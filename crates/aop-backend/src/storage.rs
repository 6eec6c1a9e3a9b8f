//! Local persistence of auth artifacts.
//!
//! A flat JSON key/value file. Reads and writes never fail outward: a
//! corrupt or unreadable file reads as empty and write failures are logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use aop_core::models::identity::{AuthEvent, AuthSession};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::BackendError;

struct StorageInner {
    path: Option<PathBuf>,
    entries: BTreeMap<String, serde_json::Value>,
}

/// Key/value store for persisted credentials.
#[derive(Clone)]
pub struct CredentialStorage {
    prefix: String,
    inner: Arc<Mutex<StorageInner>>,
}

impl CredentialStorage {
    /// Open the store at `path`, or an in-memory store when `None`.
    pub fn open(path: Option<PathBuf>, prefix: impl Into<String>) -> Self {
        let entries = path.as_deref().map(load_entries).unwrap_or_default();
        Self {
            prefix: prefix.into(),
            inner: Arc::new(Mutex::new(StorageInner { path, entries })),
        }
    }

    pub fn in_memory(prefix: impl Into<String>) -> Self {
        Self::open(None, prefix)
    }

    /// Key under which the provider credential is persisted.
    pub fn token_key(&self) -> String {
        format!("{}.auth.token", self.prefix)
    }

    pub fn get_item(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().entries.get(key).cloned()
    }

    pub fn set_item(&self, key: &str, value: serde_json::Value) {
        let mut inner = self.lock();
        inner.entries.insert(key.to_string(), value);
        if let Err(e) = flush(&inner) {
            error!(key, error = %e, "Error storing auth state");
        }
    }

    pub fn remove_item(&self, key: &str) {
        let mut inner = self.lock();
        if inner.entries.remove(key).is_some() {
            if let Err(e) = flush(&inner) {
                error!(key, error = %e, "Error removing auth state");
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn load_session(&self) -> Option<AuthSession> {
        let value = self.get_item(&self.token_key())?;
        match serde_json::from_value(value) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable stored credential");
                None
            }
        }
    }

    pub fn store_session(&self, session: &AuthSession) {
        match serde_json::to_value(session) {
            Ok(value) => self.set_item(&self.token_key(), value),
            Err(e) => error!(error = %e, "Error serializing auth state"),
        }
    }

    /// Remove every `<prefix>.auth.*` key.
    pub fn clear_auth(&self) {
        let auth_prefix = format!("{}.auth.", self.prefix);
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(&auth_prefix));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(removed, "Cleared local auth state");
            if let Err(e) = flush(&inner) {
                error!(error = %e, "Error removing auth state");
            }
        }
    }

    /// Clear local auth state whenever the provider reports a sign-out or a
    /// deleted user. The task ends when the provider is dropped.
    pub fn spawn_sign_out_listener(
        &self,
        mut events: broadcast::Receiver<AuthEvent>,
    ) -> JoinHandle<()> {
        let storage = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.clears_local_state() => storage.clear_auth(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event listener lagged; clearing local state");
                        storage.clear_auth();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, StorageInner> {
        // A panic while holding the lock cannot leave the map half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, serde_json::Value> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read credential storage");
            return BTreeMap::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Ignoring corrupt credential storage");
        BTreeMap::new()
    })
}

fn flush(inner: &StorageInner) -> Result<(), BackendError> {
    let Some(path) = inner.path.as_deref() else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BackendError::Storage(e.to_string()))?;
    }
    let raw = serde_json::to_string_pretty(&inner.entries)?;
    std::fs::write(path, raw).map_err(|e| BackendError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aop_core::models::identity::Identity;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn sample_session() -> AuthSession {
        AuthSession {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: Utc::now() + Duration::hours(1),
            user: Identity {
                id: Uuid::new_v4(),
                email: Some("alice@example.com".into()),
            },
        }
    }

    #[test]
    fn session_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.json");

        let storage = CredentialStorage::open(Some(path.clone()), "aop");
        let session = sample_session();
        storage.store_session(&session);

        let reopened = CredentialStorage::open(Some(path), "aop");
        let loaded = reopened.load_session().unwrap();
        assert_eq!(loaded.user, session.user);
        assert_eq!(loaded.refresh_token, "refresh");
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = CredentialStorage::open(Some(path), "aop");
        assert!(storage.keys().is_empty());
        assert!(storage.load_session().is_none());
    }

    #[test]
    fn clear_auth_only_touches_auth_keys() {
        let storage = CredentialStorage::in_memory("aop");
        storage.store_session(&sample_session());
        storage.set_item("aop.auth.code_verifier", serde_json::json!("v"));
        storage.set_item("aop.theme", serde_json::json!("dark"));

        storage.clear_auth();

        assert_eq!(storage.keys(), vec!["aop.theme".to_string()]);
    }

    #[tokio::test]
    async fn listener_clears_on_sign_out() {
        let storage = CredentialStorage::in_memory("aop");
        storage.store_session(&sample_session());
        let (tx, rx) = broadcast::channel(8);
        let handle = storage.spawn_sign_out_listener(rx);

        tx.send(AuthEvent::TokenRefreshed).unwrap();
        tx.send(AuthEvent::SignedOut).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(storage.load_session().is_none());
    }
}
