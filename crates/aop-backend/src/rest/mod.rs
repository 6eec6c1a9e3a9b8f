//! HTTP implementation of the backend traits.
//!
//! Speaks the hosted service's GoTrue-style auth API under `/auth/v1` and
//! its PostgREST-style table API under `/rest/v1`.

mod identity;
mod profile;
mod session;

use std::sync::{Arc, Mutex, MutexGuard};

use aop_core::models::identity::{AuthEvent, AuthSession};
use reqwest::{Method, RequestBuilder, header};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::storage::CredentialStorage;

const AUTH_EVENT_CAPACITY: usize = 16;

/// Credential held by the client and whether it is persisted to storage.
#[derive(Default)]
struct CredentialState {
    session: Option<AuthSession>,
    persisted: bool,
}

struct Inner {
    http: reqwest::Client,
    config: BackendConfig,
    storage: CredentialStorage,
    credential: Mutex<CredentialState>,
    /// Held while exchanging the refresh token, so concurrent callers reuse
    /// one grant instead of racing on a rotating token.
    refreshing: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

/// Client for the hosted backend. Cheap to clone; clones share the
/// credential and the event channel.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<Inner>,
}

impl RestBackend {
    /// Build a client from `config`, restoring any persisted credential.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let storage = CredentialStorage::open(
            config.storage_path.clone(),
            config.storage_key_prefix.clone(),
        );
        Self::with_storage(config, storage)
    }

    pub fn with_storage(
        config: BackendConfig,
        storage: CredentialStorage,
    ) -> Result<Self, BackendError> {
        if config.anon_key.is_empty() {
            return Err(BackendError::Config("anon key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let restored = storage.load_session();
        if let Some(session) = &restored {
            debug!(user_id = %session.user.id, "Restored persisted credential");
        }
        let persisted = restored.is_some();
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        info!(url = %config.url, "Created backend client");

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                storage,
                credential: Mutex::new(CredentialState {
                    session: restored,
                    persisted,
                }),
                refreshing: tokio::sync::Mutex::new(()),
                events,
            }),
        })
    }

    pub fn storage(&self) -> &CredentialStorage {
        &self.inner.storage
    }

    /// Clear local auth artifacts whenever this client signs out.
    pub fn spawn_storage_listener(&self) -> JoinHandle<()> {
        self.inner
            .storage
            .spawn_sign_out_listener(self.inner.events.subscribe())
    }

    fn credential(&self) -> MutexGuard<'_, CredentialState> {
        self.inner
            .credential
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn held_session(&self) -> Option<AuthSession> {
        self.credential().session.clone()
    }

    /// Replace the held credential; `persist` of `None` keeps the current mode.
    fn set_session(&self, session: AuthSession, persist: Option<bool>) {
        let mut state = self.credential();
        if let Some(persist) = persist {
            state.persisted = persist;
        }
        if state.persisted {
            self.inner.storage.store_session(&session);
        } else {
            self.inner.storage.remove_item(&self.inner.storage.token_key());
        }
        state.session = Some(session);
    }

    fn clear_session(&self) {
        let mut state = self.credential();
        state.session = None;
        state.persisted = false;
        self.inner.storage.remove_item(&self.inner.storage.token_key());
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Request with `apikey` and a bearer of the user's access token, or of
    /// the anon key when signed out.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self
            .held_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.inner.config.anon_key.clone());
        let url = self.inner.config.endpoint(path);
        debug!(%method, %url, "Backend request");
        self.inner
            .http
            .request(method, url)
            .header("apikey", &self.inner.config.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
    }

    async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, BackendError> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::from_body(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(req: RequestBuilder) -> Result<(), BackendError> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_body(status, &body));
        }
        Ok(())
    }
}
