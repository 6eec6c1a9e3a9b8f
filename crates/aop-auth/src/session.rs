//! Session lifecycle against the hosted session table.
//!
//! Every operation is best-effort: failures are logged and fold into
//! `false`, `None` or a teardown. Nothing here retries.

use std::sync::Arc;

use aop_core::models::identity::Identity;
use aop_core::models::session::{CreateSession, Session};
use aop_core::repository::{IdentityProvider, SessionStore};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;

/// Keeps "may this identity proceed" consistent with the remote session
/// table, creating or refreshing rows when they are missing or stale.
///
/// Generic over the backend traits so tests can substitute an in-memory
/// backend. Clones share the backends.
pub struct SessionManager<I: IdentityProvider, S: SessionStore> {
    backends: Arc<Backends<I, S>>,
    config: SessionConfig,
}

struct Backends<I, S> {
    identity: I,
    sessions: S,
}

impl<I: IdentityProvider, S: SessionStore> Clone for SessionManager<I, S> {
    fn clone(&self) -> Self {
        Self {
            backends: Arc::clone(&self.backends),
            config: self.config.clone(),
        }
    }
}

impl<I: IdentityProvider, S: SessionStore> Backends<I, S> {
    /// The current identity; provider errors read as signed out.
    async fn current_user(&self) -> Option<Identity> {
        match self.identity.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Error fetching current user");
                None
            }
        }
    }

    async fn teardown(&self) {
        let Some(user) = self.current_user().await else {
            return;
        };

        if let Err(e) = self.sessions.deactivate_user_sessions(user.id).await {
            error!(user_id = %user.id, error = %e, "Error deactivating sessions");
        }
        if let Err(e) = self.identity.sign_out().await {
            error!(user_id = %user.id, error = %e, "Error signing out");
        }
        info!(user_id = %user.id, "Session ended");
    }
}

impl<I: IdentityProvider, S: SessionStore> SessionManager<I, S> {
    pub fn new(identity: I, sessions: S, config: SessionConfig) -> Self {
        Self {
            backends: Arc::new(Backends { identity, sessions }),
            config,
        }
    }

    pub fn identity(&self) -> &I {
        &self.backends.identity
    }

    pub fn store(&self) -> &S {
        &self.backends.sessions
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn current_user(&self) -> Option<Identity> {
        self.backends.current_user().await
    }

    /// Create a session row for the current identity and return it.
    ///
    /// An empty or missing `device_label` falls back to the configured
    /// default.
    pub async fn create_session(&self, device_label: Option<&str>) -> Option<Session> {
        let user = self.current_user().await?;
        let device_info = device_label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(self.config.default_device_label.as_str())
            .to_string();

        let id = match self
            .backends
            .sessions
            .create(CreateSession {
                user_id: user.id,
                device_info,
                expires_in: self.config.session_lifetime(),
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Error creating session");
                return None;
            }
        };

        match self.backends.sessions.get_by_id(id).await {
            Ok(session) => {
                info!(user_id = %user.id, session_id = %session.id, "Session created");
                Some(session)
            }
            Err(e) => {
                error!(session_id = %id, error = %e, "Error retrieving created session");
                None
            }
        }
    }

    /// Whether the current identity holds a current session row, creating
    /// one when none exists.
    pub async fn validate_session(&self) -> bool {
        let Some(user) = self.current_user().await else {
            self.end_session().await;
            return false;
        };

        let latest = match self.backends.sessions.latest_current(user.id, Utc::now()).await {
            Ok(latest) => latest,
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Error validating session");
                return false;
            }
        };

        let Some(session) = latest else {
            debug!(user_id = %user.id, "No current session; creating one");
            return self.create_session(None).await.is_some();
        };

        if let Err(e) = self.backends.sessions.touch(session.id, Utc::now()).await {
            warn!(session_id = %session.id, error = %e, "Error updating session activity");
        }
        true
    }

    /// Deactivate every active row of the current identity and sign out.
    /// Never fails; calling it while signed out is a no-op.
    ///
    /// The teardown runs as its own task and finishes even when the caller
    /// stops waiting, so rows are never left deactivated while the
    /// credential is still held.
    pub async fn end_session(&self) {
        let backends = Arc::clone(&self.backends);
        let teardown = tokio::spawn(async move { backends.teardown().await });
        if let Err(e) = teardown.await {
            error!(error = %e, "Session teardown task failed");
        }
    }

    /// Refresh the provider credential, then validate the session row.
    /// Any failure ends the session.
    pub async fn refresh_session(&self) -> bool {
        match self.backends.identity.current_session().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.end_session().await;
                return false;
            }
            Err(e) => {
                error!(error = %e, "Error fetching auth session");
                self.end_session().await;
                return false;
            }
        }

        if let Err(e) = self.backends.identity.refresh_session().await {
            error!(error = %e, "Error refreshing auth session");
            self.end_session().await;
            return false;
        }

        self.validate_session().await
    }

    /// Validate and refresh concurrently; true only if both succeed.
    ///
    /// Two checks racing for the same identity can each create a row.
    /// Only the newest is ever consulted, so the duplicate is harmless.
    pub async fn check(&self) -> bool {
        let (valid, refreshed) = tokio::join!(self.validate_session(), self.refresh_session());
        valid && refreshed
    }
}
