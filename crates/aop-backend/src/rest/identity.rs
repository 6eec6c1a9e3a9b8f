//! [`IdentityProvider`] over the `/auth/v1` API.

use aop_core::error::{AopError, AopResult};
use aop_core::models::identity::{AuthEvent, AuthSession, Credentials, Identity};
use aop_core::repository::IdentityProvider;
use chrono::{Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::RestBackend;

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Sign-up answers with a full token grant when e-mail confirmation is
/// disabled and with the bare user otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(Identity),
}

#[derive(serde::Serialize)]
struct EmailBody<'a> {
    email: &'a str,
}

#[derive(serde::Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Access tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 10;

fn needs_refresh(session: &AuthSession) -> bool {
    session.is_expired(Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS))
}

impl RestBackend {
    /// Exchange the held refresh token for a new credential.
    ///
    /// Grants are serialized. With `only_if_stale`, a caller that waited on
    /// another caller's grant takes the refreshed credential as-is.
    async fn refresh_grant(&self, only_if_stale: bool) -> AopResult<AuthSession> {
        let _grant = self.inner.refreshing.lock().await;
        let Some(held) = self.held_session() else {
            return Err(AopError::unauthorized("no session to refresh"));
        };
        if only_if_stale && !needs_refresh(&held) {
            return Ok(held);
        }

        let req = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshBody {
                refresh_token: &held.refresh_token,
            });
        let session = Self::send_json::<TokenResponse>(req).await?.into_session();
        self.set_session(session.clone(), None);
        self.emit(AuthEvent::TokenRefreshed);
        debug!(user_id = %session.user.id, "Refreshed credential");
        Ok(session)
    }

    /// The held credential, refreshed first when its access token is stale.
    /// A rejected refresh token drops the credential locally.
    async fn fresh_session(&self) -> AopResult<Option<AuthSession>> {
        let Some(held) = self.held_session() else {
            return Ok(None);
        };
        if !needs_refresh(&held) {
            return Ok(Some(held));
        }
        match self.refresh_grant(true).await {
            Ok(session) => Ok(Some(session)),
            Err(AopError::Unauthorized { reason }) => {
                info!(%reason, "Refresh token rejected; dropping credential");
                self.clear_session();
                self.emit(AuthEvent::SignedOut);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_user(&self) -> AopResult<Identity> {
        let req = self.request(Method::GET, "/auth/v1/user");
        Self::send_json::<Identity>(req).await.map_err(Into::into)
    }
}

impl IdentityProvider for RestBackend {
    async fn current_user(&self) -> AopResult<Option<Identity>> {
        if self.fresh_session().await?.is_none() {
            return Ok(None);
        }
        let reason = match self.fetch_user().await {
            Ok(user) => return Ok(Some(user)),
            Err(AopError::Unauthorized { reason }) => reason,
            Err(e) => return Err(e),
        };

        // The server can reject a token the local clock still considers
        // valid. One refresh, one retry.
        debug!(%reason, "Access token rejected; refreshing");
        match self.refresh_grant(false).await {
            Ok(_) => {}
            Err(AopError::Unauthorized { reason }) => {
                debug!(%reason, "Held credential rejected; treating as signed out");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        match self.fetch_user().await {
            Ok(user) => Ok(Some(user)),
            Err(AopError::Unauthorized { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn current_session(&self) -> AopResult<Option<AuthSession>> {
        self.fresh_session().await
    }

    async fn refresh_session(&self) -> AopResult<AuthSession> {
        self.refresh_grant(false).await
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
        persist: bool,
    ) -> AopResult<AuthSession> {
        let req = self
            .request(Method::POST, "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(credentials);
        let session = Self::send_json::<TokenResponse>(req).await?.into_session();
        self.set_session(session.clone(), Some(persist));
        self.emit(AuthEvent::SignedIn);
        info!(user_id = %session.user.id, persist, "Signed in");
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> AopResult<Identity> {
        let req = self.request(Method::POST, "/auth/v1/signup").json(credentials);
        match Self::send_json::<SignUpResponse>(req).await? {
            SignUpResponse::Session(grant) => {
                let session = grant.into_session();
                let user = session.user.clone();
                self.set_session(session, Some(false));
                self.emit(AuthEvent::SignedIn);
                Ok(user)
            }
            SignUpResponse::User(user) => Ok(user),
        }
    }

    async fn sign_out(&self) -> AopResult<()> {
        let remote = if self.held_session().is_some() {
            Self::send_empty(self.request(Method::POST, "/auth/v1/logout")).await
        } else {
            Ok(())
        };

        // Local state goes regardless of what the server said.
        self.clear_session();
        self.emit(AuthEvent::SignedOut);

        match remote.map_err(AopError::from) {
            Ok(()) | Err(AopError::Unauthorized { .. }) | Err(AopError::NotFound { .. }) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Remote sign-out failed");
                Err(e)
            }
        }
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> AopResult<()> {
        let req = self
            .request(Method::POST, "/auth/v1/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&EmailBody { email });
        Self::send_empty(req).await.map_err(Into::into)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}
