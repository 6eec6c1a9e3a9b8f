//! Trait seams for the hosted backend.
//!
//! Every backend call is async and goes over the network in production.
//! Implementations are passed in explicitly; nothing in AOP reaches for a
//! global client.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AopResult;
use crate::models::{
    identity::{AuthEvent, AuthSession, Credentials, Identity},
    profile::{AdminProfile, CreateAdminProfile, CreateProfile, Profile},
    session::{CreateSession, Session},
};

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

pub trait IdentityProvider: Send + Sync + 'static {
    /// The currently authenticated user, `None` when signed out.
    fn current_user(&self) -> impl Future<Output = AopResult<Option<Identity>>> + Send;
    /// The low-level credential currently held, `None` when signed out.
    fn current_session(&self) -> impl Future<Output = AopResult<Option<AuthSession>>> + Send;
    /// Exchange the held refresh token for a fresh credential.
    fn refresh_session(&self) -> impl Future<Output = AopResult<AuthSession>> + Send;
    /// Password sign-in. `persist` keeps the credential across restarts.
    fn sign_in_with_password(
        &self,
        credentials: &Credentials,
        persist: bool,
    ) -> impl Future<Output = AopResult<AuthSession>> + Send;
    fn sign_up(&self, credentials: &Credentials) -> impl Future<Output = AopResult<Identity>> + Send;
    fn sign_out(&self) -> impl Future<Output = AopResult<()>> + Send;
    fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> impl Future<Output = AopResult<()>> + Send;
    /// Subscribe to auth state transitions.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub trait SessionStore: Send + Sync + 'static {
    /// Atomically create a session row server-side; returns its id.
    fn create(&self, input: CreateSession) -> impl Future<Output = AopResult<Uuid>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = AopResult<Session>> + Send;
    /// Newest row for `user_id` that is active and expires after `now`.
    fn latest_current(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = AopResult<Option<Session>>> + Send;
    /// Set `last_activity` on a single row.
    fn touch(&self, id: Uuid, at: DateTime<Utc>) -> impl Future<Output = AopResult<()>> + Send;
    /// Mark every active row of `user_id` inactive.
    fn deactivate_user_sessions(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = AopResult<()>> + Send;
    fn list_for_user(&self, user_id: Uuid) -> impl Future<Output = AopResult<Vec<Session>>> + Send;
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

pub trait ProfileStore: Send + Sync + 'static {
    fn profile_by_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = AopResult<Option<Profile>>> + Send;
    fn profile_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = AopResult<Option<Profile>>> + Send;
    fn create_profile(&self, input: CreateProfile)
    -> impl Future<Output = AopResult<Profile>> + Send;
    fn admin_profile_by_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = AopResult<Option<AdminProfile>>> + Send;
    fn admin_profile_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = AopResult<Option<AdminProfile>>> + Send;
    fn create_admin_profile(
        &self,
        input: CreateAdminProfile,
    ) -> impl Future<Output = AopResult<AdminProfile>> + Send;
}
