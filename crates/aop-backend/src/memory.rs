//! In-process backend for tests and offline runs.
//!
//! Implements every backend trait over shared in-memory tables. Faults and
//! latency can be injected to exercise failure paths.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use aop_core::error::{AopError, AopResult};
use aop_core::models::identity::{AuthEvent, AuthSession, Credentials, Identity};
use aop_core::models::profile::{
    AdminProfile, CreateAdminProfile, CreateProfile, Profile, UserRole,
};
use aop_core::models::session::{CreateSession, Session};
use aop_core::repository::{IdentityProvider, ProfileStore, SessionStore};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

const ACCESS_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Failures to inject. Every flag makes the matching calls fail with a
/// transport error.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub refresh: bool,
    pub create_session: bool,
    pub query_sessions: bool,
    pub touch: bool,
    pub deactivate: bool,
    pub sign_out: bool,
    pub profiles: bool,
    /// Delay applied before every call.
    pub latency: Option<StdDuration>,
}

struct Account {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    current: Option<AuthSession>,
    sessions: Vec<Session>,
    profiles: Vec<Profile>,
    admin_profiles: Vec<AdminProfile>,
    faults: Faults,
    reset_requests: Vec<(String, String)>,
    next_identifier: u32,
}

/// Shared in-memory backend. Clones see the same tables.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state().faults = faults;
    }

    async fn enter(&self, fault: impl Fn(&Faults) -> bool, what: &str) -> AopResult<()> {
        let (latency, failed) = {
            let state = self.state();
            (state.faults.latency, fault(&state.faults))
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if failed {
            return Err(AopError::Transport(format!("injected failure: {what}")));
        }
        Ok(())
    }

    // -- seeding ------------------------------------------------------------

    /// Register an account directly, bypassing sign-up.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        self.state().accounts.push(Account {
            identity: identity.clone(),
            password: password.to_string(),
        });
        identity
    }

    /// Remove an account; its credential stops resolving to a user.
    pub fn delete_account(&self, user_id: Uuid) {
        let mut state = self.state();
        state.accounts.retain(|a| a.identity.id != user_id);
        drop(state);
        self.emit(AuthEvent::UserDeleted);
    }

    /// Hold a fresh credential for `identity`, as after a password sign-in.
    pub fn sign_in_as(&self, identity: &Identity) -> AuthSession {
        let session = issue(identity.clone());
        self.state().current = Some(session.clone());
        session
    }

    pub fn add_profile(&self, user_id: Uuid, full_name: &str, role: UserRole) -> Profile {
        let mut state = self.state();
        let profile = new_profile(&mut state, user_id, full_name, role, None);
        state.profiles.push(profile.clone());
        profile
    }

    pub fn add_admin_profile(&self, user_id: Uuid, full_name: &str, email: &str) -> AdminProfile {
        let mut state = self.state();
        let profile = new_admin_profile(&mut state, user_id, full_name, email);
        state.admin_profiles.push(profile.clone());
        profile
    }

    /// Insert a session row as-is.
    pub fn insert_session(&self, session: Session) {
        self.state().sessions.push(session);
    }

    /// Snapshot of every session row.
    pub fn sessions(&self) -> Vec<Session> {
        self.state().sessions.clone()
    }

    pub fn held_credential(&self) -> Option<AuthSession> {
        self.state().current.clone()
    }

    /// `(email, redirect_to)` of every password-reset request.
    pub fn reset_requests(&self) -> Vec<(String, String)> {
        self.state().reset_requests.clone()
    }
}

fn issue(user: Identity) -> AuthSession {
    AuthSession {
        access_token: Uuid::new_v4().simple().to_string(),
        refresh_token: Uuid::new_v4().simple().to_string(),
        expires_at: Utc::now() + Duration::seconds(ACCESS_TOKEN_LIFETIME_SECS),
        user,
    }
}

fn next_identifier(state: &mut State, prefix: &str) -> String {
    state.next_identifier += 1;
    format!("{prefix}-{:05}", state.next_identifier)
}

fn new_profile(
    state: &mut State,
    user_id: Uuid,
    full_name: &str,
    role: UserRole,
    email: Option<String>,
) -> Profile {
    let now = Utc::now();
    let prefix = match role {
        UserRole::Client => "CL",
        UserRole::Writer => "WR",
    };
    Profile {
        id: Uuid::new_v4(),
        user_id,
        full_name: full_name.to_string(),
        role,
        identifier: next_identifier(state, prefix),
        email,
        created_at: now,
        updated_at: now,
    }
}

fn new_admin_profile(
    state: &mut State,
    user_id: Uuid,
    full_name: &str,
    email: &str,
) -> AdminProfile {
    let now = Utc::now();
    AdminProfile {
        id: Uuid::new_v4(),
        user_id,
        full_name: full_name.to_string(),
        identifier: next_identifier(state, "AD"),
        email: Some(email.to_string()),
        created_at: now,
        updated_at: now,
    }
}

impl IdentityProvider for MemoryBackend {
    async fn current_user(&self) -> AopResult<Option<Identity>> {
        self.enter(|_| false, "current_user").await?;
        let state = self.state();
        let Some(current) = &state.current else {
            return Ok(None);
        };
        let exists = state
            .accounts
            .iter()
            .any(|a| a.identity.id == current.user.id);
        Ok(exists.then(|| current.user.clone()))
    }

    async fn current_session(&self) -> AopResult<Option<AuthSession>> {
        self.enter(|_| false, "current_session").await?;
        Ok(self.state().current.clone())
    }

    async fn refresh_session(&self) -> AopResult<AuthSession> {
        self.enter(|f| f.refresh, "refresh_session").await?;
        let refreshed = {
            let mut state = self.state();
            let Some(current) = state.current.take() else {
                return Err(AopError::unauthorized("no session to refresh"));
            };
            let refreshed = issue(current.user);
            state.current = Some(refreshed.clone());
            refreshed
        };
        self.emit(AuthEvent::TokenRefreshed);
        Ok(refreshed)
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
        _persist: bool,
    ) -> AopResult<AuthSession> {
        self.enter(|_| false, "sign_in").await?;
        let session = {
            let mut state = self.state();
            let identity = state
                .accounts
                .iter()
                .find(|a| {
                    a.identity.email.as_deref() == Some(credentials.email.as_str())
                        && a.password == credentials.password
                })
                .map(|a| a.identity.clone())
                .ok_or_else(|| AopError::unauthorized("Invalid login credentials"))?;
            let session = issue(identity);
            state.current = Some(session.clone());
            session
        };
        self.emit(AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> AopResult<Identity> {
        self.enter(|_| false, "sign_up").await?;
        let identity = {
            let mut state = self.state();
            if state
                .accounts
                .iter()
                .any(|a| a.identity.email.as_deref() == Some(credentials.email.as_str()))
            {
                return Err(AopError::Conflict {
                    entity: "User already registered".into(),
                });
            }
            let identity = Identity {
                id: Uuid::new_v4(),
                email: Some(credentials.email.clone()),
            };
            state.accounts.push(Account {
                identity: identity.clone(),
                password: credentials.password.clone(),
            });
            state.current = Some(issue(identity.clone()));
            identity
        };
        self.emit(AuthEvent::SignedIn);
        Ok(identity)
    }

    async fn sign_out(&self) -> AopResult<()> {
        let remote = self.enter(|f| f.sign_out, "sign_out").await;
        self.state().current = None;
        self.emit(AuthEvent::SignedOut);
        remote
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> AopResult<()> {
        self.enter(|_| false, "reset_password").await?;
        self.state()
            .reset_requests
            .push((email.to_string(), redirect_to.to_string()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl SessionStore for MemoryBackend {
    async fn create(&self, input: CreateSession) -> AopResult<Uuid> {
        self.enter(|f| f.create_session, "safe_create_session").await?;
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.state().sessions.push(Session {
            id,
            user_id: input.user_id,
            created_at: now,
            last_activity: now,
            expires_at: now
                .checked_add_signed(input.expires_in)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            is_active: true,
            device_info: Some(input.device_info),
            ip_address: None,
            metadata: None,
        });
        Ok(id)
    }

    async fn get_by_id(&self, id: Uuid) -> AopResult<Session> {
        self.enter(|f| f.query_sessions, "get_session").await?;
        self.state()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| AopError::not_found("session", id))
    }

    async fn latest_current(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AopResult<Option<Session>> {
        self.enter(|f| f.query_sessions, "latest_current").await?;
        Ok(self
            .state()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_current(now))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> AopResult<()> {
        self.enter(|f| f.touch, "touch").await?;
        if let Some(row) = self.state().sessions.iter_mut().find(|s| s.id == id) {
            row.last_activity = at;
        }
        Ok(())
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> AopResult<()> {
        self.enter(|f| f.deactivate, "deactivate").await?;
        self.state()
            .sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
            .for_each(|s| s.is_active = false);
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AopResult<Vec<Session>> {
        self.enter(|f| f.query_sessions, "list_sessions").await?;
        let mut rows: Vec<Session> = self
            .state()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

impl ProfileStore for MemoryBackend {
    async fn profile_by_user(&self, user_id: Uuid) -> AopResult<Option<Profile>> {
        self.enter(|f| f.profiles, "profiles").await?;
        Ok(self
            .state()
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn profile_by_email(&self, email: &str) -> AopResult<Option<Profile>> {
        self.enter(|f| f.profiles, "profiles").await?;
        Ok(self
            .state()
            .profiles
            .iter()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_profile(&self, input: CreateProfile) -> AopResult<Profile> {
        self.enter(|f| f.profiles, "profiles").await?;
        let mut state = self.state();
        if state.profiles.iter().any(|p| p.user_id == input.user_id) {
            return Err(AopError::Conflict {
                entity: "profiles".into(),
            });
        }
        let profile = new_profile(
            &mut state,
            input.user_id,
            &input.full_name,
            input.role,
            input.email,
        );
        state.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn admin_profile_by_user(&self, user_id: Uuid) -> AopResult<Option<AdminProfile>> {
        self.enter(|f| f.profiles, "admin_profiles").await?;
        Ok(self
            .state()
            .admin_profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn admin_profile_by_email(&self, email: &str) -> AopResult<Option<AdminProfile>> {
        self.enter(|f| f.profiles, "admin_profiles").await?;
        Ok(self
            .state()
            .admin_profiles
            .iter()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn create_admin_profile(&self, input: CreateAdminProfile) -> AopResult<AdminProfile> {
        self.enter(|f| f.profiles, "admin_profiles").await?;
        let mut state = self.state();
        if state.admin_profiles.iter().any(|p| p.user_id == input.user_id) {
            return Err(AopError::Conflict {
                entity: "admin_profiles".into(),
            });
        }
        let profile = new_admin_profile(&mut state, input.user_id, &input.full_name, &input.email);
        state.admin_profiles.push(profile.clone());
        Ok(profile)
    }
}
