//! Route guards for member (client/writer) and admin pages.
//!
//! A guard resolves once per mount: `Loading` until the session check and
//! profile lookup finish, then `Authorized` or `Unauthorized`. Nothing is
//! cached between mounts.

use std::sync::Arc;

use aop_core::models::profile::{AdminProfile, Profile, UserRole};
use aop_core::repository::{IdentityProvider, ProfileStore, SessionStore};
use aop_core::routes::{ADMIN_SIGN_IN, MEMBER_SIGN_IN, Redirect, RouteAccess, dashboard_route};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::session::SessionManager;

/// Which profile table a guard consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    /// `profiles`, restricted to one role.
    Member(UserRole),
    /// `admin_profiles`.
    Admin,
}

impl GuardKind {
    /// Guard protecting a route, `None` for public and unknown routes.
    pub fn for_route(access: RouteAccess) -> Option<Self> {
        match access {
            RouteAccess::Member(role) => Some(Self::Member(role)),
            RouteAccess::Admin => Some(Self::Admin),
            RouteAccess::Public | RouteAccess::Fallback => None,
        }
    }

    pub fn sign_in_route(self) -> &'static str {
        match self {
            Self::Member(_) => MEMBER_SIGN_IN,
            Self::Admin => ADMIN_SIGN_IN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizedProfile {
    Member(Profile),
    Admin(AdminProfile),
}

impl AuthorizedProfile {
    pub fn full_name(&self) -> &str {
        match self {
            Self::Member(p) => &p.full_name,
            Self::Admin(p) => &p.full_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardState {
    Loading,
    Authorized(AuthorizedProfile),
    Unauthorized,
}

/// What the page shows for a guard state.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardView {
    Loading,
    Render(AuthorizedProfile),
    Redirect(Redirect),
}

impl GuardState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    /// Map the state to a view for a guard of `kind` mounted at `location`.
    ///
    /// Denials go to the sign-in route carrying `location`; a member on
    /// another role's route goes to their own dashboard instead.
    pub fn view(&self, kind: GuardKind, location: &str) -> GuardView {
        match self {
            Self::Loading => GuardView::Loading,
            Self::Unauthorized => GuardView::Redirect(
                Redirect::to(kind.sign_in_route())
                    .from_location(location)
                    .replacing(),
            ),
            Self::Authorized(AuthorizedProfile::Member(profile)) => match kind {
                GuardKind::Member(required) if profile.role != required => {
                    GuardView::Redirect(Redirect::to(dashboard_route(profile.role)).replacing())
                }
                _ => GuardView::Render(AuthorizedProfile::Member(profile.clone())),
            },
            Self::Authorized(profile) => GuardView::Render(profile.clone()),
        }
    }
}

/// The check was abandoned before it resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("guard check cancelled")]
pub struct Cancelled;

/// Await `fut` unless `cancel` fires first; the future is dropped on cancel.
pub async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}

pub struct RouteGuard<I: IdentityProvider, S: SessionStore, P: ProfileStore> {
    sessions: SessionManager<I, S>,
    profiles: P,
    kind: GuardKind,
}

impl<I: IdentityProvider, S: SessionStore, P: ProfileStore> RouteGuard<I, S, P> {
    pub fn new(sessions: SessionManager<I, S>, profiles: P, kind: GuardKind) -> Self {
        Self {
            sessions,
            profiles,
            kind,
        }
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    /// Run the check to a terminal state, or `None` if `cancel` fired first.
    pub async fn check(&self, cancel: &CancellationToken) -> Option<GuardState> {
        match self.authorize(cancel).await {
            Ok(Some(profile)) => Some(GuardState::Authorized(profile)),
            Ok(None) => Some(GuardState::Unauthorized),
            Err(Cancelled) => {
                debug!(kind = ?self.kind, "Guard check cancelled");
                None
            }
        }
    }

    async fn authorize(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<AuthorizedProfile>, Cancelled> {
        if !cancellable(cancel, self.sessions.check()).await? {
            return Ok(None);
        }

        let user = match cancellable(cancel, self.sessions.identity().current_user()).await? {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "Error fetching current user");
                return Ok(None);
            }
        };

        match cancellable(cancel, self.fetch_profile(user.id)).await? {
            Ok(Some(profile)) => return Ok(Some(profile)),
            Ok(None) => error!(user_id = %user.id, kind = ?self.kind, "Profile not found"),
            Err(e) => error!(user_id = %user.id, error = %e, "Error fetching profile"),
        }

        cancellable(cancel, self.sessions.end_session()).await?;
        Ok(None)
    }

    async fn fetch_profile(
        &self,
        user_id: Uuid,
    ) -> aop_core::AopResult<Option<AuthorizedProfile>> {
        Ok(match self.kind {
            GuardKind::Member(_) => self
                .profiles
                .profile_by_user(user_id)
                .await?
                .map(AuthorizedProfile::Member),
            GuardKind::Admin => self
                .profiles
                .admin_profile_by_user(user_id)
                .await?
                .map(AuthorizedProfile::Admin),
        })
    }

    /// Start the check in the background. The returned handle observes the
    /// state and cancels the check when dropped.
    pub fn mount(self: Arc<Self>, location: impl Into<String>) -> GuardMount {
        let (tx, rx) = watch::channel(GuardState::Loading);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let kind = self.kind;
        tokio::spawn(async move {
            if let Some(state) = self.check(&token).await {
                // Receiver gone means unmounted; the result is discarded.
                let _ = tx.send(state);
            }
        });
        GuardMount {
            kind,
            location: location.into(),
            state: rx,
            cancel,
        }
    }
}

/// A guard mounted at one location.
pub struct GuardMount {
    kind: GuardKind,
    location: String,
    state: watch::Receiver<GuardState>,
    cancel: CancellationToken,
}

impl GuardMount {
    pub fn state(&self) -> GuardState {
        self.state.borrow().clone()
    }

    pub fn view(&self) -> GuardView {
        self.state.borrow().view(self.kind, &self.location)
    }

    /// Wait for the terminal state. Stays `Loading` if the check was
    /// cancelled.
    pub async fn resolved(&mut self) -> GuardState {
        if let Ok(state) = self.state.wait_for(GuardState::is_resolved).await {
            return state.clone();
        }
        self.state()
    }

    /// Cancel the in-flight check and release the mount.
    pub fn unmount(self) {}
}

impl Drop for GuardMount {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
