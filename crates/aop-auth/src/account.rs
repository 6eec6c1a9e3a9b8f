//! Sign-in, registration and password-reset flows.
//!
//! Every flow leaves the provider signed out when it fails after
//! authenticating, and registration always signs out so the user signs in
//! explicitly afterwards.

use aop_core::error::AopError;
use aop_core::models::identity::Credentials;
use aop_core::models::profile::{CreateAdminProfile, CreateProfile, UserRole};
use aop_core::repository::{IdentityProvider, ProfileStore};
use aop_core::routes::{ADMIN_DASHBOARD, ADMIN_SIGN_IN, MEMBER_SIGN_IN, Redirect, dashboard_route};
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::error::AuthError;

pub const REGISTRATION_SUCCESS: &str =
    "Registration successful! Please sign in with your credentials.";

/// Input for member registration.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub credentials: Credentials,
    pub full_name: String,
    pub role: UserRole,
}

/// Input for admin registration.
#[derive(Debug, Clone)]
pub struct AdminRegisterInput {
    pub credentials: Credentials,
    pub full_name: String,
}

pub struct AccountService<I: IdentityProvider, P: ProfileStore> {
    identity: I,
    profiles: P,
    config: SessionConfig,
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::Invalid("A valid email address is required".into()));
    }
    Ok(())
}

fn validate_credentials(credentials: &Credentials) -> Result<(), AuthError> {
    validate_email(&credentials.email)?;
    if credentials.password.is_empty() {
        return Err(AuthError::Invalid("Password is required".into()));
    }
    Ok(())
}

fn validate_full_name(full_name: &str) -> Result<(), AuthError> {
    if full_name.trim().is_empty() {
        return Err(AuthError::Invalid("Full name is required".into()));
    }
    Ok(())
}

fn sign_in_error(err: AopError) -> AuthError {
    match err {
        AopError::Unauthorized { .. } => AuthError::InvalidCredentials,
        other => AuthError::Backend(other),
    }
}

fn sign_up_error(err: AopError) -> AuthError {
    match err {
        AopError::Conflict { .. } => AuthError::EmailAlreadyRegistered,
        other => AuthError::Backend(other),
    }
}

impl<I: IdentityProvider, P: ProfileStore> AccountService<I, P> {
    pub fn new(identity: I, profiles: P, config: SessionConfig) -> Self {
        Self {
            identity,
            profiles,
            config,
        }
    }

    async fn sign_out_quietly(&self) {
        if let Err(e) = self.identity.sign_out().await {
            error!(error = %e, "Sign out error");
        }
    }

    /// Member sign-in. Returns the dashboard of the member's role.
    pub async fn sign_in(
        &self,
        credentials: &Credentials,
        remember_me: bool,
    ) -> Result<Redirect, AuthError> {
        validate_credentials(credentials)?;
        let session = self
            .identity
            .sign_in_with_password(credentials, remember_me)
            .await
            .map_err(sign_in_error)?;
        let user_id = session.user.id;

        let result = match self.profiles.profile_by_user(user_id).await {
            Ok(Some(profile)) => {
                info!(%user_id, role = %profile.role, "Member signed in");
                return Ok(Redirect::to(dashboard_route(profile.role)));
            }
            Ok(None) => match self.profiles.admin_profile_by_user(user_id).await {
                Ok(Some(_)) => Err(AuthError::UseAdminLogin),
                Ok(None) => Err(AuthError::ProfileNotFound),
                Err(e) => {
                    warn!(%user_id, error = %e, "Error checking admin profile");
                    Err(AuthError::ProfileNotFound)
                }
            },
            Err(e) => Err(AuthError::Backend(e)),
        };

        self.sign_out_quietly().await;
        result
    }

    /// Admin sign-in. Requires an admin profile.
    pub async fn admin_sign_in(
        &self,
        credentials: &Credentials,
        remember_me: bool,
    ) -> Result<Redirect, AuthError> {
        validate_credentials(credentials)?;
        let result = self.try_admin_sign_in(credentials, remember_me).await;
        if let Err(e) = &result {
            error!(error = %e, "Admin login error");
            self.sign_out_quietly().await;
        }
        result
    }

    async fn try_admin_sign_in(
        &self,
        credentials: &Credentials,
        remember_me: bool,
    ) -> Result<Redirect, AuthError> {
        let session = self
            .identity
            .sign_in_with_password(credentials, remember_me)
            .await
            .map_err(sign_in_error)?;
        let user_id = session.user.id;

        match self.profiles.admin_profile_by_user(user_id).await {
            Ok(Some(_)) => {
                info!(%user_id, "Admin signed in");
                Ok(Redirect::to(ADMIN_DASHBOARD))
            }
            Ok(None) => Err(AuthError::NotAnAdmin),
            Err(e) if e.is_not_found() => Err(AuthError::NotAnAdmin),
            Err(e) => Err(AuthError::Backend(e)),
        }
    }

    /// Where the admin sign-in and registration pages send a visitor who is
    /// already signed in as an admin. `None` means stay on the page; lookup
    /// failures are logged and read the same way.
    pub async fn admin_landing(&self) -> Option<Redirect> {
        let user = match self.identity.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Auth check error");
                return None;
            }
        };
        match self.profiles.admin_profile_by_user(user.id).await {
            Ok(Some(_)) => {
                info!(user_id = %user.id, "Already signed in as admin");
                Some(Redirect::to(ADMIN_DASHBOARD))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Auth check error");
                None
            }
        }
    }

    /// Member registration. On success the user is signed out and sent to
    /// the sign-in page with a confirmation message.
    pub async fn register(&self, input: RegisterInput) -> Result<Redirect, AuthError> {
        validate_credentials(&input.credentials)?;
        validate_full_name(&input.full_name)?;

        let user = self
            .identity
            .sign_up(&input.credentials)
            .await
            .map_err(sign_up_error)?;

        let created = self
            .profiles
            .create_profile(CreateProfile {
                user_id: user.id,
                full_name: input.full_name.trim().to_string(),
                role: input.role,
                email: Some(input.credentials.email.trim().to_string()),
            })
            .await;

        self.sign_out_quietly().await;
        let profile = created?;

        info!(user_id = %user.id, role = %profile.role, "Member registered");
        Ok(Redirect::to(MEMBER_SIGN_IN).with_message(REGISTRATION_SUCCESS))
    }

    /// Admin registration. Rejects e-mails already used by any profile.
    pub async fn register_admin(&self, input: AdminRegisterInput) -> Result<Redirect, AuthError> {
        validate_credentials(&input.credentials)?;
        validate_full_name(&input.full_name)?;
        let email = input.credentials.email.trim().to_string();

        match self.profiles.admin_profile_by_email(&email).await {
            Ok(Some(_)) => return Err(AuthError::EmailRegisteredAsAdmin),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Error checking existing admin profiles"),
        }
        match self.profiles.profile_by_email(&email).await {
            Ok(Some(_)) => return Err(AuthError::EmailRegisteredAsUser),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Error checking existing member profiles"),
        }

        let result = self.try_register_admin(&input, email).await;
        if let Err(e) = &result {
            error!(error = %e, "Registration error");
        }
        self.sign_out_quietly().await;
        result
    }

    async fn try_register_admin(
        &self,
        input: &AdminRegisterInput,
        email: String,
    ) -> Result<Redirect, AuthError> {
        let user = self
            .identity
            .sign_up(&input.credentials)
            .await
            .map_err(sign_up_error)?;

        self.profiles
            .create_admin_profile(CreateAdminProfile {
                user_id: user.id,
                full_name: input.full_name.trim().to_string(),
                email,
            })
            .await?;

        info!(user_id = %user.id, "Admin registered");
        Ok(Redirect::to(ADMIN_SIGN_IN).with_message(REGISTRATION_SUCCESS))
    }

    /// Send a member password-reset e-mail.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        self.identity
            .reset_password_for_email(email.trim(), &self.config.app_url("/reset-password"))
            .await?;
        Ok(())
    }

    /// Send an admin password-reset e-mail; the address must belong to an
    /// admin profile.
    pub async fn request_admin_password_reset(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        let email = email.trim();
        match self.profiles.admin_profile_by_email(email).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(AuthError::NotAdminEmail),
            Err(e) => {
                warn!(error = %e, "Error checking admin profile");
                return Err(AuthError::NotAdminEmail);
            }
        }
        self.identity
            .reset_password_for_email(email, &self.config.app_url("/admin/reset-password"))
            .await?;
        Ok(())
    }
}
