//! Account-flow error types.

use aop_core::error::AopError;
use aop_core::routes::ADMIN_SIGN_IN;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please use the admin login page")]
    UseAdminLogin,

    #[error("This account is not registered as an admin. Please use the regular login page.")]
    NotAnAdmin,

    #[error("Profile not found. Please try registering first.")]
    ProfileNotFound,

    #[error(
        "This email is already registered as an admin. Please use a different email address."
    )]
    EmailRegisteredAsAdmin,

    #[error(
        "This email is already registered as a regular user. Please use a different email address."
    )]
    EmailRegisteredAsUser,

    #[error("This email is already registered. Please use a different email address.")]
    EmailAlreadyRegistered,

    #[error("This email is not registered as an admin account.")]
    NotAdminEmail,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Backend(#[from] AopError),
}

impl AuthError {
    /// Page the user should be sent to alongside the error, if any.
    pub fn redirect(&self) -> Option<&'static str> {
        match self {
            Self::UseAdminLogin => Some(ADMIN_SIGN_IN),
            _ => None,
        }
    }
}

impl From<AuthError> for AopError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::UseAdminLogin | AuthError::NotAnAdmin => {
                AopError::Unauthorized {
                    reason: err.to_string(),
                }
            }
            AuthError::ProfileNotFound | AuthError::NotAdminEmail => AopError::NotFound {
                entity: "profile".into(),
                id: err.to_string(),
            },
            AuthError::EmailRegisteredAsAdmin
            | AuthError::EmailRegisteredAsUser
            | AuthError::EmailAlreadyRegistered => AopError::Conflict {
                entity: err.to_string(),
            },
            AuthError::Invalid(message) => AopError::Validation { message },
            AuthError::Backend(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_errors_fold_into_the_shared_set() {
        assert!(matches!(
            AopError::from(AuthError::InvalidCredentials),
            AopError::Unauthorized { .. }
        ));
        assert!(AopError::from(AuthError::ProfileNotFound).is_not_found());
        assert!(matches!(
            AopError::from(AuthError::EmailRegisteredAsUser),
            AopError::Conflict { .. }
        ));
        assert!(matches!(
            AopError::from(AuthError::Backend(AopError::Transport("down".into()))),
            AopError::Transport(_)
        ));
    }

    #[test]
    fn only_admin_hint_redirects() {
        assert_eq!(AuthError::UseAdminLogin.redirect(), Some("/admin/login"));
        assert_eq!(AuthError::ProfileNotFound.redirect(), None);
    }
}
