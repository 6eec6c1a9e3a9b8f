//! AOP Auth: session lifecycle, route guards, and the sign-in /
//! registration flows layered over the hosted backend.

pub mod account;
pub mod config;
pub mod error;
pub mod guard;
pub mod session;

pub use account::{AccountService, AdminRegisterInput, RegisterInput};
pub use config::SessionConfig;
pub use error::AuthError;
pub use guard::{GuardKind, GuardMount, GuardState, GuardView, RouteGuard};
pub use session::SessionManager;
