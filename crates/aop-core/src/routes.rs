//! Route table: which paths are public and which guard protects the rest.

use crate::models::profile::UserRole;

pub const MEMBER_SIGN_IN: &str = "/";
pub const ADMIN_SIGN_IN: &str = "/admin/login";
pub const ADMIN_DASHBOARD: &str = "/admin/dashboard";

pub const PUBLIC_ROUTES: &[&str] = &[
    "/",
    "/register",
    "/forgot-password",
    "/admin/login",
    "/admin/register",
    "/admin/forgot-password",
];

pub const CLIENT_ROUTES: &[&str] = &[
    "/dashboard/client",
    "/orders/new",
    "/orders",
    "/revisions",
    "/disputes",
    "/messages",
    "/finance",
    "/support",
    "/settings",
];

pub const WRITER_ROUTES: &[&str] = &[
    "/dashboard/writer",
    "/writer/available-orders",
    "/writer/active-projects",
    "/writer/messages",
    "/writer/disputes",
    "/writer/revisions",
    "/writer/finance",
    "/writer/support",
    "/writer/settings",
];

pub const ADMIN_ROUTES: &[&str] = &[
    "/admin/dashboard",
    "/admin/users",
    "/admin/orders",
    "/admin/disputes",
    "/admin/messages",
    "/admin/finance",
    "/admin/reports",
    "/admin/support",
    "/admin/settings",
];

/// How a path is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    /// Behind the member guard, restricted to one role.
    Member(UserRole),
    /// Behind the admin guard.
    Admin,
    /// Unknown path; redirect to [`MEMBER_SIGN_IN`].
    Fallback,
}

/// Navigation instruction produced by guards and account flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Location the user attempted to reach, carried as navigation state.
    pub from: Option<String>,
    /// Flash message for the target page.
    pub message: Option<String>,
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            to: path.into(),
            from: None,
            message: None,
            replace: false,
        }
    }

    pub fn from_location(mut self, location: impl Into<String>) -> Self {
        self.from = Some(location.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }
}

/// Landing page for a member role.
pub fn dashboard_route(role: UserRole) -> &'static str {
    match role {
        UserRole::Client => "/dashboard/client",
        UserRole::Writer => "/dashboard/writer",
    }
}

/// Strip query string, fragment and trailing slashes.
pub fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

pub fn resolve(path: &str) -> RouteAccess {
    let path = normalize(path);
    if PUBLIC_ROUTES.contains(&path) {
        RouteAccess::Public
    } else if CLIENT_ROUTES.contains(&path) {
        RouteAccess::Member(UserRole::Client)
    } else if WRITER_ROUTES.contains(&path) {
        RouteAccess::Member(UserRole::Writer)
    } else if ADMIN_ROUTES.contains(&path) {
        RouteAccess::Admin
    } else {
        RouteAccess::Fallback
    }
}
