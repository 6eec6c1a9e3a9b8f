//! Session and account-flow configuration.

use chrono::Duration;

/// Configuration for the session manager and account flows.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of a session row in seconds (default: 86_400 = 24 hours).
    pub session_lifetime_secs: u64,
    /// Device label recorded when the caller supplies none.
    pub default_device_label: String,
    /// Public origin of the web app; password-reset links point here.
    pub app_origin: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_lifetime_secs: 86_400,
            default_device_label: concat!("aop/", env!("CARGO_PKG_VERSION")).into(),
            app_origin: "http://localhost:5173".into(),
        }
    }
}

impl SessionConfig {
    /// Lifetime as a duration, saturating at the largest one chrono holds.
    pub fn session_lifetime(&self) -> Duration {
        i64::try_from(self.session_lifetime_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Absolute URL of `path` on the web app.
    pub fn app_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.app_origin.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
