//! Session domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Session {
    /// Active and not yet expired at `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Input for the store's atomic session-creation procedure.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub device_info: String,
    pub expires_in: Duration,
}

/// Render a duration as a Postgres interval literal, e.g. `24 hours`.
pub fn interval_literal(duration: Duration) -> String {
    let secs = duration.num_seconds();
    if secs % 3600 == 0 {
        let hours = secs / 3600;
        if hours == 1 {
            "1 hour".into()
        } else {
            format!("{hours} hours")
        }
    } else {
        format!("{secs} seconds")
    }
}
