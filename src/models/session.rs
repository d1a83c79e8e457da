//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Login sessions last a week
pub const SESSION_DAYS: i64 = 7;

/// Opaque bearer token bound to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// New session for `user_id` starting now
    pub fn issue(id: String, user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            expires_at: now + Duration::days(SESSION_DAYS),
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
