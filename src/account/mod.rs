/// Account management
///
/// Community members, bearer-token sessions and the moderation capability check.

mod manager;

pub use manager::AccountManager;

use serde::{Deserialize, Serialize};

/// Validated session from bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedSession {
    pub user_id: i64,
    pub username: String,
    pub is_moderator: bool,
}

/// Session issued to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
