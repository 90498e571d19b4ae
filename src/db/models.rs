/// Database models shared across modules
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Community member
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub date_joined: DateTime<Utc>,
    pub is_moderator: bool,
}

/// Uploaded sound
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Sound {
    pub id: i64,
    pub user_id: i64,
    /// Joined from the owning user
    pub username: String,
    pub original_filename: String,
    pub num_downloads: i64,
    pub channels: Option<i64>,
    pub duration: Option<f64>,
    pub samplerate: Option<i64>,
    pub moderation_state: String,
    pub created: DateTime<Utc>,
}

/// Forum post as shown on the front page
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ForumPostSummary {
    pub id: i64,
    pub author: String,
    pub thread_id: i64,
    pub thread_title: String,
    pub created: DateTime<Utc>,
}
