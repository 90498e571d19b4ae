/// Account manager
use crate::{
    account::{IssuedSession, ValidatedSession},
    db::{self, models::User},
    error::{SonoraError, SonoraResult},
};
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
    /// Usernames that moderate regardless of their account flag
    moderator_usernames: Vec<String>,
    session_ttl: Duration,
}

impl AccountManager {
    pub fn new(db: SqlitePool, moderator_usernames: Vec<String>, session_ttl: Duration) -> Self {
        Self {
            db,
            moderator_usernames,
            session_ttl,
        }
    }

    /// Register a user
    pub async fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        is_moderator: bool,
    ) -> SonoraResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SonoraError::Validation("Username cannot be empty".to_string()));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO user (username, email, date_joined, is_moderator) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(db::timestamp(now))
        .bind(is_moderator)
        .execute(&self.db)
        .await?;

        tracing::info!("Created user {} ({})", username, result.last_insert_rowid());

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            email: email.map(String::from),
            date_joined: now,
            is_moderator,
        })
    }

    /// Get user by id
    pub async fn get_user(&self, user_id: i64) -> SonoraResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, date_joined, is_moderator FROM user WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// Whether the user may act on moderation tickets
    pub fn can_moderate(&self, user: &User) -> bool {
        user.is_moderator || self.moderator_usernames.iter().any(|u| u == &user.username)
    }

    /// Issue a bearer token for a user
    pub async fn create_session(&self, user_id: i64) -> SonoraResult<IssuedSession> {
        let now = Utc::now();
        let expires_at = now + self.session_ttl;
        let token = Uuid::new_v4().simple().to_string();

        sqlx::query(
            "INSERT INTO session (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(db::timestamp(now))
        .bind(db::timestamp(expires_at))
        .execute(&self.db)
        .await?;

        Ok(IssuedSession {
            token,
            user_id,
            expires_at,
        })
    }

    /// Resolve a bearer token to its user
    pub async fn validate_token(&self, token: &str) -> SonoraResult<ValidatedSession> {
        let row = sqlx::query(
            r#"
            SELECT s.expires_at, u.id, u.username, u.email, u.date_joined, u.is_moderator
            FROM session s
            JOIN user u ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| SonoraError::Authentication("Invalid or expired session".to_string()))?;

        let expires_at: String = row.get("expires_at");
        if Utc::now() > db::parse_timestamp(&expires_at)? {
            return Err(SonoraError::Authentication("Session expired".to_string()));
        }

        let date_joined: String = row.get("date_joined");
        let user = User {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            date_joined: db::parse_timestamp(&date_joined)?,
            is_moderator: row.get("is_moderator"),
        };

        Ok(ValidatedSession {
            user_id: user.id,
            is_moderator: self.can_moderate(&user),
            username: user.username,
        })
    }

    /// Remove expired sessions
    pub async fn cleanup_expired_sessions(&self) -> SonoraResult<u64> {
        let result = sqlx::query("DELETE FROM session WHERE expires_at < ?")
            .bind(db::timestamp(Utc::now()))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
