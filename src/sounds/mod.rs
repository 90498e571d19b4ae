/// Sound storage
///
/// Read access for the API and front page, plus the two mutations the
/// moderation workflow performs on a sound (approve, delete). Those take a
/// connection so they run inside the caller's transaction.

use crate::{
    db::{
        self,
        models::{ForumPostSummary, Sound},
    },
    error::SonoraResult,
    pagination::PageSource,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

/// Sound moderation states
pub mod moderation_state {
    pub const PENDING: &str = "PE";
    pub const OK: &str = "OK";
}

const SOUND_COLUMNS: &str = r#"
    s.id, s.user_id, u.username, s.original_filename, s.num_downloads,
    s.channels, s.duration, s.samplerate, s.moderation_state, s.created
"#;

/// Fields for a new sound
#[derive(Debug, Clone, Default)]
pub struct NewSound {
    pub original_filename: String,
    pub channels: Option<i64>,
    pub duration: Option<f64>,
    pub samplerate: Option<i64>,
}

#[derive(Clone)]
pub struct SoundStore {
    db: SqlitePool,
}

impl SoundStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Store an uploaded sound, pending moderation
    pub async fn create_sound(&self, user_id: i64, sound: NewSound) -> SonoraResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO sound (user_id, original_filename, channels, duration, samplerate, moderation_state, created)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&sound.original_filename)
        .bind(sound.channels)
        .bind(sound.duration)
        .bind(sound.samplerate)
        .bind(moderation_state::PENDING)
        .bind(db::timestamp(Utc::now()))
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get any sound by id, whatever its moderation state
    pub async fn get_sound(&self, sound_id: i64) -> SonoraResult<Option<Sound>> {
        let sound = sqlx::query_as::<_, Sound>(&format!(
            "SELECT {} FROM sound s JOIN user u ON u.id = s.user_id WHERE s.id = ?",
            SOUND_COLUMNS
        ))
        .bind(sound_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(sound)
    }

    /// Approved sounds, newest first, optionally for one user
    pub fn approved(&self, user_id: Option<i64>) -> SoundQuery {
        SoundQuery {
            db: self.db.clone(),
            user_id,
        }
    }

    /// Most recent forum posts
    pub async fn latest_forum_posts(&self, limit: i64) -> SonoraResult<Vec<ForumPostSummary>> {
        let posts = sqlx::query_as::<_, ForumPostSummary>(
            r#"
            SELECT p.id, u.username AS author, t.id AS thread_id, t.title AS thread_title, p.created
            FROM forum_post p
            JOIN user u ON u.id = p.author_id
            JOIN forum_thread t ON t.id = p.thread_id
            ORDER BY p.created DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(posts)
    }
}

/// Mark a sound as approved
pub async fn approve_sound(conn: &mut SqliteConnection, sound_id: i64) -> SonoraResult<u64> {
    let result = sqlx::query("UPDATE sound SET moderation_state = ? WHERE id = ?")
        .bind(moderation_state::OK)
        .bind(sound_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Remove a sound
pub async fn delete_sound(conn: &mut SqliteConnection, sound_id: i64) -> SonoraResult<u64> {
    let result = sqlx::query("DELETE FROM sound WHERE id = ?")
        .bind(sound_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Listing of approved sounds
pub struct SoundQuery {
    db: SqlitePool,
    user_id: Option<i64>,
}

impl SoundQuery {
    fn where_clause(&self) -> String {
        match self.user_id {
            Some(user_id) => format!(
                "s.moderation_state = '{}' AND s.user_id = {}",
                moderation_state::OK,
                user_id
            ),
            None => format!("s.moderation_state = '{}'", moderation_state::OK),
        }
    }
}

#[async_trait]
impl PageSource for SoundQuery {
    type Item = Sound;

    fn fingerprint(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM sound s WHERE {}",
            self.where_clause()
        )
    }

    async fn count(&self) -> SonoraResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(&self.fingerprint())
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn slice(&self, offset: i64, limit: i64) -> SonoraResult<Vec<Sound>> {
        let sounds = sqlx::query_as::<_, Sound>(&format!(
            "SELECT {} FROM sound s JOIN user u ON u.id = s.user_id WHERE {} ORDER BY s.created DESC, s.id DESC LIMIT ? OFFSET ?",
            SOUND_COLUMNS,
            self.where_clause()
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(sounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountManager;
    use crate::pagination::{paginate, CountStrategy};

    async fn setup() -> (SqlitePool, SoundStore, i64, i64) {
        let pool = db::memory_pool().await.unwrap();
        let accounts = AccountManager::new(pool.clone(), vec![], chrono::Duration::hours(1));
        let alice = accounts.create_user("alice", None, false).await.unwrap();
        let bob = accounts.create_user("bob", None, false).await.unwrap();
        (pool.clone(), SoundStore::new(pool), alice.id, bob.id)
    }

    fn upload(name: &str) -> NewSound {
        NewSound {
            original_filename: name.to_string(),
            channels: Some(2),
            duration: Some(1.5),
            samplerate: Some(44100),
        }
    }

    #[tokio::test]
    async fn test_only_approved_sounds_are_listed() {
        let (pool, store, alice, bob) = setup().await;
        let a1 = store.create_sound(alice, upload("a1.wav")).await.unwrap();
        store.create_sound(alice, upload("a2.wav")).await.unwrap();
        let b1 = store.create_sound(bob, upload("b1.wav")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        approve_sound(&mut conn, a1).await.unwrap();
        approve_sound(&mut conn, b1).await.unwrap();
        drop(conn);

        assert_eq!(store.approved(None).count().await.unwrap(), 2);

        let page = paginate(&store.approved(Some(alice)), 20, None, CountStrategy::Direct)
            .await
            .unwrap();
        assert_eq!(page.paginator.count, 1);
        assert_eq!(page.items[0].original_filename, "a1.wav");
        assert_eq!(page.items[0].username, "alice");
    }

    #[tokio::test]
    async fn test_fingerprint_differs_per_user() {
        let (_pool, store, alice, bob) = setup().await;
        assert_ne!(
            store.approved(Some(alice)).fingerprint(),
            store.approved(Some(bob)).fingerprint()
        );
        assert_ne!(
            store.approved(None).fingerprint(),
            store.approved(Some(alice)).fingerprint()
        );
    }

    #[tokio::test]
    async fn test_delete_sound() {
        let (pool, store, alice, _) = setup().await;
        let id = store.create_sound(alice, upload("gone.wav")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(delete_sound(&mut conn, id).await.unwrap(), 1);
        drop(conn);

        assert!(store.get_sound(id).await.unwrap().is_none());
    }
}
