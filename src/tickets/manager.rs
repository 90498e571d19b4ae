/// Ticket storage and the submitter-facing operations
use crate::{
    db,
    error::{SonoraError, SonoraResult},
    metrics,
    tickets::{
        ContentRef, Ticket, TicketComment, TicketSender, TicketSource, TicketStatus,
        QUEUE_SOUND_MODERATION, QUEUE_SUPPORT_REQUESTS,
    },
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

pub(crate) const TICKET_COLUMNS: &str = r#"
    t.id, t.ticket_key, t.title, t.status, t.source, t.sender_id, t.sender_email,
    t.assignee_id, t.content_kind, t.content_id, q.name AS queue, t.created, t.modified
"#;

pub(crate) const TICKET_FROM: &str = "ticket t JOIN ticket_queue q ON q.id = t.queue_id";

/// Ticket manager
#[derive(Clone)]
pub struct TicketManager {
    db: SqlitePool,
}

impl TicketManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Generate an external ticket key
    pub fn generate_key() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect::<String>()
            .to_lowercase()
    }

    /// Open a support ticket from the contact form, with the message as its first comment
    pub async fn create_contact_ticket(
        &self,
        sender: TicketSender,
        title: &str,
        message: &str,
    ) -> SonoraResult<(Ticket, TicketComment)> {
        let mut tx = self.db.begin().await?;

        let ticket = insert_ticket(
            &mut tx,
            title,
            TicketSource::ContactForm,
            &sender,
            None,
            QUEUE_SUPPORT_REQUESTS,
        )
        .await?;
        let comment =
            insert_comment(&mut tx, ticket.id, sender.user_id(), message, false).await?;

        tx.commit().await?;

        metrics::record_ticket_created(TicketSource::ContactForm.as_str());
        tracing::info!("Opened support ticket {} ({})", ticket.key, ticket.id);

        Ok((ticket, comment))
    }

    /// Open a moderation ticket for a freshly uploaded sound
    pub async fn create_sound_ticket(
        &self,
        sender_id: i64,
        sound_id: i64,
        title: &str,
    ) -> SonoraResult<Ticket> {
        let mut conn = self.db.acquire().await?;
        let ticket = insert_ticket(
            &mut conn,
            title,
            TicketSource::NewSound,
            &TicketSender::User { id: sender_id },
            Some(ContentRef::Sound(sound_id)),
            QUEUE_SOUND_MODERATION,
        )
        .await?;

        metrics::record_ticket_created(TicketSource::NewSound.as_str());
        tracing::debug!("Opened moderation ticket {} for sound {}", ticket.key, sound_id);

        Ok(ticket)
    }

    /// Get ticket by id
    pub async fn get_ticket(&self, ticket_id: i64) -> SonoraResult<Option<Ticket>> {
        let mut conn = self.db.acquire().await?;
        fetch_ticket(&mut conn, ticket_id).await
    }

    /// Get ticket by its external key
    pub async fn get_ticket_by_key(&self, key: &str) -> SonoraResult<Option<Ticket>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE t.ticket_key = ?",
            TICKET_COLUMNS, TICKET_FROM
        ))
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_ticket).transpose()
    }

    /// All tickets, newest first
    pub async fn list_tickets(&self) -> SonoraResult<Vec<Ticket>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} ORDER BY t.created DESC, t.id DESC",
            TICKET_COLUMNS, TICKET_FROM
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_ticket).collect()
    }

    /// Tickets assigned to a moderator that are still open
    pub async fn assigned_open_tickets(&self, moderator_id: i64) -> SonoraResult<Vec<Ticket>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM {} WHERE t.assignee_id = ? AND t.status != ? ORDER BY t.created, t.id",
            TICKET_COLUMNS, TICKET_FROM
        ))
        .bind(moderator_id)
        .bind(TicketStatus::Closed.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_ticket).collect()
    }

    /// Number of tickets from a source nobody has picked up yet
    pub async fn count_unassigned(&self, source: TicketSource) -> SonoraResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ticket WHERE assignee_id IS NULL AND source = ?",
        )
        .bind(source.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Append a comment to a ticket
    pub async fn add_comment(
        &self,
        ticket_id: i64,
        sender_id: Option<i64>,
        text: &str,
        moderator_only: bool,
    ) -> SonoraResult<TicketComment> {
        let mut conn = self.db.acquire().await?;
        insert_comment(&mut conn, ticket_id, sender_id, text, moderator_only).await
    }

    /// Comments on a ticket, oldest first
    pub async fn comments(
        &self,
        ticket_id: i64,
        include_moderator_only: bool,
    ) -> SonoraResult<Vec<TicketComment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, ticket_id, sender_id, text, moderator_only, created
            FROM ticket_comment
            WHERE ticket_id = ? AND (moderator_only = 0 OR ?)
            ORDER BY created, id
            "#,
        )
        .bind(ticket_id)
        .bind(include_moderator_only)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_comment).collect()
    }
}

pub(crate) async fn insert_ticket(
    conn: &mut SqliteConnection,
    title: &str,
    source: TicketSource,
    sender: &TicketSender,
    content: Option<ContentRef>,
    queue: &str,
) -> SonoraResult<Ticket> {
    let now = Utc::now();
    let key = TicketManager::generate_key();

    let queue_id: i64 = sqlx::query_scalar("SELECT id FROM ticket_queue WHERE name = ?")
        .bind(queue)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| SonoraError::Internal(format!("Missing ticket queue {}", queue)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO ticket
        (ticket_key, title, status, source, sender_id, sender_email, assignee_id,
         content_kind, content_id, queue_id, created, modified)
        VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&key)
    .bind(title)
    .bind(TicketStatus::New.as_str())
    .bind(source.as_str())
    .bind(sender.user_id())
    .bind(sender.email())
    .bind(content.map(|c| c.kind()))
    .bind(content.map(|c| c.id()))
    .bind(queue_id)
    .bind(db::timestamp(now))
    .bind(db::timestamp(now))
    .execute(&mut *conn)
    .await?;

    Ok(Ticket {
        id: result.last_insert_rowid(),
        key,
        title: title.to_string(),
        status: TicketStatus::New,
        source,
        sender: sender.clone(),
        assignee_id: None,
        content,
        queue: queue.to_string(),
        created: now,
        modified: now,
    })
}

pub(crate) async fn insert_comment(
    conn: &mut SqliteConnection,
    ticket_id: i64,
    sender_id: Option<i64>,
    text: &str,
    moderator_only: bool,
) -> SonoraResult<TicketComment> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO ticket_comment (ticket_id, sender_id, text, moderator_only, created)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(ticket_id)
    .bind(sender_id)
    .bind(text)
    .bind(moderator_only)
    .bind(db::timestamp(now))
    .execute(conn)
    .await?;

    Ok(TicketComment {
        id: result.last_insert_rowid(),
        ticket_id,
        sender_id,
        text: text.to_string(),
        moderator_only,
        created: now,
    })
}

pub(crate) async fn fetch_ticket(
    conn: &mut SqliteConnection,
    ticket_id: i64,
) -> SonoraResult<Option<Ticket>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM {} WHERE t.id = ?",
        TICKET_COLUMNS, TICKET_FROM
    ))
    .bind(ticket_id)
    .fetch_optional(conn)
    .await?;

    row.map(parse_ticket).transpose()
}

pub(crate) fn parse_ticket(row: SqliteRow) -> SonoraResult<Ticket> {
    let status_str: String = row.get("status");
    let source_str: String = row.get("source");

    let sender_id: Option<i64> = row.get("sender_id");
    let sender_email: Option<String> = row.get("sender_email");
    let sender = match (sender_id, sender_email) {
        (Some(id), _) => TicketSender::User { id },
        (None, Some(email)) => TicketSender::Anonymous { email },
        (None, None) => {
            return Err(SonoraError::Internal("Ticket without sender".to_string()));
        }
    };

    let content_kind: Option<String> = row.get("content_kind");
    let content = ContentRef::from_parts(content_kind.as_deref(), row.get("content_id"))?;

    let created: String = row.get("created");
    let modified: String = row.get("modified");

    Ok(Ticket {
        id: row.get("id"),
        key: row.get("ticket_key"),
        title: row.get("title"),
        status: TicketStatus::from_str(&status_str)?,
        source: TicketSource::from_str(&source_str)?,
        sender,
        assignee_id: row.get("assignee_id"),
        content,
        queue: row.get("queue"),
        created: db::parse_timestamp(&created)?,
        modified: db::parse_timestamp(&modified)?,
    })
}

fn parse_comment(row: SqliteRow) -> SonoraResult<TicketComment> {
    let created: String = row.get("created");

    Ok(TicketComment {
        id: row.get("id"),
        ticket_id: row.get("ticket_id"),
        sender_id: row.get("sender_id"),
        text: row.get("text"),
        moderator_only: row.get("moderator_only"),
        created: db::parse_timestamp(&created)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::test_support::{fixture, upload};

    #[test]
    fn test_generate_key() {
        let key = TicketManager::generate_key();
        assert_eq!(key.len(), 8);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(key.chars().all(|c| !c.is_uppercase()));
    }

    #[tokio::test]
    async fn test_anonymous_contact_ticket() {
        let fx = fixture().await;
        let tickets = TicketManager::new(fx.pool.clone());

        let (ticket, comment) = tickets
            .create_contact_ticket(
                TicketSender::Anonymous {
                    email: "someone@example.org".to_string(),
                },
                "Cannot log in",
                "help",
            )
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.source, TicketSource::ContactForm);
        assert_eq!(ticket.queue, QUEUE_SUPPORT_REQUESTS);
        assert_eq!(ticket.sender.email(), Some("someone@example.org"));
        assert_eq!(comment.text, "help");
        assert_eq!(comment.sender_id, None);

        let stored = tickets.get_ticket_by_key(&ticket.key).await.unwrap().unwrap();
        assert_eq!(stored.id, ticket.id);
        assert_eq!(stored.sender, ticket.sender);

        let comments = tickets.comments(ticket.id, false).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(tickets.list_tickets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_contact_ticket_records_sender() {
        let fx = fixture().await;
        let tickets = TicketManager::new(fx.pool.clone());

        let (ticket, comment) = tickets
            .create_contact_ticket(TicketSender::User { id: fx.uploader.id }, "Hi", "a question")
            .await
            .unwrap();

        assert_eq!(ticket.sender.user_id(), Some(fx.uploader.id));
        assert_eq!(comment.sender_id, Some(fx.uploader.id));
    }

    #[tokio::test]
    async fn test_new_sound_ticket_starts_unassigned() {
        let fx = fixture().await;
        let tickets = TicketManager::new(fx.pool.clone());
        let sound_id = fx.sounds.create_sound(fx.uploader.id, upload("a.wav")).await.unwrap();

        let ticket = tickets
            .create_sound_ticket(fx.uploader.id, sound_id, "a.wav")
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::New);
        assert_eq!(ticket.assignee_id, None);
        assert_eq!(ticket.content, Some(ContentRef::Sound(sound_id)));
        assert_eq!(ticket.queue, QUEUE_SOUND_MODERATION);
        assert_eq!(tickets.count_unassigned(TicketSource::NewSound).await.unwrap(), 1);
        assert_eq!(tickets.count_unassigned(TicketSource::ContactForm).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_moderator_only_comments_hidden() {
        let fx = fixture().await;
        let tickets = TicketManager::new(fx.pool.clone());
        let (ticket, _) = tickets
            .create_contact_ticket(TicketSender::User { id: fx.uploader.id }, "Hi", "first")
            .await
            .unwrap();

        tickets
            .add_comment(ticket.id, Some(fx.moderator.id), "internal note", true)
            .await
            .unwrap();

        assert_eq!(tickets.comments(ticket.id, false).await.unwrap().len(), 1);
        assert_eq!(tickets.comments(ticket.id, true).await.unwrap().len(), 2);
    }
}
