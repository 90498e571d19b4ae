/// Moderation workflow over new-sound tickets
///
/// State changes:
///
/// ```text
/// NEW --assign--> ACCEPTED --approve/delete--> CLOSED
///                    |
///                    +--defer--> DEFERRED --assign--> ACCEPTED
///                    +--return (unassigned)--> DEFERRED
/// ```
///
/// Each action touches the ticket, its comments and possibly the sound, all
/// in one transaction.
use crate::{
    db,
    error::{SonoraError, SonoraResult},
    metrics, sounds,
    tickets::{
        manager::{fetch_ticket, insert_comment, parse_ticket, TICKET_COLUMNS, TICKET_FROM},
        ContentRef, Ticket, TicketComment, TicketSource, TicketStatus,
    },
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Actions a moderator can take on an assigned ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModerationAction {
    Approve,
    Defer,
    Return,
    Delete,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Approve => "Approve",
            ModerationAction::Defer => "Defer",
            ModerationAction::Return => "Return",
            ModerationAction::Delete => "Delete",
        }
    }

    pub fn from_str(s: &str) -> SonoraResult<Self> {
        match s {
            "Approve" => Ok(ModerationAction::Approve),
            "Defer" => Ok(ModerationAction::Defer),
            "Return" => Ok(ModerationAction::Return),
            "Delete" => Ok(ModerationAction::Delete),
            _ => Err(SonoraError::Validation(format!(
                "Invalid moderation action: {}",
                s
            ))),
        }
    }

    /// Status the ticket ends in
    pub fn resulting_status(&self) -> TicketStatus {
        match self {
            ModerationAction::Approve | ModerationAction::Delete => TicketStatus::Closed,
            ModerationAction::Defer | ModerationAction::Return => TicketStatus::Deferred,
        }
    }

    /// Whether the comment left by this action is hidden from the submitter
    pub fn moderator_only(&self) -> bool {
        matches!(self, ModerationAction::Return)
    }
}

/// A validated moderation decision: the action plus the comment it leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationDecision {
    pub ticket_id: i64,
    pub action: ModerationAction,
    pub comment: String,
}

/// Result of a moderation action
#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub ticket: Ticket,
    pub comment: TicketComment,
}

/// Sender with unassigned new-sound tickets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUploader {
    pub user_id: i64,
    pub username: String,
    pub new_count: i64,
}

#[derive(Clone)]
pub struct ModerationWorkflow {
    db: SqlitePool,
}

impl ModerationWorkflow {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Assign every unassigned new-sound ticket from `sender_id` to the moderator
    pub async fn assign_sender_tickets(&self, moderator_id: i64, sender_id: i64) -> SonoraResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ticket
            SET assignee_id = ?, status = ?, modified = ?
            WHERE assignee_id IS NULL
              AND sender_id = ?
              AND source = ?
              AND status != ?
            "#,
        )
        .bind(moderator_id)
        .bind(TicketStatus::Accepted.as_str())
        .bind(db::timestamp(Utc::now()))
        .bind(sender_id)
        .bind(TicketSource::NewSound.as_str())
        .bind(TicketStatus::Closed.as_str())
        .execute(&self.db)
        .await?;

        tracing::info!(
            "Assigned {} new sound tickets from user {} to moderator {}",
            result.rows_affected(),
            sender_id,
            moderator_id
        );

        Ok(result.rows_affected())
    }

    /// Apply a decision to a ticket assigned to `actor_id`.
    ///
    /// Fails without touching anything when the ticket is not assigned to
    /// the actor or is already closed.
    pub async fn apply(
        &self,
        actor_id: i64,
        decision: &ModerationDecision,
    ) -> SonoraResult<ModerationOutcome> {
        let mut tx = self.db.begin().await?;

        let mut ticket = fetch_ticket(&mut tx, decision.ticket_id)
            .await?
            .ok_or_else(|| {
                SonoraError::NotFound(format!("Ticket {} not found", decision.ticket_id))
            })?;

        if !ticket.is_assigned_to(actor_id) {
            return Err(SonoraError::Authorization(format!(
                "Ticket {} is not assigned to you",
                ticket.id
            )));
        }

        if ticket.status == TicketStatus::Closed {
            return Err(SonoraError::Validation(format!(
                "Ticket {} is already closed",
                ticket.id
            )));
        }

        let comment = insert_comment(
            &mut tx,
            ticket.id,
            Some(actor_id),
            &decision.comment,
            decision.action.moderator_only(),
        )
        .await?;

        match (decision.action, ticket.content) {
            (ModerationAction::Approve, Some(ContentRef::Sound(sound_id))) => {
                sounds::approve_sound(&mut tx, sound_id).await?;
            }
            (ModerationAction::Delete, Some(ContentRef::Sound(sound_id))) => {
                sounds::delete_sound(&mut tx, sound_id).await?;
                ticket.content = None;
            }
            (ModerationAction::Return, _) => {
                ticket.assignee_id = None;
            }
            (ModerationAction::Approve | ModerationAction::Delete, None) => {
                tracing::warn!(
                    "Ticket {} has no content to {}",
                    ticket.id,
                    decision.action.as_str()
                );
            }
            (ModerationAction::Defer, _) => {}
        }

        ticket.status = decision.action.resulting_status();
        ticket.modified = Utc::now();

        sqlx::query(
            r#"
            UPDATE ticket
            SET status = ?, assignee_id = ?, content_kind = ?, content_id = ?, modified = ?
            WHERE id = ?
            "#,
        )
        .bind(ticket.status.as_str())
        .bind(ticket.assignee_id)
        .bind(ticket.content.map(|c| c.kind()))
        .bind(ticket.content.map(|c| c.id()))
        .bind(db::timestamp(ticket.modified))
        .bind(ticket.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        metrics::record_moderation_action(decision.action.as_str());
        tracing::info!(
            "Moderator {} applied {} to ticket {}",
            actor_id,
            decision.action.as_str(),
            ticket.id
        );

        Ok(ModerationOutcome { ticket, comment })
    }

    /// Unassigned new-sound tickets still in NEW, grouped by sender
    pub async fn pending_uploaders(&self) -> SonoraResult<Vec<PendingUploader>> {
        let rows = sqlx::query(
            r#"
            SELECT t.sender_id, u.username, COUNT(*) AS new_count
            FROM ticket t
            JOIN user u ON u.id = t.sender_id
            WHERE t.source = ? AND t.assignee_id IS NULL AND t.status = ?
            GROUP BY t.sender_id, u.username
            ORDER BY u.username
            "#,
        )
        .bind(TicketSource::NewSound.as_str())
        .bind(TicketStatus::New.as_str())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PendingUploader {
                user_id: row.get("sender_id"),
                username: row.get("username"),
                new_count: row.get("new_count"),
            })
            .collect())
    }

    /// New-sound tickets a moderator looked at and handed back unresolved
    pub async fn unsure_tickets(&self) -> SonoraResult<Vec<Ticket>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM {}
            WHERE t.source = ? AND t.assignee_id IS NULL AND t.status IN (?, ?)
            ORDER BY t.modified, t.id
            "#,
            TICKET_COLUMNS, TICKET_FROM
        ))
        .bind(TicketSource::NewSound.as_str())
        .bind(TicketStatus::Accepted.as_str())
        .bind(TicketStatus::Deferred.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_ticket).collect()
    }

    /// Assigned tickets whose last comment came from the submitter and has
    /// waited longer than `threshold` for a moderator reply
    pub async fn tardy_moderator_tickets(&self, threshold: Duration) -> SonoraResult<Vec<Ticket>> {
        self.tardy_tickets(threshold, true).await
    }

    /// Assigned tickets whose last comment came from someone other than the
    /// submitter and has waited longer than `threshold` for the submitter
    pub async fn tardy_user_tickets(&self, threshold: Duration) -> SonoraResult<Vec<Ticket>> {
        self.tardy_tickets(threshold, false).await
    }

    async fn tardy_tickets(&self, threshold: Duration, last_from_sender: bool) -> SonoraResult<Vec<Ticket>> {
        let sender_match = if last_from_sender {
            "c.sender_id = t.sender_id"
        } else {
            "c.sender_id != t.sender_id"
        };

        let cutoff = db::timestamp(Utc::now() - threshold);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM {}
            JOIN ticket_comment c ON c.ticket_id = t.id
            WHERE c.id IN (SELECT MAX(id) FROM ticket_comment GROUP BY ticket_id)
              AND t.assignee_id IS NOT NULL
              AND {}
              AND c.created < ?
            ORDER BY c.created, t.id
            "#,
            TICKET_COLUMNS, TICKET_FROM, sender_match
        ))
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(parse_ticket).collect()
    }
}
