/// Support and moderation tickets
///
/// A ticket is opened either from the contact form or when a sound is
/// uploaded. Moderators pick up new-sound tickets in bulk, then approve,
/// defer, return or delete them one at a time; every step may leave a
/// comment on the ticket.

pub mod forms;
pub mod manager;
pub mod moderation;

pub use manager::TicketManager;
pub use moderation::{ModerationAction, ModerationDecision, ModerationWorkflow};

use crate::error::{SonoraError, SonoraResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue for contact-form tickets
pub const QUEUE_SUPPORT_REQUESTS: &str = "support requests";
/// Queue for new-sound tickets
pub const QUEUE_SOUND_MODERATION: &str = "sound moderation";

/// Ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    New,
    Accepted,
    Deferred,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::Accepted => "accepted",
            TicketStatus::Deferred => "deferred",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> SonoraResult<Self> {
        match s.to_lowercase().as_str() {
            "new" => Ok(TicketStatus::New),
            "accepted" => Ok(TicketStatus::Accepted),
            "deferred" => Ok(TicketStatus::Deferred),
            "closed" => Ok(TicketStatus::Closed),
            _ => Err(SonoraError::Validation(format!("Invalid ticket status: {}", s))),
        }
    }
}

/// Where a ticket came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketSource {
    #[serde(rename = "new sound")]
    NewSound,
    #[serde(rename = "contact form")]
    ContactForm,
}

impl TicketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketSource::NewSound => "new sound",
            TicketSource::ContactForm => "contact form",
        }
    }

    pub fn from_str(s: &str) -> SonoraResult<Self> {
        match s {
            "new sound" => Ok(TicketSource::NewSound),
            "contact form" => Ok(TicketSource::ContactForm),
            _ => Err(SonoraError::Validation(format!("Invalid ticket source: {}", s))),
        }
    }
}

/// Who opened a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TicketSender {
    User { id: i64 },
    Anonymous { email: String },
}

impl TicketSender {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            TicketSender::User { id } => Some(*id),
            TicketSender::Anonymous { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            TicketSender::User { .. } => None,
            TicketSender::Anonymous { email } => Some(email),
        }
    }
}

/// Content a ticket is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ContentRef {
    Sound(i64),
}

impl ContentRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ContentRef::Sound(_) => "sound",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ContentRef::Sound(id) => *id,
        }
    }

    pub fn from_parts(kind: Option<&str>, id: Option<i64>) -> SonoraResult<Option<Self>> {
        match (kind, id) {
            (None, None) => Ok(None),
            (Some("sound"), Some(id)) => Ok(Some(ContentRef::Sound(id))),
            (kind, id) => Err(SonoraError::Internal(format!(
                "Invalid content reference {:?}/{:?}",
                kind, id
            ))),
        }
    }
}

/// Ticket record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub key: String,
    pub title: String,
    pub status: TicketStatus,
    pub source: TicketSource,
    pub sender: TicketSender,
    pub assignee_id: Option<i64>,
    pub content: Option<ContentRef>,
    pub queue: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Ticket {
    pub fn is_assigned_to(&self, user_id: i64) -> bool {
        self.assignee_id == Some(user_id)
    }
}

/// Comment on a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketComment {
    pub id: i64,
    pub ticket_id: i64,
    pub sender_id: Option<i64>,
    pub text: String,
    /// Hidden from the submitter
    pub moderator_only: bool,
    pub created: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        account::AccountManager,
        db::{self, models::User},
        sounds::{NewSound, SoundStore},
    };
    use sqlx::SqlitePool;

    pub struct Fixture {
        pub pool: SqlitePool,
        pub accounts: AccountManager,
        pub sounds: SoundStore,
        pub moderator: User,
        pub other_moderator: User,
        pub uploader: User,
    }

    pub async fn fixture() -> Fixture {
        let pool = db::memory_pool().await.unwrap();
        let accounts = AccountManager::new(pool.clone(), vec![], chrono::Duration::hours(1));
        let moderator = accounts.create_user("mod", None, true).await.unwrap();
        let other_moderator = accounts.create_user("mod2", None, true).await.unwrap();
        let uploader = accounts.create_user("uploader", None, false).await.unwrap();

        Fixture {
            sounds: SoundStore::new(pool.clone()),
            pool,
            accounts,
            moderator,
            other_moderator,
            uploader,
        }
    }

    pub fn upload(name: &str) -> NewSound {
        NewSound {
            original_filename: name.to_string(),
            ..NewSound::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str() {
        assert_eq!(TicketStatus::from_str("new").unwrap(), TicketStatus::New);
        assert_eq!(TicketStatus::from_str("CLOSED").unwrap(), TicketStatus::Closed);
        assert!(TicketStatus::from_str("open").is_err());
    }

    #[test]
    fn test_source_strings() {
        for source in [TicketSource::NewSound, TicketSource::ContactForm] {
            assert_eq!(TicketSource::from_str(source.as_str()).unwrap(), source);
        }
    }

    #[test]
    fn test_content_ref_parts() {
        assert_eq!(ContentRef::from_parts(None, None).unwrap(), None);
        assert_eq!(
            ContentRef::from_parts(Some("sound"), Some(4)).unwrap(),
            Some(ContentRef::Sound(4))
        );
        assert!(ContentRef::from_parts(Some("sound"), None).is_err());
        assert!(ContentRef::from_parts(Some("pack"), Some(1)).is_err());
    }
}
