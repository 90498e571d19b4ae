/// Submitter-facing ticket pages
use crate::{
    auth::{AuthContext, ModeratorAuthContext, OptionalAuthContext},
    context::AppContext,
    error::{SonoraError, SonoraResult},
    tickets::{
        forms::{ContactForm, FormErrors, MessageForm},
        Ticket, TicketComment, TicketSender, TicketSource,
    },
    urls::names,
};
use axum::{
    extract::{Path, State},
    routing::get,
    Form, Json, Router,
};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/tickets/", get(list_tickets))
        .route("/tickets/contact/", get(contact_form).post(submit_contact))
        .route("/tickets/home/", get(tickets_home))
        .route("/tickets/support/", get(support_home))
        .route("/tickets/:key/", get(show_ticket).post(reply_to_ticket))
}

#[derive(Debug, Serialize)]
pub struct TicketPage {
    pub ticket: Ticket,
    pub comments: Vec<TicketComment>,
    pub form: MessageForm,
    pub errors: FormErrors,
}

#[derive(Debug, Serialize)]
pub struct TicketListPage {
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
pub struct ContactPage {
    pub ticket_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_url: Option<String>,
    /// Anonymous visitors are asked for an email address
    pub anonymous: bool,
    pub form: ContactForm,
    pub errors: FormErrors,
}

#[derive(Debug, Serialize)]
pub struct TicketsHomePage {
    pub new_upload_count: i64,
    pub new_support_count: i64,
}

async fn ticket_page(
    ctx: &AppContext,
    key: &str,
    viewer: &OptionalAuthContext,
    form: MessageForm,
    errors: FormErrors,
) -> SonoraResult<TicketPage> {
    let ticket = ctx
        .ticket_manager
        .get_ticket_by_key(key)
        .await?
        .ok_or_else(|| SonoraError::NotFound(format!("Ticket {} not found", key)))?;

    let comments = ctx
        .ticket_manager
        .comments(ticket.id, viewer.is_moderator())
        .await?;

    Ok(TicketPage {
        ticket,
        comments,
        form,
        errors,
    })
}

async fn show_ticket(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    viewer: OptionalAuthContext,
) -> SonoraResult<Json<TicketPage>> {
    let page = ticket_page(&ctx, &key, &viewer, MessageForm::default(), FormErrors::new()).await?;
    Ok(Json(page))
}

/// Add a comment; anonymous replies have no sender
async fn reply_to_ticket(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
    viewer: OptionalAuthContext,
    Form(form): Form<MessageForm>,
) -> SonoraResult<Json<TicketPage>> {
    let ticket = ctx
        .ticket_manager
        .get_ticket_by_key(&key)
        .await?
        .ok_or_else(|| SonoraError::NotFound(format!("Ticket {} not found", key)))?;

    let page = match form.clean() {
        Ok(message) => {
            ctx.ticket_manager
                .add_comment(ticket.id, viewer.user_id(), &message, false)
                .await?;
            tracing::info!("New comment on ticket {}", ticket.key);
            ticket_page(&ctx, &key, &viewer, MessageForm::default(), FormErrors::new()).await?
        }
        Err(errors) => ticket_page(&ctx, &key, &viewer, form, errors).await?,
    };

    Ok(Json(page))
}

/// Every ticket, including anonymous senders' addresses
async fn list_tickets(
    State(ctx): State<AppContext>,
    _moderator: ModeratorAuthContext,
) -> SonoraResult<Json<TicketListPage>> {
    let tickets = ctx.ticket_manager.list_tickets().await?;
    Ok(Json(TicketListPage { tickets }))
}

async fn contact_form(viewer: OptionalAuthContext) -> Json<ContactPage> {
    Json(ContactPage {
        ticket_created: false,
        ticket_key: None,
        ticket_url: None,
        anonymous: viewer.auth.is_none(),
        form: ContactForm::default(),
        errors: FormErrors::new(),
    })
}

/// Open a support ticket with the message as its first comment
async fn submit_contact(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Form(form): Form<ContactForm>,
) -> SonoraResult<Json<ContactPage>> {
    let anonymous = viewer.auth.is_none();

    let request = match form.clean(anonymous) {
        Ok(request) => request,
        Err(errors) => {
            return Ok(Json(ContactPage {
                ticket_created: false,
                ticket_key: None,
                ticket_url: None,
                anonymous,
                form,
                errors,
            }));
        }
    };

    let sender = match (viewer.user_id(), request.email) {
        (Some(id), _) => TicketSender::User { id },
        (None, Some(email)) => TicketSender::Anonymous { email },
        (None, None) => {
            return Err(SonoraError::Internal(
                "Anonymous contact request without email".to_string(),
            ));
        }
    };

    let (ticket, _) = ctx
        .ticket_manager
        .create_contact_ticket(sender, &request.title, &request.message)
        .await?;

    Ok(Json(ContactPage {
        ticket_created: true,
        ticket_url: ctx.absolute_url(names::TICKET, &[&ticket.key]),
        ticket_key: Some(ticket.key),
        anonymous,
        form: ContactForm::default(),
        errors: FormErrors::new(),
    }))
}

async fn tickets_home(
    State(ctx): State<AppContext>,
    _moderator: ModeratorAuthContext,
) -> SonoraResult<Json<TicketsHomePage>> {
    Ok(Json(TicketsHomePage {
        new_upload_count: ctx.ticket_manager.count_unassigned(TicketSource::NewSound).await?,
        new_support_count: ctx
            .ticket_manager
            .count_unassigned(TicketSource::ContactForm)
            .await?,
    }))
}

async fn support_home(_auth: AuthContext) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "page": "support" }))
}
