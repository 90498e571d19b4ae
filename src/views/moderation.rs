/// Moderation dashboard and the assigned-tickets page
use crate::{
    auth::ModeratorAuthContext,
    context::AppContext,
    error::{SonoraError, SonoraResult},
    tickets::{
        forms::{ModerationFormErrors, ModerationSubmission, DEFER_MESSAGES, DELETE_MESSAGES},
        moderation::PendingUploader,
        Ticket,
    },
    urls::names,
};
use axum::{
    extract::{Path, State},
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/tickets/moderation/", get(moderation_home))
        .route("/tickets/moderation/assign/:user_id/", post(assign_user))
        .route(
            "/tickets/moderation/assigned/:user_id/",
            get(assigned_tickets).post(moderate_assigned),
        )
}

#[derive(Debug, Serialize)]
pub struct ModerationHomePage {
    pub new_sounds_users: Vec<PendingUploader>,
    pub unsure_tickets: Vec<Ticket>,
    pub tardy_moderator_tickets: Vec<Ticket>,
    pub tardy_user_tickets: Vec<Ticket>,
}

#[derive(Debug, Serialize)]
pub struct AssignedPage {
    pub moderator_id: i64,
    pub moderator_tickets: Vec<Ticket>,
    pub form: ModerationSubmission,
    pub errors: ModerationFormErrors,
    pub defer_messages: &'static [(&'static str, &'static str)],
    pub delete_messages: &'static [(&'static str, &'static str)],
}

async fn moderation_home(
    State(ctx): State<AppContext>,
    _moderator: ModeratorAuthContext,
) -> SonoraResult<Json<ModerationHomePage>> {
    let threshold = chrono::Duration::days(ctx.config.moderation.tardy_days);

    Ok(Json(ModerationHomePage {
        new_sounds_users: ctx.moderation.pending_uploaders().await?,
        unsure_tickets: ctx.moderation.unsure_tickets().await?,
        tardy_moderator_tickets: ctx.moderation.tardy_moderator_tickets(threshold).await?,
        tardy_user_tickets: ctx.moderation.tardy_user_tickets(threshold).await?,
    }))
}

/// Take every new sound ticket from one uploader
async fn assign_user(
    State(ctx): State<AppContext>,
    moderator: ModeratorAuthContext,
    Path(user_id): Path<i64>,
) -> SonoraResult<Redirect> {
    let sender = ctx
        .account_manager
        .get_user(user_id)
        .await?
        .ok_or_else(|| SonoraError::NotFound(format!("User {} not found", user_id)))?;

    ctx.moderation
        .assign_sender_tickets(moderator.user_id, sender.id)
        .await?;
    tracing::info!(
        "{} has been assigned all new sounds from {}",
        moderator.session.username,
        sender.username
    );

    let home = ctx
        .urls
        .resolve(names::MODERATION_HOME, &[])
        .ok_or_else(|| SonoraError::Internal("Moderation home route missing".to_string()))?;

    Ok(Redirect::to(&home))
}

async fn assigned_page(
    ctx: &AppContext,
    moderator_id: i64,
    form: ModerationSubmission,
    errors: ModerationFormErrors,
) -> SonoraResult<AssignedPage> {
    ctx.account_manager
        .get_user(moderator_id)
        .await?
        .ok_or_else(|| SonoraError::NotFound(format!("User {} not found", moderator_id)))?;

    Ok(AssignedPage {
        moderator_id,
        moderator_tickets: ctx.ticket_manager.assigned_open_tickets(moderator_id).await?,
        form,
        errors,
        defer_messages: DEFER_MESSAGES,
        delete_messages: DELETE_MESSAGES,
    })
}

async fn assigned_tickets(
    State(ctx): State<AppContext>,
    _moderator: ModeratorAuthContext,
    Path(user_id): Path<i64>,
) -> SonoraResult<Json<AssignedPage>> {
    let page = assigned_page(
        &ctx,
        user_id,
        ModerationSubmission::default(),
        ModerationFormErrors::default(),
    )
    .await?;

    Ok(Json(page))
}

/// Apply one moderation action; invalid forms come back with their errors
async fn moderate_assigned(
    State(ctx): State<AppContext>,
    moderator: ModeratorAuthContext,
    Path(user_id): Path<i64>,
    Form(submission): Form<ModerationSubmission>,
) -> SonoraResult<Json<AssignedPage>> {
    let decision = match submission.clean() {
        Ok(decision) => decision,
        Err(errors) => {
            tracing::debug!("Moderation form rejected: {:?}", errors);
            return Ok(Json(assigned_page(&ctx, user_id, submission, errors).await?));
        }
    };

    ctx.moderation.apply(moderator.user_id, &decision).await?;

    let page = assigned_page(
        &ctx,
        user_id,
        ModerationSubmission::default(),
        ModerationFormErrors::default(),
    )
    .await?;

    Ok(Json(page))
}
