/// User resources
use crate::{
    api::{
        serializer_context, serializers::{defaults, FieldSelection, FieldSerializer, UserSerializer},
        sound_list, ApiQuery, ListResponse,
    },
    context::AppContext,
    db::models::User,
    error::{SonoraError, SonoraResult},
    urls::names,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/apiv2/users/:id/", get(get_user))
        .route("/apiv2/users/:id/sounds/", get(list_user_sounds))
}

async fn require_user(ctx: &AppContext, user_id: i64) -> SonoraResult<User> {
    ctx.account_manager
        .get_user(user_id)
        .await?
        .ok_or_else(|| SonoraError::NotFound(format!("User {} not found", user_id)))
}

async fn get_user(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
    Query(query): Query<ApiQuery>,
) -> SonoraResult<Json<Map<String, Value>>> {
    let user = require_user(&ctx, user_id).await?;

    let selection = FieldSelection::for_request(query.fields.as_deref(), defaults::USER_DETAIL);
    let ser_ctx = serializer_context(&ctx);

    Ok(Json(UserSerializer::new(&ser_ctx).serialize(&user, &selection)))
}

/// A user's approved sounds
async fn list_user_sounds(
    State(ctx): State<AppContext>,
    Path(user_id): Path<i64>,
    Query(query): Query<ApiQuery>,
) -> SonoraResult<Json<ListResponse>> {
    let user = require_user(&ctx, user_id).await?;
    let list_url = ctx
        .absolute_url(names::API_USER_SOUND_LIST, &[&user.id.to_string()])
        .ok_or_else(|| SonoraError::Internal("User sound list route missing".to_string()))?;

    let source = ctx.sound_store.approved(Some(user.id));
    let body = sound_list(&ctx, &source, &list_url, &query).await?;

    Ok(Json(body))
}
