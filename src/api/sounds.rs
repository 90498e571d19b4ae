/// Sound resources
use crate::{
    api::{
        serializer_context, serializers::{defaults, FieldSelection, FieldSerializer, SoundSerializer},
        sound_list, ApiQuery, ListResponse,
    },
    context::AppContext,
    error::{SonoraError, SonoraResult},
    sounds::moderation_state,
    urls::names,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};

/// Build sound routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/apiv2/sounds/", get(list_sounds))
        .route("/apiv2/sounds/:id/", get(get_sound))
}

/// Approved sounds, newest first
async fn list_sounds(
    State(ctx): State<AppContext>,
    Query(query): Query<ApiQuery>,
) -> SonoraResult<Json<ListResponse>> {
    let list_url = ctx
        .absolute_url(names::API_SOUND_LIST, &[])
        .ok_or_else(|| SonoraError::Internal("Sound list route missing".to_string()))?;

    let source = ctx.sound_store.approved(None);
    let body = sound_list(&ctx, &source, &list_url, &query).await?;

    Ok(Json(body))
}

/// One approved sound; every field unless `fields` narrows it
async fn get_sound(
    State(ctx): State<AppContext>,
    Path(sound_id): Path<i64>,
    Query(query): Query<ApiQuery>,
) -> SonoraResult<Json<Map<String, Value>>> {
    let sound = ctx
        .sound_store
        .get_sound(sound_id)
        .await?
        .filter(|sound| sound.moderation_state == moderation_state::OK)
        .ok_or_else(|| SonoraError::NotFound(format!("Sound {} not found", sound_id)))?;

    let selection = FieldSelection::for_request(query.fields.as_deref(), defaults::SOUND_DETAIL);
    let ser_ctx = serializer_context(&ctx);

    Ok(Json(SoundSerializer::new(&ser_ctx).serialize(&sound, &selection)))
}
