/// Front page
use crate::{context::AppContext, db::models::ForumPostSummary, error::SonoraResult};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

const LATEST_FORUM_POSTS: i64 = 5;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/", get(front_page))
}

#[derive(Debug, Serialize)]
pub struct FrontPage {
    pub rss_url: String,
    pub latest_forum_posts: Vec<ForumPostSummary>,
}

async fn front_page(State(ctx): State<AppContext>) -> SonoraResult<Json<FrontPage>> {
    let latest_forum_posts = ctx.sound_store.latest_forum_posts(LATEST_FORUM_POSTS).await?;

    Ok(Json(FrontPage {
        rss_url: ctx.config.service.rss_url.clone(),
        latest_forum_posts,
    }))
}
