/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{SonoraError, SonoraResult},
    metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::{MatchedPath, Request},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    Router,
};
use serde_json::json;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(crate::api::routes())
        .merge(crate::views::routes())
        .fallback(not_found)
        // Provide state - converts Router<AppContext> to Router<()>
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(middleware::from_fn(track_metrics))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Count requests per route template
async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> SonoraResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Sonora listening on {}", addr);
    info!("   Site domain: {}", ctx.config.service.site_domain);
    info!("   Count cache: {}", ctx.count_cache.backend());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SonoraError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| SonoraError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::test_support::test_context,
        sounds::{approve_sound, NewSound},
        tickets::{TicketSender, TicketStatus},
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::Value;
    use tower::ServiceExt;

    struct Harness {
        ctx: AppContext,
        moderator_token: String,
        uploader_id: i64,
        uploader_token: String,
    }

    async fn harness() -> Harness {
        let ctx = test_context().await;
        let moderator = ctx.account_manager.create_user("mod", None, true).await.unwrap();
        let uploader = ctx.account_manager.create_user("uploader", None, false).await.unwrap();
        let moderator_token = ctx.account_manager.create_session(moderator.id).await.unwrap().token;
        let uploader_token = ctx.account_manager.create_session(uploader.id).await.unwrap().token;

        Harness {
            ctx,
            moderator_token,
            uploader_id: uploader.id,
            uploader_token,
        }
    }

    async fn send(
        ctx: &AppContext,
        method: &str,
        uri: &str,
        token: Option<&str>,
        form: Option<&str>,
    ) -> (StatusCode, Response) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match form {
            Some(form) => {
                builder = builder.header("content-type", "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };

        let response = build_router(ctx.clone())
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn approved_sound(h: &Harness, name: &str) -> i64 {
        let id = h
            .ctx
            .sound_store
            .create_sound(
                h.uploader_id,
                NewSound {
                    original_filename: name.to_string(),
                    ..NewSound::default()
                },
            )
            .await
            .unwrap();
        let mut conn = h.ctx.db.acquire().await.unwrap();
        approve_sound(&mut conn, id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_sound_list_defaults_to_links() {
        let h = harness().await;
        approved_sound(&h, "a.wav").await;
        approved_sound(&h, "b.wav").await;

        let (status, response) = send(&h.ctx, "GET", "/apiv2/sounds/", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["next"], Value::Null);
        let first = body["results"][0].as_object().unwrap();
        let mut keys: Vec<&String> = first.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["uri", "url"]);
    }

    #[tokio::test]
    async fn test_sound_detail_respects_fields() {
        let h = harness().await;
        let id = approved_sound(&h, "a.wav").await;

        let uri = format!("/apiv2/sounds/{}/?fields=id,original_filename,nope", id);
        let (status, response) = send(&h.ctx, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);

        let body = json_body(response).await;
        let obj = body.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["original_filename"], "a.wav");

        let (status, _) = send(&h.ctx, "GET", "/apiv2/sounds/999/", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_user_detail_and_sounds() {
        let h = harness().await;
        approved_sound(&h, "a.wav").await;

        let uri = format!("/apiv2/users/{}/", h.uploader_id);
        let (status, response) = send(&h.ctx, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["username"], "uploader");

        let uri = format!("/apiv2/users/{}/sounds/?page=abc", h.uploader_id);
        let (status, response) = send(&h.ctx, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["count"], 1);
    }

    #[tokio::test]
    async fn test_anonymous_contact_ticket() {
        let h = harness().await;

        let (status, response) = send(
            &h.ctx,
            "POST",
            "/tickets/contact/",
            None,
            Some("title=Cannot+log+in&message=help&email=someone%40example.org"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ticket_created"], true);

        let tickets = h.ctx.ticket_manager.list_tickets().await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].status, TicketStatus::New);
        assert_eq!(
            tickets[0].sender,
            TicketSender::Anonymous {
                email: "someone@example.org".to_string()
            }
        );
        let comments = h.ctx.ticket_manager.comments(tickets[0].id, true).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "help");
        assert_eq!(comments[0].sender_id, None);
    }

    #[tokio::test]
    async fn test_anonymous_contact_without_email_is_rejected() {
        let h = harness().await;

        let (status, response) = send(
            &h.ctx,
            "POST",
            "/tickets/contact/",
            None,
            Some("title=Hi&message=help"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ticket_created"], false);
        assert!(body["errors"]["email"].is_array());
        assert_eq!(body["form"]["message"], "help");
        assert!(h.ctx.ticket_manager.list_tickets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ticket_list_is_moderator_only() {
        let h = harness().await;
        h.ctx
            .ticket_manager
            .create_contact_ticket(
                TicketSender::Anonymous {
                    email: "secret@example.org".to_string(),
                },
                "Private",
                "please keep this private",
            )
            .await
            .unwrap();

        let (status, _) = send(&h.ctx, "GET", "/tickets/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, response) = send(
            &h.ctx,
            "GET",
            "/tickets/",
            Some(h.uploader_token.as_str()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("secret@example.org"));

        let (status, response) = send(
            &h.ctx,
            "GET",
            "/tickets/",
            Some(h.moderator_token.as_str()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["tickets"].as_array().unwrap().len(), 1);
        assert_eq!(body["tickets"][0]["sender"]["email"], "secret@example.org");
    }

    #[tokio::test]
    async fn test_moderation_requires_moderator() {
        let h = harness().await;

        let (status, _) = send(&h.ctx, "GET", "/tickets/moderation/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &h.ctx,
            "GET",
            "/tickets/moderation/",
            Some(h.uploader_token.as_str()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &h.ctx,
            "GET",
            "/tickets/moderation/",
            Some(h.moderator_token.as_str()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_assign_then_approve_through_pages() {
        let h = harness().await;
        let sound_id = h
            .ctx
            .sound_store
            .create_sound(h.uploader_id, NewSound::default())
            .await
            .unwrap();
        let ticket = h
            .ctx
            .ticket_manager
            .create_sound_ticket(h.uploader_id, sound_id, "new sound")
            .await
            .unwrap();

        let uri = format!("/tickets/moderation/assign/{}/", h.uploader_id);
        let (status, response) = send(&h.ctx, "POST", &uri, Some(h.moderator_token.as_str()), None).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"].to_str().unwrap(),
            "/tickets/moderation/"
        );

        let moderator_id = h
            .ctx
            .ticket_manager
            .get_ticket(ticket.id)
            .await
            .unwrap()
            .unwrap()
            .assignee_id
            .unwrap();
        let uri = format!("/tickets/moderation/assigned/{}/", moderator_id);

        // Invalid forms change nothing and come back with errors
        let bad = format!("action=Approve&ticket={}&defer-predefined=nope", ticket.id);
        let (status, response) = send(&h.ctx, "POST", &uri, Some(h.moderator_token.as_str()), Some(bad.as_str())).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["errors"]["defer_message"]["predefined"].is_array());
        assert_eq!(body["form"]["defer-predefined"], "nope");
        assert_eq!(body["moderator_tickets"].as_array().unwrap().len(), 1);

        let good = format!(
            "action=Approve&ticket={}&delete-predefined=duplicate&defer-predefined=approved&defer-custom=&return-custom=",
            ticket.id
        );
        let (status, response) = send(&h.ctx, "POST", &uri, Some(h.moderator_token.as_str()), Some(good.as_str())).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["moderator_tickets"].as_array().unwrap().is_empty());

        let stored = h.ctx.ticket_manager.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Closed);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let h = harness().await;

        let (status, _) = send(&h.ctx, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.ctx, "GET", "/metrics", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.ctx, "GET", "/no/such/page", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
