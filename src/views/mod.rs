/// Page handlers
///
/// Pages answer with their page context as JSON: the data a template would
/// be rendered from. Form posts are url-encoded and come back with the
/// submitted values plus errors when they do not validate.
pub mod front;
pub mod moderation;
pub mod tickets;

use crate::context::AppContext;
use axum::Router;

/// Build page routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(front::routes())
        .merge(tickets::routes())
        .merge(moderation::routes())
}
