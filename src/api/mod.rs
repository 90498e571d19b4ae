/// Public API v2 routes and handlers
pub mod health;
pub mod serializers;
pub mod sounds;
pub mod users;

use crate::{
    api::serializers::{FieldSelection, FieldSerializer, SerializerContext, SoundSerializer},
    context::AppContext,
    db::models::Sound,
    error::SonoraResult,
    pagination::{paginate, CountStrategy, Page},
    sounds::SoundQuery,
};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(sounds::routes())
        .merge(users::routes())
        .merge(health::routes())
}

/// Query parameters shared by API views
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiQuery {
    pub fields: Option<String>,
    pub page: Option<String>,
}

/// Paginated list body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Map<String, Value>>,
}

pub(crate) fn serializer_context(ctx: &AppContext) -> SerializerContext<'_> {
    SerializerContext {
        urls: ctx.urls.as_ref(),
        site_domain: &ctx.config.service.site_domain,
        analysis_directory: &ctx.config.storage.analysis_directory,
    }
}

/// Link to another page of a list, keeping the caller's `fields`
fn page_link(list_url: &str, page: i64, fields: Option<&str>) -> String {
    match fields {
        Some(fields) => format!(
            "{}?page={}&fields={}",
            list_url,
            page,
            urlencoding::encode(fields)
        ),
        None => format!("{}?page={}", list_url, page),
    }
}

fn list_response(
    page: &Page<Map<String, Value>>,
    list_url: &str,
    fields: Option<&str>,
) -> ListResponse {
    ListResponse {
        count: page.paginator.count,
        next: page
            .has_next()
            .then(|| page_link(list_url, page.current_page + 1, fields)),
        previous: page
            .has_previous()
            .then(|| page_link(list_url, page.current_page - 1, fields)),
        results: page.items.clone(),
    }
}

/// Serialize one page of approved sounds in the list view shape
pub(crate) async fn sound_list(
    ctx: &AppContext,
    source: &SoundQuery,
    list_url: &str,
    query: &ApiQuery,
) -> SonoraResult<ListResponse> {
    let page: Page<Sound> = paginate(
        source,
        ctx.config.listing.page_size,
        query.page.as_deref(),
        CountStrategy::Cached {
            cache: ctx.count_cache.as_ref(),
            ttl: ctx.count_cache_ttl(),
        },
    )
    .await?;

    let selection = FieldSelection::for_request(
        query.fields.as_deref(),
        serializers::defaults::SOUND_LIST,
    );
    let ser_ctx = serializer_context(ctx);
    let serializer = SoundSerializer::new(&ser_ctx);
    let page = page.map(|sound| serializer.serialize(&sound, &selection));

    Ok(list_response(&page, list_url, query.fields.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Paginator;

    #[test]
    fn test_list_links_keep_fields() {
        let page = Page {
            items: vec![Map::new()],
            current_page: 2,
            paginator: Paginator::new(50, 20),
        };

        let body = list_response(&page, "http://sonora.test/apiv2/sounds/", Some("id,uri"));
        assert_eq!(body.count, 50);
        assert_eq!(
            body.next.as_deref(),
            Some("http://sonora.test/apiv2/sounds/?page=3&fields=id%2Curi")
        );
        assert_eq!(
            body.previous.as_deref(),
            Some("http://sonora.test/apiv2/sounds/?page=1&fields=id%2Curi")
        );
    }

    #[test]
    fn test_single_page_has_no_links() {
        let page: Page<Map<String, Value>> = Page {
            items: vec![],
            current_page: 1,
            paginator: Paginator::new(0, 20),
        };

        let body = list_response(&page, "http://sonora.test/apiv2/sounds/", None);
        assert_eq!(body.next, None);
        assert_eq!(body.previous, None);
    }
}
