//! Catalog index route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::products::ProductView;
use super::{Layout, MessageQuery};
use crate::error::Result;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Index query parameters.
///
/// `page` is kept as a string so a malformed value falls back to the first
/// page instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    pub page: Option<String>,
    #[serde(flatten)]
    pub messages: MessageQuery,
}

impl IndexQuery {
    fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(1)
    }
}

/// Page navigation for the catalog listing.
#[derive(Debug, Clone)]
pub struct PaginationView {
    pub page: u32,
    pub total_pages: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

/// Catalog index template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub layout: Layout,
    pub products: Vec<ProductView>,
    pub pagination: PaginationView,
}

/// Display one page of the catalog.
#[instrument(skip(state, auth, session))]
pub async fn index(
    State(state): State<AppState>,
    auth: OptionalAuth,
    session: Session,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse> {
    let page_size = state.config().catalog.page_size;
    let page = state.catalog().list(query.page(), page_size).await?;

    let pagination = PaginationView {
        page: page.page,
        total_pages: page.total_pages(),
        prev_page: page.has_prev().then(|| page.page - 1),
        next_page: page.has_next().then(|| page.page + 1),
    };

    Ok(IndexTemplate {
        layout: Layout::load(&auth, &session, &query.messages).await,
        products: page.products.iter().map(ProductView::from).collect(),
        pagination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_page_falls_back_to_first() {
        let query = IndexQuery {
            page: Some("abc".to_string()),
            ..IndexQuery::default()
        };
        assert_eq!(query.page(), 1);

        let query = IndexQuery {
            page: Some("3".to_string()),
            ..IndexQuery::default()
        };
        assert_eq!(query.page(), 3);
    }
}
