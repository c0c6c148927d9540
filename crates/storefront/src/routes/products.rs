//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tower_sessions::Session;
use tracing::instrument;

use cartwheel_core::ProductId;

use super::{Layout, MessageQuery};
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::Product;
use crate::state::AppState;

/// Product display data for templates.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: String,
    pub image_url: String,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            price: format!("${}", product.price),
            image_url: product.image_url.clone(),
        }
    }
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub layout: Layout,
    pub product: ProductView,
}

/// Display a single product.
#[instrument(skip(state, auth, session))]
pub async fn show(
    State(state): State<AppState>,
    auth: OptionalAuth,
    session: Session,
    Path(id): Path<ProductId>,
    Query(messages): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    Ok(ProductShowTemplate {
        layout: Layout::load(&auth, &session, &messages).await,
        product: ProductView::from(&product),
    })
}
