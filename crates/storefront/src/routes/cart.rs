//! Cart and checkout route handlers.
//!
//! Every handler here requires a logged-in user. Mutations are plain form
//! posts followed by a redirect; the service rebuilds the session cart view
//! before the redirect is sent.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use cartwheel_core::ProductId;

use super::products::ProductView;
use super::{Layout, MessageQuery};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{CartItem, CartSummary, CheckoutReceipt};
use crate::state::AppState;

/// Cart item display data for templates.
#[derive(Debug, Clone)]
pub struct CartItemView {
    pub product: ProductView,
    pub quantity: u32,
    pub line_total: String,
}

impl From<&CartItem> for CartItemView {
    fn from(item: &CartItem) -> Self {
        Self {
            product: ProductView::from(&item.product),
            quantity: item.quantity.get(),
            line_total: format!("${}", item.line_total()),
        }
    }
}

/// Cart display data for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total: String,
    pub item_count: u32,
}

impl From<&CartSummary> for CartView {
    fn from(summary: &CartSummary) -> Self {
        Self {
            items: summary.items.iter().map(CartItemView::from).collect(),
            total: format!("${}", summary.total),
            item_count: summary.item_count(),
        }
    }
}

impl From<&CheckoutReceipt> for CartView {
    fn from(receipt: &CheckoutReceipt) -> Self {
        Self {
            items: receipt.items.iter().map(CartItemView::from).collect(),
            total: format!("${}", receipt.total),
            item_count: receipt.item_count,
        }
    }
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: Layout,
    pub cart: CartView,
}

/// Checkout review template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/checkout.html")]
pub struct CheckoutTemplate {
    pub layout: Layout,
    pub cart: CartView,
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/thankyou.html")]
pub struct ThankYouTemplate {
    pub layout: Layout,
    pub receipt: CartView,
}

/// Where to send the user after adding to the cart.
///
/// Only same-site referrers are honoured; anything else lands on the cart.
/// Browsers read `\` as `/`, so a path containing one could still turn into
/// a protocol-relative URL and is refused.
fn redirect_target(headers: &HeaderMap, base_url: &str) -> String {
    let referer = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok());

    referer
        .and_then(|r| r.strip_prefix(base_url.trim_end_matches('/')))
        .filter(|path| {
            path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control)
        })
        .map_or_else(|| "/cart".to_string(), ToString::to_string)
}

/// Display the cart page.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<impl IntoResponse> {
    let summary = state.cart().summary(Some(user.id)).await?;
    let auth = OptionalAuth(Some(user));

    Ok(CartShowTemplate {
        layout: Layout::load(&auth, &session, &MessageQuery::default()).await,
        cart: CartView::from(&summary),
    })
}

/// Add one unit of a product to the cart.
#[instrument(skip_all, fields(user_id = %user.id, product_id = %product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(product_id): Path<ProductId>,
    headers: HeaderMap,
) -> Result<Redirect> {
    state
        .cart()
        .add(Some(user.id), product_id, &session)
        .await?;

    let id = product_id.to_string();
    add_breadcrumb("cart", "Added product", Some(&[("product_id", id.as_str())][..]));

    Ok(Redirect::to(&redirect_target(
        &headers,
        &state.config().base_url,
    )))
}

/// Remove one unit of a product from the cart.
#[instrument(skip_all, fields(user_id = %user.id, product_id = %product_id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
    Path(product_id): Path<ProductId>,
) -> Result<Redirect> {
    state
        .cart()
        .remove(Some(user.id), product_id, &session)
        .await?;

    Ok(Redirect::to("/cart"))
}

/// Display the checkout review page.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout_page(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<impl IntoResponse> {
    let summary = state.cart().summary(Some(user.id)).await?;
    let auth = OptionalAuth(Some(user));

    Ok(CheckoutTemplate {
        layout: Layout::load(&auth, &session, &MessageQuery::default()).await,
        cart: CartView::from(&summary),
    })
}

/// Place the order: empty the cart and show what was bought.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    session: Session,
) -> Result<Response> {
    let receipt = state.cart().checkout(Some(user.id), &session).await?;

    // Nothing to order; send them back to the (empty) cart
    if receipt.is_empty() {
        return Ok(Redirect::to("/cart").into_response());
    }

    add_breadcrumb("cart", "Checked out", None);

    let auth = OptionalAuth(Some(user));
    Ok(ThankYouTemplate {
        layout: Layout::load(&auth, &session, &MessageQuery::default()).await,
        receipt: CartView::from(&receipt),
    }
    .into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_referer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_redirect_back_to_same_site_referer() {
        let headers = with_referer("http://localhost:5000/product/7");
        assert_eq!(
            redirect_target(&headers, "http://localhost:5000"),
            "/product/7"
        );

        let headers = with_referer("http://localhost:5000/?page=2");
        assert_eq!(redirect_target(&headers, "http://localhost:5000/"), "/?page=2");
    }

    #[test]
    fn test_foreign_or_missing_referer_goes_to_cart() {
        assert_eq!(
            redirect_target(&HeaderMap::new(), "http://localhost:5000"),
            "/cart"
        );
        let headers = with_referer("https://evil.example/phish");
        assert_eq!(redirect_target(&headers, "http://localhost:5000"), "/cart");

        let headers = with_referer("http://localhost:5000//evil.example");
        assert_eq!(redirect_target(&headers, "http://localhost:5000"), "/cart");
    }

    #[test]
    fn test_backslash_referer_goes_to_cart() {
        for referer in [
            "http://localhost:5000/\\evil.example",
            "http://localhost:5000\\\\evil.example",
            "http://localhost:5000/\\/evil.example/path",
        ] {
            let headers = with_referer(referer);
            assert_eq!(
                redirect_target(&headers, "http://localhost:5000"),
                "/cart",
                "{referer}"
            );
        }
    }
}
