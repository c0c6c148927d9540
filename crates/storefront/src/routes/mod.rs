//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Catalog index (?page=N)
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database ping)
//!
//! # Products
//! GET  /product/{id}           - Product detail
//!
//! # Cart (requires auth)
//! GET  /cart                   - Cart page
//! POST /cart/add/{id}          - Add one unit, redirect back
//! POST /cart/remove/{id}       - Remove one unit, redirect to cart
//!
//! # Checkout (requires auth)
//! GET  /checkout               - Review cart before ordering
//! POST /checkout               - Place order, render thank-you page
//!
//! # Auth
//! GET  /auth/signup            - Signup page
//! POST /auth/signup            - Signup action
//! GET  /auth/login             - Login page
//! POST /auth/login             - Login action
//! POST /auth/logout            - Logout action
//! ```

pub mod auth;
pub mod cart;
pub mod health;
pub mod home;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tower_sessions::{Session, SessionManagerLayer, SessionStore};

use crate::middleware::OptionalAuth;
use crate::services::SessionCartCache;
use crate::state::AppState;

// =============================================================================
// Shared page data
// =============================================================================

/// Flash message codes carried in the query string after a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Human-readable text for a success code.
fn success_message(code: &str) -> Option<&'static str> {
    match code {
        "account_created" => Some("Account created! Please log in."),
        "logged_in" => Some("Logged in successfully."),
        "logged_out" => Some("You have been logged out."),
        _ => None,
    }
}

/// Human-readable text for an error code.
fn error_message(code: &str) -> Option<&'static str> {
    match code {
        "credentials" => Some("Invalid email or password."),
        "login_required" => Some("Please log in to continue."),
        "session" => Some("Something went wrong with your session. Please try again."),
        "password_mismatch" => Some("Passwords do not match."),
        "weak_password" => Some("Password must be at least 8 characters."),
        "invalid_email" => Some("Please enter a valid email address."),
        "invalid_username" => Some(
            "Username must be 3-32 characters: letters, numbers, '_', '-' or '.'.",
        ),
        "username_taken" => Some("That username is already taken."),
        "email_taken" => Some("An account with this email already exists."),
        "signup_failed" => Some("Could not create your account. Please try again."),
        _ => None,
    }
}

/// Data every page layout needs: who is logged in, the cart badge, and any
/// flash message.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub username: Option<String>,
    pub cart_count: usize,
    pub success: Option<&'static str>,
    pub error: Option<&'static str>,
}

impl Layout {
    /// Build the layout for the current request.
    ///
    /// The cart badge comes from the session cache, not the store.
    pub async fn load(auth: &OptionalAuth, session: &Session, messages: &MessageQuery) -> Self {
        let cart_count = if auth.0.is_some() {
            match SessionCartCache::load(session).await {
                Ok(view) => view.map_or(0, |v| v.len()),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read cart from session");
                    0
                }
            }
        } else {
            0
        };

        Self {
            username: auth.0.as_ref().map(|user| user.username.to_string()),
            cart_count,
            success: messages.success.as_deref().and_then(success_message),
            error: messages.error.as_deref().and_then(error_message),
        }
    }
}

// =============================================================================
// Routers
// =============================================================================

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/signup", get(auth::signup_page).post(auth::signup))
        .route("/logout", post(auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add/{id}", post(cart::add))
        .route("/remove/{id}", post(cart::remove))
}

/// Create all page routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/product/{id}", get(products::show))
        .nest("/cart", cart_routes())
        .route("/checkout", get(cart::checkout_page).post(cart::checkout))
        .nest("/auth", auth_routes())
}

/// Assemble the full application over any session store.
pub fn app<S>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router
where
    S: SessionStore + Clone,
{
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(routes())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
