//! Authentication route handlers.
//!
//! Handles signup, password login and logout. Outcomes are reported back
//! through `?success=` / `?error=` codes on the redirect target.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{Layout, MessageQuery};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::{AuthError, AuthService, SessionCartCache};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Signup form data.
#[derive(Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
}

/// Signup page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub layout: Layout,
}

/// Error code for a failed signup.
fn signup_error_code(err: &AuthError) -> &'static str {
    match err {
        AuthError::PasswordMismatch => "password_mismatch",
        AuthError::WeakPassword(_) => "weak_password",
        AuthError::InvalidEmail(_) => "invalid_email",
        AuthError::InvalidUsername(_) => "invalid_username",
        AuthError::UserAlreadyExists(msg) if msg.contains("username") => "username_taken",
        AuthError::UserAlreadyExists(_) => "email_taken",
        _ => "signup_failed",
    }
}

// =============================================================================
// Signup Routes
// =============================================================================

/// Display the signup page.
pub async fn signup_page(
    auth: OptionalAuth,
    session: Session,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    SignupTemplate {
        layout: Layout::load(&auth, &session, &query).await,
    }
}

/// Handle signup form submission.
///
/// The new account is not logged in; the user is sent to the login page.
#[instrument(skip_all, fields(username = %form.username))]
pub async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let auth = AuthService::new(state.pool());

    match auth
        .signup(
            &form.username,
            &form.email,
            &form.password,
            &form.confirm_password,
        )
        .await
    {
        Ok(_) => Redirect::to("/auth/login?success=account_created").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Signup failed");
            Redirect::to(&format!("/auth/signup?error={}", signup_error_code(&e))).into_response()
        }
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    auth: OptionalAuth,
    session: Session,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    LoginTemplate {
        layout: Layout::load(&auth, &session, &query).await,
    }
}

/// Handle login form submission.
///
/// On success the session identity is set and the cart view is rebuilt from
/// the user's persisted cart.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = AuthService::new(state.pool());

    let user = match auth.login(&form.email, &form.password).await {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            tracing::info!("Login rejected: invalid credentials");
            return Redirect::to("/auth/login?error=credentials").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Login failed");
            return Redirect::to("/auth/login?error=session").into_response();
        }
    };

    let current = CurrentUser::from(&user);
    if let Err(e) = set_current_user(&session, &current).await {
        tracing::error!(error = %e, "Failed to set session");
        return Redirect::to("/auth/login?error=session").into_response();
    }

    if let Err(e) = state.cart().refresh_cache(Some(user.id), &session).await {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to load cart at login");
    }

    set_sentry_user(&user.id, Some(user.username.as_str()));
    tracing::info!(user_id = %user.id, "User logged in");

    Redirect::to("/?success=logged_in").into_response()
}

// =============================================================================
// Logout Route
// =============================================================================

/// Handle logout.
///
/// Clears the identity and the cached cart, then destroys the session.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!(error = %e, "Failed to clear session user");
    }

    if let Err(e) = SessionCartCache::clear(&session).await {
        tracing::error!(error = %e, "Failed to clear session cart");
    }

    if let Err(e) = session.flush().await {
        tracing::error!(error = %e, "Failed to flush session");
    }

    clear_sentry_user();

    Redirect::to("/?success=logged_out").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_error_codes() {
        assert_eq!(
            signup_error_code(&AuthError::PasswordMismatch),
            "password_mismatch"
        );
        assert_eq!(
            signup_error_code(&AuthError::UserAlreadyExists(
                "username already exists".into()
            )),
            "username_taken"
        );
        assert_eq!(
            signup_error_code(&AuthError::UserAlreadyExists("email already exists".into())),
            "email_taken"
        );
        assert_eq!(signup_error_code(&AuthError::PasswordHash), "signup_failed");
    }
}
