//! Integration test harness for Cartwheel.
//!
//! Router tests drive the full storefront `Router` in-process with
//! `tower::ServiceExt::oneshot`. Carts and the catalog are in memory and
//! sessions use `tower_sessions::MemoryStore`, so those tests need no
//! external services.
//!
//! Repository tests need a `PostgreSQL` database. Point
//! `CARTWHEEL_TEST_DATABASE_URL` at a disposable database and they will
//! run the migrations and exercise the real SQL; without it they return
//! early.
//!
//! Run with: `cargo test -p cartwheel-integration-tests`

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use secrecy::SecretString;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_sessions::cookie::time::{Duration as CookieDuration, OffsetDateTime};
use tower_sessions::session::{Id, Record};
use tower_sessions::{MemoryStore, SessionStore};

use cartwheel_core::{Email, Price, ProductId, UserId, Username};
use cartwheel_storefront::config::{CatalogConfig, StorefrontConfig};
use cartwheel_storefront::db::MIGRATOR;
use cartwheel_storefront::middleware::session::SESSION_COOKIE_NAME;
use cartwheel_storefront::middleware::session_layer_with_store;
use cartwheel_storefront::models::{CurrentUser, Product, SessionCartView, session_keys};
use cartwheel_storefront::routes;
use cartwheel_storefront::services::{MemoryCartStore, MemoryCatalog};
use cartwheel_storefront::state::AppState;

/// Environment variable naming the repository test database.
pub const TEST_DATABASE_URL_VAR: &str = "CARTWHEEL_TEST_DATABASE_URL";

/// Public URL the test config advertises.
pub const TEST_BASE_URL: &str = "http://localhost:5000";

/// Nothing listens here; router tests never reach the database.
const UNREACHABLE_DATABASE_URL: &str = "postgres://cartwheel@127.0.0.1:1/cartwheel_unreachable";

/// Storefront config suitable for in-process tests.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from(UNREACHABLE_DATABASE_URL),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 5000,
        base_url: TEST_BASE_URL.to_string(),
        session_secret: SecretString::from("kP9#vL2$mQ7!xR4@nT8%wZ3^bY6&cJ1*"),
        catalog: CatalogConfig::default(),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Build a catalog product priced in cents.
#[must_use]
pub fn product(id: i32, name: &str, cents: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: format!("{name} for testing"),
        price: Price::from_cents(cents),
        image_url: format!("/static/img/{id}.png"),
    }
}

/// Build a session identity for `id`.
///
/// # Panics
///
/// Panics if `name` is not a valid username.
#[must_use]
pub fn shopper(id: i32, name: &str) -> CurrentUser {
    CurrentUser {
        id: UserId::new(id),
        username: Username::parse(name).expect("valid test username"),
        email: Email::parse(&format!("{name}@example.com")).expect("valid test email"),
    }
}

/// Suffix that keeps rows from concurrent test runs apart.
#[must_use]
pub fn unique_suffix() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!("{nanos}{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Connect to the repository test database and run migrations.
///
/// Returns `None` when `CARTWHEEL_TEST_DATABASE_URL` is unset.
///
/// # Panics
///
/// Panics if the variable is set but the database is unusable.
pub async fn test_pool() -> Option<PgPool> {
    let url = std::env::var(TEST_DATABASE_URL_VAR).ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
        .expect("connect to test database");
    MIGRATOR.run(&pool).await.expect("run migrations");
    Some(pool)
}

/// A logged-in browser session planted directly in the session store.
#[derive(Debug, Clone)]
pub struct TestSession {
    pub id: Id,
    pub cookie: String,
}

/// The storefront router over in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub sessions: MemoryStore,
    pub carts: Arc<MemoryCartStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub state: AppState,
}

impl TestApp {
    /// Build the app with `products` in the catalog.
    ///
    /// # Panics
    ///
    /// Panics if the lazy pool URL does not parse.
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        let config = test_config();
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy(UNREACHABLE_DATABASE_URL)
            .expect("lazy pool");

        let carts = Arc::new(MemoryCartStore::new());
        let catalog = Arc::new(MemoryCatalog::with_products(products));
        let sessions = MemoryStore::default();

        let state = AppState::with_backends(config.clone(), pool, carts.clone(), catalog.clone());
        let router = routes::app(
            state.clone(),
            session_layer_with_store(sessions.clone(), &config),
        );

        Self {
            router,
            sessions,
            carts,
            catalog,
            state,
        }
    }

    /// Create a session already holding `user` and return its cookie.
    ///
    /// # Panics
    ///
    /// Panics if the session store rejects the record.
    pub async fn login(&self, user: &CurrentUser) -> TestSession {
        let mut data = HashMap::new();
        data.insert(
            session_keys::CURRENT_USER.to_string(),
            serde_json::to_value(user).expect("serialize user"),
        );

        let mut record = Record {
            id: Id::default(),
            data,
            expiry_date: OffsetDateTime::now_utc() + CookieDuration::hours(1),
        };
        self.sessions
            .create(&mut record)
            .await
            .expect("create session");

        TestSession {
            id: record.id,
            cookie: format!("{SESSION_COOKIE_NAME}={}", record.id),
        }
    }

    /// The cart view currently cached in a session.
    ///
    /// # Panics
    ///
    /// Panics if the store fails or the cached value does not deserialize.
    pub async fn cached_cart(&self, session: &TestSession) -> Option<SessionCartView> {
        let record = self
            .sessions
            .load(&session.id)
            .await
            .expect("load session")?;
        record
            .data
            .get(session_keys::CART)
            .cloned()
            .map(|value| serde_json::from_value(value).expect("cart view"))
    }

    /// Send a request through the router.
    ///
    /// # Panics
    ///
    /// Panics if the router itself fails, which axum routers never do.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router")
    }

    /// `GET path`, optionally as a logged-in session.
    pub async fn get(&self, path: &str, session: Option<&TestSession>) -> Response<Body> {
        self.send(build_request("GET", path, session)).await
    }

    /// `POST path` with an empty form body, optionally as a logged-in session.
    pub async fn post(&self, path: &str, session: Option<&TestSession>) -> Response<Body> {
        self.send(build_request("POST", path, session)).await
    }
}

fn build_request(method: &str, path: &str, session: Option<&TestSession>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if method == "POST" {
        builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    }
    if let Some(session) = session {
        builder = builder.header(header::COOKIE, session.cookie.as_str());
    }
    builder.body(Body::empty()).expect("valid request")
}

/// Read a response body as UTF-8 text.
///
/// # Panics
///
/// Panics if the body cannot be read or is not UTF-8.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}
