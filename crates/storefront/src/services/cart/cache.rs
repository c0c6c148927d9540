//! Session-scoped cart view cache.
//!
//! The session holds a flattened copy of the cart for cheap display. It is
//! only ever replaced wholesale from the persisted lines, so it can be
//! dropped at any time and rebuilt.

use async_trait::async_trait;
use parking_lot::Mutex;
use tower_sessions::Session;

use crate::models::{SessionCartView, session_keys};

/// Error type for session cache writes.
pub type CacheError = tower_sessions::session::Error;

/// Per-session storage for the cart view.
#[async_trait]
pub trait SessionCartCache: Send + Sync {
    /// Replace the cached view.
    async fn store(&self, view: &SessionCartView) -> Result<(), CacheError>;

    /// The cached view, if one has been stored.
    async fn load(&self) -> Result<Option<SessionCartView>, CacheError>;

    /// Forget the cached view.
    async fn clear(&self) -> Result<(), CacheError>;
}

#[async_trait]
impl SessionCartCache for Session {
    async fn store(&self, view: &SessionCartView) -> Result<(), CacheError> {
        self.insert(session_keys::CART, view).await
    }

    async fn load(&self) -> Result<Option<SessionCartView>, CacheError> {
        self.get::<SessionCartView>(session_keys::CART).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.remove::<SessionCartView>(session_keys::CART).await?;
        Ok(())
    }
}

/// Cache held in memory, standing in for a session in tests and tooling.
#[derive(Debug, Default)]
pub struct MemorySessionCart {
    view: Mutex<Option<SessionCartView>>,
}

impl MemorySessionCart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently cached view.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionCartView> {
        self.view.lock().clone()
    }
}

#[async_trait]
impl SessionCartCache for MemorySessionCart {
    async fn store(&self, view: &SessionCartView) -> Result<(), CacheError> {
        *self.view.lock() = Some(view.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<SessionCartView>, CacheError> {
        Ok(self.snapshot())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.view.lock().take();
        Ok(())
    }
}
