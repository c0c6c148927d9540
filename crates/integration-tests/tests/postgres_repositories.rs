//! Integration tests for the `PostgreSQL` repositories.
//!
//! These tests require:
//! - A running `PostgreSQL` database
//! - `CARTWHEEL_TEST_DATABASE_URL` pointing at it (migrations run automatically)
//!
//! Without the variable every test returns immediately.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;

use cartwheel_core::{Email, Price, ProductId, Username};
use cartwheel_integration_tests::{test_pool, unique_suffix};
use cartwheel_storefront::db::products::NewProduct;
use cartwheel_storefront::db::{PgCartStore, PgCatalog, UserRepository};
use cartwheel_storefront::models::User;
use cartwheel_storefront::services::{
    AuthError, AuthService, CartError, CartService, CartStore, Catalog, MemorySessionCart,
    StoreError,
};

async fn create_user(pool: &PgPool) -> User {
    let suffix = unique_suffix();
    UserRepository::new(pool)
        .create_with_password(
            &Username::parse(&format!("shopper{suffix}")).unwrap(),
            &Email::parse(&format!("shopper{suffix}@example.com")).unwrap(),
            "not-a-real-hash",
        )
        .await
        .unwrap()
}

async fn create_product(catalog: &PgCatalog, name: &str, cents: u32) -> ProductId {
    catalog
        .insert(&NewProduct {
            name: format!("{name} {}", unique_suffix()),
            description: String::new(),
            price: Price::from_cents(cents),
            image_url: String::new(),
        })
        .await
        .unwrap()
        .id
}

// ============================================================================
// Cart store
// ============================================================================

#[tokio::test]
async fn test_pg_increment_and_decrement() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let store = PgCartStore::new(pool.clone());
    let product = ProductId::new(7);

    assert_eq!(store.upsert_increment(user.id, product, 1).await.unwrap().get(), 1);
    assert_eq!(store.upsert_increment(user.id, product, 2).await.unwrap().get(), 3);
    assert_eq!(store.decrement_or_delete(user.id, product, 1).await.unwrap(), 2);
    assert_eq!(store.decrement_or_delete(user.id, product, 5).await.unwrap(), 0);
    assert!(store.get_line(user.id, product).await.unwrap().is_none());

    // Absent line: no-op
    assert_eq!(store.decrement_or_delete(user.id, product, 1).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pg_zero_delta_on_absent_line_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let store = PgCartStore::new(pool.clone());

    let err = store
        .upsert_increment(user.id, ProductId::new(1), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidQuantity { .. }));
}

#[tokio::test]
async fn test_pg_overflowing_quantity_is_rejected() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let store = PgCartStore::new(pool.clone());
    let product = ProductId::new(1);

    store
        .upsert_increment(user.id, product, i32::MAX.unsigned_abs())
        .await
        .unwrap();
    let err = store.upsert_increment(user.id, product, 1).await.unwrap_err();

    assert!(matches!(err, StoreError::InvalidQuantity { .. }));
    assert_eq!(
        store.get_line(user.id, product).await.unwrap().unwrap().quantity.get(),
        i32::MAX.unsigned_abs()
    );
}

#[tokio::test]
async fn test_pg_concurrent_increments_are_not_lost() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let store = Arc::new(PgCartStore::new(pool.clone()));
    let product = ProductId::new(11);

    let tasks: Vec<_> = (0..24)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.upsert_increment(user.id, product, 1).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let lines = store.list_lines(user.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity.get(), 24);
}

#[tokio::test]
async fn test_pg_drain_returns_lines_in_order_and_empties_cart() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let other = create_user(&pool).await;
    let store = PgCartStore::new(pool.clone());

    for id in [5, 2, 9] {
        store.upsert_increment(user.id, ProductId::new(id), 1).await.unwrap();
    }
    store.upsert_increment(user.id, ProductId::new(2), 1).await.unwrap();
    store.upsert_increment(other.id, ProductId::new(5), 4).await.unwrap();

    let drained = store.drain(user.id).await.unwrap();
    let order: Vec<i32> = drained.iter().map(|l| l.product_id.as_i32()).collect();
    assert_eq!(order, [5, 2, 9]);
    assert_eq!(drained[1].quantity.get(), 2);

    assert!(store.list_lines(user.id).await.unwrap().is_empty());
    assert!(store.drain(user.id).await.unwrap().is_empty());
    assert_eq!(store.list_lines(other.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pg_clear_counts_deleted_lines() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let store = PgCartStore::new(pool.clone());

    for id in [1, 2, 3] {
        store.upsert_increment(user.id, ProductId::new(id), 2).await.unwrap();
    }

    assert_eq!(store.clear(user.id).await.unwrap(), 3);
    assert_eq!(store.clear(user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pg_restore_merges_drained_lines_atomically() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let store = PgCartStore::new(pool.clone());
    let (p1, p2, p3) = (ProductId::new(1), ProductId::new(2), ProductId::new(3));

    store.upsert_increment(user.id, p1, 2).await.unwrap();
    store.upsert_increment(user.id, p2, 1).await.unwrap();
    let drained = store.drain(user.id).await.unwrap();

    store.upsert_increment(user.id, p1, 1).await.unwrap();
    store.upsert_increment(user.id, p3, 1).await.unwrap();
    store.restore(user.id, &drained).await.unwrap();

    let mut lines: Vec<(i32, u32)> = store
        .list_lines(user.id)
        .await
        .unwrap()
        .iter()
        .map(|l| (l.product_id.as_i32(), l.quantity.get()))
        .collect();
    lines.sort_unstable();
    assert_eq!(lines, [(1, 3), (2, 1), (3, 1)]);

    // One overflowing line rolls back the whole restore
    let drained = store.drain(user.id).await.unwrap();
    store
        .upsert_increment(user.id, p2, i32::MAX.unsigned_abs())
        .await
        .unwrap();
    let err = store.restore(user.id, &drained).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidQuantity { product_id, .. } if product_id == p2));
    let lines = store.list_lines(user.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id, p2);
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_pg_catalog_lookup_and_pages() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let catalog = PgCatalog::new(pool.clone());
    let id = create_product(&catalog, "Enamel Mug", 1250).await;

    let product = catalog.get(id).await.unwrap().unwrap();
    assert_eq!(product.price.amount(), Decimal::new(1250, 2));
    assert!(catalog.get(ProductId::new(-1)).await.unwrap().is_none());

    assert!(catalog.count().await.unwrap() >= 1);
    let page = catalog.list(1, 2).await.unwrap();
    assert!(page.total >= 1);
    assert!(page.products.len() <= 2);
    assert!(page.products.windows(2).all(|w| w[0].id < w[1].id));

    assert!(catalog.list(u32::MAX, 1).await.unwrap().products.is_empty());

    assert!(catalog.delete(id).await.unwrap());
    assert!(catalog.get(id).await.unwrap().is_none());
}

// ============================================================================
// Cart service over Postgres
// ============================================================================

#[tokio::test]
async fn test_pg_cart_service_checkout_flow() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let catalog = PgCatalog::new(pool.clone());
    let mug = create_product(&catalog, "Mug", 1000).await;
    let tote = create_product(&catalog, "Tote", 1499).await;
    let cart = CartService::new(
        Arc::new(PgCartStore::new(pool.clone())),
        Arc::new(catalog.clone()),
    );
    let session = MemorySessionCart::new();

    for product in [mug, mug, mug, tote] {
        cart.add(Some(user.id), product, &session).await.unwrap();
    }
    cart.remove(Some(user.id), tote, &session).await.unwrap();
    assert_eq!(session.snapshot().unwrap().product_ids(), [mug, mug, mug]);
    assert_eq!(cart.total(Some(user.id)).await.unwrap().to_string(), "30.00");

    let receipt = cart.checkout(Some(user.id), &session).await.unwrap();
    assert_eq!(receipt.item_count, 3);
    assert_eq!(receipt.total.to_string(), "30.00");
    assert!(session.snapshot().unwrap().is_empty());
    assert!(cart.view(Some(user.id)).await.unwrap().is_empty());

    let again = cart.checkout(Some(user.id), &session).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_pg_adds_racing_checkout_are_billed_or_kept() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let catalog = PgCatalog::new(pool.clone());
    let mug = create_product(&catalog, "Mug", 1000).await;
    let cart = CartService::new(Arc::new(PgCartStore::new(pool.clone())), Arc::new(catalog));

    let adds: Vec<_> = (0..16)
        .map(|_| {
            let cart = cart.clone();
            tokio::spawn(async move {
                cart.add(Some(user.id), mug, &MemorySessionCart::new())
                    .await
                    .unwrap();
            })
        })
        .collect();
    let checkout = {
        let cart = cart.clone();
        tokio::spawn(async move {
            cart.checkout(Some(user.id), &MemorySessionCart::new())
                .await
                .unwrap()
        })
    };

    for add in adds {
        add.await.unwrap();
    }
    let receipt = checkout.await.unwrap();

    let left: u32 = cart
        .view(Some(user.id))
        .await
        .unwrap()
        .iter()
        .map(|item| item.quantity.get())
        .sum();
    assert_eq!(receipt.item_count + left, 16);
    assert_eq!(receipt.total, Price::from_cents(1000 * receipt.item_count));
}

#[tokio::test]
async fn test_pg_cart_service_rejects_unknown_product_and_anonymous() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let user = create_user(&pool).await;
    let cart = CartService::new(
        Arc::new(PgCartStore::new(pool.clone())),
        Arc::new(PgCatalog::new(pool.clone())),
    );
    let session = MemorySessionCart::new();

    let err = cart
        .add(Some(user.id), ProductId::new(-1), &session)
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::ProductNotFound(_)));

    let err = cart.add(None, ProductId::new(1), &session).await.unwrap_err();
    assert!(matches!(err, CartError::Unauthorized));
    assert!(session.snapshot().is_none());
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_pg_signup_then_login() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let auth = AuthService::new(&pool);
    let suffix = unique_suffix();
    let email = format!("buyer{suffix}@example.com");

    let user = auth
        .signup(&format!("buyer{suffix}"), &email, "correct horse", "correct horse")
        .await
        .unwrap();

    let logged_in = auth.login(&email, "correct horse").await.unwrap();
    assert_eq!(logged_in.id, user.id);
    assert_eq!(logged_in.email, user.email);

    assert!(matches!(
        auth.login(&email, "wrong horse").await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        auth.login(&format!("nobody{suffix}@example.com"), "correct horse").await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_pg_duplicate_signup_names_the_conflict() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let auth = AuthService::new(&pool);
    let suffix = unique_suffix();
    let username = format!("dup{suffix}");
    let email = format!("dup{suffix}@example.com");

    auth.signup(&username, &email, "password1", "password1")
        .await
        .unwrap();

    let err = auth
        .signup(&username, &format!("other{suffix}@example.com"), "password1", "password1")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists(ref msg) if msg.contains("username")));

    let err = auth
        .signup(&format!("other{suffix}"), &email, "password1", "password1")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists(ref msg) if msg.contains("email")));
}
