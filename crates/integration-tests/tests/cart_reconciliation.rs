//! Integration tests for merging the guest cart into the user cart at
//! sign-in.
//!
//! The merge policy is overwrite: a guest line replaces the user cart's
//! quantity for the same product rather than adding to it.

use emporium_core::{CartLine, UserId};
use emporium_integration_tests::{CartFixture, qty};
use emporium_storefront::cart::{AuthState, ReconcileReport, watch_auth};
use tokio::sync::watch;

// =============================================================================
// Sign-in scenarios
// =============================================================================

#[tokio::test]
async fn test_guest_line_moves_to_empty_user_cart() {
    let mut fx = CartFixture::guest();
    let user = UserId::generate();
    let a = fx.product("A", 1000);
    fx.session.add_item(&a, qty(2)).await.unwrap();

    let report = fx
        .session
        .on_auth_change(AuthState::Authenticated(user))
        .await
        .unwrap();

    assert_eq!(report.merged, vec![a.id]);
    assert!(report.failed.is_empty());
    assert_eq!(fx.remote.lines(user), vec![CartLine::new(a.id, qty(2))]);
    assert!(fx.guest_lines().await.is_empty());
}

#[tokio::test]
async fn test_guest_quantity_overwrites_existing_user_quantity() {
    let mut fx = CartFixture::guest();
    let user = UserId::generate();
    let a = fx.product("A", 1000);
    fx.remote.seed(user, a.id, qty(5));
    fx.session.add_item(&a, qty(2)).await.unwrap();

    fx.session
        .on_auth_change(AuthState::Authenticated(user))
        .await
        .unwrap();

    // Not 7 (sum) and not 5 (max): the guest quantity wins.
    assert_eq!(fx.remote.lines(user), vec![CartLine::new(a.id, qty(2))]);
}

#[tokio::test]
async fn test_user_only_lines_survive_merge() {
    let mut fx = CartFixture::guest();
    let user = UserId::generate();
    let a = fx.product("A", 1000);
    let b = fx.product("B", 500);
    fx.remote.seed(user, b.id, qty(3));
    fx.session.add_item(&a, qty(1)).await.unwrap();

    fx.session
        .on_auth_change(AuthState::Authenticated(user))
        .await
        .unwrap();

    assert_eq!(
        fx.remote.lines(user),
        vec![CartLine::new(b.id, qty(3)), CartLine::new(a.id, qty(1))]
    );
    let view = fx.session.view().await.unwrap();
    assert_eq!(view.item_count, 4);
}

#[tokio::test]
async fn test_every_guest_line_lands_in_user_cart() {
    let mut fx = CartFixture::guest();
    let user = UserId::generate();
    let products: Vec<_> = (1..=4)
        .map(|i| fx.product(&format!("P{i}"), 100 * i))
        .collect();
    for (i, p) in (1..).zip(&products) {
        fx.session.add_item(p, qty(i)).await.unwrap();
    }

    let report = fx
        .session
        .on_auth_change(AuthState::Authenticated(user))
        .await
        .unwrap();

    assert_eq!(report.merged.len(), 4);
    let expected: Vec<CartLine> = (1..)
        .zip(&products)
        .map(|(i, p)| CartLine::new(p.id, qty(i)))
        .collect();
    assert_eq!(fx.remote.lines(user), expected);
    assert!(fx.guest_lines().await.is_empty());
}

#[tokio::test]
async fn test_empty_guest_cart_makes_no_upserts() {
    let mut fx = CartFixture::guest();
    let user = UserId::generate();
    let a = fx.product("A", 1000);
    fx.remote.seed(user, a.id, qty(5));

    let report = fx
        .session
        .on_auth_change(AuthState::Authenticated(user))
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(fx.remote.upsert_calls(), 0);
    assert_eq!(fx.remote.lines(user), vec![CartLine::new(a.id, qty(5))]);
}

// =============================================================================
// Partial failure
// =============================================================================

#[tokio::test]
async fn test_failed_line_does_not_block_others() {
    let mut fx = CartFixture::guest();
    let user = UserId::generate();
    let a = fx.product("A", 1000);
    let b = fx.product("B", 2000);
    let c = fx.product("C", 3000);
    for p in [&a, &b, &c] {
        fx.session.add_item(p, qty(1)).await.unwrap();
    }
    fx.remote.fail_upserts_for(b.id);

    let report = fx
        .session
        .on_auth_change(AuthState::Authenticated(user))
        .await
        .unwrap();

    assert_eq!(report.merged, vec![a.id, c.id]);
    assert_eq!(report.failed, vec![b.id]);
    assert!(report.has_failures());
    assert!(report.warning().is_some());
    assert_eq!(fx.remote.upsert_calls(), 3);
    assert_eq!(
        fx.remote.lines(user),
        vec![CartLine::new(a.id, qty(1)), CartLine::new(c.id, qty(1))]
    );
    // The guest cart is cleared even though one line was lost.
    assert!(fx.guest_lines().await.is_empty());
}

// =============================================================================
// Auth transitions
// =============================================================================

#[tokio::test]
async fn test_sign_out_moves_no_data() {
    let user = UserId::generate();
    let mut fx = CartFixture::signed_in(user);
    let a = fx.product("A", 1000);
    fx.session.add_item(&a, qty(2)).await.unwrap();

    let report = fx.session.on_auth_change(AuthState::Unauthenticated).await;

    assert_eq!(report, None);
    assert!(fx.session.view().await.unwrap().is_empty());
    assert_eq!(fx.remote.lines(user), vec![CartLine::new(a.id, qty(2))]);
}

#[tokio::test]
async fn test_repeated_state_is_not_a_transition() {
    let user = UserId::generate();
    let mut fx = CartFixture::signed_in(user);
    let a = fx.product("A", 1000);
    fx.guest.put_raw(
        emporium_storefront::cart::GUEST_CART_KEY,
        &serde_json::to_string(&[CartLine::new(a.id, qty(1))]).unwrap(),
    );

    let report = fx
        .session
        .on_auth_change(AuthState::Authenticated(user))
        .await;

    assert_eq!(report, None);
    assert!(fx.remote.lines(user).is_empty());
}

#[tokio::test]
async fn test_watch_auth_merges_on_reported_sign_in() {
    let fx = CartFixture::guest();
    let user = UserId::generate();
    let a = fx.product("A", 1000);
    fx.session.add_item(&a, qty(3)).await.unwrap();

    let (tx, rx) = watch::channel(AuthState::Unauthenticated);
    let task = tokio::spawn(watch_auth(fx.session.clone(), rx));

    tx.send(AuthState::Authenticated(user)).unwrap();
    drop(tx);
    let session = task.await.unwrap();

    assert_eq!(session.auth_state(), AuthState::Authenticated(user));
    assert_eq!(fx.remote.lines(user), vec![CartLine::new(a.id, qty(3))]);
    assert!(fx.guest_lines().await.is_empty());
}

#[test]
fn test_report_serializes_for_clients() {
    let report = ReconcileReport::default();
    let json = serde_json::to_value(&report).unwrap();

    assert!(json.get("merged").is_some());
    assert!(json.get("failed").is_some());
}
