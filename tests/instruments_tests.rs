//! Instrument lifecycle tests: ticker validation plus the HTTP-level
//! deactivation flow (spec §4.6), which cancels every resting order on
//! the instrument and releases its reservations.
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use spot_exchange_core::{
    instrument::{Instrument, is_valid_ticker},
    state::AppState,
    store::Store,
    user::{Role, User},
};
use tempfile::tempdir;
use tower::ServiceExt;
use uuid::Uuid;

#[test]
fn ticker_shape_rules() {
    assert!(is_valid_ticker("RUB"));
    assert!(is_valid_ticker("AB"));
    assert!(is_valid_ticker("TICKERTICK"));
    assert!(!is_valid_ticker("A"));
    assert!(!is_valid_ticker("TOOLONGTICKER"));
    assert!(!is_valid_ticker("ab"));
    assert!(!is_valid_ticker("AB1"));
    assert!(!is_valid_ticker(""));
}

#[test]
fn new_instrument_starts_active() {
    let i = Instrument::new("TICK");
    assert!(i.active);
    assert_eq!(i.ticker, "TICK");
}

async fn test_app() -> (Router, AppState, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let coordinator = spot_exchange_core::coordinator::Coordinator::new(store);
    coordinator.store.put_instrument(&Instrument::new("TICK")).unwrap();
    let state = AppState::new(coordinator);
    (spot_exchange_core::api::router(state.clone()), state, dir)
}

fn register(state: &AppState, name: &str, role: Role) -> (Uuid, String) {
    let id = Uuid::new_v4();
    let api_key = Uuid::new_v4().simple().to_string() + &Uuid::new_v4().simple().to_string();
    let user = User {
        id,
        name: name.to_string(),
        api_key: api_key.clone(),
        role,
        active: true,
    };
    state.coordinator.store.put_user(&user).unwrap();
    (id, api_key)
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn deactivated_instrument_is_rejected_for_new_orders() {
    let (app, state, _dir) = test_app().await;
    let (_admin_id, admin_key) = register(&state, "root", Role::Admin);
    let (seller, seller_key) = register(&state, "seller", Role::User);
    state.coordinator.ledger.deposit(seller, "TICK", 5).await;

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/instrument/TICK")
                .header("Authorization", format!("TOKEN {admin_key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/order")
                .header("Authorization", format!("TOKEN {seller_key}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "direction": "SELL", "ticker": "TICK", "qty": 1, "price": 10 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivating_instrument_cancels_resting_orders_and_releases_reservation() {
    let (app, state, _dir) = test_app().await;
    let (_admin_id, admin_key) = register(&state, "root", Role::Admin);
    let (seller, seller_key) = register(&state, "seller", Role::User);
    state.coordinator.ledger.deposit(seller, "TICK", 5).await;

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/order")
                .header("Authorization", format!("TOKEN {seller_key}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "direction": "SELL", "ticker": "TICK", "qty": 5, "price": 10 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let order = body_json(res).await;
    assert_eq!(order["status"], "NEW");
    assert_eq!(state.coordinator.ledger.balance(seller, "TICK").frozen, 5);

    let res = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/instrument/TICK")
                .header("Authorization", format!("TOKEN {admin_key}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(state.coordinator.ledger.balance(seller, "TICK").frozen, 0);
    assert_eq!(state.coordinator.ledger.balance(seller, "TICK").available, 5);
    let order_id = order["id"].as_str().unwrap().parse().unwrap();
    let stored = state.coordinator.store.get_order(order_id).unwrap().unwrap();
    assert_eq!(stored.status, spot_exchange_core::orders::OrderStatus::Cancelled);
}

#[tokio::test]
async fn duplicate_active_ticker_is_rejected_as_conflict() {
    let (app, state, _dir) = test_app().await;
    let (_admin_id, admin_key) = register(&state, "root", Role::Admin);

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/instrument")
                .header("Authorization", format!("TOKEN {admin_key}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "ticker": "TICK" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
