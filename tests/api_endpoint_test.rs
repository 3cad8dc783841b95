//! HTTP surface exercised through the router, no live server.

use axum::http::StatusCode;
use primitive_types::U256;
use rangebook::api::{self, AppState};
use rangebook::chain::{MockChainSource, OnChainPosition};
use rangebook::domain::{
    Address, ChainId, Currency, PoolProtocol, PoolState, PositionConfig, PositionId,
    PositionState, TimeMs,
};
use rangebook::math::sqrt_price_at_tick;
use rangebook::orchestration::{LedgerRebuilder, RefreshCoordinator};
use rangebook::orders::OrderMonitor;
use rangebook::signing::{IntentStore, MockIntentStore, MockSigner, Signer};
use rangebook::{init_db, Repository};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
    chain: Arc<MockChainSource>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");

    let repo = Arc::new(Repository::new(pool));
    let chain = Arc::new(MockChainSource::new());
    let signer: Arc<dyn Signer> = Arc::new(MockSigner::new());
    let intents: Arc<dyn IntentStore> = Arc::new(MockIntentStore::new());

    let refresh = Arc::new(RefreshCoordinator::new(repo.clone(), chain.clone(), 60_000));
    let rebuilder = Arc::new(LedgerRebuilder::new(repo.clone(), chain.clone()));
    let monitor = Arc::new(OrderMonitor::new(
        repo.clone(),
        chain.clone(),
        chain.clone(),
        signer,
        intents,
        3,
        30_000,
        Duration::from_secs(5),
    ));

    let app = api::create_router(AppState {
        repo: repo.clone(),
        refresh,
        rebuilder,
        monitor,
    });

    TestApp {
        app,
        repo,
        chain,
        _temp: temp_dir,
    }
}

fn sample_config() -> PositionConfig {
    PositionConfig {
        position_id: PositionId::generate(),
        owner: Address::new("0xowner"),
        chain_id: ChainId::new(1),
        pool_address: Address::new("0xpool"),
        protocol: PoolProtocol::UniswapV3 { fee_millionths: 500 },
        token0: Currency::erc20("0x0001", 6, "USDC"),
        token1: Currency::erc20("0x0002", 18, "WETH"),
        quote_is_token0: true,
        tick_lower: 199_120,
        tick_upper: 201_120,
    }
}

async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            axum::body::Body::from(json.to_string())
        }
        None => axum::body::Body::empty(),
    };
    let req = builder.body(body).unwrap();

    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let test_app = setup_test_app().await;
    let (status, body) = request(test_app.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_track_then_get_position() {
    let test_app = setup_test_app().await;
    let config = sample_config();

    let (status, body) = request(
        test_app.app.clone(),
        "POST",
        "/v1/positions",
        Some(serde_json::json!({ "config": config })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);

    let (status, body) = request(
        test_app.app,
        "GET",
        &format!("/v1/positions/{}", config.position_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["config"]["positionId"],
        serde_json::json!(config.position_id)
    );
}

#[tokio::test]
async fn test_track_rejects_inverted_range() {
    let test_app = setup_test_app().await;
    let mut config = sample_config();
    config.tick_lower = 201_120;
    config.tick_upper = 199_120;

    let (status, _) = request(
        test_app.app,
        "POST",
        "/v1/positions",
        Some(serde_json::json!({ "config": config })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_position_is_404() {
    let test_app = setup_test_app().await;
    let (status, _) = request(
        test_app.app,
        "GET",
        &format!("/v1/positions/{}", PositionId::generate()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_endpoint_returns_status() {
    let test_app = setup_test_app().await;
    let config = sample_config();
    test_app
        .repo
        .insert_position(&config, &PositionState::empty())
        .await
        .unwrap();

    test_app.chain.set_pool_state(PoolState {
        sqrt_price_x96: sqrt_price_at_tick(200_120).unwrap(),
        current_tick: 200_120,
        liquidity: 0,
        fee_growth_global_0: U256::zero(),
        fee_growth_global_1: U256::zero(),
        fee_growth_inside_0: U256::zero(),
        fee_growth_inside_1: U256::zero(),
        observed_at: TimeMs::new(0),
    });
    test_app.chain.set_position(OnChainPosition {
        liquidity: U256::from(1_000_000u64),
        fee_growth_inside_0_last: U256::zero(),
        fee_growth_inside_1_last: U256::zero(),
        tokens_owed_0: U256::zero(),
        tokens_owed_1: U256::zero(),
    });

    let (status, body) = request(
        test_app.app,
        "POST",
        &format!("/v1/positions/{}/refresh", config.position_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["status"]["phase"], "in-range");
}

#[tokio::test]
async fn test_register_order_duplicate_slot_conflicts() {
    let test_app = setup_test_app().await;
    let config = sample_config();
    test_app
        .repo
        .insert_position(&config, &PositionState::empty())
        .await
        .unwrap();

    let payload = serde_json::json!({
        "positionId": config.position_id.to_string(),
        "kind": "stop_loss",
        "triggerTick": 199_000,
        "triggerMode": "lower",
    });

    let (status, body) = request(
        test_app.app.clone(),
        "POST",
        "/v1/orders",
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["order"]["state"], "monitoring");

    let (status, _) = request(test_app.app, "POST", "/v1/orders", Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_order_invalid_tick_rejected() {
    let test_app = setup_test_app().await;
    let config = sample_config();
    test_app
        .repo
        .insert_position(&config, &PositionState::empty())
        .await
        .unwrap();

    let (status, _) = request(
        test_app.app,
        "POST",
        "/v1/orders",
        Some(serde_json::json!({
            "positionId": config.position_id.to_string(),
            "kind": "stop_loss",
            "triggerTick": 900_000,
            "triggerMode": "lower",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_order_endpoint() {
    let test_app = setup_test_app().await;
    let config = sample_config();
    test_app
        .repo
        .insert_position(&config, &PositionState::empty())
        .await
        .unwrap();

    request(
        test_app.app.clone(),
        "POST",
        "/v1/orders",
        Some(serde_json::json!({
            "positionId": config.position_id.to_string(),
            "kind": "take_profit",
            "triggerTick": 201_000,
            "triggerMode": "upper",
        })),
    )
    .await;

    let (status, body) = request(
        test_app.app.clone(),
        "DELETE",
        &format!("/v1/orders/{}/take_profit", config.position_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);

    // Cancelling again: nothing left in the slot.
    let (status, _) = request(
        test_app.app,
        "DELETE",
        &format!("/v1/orders/{}/take_profit", config.position_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
