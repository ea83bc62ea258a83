// ========================================
// INTEGRATION TESTS FOR VICE TOADS
// ========================================
//
// Drives the full warp filter stack (rate limiter, routes, rejection
// handler) in-process with a manual clock.
//
// Test Scenarios:
// 1. Daily claim lifecycle for one address
// 2. Request validation and error replies
// 3. Persistence failures and restart recovery
// 4. Concurrent claims for one address
// 5. Collaborators: profile, webhook, manifest, health, metrics
//
// Usage:
//   cargo test --test integration_test -- --nocapture
//
// ========================================

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use toad_core::config::{NodeConfig, StorageBackend};
use toad_core::store::{JsonFileStore, LedgerStore, MemoryStore};
use toad_core::{ManualClock, COOLDOWN_MS};
use toad_node::rate_limiter::{Allowance, RateLimiter};
use toad_node::{api, open_store, AppState};
use warp::http::StatusCode;

fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.profile.request_timeout_secs = 1;
    config.profile.sources = vec!["http://127.0.0.1:9/users/{address}".to_string()];
    config
}

fn relaxed_limiter() -> RateLimiter {
    RateLimiter::new(
        Allowance::per_second(10_000, 10_000),
        Allowance::per_minute(10_000),
    )
}

struct Node {
    state: AppState,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn node_at(now: u64) -> Node {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(now));
    let state = AppState::new(&test_config(), store.clone(), clock.clone()).unwrap();
    Node {
        state,
        store,
        clock,
    }
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

macro_rules! get {
    ($filter:expr, $path:expr) => {
        warp::test::request()
            .method("GET")
            .path($path)
            .reply(&$filter)
            .await
    };
}

macro_rules! post_json {
    ($filter:expr, $path:expr, $body:expr) => {
        warp::test::request()
            .method("POST")
            .path($path)
            .json(&$body)
            .reply(&$filter)
            .await
    };
}

// ========================================
// TEST 1: DAILY CLAIM LIFECYCLE
// ========================================
#[tokio::test]
async fn test_claim_lifecycle_for_one_address() {
    let node = node_at(0);
    let filter = api::routes(node.state.clone(), relaxed_limiter());

    let res = get!(filter, "/claim?address=0xabc");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body_json(res.body()),
        json!({"ok": true, "total": 0, "last": 0, "streak": 0})
    );

    let res = post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100}));
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body_json(res.body()),
        json!({"ok": true, "claimedAmount": 100, "total": 100, "last": 0, "streak": 1})
    );

    node.clock.set(1_000);
    let res = post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 200}));
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(res.body()),
        json!({"ok": false, "error": "cooldown", "remaining": 86_399_000u64})
    );

    node.clock.set(COOLDOWN_MS + 1);
    let res = post_json!(filter, "/claim", json!({"address": "0xABC", "amount": "200"}));
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res.body());
    assert_eq!(body["claimedAmount"], 200);
    assert_eq!(body["total"], 300);
    assert_eq!(body["streak"], 2);
    assert_eq!(body["last"], COOLDOWN_MS + 1);

    let res = get!(filter, "/claim?address=%200xAbC%20");
    assert_eq!(
        body_json(res.body()),
        json!({"ok": true, "total": 300, "last": COOLDOWN_MS + 1, "streak": 2})
    );
}

// ========================================
// TEST 2: REQUEST VALIDATION
// ========================================
#[tokio::test]
async fn test_invalid_claims_are_rejected_without_mutation() {
    let node = node_at(1_000);
    let filter = api::routes(node.state.clone(), relaxed_limiter());

    let bad_bodies = [
        json!({"address": "", "amount": 100}),
        json!({"address": "   ", "amount": 100}),
        json!({"amount": 100}),
        json!({"address": "0xabc"}),
        json!({"address": "0xabc", "amount": 0}),
        json!({"address": "0xabc", "amount": -5}),
        json!({"address": "0xabc", "amount": 1.5}),
        json!({"address": "0xabc", "amount": "lots"}),
        json!({"address": "0xabc", "amount": null}),
    ];
    for body in bad_bodies {
        let res = post_json!(filter, "/claim", body);
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body {}", body);
        assert_eq!(
            body_json(res.body()),
            json!({"ok": false, "error": "invalid address or amount"})
        );
    }

    let res = warp::test::request()
        .method("POST")
        .path("/claim")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res.body())["error"], "invalid address or amount");

    assert!(node.store.load().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_claim_requires_address() {
    let node = node_at(0);
    let filter = api::routes(node.state, relaxed_limiter());

    for path in ["/claim", "/claim?address=", "/claim?address=%20%20"] {
        let res = get!(filter, path);
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "path {}", path);
        assert_eq!(
            body_json(res.body()),
            json!({"ok": false, "error": "address query required"})
        );
    }
}

#[tokio::test]
async fn test_method_and_route_errors() {
    let node = node_at(0);
    let filter = api::routes(node.state, relaxed_limiter());

    let res = warp::test::request()
        .method("PUT")
        .path("/claim")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body_json(res.body()),
        json!({"ok": false, "error": "method_not_allowed"})
    );

    let res = warp::test::request()
        .method("DELETE")
        .path("/claim?address=0xabc")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = get!(filter, "/nope");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(res.body()),
        json!({"ok": false, "error": "not_found"})
    );
}

#[tokio::test]
async fn test_rate_limited_requests_get_429() {
    let node = node_at(0);
    let limiter = RateLimiter::new(Allowance::per_second(1, 2), Allowance::per_minute(10));
    let filter = api::routes(node.state, limiter);

    assert_eq!(get!(filter, "/health").status(), StatusCode::OK);
    assert_eq!(get!(filter, "/health").status(), StatusCode::OK);

    let res = get!(filter, "/health");
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "1");
    assert_eq!(
        body_json(res.body()),
        json!({"ok": false, "error": "rate_limited", "retryAfter": 1})
    );
}

#[tokio::test]
async fn test_claim_submits_have_their_own_budget() {
    let node = node_at(0);
    let mut config = test_config();
    config.claim_submits_per_min = 2;
    let filter = api::routes(node.state.clone(), RateLimiter::from_config(&config));

    for address in ["0xa", "0xb"] {
        let res = post_json!(filter, "/claim", json!({"address": address, "amount": 100}));
        assert_eq!(res.status(), StatusCode::OK, "address {}", address);
    }

    let res = post_json!(filter, "/claim", json!({"address": "0xc", "amount": 100}));
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "30");
    assert_eq!(
        body_json(res.body()),
        json!({"ok": false, "error": "rate_limited", "retryAfter": 30})
    );
    assert_eq!(node.state.ledger.identity_count().unwrap(), 2);

    // Reads spend only the general budget
    let res = get!(filter, "/claim?address=0xa");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res.body())["total"], 100);
}

// ========================================
// TEST 3: PERSISTENCE
// ========================================
#[tokio::test]
async fn test_write_failure_reports_and_keeps_record() {
    let node = node_at(0);
    let filter = api::routes(node.state.clone(), relaxed_limiter());

    node.store.set_fail_writes(true);
    let res = post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100}));
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(res.body());
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "write_failed");
    assert!(body["detail"].is_string());

    let res = get!(filter, "/claim?address=0xabc");
    assert_eq!(
        body_json(res.body()),
        json!({"ok": true, "total": 0, "last": 0, "streak": 0})
    );

    // The failed attempt did not start a cooldown
    node.store.set_fail_writes(false);
    let res = post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100}));
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unreadable_ledger_is_a_server_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("claims.json");
    std::fs::write(&path, "{ definitely not a ledger").unwrap();

    let state = AppState::new(
        &test_config(),
        Arc::new(JsonFileStore::new(&path)),
        Arc::new(ManualClock::new(0)),
    )
    .unwrap();
    let filter = api::routes(state, relaxed_limiter());

    let res = get!(filter, "/claim?address=0xabc");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(res.body())["error"], "server_error");

    // The corrupt file is left for an operator to inspect
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "{ definitely not a ledger"
    );
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    for backend in [StorageBackend::Json, StorageBackend::Sled] {
        let dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.data_dir = dir.path().to_path_buf();
        config.storage = backend;

        {
            let state = AppState::new(
                &config,
                open_store(&config).unwrap(),
                Arc::new(ManualClock::new(5_000)),
            )
            .unwrap();
            let filter = api::routes(state, relaxed_limiter());
            let res = post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100}));
            assert_eq!(res.status(), StatusCode::OK, "{:?}", backend);
        }

        let state = AppState::new(
            &config,
            open_store(&config).unwrap(),
            Arc::new(ManualClock::new(6_000)),
        )
        .unwrap();
        let filter = api::routes(state, relaxed_limiter());
        let res = get!(filter, "/claim?address=0xabc");
        assert_eq!(
            body_json(res.body()),
            json!({"ok": true, "total": 100, "last": 5_000, "streak": 1}),
            "{:?}",
            backend
        );

        // Cooldown is enforced from the persisted state
        let res = post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100}));
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS, "{:?}", backend);
    }
}

// ========================================
// TEST 4: CONCURRENT CLAIMS
// ========================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_accept_exactly_one() {
    let node = node_at(10_000);
    let filter = api::routes(node.state.clone(), relaxed_limiter());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let filter = filter.clone();
        handles.push(tokio::spawn(async move {
            post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100})).status()
        }));
    }

    let mut accepted = 0;
    let mut cooldown = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => accepted += 1,
            StatusCode::TOO_MANY_REQUESTS => cooldown += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(cooldown, 7);

    let ledger = node.store.load().unwrap();
    assert_eq!(ledger["0xabc"].total, 100);
    assert_eq!(ledger["0xabc"].streak, 1);
}

// ========================================
// TEST 5: COLLABORATORS
// ========================================
#[tokio::test]
async fn test_profile_lookup_replies() {
    let node = node_at(0);
    let filter = api::routes(node.state, relaxed_limiter());

    let res = get!(filter, "/profile");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res.body()),
        json!({"ok": false, "error": "address required"})
    );

    let res = get!(filter, "/profile?address=0xABC");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body_json(res.body()),
        json!({
            "ok": false,
            "error": "profile not found (best-effort)",
            "sourceTried": ["http://127.0.0.1:9/users/0xabc"],
        })
    );

    let res = post_json!(filter, "/profile", json!({}));
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_webhook_endpoint() {
    let node = node_at(0);
    let filter = api::routes(node.state.clone(), relaxed_limiter());

    let res = warp::test::request()
        .method("OPTIONS")
        .path("/webhook")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = get!(filter, "/webhook");
    assert_eq!(
        body_json(res.body()),
        json!({"ok": true, "message": "Webhook endpoint active"})
    );

    let res = post_json!(
        filter,
        "/webhook",
        json!({"event": "miniapp_added", "fid": 42})
    );
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res.body()), json!({"ok": true}));

    let res = warp::test::request()
        .method("POST")
        .path("/webhook")
        .body("plain text ping")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(node.state.metrics.webhook_events_total.get(), 2);

    let res = warp::test::request()
        .method("DELETE")
        .path("/webhook")
        .reply(&filter)
        .await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()["allow"], "GET, POST, OPTIONS");
}

#[tokio::test]
async fn test_manifest_is_served() {
    let node = node_at(0);
    let filter = api::routes(node.state, relaxed_limiter());

    let res = get!(filter, "/.well-known/farcaster.json");
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res.body());
    assert_eq!(body["miniapp"]["name"], "Vice Toads");
    assert_eq!(
        body["miniapp"]["webhookUrl"],
        "https://vice-toads.vercel.app/webhook"
    );
    assert!(body["accountAssociation"]["header"].is_string());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let node = node_at(0);
    let filter = api::routes(node.state.clone(), relaxed_limiter());

    post_json!(filter, "/claim", json!({"address": "0xabc", "amount": 100}));
    post_json!(filter, "/claim", json!({"address": "0xdef", "amount": 100}));
    post_json!(filter, "/claim", json!({"address": "0xdef", "amount": 100}));

    let res = get!(filter, "/health");
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res.body());
    assert_eq!(body["ok"], true);
    assert_eq!(body["identities"], 2);
    assert!(body["version"].is_string());

    let res = get!(filter, "/metrics");
    assert_eq!(res.status(), StatusCode::OK);
    let text = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(text.contains("toad_claims_accepted_total 2"));
    assert!(text.contains("toad_claims_cooldown_total 1"));
    assert!(text.contains("toad_points_credited_total 200"));
    assert!(text.contains("toad_ledger_identities 2"));
}
