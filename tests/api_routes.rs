//! In-process tests for the read-only HTTP API.
//!
//! The router is driven with `tower::ServiceExt::oneshot`; no socket is bound.
#![cfg(feature = "server")]

use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use poker_streaks::{api, StreakTracker, TrackerConfig};
use tempfile::TempDir;
use tower::ServiceExt; // oneshot

fn make_router(dir: &TempDir) -> axum::Router {
    let mut tracker = StreakTracker::open(TrackerConfig::in_dir(dir.path())).unwrap();
    tracker.revive("alice", 9).unwrap();
    tracker.revive("bob", 2).unwrap();
    tracker.add_referral("bob", 260, "alice").unwrap();
    api::build_router(Arc::new(Mutex::new(tracker)))
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body: Bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, serde_json::from_slice(&body).expect("body is not valid JSON"))
}

#[tokio::test]
async fn health_returns_ok() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(make_router(&dir), "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "OK");
}

#[tokio::test]
async fn players_are_in_leaderboard_order() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(make_router(&dir), "/api/players?limit=1").await;

    assert_eq!(status, StatusCode::OK);
    let players = json["data"].as_array().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["Username"], "alice");
    assert_eq!(players[0]["Streak"], 9);
}

#[tokio::test]
async fn bad_limit_gets_json_error_body() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(make_router(&dir), "/api/players?limit=abc").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["success"], false);
    assert_eq!(json["kind"], "validation-error");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn player_lookup_is_case_insensitive() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(make_router(&dir), "/api/players/BOB").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["Username"], "bob");
    assert_eq!(json["data"]["LastStatus"], "REVIVED");
}

#[tokio::test]
async fn unknown_player_is_404() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(make_router(&dir), "/api/players/ghost").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["kind"], "not-found");
}

#[tokio::test]
async fn referrals_for_referrer() {
    let dir = TempDir::new().unwrap();
    let (status, json) = get(make_router(&dir), "/api/referrals/Alice").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["bonuses_earned"], 1);
    assert_eq!(json["data"]["referrals"][0]["referred_player"], "bob");
    assert_eq!(json["data"]["referrals"][0]["status"], "BONUS EARNED");
}

#[tokio::test]
async fn locked_store_is_503() {
    let dir = TempDir::new().unwrap();
    let router = make_router(&dir);
    let _held = poker_streaks::StoreLock::acquire(dir.path()).unwrap();

    let (status, json) = get(router, "/api/players").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["kind"], "store-unavailable");
}
