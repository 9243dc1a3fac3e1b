//! Tests for the notification REST routes.

mod common;

use reqwest::StatusCode;

use common::{spawn_server, TestServer};
use hearth_core::{EventKind, NewNotification, NotificationRepository};
use hearth_db::{MemoryRelationRepository, MemoryUserDirectory};

const BOB: i64 = 2;
const CAROL: i64 = 3;

async fn seed(server: &TestServer, receiver_id: i64, count: usize) -> Vec<uuid::Uuid> {
    let mut ids = Vec::new();
    for i in 0..count {
        let n = server
            .notifications
            .create(NewNotification {
                kind: EventKind::Guestbook,
                title: format!("Alice signed your guestbook ({i})"),
                body: "Hello".to_string(),
                sender_id: 1,
                sender_display_name: "Alice".to_string(),
                sender_avatar_url: None,
                target_id: Some(i as i64),
                receiver_id,
            })
            .await
            .unwrap();
        ids.push(n.id);
    }
    ids
}

async fn server() -> TestServer {
    spawn_server(MemoryUserDirectory::new(), MemoryRelationRepository::new()).await
}

#[tokio::test]
async fn test_list_pages_newest_first() {
    let server = server().await;
    let ids = seed(&server, BOB, 3).await;
    seed(&server, CAROL, 1).await;
    let client = reqwest::Client::new();

    let page: serde_json::Value = client
        .get(format!("{}/api/v1/notifications?limit=2", server.base_url))
        .header("Authorization", server.bearer(BOB))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], ids[2].to_string());
    assert_eq!(items[1]["id"], ids[1].to_string());
    assert_eq!(page["hasMore"], true);
    assert_eq!(page["nextCursor"], ids[1].to_string());

    let page: serde_json::Value = client
        .get(format!(
            "{}/api/v1/notifications?limit=2&cursor={}",
            server.base_url, ids[1]
        ))
        .header("Authorization", server.bearer(BOB))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], ids[0].to_string());
    assert_eq!(page["hasMore"], false);
    assert!(page["nextCursor"].is_null());
}

#[tokio::test]
async fn test_bad_cursor_is_bad_request() {
    let server = server().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/api/v1/notifications?cursor=nope", server.base_url))
        .header("Authorization", server.bearer(BOB))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_parameters_answer_json_errors() {
    let server = server().await;
    let client = reqwest::Client::new();

    let requests = [
        client.get(format!("{}/api/v1/notifications?read=abc", server.base_url)),
        client.get(format!("{}/api/v1/notifications?limit=many", server.base_url)),
        client.post(format!("{}/api/v1/notifications/not-an-id/read", server.base_url)),
    ];
    for request in requests {
        let resp = request
            .header("Authorization", server.bearer(BOB))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().is_some(), "body: {body}");
    }
}

#[tokio::test]
async fn test_read_state_routes() {
    let server = server().await;
    let ids = seed(&server, BOB, 3).await;
    let carol_ids = seed(&server, CAROL, 1).await;
    let client = reqwest::Client::new();
    let auth = server.bearer(BOB);

    let unread = |body: serde_json::Value| body["count"].as_i64().unwrap();
    let count: serde_json::Value = client
        .get(format!("{}/api/v1/notifications/unread-count", server.base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unread(count), 3);

    let resp = client
        .post(format!("{}/api/v1/notifications/{}/read", server.base_url, ids[0]))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // Someone else's notification looks the same as a missing one.
    let resp = client
        .post(format!("{}/api/v1/notifications/{}/read", server.base_url, carol_ids[0]))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let unread_only: serde_json::Value = client
        .get(format!("{}/api/v1/notifications?read=false", server.base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unread_only["items"].as_array().unwrap().len(), 2);

    for expected in [2, 0] {
        let body: serde_json::Value = client
            .post(format!("{}/api/v1/notifications/read-all", server.base_url))
            .header("Authorization", &auth)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["updated"], expected);
    }
}

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let server = server().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/api/v1/notifications", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "TOKEN_MISSING");
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let server = server().await;
    let client = reqwest::Client::new();
    let auth = server.bearer(BOB);

    let resp = client
        .post(format!("{}/api/v1/auth/logout", server.base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/api/v1/notifications", server.base_url))
        .header("Authorization", &auth)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "TOKEN_BLACKLISTED");
}

#[tokio::test]
async fn test_health() {
    let server = server().await;
    let body: serde_json::Value = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["fanout"], "local");
    assert_eq!(body["connected_users"], 0);
}
