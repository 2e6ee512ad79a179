//! HTTP Tests
//!
//! Drives the router end to end on the in-memory backend.

mod common;

use axum::http::{Method, StatusCode};
use common::{post_multipart, request, settle, Harness, MultipartBody, ADMIN, PAGE_URL};
use meme_board::models::MediaType;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn health_check() {
    let h = Harness::new();
    let router = h.router(h.board());

    let resp = request(&router, Method::GET, "/health", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
}

#[tokio::test]
async fn upload_then_fetch_media() {
    let h = Harness::new();
    let board = h.board();
    board.mount().await;
    let router = h.router(board);

    let body = MultipartBody::new()
        .text("title", "Friday")
        .file("file", "friday.png", "image/png", &[137, 80, 78, 71])
        .finish();
    let resp = post_multipart(&router, "/upload_meme", body).await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let meme = resp.json();
    assert_eq!(meme["title"], "Friday");
    assert_eq!(meme["media_type"], "image");
    assert_eq!(meme["likes_count"], 0);

    let listed = request(&router, Method::GET, "/memes", None).await;
    assert_eq!(listed.json().as_array().map(|a| a.len()), Some(1));

    let key = h.storage.keys().await.pop().expect("stored object");
    let media = request(&router, Method::GET, &format!("/media/{}", key), None).await;
    assert_eq!(media.status, StatusCode::OK);
    assert_eq!(media.headers["content-type"], "image/png");
    assert_eq!(&media.body_bytes[..], &[137, 80, 78, 71]);
}

#[tokio::test]
async fn upload_from_url_field() {
    let h = Harness::new();
    let router = h.router(h.board());

    let body = MultipartBody::new()
        .text("media_url", "https://example.com/clip.mp4")
        .text("media_type", "video")
        .finish();
    let resp = post_multipart(&router, "/upload_meme", body).await;

    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json()["media_type"], "video");
    assert_eq!(resp.json()["title"], serde_json::Value::Null);
}

#[tokio::test]
async fn upload_without_media_is_bad_request() {
    let h = Harness::new();
    let router = h.router(h.board());

    let resp = post_multipart(&router, "/upload_meme", MultipartBody::new().text("title", "nothing").finish()).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "Please provide a media file or URL");
}

#[tokio::test]
async fn unknown_media_is_not_found() {
    let h = Harness::new();
    let router = h.router(h.board());

    let resp = request(&router, Method::GET, "/media/memes/missing.png", None).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn like_and_comment_roundtrip() {
    let h = Harness::new();
    let meme = h.seed("https://example.com/cat.jpg", MediaType::Image).await;
    let board = h.board();
    board.mount().await;
    let router = h.router(board);

    let resp = request(&router, Method::POST, &format!("/memes/{}/like", meme.id), None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["likes_count"], 1);

    let resp = request(
        &router,
        Method::POST,
        &format!("/memes/{}/comments", meme.id),
        Some(json!({ "content": "  lol  " })),
    )
    .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json()["content"], "lol");

    let resp = request(
        &router,
        Method::POST,
        &format!("/memes/{}/comments", meme.id),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = request(&router, Method::POST, &format!("/memes/{}/comments/toggle", meme.id), None).await;
    assert_eq!(resp.json()["open"], true);
    assert_eq!(resp.json()["comments"].as_array().map(|a| a.len()), Some(1));

    let resp = request(&router, Method::GET, &format!("/memes/{}/comments", meme.id), None).await;
    assert_eq!(resp.json()[0]["content"], "lol");
}

#[tokio::test]
async fn uploads_from_two_clients_both_land() {
    let h = Harness::with_slow_uploads(Duration::from_millis(300));
    let board = h.board();
    board.mount().await;
    let router = h.router(board);

    let file = MultipartBody::new()
        .file("file", "a.png", "image/png", &[137, 80, 78, 71])
        .finish();
    let url = MultipartBody::new()
        .text("media_url", "https://example.com/cat.jpg")
        .text("media_type", "image")
        .finish();
    let (a, b) = tokio::join!(post_multipart(&router, "/upload_meme", file), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        post_multipart(&router, "/upload_meme", url).await
    });

    assert_eq!(a.status, StatusCode::CREATED);
    assert_eq!(b.status, StatusCode::CREATED);
    assert_eq!(h.repo.meme_count().await, 2);
}

#[tokio::test]
async fn comment_visibility_is_per_client() {
    let h = Harness::new();
    let meme = h.seed("https://example.com/cat.jpg", MediaType::Image).await;
    h.backend.comments.insert(meme.id, "first".into()).await.unwrap();
    let board = h.board();
    board.mount().await;
    let router = h.router(board);
    let path = format!("/memes/{}/comments/toggle", meme.id);

    // Both clients start collapsed, so both expand.
    for _ in 0..2 {
        let resp = request(&router, Method::POST, &path, None).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.json()["open"], true);
        assert_eq!(resp.json()["comments"].as_array().map(|a| a.len()), Some(1));
    }

    let resp = request(&router, Method::POST, &format!("{}?open=true", path), None).await;
    assert_eq!(resp.json()["open"], false);
}

#[tokio::test]
async fn unknown_or_malformed_meme_ids() {
    let h = Harness::new();
    let router = h.router(h.board());

    let resp = request(&router, Method::POST, &format!("/memes/{}/like", uuid::Uuid::new_v4()), None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = request(&router, Method::POST, "/memes/not-a-uuid/like", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_checks_password() {
    let h = Harness::new();
    let meme = h.seed("https://example.com/cat.jpg", MediaType::Image).await;
    let board = h.board();
    board.mount().await;
    let router = h.router(board);
    let path = format!("/memes/{}", meme.id);

    let resp = request(&router, Method::DELETE, &path, Some(json!({ "password": "guess" }))).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error_message(), "Incorrect password");

    let resp = request(&router, Method::DELETE, &path, Some(json!({ "password": ADMIN }))).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_eq!(h.repo.meme_count().await, 0);
}

#[tokio::test]
async fn clear_reports_removed_rows() {
    let h = Harness::new();
    h.seed_hosted("a.png").await;
    h.seed("https://example.com/cat.jpg", MediaType::Image).await;
    let board = h.board();
    board.mount().await;
    let router = h.router(board);

    let resp = request(&router, Method::POST, "/memes/clear", Some(json!({ "password": ADMIN }))).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["removed"], 2);
    settle().await;
    let listed = request(&router, Method::GET, "/memes", None).await;
    assert_eq!(listed.json().as_array().map(|a| a.len()), Some(0));
}

#[tokio::test]
async fn backend_failure_is_internal_error() {
    let h = Harness::new();
    let router = h.router(h.board());
    h.repo.set_failing(true);

    let resp = request(&router, Method::POST, "/memes/refresh", None).await;

    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.error_message(), "Failed to load memes");
}

#[tokio::test]
async fn share_returns_page_url() {
    let h = Harness::new();
    let meme = h.seed("https://example.com/cat.jpg", MediaType::Image).await;
    let board = h.board();
    board.mount().await;
    let router = h.router(board);

    let resp = request(&router, Method::POST, &format!("/memes/{}/share", meme.id), None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["link"], PAGE_URL);
}
