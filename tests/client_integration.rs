//! Integration tests for the MangaDex client against a mock server.

mod support;

use std::time::{Duration, Instant};

use manga_sync_core::api::{ApiError, MangaDexClient, PageQuality};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use support::mangadex_mock::{chapter_json, fast_config, manga_json, mount_pages, page_url};
use support::socket_guard::start_mock_server_or_skip;

#[tokio::test]
async fn test_list_manga_sends_popularity_query() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manga"))
        .and(query_param("limit", "25"))
        .and(query_param("offset", "50"))
        .and(query_param("order[followedCount]", "desc"))
        .and(query_param("includes[]", "cover_art"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "data": [manga_json("m1", "Berserk")],
            "limit": 25,
            "offset": 50,
            "total": 51
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let page = client.list_manga(50, 25, None).await.unwrap();

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, "m1");
    assert_eq!(page.total, Some(51));
}

#[tokio::test]
async fn test_list_updated_manga_sends_update_order() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manga"))
        .and(query_param("limit", "5"))
        .and(query_param("offset", "10"))
        .and(query_param("order[updatedAt]", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "data": [manga_json("m4", "Blame!")],
            "limit": 5,
            "offset": 10,
            "total": 11
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let page = client.list_updated_manga(10, 5, None).await.unwrap();

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, "m4");
}

#[tokio::test]
async fn test_rate_limited_request_waits_for_retry_after() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manga/m1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/manga/m1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": "ok", "data": manga_json("m1", "Berserk")})),
        )
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let started = Instant::now();
    let manga = client.get_manga("m1", None).await.unwrap();

    assert_eq!(manga.id, "m1");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manga/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let err = client.get_manga("missing", None).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_error_result_surfaces_detail() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manga/bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "error",
            "errors": [{"title": "Bad Request", "detail": "invalid uuid"}]
        })))
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let err = client.get_manga("bad", None).await.unwrap_err();

    assert!(matches!(err, ApiError::Api { ref detail, .. } if detail == "invalid uuid"));
}

#[tokio::test]
async fn test_chapter_feed_walks_every_page() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let first: Vec<_> = (0..100)
        .map(|i| chapter_json(&format!("c{i}"), &i.to_string()))
        .collect();
    Mock::given(method("GET"))
        .and(path("/manga/m1/feed"))
        .and(query_param("offset", "0"))
        .and(query_param("translatedLanguage[]", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok", "data": first, "limit": 100, "offset": 0, "total": 101
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/manga/m1/feed"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok", "data": [chapter_json("c100", "100")], "limit": 100, "offset": 100, "total": 101
        })))
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let chapters = client.chapter_feed("m1", None).await.unwrap();

    assert_eq!(chapters.len(), 101);
    assert_eq!(chapters[0].id, "c0");
    assert_eq!(chapters[100].id, "c100");
}

#[tokio::test]
async fn test_chapter_pages_in_manifest_order() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_pages(&server, "c1", &["3.jpg", "1.jpg", "2.jpg"]).await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();

    let pages = client
        .chapter_pages("c1", PageQuality::DataSaver, None)
        .await
        .unwrap();

    assert_eq!(
        pages,
        vec![
            page_url("c1", "3.jpg"),
            page_url("c1", "1.jpg"),
            page_url("c1", "2.jpg")
        ]
    );
}

#[tokio::test]
async fn test_cancelled_request_returns_cancelled() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manga/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;
    let client = MangaDexClient::from_config(&fast_config(&server)).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = client.get_manga("slow", Some(&cancel)).await.unwrap_err();

    assert!(matches!(err, ApiError::Cancelled { .. }));
}
