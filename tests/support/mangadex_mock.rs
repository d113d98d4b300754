//! Canned MangaDex responses mounted on a wiremock server.

#![allow(dead_code)]

use std::time::Duration;

use manga_sync_core::SyncConfig;
use manga_sync_core::api::ClassBudget;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A config pointed at `server` with no pacing, one title per catalog page.
pub fn fast_config(server: &MockServer) -> SyncConfig {
    let unthrottled = ClassBudget {
        requests_per_window: 10_000,
        window: Duration::from_secs(1),
        max_concurrent: 10,
        min_spacing: Duration::ZERO,
    };
    SyncConfig {
        base_url: server.uri(),
        general_budget: unthrottled,
        page_server_budget: unthrottled,
        retry_base_delay: Duration::from_millis(10),
        retry_max_delay: Duration::from_millis(20),
        batch_size: 1,
        batch_delay: Duration::ZERO,
        ..SyncConfig::default()
    }
}

pub fn manga_json(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "type": "manga",
        "attributes": {
            "title": {"en": title},
            "altTitles": [{"ja": format!("{title} (ja)")}],
            "description": {"en": format!("About {title}")},
            "status": "ongoing",
            "contentRating": "safe",
            "tags": [
                {"id": "t-action", "attributes": {"name": {"en": "Action"}, "group": "genre"}}
            ],
            "createdAt": "2020-01-01T00:00:00+00:00",
            "updatedAt": "2024-06-01T12:00:00+00:00"
        },
        "relationships": [
            {"id": format!("{id}-author"), "type": "author", "attributes": {"name": "Author"}},
            {"id": format!("{id}-artist"), "type": "artist", "attributes": {"name": "Artist"}},
            {"id": format!("{id}-cover"), "type": "cover_art", "attributes": {"fileName": "cover.jpg"}}
        ]
    })
}

pub fn chapter_json(id: &str, number: &str) -> Value {
    json!({
        "id": id,
        "type": "chapter",
        "attributes": {
            "chapter": number,
            "volume": "1",
            "title": format!("Chapter {number}"),
            "publishAt": "2024-01-01T00:00:00+00:00"
        }
    })
}

fn collection(data: Vec<Value>, offset: u32) -> Value {
    let total = data.len();
    json!({"result": "ok", "data": data, "limit": 1, "offset": offset, "total": total})
}

/// Mounts `/manga` pages: one title per offset, then an empty page.
pub async fn mount_catalog(server: &MockServer, titles: &[(&str, &str)]) {
    for (offset, (id, title)) in titles.iter().enumerate() {
        let offset = u32::try_from(offset).unwrap();
        Mock::given(method("GET"))
            .and(path("/manga"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(collection(vec![manga_json(id, title)], offset)),
            )
            .mount(server)
            .await;
    }
    let end = u32::try_from(titles.len()).unwrap();
    Mock::given(method("GET"))
        .and(path("/manga"))
        .and(query_param("offset", end.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(collection(Vec::new(), end)))
        .mount(server)
        .await;
}

/// Mounts the recently-updated listing: one title per offset from `start`.
///
/// The offset after the last title answers only if `expect_past_end` allows,
/// so a bounded pass that reads past its window fails verification.
pub async fn mount_updated(
    server: &MockServer,
    start: u32,
    titles: &[(&str, &str)],
    expect_past_end: u64,
) {
    let mut offset = start;
    for (id, title) in titles {
        Mock::given(method("GET"))
            .and(path("/manga"))
            .and(query_param("order[updatedAt]", "desc"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(collection(vec![manga_json(id, title)], offset)),
            )
            .mount(server)
            .await;
        offset += 1;
    }
    Mock::given(method("GET"))
        .and(path("/manga"))
        .and(query_param("order[updatedAt]", "desc"))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(collection(Vec::new(), offset)))
        .expect(0..=expect_past_end)
        .mount(server)
        .await;
}

/// Mounts `/manga/{id}` for a single title.
pub async fn mount_title(server: &MockServer, id: &str, title: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/manga/{id}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": "ok", "data": manga_json(id, title)})),
        )
        .mount(server)
        .await;
}

/// Mounts a single-page chapter feed for `manga_id`.
pub async fn mount_feed(server: &MockServer, manga_id: &str, chapter_ids: &[&str]) {
    let chapters = chapter_ids
        .iter()
        .enumerate()
        .map(|(i, id)| chapter_json(id, &(i + 1).to_string()))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/manga/{manga_id}/feed")))
        .respond_with(ResponseTemplate::new(200).set_body_json(collection(chapters, 0)))
        .mount(server)
        .await;
}

/// Mounts the page-server manifest of `chapter_id` with `files` as data-saver pages.
pub async fn mount_pages(server: &MockServer, chapter_id: &str, files: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/at-home/server/{chapter_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "ok",
            "baseUrl": "https://node.test",
            "chapter": {
                "hash": format!("hash-{chapter_id}"),
                "data": files,
                "dataSaver": files
            }
        })))
        .mount(server)
        .await;
}

/// Expected data-saver URL of a page mounted with [`mount_pages`].
pub fn page_url(chapter_id: &str, file: &str) -> String {
    format!("https://node.test/data-saver/hash-{chapter_id}/{file}")
}
