mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode, header};
use common::{TestApp, read_frames, read_json};
use feedback_vault::store::RecordStore;
use serde_json::json;

async fn wait_for_no_active_streams(app: &TestApp) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = app.send_empty(Method::GET, "/changestream/active").await;
            if body["active"] == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("streams should be released");
}

#[tokio::test]
async fn stream_uses_event_stream_headers() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;

    let response = app
        .request(Method::GET, &format!("/changestream/feedback/{id}"), None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert_eq!(headers["x-accel-buffering"], "no");
}

#[tokio::test]
async fn delete_is_the_last_frame() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;

    let stream = app
        .request(Method::PUT, &format!("/changestream/feedback/{id}"), None)
        .await;
    assert_eq!(stream.status(), StatusCode::OK);

    let (status, _) = app
        .send_json(
            Method::PATCH,
            &format!("/feedbacks/{id}"),
            json!({ "message": "better" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send_json(
            Method::PUT,
            &format!("/feedbacks/{id}"),
            json!({ "message": "rewritten", "satisfaction": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send_empty(Method::DELETE, &format!("/feedbacks/{id}"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let frames = read_frames(stream).await;
    let operations: Vec<_> = frames
        .iter()
        .map(|frame| frame["operationType"].as_str().unwrap())
        .collect();
    assert_eq!(operations, vec!["update", "replace", "delete"]);

    assert_eq!(frames[0]["changes"], json!({ "message": "better" }));
    assert_eq!(frames[1]["fullDocument"]["satisfaction"], 4);
    for frame in &frames {
        assert_eq!(frame["documentId"], id.as_str());
        assert!(frame["timestamp"].is_string());
    }

    wait_for_no_active_streams(&app).await;
    assert_eq!(app.store.feed_subscriber_count(), 0);
}

#[tokio::test]
async fn other_records_never_reach_the_stream() {
    let app = TestApp::new();
    let watched = app.seed_feedback("a@x.com", "watched", 5).await;
    let other = app.seed_feedback("b@x.com", "other", 3).await;

    let stream = app
        .request(Method::GET, &format!("/changestream/feedback/{watched}"), None)
        .await;

    app.send_json(
        Method::PATCH,
        &format!("/feedbacks/{other}"),
        json!({ "message": "noise" }),
    )
    .await;
    app.send_empty(Method::DELETE, &format!("/feedbacks/{other}"))
        .await;
    app.send_empty(Method::DELETE, &format!("/feedbacks/{watched}"))
        .await;

    let frames = read_frames(stream).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["operationType"], "delete");
    assert_eq!(frames[0]["documentId"], watched.as_str());
}

#[tokio::test]
async fn closing_the_connection_releases_the_subscription() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;

    for _ in 0..10 {
        let stream = app
            .request(Method::GET, &format!("/changestream/feedback/{id}"), None)
            .await;
        assert_eq!(stream.status(), StatusCode::OK);

        let (_, body) = app.send_empty(Method::GET, "/changestream/active").await;
        assert_eq!(body["active"], 1);
        assert_eq!(body["subscriptions"][0]["documentId"], id.as_str());

        drop(stream);
        wait_for_no_active_streams(&app).await;
    }

    assert_eq!(app.store.feed_subscriber_count(), 0);
}

#[tokio::test]
async fn invalid_id_fails_before_streaming() {
    let app = TestApp::new();

    let response = app
        .request(Method::GET, "/changestream/feedback/not-a-uuid", None)
        .await;
    assert_ne!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(b"text/event-stream".as_slice())
    );

    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn unavailable_store_fails_before_streaming() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;
    app.store.shutdown();

    let (status, body) = app
        .send_empty(Method::GET, &format!("/changestream/feedback/{id}"))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "store_unavailable");
}

#[tokio::test]
async fn feed_shutdown_ends_open_streams_with_an_error_frame() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;

    let stream = app
        .request(Method::GET, &format!("/changestream/feedback/{id}"), None)
        .await;
    app.store.shutdown();

    let frames = read_frames(stream).await;
    assert_eq!(
        frames,
        vec![json!({ "error": "Stream error occurred", "details": "change feed closed" })]
    );
}

#[tokio::test]
async fn bulk_customer_deletes_do_not_end_the_stream() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;
    for i in 0..300 {
        app.store
            .insert_customer(feedback_vault::model::CustomerRecord::new(
                "Bulk",
                format!("bulk{i}@x.com"),
                String::new(),
            ))
            .await
            .unwrap();
    }

    let stream = app
        .request(Method::GET, &format!("/changestream/feedback/{id}"), None)
        .await;

    let (status, body) = app
        .send_empty(Method::DELETE, "/customers/delete-all")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 301);

    app.send_empty(Method::DELETE, &format!("/feedbacks/{id}"))
        .await;

    let frames = read_frames(stream).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["operationType"], "delete");
    assert_eq!(frames[0]["documentId"], id.as_str());
}
