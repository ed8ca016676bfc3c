mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::{Value, json};
use tokio_test::assert_ok;

async fn create_backup(app: &TestApp) -> String {
    let (status, body) = app.send_empty(Method::POST, "/backup").await;
    assert_eq!(status, StatusCode::OK, "backup failed: {body}");
    assert_eq!(body["message"], "Backup created successfully");
    body["filename"].as_str().unwrap().to_string()
}

fn ids(collection: &Value) -> Vec<String> {
    let mut ids: Vec<String> = collection
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn deleted_feedback_comes_back_after_restore() {
    let app = TestApp::new();
    let id = app.seed_feedback("a@x.com", "good", 5).await;
    let (_, before) = app.send_empty(Method::GET, "/feedbacks").await;

    let backup = create_backup(&app).await;

    let (status, _) = app
        .send_empty(Method::DELETE, &format!("/feedbacks/{id}"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send_empty(Method::POST, &format!("/restore/{backup}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Restore completed successfully");
    assert_eq!(
        body["stats"],
        json!({ "customers": 1, "feedbacks": 1, "responses": 0 })
    );

    let (_, after) = app.send_empty(Method::GET, "/feedbacks").await;
    assert_eq!(after, before);
    assert_eq!(after[0]["id"], id.as_str());
}

#[tokio::test]
async fn restore_replaces_live_state_with_the_snapshot() {
    let app = TestApp::new();
    let kept = app.seed_feedback("a@x.com", "first", 4).await;
    let (_, customers_before) = app.send_empty(Method::GET, "/customers").await;

    let backup = create_backup(&app).await;

    app.seed_feedback("b@x.com", "added later", 1).await;
    let (status, _) = app
        .send_json(
            Method::PATCH,
            &format!("/feedbacks/{kept}"),
            json!({ "message": "edited later" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send_empty(Method::POST, &format!("/restore/{backup}"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, customers) = app.send_empty(Method::GET, "/customers").await;
    assert_eq!(ids(&customers), ids(&customers_before));

    let (_, feedbacks) = app.send_empty(Method::GET, "/feedbacks").await;
    assert_eq!(ids(&feedbacks), vec![kept.clone()]);
    assert_eq!(feedbacks[0]["message"], "first");

    // Uniqueness still holds against restored data.
    let (status, _) = app
        .send_json(
            Method::POST,
            "/customers/feedback",
            json!({ "email": "a@x.com", "message": "duplicate", "satisfaction": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn backups_are_listed_and_readable() {
    let app = TestApp::new();
    let (status, body) = app.send_empty(Method::GET, "/backups").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    app.seed_feedback("a@x.com", "good", 5).await;
    let first = create_backup(&app).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = create_backup(&app).await;
    assert_ne!(first, second);

    let (_, body) = app.send_empty(Method::GET, "/backups").await;
    assert_eq!(body, json!([first, second]));

    let (status, body) = app
        .send_empty(Method::GET, &format!("/backup/{first}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Backup contents retrieved successfully");
    assert_eq!(
        body["stats"],
        json!({ "customers": 1, "feedbacks": 1, "responses": 0 })
    );
    assert_eq!(body["data"]["feedbacks"][0]["customerEmail"], "a@x.com");

    let on_disk = assert_ok!(std::fs::read_to_string(app.backups.path().join(&first)));
    let artifact: Value = assert_ok!(serde_json::from_str(&on_disk));
    assert!(artifact["timestamp"].is_string());
    assert_eq!(artifact["data"]["customers"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send_empty(Method::DELETE, &format!("/backup/{first}"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send_empty(Method::GET, "/backups").await;
    assert_eq!(body, json!([second]));
}

#[tokio::test]
async fn missing_backups_are_not_found() {
    let app = TestApp::new();
    create_backup(&app).await;

    for (method, uri) in [
        (Method::GET, "/backup/backup-1-deadbeef.json"),
        (Method::DELETE, "/backup/backup-1-deadbeef.json"),
        (Method::POST, "/restore/backup-1-deadbeef.json"),
        (Method::GET, "/backup/notes.txt"),
    ] {
        let (status, body) = app.send_empty(method, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}: {body}");
        assert_eq!(body["code"], "not_found");
    }
}

#[tokio::test]
async fn corrupt_backup_is_reported_without_touching_the_store() {
    let app = TestApp::new();
    app.seed_feedback("a@x.com", "good", 5).await;

    let name = "backup-1700000000000-deadbeef.json";
    std::fs::write(app.backups.path().join(name), "{\"timestamp\": \"2024-").unwrap();

    let (status, body) = app.send_empty(Method::GET, &format!("/backup/{name}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "artifact_corrupt");
    assert!(body["details"].is_string());

    let (status, body) = app
        .send_empty(Method::POST, &format!("/restore/{name}"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "artifact_corrupt");

    let (_, feedbacks) = app.send_empty(Method::GET, "/feedbacks").await;
    assert_eq!(feedbacks.as_array().unwrap().len(), 1);
}
