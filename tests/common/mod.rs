#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, Response, StatusCode},
};
use feedback_vault::{
    app::build_router,
    state::{AppState, ServiceOptions},
    store::MemoryStore,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub backups: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let backups = TempDir::new().expect("temp backup dir");
        let store = Arc::new(MemoryStore::new());
        let options = ServiceOptions::new(backups.path()).password_hash_cost(4);
        let router = build_router(AppState::new(store.clone(), options));

        Self {
            router,
            store,
            backups,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, payload: Option<Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match payload {
            Some(payload) => builder
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("response expected")
    }

    pub async fn send_json(&self, method: Method, uri: &str, payload: Value) -> (StatusCode, Value) {
        read_json(self.request(method, uri, Some(payload)).await).await
    }

    pub async fn send_empty(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        read_json(self.request(method, uri, None).await).await
    }

    pub async fn create_customer(&self, name: &str, email: &str) -> Value {
        let (status, body) = self
            .send_json(
                Method::POST,
                "/customers",
                json!({ "name": name, "email": email, "password": "secret" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "customer create failed: {body}");
        body
    }

    /// Registers a customer and submits their feedback, returning the feedback id.
    pub async fn seed_feedback(&self, email: &str, message: &str, satisfaction: u8) -> String {
        self.create_customer("Customer", email).await;
        let (status, body) = self
            .send_json(
                Method::POST,
                "/customers/feedback",
                json!({ "email": email, "message": message, "satisfaction": satisfaction }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "feedback create failed: {body}");
        body["feedback"]["id"]
            .as_str()
            .expect("created feedback should have id")
            .to_string()
    }
}

pub async fn read_json(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }

    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

/// Reads an event-stream body to its end and returns the JSON payload of
/// every `data:` frame.
pub async fn read_frames(response: Response<Body>) -> Vec<Value> {
    let body = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should end")
    .expect("stream body should be readable");

    let text = String::from_utf8(body.to_vec()).expect("stream should be utf-8");
    text.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).expect("frame should be JSON"))
        .collect()
}
