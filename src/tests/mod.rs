
use serde_json::json;

use crate::app::{App, Request, Response};
use crate::capture::CaptureRequest;
use crate::config::Config;
use crate::store::StoreLocation;

/// An app over an in-memory database with a fixed index seed.
pub async fn create_app() -> App {
    let mut config = Config::default();
    config.index.seed = Some(42);

    let app = App::start_at(config, StoreLocation::Memory);
    app.store().wait_hydrated().await;
    app
}

pub fn capture_request(url: &str, title: &str, text: &str, timestamp: i64) -> Request {
    Request::Capture(CaptureRequest {
        url: url.to_string(),
        title: title.to_string(),
        text: text.to_string(),
        timestamp: Some(timestamp),
        domain: None,
        favicon: None,
    })
}

/// Capture and wait until the page is stored.
pub async fn capture(app: &App, url: &str, title: &str, text: &str, timestamp: i64) -> Response {
    let response = app
        .dispatch(capture_request(url, title, text, timestamp))
        .await;
    app.flush().await.unwrap();
    response
}

pub fn data(response: Response) -> serde_json::Value {
    assert!(response.success, "request failed: {:?}", response.error);
    response.data.unwrap_or(json!(null))
}
