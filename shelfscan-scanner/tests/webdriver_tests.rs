// Tests for the WebDriver surface against a stub WebDriver server

use serde_json::json;
use shelfscan_scanner::{RenderSurface, WebDriverSurface};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

const SESSION: &str = "5e55-10n";
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

async fn webdriver_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": {
                "sessionId": SESSION,
                "capabilities": { "browserName": "firefox" }
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(format!("/session/{}", SESSION)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
        .mount(&server)
        .await;

    server
}

fn webdriver_error(error: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "value": {
            "error": error,
            "message": format!("{} (stub)", error),
            "stacktrace": ""
        }
    }))
}

// ============================================================================
// Locating the load-more control
// ============================================================================

#[tokio::test]
async fn test_missing_control_is_none() {
    let server = webdriver_server().await;
    Mock::given(method("POST"))
        .and(path(format!("/session/{}/element", SESSION)))
        .and(body_partial_json(json!({
            "using": "xpath",
            "value": "//*[text()='View more products']"
        })))
        .respond_with(webdriver_error("no such element"))
        .expect(1)
        .mount(&server)
        .await;

    let mut surface = WebDriverSurface::connect(&server.uri()).await.unwrap();
    let found = surface.find_by_text("View more products").await.unwrap();
    assert!(found.is_none());

    surface.close().await.unwrap();
}

#[tokio::test]
async fn test_present_control_is_some() {
    let server = webdriver_server().await;
    Mock::given(method("POST"))
        .and(path(format!("/session/{}/element", SESSION)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "value": { ELEMENT_KEY: "btn-1" } })),
        )
        .mount(&server)
        .await;

    let mut surface = WebDriverSurface::connect(&server.uri()).await.unwrap();
    assert!(surface.find_by_text("View more products").await.unwrap().is_some());

    surface.close().await.unwrap();
}

#[tokio::test]
async fn test_other_lookup_errors_propagate() {
    let server = webdriver_server().await;
    Mock::given(method("POST"))
        .and(path(format!("/session/{}/element", SESSION)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "value": { "error": "unknown error", "message": "browser crashed", "stacktrace": "" }
        })))
        .mount(&server)
        .await;

    let mut surface = WebDriverSurface::connect(&server.uri()).await.unwrap();
    assert!(surface.find_by_text("View more products").await.is_err());

    surface.close().await.unwrap();
}

// ============================================================================
// Stale elements
// ============================================================================

#[tokio::test]
async fn test_stale_click_is_recognised() {
    let server = webdriver_server().await;
    Mock::given(method("POST"))
        .and(path(format!("/session/{}/element", SESSION)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "value": { ELEMENT_KEY: "btn-1" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/session/{}/element/btn-1/click", SESSION)))
        .respond_with(webdriver_error("stale element reference"))
        .mount(&server)
        .await;

    let mut surface = WebDriverSurface::connect(&server.uri()).await.unwrap();
    let control = surface.find_by_text("View more products").await.unwrap().unwrap();

    let err = surface.click(&control).await.unwrap_err();
    assert!(err.is_stale());

    surface.close().await.unwrap();
}
