use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo, ErrorBody};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

// --- echo ---

#[tokio::test]
async fn echo_reports_method_query_and_headers() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/echo/pet/42?status=available%2Csold&tag=a&tag=b")
                .header("api_key", "special-key")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(r#"{"name":"rex"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.path, "/echo/pet/42");
    assert_eq!(
        echo.query,
        vec![
            ("status".to_string(), "available,sold".to_string()),
            ("tag".to_string(), "a".to_string()),
            ("tag".to_string(), "b".to_string()),
        ]
    );
    assert_eq!(echo.headers["api_key"], "special-key");
    assert_eq!(echo.body, r#"{"name":"rex"}"#);
}

#[tokio::test]
async fn echo_without_query_is_empty() {
    let resp = app()
        .oneshot(Request::builder().uri("/echo").body(String::new()).unwrap())
        .await
        .unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "GET");
    assert!(echo.query.is_empty());
    assert!(echo.body.is_empty());
}

#[tokio::test]
async fn echo_decodes_query_escapes() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/echo?name=a%20b&alt=c+d&word=%C3%BC&ratio=100%25")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    let echo: Echo = body_json(resp).await;
    assert_eq!(
        echo.query,
        vec![
            ("name".to_string(), "a b".to_string()),
            ("alt".to_string(), "c d".to_string()),
            ("word".to_string(), "ü".to_string()),
            ("ratio".to_string(), "100%".to_string()),
        ]
    );
}

// --- status ---

#[tokio::test]
async fn status_returns_requested_code_with_error_body() {
    let resp = app()
        .oneshot(Request::builder().uri("/status/404").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/json");
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.code, 404);
    assert_eq!(body.message, "Not Found");
}

#[tokio::test]
async fn status_out_of_range_returns_400() {
    let resp = app()
        .oneshot(Request::builder().uri("/status/42").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_non_numeric_returns_400() {
    let resp = app()
        .oneshot(Request::builder().uri("/status/teapot").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- delay ---

#[tokio::test]
async fn delay_reports_duration() {
    let resp = app()
        .oneshot(Request::builder().uri("/delay/5").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["delayed_ms"], 5);
}

// --- text ---

#[tokio::test]
async fn text_is_plain() {
    let resp = app()
        .oneshot(Request::builder().uri("/text").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[http::header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_bytes(resp).await, "plain text");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let resp = app()
        .oneshot(Request::builder().uri("/nope").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_bytes(resp).await.is_empty());
}
