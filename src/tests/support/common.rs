// Common test utilities for integration tests.

use std::collections::HashMap;
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use serde_json::Value;
use tower::ServiceExt;

pub type H = HashMap<String, String>;

/// Builds a header map from pairs.
pub fn headers<const N: usize>(pairs: [(&str, &str); N]) -> H {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Makes an HTTP request.
pub async fn do_request(
    method: &str,
    url: &str,
    headers: &H,
    body: Option<&Value>,
) -> Result<reqwest::Response, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let method = reqwest::Method::from_bytes(method.as_bytes()).expect("valid method");
    let mut request = client.request(method, url);
    for (k, v) in headers {
        request = request.header(k, v);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    request.send().await
}

/// Makes an HTTP request and parses the JSON response. A body that is not
/// JSON comes back as `Value::Null`.
pub async fn do_json(
    method: &str,
    url: &str,
    headers: &H,
    body: Option<&Value>,
) -> Result<(u16, HashMap<String, String>, Value), reqwest::Error> {
    let resp = do_request(method, url, headers, body).await?;
    let status = resp.status().as_u16();

    let mut header_map = HashMap::new();
    for (k, v) in resp.headers() {
        if let Ok(v) = v.to_str() {
            header_map.insert(k.as_str().to_string(), v.to_string());
        }
    }

    let bytes = resp.bytes().await?;
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, header_map, json))
}

/// Sends one request through `router` without a socket.
pub async fn oneshot(router: Router, method: &str, uri: &str, body: Option<&Value>) -> (u16, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}
