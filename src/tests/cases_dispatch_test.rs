// Entry-point dispatch through the full router.

use serde_json::json;

use super::support::units::{demo, inner_unit, PNG_MAGIC};
use super::support::{do_request, headers, oneshot, router, test_config, TestApp};
use crate::instance::HostedInstance;

#[tokio::test]
async fn typed_entry_point_round_trips() {
    let (status, body) = oneshot(router(test_config(None, None), demo()), "POST", "/echo", Some(&json!({"input": "hi"}))).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!("hi"));
}

#[tokio::test]
async fn invalid_body_yields_field_errors() {
    let app = router(test_config(None, None), demo());

    let (status, body) = oneshot(app.clone(), "POST", "/echo", Some(&json!({"input": 5}))).await;
    assert_eq!(status, 422);
    assert_eq!(body["detail"][0]["loc"], json!(["body", "input"]));
    assert_eq!(body["detail"][0]["type"], "string_type");

    let (status, body) = oneshot(app, "POST", "/echo", Some(&json!({}))).await;
    assert_eq!(status, 422);
    assert_eq!(body["detail"][0]["msg"], "Field required");
}

#[tokio::test]
async fn get_entry_point_reads_the_query() {
    let app = router(test_config(None, None), demo());

    let (status, body) = oneshot(app.clone(), "GET", "/lookup?q=cats&limit=3", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"q": "cats", "limit": 3}));

    let (status, body) = oneshot(app.clone(), "GET", "/lookup?q=dogs", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["limit"], 10);

    let (status, body) = oneshot(app, "GET", "/lookup?q=x&limit=many", None).await;
    assert_eq!(status, 422);
    assert_eq!(body["detail"][0]["loc"], json!(["query", "limit"]));
}

#[tokio::test]
async fn default_entry_point_catches_unknown_paths() {
    let app = router(test_config(None, None), demo());

    let (status, body) = oneshot(app.clone(), "POST", "/", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["path"], "/");

    let (status, body) = oneshot(app.clone(), "POST", "/no/such/route", Some(&json!({"x": 1}))).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"path": "/no/such/route", "method": "POST"}));

    let (status, body) = oneshot(app, "GET", "/no/such/route", None).await;
    assert_eq!(status, 405);
    assert_eq!(body, json!({"detail": "Method Not Allowed"}));
}

#[tokio::test]
async fn without_default_entry_point_unknown_paths_are_404() {
    let app = router(test_config(None, None), HostedInstance::new(inner_unit()));
    let (status, body) = oneshot(app, "POST", "/missing", None).await;
    assert_eq!(status, 404);
    assert_eq!(body, json!({"detail": "Not Found"}));
}

#[tokio::test]
async fn declared_path_with_wrong_method_is_405() {
    let (status, _) = oneshot(router(test_config(None, None), demo()), "GET", "/echo", None).await;
    assert_eq!(status, 405);
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let mut cfg = test_config(None, None);
    if let Some(api) = cfg.photon.api.as_mut() {
        api.max_body_bytes = Some(64);
    }
    let app = router(cfg, demo());

    let (status, body) = oneshot(app.clone(), "POST", "/echo", Some(&json!({"input": "x".repeat(256)}))).await;
    assert_eq!(status, 413);
    assert!(body["detail"].is_string());

    // The default entry point is bounded as well.
    let (status, _) = oneshot(app.clone(), "POST", "/anywhere", Some(&json!({"blob": "y".repeat(256)}))).await;
    assert_eq!(status, 413);

    let (status, body) = oneshot(app, "POST", "/echo", Some(&json!({"input": "small"}))).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!("small"));
}

#[tokio::test]
async fn raw_response_passes_through() {
    let server = TestApp::start(test_config(None, None), demo()).await.unwrap();

    let resp = do_request("POST", &server.url("/image"), &headers([]), None).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &PNG_MAGIC[..]);

    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_handler_times_out() {
    let (status, body) = oneshot(router(test_config(None, None), demo()), "POST", "/slow", None).await;
    assert_eq!(status, 504);
    assert!(body["detail"].as_str().unwrap().contains("did not finish"));
}
