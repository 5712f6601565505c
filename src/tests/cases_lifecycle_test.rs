// Start-up, initialization and graceful shutdown.

use std::sync::Arc;

use serde_json::json;

use super::support::units::{broken, demo};
use super::support::{do_json, free_port, headers, test_config, TestApp};
use crate::governor::InitState;

#[tokio::test]
async fn failed_init_refuses_to_serve() {
    let instance = broken();
    let err = TestApp::start(test_config(None, None), Arc::clone(&instance))
        .await
        .err()
        .unwrap();
    assert!(format!("{err:#}").contains("weights missing"), "{err:#}");
    assert_eq!(instance.init_state(), InitState::Failed);
}

#[tokio::test]
async fn init_completes_before_the_port_opens() {
    let instance = demo();
    assert_eq!(instance.init_state(), InitState::NotStarted);

    let server = TestApp::start(test_config(None, None), Arc::clone(&instance)).await.unwrap();
    assert!(instance.is_initialized());
    assert_eq!(server.running(), 1);

    let (status, _, _) = do_json("POST", &server.url("/echo"), &headers([]), Some(&json!({"input": "up"})))
        .await
        .unwrap();
    assert_eq!(status, 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stop_closes_every_listener() {
    let server = TestApp::start(test_config(None, Some(free_port())), demo()).await.unwrap();
    let main = server.url("/livez");
    let side = server.liveness_url("/livez").unwrap();
    assert_eq!(server.running(), 2);
    assert!(server.app.instance().is_initialized());

    server.stop().await.unwrap();

    assert!(do_json("GET", &main, &headers([]), None).await.is_err());
    assert!(do_json("GET", &side, &headers([]), None).await.is_err());
}
