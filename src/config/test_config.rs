use super::{Api, Auth, Config, Logs, Metrics, PhotonBox, Probe, Shutdown, K8S};
use std::time::Duration;

/// Creates a new test configuration.
pub fn new_test_config() -> Config {
    Config {
        photon: PhotonBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
                file: None,
            }),
            api: Some(Api {
                name: Some("photon-test".to_string()),
                port: Some(0),
                liveness_port: None,
                max_body_bytes: None,
            }),
            auth: Some(Auth { token: None }),
            shutdown: Some(Shutdown {
                graceful_timeout: Some(Duration::from_secs(2)),
                incoming_traffic_grace_period: Some(Duration::ZERO),
            }),
            k8s: Some(K8S {
                probe: Probe {
                    timeout: Some(Duration::from_secs(1)),
                },
            }),
            metrics: Some(Metrics { enabled: true }),
        },
    }
}
