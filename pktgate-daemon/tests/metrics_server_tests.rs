//! Integration tests for the metrics server.
//!
//! The global recorder can be installed only once per process, so these run
//! serially and only one test expects a successful install.

use pktgate_core::config::MetricsConfig;
use pktgate_daemon::metrics_server;
use serial_test::serial;

#[test]
#[serial]
fn test_listen_addr_combines_host_and_port() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19200,
        endpoint: "/metrics".to_string(),
    };

    let addr = metrics_server::listen_addr(&config).expect("valid address");
    assert_eq!(addr.to_string(), "127.0.0.1:19200");
}

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    // Given: An invalid listen address
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_string(),
        port: 9100,
        endpoint: "/metrics".to_string(),
    };

    // When/Then: Installing fails before touching the global recorder
    let result = metrics_server::install_metrics_recorder(&config);
    assert!(
        result.is_err(),
        "install_metrics_recorder should fail with invalid address"
    );
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_unsupported_endpoint() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19201,
        endpoint: "/custom".to_string(),
    };

    let result = metrics_server::install_metrics_recorder(&config);
    let err = result.expect_err("custom endpoint should be rejected");
    assert!(err.to_string().contains("/custom"));
}

#[tokio::test]
#[serial]
async fn test_install_metrics_recorder_succeeds_with_valid_config() {
    // Given: A valid metrics configuration on a non-standard port
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19202,
        endpoint: "/metrics".to_string(),
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should succeed
    assert!(
        result.is_ok(),
        "install_metrics_recorder should succeed with valid config: {:?}",
        result.err()
    );
}
