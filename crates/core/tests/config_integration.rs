//! pktgate.toml 통합 설정 테스트
//!
//! - pktgate.toml.example 파싱 및 기본값 일치
//! - 부분 설정 (일부 섹션만 지정)
//! - 환경변수 오버라이드 우선순위
//! - 파일 로딩 에러

use pktgate_core::config::PktgateConfig;
use pktgate_core::error::{ConfigError, PktgateError};

const EXAMPLE: &str = include_str!("../../../pktgate.toml.example");

// =============================================================================
// pktgate.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = PktgateConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.pid_file, "/var/run/pktgate/pktgate.pid");
    assert_eq!(config.engine.tables_path, "/etc/pktgate/tables.toml");
}

#[test]
fn example_config_passes_validation() {
    let config = PktgateConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let from_file = PktgateConfig::parse(EXAMPLE).expect("should parse");
    let from_code = PktgateConfig::default();

    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);

    assert_eq!(from_file.metrics.enabled, from_code.metrics.enabled);
    assert_eq!(from_file.metrics.port, from_code.metrics.port);
    assert_eq!(from_file.metrics.endpoint, from_code.metrics.endpoint);

    assert_eq!(from_file.engine.default_action, from_code.engine.default_action);
    assert_eq!(from_file.engine.rule_priority, from_code.engine.rule_priority);
    assert_eq!(from_file.engine.inspect_ports, from_code.engine.inspect_ports);
    assert_eq!(from_file.engine.stats_shards, from_code.engine.stats_shards);
    assert_eq!(from_file.engine.max_services, from_code.engine.max_services);
    assert_eq!(from_file.engine.max_rules, from_code.engine.max_rules);
    assert_eq!(from_file.engine.max_auth_tokens, from_code.engine.max_auth_tokens);

    assert_eq!(from_file.rate_limit.enabled, from_code.rate_limit.enabled);
    assert_eq!(
        from_file.rate_limit.window_size_ms,
        from_code.rate_limit.window_size_ms
    );
    assert_eq!(from_file.rate_limit.max_sources, from_code.rate_limit.max_sources);

    assert_eq!(from_file.conntrack.capacity, from_code.conntrack.capacity);
    assert_eq!(
        from_file.conntrack.idle_timeout_secs,
        from_code.conntrack.idle_timeout_secs
    );
    assert_eq!(
        from_file.conntrack.normalize_direction,
        from_code.conntrack.normalize_direction
    );

    assert_eq!(from_file.ingress.enabled, from_code.ingress.enabled);
    assert_eq!(from_file.ingress.bind, from_code.ingress.bind);
    assert_eq!(from_file.ingress.max_frame_size, from_code.ingress.max_frame_size);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn empty_config_uses_defaults() {
    let config = PktgateConfig::parse("").expect("empty config should parse");
    config.validate().expect("defaults should validate");

    assert_eq!(config.engine.default_action, "redirect_slow");
    assert!(config.engine.tables_path.is_empty());
    assert!(!config.ingress.enabled);
}

#[test]
fn partial_config_engine_only() {
    let toml = r#"
[engine]
default_action = "drop"
inspect_ports = [443]
"#;
    let config = PktgateConfig::parse(toml).expect("should parse");

    assert_eq!(config.engine.default_action, "drop");
    assert_eq!(config.engine.inspect_ports, vec![443]);
    // 생략된 필드와 섹션은 기본값
    assert_eq!(config.engine.max_rules, 4096);
    assert_eq!(config.conntrack.capacity, 16_384);
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn partial_config_two_sections() {
    let toml = r#"
[rate_limit]
per_source_pps_limit = 1000
burst_allowance = 100

[conntrack]
capacity = 1024
shards = 4
"#;
    let config = PktgateConfig::parse(toml).expect("should parse");
    config.validate().expect("should validate");

    assert_eq!(config.rate_limit.per_source_pps_limit, 1000);
    assert_eq!(config.rate_limit.burst_allowance, 100);
    assert_eq!(config.rate_limit.global_pps_limit, 0);
    assert_eq!(config.conntrack.capacity, 1024);
    assert_eq!(config.conntrack.shards, 4);
}

#[test]
fn unknown_field_type_is_parse_error() {
    let toml = r#"
[conntrack]
capacity = "lots"
"#;
    let err = PktgateConfig::parse(toml).expect_err("wrong type should fail");
    assert!(matches!(
        err,
        PktgateError::Config(ConfigError::ParseFailed { .. })
    ));
}

// =============================================================================
// 검증 테스트
// =============================================================================

#[test]
fn conntrack_shards_must_not_exceed_capacity() {
    let toml = r#"
[conntrack]
capacity = 8
shards = 16
"#;
    let config = PktgateConfig::parse(toml).expect("should parse");
    let err = config.validate().expect_err("should be rejected");
    assert!(err.to_string().contains("conntrack.shards"));
}

#[test]
fn ingress_bind_checked_when_enabled() {
    let toml = r#"
[ingress]
enabled = true
bind = "localhost"
"#;
    let config = PktgateConfig::parse(toml).expect("should parse");
    let err = config.validate().expect_err("host without port should be rejected");
    assert!(err.to_string().contains("ingress.bind"));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

/// 환경변수를 설정한 채로 `f`를 실행하고 원래 값으로 되돌립니다.
fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: 이 파일의 환경변수 테스트는 serial로 직렬화됩니다.
    unsafe {
        std::env::set_var(key, value);
    }
    let result = f();
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;
    let level = with_env("PKTGATE_GENERAL_LOG_LEVEL", "error", || {
        let mut config = PktgateConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });
    assert_eq!(level, "error");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let limit = with_env("PKTGATE_RATE_LIMIT_GLOBAL_PPS_LIMIT", "50000", || {
        let mut config = PktgateConfig::default();
        config.apply_env_overrides();
        config.rate_limit.global_pps_limit
    });
    assert_eq!(limit, 50_000);
}

#[test]
#[serial_test::serial]
fn env_override_csv_for_inspect_ports() {
    let ports = with_env("PKTGATE_ENGINE_INSPECT_PORTS", "80, 8443", || {
        let mut config = PktgateConfig::default();
        config.apply_env_overrides();
        config.engine.inspect_ports
    });
    assert_eq!(ports, vec![80, 8443]);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let normalize = with_env("PKTGATE_CONNTRACK_NORMALIZE_DIRECTION", "true", || {
        let mut config = PktgateConfig::default();
        config.apply_env_overrides();
        config.conntrack.normalize_direction
    });
    assert!(normalize);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_value_keeps_original() {
    let capacity = with_env("PKTGATE_CONNTRACK_CAPACITY", "not-a-number", || {
        let mut config = PktgateConfig::default();
        config.apply_env_overrides();
        config.conntrack.capacity
    });
    assert_eq!(capacity, 16_384);
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_reads_file_and_validates() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    let path = dir.path().join("pktgate.toml");
    std::fs::write(&path, "[engine]\ndefault_action = \"pass\"\n").expect("should write");

    let config = PktgateConfig::load(&path).await.expect("should load");
    assert_eq!(config.engine.default_action, "pass");

    std::fs::write(&path, "[engine]\ndefault_action = \"reject\"\n").expect("should write");
    let err = PktgateConfig::load(&path).await.expect_err("invalid action");
    assert!(matches!(
        err,
        PktgateError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn load_missing_file_is_file_not_found() {
    let dir = tempfile::TempDir::new().expect("should create temp dir");
    let err = PktgateConfig::load(dir.path().join("missing.toml"))
        .await
        .expect_err("missing file");
    assert!(matches!(
        err,
        PktgateError::Config(ConfigError::FileNotFound { .. })
    ));
}
