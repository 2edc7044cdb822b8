//! 설정 관리: pktgate.toml 파싱 및 런타임 설정
//!
//! [`PktgateConfig`]는 데몬, CLI, 엔진이 공유하는 최상위 설정 구조체입니다.
//! 서비스/룰/토큰 테이블은 이 파일이 아니라 `engine.tables_path`가 가리키는
//! 별도의 테이블 파일에 정의됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PKTGATE_RATE_LIMIT_GLOBAL_PPS_LIMIT=50000` 형식)
//! 3. 설정 파일 (`pktgate.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), pktgate_core::error::PktgateError> {
//! use pktgate_core::config::PktgateConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PktgateConfig::load("pktgate.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PktgateConfig::parse("[engine]\ndefault_action = \"drop\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PktgateError};

/// 판정 가능한 기본 액션 이름
pub const DEFAULT_ACTIONS: [&str; 3] = ["redirect_slow", "drop", "pass"];

/// pktgate 통합 설정
///
/// `pktgate.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PktgateConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 판정 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 레이트 리미터 설정
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// 연결 추적 설정
    #[serde(default)]
    pub conntrack: ConntrackConfig,
    /// 미러 수신(ingress) 설정
    #[serde(default)]
    pub ingress: IngressConfig,
}

impl PktgateConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PktgateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PktgateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PktgateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PktgateError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PktgateError> {
        toml::from_str(toml_str).map_err(|e| {
            PktgateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PKTGATE_{SECTION}_{FIELD}`
    /// 예: `PKTGATE_CONNTRACK_CAPACITY=65536`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PKTGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PKTGATE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "PKTGATE_GENERAL_PID_FILE");

        // Metrics
        override_bool(&mut self.metrics.enabled, "PKTGATE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "PKTGATE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "PKTGATE_METRICS_PORT");

        // Engine
        override_string(&mut self.engine.tables_path, "PKTGATE_ENGINE_TABLES_PATH");
        override_string(
            &mut self.engine.default_action,
            "PKTGATE_ENGINE_DEFAULT_ACTION",
        );
        override_bool(&mut self.engine.rule_priority, "PKTGATE_ENGINE_RULE_PRIORITY");
        override_port_csv(&mut self.engine.inspect_ports, "PKTGATE_ENGINE_INSPECT_PORTS");
        override_usize(&mut self.engine.stats_shards, "PKTGATE_ENGINE_STATS_SHARDS");
        override_u64(
            &mut self.engine.stats_interval_secs,
            "PKTGATE_ENGINE_STATS_INTERVAL_SECS",
        );

        // Rate limit
        override_bool(&mut self.rate_limit.enabled, "PKTGATE_RATE_LIMIT_ENABLED");
        override_u64(
            &mut self.rate_limit.global_pps_limit,
            "PKTGATE_RATE_LIMIT_GLOBAL_PPS_LIMIT",
        );
        override_u64(
            &mut self.rate_limit.per_source_pps_limit,
            "PKTGATE_RATE_LIMIT_PER_SOURCE_PPS_LIMIT",
        );
        override_u64(
            &mut self.rate_limit.window_size_ms,
            "PKTGATE_RATE_LIMIT_WINDOW_SIZE_MS",
        );
        override_u64(
            &mut self.rate_limit.burst_allowance,
            "PKTGATE_RATE_LIMIT_BURST_ALLOWANCE",
        );
        override_usize(&mut self.rate_limit.max_sources, "PKTGATE_RATE_LIMIT_MAX_SOURCES");

        // Conntrack
        override_usize(&mut self.conntrack.capacity, "PKTGATE_CONNTRACK_CAPACITY");
        override_usize(&mut self.conntrack.shards, "PKTGATE_CONNTRACK_SHARDS");
        override_u64(
            &mut self.conntrack.idle_timeout_secs,
            "PKTGATE_CONNTRACK_IDLE_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.conntrack.normalize_direction,
            "PKTGATE_CONNTRACK_NORMALIZE_DIRECTION",
        );

        // Ingress
        override_bool(&mut self.ingress.enabled, "PKTGATE_INGRESS_ENABLED");
        override_string(&mut self.ingress.bind, "PKTGATE_INGRESS_BIND");
        override_usize(&mut self.ingress.workers, "PKTGATE_INGRESS_WORKERS");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PktgateError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be non-zero when metrics are enabled".to_owned(),
            ));
        }

        if !DEFAULT_ACTIONS.contains(&self.engine.default_action.as_str()) {
            return Err(invalid(
                "engine.default_action",
                format!("must be one of: {}", DEFAULT_ACTIONS.join(", ")),
            ));
        }

        non_zero("engine.stats_interval_secs", self.engine.stats_interval_secs)?;
        non_zero("engine.max_services", self.engine.max_services as u64)?;
        non_zero("engine.max_rules", self.engine.max_rules as u64)?;
        non_zero("engine.max_auth_tokens", self.engine.max_auth_tokens as u64)?;

        // rate_limit 검증
        non_zero("rate_limit.window_size_ms", self.rate_limit.window_size_ms)?;
        non_zero("rate_limit.max_sources", self.rate_limit.max_sources as u64)?;
        non_zero("rate_limit.shards", self.rate_limit.shards as u64)?;
        if self.rate_limit.shards > self.rate_limit.max_sources {
            return Err(invalid(
                "rate_limit.shards",
                "must not exceed rate_limit.max_sources".to_owned(),
            ));
        }

        // conntrack 검증
        non_zero("conntrack.capacity", self.conntrack.capacity as u64)?;
        non_zero("conntrack.shards", self.conntrack.shards as u64)?;
        non_zero("conntrack.idle_timeout_secs", self.conntrack.idle_timeout_secs)?;
        non_zero(
            "conntrack.sweep_interval_secs",
            self.conntrack.sweep_interval_secs,
        )?;
        if self.conntrack.shards > self.conntrack.capacity {
            return Err(invalid(
                "conntrack.shards",
                "must not exceed conntrack.capacity".to_owned(),
            ));
        }

        // ingress 검증
        if self.ingress.enabled {
            if self.ingress.bind.parse::<SocketAddr>().is_err() {
                return Err(invalid(
                    "ingress.bind",
                    format!("'{}' is not a valid socket address", self.ingress.bind),
                ));
            }
            non_zero("ingress.workers", self.ingress.workers as u64)?;
            non_zero("ingress.queue_depth", self.ingress.queue_depth as u64)?;
            non_zero("ingress.max_frame_size", self.ingress.max_frame_size as u64)?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> PktgateError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn non_zero(field: &str, value: u64) -> Result<(), PktgateError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than 0".to_owned()));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// Prometheus 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 판정 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 서비스/룰/토큰 테이블 파일 경로 (빈 문자열이면 빈 테이블로 시작)
    pub tables_path: String,
    /// 서비스가 매칭되지 않을 때의 판정 (redirect_slow, drop, pass)
    pub default_action: String,
    /// 룰 매칭 시 priority를 고려할지 여부 (false면 rule_id 순서만 사용)
    pub rule_priority: bool,
    /// 프로토콜 스니핑을 수행할 목적지 포트
    pub inspect_ports: Vec<u16>,
    /// 통계 샤드 수 (0이면 가용 병렬성)
    pub stats_shards: usize,
    /// 통계 발행 주기 (초)
    pub stats_interval_secs: u64,
    /// 서비스 테이블 최대 엔트리 수
    pub max_services: usize,
    /// 룰 테이블 최대 엔트리 수
    pub max_rules: usize,
    /// 인증 토큰 테이블 최대 엔트리 수
    pub max_auth_tokens: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tables_path: String::new(),
            default_action: "redirect_slow".to_owned(),
            rule_priority: true,
            inspect_ports: vec![80, 443, 8080, 8443, 50051],
            stats_shards: 0,
            stats_interval_secs: 10,
            max_services: 1024,
            max_rules: 4096,
            max_auth_tokens: 4096,
        }
    }
}

/// 토큰 버킷 레이트 리미터 설정
///
/// 한도는 윈도우(`window_size_ms`)당 패킷 수입니다. 0은 해당 범위의 제한을 끕니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 전역 한도 (윈도우당 패킷)
    pub global_pps_limit: u64,
    /// 출발지별 기본 한도 (윈도우당 패킷)
    pub per_source_pps_limit: u64,
    /// 윈도우 크기 (밀리초)
    pub window_size_ms: u64,
    /// 한도를 넘어 허용하는 버스트 패킷 수
    pub burst_allowance: u64,
    /// 출발지 버킷 테이블 최대 엔트리 수
    pub max_sources: usize,
    /// 출발지 버킷 테이블 샤드 수
    pub shards: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_pps_limit: 0,
            per_source_pps_limit: 0,
            window_size_ms: 1000,
            burst_allowance: 0,
            max_sources: 65_536,
            shards: 16,
        }
    }
}

/// 연결 추적 테이블 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConntrackConfig {
    /// 최대 플로우 수
    pub capacity: usize,
    /// 샤드 수
    pub shards: usize,
    /// 유휴 타임아웃 (초)
    pub idle_timeout_secs: u64,
    /// 유휴 플로우 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// 요청/응답을 같은 플로우로 정규화할지 여부
    pub normalize_direction: bool,
}

impl Default for ConntrackConfig {
    fn default() -> Self {
        Self {
            capacity: 16_384,
            shards: 16,
            idle_timeout_secs: 300,
            sweep_interval_secs: 30,
            normalize_direction: false,
        }
    }
}

/// UDP 미러 수신 설정
///
/// 데이터그램 하나가 이더넷 프레임 하나입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub bind: String,
    /// 판정 워커 수
    pub workers: usize,
    /// 워커별 큐 깊이
    pub queue_depth: usize,
    /// 최대 프레임 크기 (바이트)
    pub max_frame_size: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:4789".to_owned(),
            workers: 2,
            queue_depth: 1024,
            max_frame_size: 9216,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_port_csv(target: &mut Vec<u16>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        let parsed: Result<Vec<u16>, _> = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<u16>)
            .collect();
        match parsed {
            Ok(ports) => *target = ports,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse port list from env var, ignoring"
            ),
        }
    }
}
