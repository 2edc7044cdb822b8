//! 엔진 설정: core 설정 변환과 테이블 파일
//!
//! [`GateConfig`]는 core의 [`PktgateConfig`]에서 판정 엔진에 필요한 값만 꺼내
//! 엔진 타입으로 변환한 것입니다. [`TableFile`]은 서비스/룰/토큰/fast path를
//! 담는 TOML 파일입니다.
//!
//! # 테이블 파일 예시 (TOML)
//! ```toml
//! fast_paths = [1]
//!
//! [[services]]
//! service_id = 1
//! ip_addr = "10.0.0.5"
//! port_start = 443
//! port_end = 443
//! protocol = 6
//! requires_tls = true
//!
//! [[rules]]
//! rule_id = 10
//! src_ip = "203.0.113.0"
//! src_mask = "255.255.255.0"
//! action = "drop"
//! priority = 100
//!
//! [[tokens]]
//! token_hash = 0xfeedf00d
//! service_id = 1
//! ttl_secs = 3600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pktgate_core::config::PktgateConfig;

use crate::conntrack::ConntrackParams;
use crate::decision::{DecisionPolicy, Verdict};
use crate::error::EngineError;
use crate::matcher::RuleOrder;
use crate::ratelimit::RateLimitParams;
use crate::tables::{AuthToken, Rule, Service, TableLimits, TableSet, Tables};

/// 판정 엔진 설정
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    pub policy: DecisionPolicy,
    pub rule_order: RuleOrder,
    pub limits: TableLimits,
    pub rate_limit: RateLimitParams,
    pub conntrack: ConntrackParams,
    /// 0이면 가용 병렬성
    pub stats_shards: usize,
    pub stats_interval: Duration,
    /// 연결 추적 / 레이트 리미터 정리 주기
    pub sweep_interval: Duration,
    /// 시작 시 로드할 테이블 파일
    pub tables_path: Option<PathBuf>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy: DecisionPolicy::default(),
            rule_order: RuleOrder::default(),
            limits: TableLimits::default(),
            rate_limit: RateLimitParams::default(),
            conntrack: ConntrackParams::default(),
            stats_shards: 0,
            stats_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30),
            tables_path: None,
        }
    }
}

impl GateConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    ///
    /// core의 `validate()`를 통과한 설정을 전제로 하지만, 엔진 타입으로 바꿀 수 없는
    /// 값은 여기서도 거부합니다.
    pub fn from_core(config: &PktgateConfig) -> Result<Self, EngineError> {
        let engine = &config.engine;
        let default_action = engine
            .default_action
            .parse::<Verdict>()
            .map_err(|e| EngineError::Config {
                field: "engine.default_action".to_owned(),
                reason: e.to_string(),
            })?;

        let rl = &config.rate_limit;
        if rl.enabled && rl.window_size_ms == 0 {
            return Err(EngineError::Config {
                field: "rate_limit.window_size_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        let ct = &config.conntrack;
        if ct.capacity == 0 {
            return Err(EngineError::Config {
                field: "conntrack.capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let tables_path = match engine.tables_path.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };

        Ok(Self {
            policy: DecisionPolicy {
                default_action,
                inspect_ports: engine.inspect_ports.clone(),
            },
            rule_order: RuleOrder::from_flag(engine.rule_priority),
            limits: TableLimits {
                max_services: engine.max_services,
                max_rules: engine.max_rules,
                max_auth_tokens: engine.max_auth_tokens,
            },
            rate_limit: RateLimitParams {
                enabled: rl.enabled,
                global_pps_limit: rl.global_pps_limit,
                per_source_pps_limit: rl.per_source_pps_limit,
                window: Duration::from_millis(rl.window_size_ms),
                burst_allowance: rl.burst_allowance,
                max_sources: rl.max_sources,
                shards: rl.shards,
            },
            conntrack: ConntrackParams {
                capacity: ct.capacity,
                shards: ct.shards,
                idle_timeout: Duration::from_secs(ct.idle_timeout_secs),
                normalize_direction: ct.normalize_direction,
            },
            stats_shards: engine.stats_shards,
            stats_interval: Duration::from_secs(engine.stats_interval_secs.max(1)),
            sweep_interval: Duration::from_secs(ct.sweep_interval_secs.max(1)),
            tables_path,
        })
    }
}

// =============================================================================
// 테이블 파일
// =============================================================================

/// 토큰 파일 엔트리
///
/// 만료 시각은 엔진 시계 기준이므로 파일에는 TTL로 적고 로드 시점에 변환합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token_hash: u32,
    #[serde(default)]
    pub service_id: u32,
    /// 없으면 만료되지 않음
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub permissions: u32,
}

impl TokenEntry {
    fn into_token(self, now_ns: u64) -> AuthToken {
        let expiry_ns = match self.ttl_secs {
            Some(ttl) => now_ns.saturating_add(ttl.saturating_mul(1_000_000_000)),
            None => u64::MAX,
        };
        AuthToken {
            token_hash: self.token_hash,
            service_id: self.service_id,
            expiry_ns,
            permissions: self.permissions,
        }
    }

    fn from_token(token: &AuthToken, now_ns: u64) -> Self {
        let ttl_secs = (token.expiry_ns != u64::MAX)
            .then(|| token.expiry_ns.saturating_sub(now_ns) / 1_000_000_000);
        Self {
            token_hash: token.token_hash,
            service_id: token.service_id,
            ttl_secs,
            permissions: token.permissions,
        }
    }
}

/// TOML 테이블 파일의 최상위 구조
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFile {
    #[serde(default)]
    pub fast_paths: Vec<u32>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

impl TableFile {
    /// TOML 파일에서 테이블을 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::TableFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::parse(&content).map_err(|e| match e {
            EngineError::TableFile { reason, .. } => EngineError::TableFile {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// TOML 문자열을 파싱합니다.
    pub fn parse(content: &str) -> Result<Self, EngineError> {
        toml::from_str(content).map_err(|e| EngineError::TableFile {
            path: "<string>".to_owned(),
            reason: e.to_string(),
        })
    }

    /// TOML 문자열로 직렬화합니다.
    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::TableFile {
            path: "<string>".to_owned(),
            reason: e.to_string(),
        })
    }

    /// 현재 테이블 스냅샷을 파일 형태로 변환합니다.
    pub fn from_tables(tables: &Tables, now_ns: u64) -> Self {
        Self {
            fast_paths: tables.fast_paths(),
            services: tables.services().map(|s| (**s).clone()).collect(),
            rules: tables
                .rules()
                .ordered(RuleOrder::RuleId)
                .into_iter()
                .map(|r| (*r).clone())
                .collect(),
            tokens: tables
                .tokens()
                .iter()
                .map(|t| TokenEntry::from_token(t, now_ns))
                .collect(),
        }
    }

    /// [`TableStore::replace_all`](crate::tables::TableStore::replace_all)에 넘길
    /// 묶음으로 변환합니다.
    pub fn into_table_set(self, now_ns: u64) -> TableSet {
        TableSet {
            services: self.services,
            rules: self.rules,
            tokens: self
                .tokens
                .into_iter()
                .map(|t| t.into_token(now_ns))
                .collect(),
            fast_paths: self.fast_paths,
        }
    }
}
