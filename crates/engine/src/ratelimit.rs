//! 토큰 버킷 레이트 리미터
//!
//! 두 개의 독립된 범위를 평가합니다.
//!
//! 1. **global**: 엔진 전체에 하나의 버킷
//! 2. **source**: `(service_id, src_ip)`별 버킷. 서비스에 `rate_limit_pps`가 있으면
//!    그 값을, 없으면 전역 `per_source_pps_limit`을 `service_id = 0` 키로 사용합니다.
//!
//! 전역 검사가 먼저 실행되며, 전역에서 거부되면 출발지 버킷은 조회하지 않습니다.
//! 한도가 0이면 해당 범위는 비활성입니다.
//!
//! 버킷 용량은 `burst_allowance + limit`이고, 윈도우(`window_size`)마다 `limit`개의
//! 토큰이 채워집니다. 버킷은 처음 볼 때 가득 찬 상태로 생성됩니다.
//!
//! 출발지 버킷은 [`ShardedLru`]에 보관되어 메모리가 `max_sources`로 제한됩니다.
//! 테이블 전체가 가득 차기 전에는 어떤 버킷도 퇴출되지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use pktgate_core::metrics as m;

use crate::shards::ShardedLru;

/// 레이트 리미터 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitParams {
    pub enabled: bool,
    /// 윈도우당 전역 패킷 수 (0 = 비활성)
    pub global_pps_limit: u64,
    /// 윈도우당 출발지별 패킷 수 (0 = 비활성)
    pub per_source_pps_limit: u64,
    pub window: Duration,
    pub burst_allowance: u64,
    pub max_sources: usize,
    pub shards: usize,
}

impl Default for RateLimitParams {
    fn default() -> Self {
        Self {
            enabled: true,
            global_pps_limit: 0,
            per_source_pps_limit: 0,
            window: Duration::from_secs(1),
            burst_allowance: 0,
            max_sources: 65_536,
            shards: 16,
        }
    }
}

/// 한 범위의 버킷 규격
#[derive(Debug, Clone, Copy, PartialEq)]
struct Limit {
    /// 나노초당 토큰
    rate_per_ns: f64,
    capacity: f64,
}

impl Limit {
    fn new(limit: u64, window: Duration, burst: u64) -> Option<Self> {
        if limit == 0 {
            return None;
        }
        let window_ns = window.as_nanos().max(1) as f64;
        Some(Self {
            rate_per_ns: limit as f64 / window_ns,
            capacity: burst.saturating_add(limit) as f64,
        })
    }
}

/// 토큰 버킷
#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_ns: u64,
    /// 다시 가득 차는 시각 (정리 기준)
    full_at_ns: u64,
}

impl Bucket {
    fn full(limit: &Limit, now_ns: u64) -> Self {
        Self {
            tokens: limit.capacity,
            last_ns: now_ns,
            full_at_ns: now_ns,
        }
    }

    /// 토큰을 채운 뒤 하나를 소비합니다. 토큰이 부족하면 `false`.
    fn try_take(&mut self, limit: &Limit, now_ns: u64) -> bool {
        let elapsed = now_ns.saturating_sub(self.last_ns);
        self.tokens = (self.tokens + elapsed as f64 * limit.rate_per_ns).min(limit.capacity);
        self.last_ns = self.last_ns.max(now_ns);

        let admitted = self.tokens >= 1.0;
        if admitted {
            self.tokens -= 1.0;
        }
        let missing_ns = (limit.capacity - self.tokens) / limit.rate_per_ns;
        self.full_at_ns = self.last_ns.saturating_add(missing_ns.ceil() as u64);
        admitted
    }
}

/// 출발지 버킷 키
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    /// 서비스 전용 한도면 서비스 id, 전역 per-source 한도면 0
    pub service_id: u32,
    pub src_ip: u32,
}

/// 레이트 리밋 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admit,
    GlobalLimited,
    SourceLimited,
}

impl RateDecision {
    pub fn is_admitted(self) -> bool {
        self == Self::Admit
    }
}

/// 레이트 리미터 카운터 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitCounters {
    pub global_rejects: u64,
    pub source_rejects: u64,
    pub tracked_sources: u64,
}

/// 적용 중인 설정 + 계산된 규격
#[derive(Debug)]
struct Active {
    params: RateLimitParams,
    global: Option<Limit>,
    per_source: Option<Limit>,
}

impl Active {
    fn new(params: RateLimitParams) -> Self {
        Self {
            global: Limit::new(params.global_pps_limit, params.window, params.burst_allowance),
            per_source: Limit::new(
                params.per_source_pps_limit,
                params.window,
                params.burst_allowance,
            ),
            params,
        }
    }
}

/// 전역 + 출발지별 토큰 버킷 리미터
pub struct RateLimiter {
    active: ArcSwap<Active>,
    global: Mutex<Option<Bucket>>,
    sources: ShardedLru<SourceKey, Bucket>,
    global_rejects: AtomicU64,
    source_rejects: AtomicU64,
}

impl RateLimiter {
    pub fn new(params: RateLimitParams) -> Self {
        Self {
            sources: ShardedLru::new(params.max_sources, params.shards),
            active: ArcSwap::from_pointee(Active::new(params)),
            global: Mutex::new(None),
            global_rejects: AtomicU64::new(0),
            source_rejects: AtomicU64::new(0),
        }
    }

    /// 현재 파라미터
    pub fn params(&self) -> RateLimitParams {
        self.active.load().params
    }

    /// 파라미터를 교체합니다.
    ///
    /// 모든 버킷이 초기화되어 다음 패킷부터 새 용량의 가득 찬 버킷으로 시작합니다.
    /// 샤드 구성(`max_sources`, `shards`)은 생성 시점 값이 유지됩니다.
    pub fn reconfigure(&self, params: RateLimitParams) {
        self.active.store(Arc::new(Active::new(params)));
        *self.global.lock() = None;
        self.sources.clear();
        info!(
            enabled = params.enabled,
            global = params.global_pps_limit,
            per_source = params.per_source_pps_limit,
            window_ms = params.window.as_millis() as u64,
            burst = params.burst_allowance,
            "rate limiter reconfigured"
        );
    }

    /// 패킷 하나를 평가합니다.
    ///
    /// `service_limit`은 매치된 서비스의 `rate_limit_pps`입니다.
    pub fn check(
        &self,
        src_ip: u32,
        service_id: u32,
        service_limit: Option<u64>,
        now_ns: u64,
    ) -> RateDecision {
        let active = self.active.load();
        if !active.params.enabled {
            return RateDecision::Admit;
        }

        if let Some(limit) = &active.global {
            let mut slot = self.global.lock();
            let bucket = slot.get_or_insert_with(|| Bucket::full(limit, now_ns));
            if !bucket.try_take(limit, now_ns) {
                self.global_rejects.fetch_add(1, Ordering::Relaxed);
                return RateDecision::GlobalLimited;
            }
        }

        let override_limit = service_limit.and_then(|pps| {
            Limit::new(pps, active.params.window, active.params.burst_allowance)
        });
        let (limit, key) = match (override_limit, active.per_source) {
            (Some(limit), _) => (limit, SourceKey { service_id, src_ip }),
            (None, Some(limit)) => (limit, SourceKey { service_id: 0, src_ip }),
            (None, None) => return RateDecision::Admit,
        };

        let idx = self.sources.shard_of(&key);
        let mut shard = self.sources.lock(idx);
        let admitted = match shard.get_mut(&key) {
            Some(bucket) => bucket.try_take(&limit, now_ns),
            None => {
                let mut bucket = Bucket::full(&limit, now_ns);
                let admitted = bucket.try_take(&limit, now_ns);
                self.sources.insert(idx, &mut shard, key, bucket);
                admitted
            }
        };
        drop(shard);
        if admitted {
            RateDecision::Admit
        } else {
            self.source_rejects.fetch_add(1, Ordering::Relaxed);
            RateDecision::SourceLimited
        }
    }

    /// 다시 가득 찬 (유휴) 출발지 버킷을 제거합니다.
    ///
    /// 가득 찬 버킷은 새로 만든 버킷과 같으므로 결과에 영향이 없습니다.
    pub fn purge_idle(&self, now_ns: u64) -> usize {
        let purged = self.sources.remove_where(|bucket| bucket.full_at_ns <= now_ns);
        if purged > 0 {
            debug!(purged, "purged idle rate-limit buckets");
        }
        purged
    }

    /// 추적 중인 출발지 버킷 수
    pub fn tracked_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn counters(&self) -> RateLimitCounters {
        RateLimitCounters {
            global_rejects: self.global_rejects.load(Ordering::Relaxed),
            source_rejects: self.source_rejects.load(Ordering::Relaxed),
            tracked_sources: self.tracked_sources() as u64,
        }
    }

    /// 카운터를 메트릭으로 발행합니다.
    pub fn publish_metrics(&self) {
        let c = self.counters();
        metrics::counter!(m::RATELIMIT_REJECTS_TOTAL, m::LABEL_SCOPE => "global")
            .absolute(c.global_rejects);
        metrics::counter!(m::RATELIMIT_REJECTS_TOTAL, m::LABEL_SCOPE => "source")
            .absolute(c.source_rejects);
        metrics::gauge!(m::RATELIMIT_TRACKED_SOURCES).set(c.tracked_sources as f64);
    }
}
