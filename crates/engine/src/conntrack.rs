//! 연결 추적: 고정 용량 LRU 플로우 테이블
//!
//! 5-tuple([`FlowKey`])마다 [`Connection`] 하나를 유지합니다. 저장은
//! [`ShardedLru`]가 맡습니다. 점유 수가 전체 용량에 닿기 전에는 퇴출이 없고,
//! 가득 찬 뒤 새 플로우 하나는 정확히 엔트리 하나를 O(1)로 퇴출합니다.
//!
//! 퇴출 대상은 샤드 하나일 때 전역 LRU와 같고, 여러 샤드면 샤드 안의 LRU입니다.
//!
//! # 상태
//! ```text
//!  miss ──▶ New ──hit──▶ Established
//!            │               │
//!            └──FIN/RST──▶ Closing
//!  idle > timeout 후 hit ──▶ New (재시작)
//! ```
//! 상태는 L3/L4 헤더만으로 추정한 생존 신호이며 실제 TCP 상태 추적이 아닙니다.
//!
//! 키는 기본적으로 방향성을 가집니다 (요청과 응답이 다른 키).
//! `normalize_direction`을 켜면 정규화된 키 하나로 양방향을 묶고, 정규 방향은 rx,
//! 반대 방향은 tx로 집계합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use pktgate_common::{CONN_CLOSING, CONN_ESTABLISHED, CONN_NEW, FlowKey, TCP_FIN, TCP_RST};
use pktgate_core::metrics as m;

use crate::shards::{Insert, ShardedLru};

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnState {
    New,
    Established,
    Closing,
}

impl ConnState {
    pub fn code(self) -> u8 {
        match self {
            Self::New => CONN_NEW,
            Self::Established => CONN_ESTABLISHED,
            Self::Closing => CONN_CLOSING,
        }
    }
}

/// 플로우 엔트리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub state: ConnState,
    pub first_seen_ns: u64,
    pub last_activity_ns: u64,
    pub packets_rx: u64,
    pub packets_tx: u64,
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub service_id: u32,
}

impl Connection {
    fn start(service_id: u32, len: u64, rx: bool, now_ns: u64) -> Self {
        let mut conn = Self {
            state: ConnState::New,
            first_seen_ns: now_ns,
            last_activity_ns: now_ns,
            packets_rx: 0,
            packets_tx: 0,
            bytes_rx: 0,
            bytes_tx: 0,
            service_id,
        };
        conn.count(len, rx);
        conn
    }

    fn count(&mut self, len: u64, rx: bool) {
        if rx {
            self.packets_rx += 1;
            self.bytes_rx += len;
        } else {
            self.packets_tx += 1;
            self.bytes_tx += len;
        }
    }

    pub fn packets(&self) -> u64 {
        self.packets_rx + self.packets_tx
    }
}

/// 연결 추적기 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConntrackParams {
    pub capacity: usize,
    pub shards: usize,
    pub idle_timeout: Duration,
    pub normalize_direction: bool,
}

impl Default for ConntrackParams {
    fn default() -> Self {
        Self {
            capacity: 16_384,
            shards: 16,
            idle_timeout: Duration::from_secs(300),
            normalize_direction: false,
        }
    }
}

/// 추적 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOutcome {
    pub state: ConnState,
    /// 새 엔트리가 만들어졌는지 (재시작 포함)
    pub created: bool,
    /// 공간 확보를 위해 다른 엔트리가 퇴출되었는지
    pub evicted: bool,
}

/// 연결 추적기 카운터 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConntrackCounters {
    pub inserted: u64,
    pub evicted: u64,
    pub expired: u64,
    pub active: u64,
    pub capacity: u64,
}

/// 샤드 LRU 연결 추적기
pub struct ConnTracker {
    flows: ShardedLru<FlowKey, Connection>,
    idle_timeout_ns: u64,
    normalize: bool,
    inserted: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
}

impl ConnTracker {
    pub fn new(params: ConntrackParams) -> Self {
        Self {
            flows: ShardedLru::new(params.capacity, params.shards),
            idle_timeout_ns: u64::try_from(params.idle_timeout.as_nanos()).unwrap_or(u64::MAX),
            normalize: params.normalize_direction,
            inserted: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// 패킷 하나를 플로우 테이블에 반영합니다.
    ///
    /// 테이블이 가득 차도 블록하지 않고 LRU 엔트리를 퇴출합니다.
    /// 퇴출할 샤드를 잡지 못하면 이번 패킷은 추적하지 않습니다 (`created == false`).
    pub fn track(
        &self,
        key: FlowKey,
        service_id: u32,
        len: u64,
        tcp_flags: u8,
        now_ns: u64,
    ) -> TrackOutcome {
        let (key, rx) = self.key_for(key);
        let idx = self.flows.shard_of(&key);
        let mut shard = self.flows.lock(idx);

        if let Some(conn) = shard.get_mut(&key) {
            let idle = now_ns.saturating_sub(conn.last_activity_ns);
            if idle > self.idle_timeout_ns {
                *conn = Connection::start(service_id, len, rx, now_ns);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.inserted.fetch_add(1, Ordering::Relaxed);
                return TrackOutcome {
                    state: conn.state,
                    created: true,
                    evicted: false,
                };
            }

            conn.count(len, rx);
            conn.last_activity_ns = conn.last_activity_ns.max(now_ns);
            conn.service_id = service_id;
            if tcp_flags & (TCP_FIN | TCP_RST) != 0 {
                conn.state = ConnState::Closing;
            } else if conn.state == ConnState::New {
                conn.state = ConnState::Established;
            }
            return TrackOutcome {
                state: conn.state,
                created: false,
                evicted: false,
            };
        }

        let conn = Connection::start(service_id, len, rx, now_ns);
        let result = self.flows.insert(idx, &mut shard, key, conn);
        drop(shard);
        match result {
            Insert::Inserted => {
                self.inserted.fetch_add(1, Ordering::Relaxed);
            }
            Insert::Evicted => {
                self.inserted.fetch_add(1, Ordering::Relaxed);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            Insert::Skipped => debug!("flow table full and eviction contended, flow not tracked"),
        }
        TrackOutcome {
            state: ConnState::New,
            created: result != Insert::Skipped,
            evicted: result == Insert::Evicted,
        }
    }

    /// 유휴 타임아웃을 넘긴 엔트리를 제거합니다.
    ///
    /// 각 샤드의 LRU 끝부터 살펴보고 첫 활성 엔트리에서 멈춥니다.
    pub fn expire_idle(&self, now_ns: u64) -> usize {
        let timeout = self.idle_timeout_ns;
        let expired = self
            .flows
            .pop_lru_while(|conn| now_ns.saturating_sub(conn.last_activity_ns) > timeout);
        if expired > 0 {
            self.expired.fetch_add(expired as u64, Ordering::Relaxed);
            debug!(expired, "expired idle flows");
        }
        expired
    }

    /// 엔트리를 조회합니다. LRU 순서는 바뀌지 않습니다.
    pub fn get(&self, key: &FlowKey) -> Option<Connection> {
        let (key, _) = self.key_for(*key);
        self.flows.lock(self.flows.shard_of(&key)).peek(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.flows.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn counters(&self) -> ConntrackCounters {
        ConntrackCounters {
            inserted: self.inserted.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            active: self.len() as u64,
            capacity: self.capacity() as u64,
        }
    }

    /// 카운터를 메트릭으로 발행합니다.
    pub fn publish_metrics(&self) {
        let c = self.counters();
        metrics::gauge!(m::CONNTRACK_ACTIVE_FLOWS).set(c.active as f64);
        metrics::counter!(m::CONNTRACK_INSERTED_TOTAL).absolute(c.inserted);
        metrics::counter!(m::CONNTRACK_EVICTED_TOTAL).absolute(c.evicted);
        metrics::counter!(m::CONNTRACK_EXPIRED_TOTAL).absolute(c.expired);
    }

    fn key_for(&self, key: FlowKey) -> (FlowKey, bool) {
        if self.normalize {
            key.canonical()
        } else {
            (key, true)
        }
    }
}
