//! 통계 수집: 샤드 원자 카운터
//!
//! [`Stats`]는 캐시 라인 정렬된 샤드마다 카운터 배열을 두고, 워커 스레드는
//! 스레드 로컬 인덱스로 고른 샤드에만 `fetch_add`합니다. 합산은 읽을 때만
//! 수행합니다 ([`Stats::snapshot`]).
//!
//! [`StatsReporter`]는 스냅샷 사이의 차이로 pps/bps를 계산하고 메트릭으로
//! 발행합니다.
//!
//! # 데이터 흐름
//! ```text
//! worker ──fetch_add──▶ Shard[i] ─┐
//! worker ──fetch_add──▶ Shard[j] ─┼──snapshot──▶ StatsSnapshot ──update──▶ StatsReporter
//! worker ──fetch_add──▶ Shard[k] ─┘   (합산)                                (rate + metrics)
//! ```

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use serde::Serialize;

use pktgate_common::{PROTO_ICMP, PROTO_TCP, PROTO_UDP, REASON_COUNT};
use pktgate_core::metrics as m;

use crate::decision::{Decision, Reason, Verdict};
use crate::sniffer::SniffedProtocol;

const TOTAL: usize = 0;
const BYTES: usize = 1;
const VERDICT_BASE: usize = 2;
const VERDICT_COUNT: usize = 4;
const REASON_BASE: usize = VERDICT_BASE + VERDICT_COUNT;
const L4_BASE: usize = REASON_BASE + REASON_COUNT;
const L4_COUNT: usize = 4;
const SNIFF_BASE: usize = L4_BASE + L4_COUNT;
const SNIFF_COUNT: usize = 5;
const COUNTERS: usize = SNIFF_BASE + SNIFF_COUNT;

/// L4 프로토콜 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4 {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl L4 {
    pub fn from_protocol(protocol: u8) -> Self {
        match protocol {
            PROTO_TCP => Self::Tcp,
            PROTO_UDP => Self::Udp,
            PROTO_ICMP => Self::Icmp,
            _ => Self::Other,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Tcp => 0,
            Self::Udp => 1,
            Self::Icmp => 2,
            Self::Other => 3,
        }
    }
}

fn sniff_index(p: SniffedProtocol) -> Option<usize> {
    match p {
        SniffedProtocol::Http => Some(0),
        SniffedProtocol::Tls => Some(1),
        SniffedProtocol::Http2 => Some(2),
        SniffedProtocol::Grpc => Some(3),
        SniffedProtocol::WebSocketCandidate => Some(4),
        SniffedProtocol::Unknown => None,
    }
}

/// 캐시 라인 하나 이상을 차지하는 샤드
#[repr(align(64))]
struct Shard {
    counters: [AtomicU64; COUNTERS],
}

impl Shard {
    fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    fn add(&self, idx: usize, n: u64) {
        self.counters[idx].fetch_add(n, Ordering::Relaxed);
    }
}

static NEXT_SHARD_HINT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_HINT: Cell<Option<usize>> = const { Cell::new(None) };
}

fn shard_hint() -> usize {
    SHARD_HINT.with(|hint| match hint.get() {
        Some(h) => h,
        None => {
            let h = NEXT_SHARD_HINT.fetch_add(1, Ordering::Relaxed);
            hint.set(Some(h));
            h
        }
    })
}

/// 샤드 통계
pub struct Stats {
    shards: Box<[Shard]>,
}

impl Stats {
    /// `shards`가 0이면 사용 가능한 병렬성만큼 샤드를 만듭니다.
    pub fn new(shards: usize) -> Self {
        let shards = if shards == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            shards
        };
        Self {
            shards: (0..shards).map(|_| Shard::new()).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 판정 하나를 기록합니다.
    #[inline]
    pub fn record(&self, decision: &Decision, len: u64, l4: Option<L4>) {
        let shard = &self.shards[shard_hint() % self.shards.len()];
        shard.add(TOTAL, 1);
        shard.add(BYTES, len);
        shard.add(VERDICT_BASE + decision.verdict.code() as usize, 1);
        shard.add(REASON_BASE + decision.reason.code() as usize, 1);
        if let Some(l4) = l4 {
            shard.add(L4_BASE + l4.index(), 1);
        }
        if let Some(idx) = decision.sniffed.and_then(sniff_index) {
            shard.add(SNIFF_BASE + idx, 1);
        }
    }

    /// 모든 샤드를 합산한 스냅샷
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut sums = [0u64; COUNTERS];
        for shard in self.shards.iter() {
            for (sum, c) in sums.iter_mut().zip(shard.counters.iter()) {
                *sum = sum.wrapping_add(c.load(Ordering::Relaxed));
            }
        }
        StatsSnapshot::from_sums(&sums)
    }
}

/// L4 프로토콜별 패킷 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct L4Counts {
    pub tcp: u64,
    pub udp: u64,
    pub icmp: u64,
    pub other: u64,
}

/// 스니핑된 프로토콜별 패킷 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SniffCounts {
    pub http: u64,
    pub tls: u64,
    pub http2: u64,
    pub grpc: u64,
    pub websocket: u64,
}

/// 시점 통계 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub bytes_total: u64,
    pub passed: u64,
    pub dropped: u64,
    pub redirected_fast: u64,
    pub redirected_slow: u64,
    pub forwarded: u64,
    pub fast_path: u64,
    pub malformed: u64,
    pub unclassified: u64,
    pub no_service: u64,
    pub rule_drops: u64,
    pub rate_limited: u64,
    pub auth_failed: u64,
    pub complex_auth: u64,
    pub deep_inspection: u64,
    pub rule_redirects: u64,
    pub l4: L4Counts,
    pub sniffed: SniffCounts,
}

impl StatsSnapshot {
    fn from_sums(s: &[u64; COUNTERS]) -> Self {
        let verdict = |v: Verdict| s[VERDICT_BASE + v.code() as usize];
        let reason = |r: Reason| s[REASON_BASE + r.code() as usize];
        Self {
            total: s[TOTAL],
            bytes_total: s[BYTES],
            passed: verdict(Verdict::Pass),
            dropped: verdict(Verdict::Drop),
            redirected_fast: verdict(Verdict::RedirectFast),
            redirected_slow: verdict(Verdict::RedirectSlow),
            forwarded: reason(Reason::Forwarded),
            fast_path: reason(Reason::FastPath),
            malformed: reason(Reason::Malformed),
            unclassified: reason(Reason::Unclassified),
            no_service: reason(Reason::NoService),
            rule_drops: reason(Reason::RuleDrop),
            rate_limited: reason(Reason::RateLimited),
            auth_failed: reason(Reason::AuthFailed),
            complex_auth: reason(Reason::ComplexAuth),
            deep_inspection: reason(Reason::NeedsDeepInspection),
            rule_redirects: reason(Reason::RuleRedirect),
            l4: L4Counts {
                tcp: s[L4_BASE],
                udp: s[L4_BASE + 1],
                icmp: s[L4_BASE + 2],
                other: s[L4_BASE + 3],
            },
            sniffed: SniffCounts {
                http: s[SNIFF_BASE],
                tls: s[SNIFF_BASE + 1],
                http2: s[SNIFF_BASE + 2],
                grpc: s[SNIFF_BASE + 3],
                websocket: s[SNIFF_BASE + 4],
            },
        }
    }

    /// 판정별 수
    pub fn verdict_count(&self, verdict: Verdict) -> u64 {
        match verdict {
            Verdict::Pass => self.passed,
            Verdict::Drop => self.dropped,
            Verdict::RedirectFast => self.redirected_fast,
            Verdict::RedirectSlow => self.redirected_slow,
        }
    }

    /// 사유별 수
    pub fn reason_count(&self, reason: Reason) -> u64 {
        match reason {
            Reason::Forwarded => self.forwarded,
            Reason::FastPath => self.fast_path,
            Reason::Malformed => self.malformed,
            Reason::Unclassified => self.unclassified,
            Reason::NoService => self.no_service,
            Reason::RuleDrop => self.rule_drops,
            Reason::RateLimited => self.rate_limited,
            Reason::AuthFailed => self.auth_failed,
            Reason::ComplexAuth => self.complex_auth,
            Reason::NeedsDeepInspection => self.deep_inspection,
            Reason::RuleRedirect => self.rule_redirects,
        }
    }
}

/// 처리율
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rates {
    /// 초당 패킷 수
    pub pps: f64,
    /// 초당 비트 수
    pub bps: f64,
}

/// 주기적 스냅샷으로 처리율을 계산하고 메트릭을 발행합니다.
///
/// 첫 번째 `update`에서는 누적값만 발행하고 rate는 0입니다.
#[derive(Debug, Default)]
pub struct StatsReporter {
    last_poll: Option<Instant>,
    prev: Option<StatsSnapshot>,
    rates: Rates,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 직전 계산된 처리율
    pub fn rates(&self) -> Rates {
        self.rates
    }

    /// 스냅샷을 반영하고 메트릭을 발행합니다.
    pub fn update(&mut self, snapshot: StatsSnapshot) -> Rates {
        self.update_at(snapshot, Instant::now())
    }

    fn update_at(&mut self, snapshot: StatsSnapshot, now: Instant) -> Rates {
        self.rates = match (&self.prev, self.last_poll) {
            (Some(prev), Some(last)) => {
                let elapsed = now.duration_since(last).as_secs_f64();
                if elapsed > 0.0 {
                    compute_rates(&snapshot, prev, elapsed)
                } else {
                    self.rates
                }
            }
            _ => Rates::default(),
        };

        publish(&snapshot, self.rates);
        self.prev = Some(snapshot);
        self.last_poll = Some(now);
        self.rates
    }
}

fn compute_rates(current: &StatsSnapshot, prev: &StatsSnapshot, elapsed_secs: f64) -> Rates {
    let delta_packets = current.total.saturating_sub(prev.total);
    let delta_bytes = current.bytes_total.saturating_sub(prev.bytes_total);
    // 폴링 간격의 delta는 실용적으로 2^53 미만
    #[allow(clippy::cast_precision_loss)]
    let (packets, bytes) = (delta_packets as f64, delta_bytes as f64);
    Rates {
        pps: packets / elapsed_secs,
        bps: (bytes * 8.0) / elapsed_secs,
    }
}

fn publish(s: &StatsSnapshot, rates: Rates) {
    metrics::counter!(m::ENGINE_PACKETS_TOTAL).absolute(s.total);
    metrics::counter!(m::ENGINE_BYTES_TOTAL).absolute(s.bytes_total);

    for verdict in Verdict::ALL {
        metrics::counter!(m::ENGINE_VERDICTS_TOTAL, m::LABEL_VERDICT => verdict.as_str())
            .absolute(s.verdict_count(verdict));
    }
    for reason in Reason::ALL {
        metrics::counter!(m::ENGINE_REASONS_TOTAL, m::LABEL_REASON => reason.as_str())
            .absolute(s.reason_count(reason));
    }
    for (proto, count) in [
        ("tcp", s.l4.tcp),
        ("udp", s.l4.udp),
        ("icmp", s.l4.icmp),
        ("other", s.l4.other),
    ] {
        metrics::counter!(m::ENGINE_PROTOCOL_PACKETS_TOTAL, m::LABEL_PROTOCOL => proto)
            .absolute(count);
    }
    for (proto, count) in [
        ("http", s.sniffed.http),
        ("tls", s.sniffed.tls),
        ("http2", s.sniffed.http2),
        ("grpc", s.sniffed.grpc),
        ("websocket", s.sniffed.websocket),
    ] {
        metrics::counter!(m::ENGINE_SNIFFED_PACKETS_TOTAL, m::LABEL_PROTOCOL => proto)
            .absolute(count);
    }

    metrics::gauge!(m::ENGINE_PACKETS_PER_SECOND).set(rates.pps);
    metrics::gauge!(m::ENGINE_BITS_PER_SECOND).set(rates.bps);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn decision(verdict: Verdict, reason: Reason) -> Decision {
        Decision::new(verdict, reason)
    }

    // =============================================================================
    // Stats
    // =============================================================================

    #[test]
    fn new_stats_are_zero() {
        let stats = Stats::new(4);
        assert_eq!(stats.shard_count(), 4);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn zero_shards_uses_available_parallelism() {
        assert!(Stats::new(0).shard_count() >= 1);
    }

    #[test]
    fn record_updates_verdict_reason_and_protocol_counters() {
        let stats = Stats::new(2);
        stats.record(&decision(Verdict::Drop, Reason::Malformed), 10, None);
        stats.record(&decision(Verdict::Pass, Reason::Forwarded), 100, Some(L4::Tcp));
        let mut sniffed = decision(Verdict::RedirectSlow, Reason::NeedsDeepInspection);
        sniffed.sniffed = Some(SniffedProtocol::Tls);
        stats.record(&sniffed, 200, Some(L4::Tcp));

        let snap = stats.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.bytes_total, 310);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.passed, 1);
        assert_eq!(snap.redirected_slow, 1);
        assert_eq!(snap.deep_inspection, 1);
        assert_eq!(snap.l4.tcp, 2);
        assert_eq!(snap.sniffed.tls, 1);
        assert_eq!(snap.verdict_count(Verdict::Drop), 1);
        assert_eq!(snap.reason_count(Reason::Forwarded), 1);
    }

    #[test]
    fn unknown_sniff_is_not_counted() {
        let stats = Stats::new(1);
        let mut d = decision(Verdict::Pass, Reason::Forwarded);
        d.sniffed = Some(SniffedProtocol::Unknown);
        stats.record(&d, 1, Some(L4::Udp));
        assert_eq!(stats.snapshot().sniffed, SniffCounts::default());
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let stats = Arc::new(Stats::new(4));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record(&decision(Verdict::Pass, Reason::Forwarded), 1, Some(L4::Udp));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total, 8000);
        assert_eq!(snap.l4.udp, 8000);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert_eq!(json["malformed"], 0);
        assert_eq!(json["l4"]["tcp"], 0);
    }

    // =============================================================================
    // StatsReporter
    // =============================================================================

    #[test]
    fn first_update_has_zero_rates() {
        let mut reporter = StatsReporter::new();
        let snap = StatsSnapshot {
            total: 1000,
            bytes_total: 64_000,
            ..StatsSnapshot::default()
        };
        assert_eq!(reporter.update(snap), Rates::default());
    }

    #[test]
    fn rates_from_delta() {
        let mut reporter = StatsReporter::new();
        let t0 = Instant::now();
        reporter.update_at(
            StatsSnapshot {
                total: 100,
                bytes_total: 1000,
                ..StatsSnapshot::default()
            },
            t0,
        );
        let rates = reporter.update_at(
            StatsSnapshot {
                total: 300,
                bytes_total: 3000,
                ..StatsSnapshot::default()
            },
            t0 + Duration::from_secs(2),
        );
        assert!((rates.pps - 100.0).abs() < 1e-9);
        assert!((rates.bps - 8000.0).abs() < 1e-9);
        assert_eq!(reporter.rates(), rates);
    }

    #[test]
    fn counter_reset_does_not_underflow() {
        let mut reporter = StatsReporter::new();
        let t0 = Instant::now();
        reporter.update_at(
            StatsSnapshot {
                total: 500,
                ..StatsSnapshot::default()
            },
            t0,
        );
        let rates = reporter.update_at(StatsSnapshot::default(), t0 + Duration::from_secs(1));
        assert_eq!(rates.pps, 0.0);
    }
}
