//! 판정 엔진: 패킷 하나에 대한 최종 판정
//!
//! 헤더 파서, 매처, 레이트 리미터, 인증 검사, 스니퍼, 연결 추적의 결과를 정해진
//! 순서로 합성합니다. 처음으로 결정적인 결과가 나온 단계에서 평가가 끝납니다.
//!
//! ```text
//! 1. 파싱 실패                         → DROP          malformed
//! 2. 비-IPv4 / 미지원 L4               → PASS          unclassified
//! 3. 서비스 없음                       → 기본 정책     no_service
//! 4. 룰 action = drop                  → DROP          rule_drop
//! 5. 레이트 리밋 거부                  → DROP          rate_limited
//! 6. complex 인증                      → REDIRECT_SLOW complex_auth
//!    simple 인증 실패                  → DROP          auth_failed
//! 7. 룰 action = redirect              → REDIRECT_SLOW rule_redirect
//!    TLS 필수 / WebSocket 허용 / 스니퍼 → REDIRECT_SLOW needs_deep_inspection
//! 8. fast path 목적지 있음             → REDIRECT_FAST fast_path
//!    그 외                             → PASS          forwarded
//! ```
//!
//! 연결 추적은 8단계에 도달한 패킷만 갱신합니다. 패킷 경로는 블록하지 않으며
//! 에러를 반환하지 않습니다.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use pktgate_common::{
    PORT_GRPC, PORT_HTTP, PORT_HTTP_ALT, PORT_HTTPS, PORT_HTTPS_ALT, PROTO_TCP, REASON_AUTH_FAILED,
    REASON_COMPLEX_AUTH, REASON_FAST_PATH, REASON_FORWARDED, REASON_MALFORMED,
    REASON_NEEDS_DEEP_INSPECTION, REASON_NO_SERVICE, REASON_RATE_LIMITED, REASON_RULE_DROP,
    REASON_RULE_REDIRECT, REASON_UNCLASSIFIED, VERDICT_DROP, VERDICT_PASS, VERDICT_REDIRECT_FAST,
    VERDICT_REDIRECT_SLOW,
};

use crate::auth;
use crate::clock::Clock;
use crate::config::GateConfig;
use crate::conntrack::ConnTracker;
use crate::parser::{self, Parsed};
use crate::ratelimit::RateLimiter;
use crate::sniffer::{self, SniffedProtocol};
use crate::stats::{L4, Stats};
use crate::tables::{AuthType, RuleAction, TableStore};

// =============================================================================
// 판정 / 사유
// =============================================================================

/// 최종 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Drop,
    RedirectFast,
    RedirectSlow,
}

impl Verdict {
    pub const ALL: [Self; 4] = [Self::Pass, Self::Drop, Self::RedirectFast, Self::RedirectSlow];

    /// 외부 디스패처와 공유하는 코드
    pub fn code(self) -> u8 {
        match self {
            Self::Pass => VERDICT_PASS,
            Self::Drop => VERDICT_DROP,
            Self::RedirectFast => VERDICT_REDIRECT_FAST,
            Self::RedirectSlow => VERDICT_REDIRECT_SLOW,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Drop => "drop",
            Self::RedirectFast => "redirect_fast",
            Self::RedirectSlow => "redirect_slow",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 알 수 없는 판정 이름
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verdict: {0}")]
pub struct UnknownVerdict(pub String);

impl FromStr for Verdict {
    type Err = UnknownVerdict;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVerdict(s.to_owned()))
    }
}

/// 판정 사유 (관측용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Forwarded,
    FastPath,
    Malformed,
    Unclassified,
    NoService,
    RuleDrop,
    RateLimited,
    AuthFailed,
    ComplexAuth,
    NeedsDeepInspection,
    RuleRedirect,
}

impl Reason {
    pub const ALL: [Self; 11] = [
        Self::Forwarded,
        Self::FastPath,
        Self::Malformed,
        Self::Unclassified,
        Self::NoService,
        Self::RuleDrop,
        Self::RateLimited,
        Self::AuthFailed,
        Self::ComplexAuth,
        Self::NeedsDeepInspection,
        Self::RuleRedirect,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::Forwarded => REASON_FORWARDED,
            Self::FastPath => REASON_FAST_PATH,
            Self::Malformed => REASON_MALFORMED,
            Self::Unclassified => REASON_UNCLASSIFIED,
            Self::NoService => REASON_NO_SERVICE,
            Self::RuleDrop => REASON_RULE_DROP,
            Self::RateLimited => REASON_RATE_LIMITED,
            Self::AuthFailed => REASON_AUTH_FAILED,
            Self::ComplexAuth => REASON_COMPLEX_AUTH,
            Self::NeedsDeepInspection => REASON_NEEDS_DEEP_INSPECTION,
            Self::RuleRedirect => REASON_RULE_REDIRECT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forwarded => "forwarded",
            Self::FastPath => "fast_path",
            Self::Malformed => "malformed",
            Self::Unclassified => "unclassified",
            Self::NoService => "no_service",
            Self::RuleDrop => "rule_drop",
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::ComplexAuth => "complex_auth",
            Self::NeedsDeepInspection => "needs_deep_inspection",
            Self::RuleRedirect => "rule_redirect",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 패킷 하나의 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: Reason,
    /// 매치된 서비스
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<u32>,
    /// 매치된 룰
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<u32>,
    /// 스니퍼가 실행된 경우 그 결과
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffed: Option<SniffedProtocol>,
}

impl Decision {
    pub fn new(verdict: Verdict, reason: Reason) -> Self {
        Self {
            verdict,
            reason,
            service_id: None,
            rule_id: None,
            sniffed: None,
        }
    }

    fn with(mut self, verdict: Verdict, reason: Reason) -> Self {
        self.verdict = verdict;
        self.reason = reason;
        self
    }
}

// =============================================================================
// 정책
// =============================================================================

/// 판정 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPolicy {
    /// 서비스가 없을 때의 판정
    pub default_action: Verdict,
    /// 스니퍼를 실행할 TCP 목적지 포트
    pub inspect_ports: Vec<u16>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            default_action: Verdict::RedirectSlow,
            inspect_ports: vec![PORT_HTTP, PORT_HTTPS, PORT_HTTP_ALT, PORT_HTTPS_ALT, PORT_GRPC],
        }
    }
}

impl DecisionPolicy {
    #[inline]
    fn inspects(&self, port: u16) -> bool {
        self.inspect_ports.contains(&port)
    }
}

// =============================================================================
// DecisionEngine
// =============================================================================

/// 판정 엔진
///
/// 모든 메서드는 `&self`를 받으며 여러 워커에서 동시에 호출할 수 있습니다.
pub struct DecisionEngine {
    policy: DecisionPolicy,
    tables: Arc<TableStore>,
    limiter: RateLimiter,
    conntrack: ConnTracker,
    stats: Stats,
    clock: Arc<dyn Clock>,
}

impl DecisionEngine {
    /// 빈 테이블로 엔진을 생성합니다.
    pub fn new(config: &GateConfig, clock: Arc<dyn Clock>) -> Self {
        let tables = Arc::new(TableStore::new(config.limits, config.rule_order));
        Self::with_tables(config, tables, clock)
    }

    /// 기존 테이블 저장소를 공유하는 엔진을 생성합니다.
    pub fn with_tables(config: &GateConfig, tables: Arc<TableStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy: config.policy.clone(),
            tables,
            limiter: RateLimiter::new(config.rate_limit),
            conntrack: ConnTracker::new(config.conntrack),
            stats: Stats::new(config.stats_shards),
            clock,
        }
    }

    /// 프레임 하나를 판정합니다.
    pub fn classify(&self, frame: &[u8]) -> Decision {
        let now_ns = self.clock.now_ns();
        let len = frame.len() as u64;
        let (decision, l4) = self.evaluate(frame, len, now_ns);
        self.stats.record(&decision, len, l4);
        trace!(
            verdict = decision.verdict.as_str(),
            reason = decision.reason.as_str(),
            service_id = decision.service_id,
            len,
            "classified"
        );
        decision
    }

    fn evaluate(&self, frame: &[u8], len: u64, now_ns: u64) -> (Decision, Option<L4>) {
        // 1-2. 파싱
        let pkt = match parser::parse(frame) {
            Ok(Parsed::Ipv4(pkt)) => pkt,
            Ok(Parsed::NonIpv4 { eth_type }) => {
                trace!(eth_type, "non-IPv4 frame");
                return (Decision::new(Verdict::Pass, Reason::Unclassified), Some(L4::Other));
            }
            Err(err) => {
                trace!(%err, "malformed frame");
                return (Decision::new(Verdict::Drop, Reason::Malformed), None);
            }
        };
        let l4 = Some(L4::from_protocol(pkt.protocol));
        let (Some(transport), Some(key)) = (pkt.transport, pkt.flow_key()) else {
            return (Decision::new(Verdict::Pass, Reason::Unclassified), l4);
        };

        // 3. 서비스
        let tables = self.tables.current();
        let Some(service) = tables.find_service(key.dst_ip, key.dst_port, key.protocol) else {
            return (Decision::new(self.policy.default_action, Reason::NoService), l4);
        };
        service.record(len, now_ns);
        let sid = service.service_id;
        let mut decision = Decision::new(Verdict::Pass, Reason::Forwarded);
        decision.service_id = Some(sid);

        // 4. 룰
        let rule = tables.rules().find(&key);
        if let Some(rule) = rule {
            rule.record(len, now_ns);
            decision.rule_id = Some(rule.rule_id);
            if rule.action == RuleAction::Drop {
                return (decision.with(Verdict::Drop, Reason::RuleDrop), l4);
            }
        }

        // 5. 레이트 리밋
        if !self
            .limiter
            .check(key.src_ip, sid, service.rate_limit_pps, now_ns)
            .is_admitted()
        {
            return (decision.with(Verdict::Drop, Reason::RateLimited), l4);
        }

        // 6. 인증
        let auth_type = match (service.auth_type, rule) {
            (AuthType::None, Some(r)) if r.auth_required => AuthType::Simple,
            (auth_type, _) => auth_type,
        };
        match auth_type {
            AuthType::Complex => {
                return (decision.with(Verdict::RedirectSlow, Reason::ComplexAuth), l4);
            }
            AuthType::Simple => {
                let outcome = auth::check(&tables, pkt.protocol, pkt.payload(), sid, now_ns);
                if outcome.is_rejected() {
                    trace!(?outcome, service_id = sid, "auth rejected");
                    return (decision.with(Verdict::Drop, Reason::AuthFailed), l4);
                }
            }
            AuthType::None => {}
        }

        // 7. slow path 필요 여부
        if rule.is_some_and(|r| r.action == RuleAction::Redirect) {
            return (decision.with(Verdict::RedirectSlow, Reason::RuleRedirect), l4);
        }
        if service.requires_tls || service.allows_websocket {
            return (
                decision.with(Verdict::RedirectSlow, Reason::NeedsDeepInspection),
                l4,
            );
        }
        if pkt.protocol == PROTO_TCP
            && (self.policy.inspects(transport.dst_port) || service.inspect || service.grpc)
        {
            let sniffed = sniffer::sniff(pkt.payload(), transport.dst_port, service.grpc);
            decision.sniffed = Some(sniffed);
            // GET은 평문 HTTP 포트나 inspect 서비스에서만 WebSocket 후보로 올림
            let escalate = match sniffed {
                SniffedProtocol::WebSocketCandidate => {
                    sniffer::is_http_port(transport.dst_port) || service.inspect
                }
                other => other.needs_deep_inspection(),
            };
            if escalate {
                return (
                    decision.with(Verdict::RedirectSlow, Reason::NeedsDeepInspection),
                    l4,
                );
            }
        }

        // 8. 전달
        self.conntrack
            .track(key, sid, len, transport.tcp_flags, now_ns);
        let decision = if tables.has_fast_path(sid) {
            decision.with(Verdict::RedirectFast, Reason::FastPath)
        } else {
            decision
        };
        (decision, l4)
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn tables(&self) -> &Arc<TableStore> {
        &self.tables
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn conntrack(&self) -> &ConnTracker {
        &self.conntrack
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use pktgate_common::{PROTO_UDP, TCP_ACK, TCP_SYN};

    use super::*;
    use crate::clock::ManualClock;
    use crate::parser::frames;
    use crate::tables::{AuthToken, Rule, Service};

    const CLIENT: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn engine_with(config: GateConfig) -> DecisionEngine {
        DecisionEngine::new(&config, Arc::new(ManualClock::new(0)))
    }

    fn engine() -> DecisionEngine {
        engine_with(GateConfig::default())
    }

    fn tcp_to(port: u16, payload: &[u8]) -> Vec<u8> {
        frames::tcp(CLIENT, SERVER, 40_000, port, TCP_ACK, payload)
    }

    fn service(id: u32, port: u16) -> Service {
        Service::new(id, SERVER, port, PROTO_TCP)
    }

    // =============================================================================
    // 1-3 단계
    // =============================================================================

    #[test]
    fn truncated_frame_is_dropped_as_malformed() {
        let e = engine();
        let d = e.classify(&[0u8; 20]);
        assert_eq!(d, Decision::new(Verdict::Drop, Reason::Malformed));
        assert_eq!(e.stats().snapshot().malformed, 1);
    }

    #[test]
    fn unhandled_ip_protocol_passes_unclassified() {
        let e = engine();
        let frame = frames::ipv4_raw(47, CLIENT, SERVER, &[0; 8]);
        assert_eq!(
            e.classify(&frame),
            Decision::new(Verdict::Pass, Reason::Unclassified)
        );
    }

    #[test]
    fn default_action_applies_without_service() {
        for (action, expected) in [
            (Verdict::RedirectSlow, Verdict::RedirectSlow),
            (Verdict::Drop, Verdict::Drop),
            (Verdict::Pass, Verdict::Pass),
        ] {
            let mut config = GateConfig::default();
            config.policy.default_action = action;
            let d = engine_with(config).classify(&tcp_to(9999, b""));
            assert_eq!(d.verdict, expected);
            assert_eq!(d.reason, Reason::NoService);
        }
    }

    #[test]
    fn drop_rule_without_service_does_not_override_default() {
        let e = engine();
        e.tables().upsert_rule(Rule::new(1, RuleAction::Drop)).unwrap();
        let d = e.classify(&tcp_to(9999, b""));
        assert_eq!(d.reason, Reason::NoService);
    }

    #[test]
    fn service_counters_update_on_match() {
        let e = engine();
        e.tables().upsert_service(service(1, 7000)).unwrap();
        let frame = tcp_to(7000, b"x");
        e.classify(&frame);

        let snap = e.tables().snapshot();
        let counters = &snap.service(1).unwrap().counters;
        assert_eq!(counters.packet_count.load(Ordering::Relaxed), 1);
        assert_eq!(counters.byte_count.load(Ordering::Relaxed), frame.len() as u64);
    }

    // =============================================================================
    // 4-6 단계
    // =============================================================================

    #[test]
    fn drop_rule_short_circuits_rate_limit() {
        let mut config = GateConfig::default();
        config.rate_limit.global_pps_limit = 1;
        let e = engine_with(config);
        e.tables().upsert_service(service(1, 7000)).unwrap();
        e.tables().upsert_rule(Rule::new(1, RuleAction::Drop)).unwrap();

        for _ in 0..5 {
            let d = e.classify(&tcp_to(7000, b""));
            assert_eq!(d.verdict, Verdict::Drop);
            assert_eq!(d.reason, Reason::RuleDrop);
            assert_eq!(d.rule_id, Some(1));
        }
        assert_eq!(e.limiter().counters().global_rejects, 0);
        assert_eq!(
            e.tables().snapshot().rule(1).unwrap().counters.packet_count.load(Ordering::Relaxed),
            5
        );
    }

    #[test]
    fn rate_limited_packets_are_dropped() {
        let mut config = GateConfig::default();
        config.rate_limit.per_source_pps_limit = 2;
        let e = engine_with(config);
        e.tables().upsert_service(service(1, 7000)).unwrap();

        assert_eq!(e.classify(&tcp_to(7000, b"")).verdict, Verdict::Pass);
        assert_eq!(e.classify(&tcp_to(7000, b"")).verdict, Verdict::Pass);
        let d = e.classify(&tcp_to(7000, b""));
        assert_eq!((d.verdict, d.reason), (Verdict::Drop, Reason::RateLimited));
        assert_eq!(e.stats().snapshot().rate_limited, 1);
    }

    #[test]
    fn complex_auth_goes_to_slow_path() {
        let e = engine();
        let mut svc = service(1, 7000);
        svc.auth_type = AuthType::Complex;
        e.tables().upsert_service(svc).unwrap();
        let d = e.classify(&tcp_to(7000, b""));
        assert_eq!((d.verdict, d.reason), (Verdict::RedirectSlow, Reason::ComplexAuth));
    }

    fn auth_payload(token: u32) -> Vec<u8> {
        let mut p = b"GET / HTTP/1.1\r\nAuthorization: xxxxxxxxxxxxxxxxxxxx".to_vec();
        // "Auth"는 16번 오프셋, 토큰은 36..40
        p[36..40].copy_from_slice(&token.to_le_bytes());
        p
    }

    #[test]
    fn simple_auth_accepts_valid_token_and_drops_others() {
        let e = engine();
        let mut svc = service(1, 7000);
        svc.auth_type = AuthType::Simple;
        e.tables().upsert_service(svc).unwrap();
        e.tables()
            .upsert_token(AuthToken {
                token_hash: 0xfeed_f00d,
                service_id: 1,
                expiry_ns: u64::MAX,
                permissions: 0,
            })
            .unwrap();

        let ok = e.classify(&tcp_to(7000, &auth_payload(0xfeed_f00d)));
        assert_eq!(ok.verdict, Verdict::Pass);

        let bad = e.classify(&tcp_to(7000, &auth_payload(0x0bad_0bad)));
        assert_eq!((bad.verdict, bad.reason), (Verdict::Drop, Reason::AuthFailed));
        assert_eq!(e.stats().snapshot().auth_failed, 1);
    }

    #[test]
    fn auth_required_rule_promotes_service_without_auth() {
        let e = engine();
        e.tables().upsert_service(service(1, 7000)).unwrap();
        let mut rule = Rule::new(1, RuleAction::Allow);
        rule.auth_required = true;
        e.tables().upsert_rule(rule).unwrap();

        let d = e.classify(&tcp_to(7000, &auth_payload(42)));
        assert_eq!(d.reason, Reason::AuthFailed);
    }

    // =============================================================================
    // 7-8 단계
    // =============================================================================

    #[test]
    fn redirect_rule_goes_to_slow_path() {
        let e = engine();
        e.tables().upsert_service(service(1, 7000)).unwrap();
        e.tables().upsert_rule(Rule::new(3, RuleAction::Redirect)).unwrap();
        let d = e.classify(&tcp_to(7000, b""));
        assert_eq!((d.verdict, d.reason), (Verdict::RedirectSlow, Reason::RuleRedirect));
        assert!(e.conntrack().is_empty());
    }

    #[test]
    fn websocket_service_goes_to_slow_path() {
        let e = engine();
        let mut svc = service(1, 7000);
        svc.allows_websocket = true;
        e.tables().upsert_service(svc).unwrap();
        let d = e.classify(&tcp_to(7000, b""));
        assert_eq!(d.reason, Reason::NeedsDeepInspection);
    }

    #[test]
    fn get_on_http_port_is_escalated_but_post_is_not() {
        let e = engine();
        e.tables().upsert_service(service(1, 80)).unwrap();

        let get = e.classify(&tcp_to(80, b"GET / HTTP/1.1\r\n"));
        assert_eq!(get.verdict, Verdict::RedirectSlow);
        assert_eq!(get.sniffed, Some(SniffedProtocol::WebSocketCandidate));

        let post = e.classify(&tcp_to(80, b"POST / HTTP/1.1\r\n"));
        assert_eq!(post.verdict, Verdict::Pass);
        assert_eq!(post.sniffed, Some(SniffedProtocol::Http));
    }

    #[test]
    fn get_on_tls_port_is_not_escalated() {
        let e = engine();
        e.tables().upsert_service(service(1, 8443)).unwrap();
        let d = e.classify(&tcp_to(8443, b"GET / HTTP/1.1\r\n"));
        assert_eq!(d.sniffed, Some(SniffedProtocol::WebSocketCandidate));
        assert_eq!(d.verdict, Verdict::Pass);

        let mut svc = service(2, 9000);
        svc.inspect = true;
        e.tables().upsert_service(svc).unwrap();
        let d = e.classify(&tcp_to(9000, b"GET /ws HTTP/1.1\r\n"));
        assert_eq!(d.verdict, Verdict::RedirectSlow);
        assert_eq!(d.reason, Reason::NeedsDeepInspection);
    }

    #[test]
    fn sniffer_skipped_outside_inspect_ports() {
        let e = engine();
        e.tables().upsert_service(service(1, 7000)).unwrap();
        let d = e.classify(&tcp_to(7000, &[0x16, 0x03, 0x03, 0, 5]));
        assert_eq!(d.verdict, Verdict::Pass);
        assert_eq!(d.sniffed, None);
    }

    #[test]
    fn inspect_annotation_forces_sniffing() {
        let e = engine();
        let mut svc = service(1, 7000);
        svc.inspect = true;
        e.tables().upsert_service(svc).unwrap();
        let d = e.classify(&tcp_to(7000, &[0x16, 0x03, 0x03, 0, 5]));
        assert_eq!(d.sniffed, Some(SniffedProtocol::Tls));
        assert_eq!(d.verdict, Verdict::RedirectSlow);
    }

    #[test]
    fn grpc_port_escalates() {
        let e = engine();
        e.tables().upsert_service(service(1, 50051)).unwrap();
        let d = e.classify(&tcp_to(50051, b""));
        assert_eq!(d.sniffed, Some(SniffedProtocol::Grpc));
        assert_eq!(d.verdict, Verdict::RedirectSlow);
    }

    #[test]
    fn fast_path_binding_redirects_fast_and_tracks_flow() {
        let e = engine();
        e.tables().upsert_service(service(1, 7000)).unwrap();
        e.tables().attach_fast_path(1).unwrap();

        let frame = frames::tcp(CLIENT, SERVER, 40_000, 7000, TCP_SYN, b"");
        let d = e.classify(&frame);
        assert_eq!((d.verdict, d.reason), (Verdict::RedirectFast, Reason::FastPath));
        assert_eq!(e.conntrack().len(), 1);
        assert_eq!(e.stats().snapshot().redirected_fast, 1);
    }

    #[test]
    fn udp_service_is_forwarded_and_tracked() {
        let e = engine();
        e.tables()
            .upsert_service(Service::new(2, SERVER, 53, PROTO_UDP))
            .unwrap();
        let d = e.classify(&frames::udp(CLIENT, SERVER, 5353, 53, b"q"));
        assert_eq!((d.verdict, d.reason), (Verdict::Pass, Reason::Forwarded));
        assert_eq!(d.service_id, Some(2));
        assert_eq!(e.conntrack().len(), 1);
    }

    #[test]
    fn conntrack_uses_engine_clock() {
        let clock = Arc::new(ManualClock::new(0));
        let mut config = GateConfig::default();
        config.conntrack.idle_timeout = Duration::from_secs(1);
        let e = DecisionEngine::new(&config, clock.clone());
        e.tables().upsert_service(service(1, 7000)).unwrap();

        e.classify(&tcp_to(7000, b""));
        clock.advance(Duration::from_secs(5));
        assert_eq!(e.conntrack().expire_idle(clock.now_ns()), 1);
    }

    // =============================================================================
    // Verdict / Reason
    // =============================================================================

    #[test]
    fn verdict_parse_roundtrip() {
        for v in Verdict::ALL {
            assert_eq!(v.as_str().parse::<Verdict>().unwrap(), v);
        }
        assert!("reject".parse::<Verdict>().is_err());
    }

    #[test]
    fn reason_codes_are_dense() {
        for (i, r) in Reason::ALL.iter().enumerate() {
            assert_eq!(r.code() as usize, i);
        }
    }

    #[test]
    fn decision_serializes_without_empty_fields() {
        let json = serde_json::to_string(&Decision::new(Verdict::Drop, Reason::Malformed)).unwrap();
        assert_eq!(json, r#"{"verdict":"drop","reason":"malformed"}"#);
    }
}
