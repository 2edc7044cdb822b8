#![no_main]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use pktgate_engine::{
    DecisionEngine, GateConfig, ManualClock, PortRange, Reason, Rule, RuleAction, Service, Verdict,
};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    services: Vec<FuzzService>,
    rules: Vec<FuzzRule>,
    per_source_limit: u8,
    /// (프레임, 직전 경과 밀리초)
    frames: Vec<(Vec<u8>, u8)>,
}

#[derive(Arbitrary, Debug)]
struct FuzzService {
    last_octet: u8,
    port: u16,
    protocol: u8,
    requires_tls: bool,
    fast_path: bool,
}

#[derive(Arbitrary, Debug)]
struct FuzzRule {
    dst_port: Option<u16>,
    action: u8,
    priority: i8,
}

fuzz_target!(|input: FuzzInput| {
    let mut config = GateConfig::default();
    config.conntrack.capacity = 64;
    config.conntrack.shards = 4;
    config.rate_limit.per_source_pps_limit = u64::from(input.per_source_limit);

    let clock = Arc::new(ManualClock::new(1_000_000_000));
    let engine = DecisionEngine::new(&config, clock.clone());
    let tables = engine.tables();

    for (i, s) in input.services.iter().take(16).enumerate() {
        let id = i as u32 + 1;
        let mut service = Service::new(id, Ipv4Addr::new(10, 0, 0, s.last_octet), s.port, s.protocol);
        service.requires_tls = s.requires_tls;
        // 잘못된 프로토콜 등은 거부되어도 됨
        if tables.upsert_service(service).is_ok() && s.fast_path {
            let _ = tables.attach_fast_path(id);
        }
    }
    for (i, r) in input.rules.iter().take(16).enumerate() {
        let action = match r.action % 3 {
            0 => RuleAction::Drop,
            1 => RuleAction::Allow,
            _ => RuleAction::Redirect,
        };
        let mut rule = Rule::new(i as u32 + 1, action);
        rule.dst_ports = r.dst_port.map(PortRange::single);
        rule.priority = i32::from(r.priority);
        let _ = tables.upsert_rule(rule);
    }

    for (frame, elapsed_ms) in input.frames.iter().take(256) {
        clock.advance(Duration::from_millis(u64::from(*elapsed_ms)));
        let d = engine.classify(frame);

        // 손상된 프레임은 항상 DROP
        if d.reason == Reason::Malformed {
            assert_eq!(d.verdict, Verdict::Drop);
        }
        assert!(engine.conntrack().len() <= 64);
    }

    let snap = engine.stats().snapshot();
    assert_eq!(snap.total, input.frames.len().min(256) as u64);
});
