//! 서비스/룰 매처
//!
//! [`ServiceIndex`]는 `(dst_ip, protocol)` 기준 해시 + 정렬된 포트 구간 인덱스로
//! 전체 서비스 테이블을 조회합니다. 여러 서비스가 매치되면 `service_id`가 가장
//! 작은 서비스가 선택됩니다.
//!
//! 포트 구간 서비스는 스냅샷을 만들 때 서로 겹치지 않는 구간으로 쪼개 두고, 각
//! 구간에는 그 구간의 승자(가장 작은 id)만 남깁니다. 조회는 이진 탐색 한 번입니다.
//!
//! [`RuleSet`]은 프로토콜별로 미리 정렬된 룰 목록을 보관하고, 첫 번째로 매치되는
//! 룰을 반환합니다. 정렬 기준은 [`RuleOrder`]가 결정합니다.

use std::collections::HashMap;
use std::sync::Arc;

use pktgate_common::{FlowKey, PROTO_ANY};

use crate::tables::{Rule, Service};

// =============================================================================
// 서비스 인덱스
// =============================================================================

/// 목적지 → 서비스 인덱스
#[derive(Debug, Default)]
pub struct ServiceIndex {
    /// 단일 포트 서비스: (ip, protocol, port)
    exact: HashMap<(u32, u8, u16), Arc<Service>>,
    /// 포트 구간 서비스: (ip, protocol) → 겹치지 않는 구간, 오름차순
    ranges: HashMap<(u32, u8), Vec<Segment>>,
}

/// 승자가 정해진 포트 구간
#[derive(Debug)]
struct Segment {
    start: u16,
    end: u16,
    service: Arc<Service>,
}

impl ServiceIndex {
    /// id 오름차순으로 주어진 서비스로 인덱스를 구성합니다.
    pub fn build<'a>(services: impl Iterator<Item = &'a Arc<Service>>) -> Self {
        let mut index = Self::default();
        let mut ranged: HashMap<(u32, u8), Vec<Arc<Service>>> = HashMap::new();
        for svc in services {
            let ip = u32::from(svc.ip_addr);
            if svc.port_start == svc.port_end {
                // 같은 키는 먼저 들어온 (더 작은) id 유지
                index
                    .exact
                    .entry((ip, svc.protocol, svc.port_start))
                    .or_insert_with(|| Arc::clone(svc));
            } else {
                ranged
                    .entry((ip, svc.protocol))
                    .or_default()
                    .push(Arc::clone(svc));
            }
        }
        index.ranges = ranged
            .into_iter()
            .map(|(key, bucket)| (key, split_ranges(&bucket)))
            .collect();
        index
    }

    /// `dst_ip == ip_addr`, `dst_port ∈ [port_start, port_end]`,
    /// `protocol == 0 || protocol == 패킷 프로토콜`인 서비스를 찾습니다.
    pub fn find(&self, dst_ip: u32, dst_port: u16, protocol: u8) -> Option<&Arc<Service>> {
        let mut best = self.find_in(dst_ip, dst_port, protocol);
        if protocol != PROTO_ANY {
            best = lowest(best, self.find_in(dst_ip, dst_port, PROTO_ANY));
        }
        best
    }

    fn find_in(&self, ip: u32, port: u16, protocol: u8) -> Option<&Arc<Service>> {
        let exact = self.exact.get(&(ip, protocol, port));
        let ranged = self.ranges.get(&(ip, protocol)).and_then(|segments| {
            let i = segments.partition_point(|seg| seg.end < port);
            segments
                .get(i)
                .filter(|seg| seg.start <= port)
                .map(|seg| &seg.service)
        });
        lowest(exact, ranged)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.ranges.is_empty()
    }
}

/// 구간 경계마다 잘라 겹치지 않는 구간 목록을 만듭니다.
///
/// 경계 사이의 기본 구간은 각 서비스 구간에 완전히 포함되거나 완전히 벗어나므로,
/// 기본 구간의 시작 포트 하나로 덮는 서비스를 판정할 수 있습니다. 같은 승자의
/// 인접 구간은 합칩니다.
fn split_ranges(services: &[Arc<Service>]) -> Vec<Segment> {
    let mut bounds: Vec<u32> = services
        .iter()
        .flat_map(|s| [u32::from(s.port_start), u32::from(s.port_end) + 1])
        .collect();
    bounds.sort_unstable();
    bounds.dedup();

    let mut segments: Vec<Segment> = Vec::new();
    for pair in bounds.windows(2) {
        // pair[0] < pair[1] <= 65536 이므로 둘 다 u16 범위
        let (lo, hi) = (pair[0] as u16, (pair[1] - 1) as u16);
        let Some(winner) = services
            .iter()
            .filter(|s| s.port_start <= lo && lo <= s.port_end)
            .min_by_key(|s| s.service_id)
        else {
            continue;
        };
        match segments.last_mut() {
            Some(last)
                if last.service.service_id == winner.service_id
                    && u32::from(last.end) + 1 == u32::from(lo) =>
            {
                last.end = hi;
            }
            _ => segments.push(Segment {
                start: lo,
                end: hi,
                service: Arc::clone(winner),
            }),
        }
    }
    segments
}

fn lowest<'a>(a: Option<&'a Arc<Service>>, b: Option<&'a Arc<Service>>) -> Option<&'a Arc<Service>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if y.service_id < x.service_id { y } else { x }),
        (x, None) => x,
        (None, y) => y,
    }
}

// =============================================================================
// 룰 집합
// =============================================================================

/// 룰 정렬 기준
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuleOrder {
    /// priority 내림차순, 같으면 rule_id 오름차순
    #[default]
    Priority,
    /// rule_id 오름차순만 사용 (priority 무시)
    RuleId,
}

impl RuleOrder {
    /// `engine.rule_priority` 설정값에서 변환합니다.
    pub fn from_flag(rule_priority: bool) -> Self {
        if rule_priority {
            Self::Priority
        } else {
            Self::RuleId
        }
    }
}

/// 정렬된 룰 목록
#[derive(Debug, Default)]
pub struct RuleSet {
    /// 특정 프로토콜 패킷용 목록 (해당 프로토콜 룰 + 와일드카드 룰)
    by_protocol: HashMap<u8, Vec<Arc<Rule>>>,
    /// 프로토콜 전용 룰이 없는 패킷용 목록 (와일드카드 룰만)
    wildcard: Vec<Arc<Rule>>,
    len: usize,
}

impl RuleSet {
    pub fn build<'a>(rules: impl Iterator<Item = &'a Arc<Rule>>, order: RuleOrder) -> Self {
        let mut set = Self::default();
        let mut specific: Vec<&Arc<Rule>> = Vec::new();
        for rule in rules {
            set.len += 1;
            if rule.protocol == PROTO_ANY {
                set.wildcard.push(Arc::clone(rule));
            } else {
                specific.push(rule);
            }
        }
        for rule in specific {
            set.by_protocol
                .entry(rule.protocol)
                .or_insert_with(|| set.wildcard.clone())
                .push(Arc::clone(rule));
        }

        sort_rules(&mut set.wildcard, order);
        for bucket in set.by_protocol.values_mut() {
            sort_rules(bucket, order);
        }
        set
    }

    /// 5-tuple에 매치되는 첫 번째 룰을 반환합니다.
    pub fn find(&self, key: &FlowKey) -> Option<&Arc<Rule>> {
        let candidates = self.by_protocol.get(&key.protocol).unwrap_or(&self.wildcard);
        candidates.iter().find(|rule| rule_matches(rule, key))
    }

    /// 정렬 순서대로 전체 룰을 반환합니다 (프로토콜 구분 없이).
    pub fn ordered(&self, order: RuleOrder) -> Vec<Arc<Rule>> {
        let mut all: Vec<Arc<Rule>> = self.wildcard.clone();
        for bucket in self.by_protocol.values() {
            all.extend(bucket.iter().filter(|r| r.protocol != PROTO_ANY).cloned());
        }
        sort_rules(&mut all, order);
        all
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn sort_rules(rules: &mut [Arc<Rule>], order: RuleOrder) {
    match order {
        RuleOrder::Priority => {
            rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.rule_id.cmp(&b.rule_id)))
        }
        RuleOrder::RuleId => rules.sort_by_key(|r| r.rule_id),
    }
}

#[inline]
fn masked_eq(pkt: u32, ip: u32, mask: u32) -> bool {
    (pkt & mask) == (ip & mask)
}

/// 단일 룰 매치 판정
#[inline]
pub fn rule_matches(rule: &Rule, key: &FlowKey) -> bool {
    (rule.protocol == PROTO_ANY || rule.protocol == key.protocol)
        && masked_eq(key.src_ip, u32::from(rule.src_ip), u32::from(rule.src_mask))
        && masked_eq(key.dst_ip, u32::from(rule.dst_ip), u32::from(rule.dst_mask))
        && rule.src_ports.is_none_or(|r| r.contains(key.src_port))
        && rule.dst_ports.is_none_or(|r| r.contains(key.dst_port))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use pktgate_common::{PROTO_TCP, PROTO_UDP};

    use super::*;
    use crate::tables::{PortRange, RuleAction};

    const IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn svc(id: u32, start: u16, end: u16, protocol: u8) -> Arc<Service> {
        let mut s = Service::new(id, IP, start, protocol);
        s.port_end = end;
        Arc::new(s)
    }

    fn index(services: &[Arc<Service>]) -> ServiceIndex {
        let mut sorted = services.to_vec();
        sorted.sort_by_key(|s| s.service_id);
        ServiceIndex::build(sorted.iter())
    }

    fn key(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, proto: u8) -> FlowKey {
        FlowKey::new(
            u32::from(Ipv4Addr::from(src)),
            u32::from(Ipv4Addr::from(dst)),
            sport,
            dport,
            proto,
        )
    }

    // =============================================================================
    // find_service
    // =============================================================================

    #[test]
    fn exact_port_match() {
        let idx = index(&[svc(1, 443, 443, PROTO_TCP)]);
        let ip = u32::from(IP);
        assert_eq!(idx.find(ip, 443, PROTO_TCP).unwrap().service_id, 1);
        assert!(idx.find(ip, 444, PROTO_TCP).is_none());
        assert!(idx.find(ip, 443, PROTO_UDP).is_none());
        assert!(idx.find(ip + 1, 443, PROTO_TCP).is_none());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let idx = index(&[svc(1, 8000, 8100, PROTO_TCP)]);
        let ip = u32::from(IP);
        assert!(idx.find(ip, 7999, PROTO_TCP).is_none());
        assert!(idx.find(ip, 8000, PROTO_TCP).is_some());
        assert!(idx.find(ip, 8100, PROTO_TCP).is_some());
        assert!(idx.find(ip, 8101, PROTO_TCP).is_none());
    }

    #[test]
    fn protocol_zero_matches_any_protocol() {
        let idx = index(&[svc(1, 53, 53, PROTO_ANY)]);
        let ip = u32::from(IP);
        assert!(idx.find(ip, 53, PROTO_TCP).is_some());
        assert!(idx.find(ip, 53, PROTO_UDP).is_some());
    }

    #[test]
    fn lowest_service_id_wins_across_buckets() {
        let idx = index(&[
            svc(7, 443, 443, PROTO_TCP),
            svc(3, 1, 1000, PROTO_ANY),
            svc(5, 400, 500, PROTO_TCP),
        ]);
        let ip = u32::from(IP);
        assert_eq!(idx.find(ip, 443, PROTO_TCP).unwrap().service_id, 3);
        assert_eq!(idx.find(ip, 1001, PROTO_TCP), None);
    }

    #[test]
    fn overlapping_ranges_pick_lowest_id() {
        let idx = index(&[svc(9, 100, 200, PROTO_UDP), svc(4, 150, 300, PROTO_UDP)]);
        let ip = u32::from(IP);
        assert_eq!(idx.find(ip, 120, PROTO_UDP).unwrap().service_id, 9);
        assert_eq!(idx.find(ip, 180, PROTO_UDP).unwrap().service_id, 4);
        assert_eq!(idx.find(ip, 250, PROTO_UDP).unwrap().service_id, 4);
    }

    #[test]
    fn split_ranges_agree_with_linear_scan() {
        let services = vec![
            svc(6, 10, 90, PROTO_TCP),
            svc(2, 40, 60, PROTO_TCP),
            svc(8, 50, 200, PROTO_TCP),
            svc(1, 55, 55, PROTO_TCP),
            svc(4, 120, 65535, PROTO_TCP),
            svc(3, 300, 310, PROTO_TCP),
        ];
        let idx = index(&services);
        let ip = u32::from(IP);
        for port in 0..=u16::MAX {
            let expected = services
                .iter()
                .filter(|s| s.port_start <= port && port <= s.port_end)
                .map(|s| s.service_id)
                .min();
            assert_eq!(idx.find(ip, port, PROTO_TCP).map(|s| s.service_id), expected, "port {port}");
        }
    }

    #[test]
    fn adjacent_segments_of_one_service_are_merged() {
        let segments = split_ranges(&[svc(1, 100, 200, PROTO_TCP), svc(5, 150, 160, PROTO_TCP)]);
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (100, 200));

        let segments = split_ranges(&[svc(9, 100, 200, PROTO_TCP), svc(5, 150, 160, PROTO_TCP)]);
        let spans: Vec<(u16, u16, u32)> = segments
            .iter()
            .map(|s| (s.start, s.end, s.service.service_id))
            .collect();
        assert_eq!(spans, vec![(100, 149, 9), (150, 160, 5), (161, 200, 9)]);
    }

    #[test]
    fn duplicate_exact_keys_keep_lowest_id() {
        let idx = index(&[svc(2, 80, 80, PROTO_TCP), svc(1, 80, 80, PROTO_TCP)]);
        assert_eq!(idx.find(u32::from(IP), 80, PROTO_TCP).unwrap().service_id, 1);
    }

    #[test]
    fn large_table_has_no_prefix_blind_spot() {
        let services: Vec<Arc<Service>> = (1..=5000u32)
            .map(|id| svc(id, id as u16, id as u16, PROTO_TCP))
            .collect();
        let idx = index(&services);
        assert_eq!(idx.find(u32::from(IP), 4999, PROTO_TCP).unwrap().service_id, 4999);
    }

    // =============================================================================
    // find_rule
    // =============================================================================

    fn rule(id: u32, priority: i32) -> Rule {
        let mut r = Rule::new(id, RuleAction::Allow);
        r.priority = priority;
        r
    }

    fn set(rules: Vec<Rule>, order: RuleOrder) -> RuleSet {
        let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        RuleSet::build(rules.iter(), order)
    }

    #[test]
    fn higher_priority_wins_then_lowest_id() {
        let rules = set(vec![rule(1, 0), rule(2, 10), rule(3, 10)], RuleOrder::Priority);
        let k = key([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, PROTO_TCP);
        assert_eq!(rules.find(&k).unwrap().rule_id, 2);
    }

    #[test]
    fn rule_id_order_ignores_priority() {
        let rules = set(vec![rule(5, 100), rule(2, -1)], RuleOrder::RuleId);
        let k = key([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, PROTO_TCP);
        assert_eq!(rules.find(&k).unwrap().rule_id, 2);
    }

    #[test]
    fn masked_source_match() {
        let mut r = rule(1, 0);
        r.src_ip = Ipv4Addr::new(192, 168, 0, 0);
        r.src_mask = Ipv4Addr::new(255, 255, 0, 0);
        let rules = set(vec![r], RuleOrder::Priority);

        assert!(rules.find(&key([192, 168, 7, 9], [10, 0, 0, 5], 1, 2, PROTO_TCP)).is_some());
        assert!(rules.find(&key([192, 169, 7, 9], [10, 0, 0, 5], 1, 2, PROTO_TCP)).is_none());
    }

    #[test]
    fn port_ranges_and_protocol_filter() {
        let mut r = rule(1, 0);
        r.protocol = PROTO_UDP;
        r.dst_ports = Some(PortRange::new(5000, 5010));
        r.src_ports = Some(PortRange::single(53));
        let rules = set(vec![r], RuleOrder::Priority);

        assert!(rules.find(&key([1, 1, 1, 1], [2, 2, 2, 2], 53, 5005, PROTO_UDP)).is_some());
        assert!(rules.find(&key([1, 1, 1, 1], [2, 2, 2, 2], 54, 5005, PROTO_UDP)).is_none());
        assert!(rules.find(&key([1, 1, 1, 1], [2, 2, 2, 2], 53, 5011, PROTO_UDP)).is_none());
        assert!(rules.find(&key([1, 1, 1, 1], [2, 2, 2, 2], 53, 5005, PROTO_TCP)).is_none());
    }

    #[test]
    fn wildcard_rule_matches_every_protocol_but_yields_to_specific() {
        let mut specific = rule(2, 5);
        specific.protocol = PROTO_TCP;
        let rules = set(vec![rule(1, 0), specific], RuleOrder::Priority);

        let tcp = key([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, PROTO_TCP);
        let udp = key([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, PROTO_UDP);
        assert_eq!(rules.find(&tcp).unwrap().rule_id, 2);
        assert_eq!(rules.find(&udp).unwrap().rule_id, 1);
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn ordered_lists_each_rule_once() {
        let mut a = rule(1, 0);
        a.protocol = PROTO_TCP;
        let mut b = rule(2, 9);
        b.protocol = PROTO_UDP;
        let rules = set(vec![a, b, rule(3, 1)], RuleOrder::Priority);
        let ids: Vec<u32> = rules.ordered(RuleOrder::Priority).iter().map(|r| r.rule_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
