//! 설정 테이블: 서비스, 룰, 인증 토큰, fast path 바인딩
//!
//! 컨트롤 플레인은 [`TableStore`]를 통해 테이블을 쓰고, 데이터 플레인은
//! [`TableStore::snapshot`]으로 불변 스냅샷([`Tables`])을 읽습니다.
//!
//! # 동시성
//! ```text
//! control plane ──write──▶ Mutex(writer) ──build──▶ Tables(gen N+1) ──store──▶ ArcSwap
//!                                                                               │
//! data plane ◀──────────────────────── load (lock-free) ────────────────────────┘
//! ```
//! 쓰기는 writer 락으로 직렬화되고, 읽기는 쓰기를 기다리지 않습니다.
//! 쓰기가 실패하면 게시된 스냅샷은 바뀌지 않습니다.
//!
//! 서비스/룰 카운터는 `Arc`로 공유되는 원자값이며, 같은 id로 다시 upsert해도
//! 새 세대로 이어집니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use pktgate_common::{AUTH_COMPLEX, AUTH_NONE, AUTH_SIMPLE, PROTO_ANY, PROTO_ICMP, PROTO_TCP, PROTO_UDP};
use pktgate_core::error::TableError;
use pktgate_core::metrics as m;

use crate::matcher::{RuleOrder, RuleSet, ServiceIndex};

// =============================================================================
// 엔트리 타입
// =============================================================================

/// 서비스 인증 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// 인증 없음
    #[default]
    None,
    /// 페이로드 토큰 fast path 검사
    Simple,
    /// 항상 slow path
    Complex,
}

impl AuthType {
    /// 와이어 코드
    pub fn code(self) -> u8 {
        match self {
            Self::None => AUTH_NONE,
            Self::Simple => AUTH_SIMPLE,
            Self::Complex => AUTH_COMPLEX,
        }
    }
}

/// 룰 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// 즉시 DROP
    Drop,
    /// 나머지 단계 계속
    Allow,
    /// slow path로 전달
    Redirect,
}

/// 포함 범위 포트 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// 구간을 생성합니다.
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// 단일 포트 구간
    pub const fn single(port: u16) -> Self {
        Self::new(port, port)
    }

    #[inline]
    pub fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }
}

/// 서비스별 누적 카운터
#[derive(Debug, Default)]
pub struct ServiceCounters {
    pub packet_count: AtomicU64,
    pub byte_count: AtomicU64,
    /// 엔진 시계 기준 나노초
    pub last_activity_ns: AtomicU64,
}

/// 룰별 누적 카운터
#[derive(Debug, Default)]
pub struct RuleCounters {
    pub packet_count: AtomicU64,
    pub byte_count: AtomicU64,
    /// 엔진 시계 기준 나노초
    pub last_match_ns: AtomicU64,
}

fn record(packets: &AtomicU64, bytes: &AtomicU64, last: &AtomicU64, len: u64, now_ns: u64) {
    packets.fetch_add(1, Ordering::Relaxed);
    bytes.fetch_add(len, Ordering::Relaxed);
    // last write wins
    last.store(now_ns, Ordering::Relaxed);
}

/// 보호 대상 서비스
///
/// `(ip_addr, port_start..=port_end, protocol)`로 식별되는 목적지입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub service_id: u32,
    pub ip_addr: Ipv4Addr,
    pub port_start: u16,
    pub port_end: u16,
    /// 0 = 모든 프로토콜
    #[serde(default)]
    pub protocol: u8,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub requires_tls: bool,
    #[serde(default)]
    pub allows_websocket: bool,
    /// 출발지별 pps 상한 (전역 per-source 한도를 대체)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_pps: Option<u64>,
    /// 포트와 무관하게 gRPC로 간주
    #[serde(default)]
    pub grpc: bool,
    /// `inspect_ports`와 무관하게 스니핑
    #[serde(default)]
    pub inspect: bool,
    #[serde(skip)]
    pub counters: Arc<ServiceCounters>,
}

impl Service {
    /// 단일 포트 서비스를 생성합니다. 나머지 필드는 기본값입니다.
    pub fn new(service_id: u32, ip_addr: Ipv4Addr, port: u16, protocol: u8) -> Self {
        Self {
            service_id,
            ip_addr,
            port_start: port,
            port_end: port,
            protocol,
            auth_type: AuthType::None,
            requires_tls: false,
            allows_websocket: false,
            rate_limit_pps: None,
            grpc: false,
            inspect: false,
            counters: Arc::default(),
        }
    }

    /// 포트 구간
    pub fn ports(&self) -> PortRange {
        PortRange::new(self.port_start, self.port_end)
    }

    /// 서비스 매치를 카운터에 기록합니다.
    #[inline]
    pub fn record(&self, len: u64, now_ns: u64) {
        let c = &self.counters;
        record(&c.packet_count, &c.byte_count, &c.last_activity_ns, len, now_ns);
    }

    fn validate(&self) -> Result<(), TableError> {
        let invalid = |reason: String| TableError::InvalidEntry {
            table: "service",
            key: self.service_id,
            reason,
        };
        if self.service_id == 0 {
            return Err(invalid("service_id 0 is reserved".to_owned()));
        }
        if self.port_start > self.port_end {
            return Err(invalid(format!(
                "port_start {} > port_end {}",
                self.port_start, self.port_end
            )));
        }
        validate_protocol(self.protocol).map_err(invalid)?;
        if self.rate_limit_pps == Some(0) {
            return Err(invalid("rate_limit_pps must be greater than 0".to_owned()));
        }
        Ok(())
    }
}

/// 카운터를 제외한 정의 비교
impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.service_id == other.service_id
            && self.ip_addr == other.ip_addr
            && self.port_start == other.port_start
            && self.port_end == other.port_end
            && self.protocol == other.protocol
            && self.auth_type == other.auth_type
            && self.requires_tls == other.requires_tls
            && self.allows_websocket == other.allows_websocket
            && self.rate_limit_pps == other.rate_limit_pps
            && self.grpc == other.grpc
            && self.inspect == other.inspect
    }
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

/// 필터링 룰
///
/// 마스크가 0인 IP 필드와 `None`인 포트 구간은 와일드카드입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: u32,
    #[serde(default = "unspecified")]
    pub src_ip: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub src_mask: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub dst_ip: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub dst_mask: Ipv4Addr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ports: Option<PortRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ports: Option<PortRange>,
    /// 0 = 모든 프로토콜
    #[serde(default)]
    pub protocol: u8,
    pub action: RuleAction,
    #[serde(default)]
    pub auth_required: bool,
    /// 클수록 우선
    #[serde(default)]
    pub priority: i32,
    /// 연관 서비스 (0 = 없음)
    #[serde(default)]
    pub service_id: u32,
    #[serde(skip)]
    pub counters: Arc<RuleCounters>,
}

impl Rule {
    /// 모든 필드가 와일드카드인 룰을 생성합니다.
    pub fn new(rule_id: u32, action: RuleAction) -> Self {
        Self {
            rule_id,
            src_ip: Ipv4Addr::UNSPECIFIED,
            src_mask: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
            dst_mask: Ipv4Addr::UNSPECIFIED,
            src_ports: None,
            dst_ports: None,
            protocol: PROTO_ANY,
            action,
            auth_required: false,
            priority: 0,
            service_id: 0,
            counters: Arc::default(),
        }
    }

    /// 룰 매치를 카운터에 기록합니다.
    #[inline]
    pub fn record(&self, len: u64, now_ns: u64) {
        let c = &self.counters;
        record(&c.packet_count, &c.byte_count, &c.last_match_ns, len, now_ns);
    }

    fn validate(&self) -> Result<(), TableError> {
        let invalid = |reason: String| TableError::InvalidEntry {
            table: "rule",
            key: self.rule_id,
            reason,
        };
        for (name, mask) in [("src_mask", self.src_mask), ("dst_mask", self.dst_mask)] {
            let bits = u32::from(mask);
            // 연속된 상위 비트만 허용 (255.255.0.0은 가능, 255.0.255.0은 불가)
            if bits.leading_ones() + bits.trailing_zeros() != 32 {
                return Err(invalid(format!("{name} {mask} is not a contiguous prefix")));
            }
        }
        for (name, range) in [("src_ports", self.src_ports), ("dst_ports", self.dst_ports)] {
            if let Some(r) = range
                && r.start > r.end
            {
                return Err(invalid(format!("{name} start {} > end {}", r.start, r.end)));
            }
        }
        validate_protocol(self.protocol).map_err(invalid)
    }
}

/// 카운터를 제외한 정의 비교
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.rule_id == other.rule_id
            && self.src_ip == other.src_ip
            && self.src_mask == other.src_mask
            && self.dst_ip == other.dst_ip
            && self.dst_mask == other.dst_mask
            && self.src_ports == other.src_ports
            && self.dst_ports == other.dst_ports
            && self.protocol == other.protocol
            && self.action == other.action
            && self.auth_required == other.auth_required
            && self.priority == other.priority
            && self.service_id == other.service_id
    }
}

/// 인증 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthToken {
    pub token_hash: u32,
    /// 0 = 모든 서비스
    pub service_id: u32,
    /// 엔진 시계 기준 만료 시각 (포함)
    pub expiry_ns: u64,
    pub permissions: u32,
}

impl AuthToken {
    fn validate(&self) -> Result<(), TableError> {
        if self.token_hash == 0 {
            return Err(TableError::InvalidEntry {
                table: "token",
                key: 0,
                reason: "token_hash 0 is reserved".to_owned(),
            });
        }
        Ok(())
    }
}

fn validate_protocol(protocol: u8) -> Result<(), String> {
    match protocol {
        PROTO_ANY | PROTO_ICMP | PROTO_TCP | PROTO_UDP => Ok(()),
        other => Err(format!("unsupported protocol {other}")),
    }
}

// =============================================================================
// 스냅샷
// =============================================================================

/// 테이블 용량 한도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLimits {
    pub max_services: usize,
    pub max_rules: usize,
    pub max_auth_tokens: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            max_services: 1024,
            max_rules: 4096,
            max_auth_tokens: 4096,
        }
    }
}

/// 일괄 교체용 테이블 묶음
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    pub services: Vec<Service>,
    pub rules: Vec<Rule>,
    pub tokens: Vec<AuthToken>,
    pub fast_paths: Vec<u32>,
}

/// 게시된 불변 테이블 스냅샷
#[derive(Debug)]
pub struct Tables {
    generation: u64,
    services: BTreeMap<u32, Arc<Service>>,
    rules: BTreeMap<u32, Arc<Rule>>,
    tokens: HashMap<u32, AuthToken>,
    fast_paths: HashSet<u32>,
    service_index: ServiceIndex,
    rule_set: RuleSet,
}

impl Tables {
    fn build(
        generation: u64,
        services: BTreeMap<u32, Arc<Service>>,
        rules: BTreeMap<u32, Arc<Rule>>,
        tokens: HashMap<u32, AuthToken>,
        fast_paths: HashSet<u32>,
        order: RuleOrder,
    ) -> Self {
        let service_index = ServiceIndex::build(services.values());
        let rule_set = RuleSet::build(rules.values(), order);
        Self {
            generation,
            services,
            rules,
            tokens,
            fast_paths,
            service_index,
            rule_set,
        }
    }

    /// 빈 테이블
    pub fn empty(order: RuleOrder) -> Self {
        Self::build(
            0,
            BTreeMap::new(),
            BTreeMap::new(),
            HashMap::new(),
            HashSet::new(),
            order,
        )
    }

    /// 스냅샷 세대 (쓰기마다 1씩 증가)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 목적지로 서비스를 찾습니다.
    #[inline]
    pub fn find_service(&self, dst_ip: u32, dst_port: u16, protocol: u8) -> Option<&Arc<Service>> {
        self.service_index.find(dst_ip, dst_port, protocol)
    }

    /// 매치 룰 집합
    pub fn rules(&self) -> &RuleSet {
        &self.rule_set
    }

    /// 토큰 해시로 토큰을 찾습니다.
    #[inline]
    pub fn token(&self, token_hash: u32) -> Option<&AuthToken> {
        self.tokens.get(&token_hash)
    }

    /// 서비스에 fast path 목적지가 있는지 확인합니다.
    #[inline]
    pub fn has_fast_path(&self, service_id: u32) -> bool {
        self.fast_paths.contains(&service_id)
    }

    pub fn service(&self, service_id: u32) -> Option<&Arc<Service>> {
        self.services.get(&service_id)
    }

    pub fn rule(&self, rule_id: u32) -> Option<&Arc<Rule>> {
        self.rules.get(&rule_id)
    }

    /// id 오름차순 서비스
    pub fn services(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.services.values()
    }

    /// token_hash 오름차순 토큰
    pub fn tokens(&self) -> Vec<AuthToken> {
        let mut tokens: Vec<AuthToken> = self.tokens.values().copied().collect();
        tokens.sort_unstable_by_key(|t| t.token_hash);
        tokens
    }

    /// 오름차순 fast path 서비스 id
    pub fn fast_paths(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.fast_paths.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn fast_path_count(&self) -> usize {
        self.fast_paths.len()
    }
}

// =============================================================================
// TableStore
// =============================================================================

/// 쓰기 중인 테이블 사본
struct Draft {
    services: BTreeMap<u32, Arc<Service>>,
    rules: BTreeMap<u32, Arc<Rule>>,
    tokens: HashMap<u32, AuthToken>,
    fast_paths: HashSet<u32>,
}

impl Draft {
    fn from_tables(tables: &Tables) -> Self {
        Self {
            services: tables.services.clone(),
            rules: tables.rules.clone(),
            tokens: tables.tokens.clone(),
            fast_paths: tables.fast_paths.clone(),
        }
    }
}

/// copy-on-write 테이블 저장소
///
/// 데이터 플레인은 [`current`](Self::current)와 [`snapshot`](Self::snapshot)만 호출합니다.
pub struct TableStore {
    current: ArcSwap<Tables>,
    writer: Mutex<()>,
    limits: TableLimits,
    order: RuleOrder,
    write_failures: AtomicU64,
}

impl TableStore {
    /// 빈 저장소를 생성합니다.
    pub fn new(limits: TableLimits, order: RuleOrder) -> Self {
        Self {
            current: ArcSwap::from_pointee(Tables::empty(order)),
            writer: Mutex::new(()),
            limits,
            order,
            write_failures: AtomicU64::new(0),
        }
    }

    /// 현재 스냅샷. 쓰기와 경합하지 않습니다.
    #[inline]
    pub fn snapshot(&self) -> Arc<Tables> {
        self.current.load_full()
    }

    /// 패킷 경로용 임시 참조. 짧은 범위 안에서만 쥐고 있어야 합니다.
    #[inline]
    pub fn current(&self) -> Guard<Arc<Tables>> {
        self.current.load()
    }

    /// 현재 스냅샷 세대
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    /// 거부된 쓰기 수
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// 테이블 크기와 세대를 메트릭으로 발행합니다.
    pub fn publish_metrics(&self) {
        let tables = self.current.load();
        for (table, len) in [
            ("service", tables.service_count()),
            ("rule", tables.rule_count()),
            ("token", tables.token_count()),
            ("fast_path", tables.fast_path_count()),
        ] {
            metrics::gauge!(m::TABLES_ENTRIES, m::LABEL_TABLE => table).set(len as f64);
        }
        metrics::gauge!(m::TABLES_GENERATION).set(tables.generation as f64);
        metrics::counter!(m::TABLES_WRITE_FAILURES_TOTAL).absolute(self.write_failures());
    }

    /// 서비스를 추가하거나 교체합니다.
    pub fn upsert_service(&self, mut service: Service) -> Result<u64, TableError> {
        self.write("upsert_service", |draft, limits| {
            service.validate()?;
            match draft.services.get(&service.service_id) {
                Some(existing) => service.counters = Arc::clone(&existing.counters),
                None if draft.services.len() >= limits.max_services => {
                    return Err(TableError::Full {
                        table: "service",
                        capacity: limits.max_services,
                    });
                }
                None => {}
            }
            debug!(service_id = service.service_id, ip = %service.ip_addr, "upsert service");
            draft.services.insert(service.service_id, Arc::new(service));
            Ok(())
        })
    }

    /// 서비스를 제거합니다. fast path 바인딩도 함께 제거됩니다.
    ///
    /// 존재했으면 `true`를 반환합니다.
    pub fn remove_service(&self, service_id: u32) -> Result<bool, TableError> {
        let mut removed = false;
        self.write("remove_service", |draft, _| {
            removed = draft.services.remove(&service_id).is_some();
            draft.fast_paths.remove(&service_id);
            Ok(())
        })?;
        Ok(removed)
    }

    /// 룰을 추가하거나 교체합니다.
    pub fn upsert_rule(&self, mut rule: Rule) -> Result<u64, TableError> {
        self.write("upsert_rule", |draft, limits| {
            rule.validate()?;
            match draft.rules.get(&rule.rule_id) {
                Some(existing) => rule.counters = Arc::clone(&existing.counters),
                None if draft.rules.len() >= limits.max_rules => {
                    return Err(TableError::Full {
                        table: "rule",
                        capacity: limits.max_rules,
                    });
                }
                None => {}
            }
            debug!(rule_id = rule.rule_id, action = ?rule.action, priority = rule.priority, "upsert rule");
            draft.rules.insert(rule.rule_id, Arc::new(rule));
            Ok(())
        })
    }

    pub fn remove_rule(&self, rule_id: u32) -> Result<bool, TableError> {
        let mut removed = false;
        self.write("remove_rule", |draft, _| {
            removed = draft.rules.remove(&rule_id).is_some();
            Ok(())
        })?;
        Ok(removed)
    }

    /// 토큰을 추가하거나 교체합니다.
    pub fn upsert_token(&self, token: AuthToken) -> Result<u64, TableError> {
        self.write("upsert_token", |draft, limits| {
            token.validate()?;
            if !draft.tokens.contains_key(&token.token_hash)
                && draft.tokens.len() >= limits.max_auth_tokens
            {
                return Err(TableError::Full {
                    table: "token",
                    capacity: limits.max_auth_tokens,
                });
            }
            draft.tokens.insert(token.token_hash, token);
            Ok(())
        })
    }

    pub fn remove_token(&self, token_hash: u32) -> Result<bool, TableError> {
        let mut removed = false;
        self.write("remove_token", |draft, _| {
            removed = draft.tokens.remove(&token_hash).is_some();
            Ok(())
        })?;
        Ok(removed)
    }

    /// 서비스에 fast path 목적지를 연결합니다.
    pub fn attach_fast_path(&self, service_id: u32) -> Result<u64, TableError> {
        self.write("attach_fast_path", |draft, _| {
            if !draft.services.contains_key(&service_id) {
                return Err(unknown_service("fast_path", service_id));
            }
            draft.fast_paths.insert(service_id);
            Ok(())
        })
    }

    pub fn detach_fast_path(&self, service_id: u32) -> Result<bool, TableError> {
        let mut removed = false;
        self.write("detach_fast_path", |draft, _| {
            removed = draft.fast_paths.remove(&service_id);
            Ok(())
        })?;
        Ok(removed)
    }

    /// 모든 테이블을 원자적으로 교체합니다.
    ///
    /// 하나라도 거부되면 아무것도 바뀌지 않습니다. 기존 id의 카운터는 유지됩니다.
    pub fn replace_all(&self, set: TableSet) -> Result<u64, TableError> {
        self.write("replace_all", |draft, limits| {
            check_capacity("service", set.services.len(), limits.max_services)?;
            check_capacity("rule", set.rules.len(), limits.max_rules)?;
            check_capacity("token", set.tokens.len(), limits.max_auth_tokens)?;

            let mut services = BTreeMap::new();
            for mut service in set.services {
                service.validate()?;
                if let Some(existing) = draft.services.get(&service.service_id) {
                    service.counters = Arc::clone(&existing.counters);
                }
                if services.insert(service.service_id, Arc::new(service)).is_some() {
                    return Err(duplicate("service"));
                }
            }

            let mut rules = BTreeMap::new();
            for mut rule in set.rules {
                rule.validate()?;
                if let Some(existing) = draft.rules.get(&rule.rule_id) {
                    rule.counters = Arc::clone(&existing.counters);
                }
                if rules.insert(rule.rule_id, Arc::new(rule)).is_some() {
                    return Err(duplicate("rule"));
                }
            }

            let mut tokens = HashMap::with_capacity(set.tokens.len());
            for token in set.tokens {
                token.validate()?;
                tokens.insert(token.token_hash, token);
            }

            let mut fast_paths = HashSet::with_capacity(set.fast_paths.len());
            for id in set.fast_paths {
                if !services.contains_key(&id) {
                    return Err(unknown_service("fast_path", id));
                }
                fast_paths.insert(id);
            }

            *draft = Draft {
                services,
                rules,
                tokens,
                fast_paths,
            };
            Ok(())
        })
    }

    /// 사본에 쓰기를 적용하고 새 세대를 게시합니다.
    fn write<F>(&self, op: &'static str, apply: F) -> Result<u64, TableError>
    where
        F: FnOnce(&mut Draft, TableLimits) -> Result<(), TableError>,
    {
        let _guard = self.writer.lock();
        let current = self.current.load();
        let mut draft = Draft::from_tables(&current);

        if let Err(e) = apply(&mut draft, self.limits) {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(op, error = %e, generation = current.generation, "table write rejected");
            return Err(e);
        }

        let generation = current.generation + 1;
        let next = Tables::build(
            generation,
            draft.services,
            draft.rules,
            draft.tokens,
            draft.fast_paths,
            self.order,
        );
        info!(
            op,
            generation,
            services = next.service_count(),
            rules = next.rule_count(),
            tokens = next.token_count(),
            fast_paths = next.fast_path_count(),
            "tables published"
        );
        self.current.store(Arc::new(next));
        Ok(generation)
    }
}

fn check_capacity(table: &'static str, len: usize, capacity: usize) -> Result<(), TableError> {
    if len > capacity {
        return Err(TableError::Full { table, capacity });
    }
    Ok(())
}

fn duplicate(table: &'static str) -> TableError {
    TableError::InvalidEntry {
        table,
        key: 0,
        reason: "duplicate id in bulk load".to_owned(),
    }
}

fn unknown_service(table: &'static str, service_id: u32) -> TableError {
    TableError::InvalidEntry {
        table,
        key: service_id,
        reason: "unknown service".to_owned(),
    }
}
