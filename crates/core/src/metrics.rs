//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 패킷마다 메트릭 매크로를 호출하지 않습니다. 샤드 통계 스냅샷을
//! 주기적으로 읽어 `absolute()` / `set()`으로 발행합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `pktgate_`
//! - 모듈명: `engine_`, `ratelimit_`, `conntrack_`, `tables_`, `ingress_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (지연), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use pktgate_core::metrics as m;
//!
//! metrics::counter!(m::ENGINE_PACKETS_TOTAL).absolute(snapshot.total);
//! ```

use metrics::{describe_counter, describe_gauge};

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 판정 레이블 키 (pass, drop, redirect_fast, redirect_slow)
pub const LABEL_VERDICT: &str = "verdict";

/// 사유 레이블 키 (malformed, no_service, rule_drop, ...)
pub const LABEL_REASON: &str = "reason";

/// 프로토콜 레이블 키 (tcp, udp, icmp, other / http, tls, http2, grpc, websocket)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 레이트 리밋 범위 레이블 키 (global, source)
pub const LABEL_SCOPE: &str = "scope";

/// 테이블 레이블 키 (services, rules, tokens, fast_paths)
pub const LABEL_TABLE: &str = "table";

// ─── Engine 메트릭 ─────────────────────────────────────────────────

/// Engine: 처리된 전체 패킷 수 (counter)
pub const ENGINE_PACKETS_TOTAL: &str = "pktgate_engine_packets_total";

/// Engine: 처리된 전체 바이트 수 (counter)
pub const ENGINE_BYTES_TOTAL: &str = "pktgate_engine_bytes_total";

/// Engine: 판정별 패킷 수 (counter, label: verdict)
pub const ENGINE_VERDICTS_TOTAL: &str = "pktgate_engine_verdicts_total";

/// Engine: 사유별 패킷 수 (counter, label: reason)
pub const ENGINE_REASONS_TOTAL: &str = "pktgate_engine_reasons_total";

/// Engine: L4 프로토콜별 패킷 수 (counter, label: protocol)
pub const ENGINE_PROTOCOL_PACKETS_TOTAL: &str = "pktgate_engine_protocol_packets_total";

/// Engine: 스니핑된 L7 프로토콜별 패킷 수 (counter, label: protocol)
pub const ENGINE_SNIFFED_PACKETS_TOTAL: &str = "pktgate_engine_sniffed_packets_total";

/// Engine: 초당 패킷 처리량 (gauge)
pub const ENGINE_PACKETS_PER_SECOND: &str = "pktgate_engine_packets_per_second";

/// Engine: 초당 비트 처리량 (gauge)
pub const ENGINE_BITS_PER_SECOND: &str = "pktgate_engine_bits_per_second";

// ─── Rate Limiter 메트릭 ───────────────────────────────────────────

/// Rate Limiter: 범위별 거부 수 (counter, label: scope)
pub const RATELIMIT_REJECTS_TOTAL: &str = "pktgate_ratelimit_rejects_total";

/// Rate Limiter: 추적 중인 출발지 버킷 수 (gauge)
pub const RATELIMIT_TRACKED_SOURCES: &str = "pktgate_ratelimit_tracked_sources";

// ─── Conntrack 메트릭 ──────────────────────────────────────────────

/// Conntrack: 활성 플로우 수 (gauge)
pub const CONNTRACK_ACTIVE_FLOWS: &str = "pktgate_conntrack_active_flows";

/// Conntrack: 새로 생성된 플로우 수 (counter)
pub const CONNTRACK_INSERTED_TOTAL: &str = "pktgate_conntrack_inserted_total";

/// Conntrack: LRU로 퇴출된 플로우 수 (counter)
pub const CONNTRACK_EVICTED_TOTAL: &str = "pktgate_conntrack_evicted_total";

/// Conntrack: 유휴 타임아웃으로 만료된 플로우 수 (counter)
pub const CONNTRACK_EXPIRED_TOTAL: &str = "pktgate_conntrack_expired_total";

// ─── Tables 메트릭 ─────────────────────────────────────────────────

/// Tables: 테이블별 엔트리 수 (gauge, label: table)
pub const TABLES_ENTRIES: &str = "pktgate_tables_entries";

/// Tables: 게시된 스냅샷 세대 (gauge)
pub const TABLES_GENERATION: &str = "pktgate_tables_generation";

/// Tables: 거부된 컨트롤 플레인 쓰기 수 (counter)
pub const TABLES_WRITE_FAILURES_TOTAL: &str = "pktgate_tables_write_failures_total";

// ─── Ingress 메트릭 ────────────────────────────────────────────────

/// Ingress: 수신한 프레임 수 (counter)
pub const INGRESS_FRAMES_TOTAL: &str = "pktgate_ingress_frames_total";

/// Ingress: 큐가 가득 차 버린 프레임 수 (counter)
pub const INGRESS_FRAMES_DROPPED_TOTAL: &str = "pktgate_ingress_frames_dropped_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "pktgate_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "pktgate_daemon_build_info";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    describe_counter!(ENGINE_PACKETS_TOTAL, "Total packets classified");
    describe_counter!(ENGINE_BYTES_TOTAL, "Total bytes classified");
    describe_counter!(ENGINE_VERDICTS_TOTAL, "Packets by verdict");
    describe_counter!(ENGINE_REASONS_TOTAL, "Packets by verdict reason");
    describe_counter!(ENGINE_PROTOCOL_PACKETS_TOTAL, "Packets by L4 protocol");
    describe_counter!(ENGINE_SNIFFED_PACKETS_TOTAL, "Packets by sniffed L7 protocol");
    describe_gauge!(ENGINE_PACKETS_PER_SECOND, "Classified packets per second");
    describe_gauge!(ENGINE_BITS_PER_SECOND, "Classified bits per second");

    describe_counter!(RATELIMIT_REJECTS_TOTAL, "Rate limiter rejections by scope");
    describe_gauge!(RATELIMIT_TRACKED_SOURCES, "Per-source token buckets in use");

    describe_gauge!(CONNTRACK_ACTIVE_FLOWS, "Flows currently tracked");
    describe_counter!(CONNTRACK_INSERTED_TOTAL, "Flows created");
    describe_counter!(CONNTRACK_EVICTED_TOTAL, "Flows evicted by LRU");
    describe_counter!(CONNTRACK_EXPIRED_TOTAL, "Flows expired by idle timeout");

    describe_gauge!(TABLES_ENTRIES, "Entries in each configuration table");
    describe_gauge!(TABLES_GENERATION, "Generation of the published table snapshot");
    describe_counter!(TABLES_WRITE_FAILURES_TOTAL, "Rejected control-plane writes");

    describe_counter!(INGRESS_FRAMES_TOTAL, "Frames received by the mirror ingress");
    describe_counter!(
        INGRESS_FRAMES_DROPPED_TOTAL,
        "Frames dropped because a worker queue was full"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information");
}
