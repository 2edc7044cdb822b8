//! pktgate 와이어 상수 및 공유 타입
//!
//! 이 크레이트는 `#![no_std]` 환경에서 사용 가능한 상수와 `#[repr(C)]` 타입을
//! 정의합니다. 판정 엔진과, 엔진의 판정 코드를 소비하는 외부 디스패처
//! (커널 바이패스 소켓, XDP 프론트엔드, 큐 핸드오프)가 같은 값을 사용하도록 보장합니다.
//!
//! # 판정 코드
//! 값은 원래 필터 프로그램의 액션 번호와 같습니다.
//! ```text
//! 0 PASS  1 DROP  2 REDIRECT_FAST (커널 바이패스)  3 REDIRECT_SLOW (범용 경로)
//! ```

#![no_std]

// =============================================================================
// Ethernet / IPv4
// =============================================================================

/// 이더넷 헤더 길이 (VLAN 태그 없음)
pub const ETH_HDR_LEN: usize = 14;
/// IPv4 EtherType
pub const ETH_P_IP: u16 = 0x0800;
/// IPv6 EtherType
pub const ETH_P_IPV6: u16 = 0x86DD;
/// ARP EtherType
pub const ETH_P_ARP: u16 = 0x0806;

/// IPv4 최소 헤더 길이 (ihl = 5)
pub const IPV4_MIN_HDR_LEN: usize = 20;
/// IPv4 버전 번호
pub const IPV4_VERSION: u8 = 4;

// =============================================================================
// 프로토콜 상수
// =============================================================================

/// 모든 프로토콜 (서비스/룰 와일드카드)
pub const PROTO_ANY: u8 = 0;
/// ICMP 프로토콜 번호
pub const PROTO_ICMP: u8 = 1;
/// TCP 프로토콜 번호
pub const PROTO_TCP: u8 = 6;
/// UDP 프로토콜 번호
pub const PROTO_UDP: u8 = 17;

/// TCP 최소 헤더 길이 (doff = 5)
pub const TCP_MIN_HDR_LEN: usize = 20;
/// UDP 헤더 길이
pub const UDP_HDR_LEN: usize = 8;
/// ICMP 헤더 길이
pub const ICMP_HDR_LEN: usize = 8;

// =============================================================================
// TCP 플래그
// =============================================================================

/// FIN 플래그
pub const TCP_FIN: u8 = 0x01;
/// SYN 플래그
pub const TCP_SYN: u8 = 0x02;
/// RST 플래그
pub const TCP_RST: u8 = 0x04;
/// PSH 플래그
pub const TCP_PSH: u8 = 0x08;
/// ACK 플래그
pub const TCP_ACK: u8 = 0x10;

// =============================================================================
// 잘 알려진 포트
// =============================================================================

/// HTTP
pub const PORT_HTTP: u16 = 80;
/// HTTP 대체 포트
pub const PORT_HTTP_ALT: u16 = 8080;
/// HTTPS
pub const PORT_HTTPS: u16 = 443;
/// HTTPS 대체 포트
pub const PORT_HTTPS_ALT: u16 = 8443;
/// gRPC 기본 포트
pub const PORT_GRPC: u16 = 50051;

// =============================================================================
// 프로토콜 스니핑
// =============================================================================

/// 스니퍼가 검사하는 최대 페이로드 바이트
pub const SNIFF_WINDOW: usize = 16;
/// TLS 레코드: Handshake
pub const TLS_CONTENT_HANDSHAKE: u8 = 0x16;
/// TLS 레코드: Application Data
pub const TLS_CONTENT_APPLICATION_DATA: u8 = 0x17;
/// TLS 레코드 메이저 버전
pub const TLS_VERSION_MAJOR: u8 = 0x03;
/// TLS 1.0 마이너 버전
pub const TLS_VERSION_MINOR_MIN: u8 = 0x01;
/// TLS 1.3 마이너 버전
pub const TLS_VERSION_MINOR_MAX: u8 = 0x04;
/// HTTP/2 커넥션 프리페이스 접두사
pub const H2_PREFACE_PREFIX: &[u8; 4] = b"PRI ";
/// HTTP/2 프레임 헤더 길이
pub const H2_FRAME_HEADER_LEN: usize = 9;
/// HTTP/2 SETTINGS 프레임 타입
pub const H2_FRAME_SETTINGS: u8 = 0x04;

// =============================================================================
// 인증 fast path
// =============================================================================

/// 인증 없음
pub const AUTH_NONE: u8 = 0;
/// 페이로드 토큰 검사 (fast path)
pub const AUTH_SIMPLE: u8 = 1;
/// 느린 경로에서 처리
pub const AUTH_COMPLEX: u8 = 2;

/// `Authorization:` 헤더의 접두사
pub const AUTH_PATTERN: &[u8; 4] = b"Auth";
/// 패턴을 찾는 최대 시작 오프셋 (미포함)
pub const AUTH_SCAN_WINDOW: usize = 24;
/// 패턴 위치로부터 토큰 해시까지의 오프셋
pub const AUTH_TOKEN_OFFSET: usize = 20;
/// 토큰 해시 길이
pub const AUTH_TOKEN_LEN: usize = 4;
/// 인증 검사를 수행하는 최소 페이로드 길이
pub const AUTH_MIN_PAYLOAD: usize = 32;

// =============================================================================
// 판정 / 사유 코드
// =============================================================================

/// 통과
pub const VERDICT_PASS: u8 = 0;
/// 드롭
pub const VERDICT_DROP: u8 = 1;
/// 커널 바이패스 목적지로 리다이렉트
pub const VERDICT_REDIRECT_FAST: u8 = 2;
/// 느린 경로로 리다이렉트
pub const VERDICT_REDIRECT_SLOW: u8 = 3;

/// 모든 검사를 통과하여 전달
pub const REASON_FORWARDED: u8 = 0;
/// 연결된 fast-path 목적지로 전달
pub const REASON_FAST_PATH: u8 = 1;
/// 헤더 잘림/손상
pub const REASON_MALFORMED: u8 = 2;
/// IPv4가 아니거나 처리하지 않는 L4 프로토콜
pub const REASON_UNCLASSIFIED: u8 = 3;
/// 매칭되는 서비스 없음
pub const REASON_NO_SERVICE: u8 = 4;
/// drop 룰 매칭
pub const REASON_RULE_DROP: u8 = 5;
/// 레이트 리밋 초과
pub const REASON_RATE_LIMITED: u8 = 6;
/// fast-path 인증 실패
pub const REASON_AUTH_FAILED: u8 = 7;
/// 복합 인증은 느린 경로에서 처리
pub const REASON_COMPLEX_AUTH: u8 = 8;
/// TLS/WebSocket/HTTP2 등 심층 검사 필요
pub const REASON_NEEDS_DEEP_INSPECTION: u8 = 9;
/// redirect 룰 매칭
pub const REASON_RULE_REDIRECT: u8 = 10;
/// 사유 코드 개수
pub const REASON_COUNT: usize = 11;

// =============================================================================
// 연결 상태
// =============================================================================

/// 처음 관측된 플로우
pub const CONN_NEW: u8 = 0;
/// 두 번 이상 관측된 플로우
pub const CONN_ESTABLISHED: u8 = 1;
/// FIN/RST가 관측된 플로우
pub const CONN_CLOSING: u8 = 2;

// =============================================================================
// 공유 데이터 구조
// =============================================================================

/// 5-tuple 플로우 키
///
/// 주소는 호스트 바이트 오더 `u32`, 포트는 호스트 바이트 오더 `u16`입니다.
/// ICMP는 포트 대신 `type << 8 | code`를 `dst_port`에 담습니다.
///
/// # 메모리 레이아웃 (16 바이트, 4바이트 정렬)
/// ```text
/// offset  field       size
/// 0       src_ip      4
/// 4       dst_ip      4
/// 8       src_port    2
/// 10      dst_port    2
/// 12      protocol    1
/// 13      _pad        3
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    /// 출발지 IPv4 주소
    pub src_ip: u32,
    /// 목적지 IPv4 주소
    pub dst_ip: u32,
    /// 출발지 포트
    pub src_port: u16,
    /// 목적지 포트
    pub dst_port: u16,
    /// IP 프로토콜 번호
    pub protocol: u8,
    /// 4바이트 정렬을 위한 패딩
    pub _pad: [u8; 3],
}

impl FlowKey {
    /// 5-tuple로 키를 생성합니다.
    pub const fn new(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16, protocol: u8) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            _pad: [0; 3],
        }
    }

    /// 제로 초기화된 키를 생성합니다.
    pub const fn zeroed() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }

    /// 출발지와 목적지를 뒤바꾼 키 (응답 방향)를 반환합니다.
    pub const fn reversed(&self) -> Self {
        Self::new(
            self.dst_ip,
            self.src_ip,
            self.dst_port,
            self.src_port,
            self.protocol,
        )
    }

    /// 양방향이 같은 키가 되도록 정규화합니다.
    ///
    /// (ip, port)가 작은 쪽을 출발지로 둡니다. 반환값의 `bool`은 원래 키가
    /// 이미 정규 방향이었는지 여부입니다.
    pub const fn canonical(&self) -> (Self, bool) {
        let forward = self.src_ip < self.dst_ip
            || (self.src_ip == self.dst_ip && self.src_port <= self.dst_port);
        if forward {
            (*self, true)
        } else {
            (self.reversed(), false)
        }
    }
}
