//! 프로토콜 스니퍼
//!
//! 전송 계층 헤더 바로 뒤 페이로드의 앞 16바이트만 보고 L7 프로토콜을 추정합니다.
//! 본문 파싱은 하지 않습니다. 각 검사는 바이트가 부족하면 "모름"을 반환하며,
//! "아님"과 구분됩니다.
//!
//! | 결과 | 근거 |
//! |---|---|
//! | gRPC | 포트 50051 또는 서비스 `grpc` 표시 (페이로드로는 구분 불가) |
//! | TLS | `0x16`/`0x17`, `0x03`, `0x01..=0x04` 레코드 헤더 |
//! | HTTP | `POST`, `PUT `, `DELE`, `HEAD`, `OPTI`, `PATC` |
//! | WebSocket 후보 | `GET ` (Upgrade 헤더는 slow path에서 확인) |
//! | HTTP/2 | `PRI ` preface 또는 9바이트 프레임 헤더의 type = SETTINGS |

use serde::Serialize;

use pktgate_common::{
    H2_FRAME_HEADER_LEN, H2_FRAME_SETTINGS, H2_PREFACE_PREFIX, PORT_GRPC, PORT_HTTP, PORT_HTTP_ALT, SNIFF_WINDOW,
    TLS_CONTENT_APPLICATION_DATA, TLS_CONTENT_HANDSHAKE, TLS_VERSION_MAJOR, TLS_VERSION_MINOR_MAX,
    TLS_VERSION_MINOR_MIN,
};

/// 스니핑 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SniffedProtocol {
    Http,
    Tls,
    Http2,
    Grpc,
    /// GET 요청. Upgrade 여부는 확인하지 않음
    WebSocketCandidate,
    Unknown,
}

impl SniffedProtocol {
    /// slow path의 상태 기반 처리가 필요한지
    pub fn needs_deep_inspection(self) -> bool {
        matches!(
            self,
            Self::Tls | Self::Http2 | Self::Grpc | Self::WebSocketCandidate
        )
    }

    /// 메트릭 레이블
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Tls => "tls",
            Self::Http2 => "http2",
            Self::Grpc => "grpc",
            Self::WebSocketCandidate => "websocket",
            Self::Unknown => "unknown",
        }
    }
}

/// 삼중 상태 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Detection {
    Yes,
    No,
    /// 판단할 바이트가 부족함
    Unknown,
}

impl Detection {
    fn from_bool(hit: bool) -> Self {
        if hit { Self::Yes } else { Self::No }
    }
}

/// HTTP 메서드 접두어
const HTTP_METHODS: [&[u8; 4]; 7] = [b"GET ", b"POST", b"PUT ", b"DELE", b"HEAD", b"OPTI", b"PATC"];

/// TLS 레코드 헤더 검사
pub fn check_tls(payload: &[u8]) -> Detection {
    let Some(&[content, major, minor]) = payload.first_chunk::<3>() else {
        return Detection::Unknown;
    };
    Detection::from_bool(
        (content == TLS_CONTENT_HANDSHAKE || content == TLS_CONTENT_APPLICATION_DATA)
            && major == TLS_VERSION_MAJOR
            && (TLS_VERSION_MINOR_MIN..=TLS_VERSION_MINOR_MAX).contains(&minor),
    )
}

/// HTTP 메서드 검사. 매치되면 메서드 접두어를 함께 반환합니다.
pub fn check_http_method(payload: &[u8]) -> (Detection, Option<&'static [u8; 4]>) {
    let Some(head) = payload.first_chunk::<4>() else {
        return (Detection::Unknown, None);
    };
    match HTTP_METHODS.iter().find(|m| **m == head) {
        Some(m) => (Detection::Yes, Some(*m)),
        None => (Detection::No, None),
    }
}

/// HTTP/2 preface 또는 SETTINGS 프레임 헤더 검사
pub fn check_http2(payload: &[u8]) -> Detection {
    let Some(head) = payload.first_chunk::<4>() else {
        return Detection::Unknown;
    };
    if head == H2_PREFACE_PREFIX {
        return Detection::Yes;
    }
    if head[3] != H2_FRAME_SETTINGS {
        return Detection::No;
    }
    // type 바이트는 맞지만 프레임 헤더가 잘림
    if payload.len() < H2_FRAME_HEADER_LEN {
        return Detection::Unknown;
    }
    Detection::Yes
}

/// 평문 HTTP 포트 (80, 8080)
///
/// WebSocket 후보(`GET `)는 이 포트나 `inspect` 표시된 서비스에서만 slow path로 보냅니다.
pub fn is_http_port(port: u16) -> bool {
    matches!(port, PORT_HTTP | PORT_HTTP_ALT)
}

/// 페이로드 앞부분으로 프로토콜을 추정합니다.
///
/// `grpc_hint`는 서비스의 `grpc` 표시입니다.
pub fn sniff(payload: &[u8], dst_port: u16, grpc_hint: bool) -> SniffedProtocol {
    if grpc_hint || dst_port == PORT_GRPC {
        return SniffedProtocol::Grpc;
    }

    let window = &payload[..payload.len().min(SNIFF_WINDOW)];

    if check_tls(window) == Detection::Yes {
        return SniffedProtocol::Tls;
    }
    if let (Detection::Yes, Some(method)) = check_http_method(window) {
        return if method == b"GET " {
            SniffedProtocol::WebSocketCandidate
        } else {
            SniffedProtocol::Http
        };
    }
    if check_http2(window) == Detection::Yes {
        return SniffedProtocol::Http2;
    }
    SniffedProtocol::Unknown
}
