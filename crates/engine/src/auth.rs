//! 인증 fast path 검사
//!
//! `auth_type = simple` 서비스에 대해 페이로드 앞부분에서 `Auth` 리터럴을 찾고,
//! 매치 위치에서 20바이트 뒤의 4바이트(little-endian)를 토큰 해시로 읽어
//! 토큰 테이블과 대조합니다.
//!
//! TCP가 아니거나 페이로드가 32바이트 미만인 패킷은 검사하지 않고 통과시킵니다
//! (핸드셰이크, ACK 등).

use pktgate_common::{
    AUTH_MIN_PAYLOAD, AUTH_PATTERN, AUTH_SCAN_WINDOW, AUTH_TOKEN_LEN, AUTH_TOKEN_OFFSET, PROTO_TCP,
};

use crate::tables::Tables;

/// 거부 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReject {
    /// `Auth` 패턴이 없거나 토큰 위치가 버퍼 밖
    MissingToken,
    /// 토큰 해시가 0
    ZeroToken,
    UnknownToken,
    Expired,
    ServiceMismatch,
}

/// 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accepted { token_hash: u32 },
    /// 검사 대상 아님
    Skipped,
    Rejected(AuthReject),
}

impl AuthOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// 페이로드에서 토큰 해시를 추출합니다.
///
/// `Auth`는 처음 24바이트 안에서 시작해야 합니다.
pub fn extract_token(payload: &[u8]) -> Option<u32> {
    let at = (0..AUTH_SCAN_WINDOW).find(|&i| {
        payload
            .get(i..i + AUTH_PATTERN.len())
            .is_some_and(|w| w == AUTH_PATTERN)
    })?;
    let start = at + AUTH_TOKEN_OFFSET;
    let bytes = payload.get(start..start + AUTH_TOKEN_LEN)?;
    let bytes: [u8; AUTH_TOKEN_LEN] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// 토큰을 검사합니다.
pub fn check(
    tables: &Tables,
    protocol: u8,
    payload: &[u8],
    service_id: u32,
    now_ns: u64,
) -> AuthOutcome {
    if protocol != PROTO_TCP || payload.len() < AUTH_MIN_PAYLOAD {
        return AuthOutcome::Skipped;
    }

    let Some(token_hash) = extract_token(payload) else {
        return AuthOutcome::Rejected(AuthReject::MissingToken);
    };
    if token_hash == 0 {
        return AuthOutcome::Rejected(AuthReject::ZeroToken);
    }
    let Some(token) = tables.token(token_hash) else {
        return AuthOutcome::Rejected(AuthReject::UnknownToken);
    };
    if now_ns > token.expiry_ns {
        return AuthOutcome::Rejected(AuthReject::Expired);
    }
    if token.service_id != 0 && token.service_id != service_id {
        return AuthOutcome::Rejected(AuthReject::ServiceMismatch);
    }
    AuthOutcome::Accepted { token_hash }
}
