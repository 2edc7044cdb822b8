#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`parser`]: 헤더 파서와 테스트용 프레임 생성기
//! - [`matcher`]: 서비스 인덱스, 룰 정렬과 매칭
//! - [`tables`]: 설정 테이블과 copy-on-write 저장소
//! - [`ratelimit`]: 토큰 버킷 레이트 리미터
//! - [`conntrack`]: LRU 연결 추적기
//! - [`shards`]: 전역 용량을 공유하는 샤드 LRU 테이블
//! - [`sniffer`]: L7 프로토콜 스니퍼
//! - [`auth`]: 토큰 인증 fast path
//! - [`decision`]: 판정 엔진
//! - [`stats`]: 샤드 통계
//! - [`engine`]: PacketGate, Pipeline trait 구현
//! - [`config`]: core 설정 변환, 테이블 파일
//!
//! # 공유 타입
//! 와이어 상수와 플로우 키는 [`pktgate_common`] 크레이트에 정의되어 있습니다.

pub mod auth;
pub mod clock;
pub mod config;
pub mod conntrack;
pub mod decision;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod parser;
pub mod ratelimit;
pub mod shards;
pub mod sniffer;
pub mod stats;
pub mod tables;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{PacketGate, PacketGateBuilder};
pub use decision::{Decision, DecisionEngine, DecisionPolicy, Reason, Verdict};

// 설정
pub use config::{GateConfig, TableFile, TokenEntry};
pub use error::EngineError;

// 테이블
pub use tables::{AuthToken, AuthType, PortRange, Rule, RuleAction, Service, TableStore};

// 구성 요소
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use conntrack::{ConnState, ConnTracker, Connection};
pub use ratelimit::{RateDecision, RateLimiter};
pub use sniffer::SniffedProtocol;
pub use stats::{Stats, StatsSnapshot};

// 공유 타입
pub use pktgate_common;
