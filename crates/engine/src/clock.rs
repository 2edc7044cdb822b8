//! 단조 시계
//!
//! 레이트 리미터, 연결 추적, 토큰 만료는 모두 같은 [`Clock`]의 나노초 값을 사용합니다.
//! 토큰 만료 시각도 이 시계 기준이므로 컨트롤 플레인은 [`Clock::now_ns`]에 TTL을
//! 더해 만료 시각을 계산합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 나노초 단위 단조 시계
pub trait Clock: Send + Sync {
    /// 시계 원점 이후 경과 나노초
    fn now_ns(&self) -> u64;
}

/// 프로세스 내 `Instant` 기반 시계
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// 현재 시각을 원점으로 하는 시계를 생성합니다.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        // u64 나노초는 약 584년
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// 수동으로 진행시키는 시계
///
/// 테스트와 오프라인 분류(CLI)에서 시간 흐름을 결정적으로 제어합니다.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// 주어진 나노초에서 시작하는 시계를 생성합니다.
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// 시계를 앞으로 진행시킵니다.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now.fetch_add(nanos, Ordering::Relaxed);
    }

    /// 시계를 특정 시각으로 설정합니다.
    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ns(), 100);
        clock.advance(Duration::from_micros(1));
        assert_eq!(clock.now_ns(), 1_100);
        clock.set(5);
        assert_eq!(clock.now_ns(), 5);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
