//! 패킷 게이트: 판정 엔진 라이프사이클 관리
//!
//! [`PacketGate`]는 [`DecisionEngine`]을 감싸 [`Pipeline`] trait을 구현합니다.
//! 빌더 패턴([`PacketGateBuilder`])으로 생성합니다.
//!
//! # 아키텍처
//! ```text
//!  mpsc<Bytes> ──▶ worker ─┐                        ┌──▶ stats reporter (metrics)
//!  mpsc<Bytes> ──▶ worker ─┼──▶ DecisionEngine ─────┤
//!  mpsc<Bytes> ──▶ worker ─┘    (Arc, &self)        └──▶ sweeper (conntrack / rate limiter)
//!                    │
//!                    ▼
//!         mpsc<(Bytes, Decision)> ──▶ dispatcher
//! ```
//!
//! # 사용 예시
//! ```ignore
//! let mut gate = PacketGate::builder()
//!     .config(GateConfig::from_core(&core_config)?)
//!     .build()?;
//!
//! gate.start().await?;
//! let decision = gate.classify(&frame);
//! gate.stop().await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pktgate_core::error::{PipelineError, PktgateError};
use pktgate_core::pipeline::{HealthStatus, Pipeline};

use crate::clock::{Clock, MonotonicClock};
use crate::config::{GateConfig, TableFile};
use crate::decision::{Decision, DecisionEngine};
use crate::error::EngineError;
use crate::stats::StatsReporter;
use crate::tables::TableStore;

/// 판정 엔진 파이프라인
pub struct PacketGate {
    config: GateConfig,
    engine: Arc<DecisionEngine>,
    running: bool,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// 패킷 게이트 빌더
pub struct PacketGateBuilder {
    config: Option<GateConfig>,
    clock: Option<Arc<dyn Clock>>,
    tables: Option<Arc<TableStore>>,
}

impl PacketGateBuilder {
    fn new() -> Self {
        Self {
            config: None,
            clock: None,
            tables: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 시계를 지정합니다 (기본: [`MonotonicClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 외부와 공유할 테이블 저장소를 지정합니다.
    ///
    /// 지정하지 않으면 설정의 한도로 빈 저장소를 생성합니다.
    pub fn tables(mut self, tables: Arc<TableStore>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// 패킷 게이트를 생성합니다.
    ///
    /// # 에러
    /// - `PipelineError::InitFailed`: 설정이 누락된 경우
    pub fn build(self) -> Result<PacketGate, PktgateError> {
        let config = self
            .config
            .ok_or_else(|| PipelineError::InitFailed("config is required".to_owned()))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let tables = self
            .tables
            .unwrap_or_else(|| Arc::new(TableStore::new(config.limits, config.rule_order)));

        let engine = Arc::new(DecisionEngine::with_tables(&config, tables, clock));
        Ok(PacketGate {
            config,
            engine,
            running: false,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl PacketGate {
    /// 빌더를 반환합니다.
    pub fn builder() -> PacketGateBuilder {
        PacketGateBuilder::new()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// 공유 판정 엔진
    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    pub fn tables(&self) -> &Arc<TableStore> {
        self.engine.tables()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 프레임 하나를 판정합니다.
    pub fn classify(&self, frame: &[u8]) -> Decision {
        self.engine.classify(frame)
    }

    /// 테이블 파일을 읽어 전체 테이블을 교체합니다.
    ///
    /// 파일 읽기나 검증이 실패하면 기존 테이블을 유지합니다. 새 세대를 반환합니다.
    pub async fn load_tables_file(&self, path: impl AsRef<Path>) -> Result<u64, EngineError> {
        let path = path.as_ref();
        let file = TableFile::load(path).await?;
        let (services, rules, tokens) = (file.services.len(), file.rules.len(), file.tokens.len());
        let now_ns = self.engine.clock().now_ns();
        let generation = self.tables().replace_all(file.into_table_set(now_ns))?;
        info!(
            path = %path.display(),
            services,
            rules,
            tokens,
            generation,
            "tables loaded"
        );
        Ok(generation)
    }

    /// 설정된 테이블 파일을 다시 읽습니다. 경로가 없으면 `None`입니다.
    pub async fn reload_tables(&self) -> Result<Option<u64>, EngineError> {
        match self.config.tables_path.clone() {
            Some(path) => self.load_tables_file(path).await.map(Some),
            None => Ok(None),
        }
    }

    /// 프레임 채널을 소비하는 워커를 스폰합니다.
    ///
    /// 입력 채널이 닫히거나, 출력 채널의 수신자가 사라지거나, 게이트가 정지하면
    /// 종료합니다.
    pub fn spawn_worker(
        &self,
        mut frames: mpsc::Receiver<Bytes>,
        decisions: mpsc::Sender<(Bytes, Decision)>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = frames.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                };
                let decision = engine.classify(&frame);
                if decisions.send((frame, decision)).await.is_err() {
                    debug!("decision receiver dropped, worker exiting");
                    break;
                }
            }
        })
    }

    fn spawn_stats_reporter(&mut self) {
        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        let period = self.config.stats_interval;

        self.tasks.push(tokio::spawn(async move {
            let mut reporter = StatsReporter::new();
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let rates = reporter.update(engine.stats().snapshot());
                        publish_component_metrics(&engine);
                        debug!(pps = rates.pps, bps = rates.bps, "stats published");
                    }
                    _ = cancel.cancelled() => {
                        reporter.update(engine.stats().snapshot());
                        publish_component_metrics(&engine);
                        break;
                    }
                }
            }
        }));
    }

    fn spawn_sweeper(&mut self) {
        let engine = Arc::clone(&self.engine);
        let cancel = self.cancel.clone();
        let period = self.config.sweep_interval;

        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // 첫 tick은 즉시 발생
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => { sweep(&engine); }
                    _ = cancel.cancelled() => break,
                }
            }
        }));
    }
}

/// 유휴 연결과 유휴 출발지 버킷을 정리합니다.
pub fn sweep(engine: &DecisionEngine) -> (usize, usize) {
    let now_ns = engine.clock().now_ns();
    let expired = engine.conntrack().expire_idle(now_ns);
    let purged = engine.limiter().purge_idle(now_ns);
    if expired > 0 || purged > 0 {
        debug!(expired, purged, "sweep completed");
    }
    (expired, purged)
}

fn publish_component_metrics(engine: &DecisionEngine) {
    engine.limiter().publish_metrics();
    engine.conntrack().publish_metrics();
    engine.tables().publish_metrics();
}

impl Pipeline for PacketGate {
    /// 엔진을 시작합니다.
    ///
    /// 1. 테이블 파일 로드 (설정된 경우)
    /// 2. 통계 발행 태스크 스폰
    /// 3. 정리 태스크 스폰
    async fn start(&mut self) -> Result<(), PktgateError> {
        if self.running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        if let Some(generation) = self.reload_tables().await? {
            debug!(generation, "initial tables published");
        }

        info!(
            default_action = self.config.policy.default_action.as_str(),
            conntrack_capacity = self.config.conntrack.capacity,
            stats_shards = self.engine.stats().shard_count(),
            "starting packet gate"
        );

        self.cancel = CancellationToken::new();
        self.spawn_stats_reporter();
        self.spawn_sweeper();
        self.running = true;
        Ok(())
    }

    /// 백그라운드 태스크를 취소하고 종료를 기다립니다.
    async fn stop(&mut self) -> Result<(), PktgateError> {
        if !self.running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping packet gate");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = tokio::time::timeout(Duration::from_secs(5), task).await {
                warn!(error = %e, "background task did not stop in time");
            }
        }
        self.running = false;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if !self.running {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        if self.tables().current().service_count() == 0 {
            return HealthStatus::Degraded("no services configured".to_owned());
        }
        if self.engine.conntrack().is_full() {
            return HealthStatus::Degraded("flow table full".to_owned());
        }
        HealthStatus::Healthy
    }
}
