//! UDP mirror ingress.
//!
//! Receives mirrored traffic where each UDP datagram carries exactly one
//! Ethernet frame, spreads frames round-robin over the engine workers, and
//! drains the resulting decisions into a verdict sink.
//!
//! ```text
//! UdpSocket ──recv──▶ round-robin ──try_send──▶ worker[0..n] ──▶ sink
//!                        │ (queue full)                        (counts, trace log)
//!                        ▼
//!                     dropped
//! ```
//!
//! The receive loop never waits on a full worker queue; overflow is counted
//! and the frame is discarded.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use bytes::Bytes;
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pktgate_core::config::IngressConfig;
use pktgate_core::metrics as m;
use pktgate_engine::{Decision, PacketGate, Verdict};

/// Ingress counters shared between the receive loop and the sink.
#[derive(Debug, Default)]
pub struct IngressStats {
    received: AtomicU64,
    oversized: AtomicU64,
    queue_full: AtomicU64,
    verdicts: [AtomicU64; 4],
}

/// Point-in-time copy of [`IngressStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngressSnapshot {
    pub received: u64,
    pub oversized: u64,
    pub queue_full: u64,
    pub passed: u64,
    pub dropped: u64,
    pub redirected_fast: u64,
    pub redirected_slow: u64,
}

impl IngressSnapshot {
    /// Frames that reached a verdict.
    pub fn decided(&self) -> u64 {
        self.passed + self.dropped + self.redirected_fast + self.redirected_slow
    }
}

impl IngressStats {
    pub fn snapshot(&self) -> IngressSnapshot {
        let verdict = |v: Verdict| self.verdicts[v.code() as usize].load(Ordering::Relaxed);
        IngressSnapshot {
            received: self.received.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            passed: verdict(Verdict::Pass),
            dropped: verdict(Verdict::Drop),
            redirected_fast: verdict(Verdict::RedirectFast),
            redirected_slow: verdict(Verdict::RedirectSlow),
        }
    }

    /// Publish ingress counters to the metrics facade.
    pub fn publish_metrics(&self) {
        let s = self.snapshot();
        metrics::counter!(m::INGRESS_FRAMES_TOTAL).absolute(s.received);
        metrics::counter!(m::INGRESS_FRAMES_DROPPED_TOTAL, "cause" => "oversized")
            .absolute(s.oversized);
        metrics::counter!(m::INGRESS_FRAMES_DROPPED_TOTAL, "cause" => "queue_full")
            .absolute(s.queue_full);
    }
}

/// Bound but not yet running ingress socket.
pub struct MirrorIngress {
    socket: UdpSocket,
    workers: usize,
    queue_depth: usize,
    max_frame_size: usize,
}

impl MirrorIngress {
    /// Bind the UDP socket described by `[ingress]`.
    pub async fn bind(config: &IngressConfig) -> Result<Self> {
        let addr: SocketAddr = config
            .bind
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid ingress bind address '{}': {}", config.bind, e))?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind ingress socket {}: {}", addr, e))?;
        Ok(Self {
            socket,
            workers: config.workers.max(1),
            queue_depth: config.queue_depth.max(1),
            max_frame_size: config.max_frame_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawn the receive loop, one engine worker per configured worker, and
    /// the verdict sink.
    ///
    /// The gate must already be started; workers stop with it.
    pub fn spawn(self, gate: &PacketGate, cancel: CancellationToken) -> Result<IngressHandle> {
        let local_addr = self.local_addr()?;
        let stats = Arc::new(IngressStats::default());
        let (decision_tx, decision_rx) = mpsc::channel(self.queue_depth);

        let mut queues = Vec::with_capacity(self.workers);
        let mut tasks = Vec::with_capacity(self.workers + 2);
        for _ in 0..self.workers {
            let (frame_tx, frame_rx) = mpsc::channel(self.queue_depth);
            queues.push(frame_tx);
            tasks.push(gate.spawn_worker(frame_rx, decision_tx.clone()));
        }
        drop(decision_tx);

        tasks.push(tokio::spawn(run_sink(decision_rx, Arc::clone(&stats))));
        let receiver = tokio::spawn(receive_loop(
            self.socket,
            queues,
            self.max_frame_size,
            Arc::clone(&stats),
            cancel,
        ));

        tracing::info!(
            %local_addr,
            workers = self.workers,
            queue_depth = self.queue_depth,
            "mirror ingress started"
        );
        Ok(IngressHandle {
            local_addr,
            stats,
            receiver,
            tasks,
        })
    }
}

/// Running ingress.
pub struct IngressHandle {
    local_addr: SocketAddr,
    stats: Arc<IngressStats>,
    receiver: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl IngressHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &Arc<IngressStats> {
        &self.stats
    }

    /// Whether the receive loop is still running.
    pub fn is_receiving(&self) -> bool {
        !self.receiver.is_finished()
    }

    /// Wait for every ingress task to finish.
    ///
    /// The cancellation token passed to [`MirrorIngress::spawn`] must already
    /// be cancelled. Closing the frame queues drains the workers and then
    /// the sink.
    pub async fn join(self) {
        let _ = self.receiver.await;
        for task in self.tasks {
            let _ = task.await;
        }
        self.stats.publish_metrics();
        tracing::info!(local_addr = %self.local_addr, "mirror ingress stopped");
    }
}

async fn receive_loop(
    socket: UdpSocket,
    queues: Vec<mpsc::Sender<Bytes>>,
    max_frame_size: usize,
    stats: Arc<IngressStats>,
    cancel: CancellationToken,
) {
    // one extra byte detects truncation by the kernel
    let mut buf = vec![0u8; max_frame_size + 1];
    let mut next = 0usize;

    loop {
        let (len, peer) = tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!(error = %e, "ingress receive failed");
                    continue;
                }
            },
            _ = cancel.cancelled() => break,
        };

        stats.received.fetch_add(1, Ordering::Relaxed);
        if len > max_frame_size {
            stats.oversized.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%peer, len, "oversized frame discarded");
            continue;
        }

        let frame = Bytes::copy_from_slice(&buf[..len]);
        let queue = &queues[next % queues.len()];
        next = next.wrapping_add(1);
        match queue.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                stats.queue_full.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("worker queue closed, ingress exiting");
                break;
            }
        }
    }
}

async fn run_sink(mut decisions: mpsc::Receiver<(Bytes, Decision)>, stats: Arc<IngressStats>) {
    while let Some((frame, decision)) = decisions.recv().await {
        stats.verdicts[decision.verdict.code() as usize].fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            len = frame.len(),
            verdict = decision.verdict.as_str(),
            reason = decision.reason.as_str(),
            service_id = decision.service_id,
            "verdict"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_totals() {
        let stats = IngressStats::default();
        stats.verdicts[Verdict::Pass.code() as usize].fetch_add(2, Ordering::Relaxed);
        stats.verdicts[Verdict::RedirectSlow.code() as usize].fetch_add(1, Ordering::Relaxed);
        let s = stats.snapshot();
        assert_eq!(s.passed, 2);
        assert_eq!(s.redirected_slow, 1);
        assert_eq!(s.decided(), 3);
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let config = IngressConfig {
            bind: "not-an-address".to_owned(),
            ..IngressConfig::default()
        };
        assert!(MirrorIngress::bind(&config).await.is_err());
    }
}
