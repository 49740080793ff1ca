//! The polling loop: the single writer of the read model.
//!
//! Each tick runs `fetch → normalize → reconcile → publish`. Ticks are
//! strictly sequential, so history and the streak watermark only ever move
//! forward one publish at a time. Failures never stop the loop; they only
//! change which snapshot gets published and the reported status.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::PollingConfig;
use crate::fallback::FallbackCache;
use crate::history::HistoryAggregator;
use crate::live_ai::LiveAiSwitch;
use crate::normalize::SnapshotNormalizer;
use crate::tips::TipStore;
use crate::transport::TelemetryTransport;
use crate::types::{ReadModel, Snapshot, Status, TipEntry};

pub struct PollingLoop<T: TelemetryTransport> {
    transport: T,
    normalizer: SnapshotNormalizer,
    aggregator: HistoryAggregator,
    cache: FallbackCache,
    tips: Arc<TipStore>,
    live_ai: LiveAiSwitch,
    interval: Duration,
    startup_delay: Duration,
    generation: u64,
    status: Status,
    publisher: watch::Sender<Arc<ReadModel>>,
}

impl<T: TelemetryTransport> PollingLoop<T> {
    /// Build a loop and the receiver its read models are published to.
    ///
    /// The receiver starts out holding [`ReadModel::initial`].
    pub fn new(
        transport: T,
        config: &PollingConfig,
        tips: Arc<TipStore>,
        live_ai: LiveAiSwitch,
    ) -> (Self, watch::Receiver<Arc<ReadModel>>) {
        let (publisher, receiver) = watch::channel(Arc::new(ReadModel::initial()));
        let poller = Self {
            transport,
            normalizer: SnapshotNormalizer::new(config),
            aggregator: HistoryAggregator::new(),
            cache: FallbackCache::new(),
            tips,
            live_ai,
            interval: config.interval(),
            startup_delay: config.startup_delay(),
            generation: 0,
            status: Status::Waiting,
            publisher,
        };
        (poller, receiver)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one full tick and return the model it published.
    pub async fn tick(&mut self) -> Arc<ReadModel> {
        let fresh = match self.transport.fetch().await {
            Ok(payload) => match self.normalizer.normalize(payload.as_bytes()) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(error = %e, bytes = payload.as_bytes().len(), "Discarding telemetry payload");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(transport = %self.transport.describe(), error = %e, "Telemetry fetch failed");
                None
            }
        };

        let (base, status) = self.reconcile(fresh);
        let tips = if base.is_identified() {
            Self::lookup_tips(Arc::clone(&self.tips), base.song.clone()).await
        } else {
            None
        };

        self.publish(base.with_tips(tips.as_ref()), status)
    }

    /// Fold a fresh snapshot (if any) into the aggregates and pick what to
    /// show.
    fn reconcile(&mut self, fresh: Option<Snapshot>) -> (Snapshot, Status) {
        match fresh {
            Some(snapshot) if snapshot.is_identified() => {
                self.aggregator.observe(&snapshot);
                self.cache.update(snapshot.clone());
                tracing::debug!(
                    song = %snapshot.song,
                    accuracy = snapshot.accuracy,
                    streak = snapshot.current_streak,
                    "Telemetry tick"
                );
                (snapshot, Status::Connected)
            }
            other => {
                if other.is_some() {
                    tracing::debug!("No song identified in telemetry");
                }
                let status = if self.cache.has_identified() {
                    Status::Degraded
                } else {
                    Status::Waiting
                };
                (self.cache.get(), status)
            }
        }
    }

    /// Must not borrow `self`: the tick future stays `Send` only while no
    /// `&PollingLoop<T>` is held across this await.
    async fn lookup_tips(store: Arc<TipStore>, song: String) -> Option<TipEntry> {
        match tokio::task::spawn_blocking(move || store.lookup(&song)).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Tip lookup task failed");
                None
            }
        }
    }

    fn publish(&mut self, snapshot: Snapshot, status: Status) -> Arc<ReadModel> {
        self.generation += 1;
        let model = Arc::new(ReadModel {
            snapshot,
            history: self.aggregator.history().clone(),
            live_ai_enabled: self.live_ai.is_enabled(),
            status,
            session_best_streak: self.aggregator.highest_streak_ever(),
            generation: self.generation,
            updated_at: Utc::now(),
        });
        self.publisher.send_replace(Arc::clone(&model));

        if status != self.status {
            tracing::info!(from = %self.status, to = %status, "Telemetry status changed");
            self.status = status;
        }
        model
    }

    /// Tick at the configured cadence until `cancel` fires, then release the
    /// transport. A fetch still in flight at cancellation is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            transport = %self.transport.describe(),
            interval_ms = self.interval.as_millis() as u64,
            "Polling loop started"
        );

        if !self.startup_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.startup_delay) => {}
                _ = cancel.cancelled() => {
                    self.transport.close();
                    tracing::info!("Polling loop stopped before first tick");
                    return;
                }
            }
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::debug!("Abandoning in-flight telemetry fetch");
                            break;
                        }
                        _ = self.tick() => {}
                    }
                }
            }
        }

        self.transport.close();
        tracing::info!(generation = self.generation, "Polling loop stopped");
    }
}
