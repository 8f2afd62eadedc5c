use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ais_core::{Publisher, VesselRecord, VesselStore};
use async_trait::async_trait;
use chrono::Utc;
use strum::AsRefStr;
use tokio::time::{Instant, Interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    feed::{FeedConnector, FeedEvent},
    models::{Vessel, VesselMessage},
    pipeline::Pipeline,
    stats::RelayStats,
};

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_POLICY: u16 = 1008;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    ConsumerDisconnected,
    ConsumerUnreachable,
    UpstreamUnavailable,
    UpstreamClosed { code: Option<u16>, reason: String },
    UpstreamError(String),
    /// The consumer could not keep up with the shared feed.
    Lagged,
    Shutdown,
}

/// The consumer side of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerGone;

#[async_trait]
pub trait Downstream: Send {
    async fn send(&mut self, text: String) -> Result<(), ConsumerGone>;
    /// Resolves once the consumer has disconnected. Anything the consumer sends is ignored.
    async fn closed(&mut self);
    /// Fails when the consumer never answered the previous ping.
    async fn ping(&mut self) -> Result<(), ConsumerGone>;
    async fn close(&mut self, code: u16, reason: &str);
}

/// One downstream consumer. Opening a session counts it as active until it is dropped.
#[derive(Debug)]
pub struct Session {
    id: u64,
    state: SessionState,
    stats: Arc<RelayStats>,
    shutdown: CancellationToken,
    ping_interval: Option<Duration>,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Connecting, Active) | (Connecting, Closing) | (Active, Closing) | (Closing, Closed)
        )
    }
}

impl CloseCause {
    /// The close frame to send the consumer, `None` when the consumer is already gone.
    fn close_frame(&self) -> Option<(u16, &str)> {
        match self {
            CloseCause::ConsumerDisconnected | CloseCause::ConsumerUnreachable => None,
            CloseCause::UpstreamUnavailable => Some((CLOSE_NORMAL, "upstream unavailable")),
            CloseCause::UpstreamClosed { .. } | CloseCause::UpstreamError(_) => {
                Some((CLOSE_NORMAL, "upstream closed"))
            }
            CloseCause::Lagged => Some((CLOSE_POLICY, "consumer too slow")),
            CloseCause::Shutdown => Some((CLOSE_GOING_AWAY, "server shutting down")),
        }
    }
}

impl Session {
    pub fn new(stats: Arc<RelayStats>, shutdown: CancellationToken) -> Session {
        stats.session_opened();
        Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: SessionState::Connecting,
            stats,
            shutdown,
            ping_interval: None,
        }
    }

    /// Pings the consumer every `interval` while the session is active.
    pub fn with_keepalive(mut self, interval: Duration) -> Session {
        self.ping_interval = Some(interval);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serves the consumer from its own upstream connection, forwarding the exact upstream text
    /// of every message the pipeline accepts. The upstream connection never outlives the call.
    #[instrument(skip_all, fields(session = self.id))]
    pub async fn run_dedicated<D: Downstream>(
        &mut self,
        connector: &dyn FeedConnector,
        pipeline: &Pipeline,
        downstream: &mut D,
    ) -> CloseCause {
        let feed = tokio::select! {
            _ = self.shutdown.cancelled() => return self.finish(CloseCause::Shutdown, downstream).await,
            _ = downstream.closed() => return self.finish(CloseCause::ConsumerDisconnected, downstream).await,
            feed = connector.connect() => feed,
        };

        let feed = match feed {
            Ok(feed) => feed,
            Err(e) => {
                warn!("failed to open upstream connection: {e}");
                return self
                    .finish(CloseCause::UpstreamUnavailable, downstream)
                    .await;
            }
        };

        self.transition(SessionState::Active);
        let mut keepalive = self.keepalive_timer();

        let cause = loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break CloseCause::Shutdown,
                _ = downstream.closed() => break CloseCause::ConsumerDisconnected,
                _ = tick(&mut keepalive) => {
                    if downstream.ping().await.is_err() {
                        break CloseCause::ConsumerUnreachable;
                    }
                    continue;
                }
                event = feed.next() => event,
            };

            match event {
                Some(FeedEvent::Message(raw)) => {
                    if pipeline.ingest(&raw, Utc::now()).is_err() {
                        continue;
                    }
                    if downstream.send(raw.text).await.is_err() {
                        break CloseCause::ConsumerUnreachable;
                    }
                    self.stats.record_forwarded();
                }
                Some(FeedEvent::Error(e)) => break CloseCause::UpstreamError(e),
                Some(FeedEvent::Closed(c)) => {
                    break CloseCause::UpstreamClosed {
                        code: c.code,
                        reason: c.reason,
                    };
                }
                None => {
                    break CloseCause::UpstreamClosed {
                        code: None,
                        reason: String::new(),
                    };
                }
            }
        };

        // Tear the upstream down before touching the consumer again.
        feed.close();
        self.finish(cause, downstream).await
    }

    /// Serves the consumer from the shared feed: a snapshot of the live vessels first, then every
    /// published record that has a position.
    #[instrument(skip_all, fields(session = self.id))]
    pub async fn run_shared<D: Downstream>(
        &mut self,
        store: &VesselStore,
        publisher: &Publisher<VesselRecord>,
        downstream: &mut D,
    ) -> CloseCause {
        let subscription = publisher.subscribe();
        self.transition(SessionState::Active);
        let mut keepalive = self.keepalive_timer();

        let snapshot = VesselMessage::Snapshot {
            vessels: store.list(Utc::now()).iter().map(Vessel::from).collect(),
        };

        let cause = match self.send(&snapshot, downstream).await {
            Err(ConsumerGone) => CloseCause::ConsumerUnreachable,
            Ok(()) => loop {
                let record = tokio::select! {
                    _ = self.shutdown.cancelled() => break CloseCause::Shutdown,
                    _ = downstream.closed() => break CloseCause::ConsumerDisconnected,
                    _ = tick(&mut keepalive) => {
                        if downstream.ping().await.is_err() {
                            break CloseCause::ConsumerUnreachable;
                        }
                        continue;
                    }
                    record = subscription.recv() => record,
                };

                let Some(record) = record else {
                    break CloseCause::Lagged;
                };
                if !record.has_position() {
                    continue;
                }

                let update = VesselMessage::Vessel {
                    vessel: Vessel::from(record.as_ref()),
                };
                if self.send(&update, downstream).await.is_err() {
                    break CloseCause::ConsumerUnreachable;
                }
            },
        };

        publisher.unsubscribe(subscription.handle());
        self.finish(cause, downstream).await
    }

    async fn send<D: Downstream>(
        &self,
        message: &VesselMessage,
        downstream: &mut D,
    ) -> Result<(), ConsumerGone> {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to serialize vessel message: {e}");
                return Ok(());
            }
        };

        downstream.send(text).await?;
        self.stats.record_forwarded();
        Ok(())
    }

    async fn finish<D: Downstream>(&mut self, cause: CloseCause, downstream: &mut D) -> CloseCause {
        self.transition(SessionState::Closing);

        if let Some((code, reason)) = cause.close_frame() {
            downstream.close(code, reason).await;
        }

        self.transition(SessionState::Closed);
        info!(?cause, "session closed");
        cause
    }

    fn keepalive_timer(&self) -> Option<Interval> {
        self.ping_interval
            .map(|period| interval_at(Instant::now() + period, period))
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!(from = self.state.as_ref(), to = next.as_ref(), "session transition");
            self.state = next;
        } else {
            warn!(
                from = self.state.as_ref(),
                to = next.as_ref(),
                "ignoring invalid session transition"
            );
        }
    }
}

/// Never resolves when keepalive is off.
async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stats.session_closed();
    }
}
