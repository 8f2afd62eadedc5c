use std::sync::Arc;

use ais_core::{Publisher, VesselRecord};
use chrono::Utc;
use strum::AsRefStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    backoff::Backoff,
    feed::{FeedConnector, FeedEvent, FeedHandle},
    pipeline::Pipeline,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum SupervisorState {
    Connecting,
    Active,
    Backoff,
    Stopped,
}

/// Keeps the single shared upstream connection alive, feeding every message through the
/// pipeline and publishing the merged records.
pub struct FeedSupervisor {
    connector: Arc<dyn FeedConnector>,
    backoff: Box<dyn Backoff>,
    pipeline: Pipeline,
    publisher: Publisher<VesselRecord>,
    cancel: CancellationToken,
    state: SupervisorState,
}

impl FeedSupervisor {
    pub fn new(
        connector: Arc<dyn FeedConnector>,
        backoff: Box<dyn Backoff>,
        pipeline: Pipeline,
        publisher: Publisher<VesselRecord>,
        cancel: CancellationToken,
    ) -> FeedSupervisor {
        FeedSupervisor {
            connector,
            backoff,
            pipeline,
            publisher,
            cancel,
            state: SupervisorState::Connecting,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Runs until cancelled. Connection failures only ever lead to another attempt.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> SupervisorState {
        loop {
            self.transition(SupervisorState::Connecting);

            let feed = tokio::select! {
                _ = self.cancel.cancelled() => break,
                feed = self.connector.connect() => feed,
            };

            match feed {
                Ok(feed) => {
                    self.transition(SupervisorState::Active);
                    let delivered = self.consume(&feed).await;
                    feed.close();

                    if self.cancel.is_cancelled() {
                        break;
                    }
                    if delivered > 0 {
                        self.backoff.reset();
                    }
                }
                Err(e) => warn!("failed to connect to upstream feed: {e}"),
            }

            self.transition(SupervisorState::Backoff);
            let delay = self.backoff.next_delay();
            info!(?delay, "reconnecting to upstream feed after delay");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(SupervisorState::Stopped);
        self.state
    }

    /// Processes events until the connection ends or the supervisor is cancelled, returning the
    /// number of messages received.
    async fn consume(&self, feed: &FeedHandle) -> u64 {
        let mut delivered = 0;

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return delivered,
                event = feed.next() => event,
            };

            match event {
                Some(FeedEvent::Message(raw)) => {
                    delivered += 1;
                    if let Ok(Some(record)) = self.pipeline.ingest(&raw, Utc::now()) {
                        if record.has_position() {
                            self.publisher.publish(record);
                        }
                    }
                }
                Some(FeedEvent::Error(e)) => {
                    warn!("upstream feed failed: {e}");
                    return delivered;
                }
                Some(FeedEvent::Closed(c)) => {
                    info!(code = ?c.code, reason = %c.reason, "upstream feed closed");
                    return delivered;
                }
                None => return delivered,
            }
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(from = self.state.as_ref(), to = next.as_ref(), "supervisor transition");
        self.state = next;
    }
}
