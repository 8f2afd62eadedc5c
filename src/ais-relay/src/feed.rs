use std::{sync::Arc, time::Duration};

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use snafu::ResultExt;
use tokio::{net::TcpStream, time::Instant};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{
        Result,
        error::{ConnectSnafu, ConnectTimeoutSnafu, JsonSnafu, SubscribeSnafu},
    },
    models::{RawMessage, SubscriptionRequest},
    settings::FeedSettings,
    stats::RelayStats,
};

/// Close code used when a connection ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Events emitted by an upstream connection, in receipt order. `Closed` is always the last
/// event of a connection.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Message(RawMessage),
    Error(String),
    Closed(CloseInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

/// Opens upstream connections. Implementations never reconnect on their own.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<FeedHandle>;
}

/// An open upstream connection. Dropping the handle tears the connection down.
#[derive(Debug)]
pub struct FeedHandle {
    events: Receiver<FeedEvent>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct AisStreamClient {
    url: String,
    request: SubscriptionRequest,
    idle_timeout: Duration,
    connect_timeout: Duration,
    buffer_size: usize,
    stats: Arc<RelayStats>,
}

impl CloseInfo {
    pub fn abnormal(reason: impl Into<String>) -> CloseInfo {
        CloseInfo {
            code: Some(ABNORMAL_CLOSURE),
            reason: reason.into(),
        }
    }

    fn from_frame(frame: Option<CloseFrame>) -> CloseInfo {
        match frame {
            Some(f) => CloseInfo {
                code: Some(f.code.into()),
                reason: f.reason.as_str().to_string(),
            },
            None => CloseInfo {
                code: None,
                reason: String::new(),
            },
        }
    }
}

impl FeedHandle {
    pub fn new(events: Receiver<FeedEvent>, cancel: CancellationToken) -> FeedHandle {
        FeedHandle { events, cancel }
    }

    /// `None` once the connection is closed and every buffered event has been consumed.
    pub async fn next(&self) -> Option<FeedEvent> {
        self.events.recv().await.ok()
    }

    /// Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AisStreamClient {
    pub fn new(settings: &FeedSettings, stats: Arc<RelayStats>) -> AisStreamClient {
        AisStreamClient {
            url: settings.url.clone(),
            request: SubscriptionRequest {
                api_key: settings.api_key.clone(),
                bounding_boxes: settings.bounding_boxes.clone(),
                filter_message_types: settings.message_types.clone(),
            },
            idle_timeout: settings.idle_timeout,
            connect_timeout: settings.connect_timeout,
            buffer_size: settings.event_buffer_size,
            stats,
        }
    }

    async fn open(&self) -> Result<FeedHandle> {
        let request = serde_json::to_string(&self.request).context(JsonSnafu)?;

        let stream = tokio::time::timeout(self.connect_timeout, self.handshake(request))
            .await
            .context(ConnectTimeoutSnafu {
                url: &self.url,
                timeout: self.connect_timeout,
            })??;
        let (mut sink, stream) = stream.split();

        let (sender, receiver) = async_channel::bounded(self.buffer_size);
        let cancel = CancellationToken::new();

        let reader = Reader {
            events: sender,
            cancel: cancel.clone(),
            idle_timeout: self.idle_timeout,
            stats: self.stats.clone(),
        };
        tokio::spawn(async move {
            reader.run(stream).await;
            let _ = sink.close().await;
        });

        Ok(FeedHandle::new(receiver, cancel))
    }

    async fn handshake(
        &self,
        request: String,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let (mut stream, _) = connect_async(self.url.as_str())
            .await
            .context(ConnectSnafu { url: &self.url })?;

        stream
            .send(Message::Text(request.into()))
            .await
            .context(SubscribeSnafu)?;

        Ok(stream)
    }
}

#[async_trait]
impl FeedConnector for AisStreamClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<FeedHandle> {
        match self.open().await {
            Ok(handle) => {
                self.stats.record_upstream_connect();
                info!("connected to upstream feed");
                Ok(handle)
            }
            Err(e) => {
                self.stats.record_upstream_failure();
                Err(e)
            }
        }
    }
}

struct Reader {
    events: Sender<FeedEvent>,
    cancel: CancellationToken,
    idle_timeout: Duration,
    stats: Arc<RelayStats>,
}

impl Reader {
    async fn run<S>(self, mut stream: S)
    where
        S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        // Only data frames move the deadline, control frames alone leave the feed idle.
        let mut deadline = Instant::now() + self.idle_timeout;

        let close = loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("upstream connection closed locally");
                    return;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(idle_timeout = ?self.idle_timeout, "upstream connection went idle");
                    break CloseInfo {
                        code: None,
                        reason: "idle timeout".to_string(),
                    };
                }
                next = stream.next() => next,
            };

            let event = match next {
                None => break CloseInfo::abnormal("connection dropped"),
                Some(Err(e)) => {
                    warn!("upstream connection failed: {e}");
                    if !self.emit(FeedEvent::Error(e.to_string())).await {
                        return;
                    }
                    break CloseInfo::abnormal(e.to_string());
                }
                Some(Ok(Message::Text(text))) => {
                    deadline = Instant::now() + self.idle_timeout;
                    self.decode(text.as_str())
                }
                Some(Ok(Message::Binary(bytes))) => {
                    deadline = Instant::now() + self.idle_timeout;
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => self.decode(text),
                        Err(e) => {
                            self.stats.record_decode_error();
                            warn!("dropping non utf-8 binary frame: {e}");
                            None
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => break CloseInfo::from_frame(frame),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => None,
            };

            if let Some(event) = event {
                if !self.emit(event).await {
                    return;
                }
            }
        };

        info!(code = ?close.code, reason = %close.reason, "upstream connection closed");
        self.emit(FeedEvent::Closed(close)).await;
    }

    fn decode(&self, text: &str) -> Option<FeedEvent> {
        match RawMessage::parse(text) {
            Ok(message) => Some(FeedEvent::Message(message)),
            Err(e) => {
                self.stats.record_decode_error();
                warn!("failed to decode upstream message: {e}");
                None
            }
        }
    }

    /// Returns `false` once nobody is listening anymore.
    async fn emit(&self, event: FeedEvent) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}
