use std::{sync::Once, time::Duration};

use ais_relay::{
    models::{Vessel, VesselMessage},
    settings::{Mode, Settings},
    startup::App,
    stats::StatsSnapshot,
};
use async_channel::Receiver;
use futures::{Future, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_async, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::FmtSubscriber;

static TRACING: Once = Once::new();

const TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestHelper {
    pub upstream: MockUpstream,
    pub http: reqwest::Client,
    port: u16,
    shutdown: CancellationToken,
}

/// A stand-in for the upstream AIS feed, accepting any number of connections.
pub struct MockUpstream {
    pub url: String,
    connections: Receiver<UpstreamConnection>,
}

/// One connection the relay opened against the mock upstream.
pub struct UpstreamConnection {
    pub subscription: serde_json::Value,
    ws: WebSocketStream<TcpStream>,
}

/// A downstream consumer of the relay.
pub struct Consumer {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

pub async fn test<T, Fut>(test_closure: T)
where
    T: FnOnce(TestHelper) -> Fut,
    Fut: Future<Output = ()>,
{
    test_with_settings(|_| {}, test_closure).await
}

pub async fn test_with_settings<S, T, Fut>(modify: S, test_closure: T)
where
    S: FnOnce(&mut Settings),
    T: FnOnce(TestHelper) -> Fut,
    Fut: Future<Output = ()>,
{
    init_tracing();

    let upstream = MockUpstream::start().await;

    let mut settings = Settings::test_default(upstream.url.clone());
    modify(&mut settings);

    let app = App::build(&settings).await.unwrap();
    let port = app.port();
    let shutdown = app.shutdown_token();
    let server = tokio::spawn(app.run());

    let helper = TestHelper {
        upstream,
        http: reqwest::Client::new(),
        port,
        shutdown: shutdown.clone(),
    };

    test_closure(helper).await;

    shutdown.cancel();
    tokio::time::timeout(TIMEOUT, server)
        .await
        .expect("relay did not shut down")
        .unwrap()
        .unwrap();
}

pub fn shared(settings: &mut Settings) {
    settings.mode = Mode::Shared;
}

fn init_tracing() {
    TRACING.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    });
}

impl TestHelper {
    pub async fn connect_consumer(&self) -> Consumer {
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{}/ws", self.port))
            .await
            .unwrap();
        Consumer { ws }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn health(&self) -> reqwest::Response {
        self.get("health").await
    }

    pub async fn vessels(&self) -> Vec<Vessel> {
        self.get("vessels").await.json().await.unwrap()
    }

    pub async fn stats(&self) -> StatsSnapshot {
        self.get("stats").await.json().await.unwrap()
    }

    /// Polls `/vessels` until `count` vessels are live.
    pub async fn wait_for_vessels(&self, count: usize) -> Vec<Vessel> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let vessels = self.vessels().await;
                if vessels.len() >= count {
                    return vessels;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("vessels never showed up")
    }

    /// Polls `/stats` until exactly `count` sessions are active.
    pub async fn wait_for_active_sessions(&self, count: u64) {
        tokio::time::timeout(TIMEOUT, async {
            while self.stats().await.active_sessions != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("active sessions never settled")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(format!("{}/{path}", self.base_url()))
            .send()
            .await
            .unwrap()
    }
}

impl MockUpstream {
    async fn start() -> MockUpstream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (sender, connections) = async_channel::unbounded();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sender = sender.clone();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.unwrap();
                    let subscription = match ws.next().await {
                        Some(Ok(Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap(),
                        other => panic!("expected a subscription request, got {other:?}"),
                    };
                    let _ = sender.send(UpstreamConnection { subscription, ws }).await;
                });
            }
        });

        MockUpstream { url, connections }
    }

    pub async fn next_connection(&self) -> UpstreamConnection {
        tokio::time::timeout(TIMEOUT, self.connections.recv())
            .await
            .expect("relay never connected upstream")
            .unwrap()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl UpstreamConnection {
    pub async fn send(&mut self, text: String) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    pub async fn close(&mut self, reason: &str) {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: reason.to_string().into(),
            }))
            .await
            .unwrap();
    }

    /// Resolves once the relay has closed its side of the connection.
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(TIMEOUT, async {
            while let Some(Ok(message)) = self.ws.next().await {
                if message.is_close() {
                    return;
                }
            }
        })
        .await
        .expect("relay never closed the upstream connection")
    }
}

impl Consumer {
    pub async fn recv_text(&mut self) -> String {
        match self.recv().await {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected a text message, got {other:?}"),
        }
    }

    pub async fn recv_message(&mut self) -> VesselMessage {
        serde_json::from_str(&self.recv_text().await).unwrap()
    }

    pub async fn recv_close(&mut self) -> Option<CloseFrame> {
        match self.recv().await {
            Message::Close(frame) => frame,
            other => panic!("expected a close frame, got {other:?}"),
        }
    }

    pub async fn close(&mut self) {
        self.ws.close(None).await.unwrap();
    }

    /// Keeps reading for `duration`, answering pings, and returns how many arrived. Any other
    /// frame fails the test.
    pub async fn idle(&mut self, duration: Duration) -> usize {
        let mut pings = 0;
        let _ = tokio::time::timeout(duration, async {
            while let Some(message) = self.ws.next().await {
                match message {
                    Ok(Message::Ping(_)) => pings += 1,
                    other => panic!("expected only pings, got {other:?}"),
                }
            }
        })
        .await;
        pings
    }

    async fn recv(&mut self) -> Message {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(message)) => return message,
                    other => panic!("consumer connection ended: {other:?}"),
                }
            }
        })
        .await
        .expect("consumer received nothing")
    }
}
