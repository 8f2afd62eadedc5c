use std::{sync::Arc, time::Duration};

use ais_core::{Publisher, VesselStore};
use chrono::Utc;
use snafu::ResultExt;
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::{
    backoff::ExponentialBackoff,
    error::{
        Result,
        error::{BindSnafu, ServeSnafu},
    },
    feed::{AisStreamClient, FeedConnector},
    normalizer::Normalizer,
    pipeline::Pipeline,
    server::{AppState, router},
    settings::{Mode, Settings},
    stats::RelayStats,
    supervisor::FeedSupervisor,
};

pub struct App {
    listener: TcpListener,
    port: u16,
    state: AppState,
    settings: Settings,
}

impl App {
    pub async fn build(settings: &Settings) -> Result<App> {
        let stats = Arc::new(RelayStats::default());
        let connector: Arc<dyn FeedConnector> =
            Arc::new(AisStreamClient::new(&settings.feed, stats.clone()));
        App::build_with_connector(settings, connector, stats).await
    }

    /// Like [App::build] but with a custom upstream connector.
    pub async fn build_with_connector(
        settings: &Settings,
        connector: Arc<dyn FeedConnector>,
        stats: Arc<RelayStats>,
    ) -> Result<App> {
        let address = settings.api.listener_address();
        let listener = TcpListener::bind(&address)
            .await
            .context(BindSnafu { address: &address })?;
        let port = listener
            .local_addr()
            .context(BindSnafu { address })?
            .port();

        let store = (settings.mode == Mode::Shared || settings.store.enabled)
            .then(|| VesselStore::new(settings.live_window()));

        let pipeline = Pipeline::new(
            Normalizer::new(settings.feed.message_types.clone()),
            store,
            stats.clone(),
        );

        let state = AppState {
            mode: settings.mode,
            connector,
            pipeline,
            publisher: Publisher::new(settings.subscriber_buffer_size),
            stats,
            shutdown: CancellationToken::new(),
            ping_interval: settings.api.ping_interval,
        };

        Ok(App {
            listener,
            port,
            state,
            settings: settings.clone(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Cancelling the token stops the server and every background task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    #[instrument(skip_all, fields(port = self.port))]
    pub async fn run(self) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        let mut set = JoinSet::new();

        if self.settings.mode == Mode::Shared {
            let supervisor = FeedSupervisor::new(
                self.state.connector.clone(),
                Box::new(ExponentialBackoff::from(&self.settings.backoff)),
                self.state.pipeline.clone(),
                self.state.publisher.clone(),
                shutdown.clone(),
            );
            set.spawn(async move {
                supervisor.run().await;
            });
        }

        if let Some(store) = self.state.pipeline.store().cloned() {
            let period = (self.settings.store.window / 10).max(Duration::from_secs(1));
            set.spawn(sweep(store, period, shutdown.clone()));
        }

        {
            let shutdown = shutdown.clone();
            set.spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    r = tokio::signal::ctrl_c() => {
                        if let Err(e) = r {
                            error!("failed to listen for ctrl-c: {e}");
                            return;
                        }
                        info!("received ctrl-c, shutting down");
                        shutdown.cancel();
                    }
                }
            });
        }

        info!(mode = ?self.settings.mode, "starting ais relay");

        let result = axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .context(ServeSnafu);

        shutdown.cancel();
        while set.join_next().await.is_some() {}

        result
    }
}

/// Bounds memory of long lived stores, reads never depend on it.
async fn sweep(store: VesselStore, period: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {
                store.evict(Utc::now());
            }
        }
    }
}
