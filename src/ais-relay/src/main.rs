#![deny(warnings)]
#![deny(rust_2018_idioms)]

use ais_relay::{settings::Settings, startup::App, telemetry::init_tracer};
use tracing::error;

#[tokio::main]
async fn main() {
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Configuration problems are reported before anything connects.
    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("invalid configuration: {e:?}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracer(settings.log_level) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }

    let app = match App::build(&settings).await {
        Ok(app) => app,
        Err(e) => {
            error!("failed to start: {e:?}");
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("relay exited with an error: {e:?}");
        std::process::exit(1);
    }
}
