use snafu::{Location, Snafu};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to load configuration"))]
    Config {
        #[snafu(implicit)]
        location: Location,
        source: config::ConfigError,
    },
    #[snafu(display("Invalid configuration, '{reason}'"))]
    InvalidConfig {
        #[snafu(implicit)]
        location: Location,
        reason: String,
    },
    #[snafu(display("Failed to connect to the upstream feed at '{url}'"))]
    Connect {
        #[snafu(implicit)]
        location: Location,
        url: String,
        #[snafu(source)]
        error: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("Timed out connecting to the upstream feed at '{url}' after {timeout:?}"))]
    ConnectTimeout {
        #[snafu(implicit)]
        location: Location,
        url: String,
        timeout: std::time::Duration,
        #[snafu(source)]
        error: tokio::time::error::Elapsed,
    },
    #[snafu(display("Failed to send the subscription request"))]
    Subscribe {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        error: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("Failed to serialize json"))]
    Json {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        error: serde_json::Error,
    },
    #[snafu(display("Failed to bind listener to '{address}'"))]
    Bind {
        #[snafu(implicit)]
        location: Location,
        address: String,
        #[snafu(source)]
        error: std::io::Error,
    },
    #[snafu(display("Server failed"))]
    Serve {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        error: std::io::Error,
    },
    #[snafu(display("Failed to install tracing subscriber"))]
    Tracing {
        #[snafu(implicit)]
        location: Location,
        #[snafu(source)]
        error: tracing_subscriber::util::TryInitError,
    },
}
