use std::time::Duration;

use config::{Config, File};
use serde::Deserialize;
use snafu::{ResultExt, ensure};
use strum::{AsRefStr, EnumString};

use crate::{
    error::{
        Result,
        error::{ConfigSnafu, InvalidConfigSnafu},
    },
    models::{BoundingBox, MessageType},
};

pub const DEFAULT_FEED_URL: &str = "wss://stream.aisstream.io/v0/stream";

const ENV_PREFIX: &str = "AIS_RELAY";
const LEGACY_API_KEY_VAR: &str = "AIS_STREAM_API_KEY";
const LEGACY_PORT_VAR: &str = "PORT";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,
    pub environment: Environment,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub backoff: BackoffSettings,
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, EnumString, AsRefStr)]
#[strum(ascii_case_insensitive)]
pub enum Environment {
    Local,
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// How downstream consumers are served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every consumer gets its own upstream connection and receives the upstream text as-is.
    #[default]
    Relay,
    /// A single supervised upstream connection feeds the store, consumers receive normalized
    /// vessel records.
    Shared,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub ip: String,
    pub port: u16,
    /// Consumers are pinged this often, one that leaves a ping unanswered until the next is
    /// dropped.
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub url: String,
    pub api_key: String,
    pub bounding_boxes: Vec<BoundingBox>,
    pub message_types: Vec<MessageType>,
    /// An upstream connection that stays silent for this long is considered dead.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Bounds the TCP, TLS and WebSocket handshake plus the subscription request.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub event_buffer_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    pub jitter: bool,
}

impl Settings {
    /// Loads `config/<environment>.yml`, an optional `config/<environment>.secret.yml` and
    /// `AIS_RELAY__*` environment overrides, the environment being picked by `APP_ENVIRONMENT`
    /// (defaults to `local`).
    pub fn new() -> Result<Settings> {
        let environment = match std::env::var("APP_ENVIRONMENT") {
            Ok(v) => v.parse::<Environment>().map_err(|_| {
                InvalidConfigSnafu {
                    reason: format!("unknown APP_ENVIRONMENT '{v}'"),
                }
                .build()
            })?,
            Err(_) => Environment::Local,
        };

        let name = environment.as_ref().to_lowercase();

        let mut builder = Config::builder()
            .add_source(File::with_name(&format!("config/{name}")).required(true))
            .add_source(File::with_name(&format!("config/{name}.secret")).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override("environment", environment.as_ref())
            .context(ConfigSnafu)?;

        if let Ok(api_key) = std::env::var(LEGACY_API_KEY_VAR) {
            builder = builder
                .set_override("feed.api_key", api_key)
                .context(ConfigSnafu)?;
        }
        if let Ok(port) = std::env::var(LEGACY_PORT_VAR) {
            builder = builder
                .set_override("api.port", port)
                .context(ConfigSnafu)?;
        }

        Settings::from_config(builder.build().context(ConfigSnafu)?)
    }

    pub fn from_config(config: Config) -> Result<Settings> {
        let settings: Settings = config.try_deserialize().context(ConfigSnafu)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects configurations that can never produce a working relay. Runs before any
    /// connection is attempted.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.feed.api_key.trim().is_empty(),
            InvalidConfigSnafu {
                reason: format!(
                    "missing upstream api key, set '{LEGACY_API_KEY_VAR}' or '{ENV_PREFIX}__FEED__API_KEY'"
                ),
            }
        );
        ensure!(
            !self.feed.message_types.is_empty(),
            InvalidConfigSnafu {
                reason: "at least one message type must be subscribed to",
            }
        );
        ensure!(
            !self.feed.bounding_boxes.is_empty(),
            InvalidConfigSnafu {
                reason: "at least one bounding box is required",
            }
        );
        if let Some(b) = self.feed.bounding_boxes.iter().find(|b| !b.is_valid()) {
            return InvalidConfigSnafu {
                reason: format!("bounding box out of range: {b:?}"),
            }
            .fail();
        }
        ensure!(
            self.subscriber_buffer_size > 0 && self.feed.event_buffer_size > 0,
            InvalidConfigSnafu {
                reason: "buffer sizes must be positive",
            }
        );
        ensure!(
            !self.feed.idle_timeout.is_zero()
                && !self.feed.connect_timeout.is_zero()
                && !self.api.ping_interval.is_zero(),
            InvalidConfigSnafu {
                reason: "idle timeout, connect timeout and ping interval must be positive",
            }
        );
        ensure!(
            !self.store.window.is_zero(),
            InvalidConfigSnafu {
                reason: "store window must be positive",
            }
        );

        Ok(())
    }

    pub fn live_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.store.window).unwrap_or(chrono::Duration::MAX)
    }
}

impl ApiSettings {
    pub fn listener_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 3001,
            ping_interval: Duration::from_secs(20),
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            api_key: String::new(),
            bounding_boxes: default_bounding_boxes(),
            message_types: default_message_types(),
            idle_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            event_buffer_size: 1024,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(30 * 60),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: true,
        }
    }
}

fn default_bounding_boxes() -> Vec<BoundingBox> {
    vec![BoundingBox::new([18.0, -98.0], [31.0, -81.0])]
}

fn default_message_types() -> Vec<MessageType> {
    vec![MessageType::PositionReport]
}

fn default_subscriber_buffer_size() -> usize {
    256
}

#[cfg(feature = "test")]
mod test {
    use super::*;

    impl Settings {
        pub fn test_default(feed_url: String) -> Settings {
            Settings {
                log_level: LogLevel::Debug,
                environment: Environment::Test,
                api: ApiSettings {
                    ip: "127.0.0.1".to_string(),
                    port: 0,
                    ping_interval: Duration::from_secs(20),
                },
                mode: Mode::Relay,
                feed: FeedSettings {
                    url: feed_url,
                    api_key: "test-key".to_string(),
                    bounding_boxes: default_bounding_boxes(),
                    message_types: default_message_types(),
                    idle_timeout: Duration::from_secs(30),
                    connect_timeout: Duration::from_secs(5),
                    event_buffer_size: 64,
                },
                store: StoreSettings::default(),
                backoff: BackoffSettings {
                    base: Duration::from_millis(10),
                    max: Duration::from_millis(100),
                    jitter: false,
                },
                subscriber_buffer_size: 64,
            }
        }
    }
}
