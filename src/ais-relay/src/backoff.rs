use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};

use crate::settings::BackoffSettings;

/// Decides how long to wait before the next reconnect attempt.
pub trait Backoff: Send + Sync {
    fn next_delay(&mut self) -> Duration;
    /// Called once a connection proved healthy.
    fn reset(&mut self);
}

/// Doubles from `base` up to `max`. With jitter a random share of up to the current delay is
/// added on top.
#[derive(Debug)]
pub struct ExponentialBackoff {
    builder: ExponentialBuilder,
    delays: backon::ExponentialBackoff,
    max: Duration,
}

#[derive(Debug)]
pub struct FixedBackoff {
    builder: ConstantBuilder,
    delays: backon::ConstantBackoff,
    delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> ExponentialBackoff {
        let max = max.max(base);
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(base)
            .with_max_delay(max)
            .without_max_times();
        if jitter {
            builder = builder.with_jitter();
        }

        ExponentialBackoff {
            delays: builder.build(),
            builder,
            max,
        }
    }
}

impl From<&BackoffSettings> for ExponentialBackoff {
    fn from(s: &BackoffSettings) -> Self {
        ExponentialBackoff::new(s.base, s.max, s.jitter)
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        self.delays.next().unwrap_or(self.max)
    }

    fn reset(&mut self) {
        self.delays = self.builder.build();
    }
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> FixedBackoff {
        let builder = ConstantBuilder::default()
            .with_delay(delay)
            .without_max_times();

        FixedBackoff {
            delays: builder.build(),
            builder,
            delay,
        }
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&mut self) -> Duration {
        self.delays.next().unwrap_or(self.delay)
    }

    fn reset(&mut self) {
        self.delays = self.builder.build();
    }
}
