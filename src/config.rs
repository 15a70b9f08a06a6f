//! Command line and environment configuration.

use std::fmt;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{debug, error};
use thiserror::Error;

pub const DEFAULT_POLL_MINUTES: u32 = 15;
pub const MIN_POLL_MINUTES: u32 = 1;
pub const MAX_POLL_MINUTES: u32 = 30;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Log at debug level and dump the effective configuration.
    #[arg(long, env = "READER_DEBUG")]
    pub debug: bool,

    /// Seconds between two heartbeat ticks.
    #[arg(long, env = "READER_HEARTBEAT_SECS", default_value_t = 10)]
    pub heartbeat_secs: u64,

    /// Minutes between two polls (1-30).
    #[arg(long, env = "READER_POLL_INTERVAL", default_value = "15")]
    pub poll_interval: String,

    #[command(subcommand)]
    pub reader: Reader,
}

#[derive(Subcommand, Debug)]
pub enum Reader {
    /// Read a thermostat and two sensors from Home Assistant.
    HomeAssistant(HomeAssistantArgs),
    /// Read a Netatmo home (thermostat and weather station).
    Netatmo(NetatmoArgs),
}

#[derive(Args)]
pub struct HomeAssistantArgs {
    /// Base URL of the Home Assistant instance, e.g. http://10.0.0.20:8123/
    #[arg(long, env = "HA_URL")]
    pub url: String,

    /// Long-lived access token.
    #[arg(long, env = "HA_TOKEN")]
    pub token: String,

    #[arg(long, default_value = "climate.living_room")]
    pub climate_entity: String,

    #[arg(long, default_value = "sensor.living_room_temperature")]
    pub temperature_entity: String,

    #[arg(long, default_value = "sensor.living_room_humidity")]
    pub humidity_entity: String,
}

impl fmt::Debug for HomeAssistantArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeAssistantArgs")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("climate_entity", &self.climate_entity)
            .field("temperature_entity", &self.temperature_entity)
            .field("humidity_entity", &self.humidity_entity)
            .finish()
    }
}

#[derive(Args)]
pub struct NetatmoArgs {
    #[arg(long, env = "NETATMO_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "NETATMO_CLIENT_SECRET")]
    pub client_secret: String,

    /// Refresh token generated on dev.netatmo.com.
    #[arg(long, env = "NETATMO_REFRESH_TOKEN")]
    pub refresh_token: String,

    #[arg(long, env = "NETATMO_HOME_ID")]
    pub home_id: String,

    /// Skip station values when the main module reports zero temperature
    /// or humidity.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub zero_guard: bool,

    #[command(flatten)]
    pub mqtt: MqttArgs,
}

impl fmt::Debug for NetatmoArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetatmoArgs")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("home_id", &self.home_id)
            .field("zero_guard", &self.zero_guard)
            .field("mqtt", &self.mqtt)
            .finish()
    }
}

/// Optional MQTT mirror. Without `--mqtt-url` nothing is published.
#[derive(Args, Default)]
pub struct MqttArgs {
    /// Broker URI, e.g. tcp://10.0.0.20:1883
    #[arg(long, env = "MQTT_URL")]
    pub mqtt_url: Option<String>,

    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    #[arg(long, env = "MQTT_PASS")]
    pub mqtt_pass: Option<String>,
}

impl fmt::Debug for MqttArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttArgs")
            .field("mqtt_url", &self.mqtt_url)
            .field("mqtt_user", &self.mqtt_user)
            .field("mqtt_pass", &self.mqtt_pass.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Why the configured poll interval was not used as given.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalNotice {
    #[error("invalid polling interval {0:?}: using 15 minutes")]
    Unparsable(String),

    #[error("polling interval of {0} minutes too short: changed to 1 minute")]
    TooShort(i64),

    #[error("polling interval of {0} minutes too long: changed to 30 minutes")]
    TooLong(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    minutes: u32,
}

impl PollInterval {
    /// Parse a minute count, clamping it into range.
    pub fn parse(raw: &str) -> (Self, Option<IntervalNotice>) {
        let requested = match raw.trim().parse::<i64>() {
            Ok(minutes) => minutes,
            Err(_) => {
                let notice = IntervalNotice::Unparsable(raw.to_string());
                return (Self::default(), Some(notice));
            }
        };

        let (minutes, notice) = if requested < i64::from(MIN_POLL_MINUTES) {
            (MIN_POLL_MINUTES, Some(IntervalNotice::TooShort(requested)))
        } else if requested > i64::from(MAX_POLL_MINUTES) {
            (MAX_POLL_MINUTES, Some(IntervalNotice::TooLong(requested)))
        } else {
            (requested as u32, None)
        };

        (Self { minutes }, notice)
    }

    /// Like [`PollInterval::parse`], logging any adjustment.
    pub fn from_config(raw: &str) -> Self {
        let (interval, notice) = Self::parse(raw);
        if let Some(notice) = notice {
            error!("{notice}");
        }
        debug!(
            "using polling interval of {} seconds",
            interval.as_duration().as_secs()
        );
        interval
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes) * 60)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self {
            minutes: DEFAULT_POLL_MINUTES,
        }
    }
}
