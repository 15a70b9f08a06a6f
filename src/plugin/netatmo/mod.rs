//! Netatmo reader.
//!
//! Reads the thermostat room and the weather station (main, outdoor and
//! indoor modules) from `homestatus`, writes them into host slots and
//! mirrors every value under `netatmo_plugin/` on MQTT.

pub mod status;
pub mod token;

use std::fmt;

use chrono::{DateTime, Local, Utc};
use log::debug;

use self::status::{map_home_status, ZeroGuard, HOME_STATUS_URL};
use self::token::TokenManager;
use super::field::Payload;
use super::{declare_slots, mirror, CycleOutcome, Plugin};
use crate::config::{NetatmoArgs, PollInterval};
use crate::fetch::{HttpTransport, Transport};
use crate::schedule::PollScheduler;
use crate::sink::Sink;
use crate::slot::SlotTable;

pub mod unit {
    use crate::slot::SlotId;

    pub const THERM_TEMP: SlotId = 1;
    pub const THERM_SETP: SlotId = 2;
    pub const THERM_TEMP_B1: SlotId = 3;
    pub const THERM_TEMP_B2: SlotId = 4;
    pub const THERM_TEMP_BU: SlotId = 5;
    pub const CO2_B1: SlotId = 6;
    pub const CO2_B2: SlotId = 7;
    pub const BARO_B1: SlotId = 8;
    pub const HUMIDITY_B1: SlotId = 9;
    pub const HUMIDITY_B2: SlotId = 10;
    pub const HUMIDITY_BU: SlotId = 11;
    pub const BARO_TREND_B1: SlotId = 12;
    pub const THERM_SETP_MODE: SlotId = 13;
    pub const THERM_ON: SlotId = 14;
}

mod slots {
    use super::unit;
    use crate::slot::{kind, SlotDescriptor, ValueFormat};

    const fn temperature(id: u8, name: &'static str) -> SlotDescriptor {
        SlotDescriptor::new(id, name, kind::TEMPERATURE, ValueFormat::Text)
    }

    const fn humidity(id: u8, name: &'static str) -> SlotDescriptor {
        SlotDescriptor::new(id, name, kind::HUMIDITY, ValueFormat::Integer)
    }

    const fn text(id: u8, name: &'static str) -> SlotDescriptor {
        SlotDescriptor::new(id, name, kind::TEXT, ValueFormat::Text)
    }

    pub const THERM_TEMP: SlotDescriptor = temperature(unit::THERM_TEMP, "ThermTemp");
    pub const THERM_SETP: SlotDescriptor =
        SlotDescriptor::new(unit::THERM_SETP, "ThermSetpoint", kind::SETPOINT, ValueFormat::Text);
    pub const THERM_TEMP_B1: SlotDescriptor = temperature(unit::THERM_TEMP_B1, "TempB1");
    pub const THERM_TEMP_B2: SlotDescriptor = temperature(unit::THERM_TEMP_B2, "TempB2");
    pub const THERM_TEMP_BU: SlotDescriptor = temperature(unit::THERM_TEMP_BU, "TempBU");
    pub const CO2_B1: SlotDescriptor =
        SlotDescriptor::new(unit::CO2_B1, "CO2B1", kind::AIR_QUALITY, ValueFormat::Integer);
    pub const CO2_B2: SlotDescriptor =
        SlotDescriptor::new(unit::CO2_B2, "CO2B2", kind::AIR_QUALITY, ValueFormat::Integer);
    pub const BARO_B1: SlotDescriptor =
        SlotDescriptor::new(unit::BARO_B1, "BaroB1", kind::BAROMETER, ValueFormat::Pressure);
    pub const HUMIDITY_B1: SlotDescriptor = humidity(unit::HUMIDITY_B1, "HumB1");
    pub const HUMIDITY_B2: SlotDescriptor = humidity(unit::HUMIDITY_B2, "HumB2");
    pub const HUMIDITY_BU: SlotDescriptor = humidity(unit::HUMIDITY_BU, "HumBU");
    pub const BARO_TREND_B1: SlotDescriptor = text(unit::BARO_TREND_B1, "BaroTrendB1");
    pub const THERM_SETP_MODE: SlotDescriptor = text(unit::THERM_SETP_MODE, "ThermSetpointMode");
    pub const THERM_ON: SlotDescriptor = text(unit::THERM_ON, "ThermStatusOn");
}

pub fn slot_table() -> SlotTable {
    [
        slots::THERM_TEMP,
        slots::THERM_SETP,
        slots::THERM_TEMP_B1,
        slots::THERM_TEMP_B2,
        slots::THERM_TEMP_BU,
        slots::CO2_B1,
        slots::CO2_B2,
        slots::BARO_B1,
        slots::HUMIDITY_B1,
        slots::HUMIDITY_B2,
        slots::HUMIDITY_BU,
        slots::BARO_TREND_B1,
        slots::THERM_SETP_MODE,
        slots::THERM_ON,
    ]
    .into_iter()
    .collect()
}

/// MQTT topics this reader publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Life-cycle marker: `started` / `stopped`.
    Plugin,
    Heartbeat,
    Poll,
    Reading(&'static str),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Plugin => f.write_str("netatmo_plugin"),
            Topic::Heartbeat => f.write_str("netatmo_plugin/heartbeat"),
            Topic::Poll => f.write_str("netatmo_plugin/poll"),
            Topic::Reading(name) => write!(f, "netatmo_plugin/{name}"),
        }
    }
}

fn publish(sink: &mut dyn Sink, topic: Topic, payload: &str) {
    mirror(sink, &topic.to_string(), payload);
}

const MARKER_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

pub struct NetatmoReader<T = HttpTransport> {
    transport: T,
    tokens: TokenManager,
    home_id: String,
    guard: ZeroGuard,
    scheduler: PollScheduler,
    slots: SlotTable,
}

impl<T: Transport> NetatmoReader<T> {
    pub fn new(transport: T, args: NetatmoArgs, interval: PollInterval, now: DateTime<Local>) -> Self {
        let NetatmoArgs {
            client_id,
            client_secret,
            refresh_token,
            home_id,
            zero_guard,
            ..
        } = args;

        Self {
            transport,
            tokens: TokenManager::new(client_id, client_secret, refresh_token),
            home_id,
            guard: ZeroGuard {
                enabled: zero_guard,
            },
            scheduler: PollScheduler::new(interval, now),
            slots: slot_table(),
        }
    }

    /// One full cycle: authenticate, fetch `homestatus`, map it. Any error
    /// drops the access token so the next cycle starts from a fresh one.
    pub fn poll(&mut self, sink: &mut dyn Sink, now: DateTime<Local>) -> CycleOutcome {
        debug!("onHeartbeat - get sensors");
        let mut outcome = CycleOutcome::default();

        let token = match self.tokens.access_token(&self.transport, now.with_timezone(&Utc)) {
            Ok(token) => token,
            Err(err) => {
                outcome.record(err);
                return outcome;
            }
        };

        let params = [("home_id", self.home_id.as_str())];
        match self.transport.post_form(HOME_STATUS_URL, &params, Some(token.as_str())) {
            Ok(body) => {
                debug!("=== homestatus: {}", body.describe());
                map_home_status(&Payload::new(&body), self.guard, sink, &mut outcome);
            }
            Err(err) => outcome.fetch_failed("homestatus", err),
        }

        if outcome.found_error() {
            self.tokens.invalidate();
        }
        debug!("onHeartbeat - END");
        outcome
    }
}

impl<T: Transport> Plugin for NetatmoReader<T> {
    fn name(&self) -> &str {
        "Netatmo"
    }

    fn slots(&self) -> &SlotTable {
        &self.slots
    }

    fn on_start(&mut self, sink: &mut dyn Sink) -> anyhow::Result<()> {
        debug!("onStart called");
        declare_slots(&self.slots, sink)?;
        publish(sink, Topic::Plugin, "started");
        Ok(())
    }

    fn on_stop(&mut self, sink: &mut dyn Sink) {
        publish(sink, Topic::Plugin, "stopped");
        debug!("onStop called");
    }

    fn on_heartbeat(&mut self, sink: &mut dyn Sink, now: DateTime<Local>) -> Option<CycleOutcome> {
        debug!("onHeartbeat");
        let stamp = now.format(MARKER_FORMAT).to_string();
        publish(sink, Topic::Heartbeat, &stamp);
        if !self.scheduler.due(now) {
            debug!("next poll at {}", self.scheduler.next_poll().format("%H:%M:%S"));
            return None;
        }
        publish(sink, Topic::Poll, &stamp);
        Some(self.poll(sink, now))
    }
}
