//! Home Assistant reader.
//!
//! Mirrors a Nest thermostat and two room sensors exposed by Home Assistant
//! into host slots, reading `api/states/<entity>` with a long-lived token.

use chrono::{DateTime, Local};
use log::debug;

use super::field::Payload;
use super::{store_field, CycleOutcome, Plugin};
use crate::config::{HomeAssistantArgs, PollInterval};
use crate::fetch::{Body, HttpTransport, Transport};
use crate::schedule::PollScheduler;
use crate::sink::Sink;
use crate::slot::{kind, SlotDescriptor, SlotTable, ValueFormat};

pub mod unit {
    use crate::slot::SlotId;

    pub const THERM_TEMP: SlotId = 1;
    pub const THERM_SETP: SlotId = 2;
    pub const THERM_SETP_MODE: SlotId = 3;
    pub const THERM_ON: SlotId = 4;
    pub const HUMIDITY_WK: SlotId = 5;
}

const THERM_TEMP: SlotDescriptor =
    SlotDescriptor::new(unit::THERM_TEMP, "NestThermTemp", kind::TEMPERATURE, ValueFormat::Text);
const THERM_SETP: SlotDescriptor =
    SlotDescriptor::new(unit::THERM_SETP, "NestThermSetpoint", kind::SETPOINT, ValueFormat::Text);
const THERM_SETP_MODE: SlotDescriptor = SlotDescriptor::new(
    unit::THERM_SETP_MODE,
    "NestThermSetpointMode",
    kind::TEXT,
    ValueFormat::Text,
);
const THERM_ON: SlotDescriptor =
    SlotDescriptor::new(unit::THERM_ON, "NestThermStatusOn", kind::TEXT, ValueFormat::Text);
const HUMIDITY_WK: SlotDescriptor =
    SlotDescriptor::new(unit::HUMIDITY_WK, "NestThermHum", kind::HUMIDITY, ValueFormat::Integer);

pub fn slot_table() -> SlotTable {
    [THERM_TEMP, THERM_SETP, THERM_SETP_MODE, THERM_ON, HUMIDITY_WK]
        .into_iter()
        .collect()
}

pub struct HomeAssistantReader<T = HttpTransport> {
    transport: T,
    base_url: String,
    token: String,
    climate_entity: String,
    temperature_entity: String,
    humidity_entity: String,
    scheduler: PollScheduler,
    slots: SlotTable,
}

impl<T: Transport> HomeAssistantReader<T> {
    pub fn new(
        transport: T,
        args: HomeAssistantArgs,
        interval: PollInterval,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            transport,
            base_url: args.url.trim_end_matches('/').to_string(),
            token: args.token,
            climate_entity: args.climate_entity,
            temperature_entity: args.temperature_entity,
            humidity_entity: args.humidity_entity,
            scheduler: PollScheduler::new(interval, now),
            slots: slot_table(),
        }
    }

    fn state_url(&self, entity: &str) -> String {
        format!("{}/api/states/{}", self.base_url, entity)
    }

    fn fetch(&self, entity: &str, outcome: &mut CycleOutcome) -> Option<Body> {
        match self.transport.get(&self.state_url(entity), &self.token) {
            Ok(body) => {
                debug!("=== {entity}: {}", body.describe());
                Some(body)
            }
            Err(err) => {
                outcome.fetch_failed(entity, err);
                None
            }
        }
    }

    /// One full cycle: fetch all three entities, then map what arrived.
    pub fn poll(&mut self, sink: &mut dyn Sink) -> CycleOutcome {
        debug!("onHeartbeat - get sensors");
        let mut outcome = CycleOutcome::default();

        let climate = self.fetch(&self.climate_entity, &mut outcome);
        let temperature = self.fetch(&self.temperature_entity, &mut outcome);
        let humidity = self.fetch(&self.humidity_entity, &mut outcome);

        if let Some(body) = climate {
            map_climate(&Payload::new(&body), sink, &mut outcome);
        }

        if let Some(body) = temperature {
            let payload = Payload::new(&body);
            store_field(sink, &mut outcome, &THERM_TEMP, payload.text("temperature", "/state"));
        }

        if let Some(body) = humidity {
            let payload = Payload::new(&body);
            store_field(sink, &mut outcome, &HUMIDITY_WK, payload.integer("humidity", "/state"));
        }

        debug!("onHeartbeat - END");
        outcome
    }
}

fn map_climate(payload: &Payload, sink: &mut dyn Sink, outcome: &mut CycleOutcome) {
    let heating = payload
        .text("hvac_action", "/attributes/hvac_action")
        .map(|action| if action == "heating" { "True" } else { "False" }.to_string());
    store_field(sink, outcome, &THERM_ON, heating);

    let mode = payload.text("state", "/state").and_then(|state| {
        payload
            .text("preset_mode", "/attributes/preset_mode")
            .map(|preset| format!("{state}/{preset}"))
    });
    store_field(sink, outcome, &THERM_SETP_MODE, mode);

    let setpoint = payload.text("temperature", "/attributes/temperature");
    store_field(sink, outcome, &THERM_SETP, setpoint);
}

impl<T: Transport> Plugin for HomeAssistantReader<T> {
    fn name(&self) -> &str {
        "Home Assistant"
    }

    fn slots(&self) -> &SlotTable {
        &self.slots
    }

    fn on_heartbeat(&mut self, sink: &mut dyn Sink, now: DateTime<Local>) -> Option<CycleOutcome> {
        debug!("onHeartbeat");
        if !self.scheduler.due(now) {
            debug!("next poll at {}", self.scheduler.next_poll().format("%H:%M:%S"));
            return None;
        }
        Some(self.poll(sink))
    }
}
