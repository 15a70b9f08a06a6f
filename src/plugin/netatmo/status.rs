//! Mapping of the `homestatus` response onto the Netatmo slots.

use serde_json::Value;

use super::{publish, slots, Topic};
use crate::plugin::field::{number_of, Payload};
use crate::plugin::{store, store_field, CycleOutcome, Reading};
use crate::sink::Sink;
use crate::slot::{SlotDescriptor, ValueFormat};

pub const HOME_STATUS_URL: &str = "https://api.netatmo.com/api/homestatus";

const MODULES: &str = "/body/home/modules";

/// Netatmo occasionally reports a station full of zeros. NAMain temperature
/// and humidity are never 0 in practice, so such a response is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroGuard {
    pub enabled: bool,
}

impl ZeroGuard {
    pub fn accepts(self, temperature: f64, humidity: f64) -> bool {
        !self.enabled || (temperature > 0.0 && humidity > 0.0)
    }
}

impl Default for ZeroGuard {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Station {
    Main,
    Outdoor,
    Indoor,
}

impl Station {
    fn module_type(self) -> &'static str {
        match self {
            Station::Main => "NAMain",
            Station::Outdoor => "NAModule1",
            Station::Indoor => "NAModule4",
        }
    }
}

/// Index of each known module type within `body.home.modules`.
#[derive(Debug, Default)]
struct Modules {
    thermostat: Option<usize>,
    main: Option<usize>,
    outdoor: Option<usize>,
    indoor: Option<usize>,
}

impl Modules {
    fn scan(modules: &[Value]) -> Self {
        let mut found = Self::default();
        for (index, module) in modules.iter().enumerate() {
            let entry = match module.get("type").and_then(Value::as_str) {
                Some("NATherm1") => &mut found.thermostat,
                Some("NAMain") => &mut found.main,
                Some("NAModule1") => &mut found.outdoor,
                Some("NAModule4") => &mut found.indoor,
                _ => continue,
            };
            *entry = Some(index);
        }
        found
    }

    fn station(&self, station: Station) -> Option<usize> {
        match station {
            Station::Main => self.main,
            Station::Outdoor => self.outdoor,
            Station::Indoor => self.indoor,
        }
    }
}

fn module_pointer(index: usize, key: &str) -> String {
    format!("{MODULES}/{index}/{key}")
}

struct StationField {
    slot: &'static SlotDescriptor,
    station: Station,
    key: &'static str,
    topic: &'static str,
}

const fn field(
    slot: &'static SlotDescriptor,
    station: Station,
    key: &'static str,
    topic: &'static str,
) -> StationField {
    StationField {
        slot,
        station,
        key,
        topic,
    }
}

const ROOM_FIELDS: [(&SlotDescriptor, &str, &str); 3] = [
    (&slots::THERM_SETP, "therm_setpoint_temperature", "therm_setpoint"),
    (&slots::THERM_TEMP, "therm_measured_temperature", "therm_temp"),
    (&slots::THERM_SETP_MODE, "therm_setpoint_mode", "therm_setpoint_mode"),
];

const STATION_FIELDS: [StationField; 9] = [
    field(&slots::THERM_TEMP_B1, Station::Main, "temperature", "temp_B1"),
    field(&slots::HUMIDITY_B1, Station::Main, "humidity", "hum_B1"),
    field(&slots::CO2_B1, Station::Main, "co2", "co2_B1"),
    field(&slots::BARO_B1, Station::Main, "pressure", "pressure_B1"),
    field(&slots::THERM_TEMP_BU, Station::Outdoor, "temperature", "temp_BU"),
    field(&slots::HUMIDITY_BU, Station::Outdoor, "humidity", "hum_BU"),
    field(&slots::THERM_TEMP_B2, Station::Indoor, "temperature", "temp_B2"),
    field(&slots::HUMIDITY_B2, Station::Indoor, "humidity", "hum_B2"),
    field(&slots::CO2_B2, Station::Indoor, "co2", "co2_B2"),
];

pub fn map_home_status(
    payload: &Payload,
    guard: ZeroGuard,
    sink: &mut dyn Sink,
    outcome: &mut CycleOutcome,
) {
    for (slot, key, topic) in ROOM_FIELDS {
        let pointer = format!("/body/home/rooms/0/{key}");
        if let Some(reading) = store_field(sink, outcome, slot, payload.text(key, &pointer)) {
            publish(sink, Topic::Reading(topic), &reading.to_string());
        }
    }

    let modules = match payload.get("modules", MODULES) {
        Ok(Value::Array(modules)) => Modules::scan(modules),
        Ok(_) => {
            outcome.record(payload.error("modules", format!("{MODULES} is not an array")));
            return;
        }
        Err(err) => {
            outcome.record(err);
            return;
        }
    };

    let main_number = |key: &'static str| {
        modules
            .main
            .and_then(|index| payload.get(key, &module_pointer(index, key)).ok())
            .and_then(number_of)
            .unwrap_or(0.0)
    };
    if !guard.accepts(main_number("temperature"), main_number("humidity")) {
        outcome.note("zero values detected");
        return;
    }

    let boiler = match modules.thermostat {
        Some(index) => payload.text("boiler_status", &module_pointer(index, "boiler_status")),
        None => Ok("Unknown".to_string()),
    };
    if let Some(reading) = store_field(sink, outcome, &slots::THERM_ON, boiler) {
        publish(sink, Topic::Reading("therm_on"), &reading.to_string());
    }

    for station_field in &STATION_FIELDS {
        let reading = match modules.station(station_field.station) {
            Some(index) => {
                let pointer = module_pointer(index, station_field.key);
                match station_field.slot.format {
                    ValueFormat::Integer => {
                        payload.integer(station_field.key, &pointer).map(Reading::from)
                    }
                    ValueFormat::Text | ValueFormat::Pressure => {
                        payload.text(station_field.key, &pointer).map(Reading::from)
                    }
                }
            }
            None => Err(payload.error(
                station_field.key,
                format!("no {} module", station_field.station.module_type()),
            )),
        };
        if let Some(reading) = store_field(sink, outcome, station_field.slot, reading) {
            publish(sink, Topic::Reading(station_field.topic), &reading.to_string());
        }
    }

    // Netatmo no longer reports a trend; keep the slot blank.
    store(sink, outcome, &slots::BARO_TREND_B1, &Reading::Text(String::new()));
    publish(sink, Topic::Reading("pressure_trend_BU"), "");
}
