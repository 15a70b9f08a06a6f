//! Reader plugins and the contract the host drives them through.
//!
//! Each reader owns its slot table, its poll schedule and whatever vendor
//! state it needs. The host calls the [`Plugin`] hooks; readers write into
//! the [`Sink`] they are handed.
//!
//! ## Adding a reader
//!
//! 1. Create a module next to [`home_assistant`] with a slot table and a
//!    struct implementing [`Plugin`].
//! 2. Fetch through a [`crate::fetch::Transport`], extract with
//!    [`field::Payload`], and write with [`store`].
//! 3. Add a subcommand in `config.rs` and build the reader in `main.rs`.

pub mod field;
pub mod home_assistant;
pub mod netatmo;

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Local};
use log::{debug, error};
use thiserror::Error;

use crate::error::{AuthError, FetchError, MappingError};
use crate::sink::Sink;
use crate::slot::{SlotDescriptor, SlotId, SlotTable, ValueFormat};

pub trait Plugin {
    fn name(&self) -> &str;

    fn slots(&self) -> &SlotTable;

    /// Declare every slot the host does not know yet.
    fn on_start(&mut self, sink: &mut dyn Sink) -> Result<()> {
        debug!("onStart called");
        declare_slots(self.slots(), sink)
    }

    fn on_stop(&mut self, _sink: &mut dyn Sink) {
        debug!("onStop called");
    }

    /// Runs a poll cycle when one is due. Returns its outcome, or `None`
    /// when the tick was not due.
    fn on_heartbeat(&mut self, sink: &mut dyn Sink, now: DateTime<Local>) -> Option<CycleOutcome>;

    /// Readers are read-only; commands are only logged. The standalone
    /// host has no command source, so only an embedding host calls this.
    fn on_command(&mut self, unit: SlotId, command: &str, level: i32) {
        let name = self.slots().get(unit).map_or("unknown", |slot| slot.name);
        debug!("onCommand called for unit {unit} ({name}): parameter '{command}', level: {level}");
    }
}

pub fn declare_slots(slots: &SlotTable, sink: &mut dyn Sink) -> Result<()> {
    for slot in slots.iter() {
        if !sink.is_declared(slot.id) {
            sink.declare(slot)?;
        }
    }
    Ok(())
}

/// Something wrong within one poll cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("no auth token: {0}")]
    Auth(#[from] AuthError),

    #[error("failed {endpoint}: {source}")]
    Fetch {
        endpoint: String,
        #[source]
        source: FetchError,
    },

    #[error("error in data structure: {0}")]
    Mapping(#[from] MappingError),
}

/// What happened during one poll cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub errors: Vec<CycleError>,
    /// Heuristic rejections; logged, but not treated as failures.
    pub diagnostics: Vec<&'static str>,
    pub writes: usize,
}

impl CycleOutcome {
    pub fn record(&mut self, err: impl Into<CycleError>) {
        let err = err.into();
        error!("*** {err}");
        if let CycleError::Mapping(mapping) = &err {
            error!("{}", mapping.payload);
        }
        self.errors.push(err);
    }

    pub fn fetch_failed(&mut self, endpoint: impl Into<String>, source: FetchError) {
        self.record(CycleError::Fetch {
            endpoint: endpoint.into(),
            source,
        });
    }

    pub fn note(&mut self, diagnostic: &'static str) {
        error!("*** {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn found_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A mapped value, before the slot's format is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Text(String),
    Integer(i64),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Text(text) => f.write_str(text),
            Reading::Integer(value) => write!(f, "{value}"),
        }
    }
}

impl From<String> for Reading {
    fn from(text: String) -> Self {
        Reading::Text(text)
    }
}

impl From<i64> for Reading {
    fn from(value: i64) -> Self {
        Reading::Integer(value)
    }
}

/// Render `reading` in the slot's format and write it. Sink failures are
/// logged and otherwise ignored.
pub fn store(
    sink: &mut dyn Sink,
    outcome: &mut CycleOutcome,
    slot: &SlotDescriptor,
    reading: &Reading,
) {
    let n_value = match (slot.format, reading) {
        (ValueFormat::Integer, Reading::Integer(value)) => *value,
        _ => 0,
    };
    let s_value = match slot.format {
        ValueFormat::Pressure => format!("{reading};0"),
        ValueFormat::Text | ValueFormat::Integer => reading.to_string(),
    };

    match sink.write(slot.id, n_value, &s_value) {
        Ok(()) => outcome.writes += 1,
        Err(err) => error!("failed to update {}: {err:#}", slot.name),
    }
}

/// [`store`] a successfully mapped field, or record why it could not be
/// mapped. The slot keeps its previous value in that case.
pub fn store_field<R: Into<Reading>>(
    sink: &mut dyn Sink,
    outcome: &mut CycleOutcome,
    slot: &SlotDescriptor,
    field: Result<R, MappingError>,
) -> Option<Reading> {
    match field {
        Ok(reading) => {
            let reading = reading.into();
            store(sink, outcome, slot, &reading);
            Some(reading)
        }
        Err(err) => {
            outcome.record(err);
            None
        }
    }
}

/// Mirror a value; failures are logged only.
pub fn mirror(sink: &mut dyn Sink, topic: &str, payload: &str) {
    if let Err(err) = sink.publish(topic, payload) {
        error!("failed to publish {topic}: {err:#}");
    }
}
