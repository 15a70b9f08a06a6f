//! Sensor slot declarations.
//!
//! A slot is a value holder owned by the home-automation host. Each reader
//! declares its slots once at start-up and afterwards only updates them.

use std::collections::BTreeMap;

/// Host-side unit number of a slot.
pub type SlotId = u8;

/// How a reading is rendered into the slot's `(n_value, s_value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// `s_value` is the reading's text, `n_value` stays 0.
    Text,
    /// Both `n_value` and `s_value` carry the integer reading.
    Integer,
    /// Barometer encoding: `"<hPa>;<forecast>"` with forecast 0.
    Pressure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDescriptor {
    pub id: SlotId,
    pub name: &'static str,
    pub type_code: u8,
    pub subtype_code: u8,
    pub switch_type: u8,
    pub format: ValueFormat,
}

impl SlotDescriptor {
    pub const fn new(
        id: SlotId,
        name: &'static str,
        (type_code, subtype_code): (u8, u8),
        format: ValueFormat,
    ) -> Self {
        Self {
            id,
            name,
            type_code,
            subtype_code,
            switch_type: 0,
            format,
        }
    }
}

/// Host device `(type, subtype)` codes used by the readers.
pub mod kind {
    pub const TEMPERATURE: (u8, u8) = (80, 5);
    pub const HUMIDITY: (u8, u8) = (81, 1);
    pub const SETPOINT: (u8, u8) = (242, 1);
    pub const TEXT: (u8, u8) = (243, 19);
    pub const BAROMETER: (u8, u8) = (243, 26);
    pub const AIR_QUALITY: (u8, u8) = (249, 1);
}

/// All slots of one reader, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: BTreeMap<SlotId, SlotDescriptor>,
}

impl SlotTable {
    pub fn get(&self, id: SlotId) -> Option<&SlotDescriptor> {
        self.slots.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotDescriptor> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

impl FromIterator<SlotDescriptor> for SlotTable {
    fn from_iter<I: IntoIterator<Item = SlotDescriptor>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(|slot| (slot.id, slot)).collect(),
        }
    }
}
