//! Where readings go: the host's device registry and the optional MQTT
//! mirror.
//!
//! Readers only see the [`Sink`] trait. Failures are reported back so the
//! reader can log them, but a failed write never undoes or retries a cycle.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use log::{debug, info};
use paho_mqtt as mqtt;

use crate::slot::{SlotDescriptor, SlotId};

pub trait Sink {
    fn is_declared(&self, id: SlotId) -> bool;

    fn declare(&mut self, slot: &SlotDescriptor) -> Result<()>;

    fn write(&mut self, id: SlotId, n_value: i64, s_value: &str) -> Result<()>;

    /// Mirror a value to a named topic. A sink without a mirror accepts and
    /// drops the value.
    fn publish(&mut self, topic: &str, payload: &str) -> Result<()>;
}

/// Current state of a declared slot.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub descriptor: SlotDescriptor,
    pub n_value: i64,
    pub s_value: String,
    pub last_update: Option<DateTime<Local>>,
}

/// In-process device registry.
#[derive(Debug, Default)]
pub struct Registry {
    slots: BTreeMap<SlotId, SlotState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SlotId) -> Option<&SlotState> {
        self.slots.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotState> {
        self.slots.values()
    }

    fn declare(&mut self, slot: &SlotDescriptor) {
        info!(
            "creating device {} '{}' (type {}, subtype {}, switchtype {})",
            slot.id, slot.name, slot.type_code, slot.subtype_code, slot.switch_type
        );
        self.slots.insert(
            slot.id,
            SlotState {
                descriptor: slot.clone(),
                n_value: 0,
                s_value: String::new(),
                last_update: None,
            },
        );
    }

    fn update(&mut self, id: SlotId, n_value: i64, s_value: &str) -> Result<()> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or_else(|| anyhow!("device {id} was never created"))?;

        slot.n_value = n_value;
        slot.s_value = s_value.to_string();
        slot.last_update = Some(Local::now());
        info!(
            "update {}: nValue={} sValue='{}'",
            slot.descriptor.name, n_value, s_value
        );
        Ok(())
    }
}

/// Synchronous MQTT client used to mirror readings to a broker.
pub struct MqttMirror {
    client: mqtt::Client,
}

impl MqttMirror {
    const CLIENT_ID: &'static str = "netatmo_to_mqtt";
    const KEEP_ALIVE: Duration = Duration::from_secs(6 * 60);

    pub fn connect(url: &str, user: Option<&str>, password: Option<&str>) -> Result<Self> {
        let create_opts = mqtt::CreateOptionsBuilder::new_v3()
            .server_uri(url)
            .client_id(Self::CLIENT_ID)
            .finalize();

        let client = mqtt::Client::new(create_opts).context("creating MQTT client")?;

        let mut conn_opts = mqtt::ConnectOptionsBuilder::new_v3();
        conn_opts.keep_alive_interval(Self::KEEP_ALIVE);
        if let Some(user) = user {
            conn_opts.user_name(user);
        }
        if let Some(password) = password {
            conn_opts.password(password);
        }

        client
            .connect(conn_opts.finalize())
            .with_context(|| format!("connecting to MQTT broker {url}"))?;
        info!("connected mqtt {url}");

        Ok(Self { client })
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let message = mqtt::Message::new(topic, payload, mqtt::QOS_0);
        self.client.publish(message)?;
        debug!("mqtt data published to {topic}");
        Ok(())
    }
}

impl Drop for MqttMirror {
    fn drop(&mut self) {
        let _ = self.client.disconnect(None);
    }
}

/// The standalone host: a registry plus an optional MQTT mirror.
pub struct DeviceHost {
    registry: Registry,
    mirror: Option<MqttMirror>,
}

impl DeviceHost {
    pub fn new(mirror: Option<MqttMirror>) -> Self {
        Self {
            registry: Registry::new(),
            mirror,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Sink for DeviceHost {
    fn is_declared(&self, id: SlotId) -> bool {
        self.registry.get(id).is_some()
    }

    fn declare(&mut self, slot: &SlotDescriptor) -> Result<()> {
        self.registry.declare(slot);
        Ok(())
    }

    fn write(&mut self, id: SlotId, n_value: i64, s_value: &str) -> Result<()> {
        self.registry.update(id, n_value, s_value)
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        match &self.mirror {
            Some(mirror) => mirror.publish(topic, payload),
            None => Ok(()),
        }
    }
}
