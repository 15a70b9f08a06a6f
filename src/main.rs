//! sensor-readers: polls a home-automation vendor API and keeps a set of
//! host slots up to date.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐ on_heartbeat ┌───────────────┐ get/post ┌──────────┐
//! │ host.rs  │ ───────────► │   plugin/*    │ ───────► │ fetch.rs │
//! │  (loop)  │              │ (map + store) │          │ (HTTP)   │
//! └──────────┘              └───────────────┘          └──────────┘
//!                                  │ write/publish
//!                                  ▼
//!                            ┌───────────┐
//!                            │  sink.rs  │  registry + MQTT mirror
//!                            └───────────┘
//! ```
//!
//! * **`plugin/`**: the `Plugin` trait and the two readers (Home Assistant,
//!   Netatmo), each with its own slot table.
//! * **`fetch`**: blocking HTTP with bearer auth and JSON sniffing.
//! * **`schedule`**: decides which heartbeat ticks run a poll cycle.
//! * **`sink`**: the device registry and the optional MQTT mirror.
//! * **`host`**: the heartbeat loop.
//! * **`main`**: wires everything together: parse args, set up logging,
//!   build the reader, and run until Ctrl-C.

mod config;
mod error;
mod fetch;
mod host;
mod plugin;
mod schedule;
mod sink;
mod slot;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};

use config::{Cli, MqttArgs, PollInterval, Reader};
use fetch::HttpTransport;
use plugin::home_assistant::HomeAssistantReader;
use plugin::netatmo::NetatmoReader;
use plugin::Plugin;
use sink::{DeviceHost, MqttMirror};

fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .init();
}

/// A broker that cannot be reached only disables mirroring.
fn connect_mirror(args: &MqttArgs) -> Option<MqttMirror> {
    let url = args.mqtt_url.as_deref()?;
    match MqttMirror::connect(url, args.mqtt_user.as_deref(), args.mqtt_pass.as_deref()) {
        Ok(mirror) => Some(mirror),
        Err(err) => {
            error!("MQTT mirror disabled: {err:#}");
            None
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.debug);
    debug!("{cli:#?}");

    let interval = PollInterval::from_config(&cli.poll_interval);
    let heartbeat = Duration::from_secs(cli.heartbeat_secs.max(1));

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        flag.store(false, Ordering::SeqCst);
    })?;

    let transport = HttpTransport::new()?;
    let now = Local::now();

    let (mut reader, mirror): (Box<dyn Plugin>, _) = match cli.reader {
        Reader::HomeAssistant(args) => {
            let reader = HomeAssistantReader::new(transport, args, interval, now);
            (Box::new(reader) as Box<dyn Plugin>, None)
        }
        Reader::Netatmo(args) => {
            let mirror = connect_mirror(&args.mqtt);
            let reader = NetatmoReader::new(transport, args, interval, now);
            (Box::new(reader) as Box<dyn Plugin>, mirror)
        }
    };

    let mut host = DeviceHost::new(mirror);
    host::run(reader.as_mut(), &mut host, heartbeat, &running)?;

    for slot in host.registry().iter() {
        match slot.last_update {
            Some(at) => info!(
                "{}: '{}' (updated {})",
                slot.descriptor.name,
                slot.s_value,
                at.format("%Y-%m-%dT%H:%M:%S")
            ),
            None => info!("{}: never updated", slot.descriptor.name),
        }
    }
    Ok(())
}
