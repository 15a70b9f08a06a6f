//! Heartbeat loop.
//!
//! Drives one plugin on the calling thread: start it, tick it once per
//! heartbeat until `running` is cleared, then stop it. A slow cycle simply
//! delays the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info, warn};

use crate::plugin::{CycleOutcome, Plugin};
use crate::sink::Sink;

/// Longest uninterrupted sleep, so Ctrl-C is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

pub fn run(
    plugin: &mut dyn Plugin,
    sink: &mut dyn Sink,
    heartbeat: Duration,
    running: &AtomicBool,
) -> Result<()> {
    info!(
        "starting {} reader: {} slots, heartbeat {}s",
        plugin.name(),
        plugin.slots().len(),
        heartbeat.as_secs()
    );
    plugin
        .on_start(sink)
        .with_context(|| format!("starting {} reader", plugin.name()))?;

    while running.load(Ordering::SeqCst) {
        if let Some(outcome) = plugin.on_heartbeat(sink, Local::now()) {
            report(plugin.name(), &outcome);
        }
        pause(heartbeat, running);
    }

    plugin.on_stop(sink);
    info!("{} reader stopped", plugin.name());
    Ok(())
}

fn report(name: &str, outcome: &CycleOutcome) {
    if outcome.found_error() {
        warn!(
            "{name}: cycle finished with {} error(s), {} slot(s) updated",
            outcome.errors.len(),
            outcome.writes
        );
    } else {
        debug!("{name}: {} slot(s) updated", outcome.writes);
    }
}

fn pause(heartbeat: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + heartbeat;
    while running.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(SLEEP_SLICE));
    }
}
