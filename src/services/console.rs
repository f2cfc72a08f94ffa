//! Line-oriented operator console on stdin, plus a log line for every
//! published view-model change.

use log::{info, warn};
use rand::Rng;
use std::num::NonZeroU32;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::config::Config;
use crate::models::farm::{DroneId, IrrigationId};
use crate::services::backend::Backend;
use crate::services::commands::CommandDispatcher;
use crate::services::manager::DashboardHandle;
use crate::services::state::ViewModel;
use crate::utils::serde_enum_name;

/// Field headquarters; random mission targets are drawn around it.
pub const SITE_CENTER: (f64, f64) = (-6.2088, 106.8456);
const TARGET_JITTER_DEG: f64 = 0.005;
const DEFAULT_ACTIVATION_MINUTES: u32 = 15;

const HELP: &str = "commands: refresh | simulate | activate <irrigation-id> [minutes] | \
                    mission <drone-id> [lat lng [payload]] | status | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Refresh,
    Simulate,
    Activate {
        id: IrrigationId,
        minutes: NonZeroU32,
    },
    Mission {
        id: DroneId,
        target: Option<(f64, f64)>,
        payload: Option<String>,
    },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    /// stdin closed; the dashboard keeps polling.
    InputClosed,
}

fn parse_coord(raw: &str, what: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("{} must be a number, got {:?}", what, raw))
}

/// `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("refresh" | "r", []) => ConsoleCommand::Refresh,
        ("simulate", []) => ConsoleCommand::Simulate,
        ("status" | "s", []) => ConsoleCommand::Status,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit" | "q", []) => ConsoleCommand::Quit,
        ("activate", [id]) => ConsoleCommand::Activate {
            id: IrrigationId(id.to_string()),
            minutes: NonZeroU32::new(DEFAULT_ACTIVATION_MINUTES).unwrap_or(NonZeroU32::MIN),
        },
        ("activate", [id, minutes]) => ConsoleCommand::Activate {
            id: IrrigationId(id.to_string()),
            minutes: minutes
                .parse::<NonZeroU32>()
                .map_err(|_| format!("minutes must be a positive integer, got {:?}", minutes))?,
        },
        ("mission", [id]) => ConsoleCommand::Mission {
            id: DroneId(id.to_string()),
            target: None,
            payload: None,
        },
        ("mission", [id, lat, lng, rest @ ..]) if rest.len() <= 1 => ConsoleCommand::Mission {
            id: DroneId(id.to_string()),
            target: Some((parse_coord(lat, "latitude")?, parse_coord(lng, "longitude")?)),
            payload: rest.first().map(|p| p.to_string()),
        },
        (
            verb @ ("refresh" | "r" | "simulate" | "status" | "s" | "quit" | "exit" | "q" | "activate" | "mission"),
            _,
        ) => {
            return Err(format!("wrong arguments for `{}`; {}", verb, HELP));
        }
        (other, _) => return Err(format!("unknown command `{}`; {}", other, HELP)),
    };
    Ok(Some(cmd))
}

/// A target a few hundred metres around the site.
pub fn random_target<R: Rng>(rng: &mut R) -> (f64, f64) {
    (
        SITE_CENTER.0 + rng.random_range(-TARGET_JITTER_DEG..TARGET_JITTER_DEG),
        SITE_CENTER.1 + rng.random_range(-TARGET_JITTER_DEG..TARGET_JITTER_DEG),
    )
}

/// One-line digest of the view model.
pub fn summarize(view: &ViewModel) -> String {
    let mut parts = vec![format!("phase={}", format!("{:?}", view.phase).to_lowercase())];

    if let Some(s) = view.snapshot.as_deref() {
        let snap = &s.snapshot;
        parts.push(format!(
            "snapshot={} zones={} irrigating={} drones_active={} critical_alerts={}",
            s.generation, snap.total_zones, snap.active_irrigations, snap.drones_active, snap.critical_alerts
        ));
        parts.push(format!(
            "readings={} (normal={} warning={} critical={})",
            s.display_readings().len(),
            s.alert_counts.normal,
            s.alert_counts.warning,
            s.alert_counts.critical
        ));
    }
    if let Some(h) = view.history.as_deref() {
        parts.push(format!("chart={}h/{}series", h.chart.hours, h.chart.series.len()));
    }
    if let Some(overlay) = view.map_overlay() {
        parts.push(format!("map={}markers/{}paths", overlay.markers.len(), overlay.paths.len()));
    }
    if view.snapshot_in_flight {
        parts.push("fetching".to_string());
    }
    if let Some(e) = &view.error {
        parts.push(format!("error=\"{}\"", e.message));
    }
    if let Some(e) = &view.history_error {
        parts.push(format!("chart_error=\"{}\"", e.message));
    }
    if let Some(e) = &view.positions_error {
        parts.push(format!("map_error=\"{}\"", e.message));
    }
    parts.join(" ")
}

/// Per-entity listing for the `status` command.
pub fn describe_entities(view: &ViewModel) -> Vec<String> {
    let Some(s) = view.snapshot.as_deref() else {
        return vec!["no snapshot yet".to_string()];
    };
    let mut lines = Vec::new();
    for r in s.display_readings() {
        lines.push(format!(
            "reading {} {}{} [{}] at {}",
            r.reading.sensor_type.display_name(),
            r.reading.value,
            r.reading.unit,
            serde_enum_name(&r.alert_level).unwrap_or_default(),
            r.reading.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    for z in &s.snapshot.irrigation_systems {
        lines.push(format!(
            "irrigation {} zone={} status={} flow={}L/min{}",
            z.id.0,
            z.zone_id.0,
            serde_enum_name(&z.status).unwrap_or_default(),
            z.flow_rate,
            if view.can_activate(&z.id) { " (can activate)" } else { "" }
        ));
    }
    for d in &s.snapshot.drone_fleet {
        lines.push(format!(
            "drone {} ({}) status={} battery={:.0}% payload={:.0}%{}",
            d.id.0,
            d.drone_name,
            serde_enum_name(&d.status).unwrap_or_default(),
            d.battery_level,
            d.payload_remaining,
            if view.can_dispatch(&d.id) { " (can dispatch)" } else { "" }
        ));
    }
    lines
}

/// Logs a summary whenever the published view changes. Ends when the
/// manager is dropped.
pub async fn log_view_changes(mut rx: watch::Receiver<ViewModel>) {
    let mut last = String::new();
    while rx.changed().await.is_ok() {
        let line = summarize(&rx.borrow_and_update());
        if line != last {
            info!("Dashboard: {}", line);
            last = line;
        }
    }
}

async fn execute<B: Backend>(
    cmd: ConsoleCommand,
    handle: &DashboardHandle,
    dispatcher: &CommandDispatcher<B>,
    cfg: &Config,
) -> Option<ConsoleExit> {
    match cmd {
        ConsoleCommand::Refresh => {
            if !handle.refresh() {
                warn!("Dashboard is not running");
            }
        }
        ConsoleCommand::Simulate => {
            if let Err(e) = dispatcher.simulate_data().await {
                warn!("simulate: {}", e);
            }
        }
        ConsoleCommand::Activate { id, minutes } => {
            if !handle.view().can_activate(&id) {
                warn!("Irrigation {} is unknown or not idle; not activating", id.0);
            } else if let Err(e) = dispatcher.activate_irrigation(id, minutes).await {
                warn!("activate: {}", e);
            }
        }
        ConsoleCommand::Mission { id, target, payload } => {
            if !handle.view().can_dispatch(&id) {
                warn!("Drone {} is unknown or not idle; not dispatching", id.0);
            } else {
                let (lat, lng) = target.unwrap_or_else(|| random_target(&mut rand::rng()));
                let payload = payload.as_deref().unwrap_or(&cfg.mission_payload);
                if let Err(e) = dispatcher.send_drone_mission(id, lat, lng, payload).await {
                    warn!("mission: {}", e);
                }
            }
        }
        ConsoleCommand::Status => {
            let view = handle.view();
            info!("{}", summarize(&view));
            for line in describe_entities(&view) {
                info!("  {}", line);
            }
        }
        ConsoleCommand::Help => info!("{}", HELP),
        ConsoleCommand::Quit => return Some(ConsoleExit::Quit),
    }
    None
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run<B: Backend>(handle: &DashboardHandle, dispatcher: &CommandDispatcher<B>, cfg: &Config) -> ConsoleExit {
    info!("Console ready; {}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ConsoleExit::InputClosed,
            Err(e) => {
                warn!("Reading stdin failed: {}", e);
                return ConsoleExit::InputClosed;
            }
        };
        match parse_command(&line) {
            Ok(Some(cmd)) => {
                if let Some(exit) = execute(cmd, handle, dispatcher, cfg).await {
                    return exit;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }
    }
}
