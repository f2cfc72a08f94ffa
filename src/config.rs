//! Runtime configuration from the process environment.
//! Defaults match the backend's local development setup (uvicorn on :8001).

use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;
use std::time::Duration;

use crate::services::manager::PollSettings;

pub const DEFAULT_API_URL: &str = "http://localhost:8001/api";
// Positive defaults are checked at compile time.
pub const DEFAULT_SNAPSHOT_SECS: NonZeroU64 = NonZeroU64::new(30).expect("non-zero");
/// `0` disables the chart poll.
pub const DEFAULT_HISTORICAL_SECS: u64 = 300;
pub const DEFAULT_HISTORICAL_HOURS: NonZeroU32 = NonZeroU32::new(24).expect("non-zero");
/// `0` disables the map poll.
pub const DEFAULT_POSITIONS_SECS: u64 = 10;
pub const DEFAULT_DISPLAY_WINDOW: NonZeroU32 = NonZeroU32::new(7).expect("non-zero");
pub const DEFAULT_FAILURE_THRESHOLD: NonZeroU32 = NonZeroU32::MIN;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: NonZeroU64 = NonZeroU64::new(10).expect("non-zero");
pub const DEFAULT_MISSION_PAYLOAD: &str = "water";

#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL, `/api` prefix included.
    pub api_url: String,
    pub snapshot_interval: Duration,
    /// `None` when `HISTORICAL_INTERVAL_SECS=0`.
    pub historical_interval: Option<Duration>,
    pub historical_hours: NonZeroU32,
    /// `None` when `POSITIONS_INTERVAL_SECS=0`.
    pub positions_interval: Option<Duration>,
    pub display_window: NonZeroU32,
    /// Consecutive snapshot failures before the dashboard shows an error.
    pub failure_threshold: NonZeroU32,
    pub request_timeout: Duration,
    pub simulate_on_start: bool,
    /// Payload used by console missions that don't name one.
    pub mission_payload: String,
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parses a `NonZero*` value; `0` is an error, not "off".
fn positive<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String> {
    match non_empty(lookup, key) {
        Some(s) => s
            .parse::<T>()
            .map_err(|_| format!("{} must be a positive integer, got {:?}", key, s)),
        None => Ok(default),
    }
}

/// `0` turns the poll off.
fn optional_interval(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Option<Duration>, String> {
    let secs = match non_empty(lookup, key) {
        Some(s) => s
            .parse::<u64>()
            .map_err(|_| format!("{} must be a whole number of seconds, got {:?}", key, s))?,
        None => default,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, String> {
    match non_empty(lookup, key).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(format!("{} must be true or false, got {:?}", key, other)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = non_empty(&lookup, "FARM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(format!("FARM_API_URL must be an http(s) URL, got {:?}", api_url));
        }

        let snapshot_secs = positive(&lookup, "SNAPSHOT_INTERVAL_SECS", DEFAULT_SNAPSHOT_SECS)?;
        let historical_interval = optional_interval(&lookup, "HISTORICAL_INTERVAL_SECS", DEFAULT_HISTORICAL_SECS)?;
        let historical_hours = positive(&lookup, "HISTORICAL_HOURS", DEFAULT_HISTORICAL_HOURS)?;
        let positions_interval = optional_interval(&lookup, "POSITIONS_INTERVAL_SECS", DEFAULT_POSITIONS_SECS)?;
        let display_window = positive(&lookup, "SENSOR_DISPLAY_WINDOW", DEFAULT_DISPLAY_WINDOW)?;
        let failure_threshold = positive(&lookup, "SNAPSHOT_FAILURE_THRESHOLD", DEFAULT_FAILURE_THRESHOLD)?;
        let timeout_secs = positive(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let simulate_on_start = flag(&lookup, "SIMULATE_ON_START", false)?;
        let mission_payload =
            non_empty(&lookup, "MISSION_PAYLOAD").unwrap_or_else(|| DEFAULT_MISSION_PAYLOAD.to_string());

        Ok(Config {
            api_url,
            snapshot_interval: Duration::from_secs(snapshot_secs.get()),
            historical_interval,
            historical_hours,
            positions_interval,
            display_window,
            failure_threshold,
            request_timeout: Duration::from_secs(timeout_secs.get()),
            simulate_on_start,
            mission_payload,
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            snapshot_interval: self.snapshot_interval,
            historical_interval: self.historical_interval,
            historical_hours: self.historical_hours,
            positions_interval: self.positions_interval,
            display_window: self.display_window.get() as usize,
            failure_threshold: self.failure_threshold,
        }
    }
}
