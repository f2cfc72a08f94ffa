//! Blocking HTTP client for the farm backend (`/api` prefix).
//!
//! - Blocking client using `ureq`; the async layer wraps it in
//!   `services::backend::HttpBackend`.
//! - Read endpoints: dashboard snapshot, historical series, drone positions.
//! - Mutating endpoints: simulate data, activate irrigation, drone mission.
//!   Their response bodies are not interpreted; callers re-poll instead.
//! - No retries. Every failure is returned to the caller as-is.

use http::Method;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::models::farm::*;

const MAX_ERROR_BODY_CHARS: usize = 512;
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug)]
pub enum FarmClientError {
    /// Transport failure: DNS, connect, timeout, broken body stream.
    Network(String),
    /// The backend answered with a non-2xx status.
    HttpStatus { status: u16, message: String },
    /// A 2xx body that is not the expected JSON: wrong shape, invalid
    /// encoding or over the size limit. `path` is `.` for the whole body.
    MalformedPayload { path: String, message: String },
}

/// Cloneable classification of a [`FarmClientError`] for the view model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    HttpStatus(u16),
    MalformedPayload,
}

impl FarmClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FarmClientError::Network(_) => ErrorKind::Network,
            FarmClientError::HttpStatus { status, .. } => ErrorKind::HttpStatus(*status),
            FarmClientError::MalformedPayload { .. } => ErrorKind::MalformedPayload,
        }
    }
}

impl core::fmt::Display for FarmClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FarmClientError::Network(s) => write!(f, "network error: {}", s),
            FarmClientError::HttpStatus { status, message } => write!(f, "http {}: {}", status, message),
            FarmClientError::MalformedPayload { path, message } => {
                write!(f, "malformed payload at `{}`: {}", path, message)
            }
        }
    }
}

impl std::error::Error for FarmClientError {}

impl From<serde_path_to_error::Error<serde_json::Error>> for FarmClientError {
    fn from(value: serde_path_to_error::Error<serde_json::Error>) -> Self {
        FarmClientError::MalformedPayload {
            path: value.path().to_string(),
            message: value.inner().to_string(),
        }
    }
}

impl From<ureq::Error> for FarmClientError {
    fn from(value: ureq::Error) -> Self {
        FarmClientError::Network(value.to_string())
    }
}

pub struct FarmClient {
    agent: ureq::Agent,
    base_url: String,
}

impl FarmClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        FarmClient {
            agent: config.into(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Raw body bytes of a 2xx response; any other status becomes `HttpStatus`.
    fn read_body(mut res: http::Response<ureq::Body>) -> Result<Vec<u8>, FarmClientError> {
        let status = res.status();
        let body = res.body_mut().with_config().limit(MAX_BODY_BYTES).read_to_vec();
        if status.is_success() {
            return body.map_err(|e| match e {
                ureq::Error::BodyExceedsLimit(limit) => FarmClientError::MalformedPayload {
                    path: ".".to_string(),
                    message: format!("body exceeds {} bytes", limit),
                },
                other => other.into(),
            });
        }
        let message = match body {
            Ok(bytes) if !bytes.trim_ascii().is_empty() => {
                String::from_utf8_lossy(&bytes).chars().take(MAX_ERROR_BODY_CHARS).collect()
            }
            _ => status.canonical_reason().unwrap_or("<no body>").to_string(),
        };
        Err(FarmClientError::HttpStatus {
            status: status.as_u16(),
            message,
        })
    }

    fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, FarmClientError> {
        let de = &mut serde_json::Deserializer::from_slice(body);
        Ok(serde_path_to_error::deserialize(de)?)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, FarmClientError> {
        let mut req = self.agent.get(&self.url(path)).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        let body = Self::read_body(req.call()?)?;
        Self::parse_json(&body)
    }

    /// Sends a body-less mutating request; only the status is checked.
    fn send_command(&self, method: Method, path: &str, query: &[(&str, String)]) -> Result<(), FarmClientError> {
        let url = self.url(path);
        let mut req = if method == Method::PUT {
            self.agent.put(&url)
        } else {
            self.agent.post(&url)
        };
        req = req.header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }
        Self::read_body(req.send_empty()?).map(|_| ())
    }

    pub fn get_dashboard(&self) -> Result<DashboardSnapshot, FarmClientError> {
        self.get_json("/dashboard", &[])
    }

    pub fn get_historical(&self, hours: NonZeroU32) -> Result<HistoricalSeries, FarmClientError> {
        let resp: HistoricalResponse = self.get_json("/sensors/historical", &[("hours", hours.to_string())])?;
        Ok(HistoricalSeries {
            hours: resp.hours.unwrap_or(hours.get()),
            points: resp.data,
        })
    }

    pub fn get_drone_positions(&self) -> Result<DronePositionSet, FarmClientError> {
        let resp: DronePositionsResponse = self.get_json("/drones/positions", &[])?;
        Ok(resp.drones)
    }

    pub fn simulate_data(&self) -> Result<(), FarmClientError> {
        self.send_command(Method::POST, "/simulate-data", &[])
    }

    pub fn activate_irrigation(&self, id: &IrrigationId, duration_minutes: NonZeroU32) -> Result<(), FarmClientError> {
        self.send_command(
            Method::PUT,
            &format!("/irrigation/{}/activate", id.0),
            &[("duration", duration_minutes.to_string())],
        )
    }

    pub fn send_drone_mission(
        &self,
        id: &DroneId,
        target_lat: f64,
        target_lng: f64,
        payload_type: &str,
    ) -> Result<(), FarmClientError> {
        self.send_command(
            Method::PUT,
            &format!("/drones/{}/mission", id.0),
            &[
                ("target_lat", target_lat.to_string()),
                ("target_lng", target_lng.to_string()),
                ("payload_type", payload_type.to_string()),
            ],
        )
    }
}
