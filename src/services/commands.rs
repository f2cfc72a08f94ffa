//! Operator commands against the backend.
//!
//! A successful command asks the manager for an immediate re-synchronisation;
//! a failed one is only reported. Displayed entity state is never changed
//! here: the next applied snapshot is the only source of truth.

use log::{debug, info, warn};
use std::num::NonZeroU32;
use std::rc::Rc;

use crate::client::FarmClientError;
use crate::models::farm::{DroneId, IrrigationId};
use crate::services::backend::Backend;
use crate::services::manager::DashboardHandle;

#[derive(Debug)]
pub enum CommandError {
    InvalidArgument(String),
    Backend(FarmClientError),
    /// The dashboard has been torn down.
    Unavailable,
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandError::InvalidArgument(s) => write!(f, "invalid argument: {}", s),
            CommandError::Backend(e) => write!(f, "backend rejected command: {}", e),
            CommandError::Unavailable => write!(f, "dashboard is no longer running"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Backend(e) => Some(e),
            CommandError::InvalidArgument(_) | CommandError::Unavailable => None,
        }
    }
}

impl From<FarmClientError> for CommandError {
    fn from(value: FarmClientError) -> Self {
        CommandError::Backend(value)
    }
}

pub struct CommandDispatcher<B: Backend> {
    backend: Rc<B>,
    dashboard: DashboardHandle,
}

impl<B: Backend> CommandDispatcher<B> {
    pub fn new(backend: Rc<B>, dashboard: DashboardHandle) -> Self {
        CommandDispatcher { backend, dashboard }
    }

    fn ensure_running(&self) -> Result<(), CommandError> {
        if self.dashboard.is_running() {
            Ok(())
        } else {
            Err(CommandError::Unavailable)
        }
    }

    fn resync(&self, what: &str) {
        if !self.dashboard.refresh_after_command() {
            debug!("{}: dashboard already stopped; no refresh requested", what);
        }
    }

    pub async fn activate_irrigation(
        &self,
        id: IrrigationId,
        duration_minutes: NonZeroU32,
    ) -> Result<(), CommandError> {
        self.ensure_running()?;
        let label = format!("activate irrigation {} for {} min", id.0, duration_minutes);
        match self.backend.activate_irrigation(id, duration_minutes).await {
            Ok(()) => {
                info!("Command sent: {}", label);
                self.resync(&label);
                Ok(())
            }
            Err(e) => {
                warn!("Command failed: {}: {}", label, e);
                Err(e.into())
            }
        }
    }

    pub async fn send_drone_mission(
        &self,
        id: DroneId,
        target_lat: f64,
        target_lng: f64,
        payload_type: &str,
    ) -> Result<(), CommandError> {
        validate_target(target_lat, target_lng)?;
        let payload_type = payload_type.trim();
        if payload_type.is_empty() {
            return Err(CommandError::InvalidArgument("payload type must not be empty".to_string()));
        }
        self.ensure_running()?;

        let label = format!(
            "mission for drone {} to ({:.5}, {:.5}) with {}",
            id.0, target_lat, target_lng, payload_type
        );
        match self
            .backend
            .send_drone_mission(id, target_lat, target_lng, payload_type.to_string())
            .await
        {
            Ok(()) => {
                info!("Command sent: {}", label);
                self.resync(&label);
                Ok(())
            }
            Err(e) => {
                warn!("Command failed: {}: {}", label, e);
                Err(e.into())
            }
        }
    }

    /// Asks the backend to generate test data, then re-synchronises.
    pub async fn simulate_data(&self) -> Result<(), CommandError> {
        self.ensure_running()?;
        match self.backend.simulate_data().await {
            Ok(()) => {
                info!("Command sent: simulate data");
                self.resync("simulate data");
                Ok(())
            }
            Err(e) => {
                warn!("Command failed: simulate data: {}", e);
                Err(e.into())
            }
        }
    }
}

fn validate_target(lat: f64, lng: f64) -> Result<(), CommandError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(CommandError::InvalidArgument(format!("latitude out of range: {}", lat)));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(CommandError::InvalidArgument(format!("longitude out of range: {}", lng)));
    }
    if lat == 0.0 && lng == 0.0 {
        return Err(CommandError::InvalidArgument("target (0, 0) means no target".to_string()));
    }
    Ok(())
}
