//! Map overlay primitives for the drone fleet.
//!
//! Works on both the full `DroneUnit` from the snapshot and the lighter
//! `DronePosition` from `/drones/positions` through [`MapSubject`].

use crate::models::farm::{DroneId, DronePosition, DroneStatus, DroneUnit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MarkerColor {
    Active,
    Charging,
    Maintenance,
    Idle,
}

impl MarkerColor {
    pub fn for_status(status: DroneStatus) -> MarkerColor {
        match status {
            DroneStatus::InFlight | DroneStatus::Spraying => MarkerColor::Active,
            DroneStatus::Charging => MarkerColor::Charging,
            DroneStatus::Maintenance => MarkerColor::Maintenance,
            DroneStatus::Idle | DroneStatus::Returning | DroneStatus::Unknown => MarkerColor::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MarkerColor::Active => "active",
            MarkerColor::Charging => "charging",
            MarkerColor::Maintenance => "maintenance",
            MarkerColor::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroneMarker {
    pub drone_id: DroneId,
    pub name: String,
    pub position: LatLng,
    pub color: MarkerColor,
    pub battery_label: String,
    pub payload_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightPath {
    pub drone_id: DroneId,
    pub from: LatLng,
    pub to: LatLng,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetMarker {
    pub drone_id: DroneId,
    pub position: LatLng,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroneProjection {
    pub marker: DroneMarker,
    pub path: Option<FlightPath>,
    pub target: Option<TargetMarker>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOverlay {
    pub markers: Vec<DroneMarker>,
    pub paths: Vec<FlightPath>,
    pub targets: Vec<TargetMarker>,
}

/// Anything that can be drawn as a drone on the map.
pub trait MapSubject {
    fn drone_id(&self) -> &DroneId;
    fn name(&self) -> &str;
    fn status(&self) -> DroneStatus;
    fn battery(&self) -> f64;
    fn payload(&self) -> f64;
    fn position(&self) -> LatLng;
    fn raw_target(&self) -> (Option<f64>, Option<f64>);
}

impl MapSubject for DroneUnit {
    fn drone_id(&self) -> &DroneId {
        &self.id
    }
    fn name(&self) -> &str {
        &self.drone_name
    }
    fn status(&self) -> DroneStatus {
        self.status
    }
    fn battery(&self) -> f64 {
        self.battery_level
    }
    fn payload(&self) -> f64 {
        self.payload_remaining
    }
    fn position(&self) -> LatLng {
        LatLng {
            lat: self.current_lat,
            lng: self.current_lng,
        }
    }
    fn raw_target(&self) -> (Option<f64>, Option<f64>) {
        (self.target_lat, self.target_lng)
    }
}

impl MapSubject for DronePosition {
    fn drone_id(&self) -> &DroneId {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn status(&self) -> DroneStatus {
        self.status
    }
    fn battery(&self) -> f64 {
        self.battery
    }
    fn payload(&self) -> f64 {
        self.payload
    }
    fn position(&self) -> LatLng {
        LatLng {
            lat: self.position[0],
            lng: self.position[1],
        }
    }
    fn raw_target(&self) -> (Option<f64>, Option<f64>) {
        match self.target {
            Some([lat, lng]) => (lat, lng),
            None => (None, None),
        }
    }
}

/// A mission target only counts when both coordinates are present, finite and
/// non-zero; the backend uses `0`/null for "no target".
pub fn mission_target(lat: Option<f64>, lng: Option<f64>) -> Option<LatLng> {
    match (lat, lng) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() && lat != 0.0 && lng != 0.0 => {
            Some(LatLng { lat, lng })
        }
        _ => None,
    }
}

fn percent_label(value: f64) -> String {
    format!("{:.0}%", value.clamp(0.0, 100.0))
}

pub fn project<S: MapSubject>(subject: &S) -> DroneProjection {
    let position = subject.position();
    let marker = DroneMarker {
        drone_id: subject.drone_id().clone(),
        name: subject.name().to_string(),
        position,
        color: MarkerColor::for_status(subject.status()),
        battery_label: percent_label(subject.battery()),
        payload_label: Some(percent_label(subject.payload())),
    };

    let (lat, lng) = subject.raw_target();
    let target = mission_target(lat, lng);
    DroneProjection {
        marker,
        path: target.map(|to| FlightPath {
            drone_id: subject.drone_id().clone(),
            from: position,
            to,
        }),
        target: target.map(|position| TargetMarker {
            drone_id: subject.drone_id().clone(),
            position,
        }),
    }
}

pub fn build_overlay<'a, S, I>(subjects: I) -> MapOverlay
where
    S: MapSubject + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let mut overlay = MapOverlay::default();
    for subject in subjects {
        let DroneProjection { marker, path, target } = project(subject);
        overlay.markers.push(marker);
        overlay.paths.extend(path);
        overlay.targets.extend(target);
    }
    overlay
}
