//! Wire models for the farm backend's `/api` surface.
//!
//! Types only; no client or derivation code here.
//!
//! Notes
//! - Enum fields carry an `Unknown` catch-all so that a new kind added by the
//!   backend does not fail a whole snapshot.
//! - Timestamps go through `utils::lenient_utc` (offset-less values are UTC).
//! - The backend's own `alert_level` on readings is ignored; alert levels are
//!   recomputed on ingest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::lenient_utc;

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IrrigationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(pub String);

// =====================
// Enums
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    SoilMoisture,
    NutrientN,
    NutrientP,
    NutrientK,
    PhLevel,
    Temperature,
    Humidity,
    #[serde(other)]
    Unknown,
}

impl SensorType {
    /// Every kind the dashboard knows how to classify and chart, in display order.
    pub const KNOWN: [SensorType; 7] = [
        SensorType::SoilMoisture,
        SensorType::NutrientN,
        SensorType::NutrientP,
        SensorType::NutrientK,
        SensorType::PhLevel,
        SensorType::Temperature,
        SensorType::Humidity,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SensorType::SoilMoisture => "soil_moisture",
            SensorType::NutrientN => "nutrient_n",
            SensorType::NutrientP => "nutrient_p",
            SensorType::NutrientK => "nutrient_k",
            SensorType::PhLevel => "ph_level",
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Unknown => "unknown",
        }
    }

    pub fn from_key(key: &str) -> SensorType {
        SensorType::KNOWN
            .into_iter()
            .find(|t| t.key() == key)
            .unwrap_or(SensorType::Unknown)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SensorType::SoilMoisture => "Soil Moisture",
            SensorType::NutrientN => "Nitrogen (N)",
            SensorType::NutrientP => "Phosphorus (P)",
            SensorType::NutrientK => "Potassium (K)",
            SensorType::PhLevel => "Soil pH",
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Air Humidity",
            SensorType::Unknown => "Other",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationStatus {
    Idle,
    Active,
    Scheduled,
    Maintenance,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    Idle,
    InFlight,
    Spraying,
    Returning,
    Charging,
    Maintenance,
    #[serde(other)]
    Unknown,
}

// =====================
// Entities
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default)]
    pub id: Option<ReadingId>,
    #[serde(default)]
    pub zone_id: Option<ZoneId>,
    pub sensor_type: SensorType,
    pub value: f64,
    pub unit: String,
    #[serde(with = "lenient_utc")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationZone {
    pub id: IrrigationId,
    pub zone_id: ZoneId,
    pub status: IrrigationStatus,
    #[serde(default)]
    pub fertilizer_type: Option<String>,
    /// Litres per minute.
    pub flow_rate: f64,
    /// Minutes requested by the last activation.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default, with = "lenient_utc::option")]
    pub last_activated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneUnit {
    pub id: DroneId,
    pub drone_name: String,
    pub status: DroneStatus,
    /// Percentage, 0..=100.
    pub battery_level: f64,
    pub current_lat: f64,
    pub current_lng: f64,
    #[serde(default)]
    pub target_lat: Option<f64>,
    #[serde(default)]
    pub target_lng: Option<f64>,
    #[serde(default)]
    pub payload_type: Option<String>,
    /// Percentage, 0..=100.
    pub payload_remaining: f64,
    #[serde(default, with = "lenient_utc::option")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// One complete poll of `GET /dashboard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub total_zones: u32,
    pub active_irrigations: u32,
    pub drones_active: u32,
    pub critical_alerts: u64,
    /// Most recent first.
    pub recent_sensor_data: Vec<SensorReading>,
    pub irrigation_systems: Vec<IrrigationZone>,
    pub drone_fleet: Vec<DroneUnit>,
}

impl DashboardSnapshot {
    pub fn irrigation(&self, id: &IrrigationId) -> Option<&IrrigationZone> {
        self.irrigation_systems.iter().find(|z| &z.id == id)
    }

    pub fn drone(&self, id: &DroneId) -> Option<&DroneUnit> {
        self.drone_fleet.iter().find(|d| &d.id == id)
    }
}

// =====================
// Historical series
// =====================

/// One hourly bucket: averages keyed by sensor type name. A metric missing
/// from the bucket (or sent as null) is a gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    #[serde(with = "lenient_utc")]
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalResponse {
    pub data: Vec<HistoricalPoint>,
    #[serde(default)]
    pub hours: Option<u32>,
    #[serde(default)]
    pub zone_id: Option<ZoneId>,
}

/// Chronologically ordered points covering the requested look-back window.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    pub hours: u32,
    pub points: Vec<HistoricalPoint>,
}

// =====================
// Drone positions
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DronePosition {
    pub id: DroneId,
    pub name: String,
    pub status: DroneStatus,
    pub battery: f64,
    pub payload: f64,
    #[serde(default)]
    pub payload_type: Option<String>,
    /// `[lat, lng]`
    pub position: [f64; 2],
    /// `[lat, lng]`, either side may be null.
    #[serde(default)]
    pub target: Option<[Option<f64>; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DronePositionsResponse {
    pub drones: Vec<DronePosition>,
    #[serde(default, with = "lenient_utc::option")]
    pub last_updated: Option<DateTime<Utc>>,
}

pub type DronePositionSet = Vec<DronePosition>;
