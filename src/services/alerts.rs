//! Alert classification of sensor readings.
//!
//! Bands per sensor kind. Critical edges are inclusive (a reading exactly on a
//! critical cutoff is critical); warning edges are exclusive. Unknown kinds
//! are always `Normal` so new sensor types from the backend never break the
//! dashboard.

use crate::models::farm::{AlertLevel, SensorReading, SensorType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub critical_low: Option<f64>,
    pub warning_low: Option<f64>,
    pub warning_high: Option<f64>,
    pub critical_high: Option<f64>,
}

impl Thresholds {
    const NONE: Thresholds = Thresholds {
        critical_low: None,
        warning_low: None,
        warning_high: None,
        critical_high: None,
    };

    fn level(&self, value: f64) -> AlertLevel {
        let below = |edge: Option<f64>, inclusive: bool| match edge {
            Some(t) if inclusive => value <= t,
            Some(t) => value < t,
            None => false,
        };
        let above = |edge: Option<f64>, inclusive: bool| match edge {
            Some(t) if inclusive => value >= t,
            Some(t) => value > t,
            None => false,
        };

        if below(self.critical_low, true) || above(self.critical_high, true) {
            AlertLevel::Critical
        } else if below(self.warning_low, false) || above(self.warning_high, false) {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

pub fn thresholds(sensor_type: SensorType) -> Thresholds {
    match sensor_type {
        // Dry soil is critical; waterlogged soil only warns.
        SensorType::SoilMoisture => Thresholds {
            critical_low: Some(20.0),
            warning_low: Some(30.0),
            warning_high: Some(85.0),
            critical_high: None,
        },
        SensorType::NutrientN | SensorType::NutrientP | SensorType::NutrientK => Thresholds {
            critical_low: Some(25.0),
            warning_low: Some(40.0),
            ..Thresholds::NONE
        },
        SensorType::PhLevel => Thresholds {
            critical_low: Some(5.0),
            warning_low: Some(6.0),
            warning_high: Some(7.0),
            critical_high: Some(8.0),
        },
        SensorType::Temperature => Thresholds {
            critical_low: Some(5.0),
            warning_low: Some(12.0),
            warning_high: Some(35.0),
            critical_high: Some(40.0),
        },
        SensorType::Humidity => Thresholds {
            critical_low: Some(20.0),
            warning_low: Some(35.0),
            warning_high: Some(90.0),
            critical_high: None,
        },
        SensorType::Unknown => Thresholds::NONE,
    }
}

pub fn classify(sensor_type: SensorType, value: f64) -> AlertLevel {
    thresholds(sensor_type).level(value)
}

pub fn classify_reading(reading: &SensorReading) -> AlertLevel {
    classify(reading.sensor_type, reading.value)
}
