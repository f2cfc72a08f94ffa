//! Historical series → per-metric line chart data.
//!
//! Points are expected in chronological order from the backend and are never
//! re-sorted here; an out-of-order input is logged and passed through as-is.
//! A metric missing from a bucket becomes a gap (`None`), not a zero.

use chrono::{DateTime, Utc};
use log::warn;
use std::collections::BTreeSet;

use crate::models::farm::{HistoricalSeries, SensorType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub at: DateTime<Utc>,
    /// Hours since the first point of the window.
    pub offset_hours: f64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub key: String,
    pub sensor_type: SensorType,
    pub display_name: String,
    pub points: Vec<ChartPoint>,
}

#[cfg(test)]
impl ChartSeries {
    pub fn gap_count(&self) -> usize {
        self.points.iter().filter(|p| p.value.is_none()).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartData {
    pub hours: u32,
    pub origin: Option<DateTime<Utc>>,
    pub series: Vec<ChartSeries>,
}

#[cfg(test)]
impl ChartData {
    pub fn series(&self, sensor_type: SensorType) -> Option<&ChartSeries> {
        self.series.iter().find(|s| s.sensor_type == sensor_type)
    }
}

/// Known sensor kinds first in their display order, then any other key by name.
fn series_keys(input: &HistoricalSeries) -> Vec<String> {
    let present: BTreeSet<&str> = input
        .points
        .iter()
        .flat_map(|p| p.metrics.keys().map(String::as_str))
        .collect();

    let mut keys: Vec<String> = SensorType::KNOWN
        .iter()
        .map(|t| t.key())
        .filter(|k| present.contains(k))
        .map(str::to_string)
        .collect();
    keys.extend(
        present
            .iter()
            .filter(|k| SensorType::from_key(k) == SensorType::Unknown)
            .map(|k| k.to_string()),
    );
    keys
}

pub fn adapt(input: &HistoricalSeries) -> ChartData {
    let origin = input.points.first().map(|p| p.time);
    let inversions = input.points.windows(2).filter(|w| w[1].time < w[0].time).count();
    if inversions > 0 {
        warn!(
            "Historical series ({}h) is not chronological ({} inversion(s)); charting in received order",
            input.hours, inversions
        );
    }

    let series = series_keys(input)
        .into_iter()
        .map(|key| {
            let sensor_type = SensorType::from_key(&key);
            let display_name = match sensor_type {
                SensorType::Unknown => key.clone(),
                known => known.display_name().to_string(),
            };
            let points = input
                .points
                .iter()
                .map(|p| ChartPoint {
                    at: p.time,
                    offset_hours: origin
                        .map(|o| (p.time - o).num_milliseconds() as f64 / 3_600_000.0)
                        .unwrap_or(0.0),
                    value: p.metrics.get(&key).copied().flatten(),
                })
                .collect();
            ChartSeries {
                key,
                sensor_type,
                display_name,
                points,
            }
        })
        .collect();

    ChartData {
        hours: input.hours,
        origin,
        series,
    }
}
