//! Dashboard view model and the synchronous state machine that owns it.
//!
//! ```text
//! Idle ──begin──▶ Loading ──ok──▶ Ready ──begin──▶ Refreshing ──ok──▶ Ready
//!                    │                                  │
//!                    └──────────err──▶ Error ◀──err─────┘
//! ```
//!
//! Every fetch carries a [`Generation`]. A completion is applied only if its
//! generation is newer than the last one applied for the same slice, so an
//! older fetch finishing late can never overwrite a newer result. Only one
//! fetch per slice is outstanding at a time; further requests are coalesced.
//! The async driver lives in `services::manager`.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::client::{ErrorKind, FarmClientError};
use crate::models::farm::{
    AlertLevel, DashboardSnapshot, DroneId, DronePositionSet, DroneStatus, HistoricalSeries, IrrigationId,
    IrrigationStatus, SensorReading, SensorType,
};
use crate::services::alerts::classify_reading;
use crate::services::backend::FetchResult;
use crate::services::geo::{MapOverlay, build_overlay};
use crate::services::series::{ChartData, adapt};

// =====================
// Sequencing
// =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl core::fmt::Display for Generation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues monotonically increasing generations and remembers the newest one
/// applied (last writer by sequence, not by completion time).
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
    applied: u64,
}

impl Sequencer {
    pub fn issue(&mut self) -> Generation {
        self.issued += 1;
        Generation(self.issued)
    }

    pub fn accept(&mut self, generation: Generation) -> bool {
        if generation.0 > self.applied {
            self.applied = generation.0;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn latest_applied(&self) -> Option<Generation> {
        (self.applied > 0).then_some(Generation(self.applied))
    }
}

#[derive(Debug, Default)]
struct FetchSlot {
    sequencer: Sequencer,
    outstanding: Option<Generation>,
}

impl FetchSlot {
    fn begin(&mut self) -> Option<Generation> {
        if self.outstanding.is_some() {
            return None;
        }
        let generation = self.sequencer.issue();
        self.outstanding = Some(generation);
        Some(generation)
    }

    fn settle(&mut self, generation: Generation) -> bool {
        if self.outstanding == Some(generation) {
            self.outstanding = None;
        }
        self.sequencer.accept(generation)
    }

    fn is_busy(&self) -> bool {
        self.outstanding.is_some()
    }
}

// =====================
// View model
// =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Startup,
    Scheduled,
    Manual,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing fetched yet.
    Idle,
    /// First snapshot fetch outstanding.
    Loading,
    Ready,
    /// A snapshot is shown while a newer one is being fetched.
    Refreshing,
    /// Snapshot fetches are failing; the last good snapshot (if any) is kept.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl DashboardError {
    fn from_client(err: &FarmClientError, at: DateTime<Utc>) -> Self {
        DashboardError {
            kind: err.kind(),
            message: err.to_string(),
            at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedReading {
    pub reading: SensorReading,
    pub alert_level: AlertLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertCounts {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotView {
    pub generation: Generation,
    pub received_at: DateTime<Utc>,
    /// The payload exactly as received.
    pub snapshot: DashboardSnapshot,
    /// Every reading of `recent_sensor_data` with its alert level, same order.
    pub readings: Vec<ClassifiedReading>,
    pub display_window: usize,
    /// Counts over the display window only.
    pub alert_counts: AlertCounts,
    pub overlay: MapOverlay,
}

impl SnapshotView {
    fn derive(generation: Generation, snapshot: DashboardSnapshot, display_window: usize, now: DateTime<Utc>) -> Self {
        let readings: Vec<ClassifiedReading> = snapshot
            .recent_sensor_data
            .iter()
            .map(|reading| ClassifiedReading {
                reading: reading.clone(),
                alert_level: classify_reading(reading),
            })
            .collect();

        let unknown = readings
            .iter()
            .filter(|r| r.reading.sensor_type == SensorType::Unknown)
            .count();
        if unknown > 0 {
            warn!(
                "Snapshot {}: {} reading(s) of an unknown sensor type classified as normal",
                generation, unknown
            );
        }

        let mut alert_counts = AlertCounts::default();
        for r in readings.iter().take(display_window) {
            match r.alert_level {
                AlertLevel::Normal => alert_counts.normal += 1,
                AlertLevel::Warning => alert_counts.warning += 1,
                AlertLevel::Critical => alert_counts.critical += 1,
            }
        }

        let overlay = build_overlay(&snapshot.drone_fleet);
        SnapshotView {
            generation,
            received_at: now,
            snapshot,
            readings,
            display_window,
            alert_counts,
            overlay,
        }
    }

    /// The leading readings shown on the dashboard, in backend order.
    pub fn display_readings(&self) -> &[ClassifiedReading] {
        let end = self.display_window.min(self.readings.len());
        &self.readings[..end]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    pub generation: Generation,
    pub received_at: DateTime<Utc>,
    pub chart: ChartData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionsView {
    pub generation: Generation,
    pub received_at: DateTime<Utc>,
    pub drones: DronePositionSet,
    pub overlay: MapOverlay,
}

/// Everything the presentation layer reads. Cloning is cheap; slices are
/// shared and replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub phase: Phase,
    pub snapshot: Option<Arc<SnapshotView>>,
    pub history: Option<Arc<HistoryView>>,
    pub positions: Option<Arc<PositionsView>>,
    pub error: Option<DashboardError>,
    pub history_error: Option<DashboardError>,
    pub positions_error: Option<DashboardError>,
    pub snapshot_in_flight: bool,
}

impl Default for ViewModel {
    fn default() -> Self {
        ViewModel {
            phase: Phase::Idle,
            snapshot: None,
            history: None,
            positions: None,
            error: None,
            history_error: None,
            positions_error: None,
            snapshot_in_flight: false,
        }
    }
}

impl ViewModel {
    /// Live positions when available, otherwise the fleet from the snapshot.
    pub fn map_overlay(&self) -> Option<&MapOverlay> {
        self.positions
            .as_deref()
            .map(|p| &p.overlay)
            .or_else(|| self.snapshot.as_deref().map(|s| &s.overlay))
    }

    /// Only a zone shown as idle by the last applied snapshot accepts a new
    /// activation.
    pub fn can_activate(&self, id: &IrrigationId) -> bool {
        self.snapshot
            .as_deref()
            .and_then(|s| s.snapshot.irrigation(id))
            .is_some_and(|z| z.status == IrrigationStatus::Idle)
    }

    /// Only an idle drone accepts a new mission.
    pub fn can_dispatch(&self, id: &DroneId) -> bool {
        self.snapshot
            .as_deref()
            .and_then(|s| s.snapshot.drone(id))
            .is_some_and(|d| d.status == DroneStatus::Idle)
    }
}

// =====================
// State machine
// =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// A newer generation was already applied; the result was dropped.
    Stale,
    /// The state was torn down; the result was dropped.
    Discarded,
}

#[derive(Debug)]
pub struct DashboardState {
    display_window: usize,
    failure_threshold: NonZeroU32,
    view: ViewModel,
    snapshot: FetchSlot,
    history: FetchSlot,
    positions: FetchSlot,
    consecutive_failures: u32,
    follow_up: bool,
    torn_down: bool,
}

impl DashboardState {
    pub fn new(display_window: usize, failure_threshold: NonZeroU32) -> Self {
        DashboardState {
            display_window,
            failure_threshold,
            view: ViewModel::default(),
            snapshot: FetchSlot::default(),
            history: FetchSlot::default(),
            positions: FetchSlot::default(),
            consecutive_failures: 0,
            follow_up: false,
            torn_down: false,
        }
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Starts a snapshot fetch, or returns `None` when one is already
    /// outstanding. A coalesced command refresh is remembered and handed out
    /// by [`take_follow_up`](Self::take_follow_up) once the outstanding fetch
    /// completes.
    pub fn begin_snapshot(&mut self, reason: RefreshReason) -> Option<Generation> {
        if self.torn_down {
            return None;
        }
        let Some(generation) = self.snapshot.begin() else {
            if reason == RefreshReason::Command {
                self.follow_up = true;
            }
            debug!("Snapshot: {:?} refresh coalesced into the outstanding fetch", reason);
            return None;
        };
        self.view.phase = match self.view.phase {
            Phase::Idle | Phase::Loading => Phase::Loading,
            Phase::Ready | Phase::Refreshing => Phase::Refreshing,
            Phase::Error => Phase::Error,
        };
        self.view.snapshot_in_flight = true;
        debug!("Snapshot: fetch {} started ({:?})", generation, reason);
        Some(generation)
    }

    pub fn take_follow_up(&mut self) -> bool {
        std::mem::take(&mut self.follow_up)
    }

    /// Phase once no snapshot fetch is outstanding and nothing new arrived.
    fn settled_phase(&self) -> Phase {
        match (self.view.phase, self.view.snapshot.is_some()) {
            (Phase::Error, _) => Phase::Error,
            (_, true) => Phase::Ready,
            (_, false) => Phase::Idle,
        }
    }

    pub fn apply_snapshot(
        &mut self,
        generation: Generation,
        result: FetchResult<DashboardSnapshot>,
        now: DateTime<Utc>,
    ) -> Applied {
        if self.torn_down {
            debug!("Snapshot: fetch {} completed after teardown; discarded", generation);
            return Applied::Discarded;
        }
        let accepted = self.snapshot.settle(generation);
        self.view.snapshot_in_flight = self.snapshot.is_busy();
        if !accepted {
            debug!("Snapshot: fetch {} is older than the applied one; dropped", generation);
            if !self.snapshot.is_busy() {
                self.view.phase = self.settled_phase();
            }
            return Applied::Stale;
        }

        match result {
            Ok(snapshot) => {
                let view = SnapshotView::derive(generation, snapshot, self.display_window, now);
                info!(
                    "Snapshot {} applied (readings={}, zones={}, drones={}, critical in window={})",
                    generation,
                    view.readings.len(),
                    view.snapshot.irrigation_systems.len(),
                    view.snapshot.drone_fleet.len(),
                    view.alert_counts.critical
                );
                self.view.snapshot = Some(Arc::new(view));
                self.view.phase = Phase::Ready;
                self.view.error = None;
                self.consecutive_failures = 0;
            }
            Err(err) => {
                self.consecutive_failures += 1;
                warn!(
                    "Snapshot {} failed ({} consecutive): {}",
                    generation, self.consecutive_failures, err
                );
                if self.consecutive_failures >= self.failure_threshold.get() {
                    self.view.error = Some(DashboardError::from_client(&err, now));
                    self.view.phase = Phase::Error;
                } else {
                    self.view.phase = self.settled_phase();
                }
            }
        }
        Applied::Accepted
    }

    pub fn begin_history(&mut self) -> Option<Generation> {
        if self.torn_down {
            return None;
        }
        self.history.begin()
    }

    pub fn apply_history(
        &mut self,
        generation: Generation,
        result: FetchResult<HistoricalSeries>,
        now: DateTime<Utc>,
    ) -> Applied {
        if self.torn_down {
            return Applied::Discarded;
        }
        if !self.history.settle(generation) {
            return Applied::Stale;
        }
        match result {
            Ok(series) => {
                let chart = adapt(&series);
                debug!(
                    "History {} applied ({}h, {} series, {} point(s))",
                    generation,
                    chart.hours,
                    chart.series.len(),
                    series.points.len()
                );
                self.view.history = Some(Arc::new(HistoryView {
                    generation,
                    received_at: now,
                    chart,
                }));
                self.view.history_error = None;
            }
            Err(err) => {
                warn!("History {} failed; keeping previous chart: {}", generation, err);
                self.view.history_error = Some(DashboardError::from_client(&err, now));
            }
        }
        Applied::Accepted
    }

    pub fn begin_positions(&mut self) -> Option<Generation> {
        if self.torn_down {
            return None;
        }
        self.positions.begin()
    }

    pub fn apply_positions(
        &mut self,
        generation: Generation,
        result: FetchResult<DronePositionSet>,
        now: DateTime<Utc>,
    ) -> Applied {
        if self.torn_down {
            return Applied::Discarded;
        }
        if !self.positions.settle(generation) {
            return Applied::Stale;
        }
        match result {
            Ok(drones) => {
                let overlay = build_overlay(&drones);
                debug!(
                    "Positions {} applied ({} drone(s), {} path(s))",
                    generation,
                    overlay.markers.len(),
                    overlay.paths.len()
                );
                self.view.positions = Some(Arc::new(PositionsView {
                    generation,
                    received_at: now,
                    drones,
                    overlay,
                }));
                self.view.positions_error = None;
            }
            Err(err) => {
                warn!("Positions {} failed; keeping previous map: {}", generation, err);
                self.view.positions_error = Some(DashboardError::from_client(&err, now));
            }
        }
        Applied::Accepted
    }

    /// After teardown every pending or future completion is discarded.
    pub fn tear_down(&mut self) {
        self.torn_down = true;
        self.follow_up = false;
        self.snapshot.outstanding = None;
        self.history.outstanding = None;
        self.positions.outstanding = None;
        self.view.snapshot_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::farm::{DroneUnit, IrrigationZone, ZoneId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).unwrap()
    }

    fn fixture() -> DashboardSnapshot {
        let json = std::fs::read_to_string("tests/data/dashboard.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse dashboard")
    }

    fn with_zone_status(status: IrrigationStatus) -> DashboardSnapshot {
        let mut snap = fixture();
        snap.irrigation_systems[0].status = status;
        snap
    }

    fn network_error() -> FarmClientError {
        FarmClientError::Network("connection refused".into())
    }

    fn state() -> DashboardState {
        DashboardState::new(7, NonZeroU32::new(1).unwrap())
    }

    #[test]
    fn sequencer_rejects_older_generations() {
        let mut seq = Sequencer::default();
        let g1 = seq.issue();
        let g2 = seq.issue();
        assert!(seq.accept(g2));
        assert!(!seq.accept(g1));
        assert!(!seq.accept(g2));
        assert_eq!(seq.latest_applied(), Some(g2));
    }

    #[test]
    fn first_success_moves_idle_through_loading_to_ready() {
        let mut st = state();
        assert_eq!(st.view().phase, Phase::Idle);
        let g = st.begin_snapshot(RefreshReason::Startup).expect("fetch starts");
        assert_eq!(st.view().phase, Phase::Loading);
        assert!(st.view().snapshot_in_flight);

        assert_eq!(st.apply_snapshot(g, Ok(fixture()), now()), Applied::Accepted);
        assert_eq!(st.view().phase, Phase::Ready);
        assert!(!st.view().snapshot_in_flight);
        assert!(st.view().error.is_none());
    }

    #[test]
    fn refresh_keeps_snapshot_visible_then_replaces_it_whole() {
        let mut st = state();
        let g1 = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g1, Ok(fixture()), now());

        let g2 = st.begin_snapshot(RefreshReason::Scheduled).unwrap();
        assert_eq!(st.view().phase, Phase::Refreshing);
        assert!(st.view().snapshot.is_some());

        let next = with_zone_status(IrrigationStatus::Active);
        st.apply_snapshot(g2, Ok(next.clone()), now());
        let shown = st.view().snapshot.as_deref().unwrap();
        assert_eq!(shown.generation, g2);
        assert_eq!(shown.snapshot, next);
    }

    #[test]
    fn late_older_generation_does_not_overwrite_newer() {
        let mut st = state();
        let older = with_zone_status(IrrigationStatus::Idle);
        let newer = with_zone_status(IrrigationStatus::Active);

        // Fetch #2 lands first, then fetch #1 completes late.
        assert_eq!(st.apply_snapshot(Generation(2), Ok(newer.clone()), now()), Applied::Accepted);
        assert_eq!(st.apply_snapshot(Generation(1), Ok(older), now()), Applied::Stale);

        let shown = st.view().snapshot.as_deref().unwrap();
        assert_eq!(shown.generation, Generation(2));
        assert_eq!(shown.snapshot, newer);
        assert_eq!(st.view().phase, Phase::Ready);
    }

    #[test]
    fn late_older_failure_does_not_flip_to_error() {
        let mut st = state();
        st.apply_snapshot(Generation(2), Ok(fixture()), now());
        assert_eq!(st.apply_snapshot(Generation(1), Err(network_error()), now()), Applied::Stale);
        assert_eq!(st.view().phase, Phase::Ready);
        assert!(st.view().error.is_none());
    }

    #[test]
    fn overlapping_begin_is_coalesced() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Scheduled).unwrap();
        assert_eq!(st.begin_snapshot(RefreshReason::Manual), None);
        assert_eq!(st.begin_snapshot(RefreshReason::Scheduled), None);
        assert!(!st.take_follow_up());

        st.apply_snapshot(g, Ok(fixture()), now());
        assert!(st.begin_snapshot(RefreshReason::Manual).is_some());
    }

    #[test]
    fn coalesced_command_refresh_is_remembered() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Scheduled).unwrap();
        assert_eq!(st.begin_snapshot(RefreshReason::Command), None);
        st.apply_snapshot(g, Ok(fixture()), now());
        assert!(st.take_follow_up());
        assert!(!st.take_follow_up());
    }

    #[test]
    fn failure_keeps_last_known_good_snapshot() {
        let mut st = state();
        let g1 = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g1, Ok(fixture()), now());

        let g2 = st.begin_snapshot(RefreshReason::Scheduled).unwrap();
        st.apply_snapshot(
            g2,
            Err(FarmClientError::HttpStatus {
                status: 502,
                message: "bad gateway".into(),
            }),
            now(),
        );
        let view = st.view();
        assert_eq!(view.phase, Phase::Error);
        assert_eq!(view.error.as_ref().map(|e| e.kind), Some(ErrorKind::HttpStatus(502)));
        assert_eq!(view.snapshot.as_deref().map(|s| s.generation), Some(g1));

        // Retry keeps the error visible until a fetch succeeds.
        let g3 = st.begin_snapshot(RefreshReason::Manual).unwrap();
        assert_eq!(st.view().phase, Phase::Error);
        st.apply_snapshot(g3, Ok(fixture()), now());
        assert_eq!(st.view().phase, Phase::Ready);
        assert!(st.view().error.is_none());
        assert_eq!(st.consecutive_failures(), 0);
    }

    #[test]
    fn first_fetch_failure_enters_error_without_snapshot() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g, Err(network_error()), now());
        assert_eq!(st.view().phase, Phase::Error);
        assert!(st.view().snapshot.is_none());
    }

    #[test]
    fn failure_threshold_delays_error_state() {
        let mut st = DashboardState::new(7, NonZeroU32::new(2).unwrap());
        let g1 = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g1, Ok(fixture()), now());

        let g2 = st.begin_snapshot(RefreshReason::Scheduled).unwrap();
        st.apply_snapshot(g2, Err(network_error()), now());
        assert_eq!(st.view().phase, Phase::Ready);
        assert!(st.view().error.is_none());

        let g3 = st.begin_snapshot(RefreshReason::Scheduled).unwrap();
        st.apply_snapshot(g3, Err(network_error()), now());
        assert_eq!(st.view().phase, Phase::Error);
        assert_eq!(st.consecutive_failures(), 2);
    }

    #[test]
    fn display_window_returns_leading_readings_unmodified() {
        let mut st = state();
        let snap = fixture();
        assert_eq!(snap.recent_sensor_data.len(), 10);
        let g = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g, Ok(snap.clone()), now());

        let view = st.view().snapshot.as_deref().unwrap();
        let shown: Vec<&SensorReading> = view.display_readings().iter().map(|r| &r.reading).collect();
        let expected: Vec<&SensorReading> = snap.recent_sensor_data.iter().take(7).collect();
        assert_eq!(shown, expected);
        assert_eq!(view.readings.len(), 10);
    }

    #[test]
    fn alert_levels_are_recomputed_on_ingest() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g, Ok(fixture()), now());
        let view = st.view().snapshot.as_deref().unwrap();
        let levels: Vec<AlertLevel> = view.display_readings().iter().map(|r| r.alert_level).collect();
        assert_eq!(
            levels,
            [
                AlertLevel::Critical, // soil moisture 18.4
                AlertLevel::Normal,   // N 52.0
                AlertLevel::Warning,  // P 33.1
                AlertLevel::Normal,   // K 61.7
                AlertLevel::Normal,   // pH 6.4
                AlertLevel::Normal,   // 31.2 °C
                AlertLevel::Normal,   // 72.5 %
            ]
        );
        assert_eq!(
            view.alert_counts,
            AlertCounts {
                normal: 5,
                warning: 1,
                critical: 1
            }
        );
    }

    #[test]
    fn slice_failures_are_not_fatal() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Startup).unwrap();
        st.apply_snapshot(g, Ok(fixture()), now());

        let h = st.begin_history().unwrap();
        st.apply_history(h, Err(network_error()), now());
        let p = st.begin_positions().unwrap();
        st.apply_positions(p, Err(network_error()), now());

        let view = st.view();
        assert_eq!(view.phase, Phase::Ready);
        assert!(view.history.is_none());
        assert!(view.history_error.is_some());
        assert!(view.positions_error.is_some());
        // The map falls back to the snapshot's fleet.
        assert_eq!(view.map_overlay().map(|o| o.markers.len()), Some(3));
    }

    #[test]
    fn positions_slice_takes_over_the_map_and_survives_failure() {
        let mut st = state();
        let p1 = st.begin_positions().unwrap();
        let drones: DronePositionSet = {
            let json = std::fs::read_to_string("tests/data/positions.json").expect("fixture present");
            let resp: crate::models::farm::DronePositionsResponse = serde_json::from_str(&json).expect("parse");
            resp.drones
        };
        st.apply_positions(p1, Ok(drones), now());
        assert_eq!(st.view().map_overlay().map(|o| o.paths.len()), Some(1));

        let p2 = st.begin_positions().unwrap();
        st.apply_positions(p2, Err(network_error()), now());
        let kept = st.view().positions.as_deref().map(|p| p.generation);
        assert_eq!(kept, Some(p1));
    }

    #[test]
    fn teardown_discards_in_flight_results() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Startup).unwrap();
        let h = st.begin_history().unwrap();
        st.tear_down();
        assert_eq!(st.apply_snapshot(g, Ok(fixture()), now()), Applied::Discarded);
        assert_eq!(
            st.apply_history(h, Ok(HistoricalSeries { hours: 24, points: vec![] }), now()),
            Applied::Discarded
        );
        assert!(st.view().snapshot.is_none());
        assert_eq!(st.begin_snapshot(RefreshReason::Manual), None);
    }

    #[test]
    fn only_idle_entities_accept_commands() {
        let mut st = state();
        let g = st.begin_snapshot(RefreshReason::Startup).unwrap();
        let mut snap = fixture();
        snap.irrigation_systems.push(IrrigationZone {
            id: IrrigationId("irr-d".into()),
            zone_id: ZoneId("zone-d".into()),
            status: IrrigationStatus::Active,
            fertilizer_type: None,
            flow_rate: 4.0,
            duration: Some(15),
            last_activated: Some(now()),
        });
        snap.drone_fleet.push(DroneUnit {
            status: DroneStatus::Maintenance,
            id: DroneId("drone-4".into()),
            ..snap.drone_fleet[0].clone()
        });
        st.apply_snapshot(g, Ok(snap), now());

        let view = st.view();
        assert!(view.can_activate(&IrrigationId("irr-a".into())));
        assert!(!view.can_activate(&IrrigationId("irr-b".into()))); // scheduled
        assert!(!view.can_activate(&IrrigationId("irr-d".into()))); // active
        assert!(!view.can_activate(&IrrigationId("irr-missing".into())));
        assert!(view.can_dispatch(&DroneId("drone-1".into())));
        assert!(!view.can_dispatch(&DroneId("drone-2".into()))); // in flight
        assert!(!view.can_dispatch(&DroneId("drone-4".into()))); // maintenance
    }
}
