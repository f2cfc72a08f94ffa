//! Async driver for [`DashboardState`].
//!
//! One cooperative loop on a `LocalSet` owns the state: it fires the periodic
//! ticks, spawns fetches onto the same thread, applies their completions and
//! publishes every new [`ViewModel`] through a `watch` channel. Nothing else
//! mutates the view model.

use chrono::Utc;
use log::{debug, info};
use std::num::NonZeroU32;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::{
    DEFAULT_DISPLAY_WINDOW, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HISTORICAL_HOURS, DEFAULT_HISTORICAL_SECS,
    DEFAULT_POSITIONS_SECS, DEFAULT_SNAPSHOT_SECS,
};
use crate::models::farm::{DashboardSnapshot, DronePositionSet, HistoricalSeries};
use crate::services::backend::{Backend, FetchResult};
use crate::services::state::{DashboardState, Generation, RefreshReason, ViewModel};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub snapshot_interval: Duration,
    /// `None` disables the chart slice.
    pub historical_interval: Option<Duration>,
    pub historical_hours: NonZeroU32,
    /// `None` disables the live map slice.
    pub positions_interval: Option<Duration>,
    pub display_window: usize,
    pub failure_threshold: NonZeroU32,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            snapshot_interval: Duration::from_secs(DEFAULT_SNAPSHOT_SECS.get()),
            historical_interval: Some(Duration::from_secs(DEFAULT_HISTORICAL_SECS)),
            historical_hours: DEFAULT_HISTORICAL_HOURS,
            positions_interval: Some(Duration::from_secs(DEFAULT_POSITIONS_SECS)),
            display_window: DEFAULT_DISPLAY_WINDOW.get() as usize,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Debug)]
enum Request {
    Refresh(RefreshReason),
    Shutdown,
}

#[derive(Debug)]
enum FetchEvent {
    Snapshot {
        generation: Generation,
        result: FetchResult<DashboardSnapshot>,
    },
    History {
        generation: Generation,
        result: FetchResult<HistoricalSeries>,
    },
    Positions {
        generation: Generation,
        result: FetchResult<DronePositionSet>,
    },
}

/// Cheap, cloneable access to a running manager: read the view model, ask
/// for refreshes, tear it down.
#[derive(Clone)]
pub struct DashboardHandle {
    requests: mpsc::UnboundedSender<Request>,
    view: watch::Receiver<ViewModel>,
}

impl DashboardHandle {
    /// User-triggered refresh. Coalesced if a snapshot fetch is outstanding.
    /// Returns false once the manager is gone.
    pub fn refresh(&self) -> bool {
        self.requests.send(Request::Refresh(RefreshReason::Manual)).is_ok()
    }

    /// Re-synchronise after a successful command.
    pub fn refresh_after_command(&self) -> bool {
        self.requests.send(Request::Refresh(RefreshReason::Command)).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }

    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }

    pub fn view(&self) -> ViewModel {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }
}

pub struct DashboardStateManager<B: Backend> {
    backend: Rc<B>,
    settings: PollSettings,
    state: DashboardState,
    view_tx: watch::Sender<ViewModel>,
    requests_rx: mpsc::UnboundedReceiver<Request>,
    events_tx: mpsc::UnboundedSender<FetchEvent>,
    events_rx: mpsc::UnboundedReceiver<FetchEvent>,
    tasks: Vec<JoinHandle<()>>,
}

fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl<B: Backend> DashboardStateManager<B> {
    pub fn new(backend: Rc<B>, settings: PollSettings) -> (Self, DashboardHandle) {
        let state = DashboardState::new(settings.display_window, settings.failure_threshold);
        let (view_tx, view_rx) = watch::channel(state.view().clone());
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = DashboardStateManager {
            backend,
            settings,
            state,
            view_tx,
            requests_rx,
            events_tx,
            events_rx,
            tasks: Vec::new(),
        };
        let handle = DashboardHandle {
            requests: requests_tx,
            view: view_rx,
        };
        (manager, handle)
    }

    /// Polls until [`DashboardHandle::shutdown`] is called or every handle is
    /// dropped. Must run inside a `LocalSet`.
    pub async fn run(mut self) {
        info!(
            "Dashboard polling started (snapshot={}s, historical={}, positions={}, window={})",
            self.settings.snapshot_interval.as_secs(),
            self.settings
                .historical_interval
                .map(|d| format!("{}s/{}h", d.as_secs(), self.settings.historical_hours))
                .unwrap_or_else(|| "off".to_string()),
            self.settings
                .positions_interval
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "off".to_string()),
            self.settings.display_window
        );

        let mut snapshot_tick = periodic(self.settings.snapshot_interval);
        let mut history_tick = self.settings.historical_interval.map(periodic);
        let mut positions_tick = self.settings.positions_interval.map(periodic);

        self.start_snapshot(RefreshReason::Startup);
        if history_tick.is_some() {
            self.start_history();
        }
        if positions_tick.is_some() {
            self.start_positions();
        }

        loop {
            tokio::select! {
                _ = snapshot_tick.tick() => self.start_snapshot(RefreshReason::Scheduled),
                _ = next_tick(&mut history_tick) => self.start_history(),
                _ = next_tick(&mut positions_tick) => self.start_positions(),
                request = self.requests_rx.recv() => match request {
                    Some(Request::Refresh(reason)) => self.start_snapshot(reason),
                    Some(Request::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
            }
        }

        self.tear_down();
    }

    /// Subscribers are only woken when the view model actually changed.
    fn publish(&self) {
        let view = self.state.view();
        self.view_tx.send_if_modified(|current| {
            if current == view {
                false
            } else {
                *current = view.clone();
                true
            }
        });
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }

    fn start_snapshot(&mut self, reason: RefreshReason) {
        let Some(generation) = self.state.begin_snapshot(reason) else {
            return;
        };
        self.publish();
        let backend = Rc::clone(&self.backend);
        let events = self.events_tx.clone();
        let handle = tokio::task::spawn_local(async move {
            let result = backend.fetch_snapshot().await;
            let _ = events.send(FetchEvent::Snapshot { generation, result });
        });
        self.track(handle);
    }

    fn start_history(&mut self) {
        let Some(generation) = self.state.begin_history() else {
            debug!("History: tick skipped, previous fetch outstanding");
            return;
        };
        let hours = self.settings.historical_hours;
        let backend = Rc::clone(&self.backend);
        let events = self.events_tx.clone();
        let handle = tokio::task::spawn_local(async move {
            let result = backend.fetch_historical(hours).await;
            let _ = events.send(FetchEvent::History { generation, result });
        });
        self.track(handle);
    }

    fn start_positions(&mut self) {
        let Some(generation) = self.state.begin_positions() else {
            debug!("Positions: tick skipped, previous fetch outstanding");
            return;
        };
        let backend = Rc::clone(&self.backend);
        let events = self.events_tx.clone();
        let handle = tokio::task::spawn_local(async move {
            let result = backend.fetch_drone_positions().await;
            let _ = events.send(FetchEvent::Positions { generation, result });
        });
        self.track(handle);
    }

    fn on_event(&mut self, event: FetchEvent) {
        let now = Utc::now();
        match event {
            FetchEvent::Snapshot { generation, result } => {
                let applied = self.state.apply_snapshot(generation, result, now);
                debug!("Snapshot: fetch {} completion {:?}", generation, applied);
                self.publish();
                if self.state.take_follow_up() {
                    debug!("Snapshot: issuing refresh deferred by a command");
                    self.start_snapshot(RefreshReason::Command);
                }
            }
            FetchEvent::History { generation, result } => {
                self.state.apply_history(generation, result, now);
                self.publish();
            }
            FetchEvent::Positions { generation, result } => {
                self.state.apply_positions(generation, result, now);
                self.publish();
            }
        }
    }

    fn tear_down(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.state.tear_down();
        self.events_rx.close();
        self.publish();
        info!("Dashboard polling stopped");
    }
}

impl<B: Backend> Drop for DashboardStateManager<B> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::FarmClientError;
    use crate::models::farm::{DroneId, IrrigationId, IrrigationStatus};
    use crate::services::state::Phase;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    pub(crate) fn fixture() -> DashboardSnapshot {
        let json = std::fs::read_to_string("tests/data/dashboard.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse dashboard")
    }

    /// Backend whose snapshot responses are released by the test through
    /// oneshot channels, in whatever order it likes.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        pub snapshot_calls: Cell<usize>,
        pub in_flight: Cell<usize>,
        pub max_in_flight: Cell<usize>,
        pub pending: RefCell<VecDeque<oneshot::Sender<FetchResult<DashboardSnapshot>>>>,
        pub commands: RefCell<Vec<String>>,
        pub fail_commands: Cell<bool>,
    }

    impl ScriptedBackend {
        /// Completes the oldest outstanding snapshot fetch.
        pub(crate) fn release(&self, result: FetchResult<DashboardSnapshot>) {
            let tx = self.pending.borrow_mut().pop_front().expect("a snapshot fetch is outstanding");
            let _ = tx.send(result);
        }

        pub(crate) fn outstanding(&self) -> usize {
            self.pending.borrow().len()
        }

        fn command(&self, line: String) -> FetchResult<()> {
            self.commands.borrow_mut().push(line);
            if self.fail_commands.get() {
                Err(FarmClientError::HttpStatus {
                    status: 404,
                    message: "not found".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl Backend for ScriptedBackend {
        async fn fetch_snapshot(&self) -> FetchResult<DashboardSnapshot> {
            let (tx, rx) = oneshot::channel();
            self.pending.borrow_mut().push_back(tx);
            self.snapshot_calls.set(self.snapshot_calls.get() + 1);
            self.in_flight.set(self.in_flight.get() + 1);
            self.max_in_flight.set(self.max_in_flight.get().max(self.in_flight.get()));
            let result = rx
                .await
                .unwrap_or_else(|_| Err(FarmClientError::Network("test dropped the response".into())));
            self.in_flight.set(self.in_flight.get() - 1);
            result
        }

        async fn fetch_historical(&self, hours: NonZeroU32) -> FetchResult<HistoricalSeries> {
            Ok(HistoricalSeries {
                hours: hours.get(),
                points: vec![],
            })
        }

        async fn fetch_drone_positions(&self) -> FetchResult<DronePositionSet> {
            Err(FarmClientError::Network("positions offline".into()))
        }

        async fn simulate_data(&self) -> FetchResult<()> {
            self.command("simulate".to_string())
        }

        async fn activate_irrigation(&self, id: IrrigationId, minutes: NonZeroU32) -> FetchResult<()> {
            self.command(format!("activate {} {}", id.0, minutes))
        }

        async fn send_drone_mission(
            &self,
            id: DroneId,
            target_lat: f64,
            target_lng: f64,
            payload_type: String,
        ) -> FetchResult<()> {
            self.command(format!("mission {} {} {} {}", id.0, target_lat, target_lng, payload_type))
        }
    }

    pub(crate) fn settings() -> PollSettings {
        PollSettings {
            snapshot_interval: Duration::from_secs(30),
            historical_interval: None,
            positions_interval: None,
            ..PollSettings::default()
        }
    }

    /// Lets spawned local tasks and the manager loop make progress.
    pub(crate) async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn startup_fetch_reaches_ready() {
        LocalSet::new()
            .run_until(async {
                let backend = Rc::new(ScriptedBackend::default());
                let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), settings());
                let task = tokio::task::spawn_local(manager.run());
                settle().await;

                assert_eq!(handle.view().phase, Phase::Loading);
                backend.release(Ok(fixture()));
                settle().await;
                assert_eq!(handle.view().phase, Phase::Ready);

                handle.shutdown();
                task.await.expect("manager exits");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_during_outstanding_fetch_is_coalesced() {
        LocalSet::new()
            .run_until(async {
                let backend = Rc::new(ScriptedBackend::default());
                let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), settings());
                let task = tokio::task::spawn_local(manager.run());
                settle().await;

                assert!(handle.refresh());
                assert!(handle.refresh());
                settle().await;
                assert_eq!(backend.snapshot_calls.get(), 1);
                assert_eq!(backend.outstanding(), 1);

                backend.release(Ok(fixture()));
                settle().await;
                assert!(handle.refresh());
                settle().await;
                assert_eq!(backend.snapshot_calls.get(), 2);
                assert_eq!(backend.max_in_flight.get(), 1);

                handle.shutdown();
                task.await.expect("manager exits");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_tick_is_skipped_while_fetch_outstanding() {
        LocalSet::new()
            .run_until(async {
                let backend = Rc::new(ScriptedBackend::default());
                let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), settings());
                let task = tokio::task::spawn_local(manager.run());
                settle().await;

                // Two intervals pass while the startup fetch is still outstanding.
                tokio::time::sleep(Duration::from_secs(65)).await;
                settle().await;
                assert_eq!(backend.snapshot_calls.get(), 1);

                backend.release(Ok(fixture()));
                settle().await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                settle().await;
                assert_eq!(backend.snapshot_calls.get(), 2);
                assert_eq!(backend.max_in_flight.get(), 1);

                handle.shutdown();
                task.await.expect("manager exits");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_retains_last_known_good_snapshot() {
        LocalSet::new()
            .run_until(async {
                let backend = Rc::new(ScriptedBackend::default());
                let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), settings());
                let task = tokio::task::spawn_local(manager.run());
                settle().await;
                backend.release(Ok(fixture()));
                settle().await;

                handle.refresh();
                settle().await;
                backend.release(Err(FarmClientError::Network("timed out".into())));
                settle().await;

                let view = handle.view();
                assert_eq!(view.phase, Phase::Error);
                assert!(view.snapshot.is_some());

                handle.shutdown();
                task.await.expect("manager exits");
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn slice_failures_leave_snapshot_state_alone() {
        LocalSet::new()
            .run_until(async {
                let backend = Rc::new(ScriptedBackend::default());
                let settings = PollSettings {
                    historical_interval: Some(Duration::from_secs(60)),
                    positions_interval: Some(Duration::from_secs(5)),
                    ..settings()
                };
                let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), settings);
                let task = tokio::task::spawn_local(manager.run());
                settle().await;
                backend.release(Ok(fixture()));
                settle().await;

                let view = handle.view();
                assert_eq!(view.phase, Phase::Ready);
                assert!(view.history.is_some());
                assert!(view.positions.is_none());
                assert!(view.positions_error.is_some());

                handle.shutdown();
                task.await.expect("manager exits");
            })
            .await;
    }

    #[test]
    fn unchanged_view_is_not_republished() {
        let backend = Rc::new(ScriptedBackend::default());
        let (mut manager, handle) = DashboardStateManager::new(backend, settings());
        let mut rx = handle.subscribe();
        let generation = manager
            .state
            .begin_snapshot(RefreshReason::Startup)
            .expect("idle state issues a fetch");
        manager.publish();
        assert!(rx.has_changed().expect("manager alive"));
        rx.borrow_and_update();

        manager.publish();
        assert!(!rx.has_changed().expect("manager alive"));

        manager.state.tear_down();
        manager.publish();
        rx.borrow_and_update();
        manager.on_event(FetchEvent::Snapshot {
            generation,
            result: Ok(fixture()),
        });
        assert!(!rx.has_changed().expect("manager alive"));
        assert!(handle.view().snapshot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn completion_after_teardown_is_ignored() {
        LocalSet::new()
            .run_until(async {
                let backend = Rc::new(ScriptedBackend::default());
                let (manager, handle) = DashboardStateManager::new(Rc::clone(&backend), settings());
                let task = tokio::task::spawn_local(manager.run());
                settle().await;
                assert_eq!(backend.outstanding(), 1);

                handle.shutdown();
                task.await.expect("manager exits");

                // The fetch task was aborted; its response channel is gone.
                let mut snap = fixture();
                snap.irrigation_systems[0].status = IrrigationStatus::Active;
                backend.release(Ok(snap));
                settle().await;

                let view = handle.view();
                assert!(view.snapshot.is_none());
                assert!(!view.snapshot_in_flight);
                assert!(!handle.refresh());
            })
            .await;
    }
}
