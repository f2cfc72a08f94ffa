//! Async seam between the dashboard core and the farm backend.
//!
//! `HttpBackend` runs the blocking [`FarmClient`] on tokio's blocking pool so
//! the single-threaded event loop only suspends at the network boundary.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::client::{FarmClient, FarmClientError};
use crate::models::farm::{DashboardSnapshot, DroneId, DronePositionSet, HistoricalSeries, IrrigationId};

pub type FetchResult<T> = Result<T, FarmClientError>;

/// Read and command operations against the backend of record. Implementations
/// hold no dashboard state and never retry.
pub trait Backend: 'static {
    fn fetch_snapshot(&self) -> impl Future<Output = FetchResult<DashboardSnapshot>>;

    fn fetch_historical(&self, hours: NonZeroU32) -> impl Future<Output = FetchResult<HistoricalSeries>>;

    fn fetch_drone_positions(&self) -> impl Future<Output = FetchResult<DronePositionSet>>;

    fn simulate_data(&self) -> impl Future<Output = FetchResult<()>>;

    fn activate_irrigation(&self, id: IrrigationId, minutes: NonZeroU32) -> impl Future<Output = FetchResult<()>>;

    fn send_drone_mission(
        &self,
        id: DroneId,
        target_lat: f64,
        target_lng: f64,
        payload_type: String,
    ) -> impl Future<Output = FetchResult<()>>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Arc<FarmClient>,
}

impl HttpBackend {
    pub fn new(client: FarmClient) -> Self {
        HttpBackend {
            client: Arc::new(client),
        }
    }

    async fn blocking<T, F>(&self, call: F) -> FetchResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FarmClient) -> FetchResult<T> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || call(&client))
            .await
            .map_err(|e| FarmClientError::Network(format!("request task failed: {}", e)))?
    }
}

impl Backend for HttpBackend {
    fn fetch_snapshot(&self) -> impl Future<Output = FetchResult<DashboardSnapshot>> {
        self.blocking(|c| c.get_dashboard())
    }

    fn fetch_historical(&self, hours: NonZeroU32) -> impl Future<Output = FetchResult<HistoricalSeries>> {
        self.blocking(move |c| c.get_historical(hours))
    }

    fn fetch_drone_positions(&self) -> impl Future<Output = FetchResult<DronePositionSet>> {
        self.blocking(|c| c.get_drone_positions())
    }

    fn simulate_data(&self) -> impl Future<Output = FetchResult<()>> {
        self.blocking(|c| c.simulate_data())
    }

    fn activate_irrigation(&self, id: IrrigationId, minutes: NonZeroU32) -> impl Future<Output = FetchResult<()>> {
        self.blocking(move |c| c.activate_irrigation(&id, minutes))
    }

    fn send_drone_mission(
        &self,
        id: DroneId,
        target_lat: f64,
        target_lng: f64,
        payload_type: String,
    ) -> impl Future<Output = FetchResult<()>> {
        self.blocking(move |c| c.send_drone_mission(&id, target_lat, target_lng, &payload_type))
    }
}
