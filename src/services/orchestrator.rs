// src/services/orchestrator.rs
//
// Top-level facade the UI talks to. Composes the profile store, ride
// lifecycle, navigation, and realtime channel, and owns the background
// tasks: the candidate-sync loop, the accepted-ride watchdog, and the
// pump that drains channel events.
//
// Push and poll converge on the same handlers, so a status change is
// applied identically whether it arrived over the socket or from a
// watchdog fetch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::errors::SwiftaidResult;
use crate::models::driver::DriverProfile;
use crate::models::events::{RealtimeEvent, RideNotice};
use crate::models::ride::{CancelEligibility, GeoPoint, Ride, RideStatus};
use crate::models::route::{NavigationStage, StageGoal};
use crate::services::api::RideApi;
use crate::services::navigation::NavigationCoordinator;
use crate::services::profile_service::DriverProfileStore;
use crate::services::realtime::RideChannel;
use crate::services::ride_service::RideLifecycleManager;

#[derive(Default)]
struct BackgroundTasks {
    sync: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    events: Option<JoinHandle<()>>,
}

pub struct Orchestrator {
    profile: Arc<DriverProfileStore>,
    rides: Arc<RideLifecycleManager>,
    navigation: Arc<NavigationCoordinator>,
    channel: Arc<dyn RideChannel>,
    api: Arc<dyn RideApi>,
    notices: mpsc::UnboundedSender<RideNotice>,
    sync_interval: Duration,
    watchdog_interval: Duration,
    driver_location: RwLock<Option<GeoPoint>>,
    /// Latest pushed position of the active ride's patient, for the map.
    last_ride_location: RwLock<Option<(String, GeoPoint)>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<RealtimeEvent>>>,
    tasks: Mutex<BackgroundTasks>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile: Arc<DriverProfileStore>,
        rides: Arc<RideLifecycleManager>,
        navigation: Arc<NavigationCoordinator>,
        channel: Arc<dyn RideChannel>,
        api: Arc<dyn RideApi>,
        notices: mpsc::UnboundedSender<RideNotice>,
        events: mpsc::UnboundedReceiver<RealtimeEvent>,
        sync_interval: Duration,
        watchdog_interval: Duration,
    ) -> Self {
        Self {
            profile,
            rides,
            navigation,
            channel,
            api,
            notices,
            sync_interval,
            watchdog_interval,
            driver_location: RwLock::new(None),
            last_ride_location: RwLock::new(None),
            events: Mutex::new(Some(events)),
            tasks: Mutex::new(BackgroundTasks::default()),
        }
    }

    /// Cold-start sequence: rebuild local state from the session store
    /// before any network call, then load the profile, connect the
    /// channel, and start whatever background work the restored state
    /// calls for.
    pub async fn initialize(self: &Arc<Self>) -> SwiftaidResult<DriverProfile> {
        self.rides.restore().await;
        self.navigation.restore().await;

        let profile = self.profile.load_profile().await?;
        if let Err(err) = self.profile.load_stats().await {
            tracing::warn!("Stats unavailable at startup: {}", err);
        }

        self.channel.connect().await;
        self.start_event_pump().await;

        if self.rides.accepted_ride().await.is_some() {
            self.start_watchdog().await;
        } else if profile.is_online {
            self.start_sync_loop().await;
        }
        Ok(profile)
    }

    /// Record the driver's position. Feeds the candidate radius filter
    /// and the channel's inbound proximity check.
    pub async fn update_driver_location(&self, point: GeoPoint) {
        *self.driver_location.write().await = Some(point);
        self.channel.note_driver_location(point);
    }

    pub async fn last_ride_location(&self) -> Option<(String, GeoPoint)> {
        self.last_ride_location.read().await.clone()
    }

    pub async fn go_online(self: &Arc<Self>) -> SwiftaidResult<()> {
        self.profile.set_online(true).await?;
        self.channel.connect().await;
        if self.rides.accepted_ride().await.is_none() {
            self.start_sync_loop().await;
        }
        Ok(())
    }

    /// Going offline stops candidate syncing. The channel stays up while
    /// a trip is active so cancellations still arrive in real time.
    pub async fn go_offline(self: &Arc<Self>) -> SwiftaidResult<()> {
        self.profile.set_online(false).await?;
        self.stop_sync_loop().await;
        if self.rides.accepted_ride().await.is_none() {
            self.channel.disconnect().await;
        }
        Ok(())
    }

    pub async fn refresh_rides(&self) -> SwiftaidResult<Vec<Ride>> {
        let location = *self.driver_location.read().await;
        self.rides.fetch_available_rides(location).await
    }

    /// Accept a candidate: claim it on the server, switch from syncing to
    /// watching, and start the pickup leg toward the patient.
    pub async fn accept_ride(self: &Arc<Self>, ride_id: &str) -> SwiftaidResult<Ride> {
        let ride = self.rides.accept_ride(ride_id).await?;
        self.stop_sync_loop().await;
        self.start_watchdog().await;

        let origin = (*self.driver_location.read().await).unwrap_or(ride.pickup.point);
        if let Err(err) = self
            .navigation
            .start_navigation(origin, ride.pickup.point, NavigationStage::ToPatient)
            .await
        {
            tracing::warn!("Pickup-leg navigation did not start: {}", err);
        }
        Ok(ride)
    }

    pub async fn reject_ride(&self, ride_id: &str) {
        self.rides.reject_ride(ride_id).await;
    }

    /// Driver reached the patient's location.
    pub async fn arrive_at_patient(&self) -> SwiftaidResult<Ride> {
        self.rides.update_ride_status(RideStatus::Arrived).await
    }

    /// A leg milestone was reached. Picking the patient up advances the
    /// ride and rolls navigation over to the hospital leg; arriving at
    /// the hospital advances the ride and ends navigation.
    pub async fn complete_stage(self: &Arc<Self>, goal: StageGoal) -> SwiftaidResult<Ride> {
        match goal {
            StageGoal::PatientPickup => {
                let ride = self
                    .rides
                    .update_ride_status(RideStatus::PickupComplete)
                    .await?;
                self.navigation.handle_stage_complete(goal).await;

                let origin = (*self.driver_location.read().await).unwrap_or(ride.pickup.point);
                if let Err(err) = self
                    .navigation
                    .start_navigation(origin, ride.drop.point, NavigationStage::ToHospital)
                    .await
                {
                    tracing::warn!("Hospital-leg navigation did not start: {}", err);
                }
                Ok(ride)
            }
            StageGoal::HospitalArrival => {
                let ride = self
                    .rides
                    .update_ride_status(RideStatus::DropoffComplete)
                    .await?;
                self.navigation.handle_stage_complete(goal).await;
                Ok(ride)
            }
        }
    }

    /// Close the trip out and fall back to candidate syncing if the
    /// driver is still online.
    pub async fn complete_ride(self: &Arc<Self>) -> SwiftaidResult<Ride> {
        let ride = self.rides.update_ride_status(RideStatus::Completed).await?;
        self.resume_after_trip_end().await;
        Ok(ride)
    }

    pub async fn can_cancel(&self, ride_id: &str) -> SwiftaidResult<CancelEligibility> {
        self.rides.can_cancel(ride_id).await
    }

    pub async fn cancel_ride(self: &Arc<Self>, ride_id: &str, reason: &str) -> SwiftaidResult<Ride> {
        let ride = self.rides.cancel_ride(ride_id, reason).await?;
        self.resume_after_trip_end().await;
        Ok(ride)
    }

    /// Stop every background task and close the channel.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for handle in [
            tasks.sync.take(),
            tasks.watchdog.take(),
            tasks.events.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        drop(tasks);
        self.channel.disconnect().await;
        tracing::info!("Orchestrator shut down");
    }

    // ------------------------------
    // Event handling (push and poll)
    // ------------------------------

    pub async fn handle_event(self: &Arc<Self>, event: RealtimeEvent) {
        match event {
            RealtimeEvent::RideStatusChanged { ride }
            | RealtimeEvent::NewRideAvailable { ride } => {
                self.handle_remote_ride(&ride).await;
            }
            RealtimeEvent::RideCancelled {
                ride,
                cancelled_by,
                message,
            } => {
                self.apply_remote_cancellation(&ride, &cancelled_by, &message)
                    .await;
            }
            RealtimeEvent::RideLocationChanged { ride_id, location } => {
                *self.last_ride_location.write().await = Some((ride_id, location));
            }
            RealtimeEvent::RideNotification { ride_id, message } => {
                self.notify(RideNotice::Notification { ride_id, message });
            }
        }
    }

    /// Apply a fresher server copy of a ride, whatever transport it came
    /// over.
    async fn handle_remote_ride(self: &Arc<Self>, ride: &Ride) {
        match ride.status {
            RideStatus::Cancelled => {
                let (cancelled_by, message) = match &ride.cancellation {
                    Some(c) => (
                        c.cancelled_by.clone(),
                        c.cancel_reason.clone().unwrap_or_default(),
                    ),
                    None => ("unknown".to_string(), String::new()),
                };
                self.apply_remote_cancellation(ride, &cancelled_by, &message)
                    .await;
            }
            RideStatus::Arrived => {
                let newly_arrived = self
                    .rides
                    .accepted_ride()
                    .await
                    .map(|a| a.id == ride.id && a.status != RideStatus::Arrived)
                    .unwrap_or(false);
                self.rides.update_ride_in_list(ride).await;
                if newly_arrived {
                    self.notify(RideNotice::ArrivedAtPickup {
                        ride_id: ride.id.clone(),
                    });
                }
            }
            _ => self.rides.update_ride_in_list(ride).await,
        }
    }

    /// A cancellation that came from the server (push or watchdog). When
    /// it ends the active trip, the facade switches from watching back to
    /// candidate syncing for an online driver.
    async fn apply_remote_cancellation(
        self: &Arc<Self>,
        ride: &Ride,
        cancelled_by: &str,
        message: &str,
    ) {
        let was_accepted = self
            .rides
            .accepted_ride()
            .await
            .map(|accepted| accepted.id == ride.id)
            .unwrap_or(false);
        self.rides
            .handle_ride_cancellation(ride, cancelled_by, message)
            .await;
        if was_accepted {
            self.resume_after_trip_end().await;
        }
    }

    /// The active trip ended: re-arm candidate syncing if the driver is
    /// still online, then retire the watchdog. Sync comes first because
    /// this can run on the watchdog task itself, which stops executing
    /// at its next suspension point once aborted.
    async fn resume_after_trip_end(self: &Arc<Self>) {
        if self.profile.is_online().await {
            self.start_sync_loop().await;
        }
        self.stop_watchdog().await;
    }

    /// One watchdog poll of the accepted ride. Fetch failures are logged
    /// and skipped; the next tick tries again.
    pub async fn watchdog_tick(self: &Arc<Self>) {
        let Some(accepted) = self.rides.accepted_ride().await else {
            return;
        };
        match self.api.get_ride(&accepted.id).await {
            Ok(ride) => self.handle_remote_ride(&ride).await,
            Err(err) => tracing::debug!("Watchdog poll failed for {}: {}", accepted.id, err),
        }
    }

    /// One candidate-sync pass. Skipped while a trip is active.
    pub async fn sync_tick(&self) {
        if self.rides.accepted_ride().await.is_some() {
            return;
        }
        if let Err(err) = self.refresh_rides().await {
            tracing::debug!("Candidate sync failed: {}", err);
        }
    }

    // ------------------------------
    // Background tasks
    // ------------------------------

    async fn start_event_pump(self: &Arc<Self>) {
        let Some(mut receiver) = self.events.lock().await.take() else {
            return;
        };
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                orchestrator.handle_event(event).await;
            }
            tracing::debug!("Event pump finished");
        });
        self.tasks.lock().await.events = Some(handle);
    }

    async fn start_sync_loop(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if tasks.sync.is_some() {
            return;
        }
        let orchestrator = Arc::clone(self);
        tasks.sync = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.sync_interval);
            loop {
                ticker.tick().await;
                orchestrator.sync_tick().await;
            }
        }));
        tracing::debug!("Candidate sync loop started");
    }

    async fn stop_sync_loop(&self) {
        if let Some(handle) = self.tasks.lock().await.sync.take() {
            handle.abort();
            tracing::debug!("Candidate sync loop stopped");
        }
    }

    async fn start_watchdog(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if tasks.watchdog.is_some() {
            return;
        }
        let orchestrator = Arc::clone(self);
        tasks.watchdog = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(orchestrator.watchdog_interval);
            // The first interval tick fires immediately; the trip was just
            // accepted, so skip straight to the waiting.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                orchestrator.watchdog_tick().await;
            }
        }));
        tracing::debug!("Accepted-ride watchdog started");
    }

    async fn stop_watchdog(&self) {
        if let Some(handle) = self.tasks.lock().await.watchdog.take() {
            handle.abort();
            tracing::debug!("Accepted-ride watchdog stopped");
        }
    }

    fn notify(&self, notice: RideNotice) {
        if self.notices.send(notice).is_err() {
            tracing::debug!("Notice receiver dropped");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for handle in [
                tasks.sync.take(),
                tasks.watchdog.take(),
                tasks.events.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
        }
    }
}
