// src/services/ride_service.rs
//
// Ride lifecycle: candidate list, acceptance, staged status advancement,
// cancellation, and crash recovery. In-memory state is authoritative for
// the process lifetime; every mutation of the accepted ride is mirrored to
// the session store so a cold start can pick the trip back up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

use crate::errors::{SwiftaidError, SwiftaidResult};
use crate::models::events::RideNotice;
use crate::models::ride::{CancelEligibility, GeoPoint, Ride, RideStatus};
use crate::services::api::RideApi;
use crate::services::navigation::NavigationCoordinator;
use crate::services::realtime::RideChannel;
use crate::services::session_store::{self, SessionStore, StoreKeys};
use crate::utils::geo;

/// Delay before refreshing the candidate list after a completed trip, so
/// the server has settled the closed ride out of its matching pool.
const POST_COMPLETION_REFRESH: Duration = Duration::from_secs(3);

#[derive(Default)]
struct RideState {
    available: Vec<Ride>,
    accepted: Option<Ride>,
    trip_started: bool,
}

pub struct RideLifecycleManager {
    api: Arc<dyn RideApi>,
    store: Arc<dyn SessionStore>,
    channel: Arc<dyn RideChannel>,
    navigation: Arc<NavigationCoordinator>,
    notices: mpsc::UnboundedSender<RideNotice>,
    state: RwLock<RideState>,
    fetch_in_flight: AtomicBool,
}

impl RideLifecycleManager {
    pub fn new(
        api: Arc<dyn RideApi>,
        store: Arc<dyn SessionStore>,
        channel: Arc<dyn RideChannel>,
        navigation: Arc<NavigationCoordinator>,
        notices: mpsc::UnboundedSender<RideNotice>,
    ) -> Self {
        Self {
            api,
            store,
            channel,
            navigation,
            notices,
            state: RwLock::new(RideState::default()),
            fetch_in_flight: AtomicBool::new(false),
        }
    }

    pub async fn accepted_ride(&self) -> Option<Ride> {
        self.state.read().await.accepted.clone()
    }

    pub async fn available_rides(&self) -> Vec<Ride> {
        self.state.read().await.available.clone()
    }

    pub async fn trip_started(&self) -> bool {
        self.state.read().await.trip_started
    }

    /// Final destination of the active trip: the accepted ride's drop
    /// coordinate.
    pub async fn destination(&self) -> Option<GeoPoint> {
        self.state
            .read()
            .await
            .accepted
            .as_ref()
            .map(|ride| ride.drop.point)
    }

    /// Rebuild the in-progress trip from the persisted session before any
    /// network call resolves. Re-subscribing here lands in the channel's
    /// pending set and is flushed once it connects.
    pub async fn restore(&self) {
        let accepted: Option<Ride> =
            session_store::read_json(&*self.store, StoreKeys::ACCEPTED_RIDE).await;
        let trip_started: Option<bool> =
            session_store::read_json(&*self.store, StoreKeys::TRIP_STARTED).await;

        if let Some(ride) = accepted {
            tracing::info!("Restored accepted ride {} ({})", ride.id, ride.status);
            self.channel.subscribe_to_ride(&ride.id).await;
            let mut state = self.state.write().await;
            state.accepted = Some(ride);
            state.trip_started = trip_started.unwrap_or(false);
        }
    }

    /// Refresh the candidate ride list. Concurrent calls coalesce: while a
    /// fetch is in flight, later callers get the current list back instead
    /// of stacking duplicate requests.
    pub async fn fetch_available_rides(
        &self,
        driver_location: Option<GeoPoint>,
    ) -> SwiftaidResult<Vec<Ride>> {
        if self
            .fetch_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Ride fetch already in flight, returning current list");
            return Ok(self.available_rides().await);
        }

        let result = self.api.fetch_driver_rides().await;
        self.fetch_in_flight.store(false, Ordering::SeqCst);

        let rides = result?;
        let filtered: Vec<Ride> = rides
            .into_iter()
            .filter(|ride| ride.status == RideStatus::Searching)
            .filter(|ride| geo::is_plausible(&ride.pickup.point))
            .filter(|ride| match &driver_location {
                Some(driver) => geo::within_pickup_radius(driver, &ride.pickup.point),
                None => true,
            })
            .collect();

        tracing::debug!("Fetched {} candidate rides", filtered.len());
        self.state.write().await.available = filtered.clone();
        Ok(filtered)
    }

    /// Claim a ride. Nothing local changes until the server confirms, so a
    /// failed accept leaves the candidate list intact.
    pub async fn accept_ride(&self, ride_id: &str) -> SwiftaidResult<Ride> {
        let ride = self.api.accept_ride(ride_id).await?;
        tracing::info!("Accepted ride {}", ride.id);

        self.channel.subscribe_to_ride(&ride.id).await;
        session_store::write_json(&*self.store, StoreKeys::ACCEPTED_RIDE, &ride).await;

        let mut state = self.state.write().await;
        state.available.clear();
        state.accepted = Some(ride.clone());
        state.trip_started = false;
        Ok(ride)
    }

    /// Drop a candidate locally. The server keeps offering the ride to
    /// other drivers; there is no reject endpoint.
    pub async fn reject_ride(&self, ride_id: &str) {
        let mut state = self.state.write().await;
        state.available.retain(|r| r.id != ride_id);
    }

    /// Advance the accepted ride one lifecycle step. The transition table
    /// is checked before the request goes out; the server's echo of the
    /// ride is what lands in state.
    pub async fn update_ride_status(
        self: &Arc<Self>,
        status: RideStatus,
    ) -> SwiftaidResult<Ride> {
        let current = self
            .accepted_ride()
            .await
            .ok_or(SwiftaidError::NoAcceptedRide)?;

        if !current.status.can_transition_to(status) {
            return Err(SwiftaidError::invalid_transition(current.status, status));
        }

        let updated = self.api.update_ride_status(&current.id, status).await?;
        tracing::info!("Ride {} moved to {}", updated.id, updated.status);

        if updated.status == RideStatus::Completed {
            self.teardown_after_completion(&updated).await;
            return Ok(updated);
        }

        {
            let mut state = self.state.write().await;
            if matches!(updated.status, RideStatus::Start | RideStatus::Arrived) {
                state.trip_started = true;
            }
            state.accepted = Some(updated.clone());
        }
        session_store::write_json(&*self.store, StoreKeys::ACCEPTED_RIDE, &updated).await;
        if self.trip_started().await {
            session_store::write_json(&*self.store, StoreKeys::TRIP_STARTED, &true).await;
        }
        Ok(updated)
    }

    /// Dry-run cancellation check, surfacing any fee the server would
    /// charge.
    pub async fn can_cancel(&self, ride_id: &str) -> SwiftaidResult<CancelEligibility> {
        self.api.can_cancel_ride(ride_id).await
    }

    /// Cancel as the driver. Two-phase: the eligibility check runs first
    /// so an ineligible cancel never reaches the cancel endpoint.
    pub async fn cancel_ride(&self, ride_id: &str, reason: &str) -> SwiftaidResult<Ride> {
        let eligibility = self.api.can_cancel_ride(ride_id).await?;
        if !eligibility.allowed {
            return Err(SwiftaidError::CancellationNotAllowed(ride_id.to_string()));
        }

        let cancelled = self.api.cancel_ride(ride_id, reason).await?;
        tracing::info!("Cancelled ride {} ({})", cancelled.id, reason);
        self.clear_accepted_if_matches(&cancelled.id).await;
        Ok(cancelled)
    }

    /// React to a cancellation pushed or polled from the server. A hit on
    /// the accepted ride tears the trip down and notifies the driver; a
    /// hit on a candidate just drops it from the list.
    pub async fn handle_ride_cancellation(&self, ride: &Ride, cancelled_by: &str, message: &str) {
        let was_accepted = self
            .accepted_ride()
            .await
            .map(|accepted| accepted.id == ride.id)
            .unwrap_or(false);

        if was_accepted {
            tracing::warn!("Accepted ride {} cancelled by {}", ride.id, cancelled_by);
            self.clear_accepted_if_matches(&ride.id).await;
            self.notify(RideNotice::RideCancelled {
                ride_id: ride.id.clone(),
                cancelled_by: cancelled_by.to_string(),
                message: message.to_string(),
            });
        } else {
            let mut state = self.state.write().await;
            state.available.retain(|r| r.id != ride.id);
        }
    }

    /// Merge a fresher copy of a ride into state, last write wins. The
    /// accepted ride and the candidate list are both checked; a candidate
    /// that left SEARCHING drops off the list.
    pub async fn update_ride_in_list(&self, ride: &Ride) {
        let mut state = self.state.write().await;

        if let Some(accepted) = &state.accepted {
            if accepted.id == ride.id {
                state.accepted = Some(ride.clone());
                drop(state);
                session_store::write_json(&*self.store, StoreKeys::ACCEPTED_RIDE, ride).await;
                return;
            }
        }

        if ride.status == RideStatus::Searching {
            match state.available.iter_mut().find(|r| r.id == ride.id) {
                Some(existing) => *existing = ride.clone(),
                None => state.available.push(ride.clone()),
            }
        } else {
            state.available.retain(|r| r.id != ride.id);
        }
    }

    /// Tear the trip down after the server confirmed COMPLETED, then
    /// schedule a candidate-list refresh once the pool has settled.
    async fn teardown_after_completion(self: &Arc<Self>, ride: &Ride) {
        self.clear_accepted_if_matches(&ride.id).await;
        self.notify(RideNotice::StageConfirmed {
            ride_id: ride.id.clone(),
            status: RideStatus::Completed,
        });

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(POST_COMPLETION_REFRESH).await;
            if let Err(err) = manager.fetch_available_rides(None).await {
                tracing::warn!("Post-completion ride refresh failed: {}", err);
            }
        });
    }

    /// Unsubscribe, clear the persisted session, and stop navigation if
    /// `ride_id` is the accepted ride.
    async fn clear_accepted_if_matches(&self, ride_id: &str) {
        let matches = {
            let mut state = self.state.write().await;
            let matched = state
                .accepted
                .as_ref()
                .map(|r| r.id == ride_id)
                .unwrap_or(false);
            if matched {
                state.accepted = None;
                state.trip_started = false;
            }
            matched
        };

        if matches {
            self.channel.unsubscribe_from_ride(ride_id).await;
            self.navigation.stop_navigation().await;
            session_store::remove_entry(&*self.store, StoreKeys::ACCEPTED_RIDE).await;
            session_store::remove_entry(&*self.store, StoreKeys::TRIP_STARTED).await;
        }
    }

    fn notify(&self, notice: RideNotice) {
        if self.notices.send(notice).is_err() {
            tracing::debug!("Notice receiver dropped");
        }
    }
}
