// src/services/navigation.rs
//
// Two-leg navigation for a transport: drive to the patient, then drive to
// the hospital. The coordinator owns the stage machine and the current
// route; route math itself lives behind the `RouteProvider` seam.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::{SwiftaidError, SwiftaidResult};
use crate::models::ride::GeoPoint;
use crate::models::route::{NavigationStage, NavigationState, RouteInfo, StageGoal};
use crate::services::session_store::{self, SessionStore, StoreKeys};
use crate::utils::polyline;

#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Compute a driving route. `Ok(None)` means the provider had no route
    /// for the pair, which callers treat as navigating without geometry.
    async fn calculate_route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> SwiftaidResult<Option<RouteInfo>>;
}

pub struct NavigationCoordinator {
    provider: Arc<dyn RouteProvider>,
    store: Arc<dyn SessionStore>,
    state: RwLock<NavigationState>,
}

impl NavigationCoordinator {
    pub fn new(provider: Arc<dyn RouteProvider>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            provider,
            store,
            state: RwLock::new(NavigationState::default()),
        }
    }

    pub async fn state(&self) -> NavigationState {
        self.state.read().await.clone()
    }

    pub async fn stage(&self) -> NavigationStage {
        self.state.read().await.stage
    }

    /// Begin navigating a leg. The stage transition is validated before
    /// any route fetch; a provider failure still enters the stage so the
    /// driver can follow the map without turn-by-turn geometry.
    pub async fn start_navigation(
        &self,
        current: GeoPoint,
        destination: GeoPoint,
        stage: NavigationStage,
    ) -> SwiftaidResult<()> {
        {
            let state = self.state.read().await;
            if !state.stage.can_transition_to(stage) {
                return Err(SwiftaidError::invalid_transition(
                    state.stage.to_string(),
                    stage.to_string(),
                ));
            }
        }

        let route = match self.provider.calculate_route(current, destination).await {
            Ok(route) => route,
            Err(err) => {
                tracing::warn!("Route calculation failed, navigating without geometry: {}", err);
                None
            }
        };
        let path = route.as_ref().map(route_path).unwrap_or_default();

        {
            let mut state = self.state.write().await;
            state.stage = stage;
            state.is_navigating = true;
            state.route = route;
            state.path = path;
            state.destination = Some(destination);
        }
        tracing::info!("Navigation started, stage {}", stage);

        session_store::write_json(&*self.store, StoreKeys::NAV_STAGE, &stage).await;
        session_store::write_json(&*self.store, StoreKeys::NAV_DESTINATION, &destination).await;
        Ok(())
    }

    /// End the whole navigation session and clear the persisted stage.
    pub async fn stop_navigation(&self) {
        {
            let mut state = self.state.write().await;
            *state = NavigationState::default();
        }
        tracing::info!("Navigation stopped");
        session_store::remove_entry(&*self.store, StoreKeys::NAV_STAGE).await;
        session_store::remove_entry(&*self.store, StoreKeys::NAV_DESTINATION).await;
    }

    /// Advance past a completed milestone. Reaching the patient ends the
    /// pickup leg and moves the stage to the hospital leg (routed by the
    /// caller, which knows the hospital coordinates); reaching the hospital
    /// ends the session.
    pub async fn handle_stage_complete(&self, goal: StageGoal) {
        match goal {
            StageGoal::PatientPickup => {
                {
                    let mut state = self.state.write().await;
                    state.stage = NavigationStage::ToHospital;
                    state.is_navigating = false;
                    state.route = None;
                    state.path.clear();
                }
                tracing::info!("Pickup leg complete, hospital leg next");
                session_store::write_json(
                    &*self.store,
                    StoreKeys::NAV_STAGE,
                    &NavigationStage::ToHospital,
                )
                .await;
            }
            StageGoal::HospitalArrival => {
                self.stop_navigation().await;
                let mut state = self.state.write().await;
                state.stage = NavigationStage::Completed;
                tracing::info!("Hospital leg complete");
            }
        }
    }

    /// Rebuild the stage machine from the persisted session. Only the
    /// stage and destination come back; the route is refetched lazily the
    /// next time navigation starts.
    pub async fn restore(&self) {
        let stage: Option<NavigationStage> =
            session_store::read_json(&*self.store, StoreKeys::NAV_STAGE).await;
        let destination: Option<GeoPoint> =
            session_store::read_json(&*self.store, StoreKeys::NAV_DESTINATION).await;

        if let Some(stage) = stage {
            let mut state = self.state.write().await;
            state.stage = stage;
            state.destination = destination;
            tracing::info!("Restored navigation stage {}", stage);
        }
    }
}

/// Map geometry for a route: per-step coordinates when the provider sent
/// them, otherwise the decoded overview polyline.
fn route_path(route: &RouteInfo) -> Vec<GeoPoint> {
    let mut path = Vec::new();
    for step in &route.steps {
        if let Some(start) = step.start_location {
            path.push(start);
        }
        if let Some(end) = step.end_location {
            path.push(end);
        }
    }
    if !path.is_empty() {
        return path;
    }

    match &route.encoded_polyline {
        Some(encoded) => match polyline::decode(encoded) {
            Ok(points) => points,
            Err(err) => {
                tracing::warn!("Discarding undecodable route polyline: {}", err);
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::route::Step;
    use crate::services::session_store::MemorySessionStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockRouteProvider {
        route: Option<RouteInfo>,
        fail: bool,
        calls: AtomicU32,
    }

    impl MockRouteProvider {
        fn with_route(route: RouteInfo) -> Self {
            Self {
                route: Some(route),
                fail: false,
                calls: AtomicU32::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                route: None,
                fail: true,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RouteProvider for MockRouteProvider {
        async fn calculate_route(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> SwiftaidResult<Option<RouteInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SwiftaidError::route_provider("provider down"));
            }
            Ok(self.route.clone())
        }
    }

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    fn stepped_route() -> RouteInfo {
        RouteInfo {
            distance: 4.2,
            duration: 11.0,
            steps: vec![Step {
                maneuver: "turn-left".into(),
                instruction: "Turn left onto Ring Road".into(),
                start_location: Some(point(5.55, -0.18)),
                end_location: Some(point(5.56, -0.19)),
                distance: 900.0,
            }],
            encoded_polyline: None,
        }
    }

    fn coordinator(
        provider: MockRouteProvider,
    ) -> (NavigationCoordinator, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        (
            NavigationCoordinator::new(Arc::new(provider), store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn test_start_builds_path_from_steps() {
        let (nav, _store) = coordinator(MockRouteProvider::with_route(stepped_route()));
        nav.start_navigation(point(5.55, -0.18), point(5.60, -0.20), NavigationStage::ToPatient)
            .await
            .unwrap();

        let state = nav.state().await;
        assert_eq!(state.stage, NavigationStage::ToPatient);
        assert!(state.is_navigating);
        assert_eq!(state.path.len(), 2);
        assert_eq!(state.destination, Some(point(5.60, -0.20)));
    }

    #[tokio::test]
    async fn test_start_decodes_polyline_when_steps_bare() {
        let route = RouteInfo {
            distance: 300.0,
            duration: 200.0,
            steps: vec![],
            encoded_polyline: Some("_p~iF~ps|U_ulLnnqC_mqNvxq`@".to_string()),
        };
        let (nav, _store) = coordinator(MockRouteProvider::with_route(route));
        nav.start_navigation(point(38.5, -120.2), point(43.0, -126.0), NavigationStage::ToPatient)
            .await
            .unwrap();

        let state = nav.state().await;
        assert_eq!(state.path.len(), 3);
        assert_eq!(state.path[0], point(38.5, -120.2));
    }

    #[tokio::test]
    async fn test_provider_failure_still_enters_stage() {
        let (nav, _store) = coordinator(MockRouteProvider::failing());
        nav.start_navigation(point(5.55, -0.18), point(5.60, -0.20), NavigationStage::ToPatient)
            .await
            .unwrap();

        let state = nav.state().await;
        assert_eq!(state.stage, NavigationStage::ToPatient);
        assert!(state.is_navigating);
        assert!(state.route.is_none());
        assert!(state.path.is_empty());
    }

    #[tokio::test]
    async fn test_hospital_leg_requires_pickup_leg_first() {
        let (nav, _store) = coordinator(MockRouteProvider::with_route(stepped_route()));
        nav.start_navigation(point(5.55, -0.18), point(5.60, -0.20), NavigationStage::ToPatient)
            .await
            .unwrap();

        // Completed stage admits nothing but a reset.
        nav.handle_stage_complete(StageGoal::HospitalArrival).await;
        let err = nav
            .start_navigation(point(5.60, -0.20), point(5.53, -0.23), NavigationStage::ToPatient)
            .await
            .unwrap_err();
        assert!(matches!(err, SwiftaidError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_stage_persists_and_restores() {
        let (nav, store) = coordinator(MockRouteProvider::with_route(stepped_route()));
        nav.start_navigation(point(5.55, -0.18), point(5.60, -0.20), NavigationStage::ToPatient)
            .await
            .unwrap();

        let fresh = NavigationCoordinator::new(
            Arc::new(MockRouteProvider::with_route(stepped_route())),
            store,
        );
        fresh.restore().await;

        let state = fresh.state().await;
        assert_eq!(state.stage, NavigationStage::ToPatient);
        assert_eq!(state.destination, Some(point(5.60, -0.20)));
        // Restore never refetches a route on its own.
        assert!(state.route.is_none());
        assert!(!state.is_navigating);
    }

    #[tokio::test]
    async fn test_stop_clears_persisted_stage() {
        let (nav, store) = coordinator(MockRouteProvider::with_route(stepped_route()));
        nav.start_navigation(point(5.55, -0.18), point(5.60, -0.20), NavigationStage::ToPatient)
            .await
            .unwrap();
        nav.stop_navigation().await;

        assert_eq!(nav.stage().await, NavigationStage::Idle);
        let stage: Option<NavigationStage> =
            session_store::read_json(&*store, StoreKeys::NAV_STAGE).await;
        assert!(stage.is_none());
    }

    #[tokio::test]
    async fn test_pickup_complete_advances_stage_to_hospital_leg() {
        let (nav, store) = coordinator(MockRouteProvider::with_route(stepped_route()));
        nav.start_navigation(point(5.55, -0.18), point(5.60, -0.20), NavigationStage::ToPatient)
            .await
            .unwrap();

        nav.handle_stage_complete(StageGoal::PatientPickup).await;
        let state = nav.state().await;
        assert_eq!(state.stage, NavigationStage::ToHospital);
        assert!(!state.is_navigating);
        assert!(state.route.is_none());

        // A crash here must come back on the hospital leg.
        let persisted: Option<NavigationStage> =
            session_store::read_json(&*store, StoreKeys::NAV_STAGE).await;
        assert_eq!(persisted, Some(NavigationStage::ToHospital));

        // Hospital leg proceeds from here.
        nav.start_navigation(point(5.60, -0.20), point(5.53, -0.23), NavigationStage::ToHospital)
            .await
            .unwrap();
        assert_eq!(nav.stage().await, NavigationStage::ToHospital);
        assert!(nav.state().await.is_navigating);
    }
}
