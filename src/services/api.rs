// src/services/api.rs
//
// Endpoint-shaped seams over the request gateway. Services depend on these
// traits, never on reqwest directly, so every lifecycle path can be tested
// against a scripted mock.

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::SwiftaidResult;
use crate::models::driver::{DriverProfile, DriverStats, OnlineStatusUpdate, RideHistoryPage};
use crate::models::ride::{CancelEligibility, Ride, RideStatus};
use crate::services::gateway::RequestGateway;

#[async_trait]
pub trait RideApi: Send + Sync {
    /// `GET /ride/driverrides`, the driver's candidate ride list.
    async fn fetch_driver_rides(&self) -> SwiftaidResult<Vec<Ride>>;
    /// `PATCH /ride/accept/:id`
    async fn accept_ride(&self, ride_id: &str) -> SwiftaidResult<Ride>;
    /// `PATCH /ride/update/:id {status}`
    async fn update_ride_status(&self, ride_id: &str, status: RideStatus) -> SwiftaidResult<Ride>;
    /// `GET /ride/:id`
    async fn get_ride(&self, ride_id: &str) -> SwiftaidResult<Ride>;
    /// `GET /ride/:id/can-cancel`, the dry-run eligibility check.
    async fn can_cancel_ride(&self, ride_id: &str) -> SwiftaidResult<CancelEligibility>;
    /// `PUT /ride/:id/cancel {reason}`
    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> SwiftaidResult<Ride>;
}

#[async_trait]
pub trait DriverApi: Send + Sync {
    /// `GET /driver/profile`
    async fn get_profile(&self) -> SwiftaidResult<DriverProfile>;
    /// `PUT /driver/profile`
    async fn update_profile(&self, profile: &DriverProfile) -> SwiftaidResult<DriverProfile>;
    /// `PUT /driver/online-status {isOnline}`
    async fn set_online_status(&self, is_online: bool) -> SwiftaidResult<()>;
    /// `GET /driver/stats`
    async fn get_stats(&self) -> SwiftaidResult<DriverStats>;
    /// `GET /driver/rides?page&limit`
    async fn get_ride_history(&self, page: u32, limit: u32) -> SwiftaidResult<RideHistoryPage>;
}

pub struct ApiClient {
    gateway: Arc<RequestGateway>,
}

impl ApiClient {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl RideApi for ApiClient {
    async fn fetch_driver_rides(&self) -> SwiftaidResult<Vec<Ride>> {
        self.gateway.get("/ride/driverrides").await
    }

    async fn accept_ride(&self, ride_id: &str) -> SwiftaidResult<Ride> {
        self.gateway
            .patch(&format!("/ride/accept/{ride_id}"), None)
            .await
    }

    async fn update_ride_status(&self, ride_id: &str, status: RideStatus) -> SwiftaidResult<Ride> {
        let body = serde_json::json!({ "status": status });
        self.gateway
            .patch(&format!("/ride/update/{ride_id}"), Some(body))
            .await
    }

    async fn get_ride(&self, ride_id: &str) -> SwiftaidResult<Ride> {
        self.gateway.get(&format!("/ride/{ride_id}")).await
    }

    async fn can_cancel_ride(&self, ride_id: &str) -> SwiftaidResult<CancelEligibility> {
        self.gateway
            .get(&format!("/ride/{ride_id}/can-cancel"))
            .await
    }

    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> SwiftaidResult<Ride> {
        let body = serde_json::json!({ "reason": reason });
        self.gateway
            .put(&format!("/ride/{ride_id}/cancel"), Some(body))
            .await
    }
}

#[async_trait]
impl DriverApi for ApiClient {
    async fn get_profile(&self) -> SwiftaidResult<DriverProfile> {
        self.gateway.get("/driver/profile").await
    }

    async fn update_profile(&self, profile: &DriverProfile) -> SwiftaidResult<DriverProfile> {
        let body = serde_json::to_value(profile)?;
        self.gateway.put("/driver/profile", Some(body)).await
    }

    async fn set_online_status(&self, is_online: bool) -> SwiftaidResult<()> {
        let body = serde_json::to_value(OnlineStatusUpdate { is_online })?;
        self.gateway.put_unit("/driver/online-status", Some(body)).await
    }

    async fn get_stats(&self) -> SwiftaidResult<DriverStats> {
        self.gateway.get("/driver/stats").await
    }

    async fn get_ride_history(&self, page: u32, limit: u32) -> SwiftaidResult<RideHistoryPage> {
        self.gateway
            .get(&format!("/driver/rides?page={page}&limit={limit}"))
            .await
    }
}
