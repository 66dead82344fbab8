// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    BasicAmbulance,     // Transport-only, no life support on board
    AdvancedAmbulance,  // Advanced life support equipment
    NeonatalAmbulance,  // Incubator-equipped
    PatientTransport,   // Non-emergency wheelchair van
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub is_online: bool,
    pub vehicle_type: VehicleType,
    pub vehicle_plate: String,
    /// Medical-transport certification level, if any (e.g. EMT-B).
    #[serde(default)]
    pub certification: Option<String>,
    pub rating: f32,
    pub total_rides: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverStats {
    pub today_earnings: f64,
    pub weekly_earnings: f64,
    pub monthly_earnings: f64,
    pub today_rides: u32,
    pub weekly_rides: u32,
    pub monthly_rides: u32,
    pub rating: f32,
}

/// One page of the driver's past rides (`GET /driver/rides?page&limit`).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RideHistoryPage {
    pub rides: Vec<crate::models::ride::Ride>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatusUpdate {
    pub is_online: bool,
}
