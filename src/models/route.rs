// src/models/route.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ride::GeoPoint;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub maneuver: String,
    pub instruction: String,
    pub start_location: Option<GeoPoint>,
    pub end_location: Option<GeoPoint>,
    /// Step length in meters.
    pub distance: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteInfo {
    /// Total route length in kilometers.
    pub distance: f64,
    /// Estimated travel time in minutes.
    pub duration: f64,
    pub steps: Vec<Step>,
    /// Encoded-polyline geometry, used when steps carry no coordinates.
    #[serde(default)]
    pub encoded_polyline: Option<String>,
}

/// Which leg of the trip is being navigated. Client-local; driven by ride
/// progress, never by the server directly.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStage {
    Idle,
    ToPatient,
    ToHospital,
    Completed,
}

impl NavigationStage {
    /// Stage transition table. `to_hospital` is reachable only once the
    /// pickup leg has been entered; the active legs admit themselves so a
    /// re-route within a leg stays valid.
    pub fn can_transition_to(&self, next: NavigationStage) -> bool {
        matches!(
            (self, next),
            (NavigationStage::Idle, NavigationStage::ToPatient)
                | (NavigationStage::Idle, NavigationStage::ToHospital)
                | (NavigationStage::ToPatient, NavigationStage::ToPatient)
                | (NavigationStage::ToPatient, NavigationStage::ToHospital)
                | (NavigationStage::ToHospital, NavigationStage::ToHospital)
                | (NavigationStage::ToHospital, NavigationStage::Completed)
                | (_, NavigationStage::Idle)
        )
    }
}

impl fmt::Display for NavigationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NavigationStage::Idle => "idle",
            NavigationStage::ToPatient => "to_patient",
            NavigationStage::ToHospital => "to_hospital",
            NavigationStage::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// Which milestone the driver just completed, as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageGoal {
    PatientPickup,
    HospitalArrival,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    pub stage: NavigationStage,
    pub is_navigating: bool,
    pub route: Option<RouteInfo>,
    /// Coordinate path derived from the route, for map display.
    pub path: Vec<GeoPoint>,
    pub destination: Option<GeoPoint>,
}

impl Default for NavigationStage {
    fn default() -> Self {
        NavigationStage::Idle
    }
}
