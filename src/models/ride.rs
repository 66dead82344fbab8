// src/models/ride.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::driver::VehicleType;

/// Server-authoritative lifecycle stage of one transport request.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Searching,       // Ride created, waiting for a driver
    Start,           // Driver accepted and is en route to the patient
    Arrived,         // Driver arrived at the pickup point
    PickupComplete,  // Patient on board, heading to the hospital
    DropoffComplete, // Patient delivered at the hospital
    Completed,       // Ride closed out
    Cancelled,       // Cancelled by either party
}

impl RideStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Client-side transition table.
    ///
    /// Status moves forward one step at a time along
    /// SEARCHING -> START -> ARRIVED -> PICKUP_COMPLETE -> DROPOFF_COMPLETE
    /// -> COMPLETED, and CANCELLED is reachable from any non-terminal state.
    /// The server is the enforcement authority, but the client must never
    /// offer a backward move.
    pub fn can_transition_to(&self, next: RideStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RideStatus::Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (RideStatus::Searching, RideStatus::Start)
                | (RideStatus::Start, RideStatus::Arrived)
                | (RideStatus::Arrived, RideStatus::PickupComplete)
                | (RideStatus::PickupComplete, RideStatus::DropoffComplete)
                | (RideStatus::DropoffComplete, RideStatus::Completed)
        )
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RideStatus::Searching => "SEARCHING",
            RideStatus::Start => "START",
            RideStatus::Arrived => "ARRIVED",
            RideStatus::PickupComplete => "PICKUP_COMPLETE",
            RideStatus::DropoffComplete => "DROPOFF_COMPLETE",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One end of a ride: a human-readable address plus its coordinate.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RideStop {
    pub address: String,
    #[serde(flatten)]
    pub point: GeoPoint,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_by: String,
    pub cancelled_at: DateTime<Utc>,
    pub cancel_reason: Option<String>,
    pub cancellation_fee: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: String,
    pub status: RideStatus,
    pub pickup: RideStop,
    pub drop: RideStop,
    pub fare: f64,
    pub vehicle: VehicleType,
    /// 4-digit code the patient reads back to verify the driver reached
    /// the right person.
    pub otp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dry-run answer from `GET /ride/:id/can-cancel`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelEligibility {
    pub allowed: bool,
    #[serde(default)]
    pub fee: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(RideStatus::Searching.can_transition_to(RideStatus::Start));
        assert!(RideStatus::Start.can_transition_to(RideStatus::Arrived));
        assert!(RideStatus::Arrived.can_transition_to(RideStatus::PickupComplete));
        assert!(RideStatus::PickupComplete.can_transition_to(RideStatus::DropoffComplete));
        assert!(RideStatus::DropoffComplete.can_transition_to(RideStatus::Completed));
    }

    #[test]
    fn test_arrived_only_advances_to_pickup_complete_or_cancelled() {
        let from = RideStatus::Arrived;
        assert!(from.can_transition_to(RideStatus::PickupComplete));
        assert!(from.can_transition_to(RideStatus::Cancelled));
        assert!(!from.can_transition_to(RideStatus::Searching));
        assert!(!from.can_transition_to(RideStatus::Start));
        assert!(!from.can_transition_to(RideStatus::DropoffComplete));
        assert!(!from.can_transition_to(RideStatus::Completed));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!RideStatus::Completed.can_transition_to(RideStatus::Start));
        assert!(!RideStatus::PickupComplete.can_transition_to(RideStatus::Arrived));
        assert!(!RideStatus::DropoffComplete.can_transition_to(RideStatus::Searching));
    }

    #[test]
    fn test_cancelled_reachable_from_any_non_terminal() {
        for status in [
            RideStatus::Searching,
            RideStatus::Start,
            RideStatus::Arrived,
            RideStatus::PickupComplete,
            RideStatus::DropoffComplete,
        ] {
            assert!(status.can_transition_to(RideStatus::Cancelled), "{status}");
        }
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for status in [RideStatus::Completed, RideStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(RideStatus::Cancelled));
            assert!(!status.can_transition_to(RideStatus::Start));
        }
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&RideStatus::PickupComplete).unwrap();
        assert_eq!(json, "\"PICKUP_COMPLETE\"");
        let parsed: RideStatus = serde_json::from_str("\"DROPOFF_COMPLETE\"").unwrap();
        assert_eq!(parsed, RideStatus::DropoffComplete);
    }

    #[test]
    fn test_ride_stop_flattens_coordinates() {
        let json = r#"{"address":"37 Military Hospital","latitude":5.58,"longitude":-0.18}"#;
        let stop: RideStop = serde_json::from_str(json).unwrap();
        assert_eq!(stop.address, "37 Military Hospital");
        assert_eq!(stop.point.latitude, 5.58);
        assert_eq!(stop.point.longitude, -0.18);
    }

    #[test]
    fn test_cancellation_fields_are_camel_case() {
        let json = r#"{
            "cancelledBy": "patient",
            "cancelledAt": "2025-08-28T10:00:00Z",
            "cancelReason": "no longer needed",
            "cancellationFee": 5.0
        }"#;
        let c: Cancellation = serde_json::from_str(json).unwrap();
        assert_eq!(c.cancelled_by, "patient");
        assert_eq!(c.cancellation_fee, Some(5.0));
    }
}
