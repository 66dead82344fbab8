// src/models/events.rs
//
// Closed event taxonomy for the realtime channel. Every inbound frame is
// one of these kinds; unknown types are dropped at the parse site rather
// than leaking stringly-typed payloads into the rest of the crate.

use serde::{Deserialize, Serialize};

use crate::models::ride::{GeoPoint, Ride};

/// Inbound events from the matching server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    RideStatusChanged {
        ride: Ride,
    },
    RideLocationChanged {
        #[serde(rename = "rideId")]
        ride_id: String,
        location: GeoPoint,
    },
    NewRideAvailable {
        ride: Ride,
    },
    RideCancelled {
        ride: Ride,
        #[serde(rename = "cancelledBy")]
        cancelled_by: String,
        message: String,
    },
    RideNotification {
        #[serde(rename = "rideId")]
        ride_id: String,
        message: String,
    },
}

/// Outbound frames sent to the matching server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChannelFrame {
    Auth {
        token: String,
    },
    Subscribe {
        #[serde(rename = "rideId")]
        ride_id: String,
    },
    Unsubscribe {
        #[serde(rename = "rideId")]
        ride_id: String,
    },
}

/// Notices the core surfaces to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RideNotice {
    /// The accepted ride was cancelled by someone other than the driver.
    RideCancelled {
        ride_id: String,
        cancelled_by: String,
        message: String,
    },
    /// The server reported the driver has arrived at the pickup point.
    ArrivedAtPickup { ride_id: String },
    /// A milestone was confirmed by the server (pickup or dropoff).
    StageConfirmed {
        ride_id: String,
        status: crate::models::ride::RideStatus,
    },
    /// A generic per-ride message from the server.
    Notification { ride_id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver::VehicleType;
    use crate::models::ride::{RideStatus, RideStop};
    use chrono::Utc;

    fn sample_ride() -> Ride {
        Ride {
            id: "ride-1".into(),
            status: RideStatus::Searching,
            pickup: RideStop {
                address: "Osu".into(),
                point: GeoPoint {
                    latitude: 5.55,
                    longitude: -0.18,
                },
            },
            drop: RideStop {
                address: "Korle Bu".into(),
                point: GeoPoint {
                    latitude: 5.53,
                    longitude: -0.23,
                },
            },
            fare: 120.0,
            vehicle: VehicleType::BasicAmbulance,
            otp: "4821".into(),
            cancellation: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_tag_dispatch() {
        let json = serde_json::json!({
            "type": "ride_location_changed",
            "rideId": "ride-1",
            "location": { "latitude": 5.5501, "longitude": -0.1799 }
        });
        let event: RealtimeEvent = serde_json::from_value(json).unwrap();
        match event {
            RealtimeEvent::RideLocationChanged { ride_id, location } => {
                assert_eq!(ride_id, "ride-1");
                assert_eq!(location.latitude, 5.5501);
            }
            other => panic!("wrong event kind: {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_event_carries_actor_and_message() {
        let mut ride = sample_ride();
        ride.status = RideStatus::Cancelled;
        let json = serde_json::json!({
            "type": "ride_cancelled",
            "ride": ride,
            "cancelledBy": "patient",
            "message": "Patient no longer needs transport"
        });
        let event: RealtimeEvent = serde_json::from_value(json).unwrap();
        match event {
            RealtimeEvent::RideCancelled {
                cancelled_by,
                message,
                ..
            } => {
                assert_eq!(cancelled_by, "patient");
                assert!(message.contains("no longer needs"));
            }
            other => panic!("wrong event kind: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_fails_to_parse() {
        let json = serde_json::json!({ "type": "promo_blast", "message": "hi" });
        assert!(serde_json::from_value::<RealtimeEvent>(json).is_err());
    }

    #[test]
    fn test_subscribe_frame_wire_format() {
        let frame = ChannelFrame::Subscribe {
            ride_id: "ride-7".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "event": "subscribe", "rideId": "ride-7" })
        );
    }

    #[test]
    fn test_auth_frame_wire_format() {
        let frame = ChannelFrame::Auth {
            token: "tok".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "auth", "token": "tok" }));
    }
}
