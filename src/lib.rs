// src/lib.rs
//
// Orchestration core for the SwiftAid driver app: REST gateway, realtime
// channel, ride lifecycle, two-leg navigation, and a crash-recoverable
// session mirror, composed behind one orchestrator facade.

pub mod errors;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use errors::{SwiftaidError, SwiftaidResult};
pub use models::events::{RealtimeEvent, RideNotice};
pub use models::ride::{GeoPoint, Ride, RideStatus};
pub use models::route::{NavigationStage, StageGoal};
pub use services::gateway::AuthTokens;
pub use services::navigation::RouteProvider;
pub use services::orchestrator::Orchestrator;
pub use state::{AppConfig, AppState};

/// Install the process-wide log subscriber. Respects `RUST_LOG`; defaults
/// to `info` for this crate.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("swiftaid_driver=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
