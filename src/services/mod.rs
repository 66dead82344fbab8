// src/services/mod.rs
pub mod api;
pub mod gateway;
pub mod navigation;
pub mod orchestrator;
pub mod profile_service;
pub mod realtime;
pub mod ride_service;
pub mod session_store;
