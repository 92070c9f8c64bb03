//! Fleet CLI - Command line tools for the fleet monitor.
//!
//! This crate provides:
//! - fleet_demo: end-to-end delivery walkthrough against a running server
//! - send_telemetry: flies an assigned task and streams its telemetry

pub mod args;
pub mod sim;

pub use sim::DeliveryFlight;
