//! Fleet monitor server: storage, concurrency control and HTTP surface for
//! the drone fleet lifecycle.

pub mod api;
pub mod backoff;
pub mod config;
pub mod locks;
pub mod persistence;
pub mod service;

pub use service::FleetService;
