//! # beacon-service
//!
//! Async host for the beacon-monitor ranging engine.
//!
//! This library provides:
//! - [`MonitorService`] - runs a [`beacon_core::BeaconMonitor`] on one tokio task,
//!   driving its battery-saver timer
//! - [`MonitorHandle`] - cloneable async handle used by the application and
//!   by the platform signal-source bridge
//! - [`logging`] - tracing subscriber setup for embedding applications

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod logging;
pub mod service;

pub use service::{MonitorHandle, MonitorService, ServiceError, DEFAULT_COMMAND_BUFFER};
