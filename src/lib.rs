//! smartsense-node — environmental sensing node with MQTT publishing
//!
//! This crate is the device-resident half of a small environmental
//! monitoring system. It polls a set of air and light sensors on a fixed
//! cadence, normalizes their readings into namespaced metrics, and
//! publishes aggregated snapshots to an MQTT broker alongside a retained
//! online/offline status. It is built for long-running unattended
//! operation: sensor failures are isolated, broker outages are ridden out,
//! and shutdown is graceful.
//!
//! ## Modules
//!
//! * `config` — Configuration structures, loading, validation, and defaults.
//!   Supports TOML configuration files with validation via the `validator`
//!   crate.
//!
//! * `core` — Core runtime components:
//!   - Sensor drivers (PMS5003, BME680, SCD40, BH1750) and their traits
//!   - Sensor registry with per-sensor fault isolation
//!   - Poll scheduler driving the read/publish loop
//!   - Local status indicator abstractions
//!
//! * `logger` — Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! The broker session itself lives in the `smartsense-mqtt` crate.

pub mod config;
pub mod core;
pub mod logger;
