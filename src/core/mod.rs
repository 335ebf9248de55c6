//! Core runtime: sensors, the registry, local indicators and the scheduler.

pub mod indicators;
pub mod scheduler;
pub mod sensors;
