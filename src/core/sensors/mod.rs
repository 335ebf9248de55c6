//! Sensor drivers, the registry that owns them, and the shared metric types.

pub mod bh1750;
pub mod bme680;
pub mod error;
pub mod pms5003;
pub mod registry;
pub mod scd40;
pub mod traits;
pub mod types;

pub use error::SensorError;
pub use registry::SensorRegistry;
pub use traits::{I2cLink, Sensor};
pub use types::{Metric, Reading, Sample, SensorResult, Value};
