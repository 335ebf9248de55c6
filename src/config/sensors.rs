//! Sensor enablement and poll cadence.
//!
//! Each supported sensor gets a `[sensors.<name>]` block with two flags:
//! `enabled` puts it in the registry, `simulate` replaces the hardware read
//! with a plausible synthetic one. Simulation keeps the whole pipeline
//! exercisable on a desk without a single wire attached.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Per-sensor flags.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Validate)]
#[serde(default)]
pub struct SensorConfig {
    pub enabled: bool,
    pub simulate: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            enabled: false,
            simulate: true,
        }
    }
}

/// The `[sensors]` section: cadence plus one block per supported sensor.
#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
#[serde(default)]
#[validate(schema(function = "at_least_one_enabled"))]
pub struct SensorsConfig {
    /// Seconds between sensor read cycles.
    #[validate(range(min = 1, max = 3600, message = "read_interval must be 1..=3600 seconds"))]
    pub read_interval: u64,

    /// PMS5003 particulate matter sensor (UART).
    pub pms5003: SensorConfig,

    /// BME680 temperature / humidity / pressure / gas sensor (I2C).
    pub bme680: SensorConfig,

    /// SCD40 CO2 sensor (I2C).
    pub scd40: SensorConfig,

    /// BH1750 ambient light sensor (I2C).
    pub bh1750: SensorConfig,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        SensorsConfig {
            read_interval: 60,
            pms5003: SensorConfig::default(),
            bme680: SensorConfig::default(),
            scd40: SensorConfig::default(),
            bh1750: SensorConfig::default(),
        }
    }
}

impl SensorsConfig {
    pub fn read_interval(&self) -> Duration {
        Duration::from_secs(self.read_interval)
    }

    pub fn enabled_count(&self) -> usize {
        [self.pms5003, self.bme680, self.scd40, self.bh1750]
            .iter()
            .filter(|s| s.enabled)
            .count()
    }
}

fn at_least_one_enabled(config: &SensorsConfig) -> Result<(), ValidationError> {
    if config.enabled_count() == 0 {
        let mut err = ValidationError::new("no_sensors_enabled");
        err.message = Some("at least one sensor must be enabled".into());
        return Err(err);
    }
    Ok(())
}
