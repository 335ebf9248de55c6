//! Sensor registry: owns every enabled sensor and isolates their failures.
//!
//! A sensor that fails to initialize is marked unhealthy and skipped from
//! then on; a sensor that fails a read loses only that cycle's contribution.
//! The node as a whole only refuses to run when configuration enables no
//! sensors at all, or when every enabled sensor fails to come up.

use tracing::{error, info, warn};

use crate::config::sensors::SensorsConfig;

use super::{
    bh1750::Bh1750,
    bme680::Bme680,
    error::SensorError,
    pms5003::Pms5003,
    scd40::Scd40,
    traits::Sensor,
    types::{Metric, SensorResult},
};

struct SensorEntry {
    sensor: Box<dyn Sensor>,
    simulate: bool,
    healthy: bool,
}

pub struct SensorRegistry {
    entries: Vec<SensorEntry>,
}

impl SensorRegistry {
    /// Builds the registry from configuration. Enabled sensors are
    /// constructed here; nothing touches hardware until `initialize_all`.
    pub fn from_config(config: &SensorsConfig) -> SensorResult<Self> {
        let mut registry = SensorRegistry {
            entries: Vec::new(),
        };

        if config.pms5003.enabled {
            registry.register(Box::new(Pms5003::new()), config.pms5003.simulate);
        }
        if config.bme680.enabled {
            registry.register(Box::new(Bme680::new()), config.bme680.simulate);
        }
        if config.scd40.enabled {
            registry.register(Box::new(Scd40::new()), config.scd40.simulate);
        }
        if config.bh1750.enabled {
            registry.register(Box::new(Bh1750::new()), config.bh1750.simulate);
        }

        if registry.entries.is_empty() {
            return Err(SensorError::Hardware {
                sensor: "registry",
                reason: "no sensors enabled".to_string(),
            });
        }

        Ok(registry)
    }

    /// Adds a sensor directly. Used by `from_config` and by tests that need
    /// scripted sensors in the registry.
    pub fn register(&mut self, sensor: Box<dyn Sensor>, simulate: bool) {
        info!(
            sensor = sensor.name(),
            simulate, "registering sensor"
        );
        self.entries.push(SensorEntry {
            sensor,
            simulate,
            healthy: true,
        });
    }

    /// Initializes every registered sensor. Simulated entries skip hardware
    /// bring-up. Failures demote the sensor to unhealthy rather than
    /// propagating; the caller decides whether zero healthy sensors is fatal.
    pub fn initialize_all(&mut self) {
        for entry in &mut self.entries {
            if entry.simulate {
                continue;
            }
            if let Err(e) = entry.sensor.initialize() {
                error!(sensor = e.sensor(), error = %e, "initialization failed; sensor disabled");
                entry.healthy = false;
            }
        }
    }

    /// Reads every healthy sensor, stamping all metrics with the shared
    /// cycle timestamp. A failed read is logged and costs that sensor this
    /// cycle only.
    pub fn read_all(&mut self, timestamp: u64) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for entry in &mut self.entries {
            if !entry.healthy {
                continue;
            }
            match entry.sensor.collect(timestamp, entry.simulate) {
                Ok(collected) => metrics.extend(collected),
                Err(e) => {
                    warn!(sensor = e.sensor(), error = %e, "read failed; skipping this cycle");
                }
            }
        }
        metrics
    }

    /// Puts every sensor in a safe state. Shutdown errors are logged only.
    pub fn shutdown_all(&mut self) {
        for entry in &mut self.entries {
            if let Err(e) = entry.sensor.shutdown() {
                warn!(sensor = e.sensor(), error = %e, "shutdown failed");
            }
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.entries.iter().filter(|e| e.healthy).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// An empty registry for scripted-sensor tests.
    #[cfg(test)]
    pub(crate) fn empty_for_tests() -> Self {
        SensorRegistry {
            entries: Vec::new(),
        }
    }
}
