//! The sensor abstraction and the normalization step shared by all of them.

use super::types::{Metric, Reading, SensorResult};

/// A physical (or simulated) measurement device.
///
/// Reads are synchronous: every supported device answers in single-digit
/// milliseconds over I2C or has already buffered its frame on UART, so the
/// poll scheduler calls these directly from its cycle.
pub trait Sensor: Send {
    /// Short lowercase name, also the namespace prefix of every metric this
    /// sensor produces.
    fn name(&self) -> &'static str;

    /// Brings the device up. Called once before the first read; a failure
    /// marks the sensor unhealthy and excludes it from polling.
    fn initialize(&mut self) -> SensorResult<()>;

    /// One pass over the live hardware.
    fn read(&mut self) -> SensorResult<Reading>;

    /// One pass of plausible synthetic data, for running without hardware.
    fn read_simulated(&mut self) -> SensorResult<Reading>;

    /// Puts the device in a safe state. Errors are logged, not propagated.
    fn shutdown(&mut self) -> SensorResult<()> {
        Ok(())
    }

    /// Unit string for one of this sensor's fields. Unknown fields map to
    /// the empty unit.
    fn unit(&self, field: &str) -> &'static str;

    /// Reads (live or simulated) and normalizes the result: each raw sample
    /// becomes a [`Metric`] named `{sensor}/{field}` with its unit attached
    /// and the caller's cycle timestamp.
    fn collect(&mut self, timestamp: u64, simulate: bool) -> SensorResult<Vec<Metric>> {
        let reading = if simulate {
            self.read_simulated()?
        } else {
            self.read()?
        };

        Ok(reading
            .into_iter()
            .map(|sample| Metric {
                name: format!("{}/{}", self.name(), sample.field),
                unit: self.unit(sample.field),
                value: sample.value,
                timestamp,
            })
            .collect())
    }
}

/// Minimal I2C access used by sensors with an in-crate protocol
/// implementation. Kept narrow so tests can script bus traffic.
pub trait I2cLink: Send {
    fn write_byte(&mut self, byte: u8) -> std::io::Result<()>;
    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()>;
}
