//! Sensor-level errors.
//!
//! A failed read is never fatal to the node: the registry records the error
//! against the one sensor that produced it and the cycle carries on with
//! whatever the other sensors returned.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    /// The device answered, but with something unusable.
    #[error("{sensor}: hardware fault: {reason}")]
    Hardware {
        sensor: &'static str,
        reason: String,
    },

    /// The bus or serial link failed underneath the sensor.
    #[error("{sensor}: io error")]
    Io {
        sensor: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Framing or checksum failure on a wire protocol.
    #[error("{sensor}: frame integrity failure: {reason}")]
    FrameIntegrity {
        sensor: &'static str,
        reason: String,
    },

    /// `read()` was called before `initialize()` succeeded.
    #[error("{0}: not initialized")]
    NotInitialized(&'static str),

    /// Live read requested but no hardware link was attached.
    #[error("{0}: no hardware link configured")]
    NoHardwareLink(&'static str),
}

impl SensorError {
    /// Which sensor raised this error; the registry logs faults under this
    /// name so errors stay attributable even when re-wrapped.
    pub fn sensor(&self) -> &'static str {
        match self {
            SensorError::Hardware { sensor, .. } => sensor,
            SensorError::Io { sensor, .. } => sensor,
            SensorError::FrameIntegrity { sensor, .. } => sensor,
            SensorError::NotInitialized(sensor) => sensor,
            SensorError::NoHardwareLink(sensor) => sensor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_names_its_sensor() {
        let errors = [
            SensorError::Hardware {
                sensor: "bme680",
                reason: "bad calibration".into(),
            },
            SensorError::Io {
                sensor: "bme680",
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "bus stalled"),
            },
            SensorError::FrameIntegrity {
                sensor: "bme680",
                reason: "checksum".into(),
            },
            SensorError::NotInitialized("bme680"),
            SensorError::NoHardwareLink("bme680"),
        ];
        for error in errors {
            assert_eq!(error.sensor(), "bme680");
        }
    }
}
