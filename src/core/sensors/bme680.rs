//! BME680 environmental sensor (I2C): temperature, humidity, pressure and
//! a gas-resistance-derived air quality score.

use super::{
    error::SensorError,
    traits::Sensor,
    types::{jitter, round2, Reading, Sample, SensorResult, Value},
};

const SENSOR_NAME: &str = "bme680";

/// Gas resistance mapped linearly onto a 0..=100 score: 5 kΩ (heavily
/// polluted air) scores 0, 50 kΩ (clean air) scores 100.
const GAS_FLOOR_OHMS: f64 = 5_000.0;
const GAS_CEILING_OHMS: f64 = 50_000.0;

pub fn air_quality_score(gas_resistance: f64) -> f64 {
    let score = (gas_resistance - GAS_FLOOR_OHMS) / (GAS_CEILING_OHMS - GAS_FLOOR_OHMS) * 100.0;
    round2(score.clamp(0.0, 100.0))
}

pub struct Bme680;

impl Bme680 {
    pub fn new() -> Self {
        Bme680
    }
}

impl Default for Bme680 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for Bme680 {
    fn name(&self) -> &'static str {
        SENSOR_NAME
    }

    fn initialize(&mut self) -> SensorResult<()> {
        Ok(())
    }

    fn read(&mut self) -> SensorResult<Reading> {
        // Driving the real chip needs its vendor calibration procedure,
        // which this build does not link. Run this sensor simulated.
        Err(SensorError::Hardware {
            sensor: SENSOR_NAME,
            reason: "no onboard driver; enable simulate for this sensor".to_string(),
        })
    }

    fn read_simulated(&mut self) -> SensorResult<Reading> {
        let gas_resistance = jitter(30_000.0, 10_000.0);
        Ok(vec![
            Sample::new("temperature", Value::Float(round2(jitter(23.0, 3.0)))),
            Sample::new("humidity", Value::Float(round2(jitter(50.0, 10.0)))),
            Sample::new("pressure", Value::Float(round2(jitter(1013.0, 5.0)))),
            Sample::new("gas_resistance", Value::Float(round2(gas_resistance))),
            Sample::new(
                "air_quality_score",
                Value::Float(air_quality_score(gas_resistance)),
            ),
        ])
    }

    fn unit(&self, field: &str) -> &'static str {
        match field {
            "temperature" => "°C",
            "humidity" => "%",
            "pressure" => "hPa",
            "gas_resistance" => "Ω",
            "air_quality_score" => "score",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_linear_between_anchors() {
        assert_eq!(air_quality_score(5_000.0), 0.0);
        assert_eq!(air_quality_score(50_000.0), 100.0);
        assert_eq!(air_quality_score(27_500.0), 50.0);
    }

    #[test]
    fn score_clamps_outside_the_anchors() {
        assert_eq!(air_quality_score(1_000.0), 0.0);
        assert_eq!(air_quality_score(80_000.0), 100.0);
    }

    #[test]
    fn simulated_values_stay_in_range() {
        let mut sensor = Bme680::new();
        for _ in 0..20 {
            let reading = sensor.read_simulated().unwrap();
            assert_eq!(reading.len(), 5);
            let Value::Float(temperature) = reading[0].value else {
                panic!("temperature must be a float");
            };
            assert!((20.0..=26.0).contains(&temperature));
            let Value::Float(score) = reading[4].value else {
                panic!("score must be a float");
            };
            assert!((0.0..=100.0).contains(&score));
        }
    }

    #[test]
    fn live_read_reports_a_hardware_fault() {
        assert!(matches!(
            Bme680::new().read(),
            Err(SensorError::Hardware { sensor: "bme680", .. })
        ));
    }
}
