//! SCD40 CO2 sensor (I2C): CO2 concentration with its own temperature and
//! humidity readings, plus a qualitative CO2 level.

use super::{
    error::SensorError,
    traits::Sensor,
    types::{jitter, round2, Reading, Sample, SensorResult, Value},
};

const SENSOR_NAME: &str = "scd40";

/// Qualitative label for a CO2 concentration in ppm.
pub fn co2_level(ppm: i64) -> &'static str {
    match ppm {
        p if p < 400 => "excellent",
        p if p < 600 => "good",
        p if p < 1000 => "fair",
        p if p < 1500 => "poor",
        _ => "bad",
    }
}

pub struct Scd40;

impl Scd40 {
    pub fn new() -> Self {
        Scd40
    }
}

impl Default for Scd40 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for Scd40 {
    fn name(&self) -> &'static str {
        SENSOR_NAME
    }

    fn initialize(&mut self) -> SensorResult<()> {
        Ok(())
    }

    fn read(&mut self) -> SensorResult<Reading> {
        // The chip wants a periodic-measurement session with CRC-guarded
        // word reads; that driver is not linked here. Run simulated.
        Err(SensorError::Hardware {
            sensor: SENSOR_NAME,
            reason: "no onboard driver; enable simulate for this sensor".to_string(),
        })
    }

    fn read_simulated(&mut self) -> SensorResult<Reading> {
        let co2 = jitter(800.0, 200.0).round() as i64;
        Ok(vec![
            Sample::new("co2", Value::Int(co2)),
            Sample::new("temperature", Value::Float(round2(jitter(23.0, 2.0)))),
            Sample::new("humidity", Value::Float(round2(jitter(50.0, 8.0)))),
            Sample::new("co2_level", Value::Text(co2_level(co2).to_string())),
        ])
    }

    fn unit(&self, field: &str) -> &'static str {
        match field {
            "co2" => "ppm",
            "temperature" => "°C",
            "humidity" => "%",
            "co2_level" => "level",
            _ => "",
        }
    }
}
