//! BH1750 ambient light sensor (I2C).
//!
//! The protocol is simple enough to speak directly: power the chip on,
//! reset the data register, select continuous high-resolution mode, then
//! read two bytes per measurement. The raw word divided by 1.2 gives lux.

use tracing::debug;

use super::{
    error::SensorError,
    traits::{I2cLink, Sensor},
    types::{jitter, round2, Reading, Sample, SensorResult, Value},
};

const SENSOR_NAME: &str = "bh1750";

const POWER_ON: u8 = 0x01;
const RESET: u8 = 0x07;
const POWER_DOWN: u8 = 0x00;
const CONTINUOUS_HIGH_RES_MODE: u8 = 0x10;

/// Datasheet conversion factor from the raw register to lux.
const LUX_DIVISOR: f64 = 1.2;

/// Qualitative label for an illuminance in lux.
pub fn light_level(lux: f64) -> &'static str {
    match lux {
        l if l < 10.0 => "dark",
        l if l < 50.0 => "dim",
        l if l < 200.0 => "low",
        l if l < 500.0 => "medium",
        l if l < 1000.0 => "bright",
        _ => "very_bright",
    }
}

pub struct Bh1750 {
    link: Option<Box<dyn I2cLink>>,
    initialized: bool,
}

impl Bh1750 {
    pub fn new() -> Self {
        Bh1750 {
            link: None,
            initialized: false,
        }
    }

    pub fn with_link(link: Box<dyn I2cLink>) -> Self {
        Bh1750 {
            link: Some(link),
            initialized: false,
        }
    }
}

impl Default for Bh1750 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for Bh1750 {
    fn name(&self) -> &'static str {
        SENSOR_NAME
    }

    fn initialize(&mut self) -> SensorResult<()> {
        if let Some(link) = self.link.as_mut() {
            for command in [POWER_ON, RESET, CONTINUOUS_HIGH_RES_MODE] {
                link.write_byte(command).map_err(|source| SensorError::Io {
                    sensor: SENSOR_NAME,
                    source,
                })?;
            }
        }
        self.initialized = true;
        Ok(())
    }

    fn read(&mut self) -> SensorResult<Reading> {
        if !self.initialized {
            return Err(SensorError::NotInitialized(SENSOR_NAME));
        }
        let link = self
            .link
            .as_mut()
            .ok_or(SensorError::NoHardwareLink(SENSOR_NAME))?;

        let mut raw = [0u8; 2];
        link.read_bytes(&mut raw).map_err(|source| SensorError::Io {
            sensor: SENSOR_NAME,
            source,
        })?;

        let lux = round2(f64::from(u16::from_be_bytes(raw)) / LUX_DIVISOR);
        Ok(reading_from(lux))
    }

    fn read_simulated(&mut self) -> SensorResult<Reading> {
        let lux = round2(jitter(300.0, 150.0).max(0.0));
        Ok(reading_from(lux))
    }

    fn shutdown(&mut self) -> SensorResult<()> {
        if let Some(link) = self.link.as_mut() {
            if let Err(source) = link.write_byte(POWER_DOWN) {
                debug!(sensor = SENSOR_NAME, error = %source, "power-down write failed");
            }
        }
        self.initialized = false;
        Ok(())
    }

    fn unit(&self, field: &str) -> &'static str {
        match field {
            "illuminance" => "lux",
            "light_level" => "level",
            _ => "",
        }
    }
}

fn reading_from(lux: f64) -> Reading {
    vec![
        Sample::new("illuminance", Value::Float(lux)),
        Sample::new("light_level", Value::Text(light_level(lux).to_string())),
    ]
}
