//! PMS5003 particulate matter sensor (UART).
//!
//! The device continuously streams 32-byte binary frames: two sync bytes
//! `0x42 0x4D`, a 16-bit payload length (always 28), six standard plus six
//! atmospheric PM readings, reserved words, and a 16-bit checksum over
//! everything before it. The serial line is noisy in practice, so the
//! decoder scans for sync rather than trusting alignment, verifies every
//! checksum, and resynchronizes after a corrupt frame.

use std::io::Read;

use tracing::debug;

use super::{
    error::SensorError,
    traits::Sensor,
    types::{jitter, Reading, Sample, SensorResult, Value},
};

const SENSOR_NAME: &str = "pms5003";

const SYNC_HIGH: u8 = 0x42;
const SYNC_LOW: u8 = 0x4D;

/// Everything after the two sync bytes: length word, 13 data words, checksum.
const BODY_LEN: usize = 30;

/// Value of the length word for the standard 32-byte frame.
const PAYLOAD_LEN: u16 = 28;

/// How many sync candidates the decoder will try before declaring the
/// stream unusable. Interstitial noise does not count against this; only
/// bytes that look like the start of a frame do.
const DEFAULT_MAX_ATTEMPTS: u8 = 5;

/// How many non-sync bytes the decoder will skip before declaring the
/// stream unusable. Four frame lengths of garbage means the line is not
/// carrying frames at all, and the read must fail rather than spin.
const MAX_NOISE_BYTES: usize = 128;

/// EPA PM2.5 breakpoint table: (c_low, c_high, i_low, i_high).
const AQI_SEGMENTS: [(f64, f64, u16, u16); 6] = [
    (0.0, 12.0, 0, 50),
    (12.1, 35.4, 51, 100),
    (35.5, 55.4, 101, 150),
    (55.5, 150.4, 151, 200),
    (150.5, 250.4, 201, 300),
    (250.5, 500.4, 301, 500),
];

/// EPA AQI for a PM2.5 concentration in µg/m³.
///
/// Negative inputs clamp to zero and anything beyond the table caps at 500.
/// Concentrations falling in the gaps between published breakpoints (the
/// table is defined to one decimal place) resolve to the segment above.
pub fn aqi_from_pm2_5(pm2_5: f64) -> u16 {
    let c = pm2_5.max(0.0);
    for (c_low, c_high, i_low, i_high) in AQI_SEGMENTS {
        if c <= c_high {
            let ratio = ((c - c_low) / (c_high - c_low)).max(0.0);
            return (ratio * f64::from(i_high - i_low) + f64::from(i_low)).round() as u16;
        }
    }
    500
}

/// One decoded frame. Standard readings are factory-calibrated values;
/// atmospheric readings are corrected for ambient conditions and are what
/// gets published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub pm1_0_std: u16,
    pub pm2_5_std: u16,
    pub pm10_std: u16,
    pub pm1_0_atm: u16,
    pub pm2_5_atm: u16,
    pub pm10_atm: u16,
}

impl Frame {
    fn parse(body: &[u8; BODY_LEN]) -> Result<Frame, String> {
        let word = |i: usize| u16::from_be_bytes([body[i], body[i + 1]]);

        let length = word(0);
        if length != PAYLOAD_LEN {
            return Err(format!("unexpected payload length {length}"));
        }

        let expected = word(BODY_LEN - 2);
        let actual = checksum(body);
        if expected != actual {
            return Err(format!(
                "checksum mismatch: expected {expected:#06x}, computed {actual:#06x}"
            ));
        }

        Ok(Frame {
            pm1_0_std: word(2),
            pm2_5_std: word(4),
            pm10_std: word(6),
            pm1_0_atm: word(8),
            pm2_5_atm: word(10),
            pm10_atm: word(12),
        })
    }
}

/// Sum of both sync bytes and the body up to (not including) the checksum
/// word, modulo 65536.
pub fn checksum(body: &[u8; BODY_LEN]) -> u16 {
    let sum: u32 = u32::from(SYNC_HIGH)
        + u32::from(SYNC_LOW)
        + body[..BODY_LEN - 2].iter().map(|&b| u32::from(b)).sum::<u32>();
    (sum % 65536) as u16
}

/// Scans a byte stream for the next verifiable frame.
pub struct FrameDecoder {
    max_attempts: u8,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl FrameDecoder {
    pub fn new(max_attempts: u8) -> Self {
        FrameDecoder { max_attempts }
    }

    /// Reads until a frame with a valid checksum appears.
    ///
    /// Bytes that do not look like a sync marker are skipped, up to a fixed
    /// noise allowance; each sync candidate that fails validation consumes
    /// one attempt, and once either budget runs out the stream is reported
    /// as corrupt.
    pub fn next_frame<R: Read>(&self, reader: &mut R) -> SensorResult<Frame> {
        let mut attempts = 0u8;
        let mut skipped = 0usize;
        let mut carry: Option<u8> = None;

        loop {
            let first = match carry.take() {
                Some(byte) => byte,
                None => read_byte(reader)?,
            };
            if first != SYNC_HIGH {
                skipped += 1;
                if skipped > MAX_NOISE_BYTES {
                    return Err(SensorError::FrameIntegrity {
                        sensor: SENSOR_NAME,
                        reason: format!("no sync marker in {skipped} bytes"),
                    });
                }
                continue;
            }

            attempts += 1;
            let second = read_byte(reader)?;
            if second != SYNC_LOW {
                // The mismatched byte may itself start the real frame.
                carry = Some(second);
                self.check_budget(attempts, "sync")?;
                continue;
            }

            let mut body = [0u8; BODY_LEN];
            reader
                .read_exact(&mut body)
                .map_err(|source| SensorError::Io {
                    sensor: SENSOR_NAME,
                    source,
                })?;

            match Frame::parse(&body) {
                Ok(frame) => return Ok(frame),
                Err(reason) => {
                    debug!(sensor = SENSOR_NAME, %reason, "discarding corrupt frame");
                    self.check_budget(attempts, &reason)?;
                }
            }
        }
    }

    fn check_budget(&self, attempts: u8, last_reason: &str) -> SensorResult<()> {
        if attempts >= self.max_attempts {
            return Err(SensorError::FrameIntegrity {
                sensor: SENSOR_NAME,
                reason: format!(
                    "no valid frame in {attempts} sync candidates (last: {last_reason})"
                ),
            });
        }
        Ok(())
    }
}

fn read_byte<R: Read>(reader: &mut R) -> SensorResult<u8> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .map_err(|source| SensorError::Io {
            sensor: SENSOR_NAME,
            source,
        })?;
    Ok(byte[0])
}

/// The sensor itself. Live mode decodes frames off an attached serial
/// reader; simulated mode synthesizes typical indoor air.
pub struct Pms5003 {
    link: Option<Box<dyn Read + Send>>,
    decoder: FrameDecoder,
}

impl Pms5003 {
    pub fn new() -> Self {
        Pms5003 {
            link: None,
            decoder: FrameDecoder::default(),
        }
    }

    pub fn with_link(link: Box<dyn Read + Send>) -> Self {
        Pms5003 {
            link: Some(link),
            decoder: FrameDecoder::default(),
        }
    }
}

impl Default for Pms5003 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for Pms5003 {
    fn name(&self) -> &'static str {
        SENSOR_NAME
    }

    fn initialize(&mut self) -> SensorResult<()> {
        // The device streams unprompted; there is nothing to configure.
        Ok(())
    }

    fn read(&mut self) -> SensorResult<Reading> {
        let link = self
            .link
            .as_mut()
            .ok_or(SensorError::NoHardwareLink(SENSOR_NAME))?;
        let frame = self.decoder.next_frame(link)?;

        Ok(reading_from(
            i64::from(frame.pm1_0_atm),
            i64::from(frame.pm2_5_atm),
            i64::from(frame.pm10_atm),
        ))
    }

    fn read_simulated(&mut self) -> SensorResult<Reading> {
        let pm1_0 = jitter(8.0, 5.0).max(0.0).round() as i64;
        let pm2_5 = jitter(12.0, 8.0).max(0.0).round() as i64;
        let pm10 = jitter(18.0, 10.0).max(0.0).round() as i64;
        Ok(reading_from(pm1_0, pm2_5, pm10))
    }

    fn unit(&self, field: &str) -> &'static str {
        match field {
            "pm1_0" | "pm2_5" | "pm10" => "µg/m³",
            "pm2_5_aqi" => "AQI",
            _ => "",
        }
    }
}

fn reading_from(pm1_0: i64, pm2_5: i64, pm10: i64) -> Reading {
    vec![
        Sample::new("pm1_0", Value::Int(pm1_0)),
        Sample::new("pm2_5", Value::Int(pm2_5)),
        Sample::new("pm10", Value::Int(pm10)),
        Sample::new("pm2_5_aqi", Value::Int(i64::from(aqi_from_pm2_5(pm2_5 as f64)))),
    ]
}
