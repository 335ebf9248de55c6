//! Local feedback indicators: a status light and an audible alert.
//!
//! The traits exist so deployments with an RGB LED or a buzzer can slot in
//! real drivers; the default build runs entirely silent. Indicator failures
//! must never affect the data path, so every method is infallible.

/// Visual status output.
pub trait StatusLight: Send {
    /// Steady "all well" indication.
    fn ok(&mut self) {}

    /// Degraded but running (link down, sensor skipped).
    fn warning(&mut self) {}

    /// Persistent error state.
    fn error(&mut self) {}

    /// Transient activity or informational blink.
    fn info(&mut self) {}

    /// One short error flash, used per faulted poll cycle.
    fn flash_error(&mut self) {}

    /// Everything dark; the shutdown state.
    fn off(&mut self) {}
}

/// Audible output.
pub trait AudibleAlert: Send {
    fn beep(&mut self) {}
}

/// The no-op implementations used when no hardware indicators exist.
pub struct SilentLight;
impl StatusLight for SilentLight {}

pub struct SilentAlert;
impl AudibleAlert for SilentAlert {}

/// Everything the scheduler signals through, bundled.
pub struct Indicators {
    pub light: Box<dyn StatusLight>,
    pub alert: Box<dyn AudibleAlert>,
}

impl Indicators {
    pub fn new(light: Box<dyn StatusLight>, alert: Box<dyn AudibleAlert>) -> Self {
        Indicators { light, alert }
    }

    /// A fully silent set, the default for headless nodes.
    pub fn silent() -> Self {
        Indicators {
            light: Box::new(SilentLight),
            alert: Box::new(SilentAlert),
        }
    }
}
