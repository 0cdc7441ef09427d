//! # Throttle Mapping Module
//!
//! Maps signed throttle percentages onto the ESC pulse widths driven out of the PWM chip. The
//! pulse ON edge is always tick 0; only the OFF edge moves with the demanded throttle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::pca9685::Pca9685;
use super::transport::RegisterTransport;
use super::PwmCtrlError;
use util::maths;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Lowest accepted throttle demand [%]
const THROTTLE_MIN_PCT: f64 = -100.0;

/// Highest accepted throttle demand [%]
const THROTTLE_MAX_PCT: f64 = 100.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Pulse width configuration for the thruster ESCs.
///
/// Widths are in ticks of the 4096-tick PWM frame. The defaults correspond to the standard
/// 1100/1500/1900 us ESC range at the nominal 50 Hz (20 ms) frame.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct ServoConfig {
    /// Full-reverse pulse width [ticks]
    pub pulse_min: u16,

    /// Neutral (zero throttle) pulse width [ticks]
    pub pulse_neutral: u16,

    /// Full-forward pulse width [ticks]
    pub pulse_max: u16,
}

/// Maps throttle percentage demands onto PWM channel writes.
pub struct ThrottleMapper {
    config: ServoConfig,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            pulse_min: 225,
            pulse_neutral: 307,
            pulse_max: 389,
        }
    }
}

impl ThrottleMapper {
    /// Create a new mapper with the given pulse configuration.
    pub fn new(config: ServoConfig) -> Self {
        Self { config }
    }

    /// Compute the pulse width in ticks for a throttle demand in [-100, 100] %.
    ///
    /// Demands outside the range are clamped, and the resulting width is clamped into
    /// [`ServoConfig::pulse_min`, `ServoConfig::pulse_max`].
    pub fn pulse_width(&self, throttle_pct: f64) -> u16 {
        let throttle = maths::clamp(&throttle_pct, &THROTTLE_MIN_PCT, &THROTTLE_MAX_PCT);

        let range = (self.config.pulse_max - self.config.pulse_min) as f64;
        let pulse = self.config.pulse_neutral as f64 + throttle * range / 200.0;

        maths::clamp(
            &pulse,
            &(self.config.pulse_min as f64),
            &(self.config.pulse_max as f64),
        ) as u16
    }

    /// Drive one channel to the pulse width for the given throttle demand.
    pub fn set_throttle<T: RegisterTransport>(
        &self,
        pwm: &mut Pca9685<T>,
        channel: u8,
        throttle_pct: f64,
    ) -> Result<(), PwmCtrlError> {
        pwm.set_channel_pwm(channel, 0, self.pulse_width(throttle_pct))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::pca9685::Pca9685Config;
    use super::super::transport::mock::{MockTransport, Transaction};
    use super::*;

    #[test]
    fn test_pulse_width_endpoints() {
        let mapper = ThrottleMapper::new(ServoConfig::default());

        assert_eq!(mapper.pulse_width(-100.0), 225);
        assert_eq!(mapper.pulse_width(0.0), 307);
        assert_eq!(mapper.pulse_width(100.0), 389);
    }

    #[test]
    fn test_pulse_width_is_linear() {
        let mapper = ThrottleMapper::new(ServoConfig::default());

        // +/-50% sit halfway between neutral and the endpoints
        assert_eq!(mapper.pulse_width(50.0), 348);
        assert_eq!(mapper.pulse_width(-50.0), 266);
        assert_eq!(mapper.pulse_width(25.0), 327);
    }

    #[test]
    fn test_pulse_width_clamps_throttle() {
        let mapper = ThrottleMapper::new(ServoConfig::default());

        assert_eq!(mapper.pulse_width(-250.0), mapper.pulse_width(-100.0));
        assert_eq!(mapper.pulse_width(250.0), mapper.pulse_width(100.0));
    }

    #[test]
    fn test_set_throttle_writes_channel() {
        let mapper = ThrottleMapper::new(ServoConfig::default());
        let mut pwm = Pca9685::new(MockTransport::new(), Pca9685Config::default());

        mapper.set_throttle(&mut pwm, 0, 100.0).unwrap();

        // ON edge fixed at tick 0, OFF edge at full-forward pulse (389 = 0x185)
        assert_eq!(
            pwm.free().log,
            vec![
                Transaction::WriteReg { reg: 0x06, value: 0x00 },
                Transaction::WriteReg { reg: 0x07, value: 0x00 },
                Transaction::WriteReg { reg: 0x08, value: 0x85 },
                Transaction::WriteReg { reg: 0x09, value: 0x01 },
            ]
        );
    }
}
