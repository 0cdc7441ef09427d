//! # Thruster Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::pwm_ctrl::pca9685::Pca9685Config;
use crate::pwm_ctrl::throttle::ServoConfig;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ThrusterExecParams {
    /// I2C bus number the PWM chip is attached to
    pub i2c_bus: u8,

    /// Global PWM output frequency [Hz]
    pub pwm_freq_hz: f64,

    /// Channels with a thruster ESC attached
    pub thruster_channels: Vec<u8>,

    /// Period between safe-mode neutral re-asserts [ms]
    pub safe_hold_period_ms: u64,

    /// PWM chip configuration
    #[serde(default)]
    pub pwm: Pca9685Config,

    /// Thruster ESC pulse width configuration
    #[serde(default)]
    pub servo: ServoConfig,
}
