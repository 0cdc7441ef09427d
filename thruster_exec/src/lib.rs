//! # Thruster Control Library
//!
//! Library target for the thruster control executable, exposing the PWM
//! controller driver stack so it can be unit tested and reused.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Parameters for the thruster executable.
pub mod params;

/// Driver stack for the PCA9685 PWM controller.
pub mod pwm_ctrl;
