//! # PWM Controller Module
//!
//! This module provides the driver stack for the PCA9685 16-channel PWM controller which drives
//! the vehicle's thruster ESCs:
//!
//! - [`transport`] - raw I2C register access behind the [`transport::RegisterTransport`] trait
//! - [`pca9685`] - the chip driver itself (reset/init, frequency programming, channel writes)
//! - [`throttle`] - mapping of signed throttle percentages onto ESC pulse widths
//!
//! All operations are synchronous and blocking. Access to a single chip must be serialised by the
//! caller, as the multi-register sequences in the driver are not atomic with respect to other bus
//! users.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// PCA9685 chip driver.
pub mod pca9685;

/// Throttle percentage to pulse width mapping.
pub mod throttle;

/// Raw register transport abstraction.
pub mod transport;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the PWM controller stack.
#[derive(thiserror::Error, Debug)]
pub enum PwmCtrlError {
    /// A raw bus transaction failed. The chip may be left mid-sequence (for example asleep with a
    /// stale prescaler), in which case the caller must issue a new `init` before further use.
    #[error("Bus transaction failed: {0}")]
    Bus(#[from] transport::TransportError),

    #[error("No response from the PWM chip at address 0x{0:02X}")]
    DeviceNotReady(u8),

    #[error("Channel index {0} is outside the valid range 0-15")]
    InvalidChannel(u8),
}
