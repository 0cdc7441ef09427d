//! # Register Transport Module
//!
//! Abstracts the raw I2C register access needed by the PWM chip driver behind the
//! [`RegisterTransport`] trait, so the driver can run against the real bus, the simulation
//! transport, or a test double.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;
#[cfg(feature = "sim")]
use log::trace;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period between presence probe attempts
const PROBE_RETRY_MS: u32 = 10;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait providing the raw bus primitives consumed by the PWM chip driver.
///
/// Addresses are 7-bit I2C device addresses. Register writes are single-transaction memory
/// writes, i.e. the register address is sent in the same transaction as the payload bytes.
pub trait RegisterTransport {
    /// Check whether a device is present at `addr`, retrying until `timeout_ms` has elapsed.
    fn probe(&mut self, addr: u8, timeout_ms: u32) -> bool;

    /// Read a single register.
    fn read_register(&mut self, addr: u8, reg: u8) -> Result<u8, TransportError>;

    /// Write a single register.
    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), TransportError>;

    /// Write consecutive registers starting at `reg` in one transaction.
    ///
    /// The device must have register auto-increment enabled for this to land in consecutive
    /// registers rather than repeatedly hitting `reg`.
    fn write_registers(&mut self, addr: u8, reg: u8, values: &[u8]) -> Result<(), TransportError>;

    /// Block for the given number of milliseconds.
    fn sleep_ms(&mut self, ms: u32);
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by a register transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("I2C write to register 0x{reg:02X} failed: {detail}")]
    Write { reg: u8, detail: String },

    #[error("I2C read of register 0x{reg:02X} failed: {detail}")]
    Read { reg: u8, detail: String },
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A [`RegisterTransport`] over any blocking `embedded-hal` I2C bus and delay provider.
///
/// On the Pi targets the concrete types come from `rppal` (with its `hal` feature enabled).
pub struct I2cTransport<I2C, D> {
    i2c: I2C,
    delay: D,
}

/// A [`RegisterTransport`] backed by an in-memory register file, for running off-target.
///
/// Every transaction is logged at trace level and always succeeds. Reads observe previous writes
/// so the driver's read-modify-write sequences behave as they would against the chip.
#[cfg(feature = "sim")]
pub struct SimTransport {
    regs: [u8; 256],
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, D, E> I2cTransport<I2C, D>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
    E: std::fmt::Debug,
    D: DelayMs<u32>,
{
    /// Create a new transport over the given bus and delay provider.
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }
}

impl<I2C, D, E> RegisterTransport for I2cTransport<I2C, D>
where
    I2C: i2c::Write<Error = E> + i2c::WriteRead<Error = E>,
    E: std::fmt::Debug,
    D: DelayMs<u32>,
{
    fn probe(&mut self, addr: u8, timeout_ms: u32) -> bool {
        // A zero-byte write acts as a presence ping: it is acknowledged by the device without
        // touching any register.
        let mut elapsed_ms = 0;

        loop {
            if self.i2c.write(addr, &[]).is_ok() {
                return true;
            }

            if elapsed_ms >= timeout_ms {
                return false;
            }

            self.delay.delay_ms(PROBE_RETRY_MS);
            elapsed_ms += PROBE_RETRY_MS;
        }
    }

    fn read_register(&mut self, addr: u8, reg: u8) -> Result<u8, TransportError> {
        let mut buf = [0u8; 1];

        match self.i2c.write_read(addr, &[reg], &mut buf) {
            Ok(_) => Ok(buf[0]),
            Err(e) => Err(TransportError::Read {
                reg,
                detail: format!("{:?}", e),
            }),
        }
    }

    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<(), TransportError> {
        match self.i2c.write(addr, &[reg, value]) {
            Ok(_) => Ok(()),
            Err(e) => Err(TransportError::Write {
                reg,
                detail: format!("{:?}", e),
            }),
        }
    }

    fn write_registers(&mut self, addr: u8, reg: u8, values: &[u8]) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(values.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(values);

        match self.i2c.write(addr, &frame) {
            Ok(_) => Ok(()),
            Err(e) => Err(TransportError::Write {
                reg,
                detail: format!("{:?}", e),
            }),
        }
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

#[cfg(feature = "sim")]
impl SimTransport {
    /// Create a new simulation transport with all registers zeroed.
    pub fn new() -> Self {
        Self { regs: [0u8; 256] }
    }
}

#[cfg(feature = "sim")]
impl RegisterTransport for SimTransport {
    fn probe(&mut self, addr: u8, _timeout_ms: u32) -> bool {
        trace!("SIM: probe 0x{:02X}", addr);
        true
    }

    fn read_register(&mut self, _addr: u8, reg: u8) -> Result<u8, TransportError> {
        let value = self.regs[reg as usize];
        trace!("SIM: read 0x{:02X} -> 0x{:02X}", reg, value);
        Ok(value)
    }

    fn write_register(&mut self, _addr: u8, reg: u8, value: u8) -> Result<(), TransportError> {
        trace!("SIM: write 0x{:02X} <- 0x{:02X}", reg, value);
        self.regs[reg as usize] = value;
        Ok(())
    }

    fn write_registers(&mut self, _addr: u8, reg: u8, values: &[u8]) -> Result<(), TransportError> {
        trace!("SIM: write 0x{:02X} <- {:02X?}", reg, values);

        // The chip's auto-increment wraps around the top of the register file
        for (i, value) in values.iter().enumerate() {
            self.regs[reg.wrapping_add(i as u8) as usize] = *value;
        }

        Ok(())
    }

    fn sleep_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(ms as u64));
    }
}

// ------------------------------------------------------------------------------------------------
// TEST DOUBLES
// ------------------------------------------------------------------------------------------------
