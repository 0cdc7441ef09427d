//! # PCA9685 Driver Module
//!
//! Driver for the NXP PCA9685 16-channel 12-bit PWM controller, covering reset/init sequencing,
//! output frequency programming and per-channel duty cycle writes.
//!
//! The frequency programming sequence is the delicate part: the chip only accepts a new prescaler
//! while its oscillator is stopped (SLEEP set), and the PWM counters must not be restarted until
//! the oscillator has had time to settle after wake-up. [`Pca9685::set_pwm_freq`] encodes that
//! ordering and must not be reordered.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use serde::Deserialize;

use super::transport::RegisterTransport;
use super::PwmCtrlError;
use util::maths;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of PWM channels on the chip
pub const NUM_CHANNELS: u8 = 16;

/// Maximum ON/OFF tick count within the 4096-tick PWM frame
pub const TICK_MAX: u16 = 4095;

/// Number of ticks in one PWM frame
const TICKS_PER_FRAME: f64 = 4096.0;

/// Number of registers per channel (ON low/high, OFF low/high)
const REGS_PER_CHANNEL: u8 = 4;

/// Lowest output frequency accepted before conversion [Hz]
const FREQ_MIN_HZ: f64 = 1.0;

/// Highest output frequency accepted before conversion [Hz]
const FREQ_MAX_HZ: f64 = 3500.0;

/// Settling time after a reset [ms]
const RESET_SETTLE_MS: u32 = 10;

/// Settling time for the oscillator after leaving sleep [ms]
const OSC_SETTLE_MS: u32 = 5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Configuration for a single PCA9685 chip.
///
/// Defaults carry the datasheet register map and the internal oscillator frequency, so parameter
/// files normally only override the address or write strategy. Keeping the register map here
/// rather than in hardcoded constants allows driving chip revisions or clones with a different
/// layout without touching the driver.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct Pca9685Config {
    /// 7-bit I2C device address
    pub address: u8,

    /// MODE1 register address
    pub mode1_reg: u8,

    /// PRE_SCALE register address
    pub prescale_reg: u8,

    /// LED0_ON_L register address, the base of the channel register block
    pub led0_on_l_reg: u8,

    /// RESTART bit within MODE1
    pub mode1_restart: u8,

    /// Register auto-increment bit within MODE1
    pub mode1_auto_incr: u8,

    /// SLEEP bit within MODE1
    pub mode1_sleep: u8,

    /// Internal oscillator frequency [Hz]
    pub osc_freq_hz: f64,

    /// Minimum valid PRE_SCALE value
    pub prescale_min: u8,

    /// Maximum valid PRE_SCALE value
    pub prescale_max: u8,

    /// Timeout for the presence probe during init [ms]
    pub probe_timeout_ms: u32,

    /// How channel register blocks are written
    pub write_strategy: WriteStrategy,
}

/// Driver for one PCA9685 chip on the bus.
pub struct Pca9685<T: RegisterTransport> {
    transport: T,
    config: Pca9685Config,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Strategy used to write a channel's 4-byte register block.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Four single-byte register writes
    SingleByte,

    /// One multi-byte transaction relying on register auto-increment, which
    /// [`Pca9685::set_pwm_freq`] enables as its final step
    AutoIncrement,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Pca9685Config {
    fn default() -> Self {
        Self {
            address: 0x40,
            mode1_reg: 0x00,
            prescale_reg: 0xFE,
            led0_on_l_reg: 0x06,
            mode1_restart: 0x80,
            mode1_auto_incr: 0x20,
            mode1_sleep: 0x10,
            osc_freq_hz: 25_000_000.0,
            prescale_min: 3,
            prescale_max: 255,
            probe_timeout_ms: 1000,
            write_strategy: WriteStrategy::SingleByte,
        }
    }
}

impl<T: RegisterTransport> Pca9685<T> {
    /// Create a new driver instance over the given transport.
    ///
    /// No bus traffic occurs until [`Pca9685::init`] is called.
    pub fn new(transport: T, config: Pca9685Config) -> Self {
        Self { transport, config }
    }

    /// Consume the driver, releasing the underlying transport.
    pub fn free(self) -> T {
        self.transport
    }

    /// Check the chip is present on the bus, then reset it into a known state.
    ///
    /// Fails with [`PwmCtrlError::DeviceNotReady`] without issuing any register traffic if the
    /// presence probe times out.
    pub fn init(&mut self) -> Result<(), PwmCtrlError> {
        let cfg = self.config;

        if !self.transport.probe(cfg.address, cfg.probe_timeout_ms) {
            return Err(PwmCtrlError::DeviceNotReady(cfg.address));
        }

        debug!("PCA9685 present at 0x{:02X}", cfg.address);

        self.reset()
    }

    /// Force the chip into a known state by writing the RESTART bit to MODE1.
    ///
    /// The chip needs time to come back up afterwards, so a fixed settling delay follows the
    /// write on the success path.
    pub fn reset(&mut self) -> Result<(), PwmCtrlError> {
        let cfg = self.config;

        self.transport
            .write_register(cfg.address, cfg.mode1_reg, cfg.mode1_restart)?;

        self.transport.sleep_ms(RESET_SETTLE_MS);

        Ok(())
    }

    /// Set the PWM output frequency for all channels.
    ///
    /// The chip only accepts prescaler writes while the oscillator is stopped, so the sequence
    /// is: read MODE1, write it back with SLEEP set (and RESTART cleared, writing a 1 there would
    /// restart the counters), write the prescaler, restore the original MODE1, wait for the
    /// oscillator to settle, then set RESTART together with register auto-increment. Restarting
    /// before the settle delay glitches the outputs.
    ///
    /// MODE1 bits other than SLEEP/RESTART/auto-increment are preserved exactly.
    ///
    /// On failure the chip may be left asleep; the caller must [`Pca9685::init`] again before
    /// further use.
    pub fn set_pwm_freq(&mut self, freq_hz: f64) -> Result<(), PwmCtrlError> {
        let cfg = self.config;
        let prescale = self.compute_prescale(freq_hz);

        debug!("Setting PWM frequency to {} Hz (prescale {})", freq_hz, prescale);

        let old_mode = self
            .transport
            .read_register(cfg.address, cfg.mode1_reg)?;

        // Stop the oscillator
        let sleep_mode = (old_mode & !cfg.mode1_restart) | cfg.mode1_sleep;
        self.transport
            .write_register(cfg.address, cfg.mode1_reg, sleep_mode)?;

        self.transport
            .write_register(cfg.address, cfg.prescale_reg, prescale)?;

        // Wake up with the original mode bits
        self.transport
            .write_register(cfg.address, cfg.mode1_reg, old_mode)?;

        self.transport.sleep_ms(OSC_SETTLE_MS);

        self.transport.write_register(
            cfg.address,
            cfg.mode1_reg,
            old_mode | cfg.mode1_restart | cfg.mode1_auto_incr,
        )?;

        Ok(())
    }

    /// Compute the PRE_SCALE value for the given output frequency.
    ///
    /// The frequency is clamped to [1, 3500] Hz before conversion and the result is clamped to
    /// the valid prescaler range. The float result is truncated, not rounded, when narrowed to a
    /// byte.
    pub fn compute_prescale(&self, freq_hz: f64) -> u8 {
        let freq = maths::clamp(&freq_hz, &FREQ_MIN_HZ, &FREQ_MAX_HZ);

        let prescale = self.config.osc_freq_hz / (freq * TICKS_PER_FRAME) - 1.0;

        maths::clamp(
            &prescale,
            &(self.config.prescale_min as f64),
            &(self.config.prescale_max as f64),
        ) as u8
    }

    /// Set the ON and OFF ticks for one channel.
    ///
    /// `on` and `off` are clamped to the 12-bit tick range. The channel index is a programming
    /// contract, not a hardware input, so out-of-range values are rejected rather than clamped.
    ///
    /// A transport failure part-way through leaves the channel's registers inconsistent until a
    /// subsequent successful call.
    pub fn set_channel_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<(), PwmCtrlError> {
        if channel >= NUM_CHANNELS {
            return Err(PwmCtrlError::InvalidChannel(channel));
        }

        let cfg = self.config;

        let on = on.min(TICK_MAX);
        let off = off.min(TICK_MAX);

        trace!("Channel {}: on = {}, off = {}", channel, on, off);

        let base_reg = cfg.led0_on_l_reg + channel * REGS_PER_CHANNEL;
        let bytes = [
            on as u8,
            (on >> 8) as u8,
            off as u8,
            (off >> 8) as u8,
        ];

        match cfg.write_strategy {
            WriteStrategy::SingleByte => {
                for (i, byte) in bytes.iter().enumerate() {
                    self.transport
                        .write_register(cfg.address, base_reg + i as u8, *byte)?;
                }
            }
            WriteStrategy::AutoIncrement => {
                self.transport
                    .write_registers(cfg.address, base_reg, &bytes)?;
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::super::transport::mock::{MockTransport, Transaction};
    use super::*;

    fn driver(transport: MockTransport) -> Pca9685<MockTransport> {
        Pca9685::new(transport, Pca9685Config::default())
    }

    #[test]
    fn test_compute_prescale() {
        let pwm = driver(MockTransport::new());

        // 25 MHz / (50 Hz * 4096) - 1 = 121.07, truncated
        assert_eq!(pwm.compute_prescale(50.0), 121);

        // 25 MHz / (200 Hz * 4096) - 1 = 29.52: truncation, not rounding
        assert_eq!(pwm.compute_prescale(200.0), 29);

        // Extremes clamp to the valid prescaler range
        assert_eq!(pwm.compute_prescale(1.0), 255);
        assert_eq!(pwm.compute_prescale(3500.0), 3);

        // Out-of-range frequencies clamp to the boundary frequency first
        assert_eq!(pwm.compute_prescale(0.25), pwm.compute_prescale(1.0));
        assert_eq!(pwm.compute_prescale(9000.0), pwm.compute_prescale(3500.0));
    }

    #[test]
    fn test_set_pwm_freq_sequence() {
        // MODE1 preloaded with an unrelated bit (ALLCALL) which must survive the sequence
        let mut pwm = driver(MockTransport::with_mode1(0x01));

        pwm.set_pwm_freq(50.0).unwrap();

        assert_eq!(
            pwm.transport.log,
            vec![
                Transaction::ReadReg { reg: 0x00 },
                // Sleep variant: RESTART cleared, SLEEP set, ALLCALL untouched
                Transaction::WriteReg { reg: 0x00, value: 0x11 },
                Transaction::WriteReg { reg: 0xFE, value: 121 },
                // Original mode restored before the settle delay
                Transaction::WriteReg { reg: 0x00, value: 0x01 },
                Transaction::Sleep { ms: 5 },
                // RESTART and auto-increment on top of the original mode
                Transaction::WriteReg { reg: 0x00, value: 0xA1 },
            ]
        );
    }

    #[test]
    fn test_set_pwm_freq_short_circuits_on_failure() {
        // First write (sleep variant) succeeds, second (prescale) fails
        let mut pwm = driver(MockTransport::with_mode1(0x00).failing_after(1));

        let result = pwm.set_pwm_freq(50.0);

        assert!(matches!(result, Err(PwmCtrlError::Bus(_))));

        // Nothing after the failed prescale write: no wake, no delay, no restart
        assert_eq!(
            pwm.transport.log,
            vec![
                Transaction::ReadReg { reg: 0x00 },
                Transaction::WriteReg { reg: 0x00, value: 0x10 },
            ]
        );
    }

    #[test]
    fn test_reset_sequence() {
        let mut pwm = driver(MockTransport::new());

        pwm.reset().unwrap();

        assert_eq!(
            pwm.transport.log,
            vec![
                Transaction::WriteReg { reg: 0x00, value: 0x80 },
                Transaction::Sleep { ms: 10 },
            ]
        );
    }

    #[test]
    fn test_reset_failure_skips_delay() {
        let mut pwm = driver(MockTransport::new().failing_after(0));

        assert!(pwm.reset().is_err());
        assert!(pwm.transport.log.is_empty());
    }

    #[test]
    fn test_init_absent_device_is_not_ready() {
        let mut pwm = driver(MockTransport::absent());

        let result = pwm.init();

        assert!(matches!(result, Err(PwmCtrlError::DeviceNotReady(0x40))));

        // No register traffic may occur when the probe fails
        assert!(pwm.transport.log.is_empty());
    }

    #[test]
    fn test_set_channel_pwm_single_byte() {
        let mut pwm = driver(MockTransport::new());

        pwm.set_channel_pwm(3, 100, 2048).unwrap();

        // Channel 3 block starts at 0x06 + 3*4 = 0x12, little-endian on then off
        assert_eq!(
            pwm.transport.log,
            vec![
                Transaction::WriteReg { reg: 0x12, value: 100 },
                Transaction::WriteReg { reg: 0x13, value: 0 },
                Transaction::WriteReg { reg: 0x14, value: 0x00 },
                Transaction::WriteReg { reg: 0x15, value: 0x08 },
            ]
        );
    }

    #[test]
    fn test_set_channel_pwm_auto_increment() {
        let mut config = Pca9685Config::default();
        config.write_strategy = WriteStrategy::AutoIncrement;
        let mut pwm = Pca9685::new(MockTransport::new(), config);

        pwm.set_channel_pwm(3, 100, 2048).unwrap();

        assert_eq!(
            pwm.transport.log,
            vec![Transaction::WriteRegs {
                reg: 0x12,
                values: vec![100, 0, 0x00, 0x08],
            }]
        );
    }

    #[test]
    fn test_set_channel_pwm_clamps_ticks() {
        let mut pwm = driver(MockTransport::new());

        pwm.set_channel_pwm(0, 4096, 9999).unwrap();

        // Both counts clamp to 4095 = 0x0FFF
        assert_eq!(
            pwm.transport.log,
            vec![
                Transaction::WriteReg { reg: 0x06, value: 0xFF },
                Transaction::WriteReg { reg: 0x07, value: 0x0F },
                Transaction::WriteReg { reg: 0x08, value: 0xFF },
                Transaction::WriteReg { reg: 0x09, value: 0x0F },
            ]
        );
    }

    #[test]
    fn test_set_channel_pwm_rejects_bad_channel() {
        let mut pwm = driver(MockTransport::new());

        let result = pwm.set_channel_pwm(16, 0, 0);

        assert!(matches!(result, Err(PwmCtrlError::InvalidChannel(16))));
        assert!(pwm.transport.log.is_empty());
    }

    #[test]
    fn test_set_channel_pwm_round_trip() {
        let mut pwm = driver(MockTransport::new());

        pwm.set_channel_pwm(5, 100, 2048).unwrap();

        // Reconstruct the counts from the raw register file
        let base = (0x06 + 5 * 4) as usize;
        let regs = &pwm.transport.regs;
        let on = regs[base] as u16 | ((regs[base + 1] as u16) << 8);
        let off = regs[base + 2] as u16 | ((regs[base + 3] as u16) << 8);

        assert_eq!(on, 100);
        assert_eq!(off, 2048);
    }

    #[test]
    fn test_set_channel_pwm_partial_failure() {
        // Third byte write of the block fails
        let mut pwm = driver(MockTransport::new().failing_after(2));

        assert!(pwm.set_channel_pwm(0, 100, 2048).is_err());

        // The first two bytes landed, the rest were never attempted
        assert_eq!(
            pwm.transport.log,
            vec![
                Transaction::WriteReg { reg: 0x06, value: 100 },
                Transaction::WriteReg { reg: 0x07, value: 0 },
            ]
        );
    }
}
