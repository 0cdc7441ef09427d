//! # Thruster Control Executable
//!
//! This executable is responsible for driving the vehicle's thrusters through a PCA9685 PWM
//! controller on the I2C bus. It brings the chip up at the configured output frequency, arms
//! every thruster ESC at neutral, and holds that safe state until terminated.
//!
//! Deciding what non-neutral throttle to demand is the control layer's job, not this exec's.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};

// Internal
use thruster_lib::params::ThrusterExecParams;
use thruster_lib::pwm_ctrl::pca9685::Pca9685;
use thruster_lib::pwm_ctrl::throttle::ThrottleMapper;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("thruster_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Thruster Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ThrusterExecParams = util::params::load("thruster_exec.toml")?;

    info!("Parameters loaded");

    // ---- DRIVER INITIALISATION ----

    let transport = build_transport(&params)?;

    let mut pwm = Pca9685::new(transport, params.pwm);

    pwm.init().wrap_err("Failed to initialise the PWM chip")?;

    pwm.set_pwm_freq(params.pwm_freq_hz)
        .wrap_err("Failed to set the PWM output frequency")?;

    info!("PCA9685 initialised at {} Hz", params.pwm_freq_hz);

    let mapper = ThrottleMapper::new(params.servo);

    // ---- SAFE MODE ----

    // Arm every thruster at neutral and hold it there, re-asserting periodically
    info!(
        "Arming thrusters on channels {:?} at neutral",
        params.thruster_channels
    );

    loop {
        for &channel in &params.thruster_channels {
            if let Err(e) = mapper.set_throttle(&mut pwm, channel, 0.0) {
                warn!("Failed to set channel {} to neutral: {}", channel, e);
            }
        }

        std::thread::sleep(std::time::Duration::from_millis(params.safe_hold_period_ms));
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the register transport for this platform.
#[cfg(feature = "sim")]
fn build_transport(
    _params: &ThrusterExecParams,
) -> Result<thruster_lib::pwm_ctrl::transport::SimTransport> {
    use thruster_lib::pwm_ctrl::transport::SimTransport;

    warn!("Using the simulation transport, no hardware will be driven");

    Ok(SimTransport::new())
}

/// Build the register transport for this platform.
#[cfg(all(not(feature = "sim"), target_arch = "arm"))]
fn build_transport(
    params: &ThrusterExecParams,
) -> Result<thruster_lib::pwm_ctrl::transport::I2cTransport<rppal::i2c::I2c, rppal::hal::Delay>> {
    use thruster_lib::pwm_ctrl::transport::I2cTransport;

    let i2c = rppal::i2c::I2c::with_bus(params.i2c_bus).wrap_err("Failed to open the I2C bus")?;

    Ok(I2cTransport::new(i2c, rppal::hal::Delay::new()))
}

#[cfg(all(not(feature = "sim"), not(target_arch = "arm")))]
compile_error!("The hardware transport is only available on the Pi targets, build with `sim`");
