//! Actuator gateway
//!
//! Commands go out as newline-terminated ASCII (`"left\n"`). When the device
//! can't be opened the gate keeps running against a simulated actuator that
//! only logs.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::command::Command;
use crate::config::ActuatorConfig;
use crate::{Error, Result};

/// Serial write timeout
const SERIAL_TIMEOUT: Duration = Duration::from_millis(500);

/// Relays commands to the hardware
///
/// Errors are contained by the caller: a failed send is recorded and the
/// session continues.
pub trait ActuatorGateway: Send {
    /// Transmit one command
    ///
    /// # Errors
    ///
    /// Returns [`Error::Actuator`] if the command could not be written
    fn send(&mut self, command: Command) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Writes commands to a serial port
pub struct SerialActuator {
    name: String,
    port: Box<dyn Write + Send>,
}

impl SerialActuator {
    /// Open the port at `baud`, then wait `boot_delay` for the board to reset
    ///
    /// Blocks for at least `boot_delay`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Actuator`] if the port cannot be opened
    pub fn open(path: &Path, baud: u32, boot_delay: Duration) -> Result<Self> {
        let name = path.to_string_lossy().into_owned();
        let port = serialport::new(name.as_str(), baud)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|e| Error::Actuator(format!("{name}: {e}")))?;

        // Opening toggles DTR, which resets most boards
        std::thread::sleep(boot_delay);

        tracing::info!(port = %name, baud, "actuator connected");

        Ok(Self::from_writer(name, Box::new(port)))
    }

    /// Use an already-open port
    #[must_use]
    pub fn from_writer(name: impl Into<String>, port: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl ActuatorGateway for SerialActuator {
    fn send(&mut self, command: Command) -> Result<()> {
        self.port
            .write_all(format!("{command}\n").as_bytes())
            .and_then(|()| self.port.flush())
            .map_err(|e| Error::Actuator(format!("{}: {e}", self.name)))?;

        tracing::debug!(%command, port = %self.name, "command written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial {}", self.name)
    }
}

/// Logs commands instead of sending them
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    sent: usize,
}

impl SimulatedActuator {
    /// Create a simulated actuator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands "sent" so far
    #[must_use]
    pub const fn sent(&self) -> usize {
        self.sent
    }
}

impl ActuatorGateway for SimulatedActuator {
    fn send(&mut self, command: Command) -> Result<()> {
        self.sent += 1;
        tracing::info!(%command, "[simulated] actuator command");
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

/// Open the configured actuator, falling back to simulation
///
/// Simulation is used when `simulate` is set, no port is configured or the
/// port can't be opened. Blocks through the board's boot delay.
#[must_use]
pub fn connect(config: &ActuatorConfig) -> Box<dyn ActuatorGateway> {
    if config.simulate {
        tracing::info!("actuator simulation enabled");
        return Box::new(SimulatedActuator::new());
    }

    let Some(port) = config.port.as_deref() else {
        tracing::warn!("no actuator port configured, simulating");
        return Box::new(SimulatedActuator::new());
    };

    match SerialActuator::open(port, config.baud, config.boot_delay) {
        Ok(actuator) => Box::new(actuator),
        Err(e) => {
            tracing::warn!(error = %e, "actuator unavailable, simulating");
            Box::new(SimulatedActuator::new())
        }
    }
}
