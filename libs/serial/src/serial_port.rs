use std::time::Duration;

use log::{debug, info};
use serialport::SerialPort;
use thiserror::Error;

/// Baud rate the display firmware listens at.
pub const BAUD_RATE: u32 = 230_400;

/// How long a read waits for data before returning a timeout error.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors related to opening serial ports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SerialError {
    /// Enumeration found no serial ports at all.
    #[error("No serial ports available")]
    NoPortsAvailable,

    /// The list of serial ports couldn't be read.
    #[error("Failed to enumerate serial ports")]
    Enumerate {
        /// The underlying error.
        #[source]
        source: serialport::Error,
    },

    /// The named port couldn't be opened or configured.
    #[error("Failed to open serial port {}", port)]
    Open {
        /// Name of the port.
        port: String,

        /// The underlying error.
        #[source]
        source: serialport::Error,
    },

    /// The port handle couldn't be duplicated into read and write halves.
    #[error("Failed to clone serial port handle")]
    Clone {
        /// The underlying error.
        #[source]
        source: serialport::Error,
    },
}

/// Opens and configures the named serial port for use with a split-flap display.
///
/// Specifically, the firmware requires 8N1 format at 230400 baud with no flow control.
/// Reads time out after `timeout` so callers can periodically check whether to stop.
///
/// # Errors
///
/// Returns [`SerialError::Open`] if the port doesn't exist or can't be configured.
///
/// # Examples
///
/// ```no_run
/// use splitflap_serial::{open_port, READ_TIMEOUT};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let port = open_port("/dev/ttyUSB0", READ_TIMEOUT)?;
/// // Now ready for communication with a display (8N1 230400 baud).
/// #
/// # Ok(()) }
/// ```
///
/// [`SerialError::Open`]: enum.SerialError.html#variant.Open
pub fn open_port(name: &str, timeout: Duration) -> Result<Box<dyn SerialPort>, SerialError> {
    debug!("Opening serial port {} at {} baud", name, BAUD_RATE);
    let port = serialport::new(name, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|source| SerialError::Open {
            port: name.to_string(),
            source,
        })?;
    info!("Opened serial port {}", name);
    Ok(port)
}

/// Returns the name of the first serial port the system reports.
///
/// # Errors
///
/// Returns:
/// * [`SerialError::Enumerate`] if the ports couldn't be listed.
/// * [`SerialError::NoPortsAvailable`] if there are none.
///
/// [`SerialError::Enumerate`]: enum.SerialError.html#variant.Enumerate
/// [`SerialError::NoPortsAvailable`]: enum.SerialError.html#variant.NoPortsAvailable
pub fn first_available_port() -> Result<String, SerialError> {
    let ports = serialport::available_ports().map_err(|source| SerialError::Enumerate { source })?;
    for port in &ports {
        debug!("Found serial port {} ({:?})", port.port_name, port.port_type);
    }
    ports
        .into_iter()
        .next()
        .map(|port| port.port_name)
        .ok_or(SerialError::NoPortsAvailable)
}
