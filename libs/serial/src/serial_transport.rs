use std::fmt::{self, Debug, Formatter};
use std::io;

use log::debug;
use serialport::SerialPort;

use splitflap_core::Transport;

use crate::serial_port::{self, SerialError, READ_TIMEOUT};

/// An implementation of `Transport` that talks to a display over a serial port.
///
/// Splitting duplicates the OS handle, so one thread can block reading while another writes.
///
/// # Examples
///
/// ```no_run
/// use splitflap_serial::SerialTransport;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let transport = match std::env::args().nth(1) {
///     Some(name) => SerialTransport::open(&name)?,
///     None => SerialTransport::open_first_available()?,
/// };
/// // Can now hand the transport to a Splitflap session.
/// #
/// # Ok(()) }
/// ```
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Wraps an already opened and configured port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        SerialTransport { port }
    }

    /// Opens the named port with the default read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Open`] if the port can't be opened.
    ///
    /// [`SerialError::Open`]: enum.SerialError.html#variant.Open
    pub fn open(name: &str) -> Result<Self, SerialError> {
        Ok(SerialTransport::new(serial_port::open_port(name, READ_TIMEOUT)?))
    }

    /// Opens whichever port the system lists first.
    ///
    /// Handy when exactly one display is plugged in.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::NoPortsAvailable`] if there are no ports, or any error from [`open`].
    ///
    /// [`SerialError::NoPortsAvailable`]: enum.SerialError.html#variant.NoPortsAvailable
    /// [`open`]: #method.open
    pub fn open_first_available() -> Result<Self, SerialError> {
        let name = serial_port::first_available_port()?;
        SerialTransport::open(&name)
    }

    /// Returns the name of the underlying port, if known.
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }

    /// Splits into read and write halves, reporting failure as a [`SerialError`].
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Clone`] if the handle can't be duplicated.
    ///
    /// [`SerialError`]: enum.SerialError.html
    /// [`SerialError::Clone`]: enum.SerialError.html#variant.Clone
    pub fn try_split(self) -> Result<(Box<dyn SerialPort>, Box<dyn SerialPort>), SerialError> {
        let writer = self.port.try_clone().map_err(|source| SerialError::Clone { source })?;
        debug!("Split serial port {:?} into reader and writer", self.port.name());
        Ok((self.port, writer))
    }
}

impl Transport for SerialTransport {
    type Reader = Box<dyn SerialPort>;
    type Writer = Box<dyn SerialPort>;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        self.try_split().map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

// Provide a Debug representation since the boxed port doesn't have one.
impl Debug for SerialTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SerialTransport({:?})", self.port.name())
    }
}
