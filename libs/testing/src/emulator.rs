use std::io::{Read, Write};

use log::debug;

use splitflap_core::{Frame, FrameError, FrameReader};

use crate::VirtualSplitflap;

/// Makes a [`VirtualSplitflap`] answer a real host over a byte stream such as a serial port.
///
/// Typically the port is one end of a USB serial null-modem cable, letting host software be
/// developed and debugged without a physical display attached.
///
/// # Examples
///
/// ```no_run
/// use splitflap_serial::{open_port, READ_TIMEOUT};
/// use splitflap_testing::{Emulator, VirtualSplitflap};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let port = open_port("/dev/ttyUSB1", READ_TIMEOUT)?;
/// let mut emulator = Emulator::new(port, VirtualSplitflap::new(12));
/// loop {
///     // Host requests are answered by the virtual display.
///     match emulator.process_frame() {
///         Ok(()) => {}
///         Err(e) if e.is_io() => continue, // read timeout
///         Err(e) => return Err(e.into()),
///     }
/// }
/// #
/// # }
/// ```
///
/// Note: You would typically use the `env_logger` crate and run with
/// `RUST_LOG=debug` to watch the messages go by.
///
/// [`VirtualSplitflap`]: struct.VirtualSplitflap.html
#[derive(Debug)]
pub struct Emulator<P: Read + Write> {
    port: FrameReader<P>,
    device: VirtualSplitflap,
}

impl<P: Read + Write> Emulator<P> {
    /// Creates a new `Emulator` answering requests on `port` with `device`.
    pub fn new(port: P, device: VirtualSplitflap) -> Self {
        Emulator {
            port: FrameReader::new(port),
            device,
        }
    }

    /// Returns the virtual display.
    pub fn device(&self) -> &VirtualSplitflap {
        &self.device
    }

    /// Reads the next frame from the host, hands it to the virtual display,
    /// and writes back any responses.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if reading or writing the port fails, which includes read timeouts.
    ///
    /// [`FrameError::Io`]: ../splitflap_core/enum.FrameError.html#variant.Io
    pub fn process_frame(&mut self) -> Result<(), FrameError> {
        let frame = self.port.read_frame()?;
        let responses = self.device.process_frame(&frame);

        for response in responses {
            debug!("Emulator reply: {}", response);
            let frame: Frame<'static> = response.to_frame();
            frame.write(self.port.get_mut())?;
        }

        Ok(())
    }
}
