use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{trace, warn};

use splitflap_core::{DeviceMessage, FrameDecoder, Transport};

use crate::VirtualSplitflap;

/// How long a virtual read waits for data before returning a timeout error.
pub const VIRTUAL_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// In-memory [`Transport`] connected to a [`VirtualSplitflap`].
///
/// Frames written by the host are handed straight to the virtual display, and its responses
/// become readable from the read half. A [`VirtualLink`] obtained before splitting lets tests
/// inspect the display, inject arbitrary bytes, or cut the link.
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use splitflap_core::{DeviceMessage, FrameReader, HostMessage, Nonce, Transport};
/// use splitflap_testing::{VirtualSplitflap, VirtualTransport};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let transport = VirtualTransport::new(VirtualSplitflap::new(4));
/// let link = transport.link();
/// let (reader, mut writer) = transport.split()?;
///
/// writer.write_all(&HostMessage::RequestState.to_frame(Nonce(1)).to_bytes())?;
///
/// let mut reader = FrameReader::new(reader);
/// let ack = DeviceMessage::from_payload(reader.read_frame()?.payload())?;
/// assert_eq!(DeviceMessage::Ack(Nonce(1)), ack);
/// assert_eq!(vec![Nonce(1)], link.device().received_nonces());
/// #
/// # Ok(()) }
/// ```
///
/// [`Transport`]: ../splitflap_core/trait.Transport.html
/// [`VirtualSplitflap`]: struct.VirtualSplitflap.html
/// [`VirtualLink`]: struct.VirtualLink.html
#[derive(Debug)]
pub struct VirtualTransport {
    link: VirtualLink,
    from_device: Receiver<Vec<u8>>,
    read_timeout: Duration,
}

impl VirtualTransport {
    /// Creates a new `VirtualTransport` connected to `device`.
    pub fn new(device: VirtualSplitflap) -> Self {
        let (to_host, from_device) = crossbeam_channel::unbounded();
        VirtualTransport {
            link: VirtualLink {
                device: Arc::new(Mutex::new(device)),
                to_host,
                written: Arc::new(Mutex::new(vec![])),
                closed: Arc::new(AtomicBool::new(false)),
            },
            from_device,
            read_timeout: VIRTUAL_READ_TIMEOUT,
        }
    }

    /// Sets how long a read waits for data before timing out.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Returns a handle to the far end of the link.
    pub fn link(&self) -> VirtualLink {
        self.link.clone()
    }
}

impl Transport for VirtualTransport {
    type Reader = VirtualReader;
    type Writer = VirtualWriter;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        let reader = VirtualReader {
            from_device: self.from_device,
            pending: vec![],
            closed: self.link.closed.clone(),
            timeout: self.read_timeout,
        };
        let writer = VirtualWriter {
            decoder: FrameDecoder::new(),
            link: self.link,
        };
        Ok((reader, writer))
    }
}

/// Handle to the display end of a [`VirtualTransport`].
///
/// Cheap to clone; all clones refer to the same link.
///
/// [`VirtualTransport`]: struct.VirtualTransport.html
#[derive(Debug, Clone)]
pub struct VirtualLink {
    device: Arc<Mutex<VirtualSplitflap>>,
    to_host: Sender<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl VirtualLink {
    /// Locks and returns the virtual display.
    pub fn device(&self) -> MutexGuard<'_, VirtualSplitflap> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends a message to the host as though the display produced it.
    pub fn send(&self, message: &DeviceMessage) {
        self.inject(&message.to_frame().to_bytes());
    }

    /// Sends raw bytes to the host, e.g. noise or a corrupted frame.
    pub fn inject(&self, bytes: &[u8]) {
        let _ = self.to_host.send(bytes.to_vec());
    }

    /// Returns every byte the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cuts the link. Subsequent reads and writes on either half fail with `BrokenPipe`.
    pub fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns whether [`disconnect`] has been called.
    ///
    /// [`disconnect`]: #method.disconnect
    pub fn is_disconnected(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Read half of a [`VirtualTransport`].
///
/// [`VirtualTransport`]: struct.VirtualTransport.html
#[derive(Debug)]
pub struct VirtualReader {
    from_device: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    closed: Arc<AtomicBool>,
    timeout: Duration,
}

impl Read for VirtualReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(disconnected());
        }

        if self.pending.is_empty() {
            match self.from_device.recv_timeout(self.timeout) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data from virtual display"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        let _ = self.pending.drain(..count);
        Ok(count)
    }
}

/// Write half of a [`VirtualTransport`].
///
/// [`VirtualTransport`]: struct.VirtualTransport.html
#[derive(Debug)]
pub struct VirtualWriter {
    decoder: FrameDecoder,
    link: VirtualLink,
}

impl Write for VirtualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.link.is_disconnected() {
            return Err(disconnected());
        }

        trace!("Virtual link received {} bytes", buf.len());
        self.link
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        self.decoder.extend(buf);

        loop {
            match self.decoder.decode() {
                Ok(Some(frame)) => {
                    let responses = self.link.device().process_frame(&frame);
                    for response in responses {
                        self.link.send(&response);
                    }
                }
                Ok(None) => break,
                Err(e) => warn!("Virtual link discarded data: {}", e),
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "virtual link disconnected")
}
