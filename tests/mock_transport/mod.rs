#![allow(dead_code)] // Tests use different subsets of these.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use splitflap::core::{DeviceMessage, FrameDecoder, HostMessage, Nonce, Transport};

/// Decides how the display answers each request it receives.
pub type Responder = Box<dyn FnMut(Nonce, &HostMessage) -> Vec<DeviceMessage> + Send>;

/// Requests received by a `ScriptedTransport`, shared with the test.
pub type Received = Arc<Mutex<Vec<(Nonce, HostMessage)>>>;

/// Mock transport whose replies are produced by a closure, with optional write failures.
/// Used to verify delivery behavior that a well-behaved display never triggers.
pub struct ScriptedTransport {
    responder: Responder,
    write_failures: usize,
    received: Received,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(Nonce, &HostMessage) -> Vec<DeviceMessage> + Send + 'static,
    {
        ScriptedTransport {
            responder: Box::new(responder),
            write_failures: 0,
            received: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Acknowledges every request.
    pub fn acking() -> Self {
        ScriptedTransport::new(|nonce, _| vec![DeviceMessage::Ack(nonce)])
    }

    /// Fails the next `count` writes with `BrokenPipe`.
    pub fn with_write_failures(mut self, count: usize) -> Self {
        self.write_failures = count;
        self
    }

    pub fn received(&self) -> Received {
        self.received.clone()
    }
}

impl Transport for ScriptedTransport {
    type Reader = ScriptedReader;
    type Writer = ScriptedWriter;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reader = ScriptedReader { rx, pending: vec![] };
        let writer = ScriptedWriter {
            decoder: FrameDecoder::new(),
            responder: self.responder,
            write_failures: self.write_failures,
            received: self.received,
            tx,
        };
        Ok((reader, writer))
    }
}

pub struct ScriptedReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(10)) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::TimedOut.into()),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        let _ = self.pending.drain(..count);
        Ok(count)
    }
}

pub struct ScriptedWriter {
    decoder: FrameDecoder,
    responder: Responder,
    write_failures: usize,
    received: Received,
    tx: Sender<Vec<u8>>,
}

impl Write for ScriptedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_failures > 0 {
            self.write_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "Dummy write error"));
        }

        self.decoder.extend(buf);
        while let Some(frame) = self.decoder.decode().unwrap() {
            let (nonce, message) = HostMessage::from_payload(frame.payload()).unwrap();
            self.received.lock().unwrap().push((nonce, message.clone()));
            for response in (self.responder)(nonce, &message) {
                let _ = self.tx.send(response.to_frame().to_bytes());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn nonces(received: &Received) -> Vec<Nonce> {
    received.lock().unwrap().iter().map(|&(nonce, _)| nonce).collect()
}
