use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, trace, warn};

use crate::core::{
    is_timeout, DeviceMessage, DeviceState, Frame, FrameError, FrameReader, ModuleStates, Nonce, Reconciliation,
};

/// State shared between the [`Dispatcher`] and its owner.
///
/// [`Dispatcher`]: struct.Dispatcher.html
#[derive(Debug, Clone)]
pub struct Shared {
    /// Target configuration of the display's modules.
    pub modules: Arc<Mutex<ModuleStates>>,

    /// Most recent state report from the display.
    pub device_state: Arc<Mutex<Option<DeviceState>>>,

    /// Cleared by the owner to ask the dispatcher to stop.
    pub running: Arc<AtomicBool>,

    /// Cleared by the dispatcher when it exits, for any reason.
    pub inbound_alive: Arc<AtomicBool>,
}

impl Shared {
    /// Creates shared state around `modules`, not yet running.
    pub fn new(modules: ModuleStates) -> Self {
        Shared {
            modules: Arc::new(Mutex::new(modules)),
            device_state: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            inbound_alive: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Reads frames from the display and routes each decoded message.
///
/// * Acknowledgments are forwarded to the delivery worker.
/// * State reports reconcile the module count and become the latest device snapshot.
/// * Log messages are re-emitted through the [`log`] crate.
///
/// Corrupt frames, noise, and undecodable payloads are logged and skipped. The dispatcher keeps
/// going until its `running` flag is cleared or the stream fails with something other than a
/// timeout, so the underlying reader should have a read timeout set.
///
/// [`log`]: https://crates.io/crates/log
#[derive(Debug)]
pub struct Dispatcher<R> {
    reader: FrameReader<R>,
    acks: Sender<Nonce>,
    shared: Shared,
}

impl<R: Read> Dispatcher<R> {
    /// Creates a dispatcher reading from `reader` and forwarding acknowledgments to `acks`.
    pub fn new(reader: R, acks: Sender<Nonce>, shared: Shared) -> Self {
        Dispatcher {
            reader: FrameReader::new(reader),
            acks,
            shared,
        }
    }

    /// Reads and dispatches frames until stopped or the stream fails.
    pub fn run(mut self) {
        debug!("Inbound dispatcher started");
        let mut discarded = 0;

        while self.shared.running.load(Ordering::SeqCst) {
            match self.reader.read_frame() {
                Ok(frame) => self.dispatch(&frame),
                Err(FrameError::Io { ref source }) if is_timeout(source) => {}
                Err(FrameError::Io { source }) => {
                    if self.shared.running.load(Ordering::SeqCst) {
                        error!("Failed reading from display, inbound processing stopped: {}", source);
                    }
                    break;
                }
                Err(e) => warn!("Discarding inbound data: {}", e),
            }

            let total = self.reader.decoder().discarded_bytes();
            if total > discarded {
                debug!("Skipped {} bytes of noise from display", total - discarded);
                discarded = total;
            }
        }

        self.shared.inbound_alive.store(false, Ordering::SeqCst);
        debug!("Inbound dispatcher stopped");
    }

    /// Routes a single verified frame.
    pub fn dispatch(&self, frame: &Frame<'_>) {
        let message = match DeviceMessage::from_payload(frame.payload()) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable frame {}: {}", frame, e);
                return;
            }
        };
        trace!("{}", message);

        match message {
            DeviceMessage::Ack(nonce) => match self.acks.try_send(nonce) {
                Ok(()) => {}
                Err(TrySendError::Full(nonce)) => warn!("Ack queue full, dropping ack for nonce {:08X}", nonce),
                Err(TrySendError::Disconnected(nonce)) => debug!("No one waiting for ack {:08X}", nonce),
            },
            DeviceMessage::StateReport(state) => self.record_state(state),
            DeviceMessage::Log(msg) => info!("Display: {}", msg),
        }
    }

    fn record_state(&self, state: DeviceState) {
        debug!("Display reported state of {} modules", state.module_count());

        let reconciliation = self
            .shared
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reconcile_module_count(state.module_count());
        match reconciliation {
            Reconciliation::Adopted(count) => info!("Display reported {} modules", count),
            Reconciliation::Mismatch { held, reported } => warn!(
                "Number of reported modules changed (was {}, now {})",
                held, reported
            ),
            Reconciliation::Unchanged => {}
        }

        *self.shared.device_state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io;
    use crate::core::{Alphabet, ModuleStatus};

    fn shared(module_count: usize) -> Shared {
        Shared::new(ModuleStates::new(Alphabet::new(" ABC").unwrap(), module_count))
    }

    fn report(module_count: usize) -> Frame<'static> {
        DeviceMessage::StateReport(DeviceState {
            modules: vec![ModuleStatus::default(); module_count],
            sensor_test: false,
        })
        .to_frame()
    }

    #[test]
    fn acks_forwarded() {
        let (tx, rx) = bounded(4);
        let dispatcher = Dispatcher::new(io::empty(), tx, shared(1));
        dispatcher.dispatch(&DeviceMessage::Ack(Nonce(9)).to_frame());
        assert_eq!(Ok(Nonce(9)), rx.try_recv());
    }

    #[test]
    fn full_ack_queue_drops() {
        let (tx, rx) = bounded(1);
        let dispatcher = Dispatcher::new(io::empty(), tx, shared(1));
        dispatcher.dispatch(&DeviceMessage::Ack(Nonce(1)).to_frame());
        dispatcher.dispatch(&DeviceMessage::Ack(Nonce(2)).to_frame());
        assert_eq!(vec![Nonce(1)], rx.try_iter().collect::<Vec<_>>());
    }

    #[test]
    fn module_count_adopted() {
        let (tx, _rx) = bounded(1);
        let shared = shared(0);
        let dispatcher = Dispatcher::new(io::empty(), tx, shared.clone());

        dispatcher.dispatch(&report(5));
        assert_eq!(5, shared.modules.lock().unwrap().module_count());
        assert_eq!(5, shared.device_state.lock().unwrap().as_ref().unwrap().module_count());
    }

    #[test]
    fn module_count_mismatch_keeps_configuration() {
        let (tx, _rx) = bounded(1);
        let shared = shared(3);
        let dispatcher = Dispatcher::new(io::empty(), tx, shared.clone());

        dispatcher.dispatch(&report(4));
        assert_eq!(3, shared.modules.lock().unwrap().module_count());
        assert_eq!(4, shared.device_state.lock().unwrap().as_ref().unwrap().module_count());
    }

    #[test]
    fn undecodable_frame_ignored() {
        let (tx, rx) = bounded(1);
        let shared = shared(2);
        let dispatcher = Dispatcher::new(io::empty(), tx, shared.clone());

        dispatcher.dispatch(&Frame::new(vec![0x1A, 0x05, 0x08]));
        assert!(rx.try_recv().is_err());
        assert!(shared.device_state.lock().unwrap().is_none());
    }

    #[test]
    fn run_skips_noise_and_stops_at_end_of_stream() {
        let mut stream = vec![0x55, 0x66, 0x00];
        stream.extend(DeviceMessage::Log("booted".to_string()).to_frame().to_bytes());
        stream.extend(DeviceMessage::Ack(Nonce(3)).to_frame().to_bytes());

        let (tx, rx) = bounded(4);
        let shared = shared(1);
        shared.running.store(true, Ordering::SeqCst);
        shared.inbound_alive.store(true, Ordering::SeqCst);

        Dispatcher::new(stream.as_slice(), tx, shared.clone()).run();

        assert_eq!(vec![Nonce(3)], rx.try_iter().collect::<Vec<_>>());
        assert!(!shared.inbound_alive.load(Ordering::SeqCst));
    }
}
