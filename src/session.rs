use std::io;
use std::sync::atomic::Ordering;
use std::sync::{MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use rand::Rng;
use thiserror::Error;

use crate::core::{DeviceState, ForceMovement, HostMessage, ModuleError, ModuleStates, Nonce, Transport};
use crate::delivery::{delivery_queue, DeliveryWorker, Envelope, Outbox, QUEUE_CAPACITY};
use crate::dispatch::{Dispatcher, Shared};
use crate::serial::{SerialError, SerialTransport};
use crate::{Config, FailurePolicy};

/// Errors related to a [`Splitflap`] session.
///
/// [`Splitflap`]: struct.Splitflap.html
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The requested display update was invalid.
    #[error("Invalid display update")]
    Module {
        /// The underlying module error.
        #[from]
        source: ModuleError,
    },

    /// The transport couldn't be split into its read and write halves.
    #[error("Failed preparing the transport")]
    Transport {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The serial port couldn't be opened.
    #[error("Failed opening the serial port")]
    Serial {
        /// The underlying serial error.
        #[from]
        source: SerialError,
    },

    /// A worker thread couldn't be started.
    #[error("Failed spawning a worker thread")]
    Spawn {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Too many messages are waiting to be delivered, e.g. because the session hasn't been started.
    #[error("Output queue is full ({} messages waiting)", capacity)]
    QueueFull {
        /// Number of messages the queue holds.
        capacity: usize,
    },

    /// [`start`] was called on a session that is already running.
    ///
    /// [`start`]: struct.Splitflap.html#method.start
    #[error("Session is already running")]
    AlreadyStarted,

    /// The session has been shut down and can no longer be used.
    #[error("Session has been shut down")]
    Stopped,
}

/// How long shutdown waits for each worker thread before leaving it behind.
const WORKER_EXIT_GRACE: Duration = Duration::from_secs(1);

/// A background thread, plus a channel that disconnects once the thread has exited.
#[derive(Debug)]
struct Worker {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl Worker {
    fn spawn<F>(name: &str, f: F) -> Result<Self, SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _exit = exit_tx;
                f()
            })
            .map_err(|source| SessionError::Spawn { source })?;
        Ok(Worker { handle, exited })
    }

    /// Joins the thread if it exits within `grace`, otherwise detaches it.
    fn join(self, grace: Duration) {
        let name = self.handle.thread().name().unwrap_or("worker").to_string();
        match self.exited.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("Split-flap {} thread still busy after {:?}, detaching it", name, grace);
            }
            _ => {
                if self.handle.join().is_err() {
                    error!("Split-flap {} thread panicked", name);
                }
            }
        }
    }
}

/// Lifecycle of a session. Only ever moves forward.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Snapshot of a session's health.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Status {
    /// Whether the session has been started and not yet shut down.
    pub running: bool,

    /// Whether the inbound dispatcher is still reading from the display.
    pub inbound_alive: bool,

    /// Number of modules currently known, 0 if not yet learned.
    pub module_count: usize,

    /// Number of messages waiting to be delivered.
    pub queued: usize,
}

/// A connection to a split-flap display.
///
/// Text updates are turned into module configurations and queued for delivery; a background
/// worker writes them one at a time, waiting for each to be acknowledged, while another reads
/// acknowledgments, state reports and log messages coming back from the display.
///
/// Updates may be queued before [`start`] is called; they go out once it is. A session can be
/// started only once, and [`shutdown`] (also run on drop) ends it for good.
///
/// # Examples
///
/// ```
/// use splitflap::{Config, Splitflap};
/// use splitflap::core::Alphabet;
/// use splitflap_testing::{VirtualSplitflap, VirtualTransport};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let mut config = Config::new(Alphabet::new(" ABCDEFGHIJKLMNOPQRSTUVWXYZ")?);
/// config.module_count = 4;
///
/// let transport = VirtualTransport::new(VirtualSplitflap::new(4));
/// let mut display = Splitflap::new(transport, &config);
/// display.start()?;
/// let _ = display.set_text("HI")?;
/// display.shutdown();
/// #
/// # Ok(()) }
/// ```
///
/// [`start`]: #method.start
/// [`shutdown`]: #method.shutdown
pub struct Splitflap<T: Transport> {
    transport: Option<T>,
    queue: Option<Receiver<Envelope>>,
    outbox: Outbox,
    shutdown: Option<Sender<()>>,
    workers: Vec<Worker>,
    phase: Phase,
    shared: Shared,
    retry_timeout: Duration,
    failure_policy: FailurePolicy,
}

impl<T: Transport> Splitflap<T> {
    /// Creates an idle session over `transport`.
    ///
    /// The first message gets a random nonce below 256; later ones count up from there.
    pub fn new(transport: T, config: &Config) -> Self {
        let first_nonce = Nonce(rand::thread_rng().gen_range(0..256));
        let (outbox, queue) = delivery_queue(first_nonce);
        Splitflap {
            transport: Some(transport),
            queue: Some(queue),
            outbox,
            shutdown: None,
            workers: Vec::with_capacity(2),
            phase: Phase::Idle,
            shared: Shared::new(ModuleStates::new(config.alphabet.clone(), config.module_count)),
            retry_timeout: config.retry_timeout,
            failure_policy: config.failure_policy,
        }
    }

    /// Starts the background workers and asks the display for its state.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`SessionError::AlreadyStarted`] if the session is running.
    /// * [`SessionError::Stopped`] if it has been shut down.
    /// * [`SessionError::Transport`] if the transport couldn't be split.
    /// * [`SessionError::Spawn`] if a worker thread couldn't be started.
    ///
    /// [`SessionError::AlreadyStarted`]: enum.SessionError.html#variant.AlreadyStarted
    /// [`SessionError::Stopped`]: enum.SessionError.html#variant.Stopped
    /// [`SessionError::Transport`]: enum.SessionError.html#variant.Transport
    /// [`SessionError::Spawn`]: enum.SessionError.html#variant.Spawn
    pub fn start(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Running => return Err(SessionError::AlreadyStarted),
            Phase::Stopped => return Err(SessionError::Stopped),
        }

        let (transport, queue) = match (self.transport.take(), self.queue.take()) {
            (Some(transport), Some(queue)) => (transport, queue),
            _ => return Err(SessionError::Stopped),
        };
        // Without a transport this session can never run again.
        self.phase = Phase::Stopped;

        let (reader, writer) = transport.split().map_err(|source| SessionError::Transport { source })?;
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        self.shutdown = Some(shutdown_tx);

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.inbound_alive.store(true, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(reader, ack_tx, self.shared.clone());
        match Worker::spawn("splitflap-inbound", move || dispatcher.run()) {
            Ok(worker) => self.workers.push(worker),
            Err(e) => {
                self.stop_workers();
                return Err(e);
            }
        }

        let worker = DeliveryWorker::new(
            writer,
            queue,
            ack_rx,
            shutdown_rx,
            self.retry_timeout,
            self.failure_policy,
        );
        match Worker::spawn("splitflap-delivery", move || worker.run()) {
            Ok(worker) => self.workers.push(worker),
            Err(e) => {
                self.stop_workers();
                return Err(e);
            }
        }

        self.phase = Phase::Running;
        info!("Split-flap session started");

        match self.request_state() {
            Ok(_) => Ok(()),
            Err(SessionError::QueueFull { .. }) => {
                warn!("Output queue is full, not requesting the display's state");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stops the background workers and waits for them to exit.
    ///
    /// A worker stuck in a read or write that doesn't time out is detached after a short grace
    /// period; it exits on its own once that call returns. Messages still queued are discarded.
    /// Calling this more than once has no further effect, and the session can't be restarted
    /// afterwards.
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Stopped && self.workers.is_empty() {
            return;
        }
        self.stop_workers();
        info!("Split-flap session stopped");
    }

    fn stop_workers(&mut self) {
        self.phase = Phase::Stopped;
        self.shared.running.store(false, Ordering::SeqCst);
        drop(self.shutdown.take());
        self.transport = None;
        self.queue = None;

        for worker in self.workers.drain(..) {
            worker.join(WORKER_EXIT_GRACE);
        }
    }

    /// Shows `text` on the display, moving only modules whose flap changes.
    ///
    /// Returns the nonce the display will acknowledge the update with.
    ///
    /// # Errors
    ///
    /// Same as [`set_text_with_movement`].
    ///
    /// [`set_text_with_movement`]: #method.set_text_with_movement
    pub fn set_text(&self, text: &str) -> Result<Nonce, SessionError> {
        self.set_text_with_movement(text, ForceMovement::None)
    }

    /// Shows `text` on the display, forcing a full rotation of the modules chosen by `force`.
    ///
    /// Modules past the end of `text` show a blank, and characters not in the alphabet show the first flap.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`SessionError::Module`] if the module count isn't known yet, or `text` is longer than the display.
    /// * [`SessionError::QueueFull`] if too many updates are waiting. The modules keep the new
    ///   targets, and the next update that goes out carries them.
    /// * [`SessionError::Stopped`] if the session has been shut down.
    ///
    /// [`SessionError::Module`]: enum.SessionError.html#variant.Module
    /// [`SessionError::QueueFull`]: enum.SessionError.html#variant.QueueFull
    /// [`SessionError::Stopped`]: enum.SessionError.html#variant.Stopped
    pub fn set_text_with_movement(&self, text: &str, force: ForceMovement) -> Result<Nonce, SessionError> {
        self.ensure_open()?;
        // Holding the lock while queueing keeps nonces in the same order as configurations.
        let mut modules = self.modules();
        let message = modules.set_text(text, force)?;
        debug!("Setting text {:?} ({})", text, force);
        self.outbox.enqueue(&message)
    }

    /// Moves each module to the flap index given in `positions`.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`SessionError::Module`] if the module count isn't known yet, `positions` has more
    ///   entries than there are modules, or `force` doesn't match `positions` in length.
    /// * [`SessionError::QueueFull`] if too many updates are waiting.
    /// * [`SessionError::Stopped`] if the session has been shut down.
    ///
    /// [`SessionError::Module`]: enum.SessionError.html#variant.Module
    /// [`SessionError::QueueFull`]: enum.SessionError.html#variant.QueueFull
    /// [`SessionError::Stopped`]: enum.SessionError.html#variant.Stopped
    pub fn set_positions(&self, positions: &[u32], force: Option<&[bool]>) -> Result<Nonce, SessionError> {
        self.ensure_open()?;
        let mut modules = self.modules();
        let message = modules.set_positions(positions, force)?;
        self.outbox.enqueue(&message)
    }

    /// Asks the display to report its state.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`SessionError::QueueFull`] if too many updates are waiting.
    /// * [`SessionError::Stopped`] if the session has been shut down.
    ///
    /// [`SessionError::QueueFull`]: enum.SessionError.html#variant.QueueFull
    /// [`SessionError::Stopped`]: enum.SessionError.html#variant.Stopped
    pub fn request_state(&self) -> Result<Nonce, SessionError> {
        self.ensure_open()?;
        self.outbox.enqueue(&HostMessage::RequestState)
    }

    /// Returns a snapshot of the session's health.
    pub fn status(&self) -> Status {
        let running = self.phase == Phase::Running;
        let status = Status {
            running,
            inbound_alive: running && self.shared.inbound_alive.load(Ordering::SeqCst),
            module_count: self.modules().module_count(),
            queued: self.outbox.len(),
        };
        if running && !status.inbound_alive {
            warn!("Inbound processing has stopped; the display may be disconnected");
        }
        status
    }

    /// Returns the most recent state reported by the display, if any.
    pub fn device_state(&self) -> Option<DeviceState> {
        self.shared
            .device_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Locks and returns the target configuration of the modules.
    pub fn modules(&self) -> MutexGuard<'_, ModuleStates> {
        self.shared.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Stopped => Err(SessionError::Stopped),
            _ => Ok(()),
        }
    }
}

impl Splitflap<SerialTransport> {
    /// Opens the serial port named in `config`, or the first available one, and creates an idle session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Serial`] if no port is available or it couldn't be opened.
    ///
    /// [`SessionError::Serial`]: enum.SessionError.html#variant.Serial
    pub fn open(config: &Config) -> Result<Self, SessionError> {
        let transport = match config.serial_port {
            Some(ref name) => SerialTransport::open(name)?,
            None => SerialTransport::open_first_available()?,
        };
        Ok(Splitflap::new(transport, config))
    }
}

impl<T: Transport> Drop for Splitflap<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport> std::fmt::Debug for Splitflap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Provide a Debug representation without requiring the transport to implement it.
        f.debug_struct("Splitflap")
            .field("phase", &self.phase)
            .field("outbox", &self.outbox)
            .field("shared", &self.shared)
            .field("retry_timeout", &self.retry_timeout)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Alphabet, BoxedTransport};
    use std::io::{Cursor, Read};
    use std::time::Instant;

    fn config(module_count: usize) -> Config {
        let mut config = Config::new(Alphabet::new(" ABC").unwrap());
        config.module_count = module_count;
        config
    }

    /// Transport whose reads end immediately and whose writes vanish.
    fn idle_transport() -> BoxedTransport {
        BoxedTransport::new(Box::new(io::empty()), Box::new(io::sink()))
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        type Reader = Cursor<Vec<u8>>;
        type Writer = io::Sink;

        fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
            Err(io::Error::new(io::ErrorKind::Other, "cannot clone port"))
        }
    }

    /// Reader that waits for bytes with no timeout, like a port opened without one.
    struct BlockingReader {
        rx: Receiver<Vec<u8>>,
    }

    impl Read for BlockingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.rx.recv() {
                Ok(bytes) => {
                    let count = bytes.len().min(buf.len());
                    buf[..count].copy_from_slice(&bytes[..count]);
                    Ok(count)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn initial_nonce_below_256() {
        let session = Splitflap::new(idle_transport(), &config(2));
        assert!(session.outbox.next_nonce().0 < 256);
    }

    #[test]
    fn text_queued_before_start() {
        let session = Splitflap::new(idle_transport(), &config(2));
        let first = session.set_text("AB").unwrap();
        let second = session.set_text("BA").unwrap();
        assert_eq!(first.next(), second);
        assert_eq!(2, session.status().queued);
        assert!(!session.status().running);
    }

    #[test]
    fn updates_beyond_capacity_rejected_before_start() {
        let mut session = Splitflap::new(idle_transport(), &config(1));
        for _ in 0..QUEUE_CAPACITY {
            let _ = session.set_text("A").unwrap();
        }

        let error = session.set_text("B").unwrap_err();
        assert!(matches!(error, SessionError::QueueFull { capacity: QUEUE_CAPACITY }));
        assert_eq!(QUEUE_CAPACITY, session.status().queued);
        assert_eq!(2, session.modules().modules()[0].target_flap_index);

        session.start().unwrap();
        assert!(session.status().running);
        session.shutdown();
    }

    #[test]
    fn text_needs_module_count() {
        let session = Splitflap::new(idle_transport(), &config(0));
        let error = session.set_text("A").unwrap_err();
        assert!(matches!(
            error,
            SessionError::Module {
                source: ModuleError::UnknownModuleCount
            }
        ));
    }

    #[test]
    fn start_twice() {
        let mut session = Splitflap::new(idle_transport(), &config(1));
        session.start().unwrap();
        assert!(matches!(session.start().unwrap_err(), SessionError::AlreadyStarted));
        session.shutdown();
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut session = Splitflap::new(idle_transport(), &config(1));
        session.start().unwrap();
        session.shutdown();
        session.shutdown();

        assert!(!session.status().running);
        assert!(matches!(session.start().unwrap_err(), SessionError::Stopped));
        assert!(matches!(session.set_text("A").unwrap_err(), SessionError::Stopped));
        assert!(matches!(session.request_state().unwrap_err(), SessionError::Stopped));
    }

    #[test]
    fn shutdown_before_start() {
        let mut session = Splitflap::new(idle_transport(), &config(1));
        session.shutdown();
        assert!(matches!(session.start().unwrap_err(), SessionError::Stopped));
    }

    #[test]
    fn shutdown_detaches_blocked_reader() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let transport = BoxedTransport::new(Box::new(BlockingReader { rx }), Box::new(io::sink()));
        let mut session = Splitflap::new(transport, &config(1));
        session.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        session.shutdown();
        let elapsed = started.elapsed();
        assert!(elapsed < WORKER_EXIT_GRACE * 3, "shutdown took {:?}", elapsed);
        assert!(!session.status().running);

        // The detached reader exits once its read returns.
        drop(tx);
    }

    #[test]
    fn split_failure() {
        let mut session = Splitflap::new(FailingTransport, &config(1));
        let error = session.start().unwrap_err();
        assert!(matches!(error, SessionError::Transport { .. }));
        assert!(!session.status().running);
    }

    #[test]
    fn inbound_end_reported() {
        let mut session = Splitflap::new(idle_transport(), &config(1));
        session.start().unwrap();
        while session.status().inbound_alive {
            thread::sleep(Duration::from_millis(1));
        }
        let status = session.status();
        assert!(status.running);
        assert!(!status.inbound_alive);
        session.shutdown();
    }
}
