use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use log::{debug, info, trace, warn};

use crate::core::{HostMessage, Nonce};
use crate::{FailurePolicy, SessionError};

/// Maximum number of messages waiting to be delivered.
pub const QUEUE_CAPACITY: usize = 100;

/// Queue depth above which enqueueing logs a warning.
pub const QUEUE_WARN_DEPTH: usize = 10;

/// Number of times a message is written before it is given up on.
pub const MAX_ATTEMPTS: u32 = 2;

/// A framed message waiting to be delivered, with the nonce its acknowledgment will carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Envelope {
    /// Nonce embedded in the message.
    pub nonce: Nonce,

    /// The complete frame, ready to write.
    pub bytes: Vec<u8>,
}

/// Creates a delivery queue, returning the producer side and the receiver for a [`DeliveryWorker`].
///
/// [`DeliveryWorker`]: struct.DeliveryWorker.html
pub fn delivery_queue(first_nonce: Nonce) -> (Outbox, Receiver<Envelope>) {
    let (sender, receiver) = crossbeam_channel::bounded(QUEUE_CAPACITY);
    let outbox = Outbox {
        sender,
        next_nonce: Arc::new(AtomicU32::new(first_nonce.0)),
    };
    (outbox, receiver)
}

/// Producer side of the delivery queue.
///
/// Assigns each message the next nonce, frames it, and queues it for the [`DeliveryWorker`].
/// Clones share the same queue and nonce counter.
///
/// # Examples
///
/// ```
/// use splitflap::core::{HostMessage, Nonce};
/// use splitflap::delivery_queue;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let (outbox, queue) = delivery_queue(Nonce(41));
/// assert_eq!(Nonce(41), outbox.enqueue(&HostMessage::RequestState)?);
/// assert_eq!(Nonce(42), outbox.enqueue(&HostMessage::RequestState)?);
/// assert_eq!(2, queue.len());
/// #
/// # Ok(()) }
/// ```
///
/// [`DeliveryWorker`]: struct.DeliveryWorker.html
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: Sender<Envelope>,
    next_nonce: Arc<AtomicU32>,
}

impl Outbox {
    /// Queues `message` for delivery and returns the nonce assigned to it.
    ///
    /// Never blocks. The nonce is consumed even if queueing fails.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`SessionError::QueueFull`] if [`QUEUE_CAPACITY`] messages are already waiting.
    /// * [`SessionError::Stopped`] if the delivery worker has gone away.
    ///
    /// [`SessionError::QueueFull`]: enum.SessionError.html#variant.QueueFull
    /// [`SessionError::Stopped`]: enum.SessionError.html#variant.Stopped
    /// [`QUEUE_CAPACITY`]: constant.QUEUE_CAPACITY.html
    pub fn enqueue(&self, message: &HostMessage) -> Result<Nonce, SessionError> {
        let nonce = Nonce(self.next_nonce.fetch_add(1, Ordering::SeqCst));
        let envelope = Envelope {
            nonce,
            bytes: message.to_frame(nonce).to_bytes(),
        };
        trace!("Queueing [Nonce {:08X}] {}", nonce, message);

        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Output queue is full, rejecting nonce {:08X}", nonce);
                return Err(SessionError::QueueFull {
                    capacity: QUEUE_CAPACITY,
                });
            }
            Err(TrySendError::Disconnected(_)) => return Err(SessionError::Stopped),
        }

        let depth = self.sender.len();
        if depth > QUEUE_WARN_DEPTH {
            warn!(
                "Output queue length is high! ({}) Is the display still connected and functional?",
                depth
            );
        }
        Ok(nonce)
    }

    /// Returns the number of messages waiting to be delivered.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Returns whether no messages are waiting.
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Returns the nonce the next message will get.
    pub fn next_nonce(&self) -> Nonce {
        Nonce(self.next_nonce.load(Ordering::SeqCst))
    }
}

/// How a single delivery ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Outcome {
    Acked,
    Failed,
    Stopped,
}

/// Consumer side of the delivery queue: writes each message and waits for its acknowledgment.
///
/// Messages are delivered one at a time in queue order. Each is written, then the worker waits
/// up to the retry timeout for an acknowledgment carrying its nonce; acknowledgments for any other
/// nonce are ignored. Without one the message is written once more, and if that also goes
/// unacknowledged the [`FailurePolicy`] decides what gets discarded. A failed write still waits
/// out the timeout, so it costs a full attempt.
///
/// [`FailurePolicy`]: enum.FailurePolicy.html
#[derive(Debug)]
pub struct DeliveryWorker<W: Write> {
    writer: W,
    queue: Receiver<Envelope>,
    acks: Receiver<Nonce>,
    shutdown: Receiver<()>,
    retry_timeout: Duration,
    policy: FailurePolicy,
}

impl<W: Write> DeliveryWorker<W> {
    /// Creates a worker that writes to `writer`.
    ///
    /// The worker stops once `shutdown` is disconnected (i.e. its sender dropped) or the queue closes.
    pub fn new(
        writer: W,
        queue: Receiver<Envelope>,
        acks: Receiver<Nonce>,
        shutdown: Receiver<()>,
        retry_timeout: Duration,
        policy: FailurePolicy,
    ) -> Self {
        DeliveryWorker {
            writer,
            queue,
            acks,
            shutdown,
            retry_timeout,
            policy,
        }
    }

    /// Delivers messages until told to stop.
    pub fn run(mut self) {
        debug!("Delivery worker started");
        loop {
            let envelope = select! {
                recv(self.queue) -> envelope => match envelope {
                    Ok(envelope) => envelope,
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => break,
            };

            match self.deliver(&envelope) {
                Outcome::Acked => trace!("Nonce {:08X} acknowledged", envelope.nonce),
                Outcome::Failed => self.give_up(&envelope),
                Outcome::Stopped => break,
            }
        }
        debug!("Delivery worker stopped");
    }

    fn deliver(&mut self, envelope: &Envelope) -> Outcome {
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                warn!(
                    "No ack for nonce {:08X} within {:?}, retrying",
                    envelope.nonce, self.retry_timeout
                );
            }

            if let Err(e) = self.write(&envelope.bytes) {
                warn!("Failed writing nonce {:08X} to display: {}", envelope.nonce, e);
            }

            match self.await_ack(envelope.nonce) {
                Outcome::Failed => {}
                outcome => return outcome,
            }
        }
        Outcome::Failed
    }

    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }

    /// Waits for the acknowledgment of `nonce` until the retry timeout lapses.
    fn await_ack(&self, nonce: Nonce) -> Outcome {
        let deadline = Instant::now() + self.retry_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            select! {
                recv(self.acks) -> ack => match ack {
                    Ok(ack) if ack == nonce => return Outcome::Acked,
                    Ok(ack) => debug!("Ignoring ack for nonce {:08X} while waiting for {:08X}", ack, nonce),
                    // Nothing can acknowledge anymore; just wait out the timer.
                    Err(_) => return self.sleep_until(deadline),
                },
                recv(self.shutdown) -> _ => return Outcome::Stopped,
                default(remaining) => return Outcome::Failed,
            }
        }
    }

    fn sleep_until(&self, deadline: Instant) -> Outcome {
        select! {
            recv(self.shutdown) -> _ => Outcome::Stopped,
            default(deadline.saturating_duration_since(Instant::now())) => Outcome::Failed,
        }
    }

    fn give_up(&mut self, envelope: &Envelope) {
        match self.policy {
            FailurePolicy::DropBacklog => {
                let dropped = self.queue.try_iter().count();
                warn!(
                    "Giving up on nonce {:08X} after {} attempts, discarding it and {} queued messages",
                    envelope.nonce, MAX_ATTEMPTS, dropped
                );
            }
            FailurePolicy::DropMessage => {
                warn!(
                    "Giving up on nonce {:08X} after {} attempts, discarding it",
                    envelope.nonce, MAX_ATTEMPTS
                );
            }
        }
        info!("Delivery resumes with the next queued message");
    }
}
