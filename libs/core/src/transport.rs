use std::fmt::{self, Debug, Formatter};
use std::io::{self, Read, Write};

/// Abstraction over a reliable, ordered byte link to a display.
///
/// A transport is split into independent read and write halves so that inbound frames can be
/// decoded on one thread while outbound frames are written on another. Typically `SerialTransport`
/// from [`splitflap-serial`] or `VirtualTransport` from [`splitflap-testing`] are sufficient,
/// and you do not need to implement this yourself.
///
/// The reader should return an error of kind [`TimedOut`] or [`WouldBlock`] periodically when no
/// data arrives, so that whoever is reading gets a chance to notice it should stop. A reader that
/// blocks indefinitely still works, but a session shutting down will give up waiting for it and
/// leave its thread behind until the read returns. Any other error, or a read of zero bytes, is
/// treated as the link going away.
///
/// # Examples
///
/// Implementing a transport over an existing pair of streams:
///
/// ```
/// use std::io::{self, Cursor};
/// use splitflap_core::Transport;
///
/// struct LoopbackTransport {
///     incoming: Vec<u8>,
/// }
///
/// impl Transport for LoopbackTransport {
///     type Reader = Cursor<Vec<u8>>;
///     type Writer = io::Sink;
///
///     fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
///         Ok((Cursor::new(self.incoming), io::sink()))
///     }
/// }
///
/// # fn main() -> io::Result<()> {
/// #
/// let (reader, _writer) = LoopbackTransport { incoming: vec![1, 2, 3] }.split()?;
/// assert_eq!(3, reader.get_ref().len());
/// #
/// # Ok(()) }
/// ```
///
/// [`splitflap-serial`]: https://docs.rs/splitflap-serial
/// [`splitflap-testing`]: https://docs.rs/splitflap-testing
/// [`TimedOut`]: https://doc.rust-lang.org/std/io/enum.ErrorKind.html#variant.TimedOut
/// [`WouldBlock`]: https://doc.rust-lang.org/std/io/enum.ErrorKind.html#variant.WouldBlock
pub trait Transport {
    /// The half that receives bytes from the display.
    type Reader: Read + Send + 'static;

    /// The half that sends bytes to the display.
    type Writer: Write + Send + 'static;

    /// Splits the link into its read and write halves.
    ///
    /// Dropping both halves closes the link.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the link can't be duplicated.
    fn split(self) -> io::Result<(Self::Reader, Self::Writer)>;
}

/// Returns whether `error` only means no data arrived in time, as opposed to a dead link.
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Boxed read half, for callers that choose a transport at runtime.
pub type BoxedReader = Box<dyn Read + Send>;

/// Boxed write half, for callers that choose a transport at runtime.
pub type BoxedWriter = Box<dyn Write + Send>;

/// A transport whose concrete type has been erased.
///
/// # Examples
///
/// ```
/// use std::io;
/// use splitflap_core::{BoxedTransport, Transport};
///
/// # fn main() -> io::Result<()> {
/// #
/// let transport = BoxedTransport::new(Box::new(io::empty()), Box::new(io::sink()));
/// let (_reader, _writer) = transport.split()?;
/// #
/// # Ok(()) }
/// ```
pub struct BoxedTransport {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl BoxedTransport {
    /// Wraps an existing pair of halves.
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        BoxedTransport { reader, writer }
    }

    /// Splits any transport and erases the types of its halves.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if `transport` can't be split.
    pub fn from_transport<T: Transport>(transport: T) -> io::Result<Self> {
        let (reader, writer) = transport.split()?;
        Ok(BoxedTransport::new(Box::new(reader), Box::new(writer)))
    }
}

impl Transport for BoxedTransport {
    type Reader = BoxedReader;
    type Writer = BoxedWriter;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}

// Provide a Debug representation so types that contain boxed halves can derive Debug.
impl Debug for BoxedTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<BoxedTransport>")
    }
}
