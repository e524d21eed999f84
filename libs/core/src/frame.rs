use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};

use thiserror::Error;

/// Byte that marks the end of every frame on the wire.
pub const TERMINATOR: u8 = 0x00;

/// Number of checksum bytes that follow the payload.
pub const CHECKSUM_LEN: usize = 4;

/// Errors related to reading/writing [`Frame`]s of data.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FrameError {
    /// Frame did not end with the [`TERMINATOR`] byte.
    #[error("Frame [{}] is missing its terminator byte", hex_for_error(data))]
    Unterminated {
        /// The invalid frame data.
        data: Vec<u8>,
    },

    /// Frame was too short to contain a checksum.
    #[error(
        "Frame [{}] is too short: Expected at least {} bytes, got {}",
        hex_for_error(data),
        min,
        actual
    )]
    TooShort {
        /// The invalid frame data.
        data: Vec<u8>,

        /// The minimum number of bytes before the terminator.
        min: usize,

        /// The actual number of bytes before the terminator.
        actual: usize,
    },

    /// Checksum computed over the payload didn't match the declared checksum.
    #[error(
        "Frame checksum for [{}] didn't match declared checksum: Expected 0x{:08X}, got 0x{:08X}",
        hex_for_error(data),
        expected,
        actual
    )]
    BadChecksum {
        /// The invalid frame data.
        data: Vec<u8>,

        /// The declared checksum.
        expected: u32,

        /// The checksum actually computed on the payload.
        actual: u32,
    },

    /// Too many bytes accumulated without forming a valid frame.
    #[error("Discarded {} bytes that did not form a valid frame (maximum {})", actual, max)]
    Overflow {
        /// The maximum number of bytes buffered while searching for a frame.
        max: usize,

        /// The number of bytes that were discarded.
        actual: usize,
    },

    /// Failed reading/writing a [`Frame`] of data.
    #[error("Failed reading/writing a frame of data")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },
}

impl FrameError {
    /// Returns `true` if the error came from the underlying reader or writer
    /// rather than from the content of the frame.
    pub fn is_io(&self) -> bool {
        matches!(self, FrameError::Io { .. })
    }
}

/// A checksummed, self-delimiting unit of data on the serial link.
///
/// The link to the display is an unstructured byte stream, so each payload is
/// followed by a CRC-32 of its bytes and a single zero terminator. This struct
/// deals with appending and verifying the checksum; it makes no attempt to ascribe
/// meaning to the payload (that's [`HostMessage`] and [`DeviceMessage`]'s job).
///
/// Both owned and borrowed payloads are supported.
///
/// # Examples
///
/// ```
/// use splitflap_core::Frame;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let frame = Frame::new(&b"123456789"[..]);
/// let bytes = frame.to_bytes();
/// assert_eq!(b"123456789\x26\x39\xF4\xCB\x00", bytes.as_slice());
///
/// let parsed = Frame::from_bytes(&bytes)?;
/// assert_eq!(parsed, frame);
/// #
/// # Ok(()) }
/// ```
///
/// # Format Details
///
/// ```text
/// ┌────┬ ┄ ┬────┬────┬────┬────┬────┬────┐
/// │ P0 │...│ PN │    CRC-32 (LE)    │ 00 │
/// └────┴ ┄ ┴────┴────┴────┴────┴────┴────┘
/// ```
///
/// The checksum is the standard CRC-32 (as used by zlib and Ethernet) of the payload bytes,
/// stored little-endian. The terminator may also appear inside the payload or checksum;
/// a truncated frame split at such a byte fails checksum verification, which is how
/// [`FrameDecoder`] tells real terminators from embedded zeros.
///
/// [`HostMessage`]: enum.HostMessage.html
/// [`DeviceMessage`]: enum.DeviceMessage.html
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame<'a> {
    payload: Cow<'a, [u8]>,
}

impl<'a> Frame<'a> {
    /// Constructs a new `Frame` wrapping the given payload.
    ///
    /// # Examples
    ///
    /// ```
    /// # use splitflap_core::Frame;
    /// // some_data is moved into owning_frame.
    /// let some_data = vec![1, 2, 3];
    /// let owning_frame = Frame::new(some_data);
    ///
    /// // other_data is borrowed.
    /// let other_data = vec![1, 2, 3];
    /// let borrowing_frame = Frame::new(other_data.as_slice());
    /// ```
    pub fn new<T: Into<Cow<'a, [u8]>>>(payload: T) -> Self {
        Frame { payload: payload.into() }
    }

    /// Returns a reference to the frame's payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the frame and returns ownership of its payload.
    pub fn into_payload(self) -> Cow<'a, [u8]> {
        self.payload
    }

    /// Converts the frame to its wire format, including checksum and terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::<u8>::with_capacity(self.payload.len() + CHECKSUM_LEN + 1);
        output.extend_from_slice(&self.payload);
        output.extend_from_slice(&checksum(&self.payload).to_le_bytes());
        output.push(TERMINATOR);
        output
    }

    /// Parses the wire format (including the trailing terminator) into a new `Frame`.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`FrameError::Unterminated`] if the data does not end with [`TERMINATOR`].
    /// * [`FrameError::TooShort`] if there are fewer than [`CHECKSUM_LEN`] bytes before the terminator.
    /// * [`FrameError::BadChecksum`] if the computed checksum on the payload does not match the declared one.
    ///
    /// # Examples
    ///
    /// ```
    /// # use splitflap_core::{Frame, FrameError};
    /// let frame = Frame::from_bytes(b"123456789\x26\x39\xF4\xCB\x00").unwrap();
    /// assert_eq!(b"123456789", frame.payload());
    ///
    /// let error = Frame::from_bytes(b"123456789\x26\x39\xF4\xCC\x00").unwrap_err();
    /// assert!(matches!(error, FrameError::BadChecksum { .. }));
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Frame<'static>, FrameError> {
        let content = match bytes.split_last() {
            Some((&TERMINATOR, content)) => content,
            _ => return Err(FrameError::Unterminated { data: bytes.into() }),
        };

        if content.len() < CHECKSUM_LEN {
            return Err(FrameError::TooShort {
                data: bytes.into(),
                min: CHECKSUM_LEN,
                actual: content.len(),
            });
        }

        let (payload, declared) = content.split_at(content.len() - CHECKSUM_LEN);
        let mut declared_bytes = [0u8; CHECKSUM_LEN];
        declared_bytes.copy_from_slice(declared);
        let declared_checksum = u32::from_le_bytes(declared_bytes);
        let computed_checksum = checksum(payload);
        if declared_checksum != computed_checksum {
            return Err(FrameError::BadChecksum {
                data: bytes.into(),
                expected: declared_checksum,
                actual: computed_checksum,
            });
        }

        Ok(Frame::new(payload.to_vec()))
    }

    /// Writes the byte representation of the frame to a writer and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if the write fails.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), FrameError> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl Display for Frame<'_> {
    /// Formats the frame in a human-readable way.
    ///
    /// Useful for viewing traffic on the link. All numbers are in hex.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Len {:02X}", self.payload.len())?;
        if !self.payload.is_empty() {
            write!(f, " | Data ")?;
            for byte in self.payload.iter() {
                write!(f, "{:02X} ", byte)?;
            }
        }
        Ok(())
    }
}

/// Largest number of buffered bytes a [`FrameDecoder`] holds while searching for a valid frame.
pub const MAX_PENDING_LEN: usize = 8192;

/// Incrementally extracts verified [`Frame`]s from bytes received over the link.
///
/// A zero byte inside a payload or checksum is indistinguishable from a terminator,
/// so each terminator only marks a *candidate* frame end. Every possible start (the beginning
/// of the buffer and the byte after every earlier terminator) carries a running checksum, so
/// each byte is examined once no matter how many calls it takes to arrive. At each terminator
/// the earliest start whose checksum verifies wins, and bytes in front of it are discarded as
/// noise. Nothing is emitted for data that never verifies; once more than [`MAX_PENDING_LEN`]
/// bytes have been examined without a valid frame, they are dropped and
/// [`FrameError::Overflow`] is reported.
///
/// # Examples
///
/// ```
/// use splitflap_core::{Frame, FrameDecoder};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// // An empty embedded message encodes with a zero byte in the payload.
/// let frame = Frame::new(vec![0x0A, 0x00, 0x10, 0x01]);
///
/// let mut decoder = FrameDecoder::new();
/// decoder.extend(&[0xBA, 0xD0, 0x00]);
/// decoder.extend(&frame.to_bytes());
/// assert_eq!(Some(frame), decoder.decode()?);
/// assert_eq!(3, decoder.discarded_bytes());
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    scanned: usize,
    candidates: Vec<Candidate>,
    discarded: u64,
}

/// A possible frame start and the checksum register over the bytes examined since.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Candidate {
    start: usize,
    crc: u32,
}

impl Candidate {
    fn at(start: usize) -> Self {
        Candidate { start, crc: !0 }
    }

    /// Whether the bytes from `start` up to (not including) `end` form a payload and its checksum.
    fn verifies(&self, end: usize) -> bool {
        end - self.start >= CHECKSUM_LEN && self.crc == CRC_RESIDUE
    }
}

impl FrameDecoder {
    /// Creates a new, empty `FrameDecoder`.
    pub fn new() -> Self {
        FrameDecoder {
            pending: Vec::new(),
            scanned: 0,
            candidates: vec![Candidate::at(0)],
            discarded: 0,
        }
    }

    /// Appends bytes received from the link.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Returns the next verified frame from the buffered bytes, if one is complete.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Overflow`] if more than [`MAX_PENDING_LEN`] bytes were examined
    /// without yielding a valid frame. Those bytes are discarded and decoding can continue.
    pub fn decode(&mut self) -> Result<Option<Frame<'static>>, FrameError> {
        while self.scanned < self.pending.len() {
            let end = self.scanned;
            let byte = self.pending[end];
            self.scanned += 1;

            if byte == TERMINATOR {
                let found = self.candidates.iter().find(|c| c.verifies(end)).map(|c| c.start);
                if let Some(start) = found {
                    let payload = self.pending[start..end - CHECKSUM_LEN].to_vec();
                    self.discarded += start as u64;
                    let _ = self.pending.drain(..=end);
                    self.restart();
                    return Ok(Some(Frame::new(payload)));
                }
            }

            for candidate in &mut self.candidates {
                candidate.crc = crc_step(candidate.crc, byte);
            }
            if byte == TERMINATOR {
                self.candidates.push(Candidate::at(end + 1));
            }

            if self.scanned > MAX_PENDING_LEN {
                let actual = self.scanned;
                self.discarded += actual as u64;
                let _ = self.pending.drain(..actual);
                self.restart();
                return Err(FrameError::Overflow {
                    max: MAX_PENDING_LEN,
                    actual,
                });
            }
        }

        Ok(None)
    }

    fn restart(&mut self) {
        self.scanned = 0;
        self.candidates.clear();
        self.candidates.push(Candidate::at(0));
    }

    /// Returns the number of buffered bytes that have not yet formed a valid frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the total number of bytes thrown away as noise so far.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        FrameDecoder::new()
    }
}

/// Reads verified [`Frame`]s from a byte stream such as a serial port.
///
/// Wraps a [`FrameDecoder`]. Bytes received before an I/O error (such as a read timeout)
/// are kept and completed by the next call, so a reader configured with a short timeout
/// can be polled repeatedly without losing partial frames.
///
/// # Examples
///
/// ```
/// use splitflap_core::{Frame, FrameReader};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let mut stream = Frame::new(vec![1, 2]).to_bytes();
/// stream.extend(Frame::new(vec![3]).to_bytes());
///
/// let mut reader = FrameReader::new(stream.as_slice());
/// assert_eq!(&[1, 2], reader.read_frame()?.payload());
/// assert_eq!(&[3], reader.read_frame()?.payload());
/// #
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new `FrameReader` over the given byte stream.
    pub fn new(reader: R) -> Self {
        FrameReader {
            reader,
            decoder: FrameDecoder::new(),
        }
    }

    /// Reads from the stream until a complete, verified `Frame` is available.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if the read fails or the stream ends (kind `UnexpectedEof`),
    /// or [`FrameError::Overflow`] if too much unverifiable data accumulated.
    pub fn read_frame(&mut self) -> Result<Frame<'static>, FrameError> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(frame);
            }

            let count = self.reader.read(&mut buf)?;
            if count == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed").into());
            }
            self.decoder.extend(&buf[..count]);
        }
    }

    /// Returns a mutable reference to the underlying stream, e.g. to write replies to it.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns the underlying decoder, e.g. to inspect how much noise was discarded.
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }
}

/// Formats frame bytes for display as part of an error message.
fn hex_for_error(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Computes the CRC-32 (reflected, polynomial `0xEDB88320`) of the given byte slice.
fn checksum(bytes: &[u8]) -> u32 {
    !bytes.iter().fold(!0u32, |crc, &b| crc_step(crc, b))
}

/// Feeds one byte into a CRC-32 register.
fn crc_step(crc: u32, byte: u8) -> u32 {
    CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// Register left after feeding a payload followed by its little-endian checksum.
const CRC_RESIDUE: u32 = 0xDEBB_20E3;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}
