//! Tools for communicating with split-flap displays over serial.
//!
//! For the basic task of driving a display, you likely want to use the high-level API
//! in the [`splitflap`] crate instead.
//!
//! However, you can use the [`open_port`] function to open and configure a serial port
//! appropriately if you're doing custom lower-level communication.
//!
//! # Examples
//!
//! ```no_run
//! use splitflap_core::Transport;
//! use splitflap_serial::SerialTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! let transport = SerialTransport::open("/dev/ttyACM0")?;
//! let (reader, writer) = transport.split()?;
//! // Now ready for communication with a display (8N1 230400 baud).
//! #
//! # Ok(()) }
//! ```
//!
//! [`splitflap`]: https://docs.rs/splitflap
//! [`open_port`]: fn.open_port.html
#![doc(html_root_url = "https://docs.rs/splitflap-serial/0.1.0")]
#![deny(
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![warn(
    missing_docs,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]

mod serial_port;
mod serial_transport;

pub use self::serial_port::{first_available_port, open_port, SerialError, BAUD_RATE, READ_TIMEOUT};
pub use self::serial_transport::SerialTransport;
