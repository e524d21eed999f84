//! Tools for testing and debugging split-flap display communications.
//!
//! For the basic task of driving a display, you likely want to use the high-level API
//! in the [`splitflap`] crate instead.
//!
//! This crate isn't directly related to controlling a real display, but provides some helpful diagnostic tools.
//! [`VirtualSplitflap`] is a general-purpose mock implementation of the display firmware,
//! [`VirtualTransport`] connects one to a host entirely in memory, and [`Emulator`] lets one
//! answer a real host over serial.
//!
//! # Examples
//!
//! ```no_run
//! use splitflap_serial::{open_port, READ_TIMEOUT};
//! use splitflap_testing::{Emulator, VirtualSplitflap};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! // Pretend to be a 12-module display on the far end of a null-modem cable.
//! let port = open_port("COM3", READ_TIMEOUT)?;
//! let mut emulator = Emulator::new(port, VirtualSplitflap::new(12));
//! loop {
//!     // Host requests are answered by the virtual display.
//!     if let Err(e) = emulator.process_frame() {
//!         if !e.is_io() {
//!             return Err(e.into());
//!         }
//!     }
//! }
//! #
//! # }
//! ```
//!
//! [`splitflap`]: https://docs.rs/splitflap
//! [`VirtualSplitflap`]: struct.VirtualSplitflap.html
//! [`VirtualTransport`]: struct.VirtualTransport.html
//! [`Emulator`]: struct.Emulator.html
#![doc(html_root_url = "https://docs.rs/splitflap-testing/0.1.0")]
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

mod emulator;
mod virtual_splitflap;
mod virtual_transport;

pub use self::emulator::Emulator;
pub use self::virtual_splitflap::VirtualSplitflap;
pub use self::virtual_transport::{VirtualLink, VirtualReader, VirtualTransport, VirtualWriter, VIRTUAL_READ_TIMEOUT};
