//! Core types for describing communication with split-flap displays.
//!
//! For the basic task of driving a display, you likely want to use the high-level API
//! in the [`splitflap`] crate instead.
//!
//! However, `splitflap_core` is useful for crates that want to interact with the display protocol
//! at a lower level than the `splitflap` crate, or who want to provide their own [`Transport`]
//! implementations for use by `splitflap`.
//!
//! Speaks the framed protobuf protocol of the open-source split-flap firmware: every message is a
//! protobuf payload followed by a CRC-32 and a zero terminator. Should work with any firmware build
//! that uses the same protocol, but no guarantees.
//!
//! # Examples
//!
//! ```
//! use splitflap_core::{DeviceMessage, ForceMovement, Frame, HostMessage, ModuleStates, Nonce};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! // Resolve text into a configuration message for a 6-module display.
//! let mut states = ModuleStates::new(" ABCDEFGHIJKLMNOPQRSTUVWXYZ".parse()?, 6);
//! let message = states.set_text("HELLO", ForceMovement::None)?;
//!
//! // Frame it for the wire.
//! let bytes = message.to_frame(Nonce(1)).to_bytes();
//! assert_eq!(Some(&0x00), bytes.last());
//!
//! // The device acknowledges with the same nonce.
//! let ack = Frame::from_bytes(&DeviceMessage::Ack(Nonce(1)).to_frame().to_bytes())?;
//! assert_eq!(DeviceMessage::Ack(Nonce(1)), DeviceMessage::from_payload(ack.payload())?);
//! #
//! # Ok(()) }
//! ```
//!
//! [`splitflap`]: https://docs.rs/splitflap
//! [`Transport`]: trait.Transport.html
#![doc(html_root_url = "https://docs.rs/splitflap-core/0.1.0")]
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

mod alphabet;
mod frame;
mod message;
mod modules;
pub mod schema;
mod transport;

pub use self::alphabet::{Alphabet, AlphabetError};
pub use self::frame::{Frame, FrameDecoder, FrameError, FrameReader, CHECKSUM_LEN, MAX_PENDING_LEN, TERMINATOR};
pub use self::message::{DeviceMessage, DeviceState, HostMessage, MessageError, ModuleCondition, ModuleStatus, Nonce};
pub use self::modules::{ForceMovement, Module, ModuleError, ModuleStates, Reconciliation};
pub use self::transport::{is_timeout, BoxedReader, BoxedTransport, BoxedWriter, Transport};
