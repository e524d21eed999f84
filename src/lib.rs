//! A library for driving split-flap displays over a serial link.
//!
//! Provides a way to connect to a display, show text on it, and keep track of what it reports back.
//! Each update is sent as a complete configuration of every module, acknowledged by the display, and
//! retried once if the acknowledgment doesn't arrive in time.
//!
//! Speaks the framed protobuf protocol of the open-source split-flap firmware. Should work with any
//! display running a compatible firmware build, but no guarantees.
//!
//! Intended only for hobbyist and educational purposes.
//!
//! # Examples
//!
//! ```no_run
//! use splitflap::{Config, Splitflap};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! #
//! // Read settings such as ALPHABET_ORDER and SPLITFLAP_MODULE_COUNT from the environment.
//! let config = Config::from_env()?;
//!
//! // Open the configured serial port (or the first one found) and start talking to the display.
//! let mut display = Splitflap::open(&config)?;
//! display.start()?;
//!
//! // Queue some text. It's delivered in the background.
//! let _ = display.set_text("HELLO")?;
//!
//! // Stop the background workers. This also happens when the display is dropped.
//! display.shutdown();
//! #
//! # Ok(()) }
//! ```
//!
//! # Sub-crates
//!
//! In addition to the high-level API of [`Splitflap`], several lower-level components are provided
//! that can be combined for more specialized use-cases.
//!
//! - [`splitflap-core`] \(re-exported as `core`\) contains the framing, messages and module model of the
//!   protocol, and is useful if you want to implement a custom [`Transport`] or operate at the level of raw frames.
//! - [`splitflap-serial`] \(re-exported as `serial`\) contains functions for configuring the serial port,
//!   as well as the implementation of [`SerialTransport`].
//! - [`splitflap-testing`] contains a virtual display and transport, useful for testing without hardware.
//!
//! [`Splitflap`]: struct.Splitflap.html
//! [`splitflap-core`]: https://docs.rs/splitflap-core
//! [`splitflap-serial`]: https://docs.rs/splitflap-serial
//! [`splitflap-testing`]: https://docs.rs/splitflap-testing
//! [`Transport`]: trait.Transport.html
//! [`SerialTransport`]: struct.SerialTransport.html
#![doc(html_root_url = "https://docs.rs/splitflap/0.1.0")]
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

pub use splitflap_core as core;
pub use splitflap_serial as serial;

mod config;
mod delivery;
mod dispatch;
mod session;

pub use self::config::{
    Config, ConfigError, FailurePolicy, ALPHABET_VAR, FAILURE_POLICY_VAR, MODULE_COUNT_VAR, RETRY_MS_VAR,
    SERIAL_PORT_VAR,
};
pub use self::delivery::{delivery_queue, DeliveryWorker, Envelope, Outbox, MAX_ATTEMPTS, QUEUE_CAPACITY, QUEUE_WARN_DEPTH};
pub use self::dispatch::{Dispatcher, Shared};
pub use self::session::{SessionError, Splitflap, Status};

pub use crate::core::{Alphabet, DeviceState, ForceMovement, Nonce, Transport};
pub use crate::serial::SerialTransport;
