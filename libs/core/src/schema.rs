//! Protobuf messages exchanged with the display firmware.
//!
//! These mirror the firmware's `splitflap.proto` and are laid out the way a code
//! generator would emit them. Only the message kinds this library sends or consumes
//! are declared; other device payloads decode with an empty `payload`.
//!
//! Most callers should use [`HostMessage`] and [`DeviceMessage`] instead.
//!
//! [`HostMessage`]: ../enum.HostMessage.html
//! [`DeviceMessage`]: ../enum.DeviceMessage.html
#![allow(missing_copy_implementations)]

/// Top-level host→device message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToSplitflap {
    /// Request nonce, echoed back in an [`Ack`].
    #[prost(uint32, tag = "1")]
    pub nonce: u32,

    /// The request itself.
    #[prost(oneof = "to_splitflap::Payload", tags = "3, 4")]
    pub payload: Option<to_splitflap::Payload>,
}

/// Nested types for [`ToSplitflap`].
pub mod to_splitflap {
    /// Kinds of host→device request.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// Set the full module configuration.
        #[prost(message, tag = "3")]
        SplitflapConfig(super::SplitflapConfig),

        /// Ask the device to report its state.
        #[prost(message, tag = "4")]
        RequestState(super::RequestState),
    }
}

/// Desired configuration of every module.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SplitflapConfig {
    /// One entry per module, in display order.
    #[prost(message, repeated, tag = "1")]
    pub modules: Vec<ModuleConfig>,
}

/// Desired configuration of a single module.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleConfig {
    /// Flap to rotate to.
    #[prost(uint32, tag = "1")]
    pub target_flap_index: u32,

    /// Changing this forces a full rotation even if the target is unchanged.
    #[prost(uint32, tag = "2")]
    pub movement_nonce: u32,

    /// Changing this forces the module to re-home.
    #[prost(uint32, tag = "3")]
    pub reset_nonce: u32,
}

/// Empty request for a [`SplitflapState`] report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestState {}

/// Top-level device→host message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FromSplitflap {
    /// The report itself.
    #[prost(oneof = "from_splitflap::Payload", tags = "1, 2, 3")]
    pub payload: Option<from_splitflap::Payload>,
}

/// Nested types for [`FromSplitflap`].
pub mod from_splitflap {
    /// Kinds of device→host report.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// Current state of every module.
        #[prost(message, tag = "1")]
        SplitflapState(super::SplitflapState),

        /// Free-form firmware log line.
        #[prost(message, tag = "2")]
        Log(super::Log),

        /// Acknowledgment of a [`ToSplitflap`](super::ToSplitflap) request.
        #[prost(message, tag = "3")]
        Ack(super::Ack),
    }
}

/// Reported state of the whole display.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SplitflapState {
    /// One entry per module, in display order.
    #[prost(message, repeated, tag = "1")]
    pub modules: Vec<ModuleState>,

    /// Operating mode; `1` is sensor test mode.
    #[prost(int32, tag = "2")]
    pub mode: i32,
}

/// Reported state of a single module.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleState {
    /// Module condition; see [`ModuleCondition`](../enum.ModuleCondition.html).
    #[prost(int32, tag = "1")]
    pub state: i32,

    /// Flap currently shown.
    #[prost(uint32, tag = "2")]
    pub flap_index: u32,

    /// Whether the module is rotating.
    #[prost(bool, tag = "3")]
    pub moving: bool,

    /// Current reading of the home sensor.
    #[prost(bool, tag = "4")]
    pub home_state: bool,

    /// Times the home sensor triggered where it wasn't expected.
    #[prost(uint32, tag = "5")]
    pub count_unexpected_home: u32,

    /// Times the home sensor failed to trigger where it was expected.
    #[prost(uint32, tag = "6")]
    pub count_missed_home: u32,
}

/// Firmware log line.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Log {
    /// Log text.
    #[prost(string, tag = "1")]
    pub msg: String,
}

/// Acknowledgment of a host request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ack {
    /// Nonce of the acknowledged request.
    #[prost(uint32, tag = "1")]
    pub nonce: u32,
}
