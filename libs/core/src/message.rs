use std::fmt::{self, Display, Formatter};

use derive_more::{Display, LowerHex, UpperHex};
use prost::Message as _;
use thiserror::Error;

use crate::schema::{self, from_splitflap, to_splitflap};
use crate::{Frame, Module};

/// Errors related to decoding wire messages.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MessageError {
    /// The payload was not a valid protobuf message.
    #[error("Failed to decode message payload")]
    Decode {
        /// The underlying decode error.
        #[from]
        source: prost::DecodeError,
    },

    /// The payload decoded but carried no message kind this library understands.
    #[error("Message carried no recognized payload")]
    MissingPayload,
}

/// Identifier attached to each host→device message and echoed back in its acknowledgment.
///
/// # Examples
///
/// ```
/// use splitflap_core::Nonce;
///
/// assert_eq!(Nonce(8), Nonce(7).next());
/// assert_eq!(Nonce(0), Nonce(u32::MAX).next());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, LowerHex, UpperHex)]
pub struct Nonce(pub u32);

impl Nonce {
    /// Returns the nonce following this one, wrapping at the wire width.
    pub fn next(self) -> Self {
        Nonce(self.0.wrapping_add(1))
    }
}

/// A message sent from the host to the display.
///
/// Converted to a [`Frame`] together with the [`Nonce`] the device should acknowledge it with.
///
/// # Examples
///
/// ```
/// use splitflap_core::{Frame, HostMessage, Module, Nonce};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let message = HostMessage::Configure(vec![Module::default(); 4]);
/// let frame = message.to_frame(Nonce(12));
///
/// let (nonce, decoded) = HostMessage::from_payload(frame.payload())?;
/// assert_eq!(Nonce(12), nonce);
/// assert_eq!(message, decoded);
/// #
/// # Ok(()) }
/// ```
///
/// [`Frame`]: struct.Frame.html
/// [`Nonce`]: struct.Nonce.html
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostMessage {
    /// Sets the target of every module, in display order.
    ///
    /// An acknowledgment is expected; the device usually follows it with a state report.
    Configure(Vec<Module>),

    /// Asks the device to report its current state.
    ///
    /// An acknowledgment followed by a state report is expected.
    RequestState,
}

impl HostMessage {
    /// Encodes the message, with `nonce` embedded, as a protobuf payload.
    pub fn to_payload(&self, nonce: Nonce) -> Vec<u8> {
        let payload = match *self {
            HostMessage::Configure(ref modules) => to_splitflap::Payload::SplitflapConfig(schema::SplitflapConfig {
                modules: modules.iter().map(|&module| schema::ModuleConfig::from(module)).collect(),
            }),
            HostMessage::RequestState => to_splitflap::Payload::RequestState(schema::RequestState {}),
        };

        schema::ToSplitflap {
            nonce: nonce.0,
            payload: Some(payload),
        }
        .encode_to_vec()
    }

    /// Encodes the message, with `nonce` embedded, as a complete [`Frame`].
    ///
    /// [`Frame`]: struct.Frame.html
    pub fn to_frame(&self, nonce: Nonce) -> Frame<'static> {
        Frame::new(self.to_payload(nonce))
    }

    /// Decodes a host→device payload into its nonce and message.
    ///
    /// The host never receives these; this is what a device (or a simulated one) uses.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`MessageError::Decode`] if the payload is not valid protobuf.
    /// * [`MessageError::MissingPayload`] if it carries no recognized request.
    ///
    /// [`MessageError::Decode`]: enum.MessageError.html#variant.Decode
    /// [`MessageError::MissingPayload`]: enum.MessageError.html#variant.MissingPayload
    pub fn from_payload(payload: &[u8]) -> Result<(Nonce, Self), MessageError> {
        let decoded = schema::ToSplitflap::decode(payload)?;
        let message = match decoded.payload {
            Some(to_splitflap::Payload::SplitflapConfig(config)) => {
                HostMessage::Configure(config.modules.iter().map(Module::from).collect())
            }
            Some(to_splitflap::Payload::RequestState(_)) => HostMessage::RequestState,
            None => return Err(MessageError::MissingPayload),
        };
        Ok((Nonce(decoded.nonce), message))
    }
}

impl Display for HostMessage {
    /// Provides a human-readable view of the message, useful when tracing traffic.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            HostMessage::Configure(ref modules) => {
                write!(f, "<-- Configure [")?;
                for (i, module) in modules.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", module)?;
                }
                write!(f, "]")
            }
            HostMessage::RequestState => write!(f, "<-- RequestState"),
        }
    }
}

/// Condition of a single module as reported by the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ModuleCondition {
    /// Operating normally.
    Normal,
    /// Searching for the home position.
    LookForHome,
    /// The home sensor is misbehaving.
    SensorError,
    /// The module hit an unrecoverable error.
    Panic,
    /// The module has been disabled.
    Disabled,
    /// A condition code this library doesn't know about.
    Unknown(i32),
}

impl From<i32> for ModuleCondition {
    fn from(value: i32) -> Self {
        match value {
            0 => ModuleCondition::Normal,
            1 => ModuleCondition::LookForHome,
            2 => ModuleCondition::SensorError,
            3 => ModuleCondition::Panic,
            4 => ModuleCondition::Disabled,
            other => ModuleCondition::Unknown(other),
        }
    }
}

impl From<ModuleCondition> for i32 {
    fn from(condition: ModuleCondition) -> Self {
        match condition {
            ModuleCondition::Normal => 0,
            ModuleCondition::LookForHome => 1,
            ModuleCondition::SensorError => 2,
            ModuleCondition::Panic => 3,
            ModuleCondition::Disabled => 4,
            ModuleCondition::Unknown(other) => other,
        }
    }
}

/// Reported status of a single module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ModuleStatus {
    /// Overall condition.
    pub condition: ModuleCondition,
    /// Flap currently shown.
    pub flap_index: u32,
    /// Whether the module is rotating.
    pub moving: bool,
    /// Current reading of the home sensor.
    pub home_state: bool,
    /// Times the home sensor triggered unexpectedly.
    pub count_unexpected_home: u32,
    /// Times the home sensor failed to trigger.
    pub count_missed_home: u32,
}

impl Default for ModuleStatus {
    fn default() -> Self {
        ModuleStatus {
            condition: ModuleCondition::Normal,
            flap_index: 0,
            moving: false,
            home_state: false,
            count_unexpected_home: 0,
            count_missed_home: 0,
        }
    }
}

/// Snapshot of the whole display as reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceState {
    /// One entry per module, in display order.
    pub modules: Vec<ModuleStatus>,
    /// Whether the device is in sensor test mode rather than normal operation.
    pub sensor_test: bool,
}

impl DeviceState {
    /// Number of modules the device reported.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

/// A message sent from the display to the host.
///
/// # Examples
///
/// ```
/// use splitflap_core::{DeviceMessage, Nonce};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let payload = DeviceMessage::Ack(Nonce(300)).to_payload();
/// assert_eq!(DeviceMessage::Ack(Nonce(300)), DeviceMessage::from_payload(&payload)?);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceMessage {
    /// Acknowledges receipt of the host message carrying this nonce.
    Ack(Nonce),
    /// Reports the current state of every module.
    StateReport(DeviceState),
    /// Free-form firmware log line.
    Log(String),
}

impl DeviceMessage {
    /// Decodes a device→host payload.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`MessageError::Decode`] if the payload is not valid protobuf.
    /// * [`MessageError::MissingPayload`] if it carries no message kind this library handles.
    ///
    /// [`MessageError::Decode`]: enum.MessageError.html#variant.Decode
    /// [`MessageError::MissingPayload`]: enum.MessageError.html#variant.MissingPayload
    pub fn from_payload(payload: &[u8]) -> Result<Self, MessageError> {
        match schema::FromSplitflap::decode(payload)?.payload {
            Some(from_splitflap::Payload::Ack(ack)) => Ok(DeviceMessage::Ack(Nonce(ack.nonce))),
            Some(from_splitflap::Payload::Log(log)) => Ok(DeviceMessage::Log(log.msg)),
            Some(from_splitflap::Payload::SplitflapState(state)) => Ok(DeviceMessage::StateReport(DeviceState {
                modules: state.modules.iter().map(ModuleStatus::from).collect(),
                sensor_test: state.mode == 1,
            })),
            None => Err(MessageError::MissingPayload),
        }
    }

    /// Encodes the message as a protobuf payload.
    pub fn to_payload(&self) -> Vec<u8> {
        let payload = match *self {
            DeviceMessage::Ack(nonce) => from_splitflap::Payload::Ack(schema::Ack { nonce: nonce.0 }),
            DeviceMessage::Log(ref msg) => from_splitflap::Payload::Log(schema::Log { msg: msg.clone() }),
            DeviceMessage::StateReport(ref state) => from_splitflap::Payload::SplitflapState(schema::SplitflapState {
                modules: state.modules.iter().map(|&status| schema::ModuleState::from(status)).collect(),
                mode: i32::from(state.sensor_test),
            }),
        };

        schema::FromSplitflap { payload: Some(payload) }.encode_to_vec()
    }

    /// Encodes the message as a complete [`Frame`].
    ///
    /// [`Frame`]: struct.Frame.html
    pub fn to_frame(&self) -> Frame<'static> {
        Frame::new(self.to_payload())
    }
}

impl Display for DeviceMessage {
    /// Provides a human-readable view of the message, useful when tracing traffic.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            DeviceMessage::Ack(nonce) => write!(f, "--> Ack [Nonce {:08X}]", nonce),
            DeviceMessage::StateReport(ref state) => {
                write!(f, "--> StateReport [{} modules", state.module_count())?;
                if state.sensor_test {
                    write!(f, ", sensor test")?;
                }
                write!(f, "]")
            }
            DeviceMessage::Log(ref msg) => write!(f, "--> Log [{}]", msg),
        }
    }
}

impl From<Module> for schema::ModuleConfig {
    fn from(module: Module) -> Self {
        schema::ModuleConfig {
            target_flap_index: module.target_flap_index,
            movement_nonce: u32::from(module.movement_nonce),
            reset_nonce: u32::from(module.reset_nonce),
        }
    }
}

impl From<&schema::ModuleConfig> for Module {
    fn from(config: &schema::ModuleConfig) -> Self {
        Module {
            target_flap_index: config.target_flap_index,
            movement_nonce: (config.movement_nonce & 0xFF) as u8,
            reset_nonce: (config.reset_nonce & 0xFF) as u8,
        }
    }
}

impl From<&schema::ModuleState> for ModuleStatus {
    fn from(state: &schema::ModuleState) -> Self {
        ModuleStatus {
            condition: ModuleCondition::from(state.state),
            flap_index: state.flap_index,
            moving: state.moving,
            home_state: state.home_state,
            count_unexpected_home: state.count_unexpected_home,
            count_missed_home: state.count_missed_home,
        }
    }
}

impl From<ModuleStatus> for schema::ModuleState {
    fn from(status: ModuleStatus) -> Self {
        schema::ModuleState {
            state: i32::from(status.condition),
            flap_index: status.flap_index,
            moving: status.moving,
            home_state: status.home_state,
            count_unexpected_home: status.count_unexpected_home,
            count_missed_home: status.count_missed_home,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;
    use test_case::test_case;

    #[test]
    fn request_state_encoding() {
        // nonce = 5, request_state = {}
        assert_eq!(vec![0x08, 0x05, 0x22, 0x00], HostMessage::RequestState.to_payload(Nonce(5)));
    }

    #[test]
    fn zero_nonce_is_omitted() {
        assert_eq!(vec![0x22, 0x00], HostMessage::RequestState.to_payload(Nonce(0)));
    }

    #[test]
    fn configure_encoding() {
        let modules = vec![
            Module {
                target_flap_index: 3,
                movement_nonce: 1,
                reset_nonce: 0,
            },
            Module::default(),
        ];
        let payload = HostMessage::Configure(modules).to_payload(Nonce(1));
        assert_eq!(
            vec![
                0x08, 0x01, // nonce
                0x1A, 0x08, // splitflap_config, 8 bytes
                0x0A, 0x04, 0x08, 0x03, 0x10, 0x01, // module 0
                0x0A, 0x00, // module 1, all defaults
            ],
            payload
        );
    }

    #[test]
    fn host_message_roundtrip() {
        let message = HostMessage::Configure(vec![
            Module {
                target_flap_index: 39,
                movement_nonce: 255,
                reset_nonce: 7,
            };
            12
        ]);
        let (nonce, decoded) = HostMessage::from_payload(&message.to_payload(Nonce(0xDEAD_BEEF))).unwrap();
        assert_eq!(Nonce(0xDEAD_BEEF), nonce);
        assert_eq!(message, decoded);
    }

    #[test]
    fn ack_decoding() {
        // ack = { nonce = 150 }
        let payload = [0x1A, 0x03, 0x08, 0x96, 0x01];
        assert_eq!(DeviceMessage::Ack(Nonce(150)), DeviceMessage::from_payload(&payload).unwrap());
    }

    #[test]
    fn state_report_decoding() {
        let state = schema::FromSplitflap {
            payload: Some(from_splitflap::Payload::SplitflapState(schema::SplitflapState {
                modules: vec![
                    schema::ModuleState {
                        state: 0,
                        flap_index: 4,
                        moving: true,
                        home_state: false,
                        count_unexpected_home: 0,
                        count_missed_home: 2,
                    },
                    schema::ModuleState {
                        state: 2,
                        flap_index: 0,
                        moving: false,
                        home_state: true,
                        count_unexpected_home: 9,
                        count_missed_home: 0,
                    },
                ],
                mode: 1,
            })),
        };

        let message = DeviceMessage::from_payload(&state.encode_to_vec()).unwrap();
        let expected = DeviceState {
            modules: vec![
                ModuleStatus {
                    flap_index: 4,
                    moving: true,
                    count_missed_home: 2,
                    ..ModuleStatus::default()
                },
                ModuleStatus {
                    condition: ModuleCondition::SensorError,
                    home_state: true,
                    count_unexpected_home: 9,
                    ..ModuleStatus::default()
                },
            ],
            sensor_test: true,
        };
        assert_eq!(DeviceMessage::StateReport(expected), message);
    }

    #[test]
    fn empty_state_report_has_no_modules() {
        // splitflap_state = {}
        let message = DeviceMessage::from_payload(&[0x0A, 0x00]).unwrap();
        assert_eq!(DeviceMessage::StateReport(DeviceState::default()), message);
    }

    #[test]
    fn log_decoding() {
        let payload = DeviceMessage::Log("homing".to_string()).to_payload();
        assert_eq!(DeviceMessage::Log("homing".to_string()), DeviceMessage::from_payload(&payload).unwrap());
    }

    #[test_case(&[] ; "empty")]
    #[test_case(&[0x48, 0x01] ; "unknown field only")]
    fn missing_payload(payload: &[u8]) {
        let error = DeviceMessage::from_payload(payload).unwrap_err();
        assert!(matches!(error, MessageError::MissingPayload));
    }

    #[test]
    fn malformed_payload() {
        // Length-delimited field claiming more bytes than present.
        let error = DeviceMessage::from_payload(&[0x1A, 0x05, 0x08]).unwrap_err();
        assert!(matches!(error, MessageError::Decode { .. }));
    }

    #[test_case(0, ModuleCondition::Normal ; "normal")]
    #[test_case(1, ModuleCondition::LookForHome ; "look for home")]
    #[test_case(3, ModuleCondition::Panic ; "panic")]
    #[test_case(42, ModuleCondition::Unknown(42) ; "unknown")]
    fn module_condition_conversion(value: i32, condition: ModuleCondition) {
        assert_eq!(condition, ModuleCondition::from(value));
        assert_eq!(value, i32::from(condition));
    }

    #[test]
    fn display() {
        let message = HostMessage::RequestState;
        assert_eq!("<-- RequestState", format!("{}", message));

        let message = HostMessage::Configure(vec![
            Module {
                target_flap_index: 7,
                movement_nonce: 2,
                reset_nonce: 0,
            },
            Module::default(),
        ]);
        assert_eq!("<-- Configure [07/02 00/00]", format!("{}", message));

        let message = DeviceMessage::Ack(Nonce(0x1F));
        assert_eq!("--> Ack [Nonce 0000001F]", format!("{}", message));

        let message = DeviceMessage::StateReport(DeviceState {
            modules: vec![ModuleStatus::default(); 3],
            sensor_test: false,
        });
        assert_eq!("--> StateReport [3 modules]", format!("{}", message));

        let message = DeviceMessage::Log("hi".to_string());
        assert_eq!("--> Log [hi]", format!("{}", message));
    }
}
