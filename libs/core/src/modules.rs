use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::{Alphabet, HostMessage};

/// Errors related to setting module positions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModuleError {
    /// Positions were set before the number of modules was known.
    #[error("Cannot set positions before the number of modules is known")]
    UnknownModuleCount,

    /// More positions were given than there are modules.
    #[error("More positions specified than modules: Max {}, got {}", max, actual)]
    TooManyPositions {
        /// The number of modules.
        max: usize,

        /// The number of positions provided.
        actual: usize,
    },

    /// The force-movement list didn't line up with the positions.
    #[error("Positions and force-movement list length must match: Expected {}, got {}", expected, actual)]
    ForceMovementMismatch {
        /// The number of positions.
        expected: usize,

        /// The length of the force-movement list.
        actual: usize,
    },

    /// A force-movement mode name wasn't recognized.
    #[error("Unknown force movement mode {:?}", value)]
    UnknownForceMovement {
        /// The unrecognized name.
        value: String,
    },
}

/// Desired state of a single physical module.
///
/// # Examples
///
/// ```
/// use splitflap_core::Module;
///
/// let module = Module { target_flap_index: 5, ..Module::default() };
/// assert_eq!("05/00", module.to_string());
/// ```
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Module {
    /// Flap the module should rotate to.
    pub target_flap_index: u32,

    /// Bumped to force a full rotation even when the target is unchanged.
    pub movement_nonce: u8,

    /// Bumped to force the module to re-home.
    pub reset_nonce: u8,
}

impl Display for Module {
    /// Formats as `target/movement nonce`.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.target_flap_index, self.movement_nonce)
    }
}

/// Which modules get a forced rotation when text is set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ForceMovement {
    /// Only modules whose target changes will move.
    None,
    /// Every module showing a non-blank flap spins, blank ones only move if their target changes.
    OnlyNonBlank,
    /// Every module spins.
    All,
}

impl Default for ForceMovement {
    fn default() -> Self {
        ForceMovement::None
    }
}

impl FromStr for ForceMovement {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ForceMovement::None),
            "only_non_blank" => Ok(ForceMovement::OnlyNonBlank),
            "all" => Ok(ForceMovement::All),
            _ => Err(ModuleError::UnknownForceMovement { value: s.to_string() }),
        }
    }
}

impl Display for ForceMovement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match *self {
            ForceMovement::None => "none",
            ForceMovement::OnlyNonBlank => "only_non_blank",
            ForceMovement::All => "all",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of comparing a device-reported module count against the held one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Reconciliation {
    /// The count was unknown and has been adopted.
    Adopted(usize),
    /// The counts agree, or the report carried no modules.
    Unchanged,
    /// The counts disagree; the held configuration was left alone.
    Mismatch {
        /// The count held locally.
        held: usize,

        /// The count the device reported.
        reported: usize,
    },
}

/// Target state of every module on the display.
///
/// Translates text into flap positions using an [`Alphabet`] and tracks each module's
/// movement nonce. Every successful update produces the [`HostMessage`] carrying the
/// complete configuration to send.
///
/// # Examples
///
/// ```
/// use splitflap_core::{Alphabet, ForceMovement, HostMessage, ModuleStates};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let mut states = ModuleStates::new(" ABCDEFGHIJKLMNOPQRSTUVWXYZ".parse()?, 4);
/// let message = states.set_text("HI", ForceMovement::None)?;
///
/// let targets: Vec<u32> = states.modules().iter().map(|m| m.target_flap_index).collect();
/// assert_eq!(vec![8, 9, 0, 0], targets);
/// assert_eq!(HostMessage::Configure(states.modules().to_vec()), message);
/// #
/// # Ok(()) }
/// ```
///
/// [`Alphabet`]: struct.Alphabet.html
/// [`HostMessage`]: enum.HostMessage.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleStates {
    alphabet: Alphabet,
    modules: Vec<Module>,
}

impl ModuleStates {
    /// Creates the state for `module_count` modules, or an unknown count if 0.
    pub fn new(alphabet: Alphabet, module_count: usize) -> Self {
        ModuleStates {
            alphabet,
            modules: vec![Module::default(); module_count],
        }
    }

    /// Number of modules, 0 if not yet known.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Current target state of each module.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The alphabet used to resolve characters.
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Resolves `text` into target positions and the matching force-movement list.
    ///
    /// Positions past the end of `text` are padded with the blank index up to the module count.
    /// No force-movement list is produced for [`ForceMovement::None`].
    ///
    /// [`ForceMovement::None`]: enum.ForceMovement.html#variant.None
    pub fn positions_for_text(&self, text: &str, force: ForceMovement) -> (Vec<u32>, Option<Vec<bool>>) {
        let mut positions: Vec<u32> = text.chars().map(|c| self.alphabet.index_of(c)).collect();
        let text_len = positions.len();
        if text_len < self.modules.len() {
            positions.resize(self.modules.len(), self.alphabet.blank_index());
        }

        let force_list = match force {
            ForceMovement::None => None,
            ForceMovement::OnlyNonBlank => {
                let mut list: Vec<bool> = positions[..text_len].iter().map(|&index| index != 0).collect();
                list.resize(positions.len(), false);
                Some(list)
            }
            ForceMovement::All => Some(vec![true; self.modules.len()]),
        };

        (positions, force_list)
    }

    /// Shows `text` on the display, returning the configuration message to send.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`set_positions`].
    ///
    /// [`set_positions`]: #method.set_positions
    pub fn set_text(&mut self, text: &str, force: ForceMovement) -> Result<HostMessage, ModuleError> {
        let (positions, force_list) = self.positions_for_text(text, force);
        self.set_positions(&positions, force_list.as_deref())
    }

    /// Sets the leading modules' targets, bumping the movement nonce where `force` says so.
    ///
    /// Modules past the end of `positions` keep their current target.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`ModuleError::UnknownModuleCount`] if the module count isn't known yet.
    /// * [`ModuleError::TooManyPositions`] if there are more positions than modules.
    /// * [`ModuleError::ForceMovementMismatch`] if `force` is present but a different length than `positions`.
    ///
    /// Nothing is modified on error.
    ///
    /// [`ModuleError::UnknownModuleCount`]: enum.ModuleError.html#variant.UnknownModuleCount
    /// [`ModuleError::TooManyPositions`]: enum.ModuleError.html#variant.TooManyPositions
    /// [`ModuleError::ForceMovementMismatch`]: enum.ModuleError.html#variant.ForceMovementMismatch
    pub fn set_positions(&mut self, positions: &[u32], force: Option<&[bool]>) -> Result<HostMessage, ModuleError> {
        if self.modules.is_empty() {
            return Err(ModuleError::UnknownModuleCount);
        }

        if positions.len() > self.modules.len() {
            return Err(ModuleError::TooManyPositions {
                max: self.modules.len(),
                actual: positions.len(),
            });
        }

        if let Some(force) = force {
            if force.len() != positions.len() {
                return Err(ModuleError::ForceMovementMismatch {
                    expected: positions.len(),
                    actual: force.len(),
                });
            }
        }

        for (i, (module, &position)) in self.modules.iter_mut().zip(positions).enumerate() {
            module.target_flap_index = position;
            if force.map_or(false, |force| force[i]) {
                module.movement_nonce = module.movement_nonce.wrapping_add(1);
            }
        }

        Ok(HostMessage::Configure(self.modules.clone()))
    }

    /// Reconciles the held module count with one reported by the device.
    ///
    /// An unknown count adopts the report with zero-initialized modules. A known count is
    /// never resized.
    pub fn reconcile_module_count(&mut self, reported: usize) -> Reconciliation {
        let held = self.modules.len();
        if held == reported || reported == 0 {
            Reconciliation::Unchanged
        } else if held == 0 {
            self.modules = vec![Module::default(); reported];
            Reconciliation::Adopted(reported)
        } else {
            Reconciliation::Mismatch { held, reported }
        }
    }
}
