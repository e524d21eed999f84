use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// Errors related to [`Alphabet`]s.
///
/// [`Alphabet`]: struct.Alphabet.html
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AlphabetError {
    /// The alphabet had no characters.
    #[error("Alphabet must contain at least one character")]
    Empty,

    /// A character appeared more than once.
    #[error("Character {:?} appears at both index {} and {}", character, first, second)]
    Duplicate {
        /// The repeated character.
        character: char,

        /// Index of its first occurrence.
        first: usize,

        /// Index of the repeat.
        second: usize,
    },
}

/// Ordered set of characters printed on a module's flaps.
///
/// A character's position in the alphabet is the flap index the firmware rotates to.
/// Index 0 is conventionally the blank flap, and anything not in the alphabet maps to it.
///
/// # Examples
///
/// ```
/// use splitflap_core::Alphabet;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let alphabet: Alphabet = " ABC".parse()?;
/// assert_eq!(2, alphabet.index_of('B'));
/// assert_eq!(0, alphabet.index_of('?'));
/// assert_eq!(Some('C'), alphabet.char_at(3));
/// #
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Alphabet {
    chars: Vec<char>,
}

impl Alphabet {
    /// Creates an alphabet from its characters in flap order.
    ///
    /// # Errors
    ///
    /// Returns:
    /// * [`AlphabetError::Empty`] if `order` has no characters.
    /// * [`AlphabetError::Duplicate`] if any character repeats.
    ///
    /// [`AlphabetError::Empty`]: enum.AlphabetError.html#variant.Empty
    /// [`AlphabetError::Duplicate`]: enum.AlphabetError.html#variant.Duplicate
    pub fn new(order: &str) -> Result<Self, AlphabetError> {
        let chars: Vec<char> = order.chars().collect();
        if chars.is_empty() {
            return Err(AlphabetError::Empty);
        }

        for (second, &character) in chars.iter().enumerate() {
            if let Some(first) = chars[..second].iter().position(|&c| c == character) {
                return Err(AlphabetError::Duplicate { character, first, second });
            }
        }

        Ok(Alphabet { chars })
    }

    /// Returns the flap index for `c`, or 0 if the alphabet doesn't contain it.
    pub fn index_of(&self, c: char) -> u32 {
        self.chars.iter().position(|&candidate| candidate == c).map_or(0, |i| i as u32)
    }

    /// Returns the flap index used for padding, i.e. that of a space.
    pub fn blank_index(&self) -> u32 {
        self.index_of(' ')
    }

    /// Returns the character on flap `index`, if there is one.
    pub fn char_at(&self, index: u32) -> Option<char> {
        self.chars.get(index as usize).copied()
    }

    /// Number of flaps.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always false, since construction rejects empty alphabets.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl FromStr for Alphabet {
    type Err = AlphabetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Alphabet::new(s)
    }
}

impl Display for Alphabet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for c in &self.chars {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case('A', 1 ; "first letter")]
    #[test_case('Z', 26 ; "last letter")]
    #[test_case(' ', 0 ; "blank")]
    #[test_case('a', 0 ; "lowercase is unknown")]
    #[test_case('#', 0 ; "symbol is unknown")]
    fn index_of(c: char, expected: u32) {
        let alphabet = Alphabet::new(" ABCDEFGHIJKLMNOPQRSTUVWXYZ").unwrap();
        assert_eq!(expected, alphabet.index_of(c));
    }

    #[test]
    fn blank_not_first() {
        let alphabet = Alphabet::new("ABC ").unwrap();
        assert_eq!(3, alphabet.blank_index());
    }

    #[test]
    fn blank_missing() {
        let alphabet = Alphabet::new("ABC").unwrap();
        assert_eq!(0, alphabet.blank_index());
    }

    #[test]
    fn multibyte_characters() {
        let alphabet = Alphabet::new(" ÄÖÜ♥").unwrap();
        assert_eq!(5, alphabet.len());
        assert_eq!(4, alphabet.index_of('♥'));
        assert_eq!(Some('Ö'), alphabet.char_at(2));
        assert_eq!(None, alphabet.char_at(5));
    }

    #[test]
    fn empty() {
        let error = Alphabet::new("").unwrap_err();
        assert!(matches!(error, AlphabetError::Empty));
    }

    #[test]
    fn duplicate() {
        let error = Alphabet::new(" ABCA").unwrap_err();
        match error {
            AlphabetError::Duplicate { character, first, second } => {
                assert_eq!('A', character);
                assert_eq!(1, first);
                assert_eq!(4, second);
            }
            _ => panic!("Unexpected error: {}", error),
        }
    }

    #[test]
    fn display_roundtrip() {
        let order = " 0123456789.,'";
        let alphabet: Alphabet = order.parse().unwrap();
        assert_eq!(order, alphabet.to_string());
    }
}
