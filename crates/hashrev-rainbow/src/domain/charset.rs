//! Charset resolution
//!
//! Maps a charset selector (or a user-defined range) to the alphabet used
//! when reduction functions generate plaintexts.

use serde::{Deserialize, Serialize};

pub const CHARSET_DIGITS: &str = "0123456789";
pub const CHARSET_LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
pub const CHARSET_UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const CHARSET_ALPHA: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const CHARSET_ALPHA_DIGITS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CHARSET_FULL: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()-_=+[]{}|;:,.<>?/";

/// Predefined charset selector
///
/// Stored as its numeric code; unknown codes resolve to `Digits`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum CharsetSelector {
    #[default]
    Digits,
    Lowercase,
    Uppercase,
    MixedCase,
    MixedCaseDigits,
    Full,
}

impl CharsetSelector {
    /// Decode a stored selector code
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Lowercase,
            3 => Self::Uppercase,
            4 => Self::MixedCase,
            5 => Self::MixedCaseDigits,
            6 => Self::Full,
            _ => Self::Digits,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Digits => 1,
            Self::Lowercase => 2,
            Self::Uppercase => 3,
            Self::MixedCase => 4,
            Self::MixedCaseDigits => 5,
            Self::Full => 6,
        }
    }

    pub fn alphabet(self) -> &'static str {
        match self {
            Self::Digits => CHARSET_DIGITS,
            Self::Lowercase => CHARSET_LOWER,
            Self::Uppercase => CHARSET_UPPER,
            Self::MixedCase => CHARSET_ALPHA,
            Self::MixedCaseDigits => CHARSET_ALPHA_DIGITS,
            Self::Full => CHARSET_FULL,
        }
    }
}

impl From<i32> for CharsetSelector {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl From<CharsetSelector> for i32 {
    fn from(selector: CharsetSelector) -> Self {
        selector.code()
    }
}

/// Resolve the alphabet string for a selector
///
/// A non-empty custom range wins over the selector and is returned verbatim.
pub fn resolve(selector: CharsetSelector, custom_range: &str) -> &str {
    if custom_range.is_empty() {
        selector.alphabet()
    } else {
        custom_range
    }
}

/// Resolved alphabet used by the reduction function
///
/// Always non-empty; an empty input falls back to digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    pub fn new(chars: &str) -> Self {
        let source = if chars.is_empty() {
            CHARSET_DIGITS
        } else {
            chars
        };
        Self {
            symbols: source.chars().collect(),
        }
    }

    /// Resolve selector + custom range into an alphabet
    pub fn resolve(selector: CharsetSelector, custom_range: &str) -> Self {
        Self::new(resolve(selector, custom_range))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    #[inline]
    pub fn symbol(&self, index: usize) -> char {
        self.symbols[index]
    }

    pub fn contains(&self, c: char) -> bool {
        self.symbols.contains(&c)
    }

    pub fn as_string(&self) -> String {
        self.symbols.iter().collect()
    }
}
