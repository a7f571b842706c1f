//! The register index alphabet and uppercase fold rule.

use crate::error::StoreError;

/// A register index, already folded to its storage key.
///
/// Uppercase letters select "append" semantics against the lowercase key;
/// every other valid character (lowercase letters, digits, `*`, `+`) selects
/// "replace" semantics against itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterIndex {
    /// The lowercase-folded key under which the item is stored.
    key: u8,
    /// Whether the original wire byte was uppercase (append semantics).
    append: bool,
}

impl RegisterIndex {
    /// Validate and fold a raw wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIndex`] if `raw` is outside `a`-`z`,
    /// `A`-`Z`, `0`-`9`, `*`, or `+`.
    pub fn parse(raw: u8) -> Result<Self, StoreError> {
        if !is_valid_alphabet(raw) {
            return Err(StoreError::InvalidIndex(raw));
        }
        Ok(Self { key: raw.to_ascii_lowercase(), append: raw.is_ascii_uppercase() })
    }

    /// The lowercase-folded storage key.
    #[must_use]
    pub fn key(self) -> u8 {
        self.key
    }

    /// Whether this index selects append-into-existing semantics.
    #[must_use]
    pub fn is_append(self) -> bool {
        self.append
    }
}

/// Whether `raw` is a member of the register alphabet, before folding:
/// `a`-`z`, `A`-`Z`, `0`-`9`, `*`, `+`.
#[must_use]
pub fn is_valid_alphabet(raw: u8) -> bool {
    raw.is_ascii_alphanumeric() || raw == b'*' || raw == b'+'
}
