//! Opaque handles to externally owned GPU objects.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HandleParseError;

/// Identifier of an instance, adapter or device created outside this crate.
///
/// The value is never dereferenced here; it is carried through configuration
/// to whatever embeds the crate and knows what it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueHandle(NonZeroU64);

impl OpaqueHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl FromStr for OpaqueHandle {
    type Err = HandleParseError;

    /// Parse a decimal handle value. Zero is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HandleParseError::Empty);
        }
        let raw: u64 = s
            .parse()
            .map_err(|_| HandleParseError::Malformed(s.to_string()))?;
        Self::new(raw).ok_or(HandleParseError::Null)
    }
}

impl fmt::Display for OpaqueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
