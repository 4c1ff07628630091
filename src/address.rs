use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_with::DeserializeFromStr;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// A 48-bit BLE device address.
///
/// Displays as colon-separated lowercase hex (`e4:b9:ef:b2:92:18`) and travels
/// on the wire as twelve bare hex digits (`e4b9efb29218`).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, DeserializeFromStr)]
pub struct Address([u8; 6]);

impl Address {
    /// Creates an address from its six bytes in display order.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Returns the address bytes in display order.
    #[must_use]
    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Returns the separator-free form used by the wire protocol.
    #[must_use]
    pub fn to_wire(&self) -> String {
        hex::encode(self.0)
    }
}

/// Errors returned when parsing a device address.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AddressParseError {
    #[error("address `{value}` must contain exactly 12 hex digits")]
    InvalidLength { value: String },
    #[error("address `{value}` contains a non-hex character")]
    InvalidDigit { value: String },
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Accepts bare hex as well as `:`, `-` or whitespace separated forms.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits: String = value
            .chars()
            .filter(|c| !matches!(c, ':' | '-') && !c.is_whitespace())
            .collect();
        if digits.len() != 12 {
            return Err(AddressParseError::InvalidLength {
                value: value.to_string(),
            });
        }

        let mut bytes = [0u8; 6];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|_| AddressParseError::InvalidDigit {
            value: value.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

/// Whether an address is a public (IEEE) or random address.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Display,
    EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AddressType {
    /// IEEE-assigned public address.
    Public,
    /// Random static or private address.
    Random,
}
