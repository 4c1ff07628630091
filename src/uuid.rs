use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Renders raw UUID bytes as a lowercase hex string.
///
/// When `reverse_byte_order` is set the bytes are reversed first, which turns a
/// little-endian wire encoding into the conventional big-endian text form.
/// Inputs of 16 bytes or more are grouped 8-4-4-4-12 with hyphens; shorter
/// inputs (16-bit and 32-bit short UUIDs) are returned bare.
///
/// ```
/// assert_eq!("0201", blelink::to_canonical_uuid(&[0x01, 0x02], true));
/// assert_eq!("0102", blelink::to_canonical_uuid(&[0x01, 0x02], false));
/// ```
#[must_use]
pub fn to_canonical_uuid(bytes: &[u8], reverse_byte_order: bool) -> String {
    let digits = if reverse_byte_order {
        let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
        hex::encode(reversed)
    } else {
        hex::encode(bytes)
    };

    if bytes.len() < 16 {
        return digits;
    }

    format!(
        "{}-{}-{}-{}-{}",
        &digits[0..8],
        &digits[8..12],
        &digits[12..16],
        &digits[16..20],
        &digits[20..]
    )
}

/// A GATT UUID as it appears on the wire or in caller requests.
///
/// The text is kept lowercase for display. Equality and hashing look only at
/// the hex digits, so `"FF00"` matches `"ff00"` and a hyphenated 128-bit UUID
/// matches its unhyphenated spelling. Short UUIDs are never expanded to the
/// Bluetooth base UUID.
#[derive(Debug, Clone, Default)]
pub struct GattUuid {
    text: String,
}

impl GattUuid {
    /// Creates a UUID from caller or wire text.
    #[must_use]
    pub fn new(text: impl AsRef<str>) -> Self {
        Self {
            text: text.as_ref().trim().to_ascii_lowercase(),
        }
    }

    /// Creates a UUID from raw bytes using [`to_canonical_uuid`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8], reverse_byte_order: bool) -> Self {
        Self {
            text: to_canonical_uuid(bytes, reverse_byte_order),
        }
    }

    /// Returns the lowercase text form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the UUID bytes in little-endian wire order, if the text is valid hex.
    pub(crate) fn to_le_bytes(&self) -> Option<Vec<u8>> {
        let mut bytes = hex::decode(self.digits().collect::<String>()).ok()?;
        bytes.reverse();
        Some(bytes)
    }

    fn digits(&self) -> impl Iterator<Item = char> + '_ {
        self.text.chars().filter(char::is_ascii_hexdigit)
    }
}

impl PartialEq for GattUuid {
    fn eq(&self, other: &Self) -> bool {
        self.digits().eq(other.digits())
    }
}

impl Eq for GattUuid {}

impl Hash for GattUuid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for digit in self.digits() {
            digit.hash(state);
        }
    }
}

impl Display for GattUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for GattUuid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for GattUuid {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for GattUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for GattUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(text))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[0x01, 0x02], true, "0201")]
    #[case(&[0x01, 0x02], false, "0102")]
    #[case(&[0x0d, 0x18], true, "180d")]
    #[case(&[0xAB, 0xCD, 0xEF, 0x01], false, "abcdef01")]
    #[case(&[], false, "")]
    fn short_inputs_are_not_hyphenated(
        #[case] bytes: &[u8],
        #[case] reverse: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(expected, to_canonical_uuid(bytes, reverse));
    }

    #[test]
    fn sixteen_bytes_reversed_produce_canonical_grouping() {
        let wire = [
            0xfb, 0x34, 0x9b, 0x5f, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x0d, 0x18,
            0x00, 0x00,
        ];
        assert_eq!(
            "0000180d-0000-1000-8000-00805f9b34fb",
            to_canonical_uuid(&wire, true)
        );
    }

    #[rstest]
    #[case(16)]
    #[case(17)]
    #[case(20)]
    fn long_inputs_have_four_hyphens_at_fixed_offsets(#[case] len: usize) {
        let bytes: Vec<u8> = (0..len).map(|value| value as u8).collect();
        let rendered = to_canonical_uuid(&bytes, false);

        let hyphens: Vec<usize> = rendered
            .char_indices()
            .filter(|(_, c)| *c == '-')
            .map(|(index, _)| index)
            .collect();
        assert_eq!(vec![8, 13, 18, 23], hyphens);
    }

    #[test]
    fn distinct_inputs_of_equal_length_render_distinctly() {
        let mut seen = HashSet::new();
        for high in 0..=u8::MAX {
            for low in [0x00, 0x7F, 0xFF] {
                assert!(seen.insert(to_canonical_uuid(&[high, low], false)));
            }
        }
    }

    #[rstest]
    #[case("FF00", "ff00")]
    #[case(
        "0000180D-0000-1000-8000-00805F9B34FB",
        "0000180d00001000800000805f9b34fb"
    )]
    fn gatt_uuid_matches_case_and_hyphen_variants(#[case] left: &str, #[case] right: &str) {
        assert_eq!(GattUuid::new(left), GattUuid::new(right));
    }

    #[test]
    fn gatt_uuid_does_not_expand_short_forms() {
        assert_ne!(
            GattUuid::new("180d"),
            GattUuid::new("0000180d-0000-1000-8000-00805f9b34fb")
        );
    }

    #[test]
    fn gatt_uuid_le_bytes_reverse_text_order() {
        assert_eq!(Some(vec![0x0d, 0x18]), GattUuid::new("180D").to_le_bytes());
    }
}
