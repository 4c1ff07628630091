/// Formats bytes as lowercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    let encoded = hex::encode(bytes);
    let mut rendered = String::with_capacity(bytes.len().saturating_mul(3));
    for (index, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        rendered.extend(pair.iter().map(|digit| char::from(*digit)));
    }
    rendered
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    match rssi {
        Some(value) => format!("{value} dBm"),
        None => "-".to_string(),
    }
}

/// Renders a payload as text when every byte is printable ASCII.
pub(crate) fn printable_text(bytes: &[u8]) -> Option<&str> {
    if bytes.is_empty() || !bytes.iter().all(|byte| byte.is_ascii_graphic() || *byte == b' ') {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_lowercase_pairs() {
        assert_eq!("05 00 a1 ff", format_hex(&[0x05, 0x00, 0xA1, 0xFF]));
    }

    #[rstest]
    #[case::unknown(None, "-")]
    #[case::known(Some(-70), "-70 dBm")]
    fn format_rssi_renders_units(#[case] rssi: Option<i16>, #[case] expected: &str) {
        assert_eq!(expected, format_rssi(rssi));
    }

    #[rstest]
    #[case::text(b"Puck.js".as_slice(), Some("Puck.js"))]
    #[case::binary(&[0x00, 0x41], None)]
    #[case::empty(&[], None)]
    fn printable_text_only_accepts_ascii(#[case] bytes: &[u8], #[case] expected: Option<&str>) {
        assert_eq!(expected, printable_text(bytes));
    }
}
