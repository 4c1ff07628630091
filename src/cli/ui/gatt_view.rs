use std::fmt::{self, Display, Formatter};

use crate::address::Address;
use crate::uuid::GattUuid;
use crate::utils::{format_hex, printable_text};

use super::painter::Painter;
use super::table::Table;

/// Renders the outcome of a one-shot characteristic read or write.
pub(crate) struct CharacteristicView<'a> {
    address: Address,
    service: &'a GattUuid,
    characteristic: &'a GattUuid,
    action: &'static str,
    payload: &'a [u8],
    painter: &'a Painter,
}

impl<'a> CharacteristicView<'a> {
    pub(crate) fn new(
        address: Address,
        service: &'a GattUuid,
        characteristic: &'a GattUuid,
        action: &'static str,
        payload: &'a [u8],
        painter: &'a Painter,
    ) -> Self {
        Self {
            address,
            service,
            characteristic,
            action,
            payload,
            painter,
        }
    }
}

impl Display for CharacteristicView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut fields = vec![
            ("peripheral", self.painter.strong(self.address.to_string())),
            ("service", self.service.to_string()),
            ("characteristic", self.characteristic.to_string()),
            ("hex", self.painter.strong(format_hex(self.payload))),
        ];
        if let Some(text) = printable_text(self.payload) {
            fields.push(("text", format!("{text:?}")));
        }

        write!(
            f,
            "{} {}\n{}",
            self.painter.heading("Characteristic"),
            self.painter.verdict(true, self.action),
            Table::fields(self.painter, fields)
        )
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::printable("read", b"hi".as_slice(), "characteristic_read_text")]
    #[case::binary("written", [0x01, 0xe8].as_slice(), "characteristic_written_binary")]
    fn characteristic_view_renders_fields(
        #[case] action: &'static str,
        #[case] payload: &[u8],
        #[case] snapshot_name: &str,
    ) {
        let painter = Painter::new(false);
        let service = GattUuid::new("180d");
        let characteristic = GattUuid::new("2a37");
        let address: Address = "e5f678800700".parse().expect("address should parse");

        let view = CharacteristicView::new(
            address,
            &service,
            &characteristic,
            action,
            payload,
            &painter,
        );

        assert_snapshot!(snapshot_name, view.to_string());
    }
}
