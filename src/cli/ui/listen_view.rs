use std::fmt::{self, Display, Formatter};

use crate::address::Address;
use crate::uuid::GattUuid;
use crate::utils::{format_hex, printable_text};

use super::painter::Painter;
use super::table::Table;

/// Why a listen session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub(crate) enum ListenStop {
    #[display("reached {_0} notifications")]
    ReachedLimit(usize),
    #[display("interrupted")]
    Interrupted,
    #[display("link closed")]
    Disconnected,
}

/// Renders a single notification line.
pub(crate) struct NotificationLine<'a> {
    index: usize,
    payload: &'a [u8],
    painter: &'a Painter,
}

impl<'a> NotificationLine<'a> {
    pub(crate) fn new(index: usize, payload: &'a [u8], painter: &'a Painter) -> Self {
        Self {
            index,
            payload,
            painter,
        }
    }
}

impl Display for NotificationLine<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index = self.painter.muted(format!("[{:04}]", self.index));
        write!(f, "{index} {}", self.painter.strong(format_hex(self.payload)))?;
        if let Some(text) = printable_text(self.payload) {
            write!(f, " {}", self.painter.muted(format!("{text:?}")))?;
        }
        Ok(())
    }
}

/// Renders the listen session summary.
pub(crate) struct ListenSummaryView<'a> {
    address: Address,
    characteristic: &'a GattUuid,
    received: usize,
    stop: ListenStop,
    painter: &'a Painter,
}

impl<'a> ListenSummaryView<'a> {
    pub(crate) fn new(
        address: Address,
        characteristic: &'a GattUuid,
        received: usize,
        stop: ListenStop,
        painter: &'a Painter,
    ) -> Self {
        Self {
            address,
            characteristic,
            received,
            stop,
            painter,
        }
    }
}

impl Display for ListenSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let table = Table::fields(
            self.painter,
            vec![
                ("peripheral", self.painter.strong(self.address.to_string())),
                ("characteristic", self.characteristic.to_string()),
                ("notifications", self.received.to_string()),
                (
                    "stopped",
                    self.painter
                        .verdict(self.stop != ListenStop::Disconnected, self.stop.to_string()),
                ),
            ],
        );
        write!(f, "{}\n{table}", self.painter.heading("Listen summary:"))
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn notification_line_pads_the_index() {
        let painter = Painter::new(false);
        assert_eq!(
            "[0007] 01 ff",
            NotificationLine::new(7, &[0x01, 0xff], &painter).to_string()
        );
        assert_eq!(
            "[0012] 4f 4b \"OK\"",
            NotificationLine::new(12, b"OK", &painter).to_string()
        );
    }

    #[test]
    fn summary_names_the_stop_reason() {
        let painter = Painter::new(false);
        let address: Address = "e5f678800700".parse().expect("address should parse");
        let characteristic = GattUuid::new("2a37");

        let view = ListenSummaryView::new(
            address,
            &characteristic,
            3,
            ListenStop::ReachedLimit(3),
            &painter,
        );

        assert_snapshot!("listen_summary", view.to_string());
    }
}
