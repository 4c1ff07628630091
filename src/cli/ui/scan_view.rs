use std::fmt::{self, Display, Formatter};

use crate::model::PeripheralSnapshot;
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

/// Why a scan stopped printing results.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub(crate) enum ScanStop {
    #[display("scan finished")]
    Finished,
    #[display("scan timed out")]
    TimedOut,
    #[display("interrupted")]
    Interrupted,
    #[display("engine stopped")]
    EngineStopped,
}

/// Renders every peripheral seen during one scan.
pub(crate) struct ScanView<'a> {
    peripherals: &'a [PeripheralSnapshot],
    stop: ScanStop,
    painter: &'a Painter,
}

impl<'a> ScanView<'a> {
    pub(crate) fn new(
        peripherals: &'a [PeripheralSnapshot],
        stop: ScanStop,
        painter: &'a Painter,
    ) -> Self {
        Self {
            peripherals,
            stop,
            painter,
        }
    }
}

impl Display for ScanView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = Table::new(["address", "type", "name", "rssi", "connectable"]);
        for peripheral in self.peripherals {
            table.push_row(vec![
                self.painter.strong(peripheral.address().to_string()),
                peripheral
                    .address_type()
                    .map_or_else(|| "-".to_string(), |kind| kind.to_string()),
                peripheral
                    .local_name()
                    .map_or_else(|| self.painter.muted("<unnamed>"), str::to_string),
                format_rssi(peripheral.rssi()),
                self.painter.verdict(
                    peripheral.is_connectable(),
                    if peripheral.is_connectable() { "yes" } else { "no" },
                ),
            ]);
        }

        let heading = format!(
            "{} {}",
            self.painter.heading("Peripherals:"),
            self.painter
                .muted(format!("({} found, {})", self.peripherals.len(), self.stop))
        );
        if table.is_empty() {
            return write!(f, "{heading}\n{}", self.painter.muted("none"));
        }
        write!(f, "{heading}\n{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::address::{Address, AddressType};
    use crate::model::RemotePeripheral;
    use crate::protocol::ScanRecord;

    fn scanned(raw: &str, rssi: i16, adv_data: Vec<u8>, connectable: bool) -> PeripheralSnapshot {
        let address: Address = raw.parse().expect("address should parse");
        let mut peripheral = RemotePeripheral::new(address);
        peripheral.observe_scan(&ScanRecord {
            event_type: Some("inquiry_result".to_string()),
            address: Some(address),
            address_type: Some(AddressType::Public),
            ble_event_type: Some("connectable_advertisement".to_string()),
            rssi: Some(rssi),
            adv_data,
            scan_resp: Vec::new(),
        });
        peripheral.snapshot(Some(AddressType::Public), connectable)
    }

    #[test]
    fn scan_table_lists_each_peripheral() {
        let painter = Painter::new(false);
        let peripherals = vec![
            scanned("e5f678800700", -64, vec![0x05, 0x09, b'P', b'u', b'c', b'k'], true),
            scanned("aabbccddeeff", -91, vec![0x02, 0x01, 0x06], false),
        ];

        let view = ScanView::new(&peripherals, ScanStop::Finished, &painter);

        assert_snapshot!("scan_table", view.to_string());
    }

    #[test]
    fn empty_scan_says_none() {
        let painter = Painter::new(false);

        let view = ScanView::new(&[], ScanStop::TimedOut, &painter);

        assert_snapshot!("scan_empty", view.to_string());
    }
}
