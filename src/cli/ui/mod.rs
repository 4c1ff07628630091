mod gatt_view;
mod listen_view;
mod painter;
mod scan_view;
mod table;

pub(crate) use self::gatt_view::CharacteristicView;
pub(crate) use self::listen_view::{ListenStop, ListenSummaryView, NotificationLine};
pub(crate) use self::painter::Painter;
pub(crate) use self::scan_view::{ScanStop, ScanView};
