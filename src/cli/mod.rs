pub(crate) mod command;
pub(crate) mod gatt;
pub(crate) mod listen;
pub(crate) mod scan;
pub(crate) mod ui;

pub use self::command::{Args, CharacteristicTarget, Command, LogLevel, ReadArgs, WriteArgs};
pub use self::listen::ListenArgs;
pub use self::scan::ScanArgs;
