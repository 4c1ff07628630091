use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use crate::address::{Address, AddressType};
use crate::cli::listen::ListenArgs;
use crate::cli::scan::ScanArgs;
use crate::error::CliConfigError;
use crate::uuid::GattUuid;

/// Command-line options for the blelink tool.
#[derive(Debug, Parser)]
#[command(
    name = "blelink",
    about = "Drive a BLE radio through a JSON-lines bridge."
)]
pub struct Args {
    /// Connects to a bridge at `HOST:PORT` instead of speaking over stdin/stdout.
    #[arg(long, global = true)]
    tcp: Option<String>,
    /// Overrides `RUST_LOG` with a single maximum level.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Sends commands without waiting for the adapter to power on.
    #[arg(long, global = true)]
    skip_initialize: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use blelink::{Args, Command, ScanArgs};
    ///
    /// let args = Args::new(Command::Scan(ScanArgs::default()));
    /// assert_eq!(None, args.tcp());
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            tcp: None,
            log_level: None,
            skip_initialize: false,
            command,
        }
    }

    /// Returns the bridge address, when one was given.
    #[must_use]
    pub fn tcp(&self) -> Option<&str> {
        self.tcp.as_deref()
    }

    /// Returns the log-level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns whether the adapter handshake is skipped.
    #[must_use]
    pub fn skip_initialize(&self) -> bool {
        self.skip_initialize
    }

    /// Consumes the arguments, returning the subcommand.
    #[must_use]
    pub fn into_command(self) -> Command {
        self.command
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan and print every peripheral seen.
    Scan(ScanArgs),
    /// Connect to a peripheral and read one characteristic.
    Read(ReadArgs),
    /// Connect to a peripheral and write one characteristic.
    Write(WriteArgs),
    /// Connect to a peripheral, subscribe, and print notifications.
    Listen(ListenArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Scan(_args) => "scan",
            Self::Read(_args) => "read",
            Self::Write(_args) => "write",
            Self::Listen(_args) => "listen",
        }
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// One characteristic on one remote peripheral.
#[derive(Debug, Clone, clap::Args)]
pub struct CharacteristicTarget {
    /// Peripheral address, with or without separators.
    address: Address,
    /// Service UUID.
    service: GattUuid,
    /// Characteristic UUID.
    characteristic: GattUuid,
    /// Address type used when the peripheral has not been scanned.
    #[arg(long, value_enum, default_value_t = TargetAddressType::Random)]
    address_type: TargetAddressType,
}

impl CharacteristicTarget {
    /// Creates a target directly without CLI parsing.
    #[must_use]
    pub fn new(
        address: Address,
        address_type: AddressType,
        service: impl Into<GattUuid>,
        characteristic: impl Into<GattUuid>,
    ) -> Self {
        Self {
            address,
            service: service.into(),
            characteristic: characteristic.into(),
            address_type: address_type.into(),
        }
    }

    pub(crate) fn address(&self) -> Address {
        self.address
    }

    pub(crate) fn address_type(&self) -> AddressType {
        self.address_type.into()
    }

    pub(crate) fn service(&self) -> &GattUuid {
        &self.service
    }

    pub(crate) fn characteristic(&self) -> &GattUuid {
        &self.characteristic
    }
}

/// Clap-facing mirror of [`AddressType`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
enum TargetAddressType {
    Public,
    Random,
}

impl From<TargetAddressType> for AddressType {
    fn from(value: TargetAddressType) -> Self {
        match value {
            TargetAddressType::Public => Self::Public,
            TargetAddressType::Random => Self::Random,
        }
    }
}

impl From<AddressType> for TargetAddressType {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => Self::Public,
            AddressType::Random => Self::Random,
        }
    }
}

/// Arguments for the `read` command.
#[derive(Debug, Clone, clap::Args)]
pub struct ReadArgs {
    #[command(flatten)]
    target: CharacteristicTarget,
}

impl ReadArgs {
    /// Creates read arguments.
    #[must_use]
    pub fn new(target: CharacteristicTarget) -> Self {
        Self { target }
    }

    pub(crate) fn target(&self) -> &CharacteristicTarget {
        &self.target
    }
}

/// Arguments for the `write` command.
#[derive(Debug, Clone, clap::Args)]
pub struct WriteArgs {
    #[command(flatten)]
    target: CharacteristicTarget,
    /// Payload as hexadecimal bytes, e.g. `0a1b` or `0A 1B`.
    payload: HexPayload,
    /// Requests a write without response.
    #[arg(long)]
    without_response: bool,
}

impl WriteArgs {
    /// Creates write arguments.
    #[must_use]
    pub fn new(target: CharacteristicTarget, payload: Vec<u8>, without_response: bool) -> Self {
        Self {
            target,
            payload: HexPayload { bytes: payload },
            without_response,
        }
    }

    pub(crate) fn target(&self) -> &CharacteristicTarget {
        &self.target
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.payload.bytes
    }

    pub(crate) fn without_response(&self) -> bool {
        self.without_response
    }
}

/// Bytes parsed from a hexadecimal argument.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct HexPayload {
    bytes: Vec<u8>,
}

impl FromStr for HexPayload {
    type Err = CliConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let compact: String = value
            .chars()
            .filter(|character| !character.is_whitespace() && *character != ':')
            .collect();
        let bytes = hex::decode(&compact).map_err(|_error| CliConfigError::InvalidHexPayload {
            value: value.to_string(),
        })?;
        Ok(Self { bytes })
    }
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
