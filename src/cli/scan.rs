use std::io;
use std::time::Duration;

use anyhow::Result;
use tokio_stream::StreamExt;
use tracing::{debug, instrument};

use crate::bindings::{ScanFilter, ScanOptions};
use crate::engine::{Engine, EngineEvent};
use crate::model::PeripheralSnapshot;
use crate::uuid::GattUuid;

use super::command::parse_duration;
use super::ui::{Painter, ScanStop, ScanView};

const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);
/// Extra time allowed for the bridge to report the end of the scan.
const FINISH_GRACE: Duration = Duration::from_secs(2);

/// Arguments for the `scan` command.
#[derive(Debug, Clone, clap::Args)]
pub struct ScanArgs {
    /// Scan length (e.g. `5s`, `1m`).
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    duration: Duration,
    /// Only report peripherals whose local name starts with this prefix.
    #[arg(long = "name-prefix")]
    name_prefixes: Vec<String>,
    /// Only report peripherals advertising this service UUID.
    #[arg(long = "service")]
    service_uuids: Vec<GattUuid>,
    /// Report each address at most once.
    #[arg(long)]
    unique: bool,
}

impl Default for ScanArgs {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_DURATION,
            name_prefixes: Vec::new(),
            service_uuids: Vec::new(),
            unique: false,
        }
    }
}

impl ScanArgs {
    /// Overrides the scan length.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Adds a local-name prefix filter.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefixes.push(prefix.into());
        self
    }

    fn filter(&self) -> ScanFilter {
        ScanFilter::builder()
            .name_prefixes(self.name_prefixes.clone())
            .service_uuids(self.service_uuids.clone())
            .build()
    }

    fn options(&self) -> ScanOptions {
        ScanOptions::builder()
            .duration(self.duration)
            .suppress_duplicates(self.unique)
            .build()
    }
}

/// Executes the `scan` command.
#[instrument(skip_all, level = "info", fields(duration = ?args.duration))]
pub(crate) async fn run<W>(
    engine: &Engine,
    args: &ScanArgs,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let mut events = engine.events().await?;
    engine.start_scan(Some(args.filter()), args.options()).await?;

    let mut seen: Vec<PeripheralSnapshot> = Vec::new();
    let deadline = tokio::time::sleep(args.duration + FINISH_GRACE);
    tokio::pin!(deadline);

    let stop = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break ScanStop::Interrupted;
            }
            () = &mut deadline => break ScanStop::TimedOut,
            event = events.next() => match event {
                Some(EngineEvent::Discovered(snapshot)) => {
                    match seen.iter_mut().find(|known| known.address() == snapshot.address()) {
                        Some(known) => *known = snapshot,
                        None => seen.push(snapshot),
                    }
                }
                Some(EngineEvent::ScanFinished) => break ScanStop::Finished,
                Some(other) => debug!(?other, "ignoring engine event during scan"),
                None => break ScanStop::EngineStopped,
            },
        }
    };

    if stop != ScanStop::EngineStopped {
        engine.stop_scan().await?;
    }
    writeln!(out, "{}", ScanView::new(&seen, stop, painter))?;
    Ok(())
}
