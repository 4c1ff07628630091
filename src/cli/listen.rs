use std::io;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::engine::Engine;

use super::command::CharacteristicTarget;
use super::gatt::open_characteristic;
use super::ui::{ListenStop, ListenSummaryView, NotificationLine, Painter};

/// Arguments for the `listen` command.
#[derive(Debug, Clone, clap::Args)]
pub struct ListenArgs {
    #[command(flatten)]
    target: CharacteristicTarget,
    /// Stop after this many notifications. If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_notifications: Option<usize>,
}

impl ListenArgs {
    /// Creates listen arguments with an optional notification limit.
    #[must_use]
    pub fn new(target: CharacteristicTarget, max_notifications: Option<usize>) -> Self {
        Self {
            target,
            max_notifications,
        }
    }
}

enum Signal {
    Payload(Vec<u8>),
    Disconnected,
}

/// Executes the `listen` command.
#[instrument(
    skip_all,
    level = "info",
    fields(address = %args.target.address(), max_notifications = ?args.max_notifications)
)]
pub(crate) async fn run<W>(
    engine: &Engine,
    args: &ListenArgs,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let target = &args.target;
    let (peripheral, characteristic) = open_characteristic(engine, target).await?;

    let (signals, mut received_signals) = mpsc::unbounded_channel();
    let payloads = signals.clone();
    let wanted = characteristic.uuid().clone();
    peripheral
        .on_notification(move |notification| {
            if notification.characteristic() == &wanted {
                let _ = payloads.send(Signal::Payload(notification.data().to_vec()));
            }
        })
        .await?;
    peripheral
        .on_disconnect(move |_reason| {
            let _ = signals.send(Signal::Disconnected);
        })
        .await?;

    if let Err(error) = characteristic.subscribe().await {
        peripheral.disconnect().await?;
        return Err(error.into());
    }

    let mut received = 0usize;
    let stop = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break ListenStop::Interrupted;
            }
            signal = received_signals.recv() => match signal {
                Some(Signal::Payload(payload)) => {
                    received += 1;
                    writeln!(out, "{}", NotificationLine::new(received, &payload, painter))?;
                    if let Some(limit) = args.max_notifications && received >= limit {
                        break ListenStop::ReachedLimit(limit);
                    }
                }
                Some(Signal::Disconnected) | None => break ListenStop::Disconnected,
            },
        }
    };

    if stop != ListenStop::Disconnected {
        if let Err(error) = characteristic.unsubscribe().await {
            debug!(%error, "failed to unsubscribe cleanly");
        }
        peripheral.disconnect().await?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "{}",
        ListenSummaryView::new(target.address(), characteristic.uuid(), received, stop, painter)
    )?;
    Ok(())
}
