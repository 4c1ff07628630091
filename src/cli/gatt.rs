use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::engine::{CharacteristicHandle, Engine, PeripheralHandle};
use crate::error::CommandError;

use super::command::{CharacteristicTarget, ReadArgs, WriteArgs};
use super::ui::{CharacteristicView, Painter};

/// Connects to the target and resolves its characteristic.
///
/// The peripheral is left connected; callers disconnect when done.
pub(crate) async fn open_characteristic(
    engine: &Engine,
    target: &CharacteristicTarget,
) -> Result<(PeripheralHandle, CharacteristicHandle)> {
    let peripheral = engine
        .direct_connect_wait(target.address(), target.address_type())
        .await?;
    let Some(service) = peripheral.get_service(target.service().clone()).await? else {
        peripheral.disconnect().await?;
        return Err(CommandError::MissingService {
            address: target.address(),
            service: target.service().clone(),
        }
        .into());
    };
    let characteristic = service.characteristic(target.characteristic().clone());
    Ok((peripheral, characteristic))
}

/// Executes the `read` command.
#[instrument(skip_all, level = "info", fields(address = %args.target().address()))]
pub(crate) async fn run_read<W>(
    engine: &Engine,
    args: &ReadArgs,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let target = args.target();
    let (peripheral, characteristic) = open_characteristic(engine, target).await?;
    let read = characteristic.read().await;
    peripheral.disconnect().await?;
    let value = read?;

    writeln!(
        out,
        "{}",
        CharacteristicView::new(
            target.address(),
            target.service(),
            target.characteristic(),
            "read",
            &value,
            painter,
        )
    )?;
    Ok(())
}

/// Executes the `write` command.
#[instrument(skip_all, level = "info", fields(address = %args.target().address()))]
pub(crate) async fn run_write<W>(
    engine: &Engine,
    args: &WriteArgs,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let target = args.target();
    let (peripheral, characteristic) = open_characteristic(engine, target).await?;
    let written = characteristic
        .write(args.payload(), args.without_response())
        .await;
    peripheral.disconnect().await?;
    written?;

    writeln!(
        out,
        "{}",
        CharacteristicView::new(
            target.address(),
            target.service(),
            target.characteristic(),
            "written",
            args.payload(),
            painter,
        )
    )?;
    Ok(())
}
