//! Per-device state: connection lifecycle, GATT cache and pending operations.

mod connection;
mod gatt;
mod observer;
mod peripheral;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::EngineError;

pub use connection::ConnectionState;
pub use gatt::{CharacteristicInfo, CharacteristicProperty, DescriptorInfo, ServiceInfo};
pub use observer::{Notification, TransportFault, WriteReport};
pub(crate) use peripheral::RemotePeripheral;
pub use peripheral::PeripheralSnapshot;

/// Completes one awaiting caller.
pub(crate) type Resolver<T> = oneshot::Sender<Result<T, EngineError>>;

/// Delivers an outcome; a caller that stopped waiting is not an error.
pub(crate) fn resolve<T>(resolver: Resolver<T>, outcome: Result<T, EngineError>) {
    if resolver.send(outcome).is_err() {
        trace!("caller stopped waiting; dropping resolution");
    }
}

pub(crate) fn resolve_all<T: Clone>(resolvers: Vec<Resolver<T>>, outcome: &Result<T, EngineError>) {
    for resolver in resolvers {
        resolve(resolver, outcome.clone());
    }
}
