//! Lightweight handles naming one peripheral, service, characteristic or
//! descriptor. Handles hold no state of their own; every call goes through
//! the engine actor.

use tracing::instrument;

use super::Engine;
use crate::address::Address;
use crate::error::EngineError;
use crate::model::{ConnectionState, Notification, PeripheralSnapshot, TransportFault, WriteReport};
use crate::uuid::GattUuid;

/// A remote peripheral tracked by the engine.
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    engine: Engine,
    address: Address,
}

impl PeripheralHandle {
    pub(crate) fn new(engine: Engine, address: Address) -> Self {
        Self { engine, address }
    }

    /// Returns the peripheral's address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Connects, or joins a connection attempt already in flight.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddressType` when the address type was never learned,
    /// `InvalidState` while disconnecting, or `OperationFailed` when the link
    /// closes before it is established.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub async fn connect(&self) -> Result<(), EngineError> {
        let address = self.address;
        self.engine
            .command(move |state, resolver| {
                state
                    .central
                    .connect(address, resolver, state.adapter.outbox_mut());
            })
            .await
    }

    /// Disconnects; resolves at once when there is no link.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the handshake completes.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub async fn disconnect(&self) -> Result<(), EngineError> {
        self.engine
            .peripheral_command(self.address, |peripheral, resolver, outbox| {
                peripheral.disconnect(resolver, outbox);
            })
            .await
    }

    /// Returns a point-in-time copy of the peripheral.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn snapshot(&self) -> Result<PeripheralSnapshot, EngineError> {
        let address = self.address;
        self.engine
            .query(move |state| state.central.snapshot(address))
            .await
    }

    /// Returns the current connection state.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn connection_state(&self) -> Result<ConnectionState, EngineError> {
        let address = self.address;
        self.engine
            .query(move |state| Ok(state.central.peripheral(address)?.state()))
            .await
    }

    /// Discovers every service, or returns them from cache once discovered.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a link, or `LinkLost` if the link drops
    /// before discovery finishes.
    #[instrument(skip(self), level = "debug", fields(address = %self.address))]
    pub async fn discover_services(&self) -> Result<Vec<ServiceHandle>, EngineError> {
        let uuids = self
            .engine
            .peripheral_command(self.address, |peripheral, resolver, outbox| {
                peripheral.discover_services(resolver, outbox);
            })
            .await?;
        Ok(uuids.into_iter().map(|uuid| self.service(uuid)).collect())
    }

    /// Looks up one service, discovering just that service when it is not cached.
    ///
    /// Returns `None` when the remote does not have it.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when a lookup is needed but there is no link.
    #[instrument(skip(self, uuid), level = "debug", fields(address = %self.address))]
    pub async fn get_service(
        &self,
        uuid: impl Into<GattUuid>,
    ) -> Result<Option<ServiceHandle>, EngineError> {
        let uuid = uuid.into();
        let wanted = uuid.clone();
        let present = self
            .engine
            .peripheral_command(self.address, move |peripheral, resolver, outbox| {
                peripheral.lookup_service(&wanted, resolver, outbox);
            })
            .await?;
        Ok(present.then(|| self.service(uuid)))
    }

    /// Returns a handle to a service without checking that it exists.
    #[must_use]
    pub fn service(&self, uuid: impl Into<GattUuid>) -> ServiceHandle {
        ServiceHandle {
            peripheral: self.clone(),
            uuid: uuid.into(),
        }
    }

    /// Registers the connect callback, replacing any previous one.
    ///
    /// Callbacks run on the engine task and must not block.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeripheral` or `EngineStopped`.
    pub async fn on_connect<F>(&self, observer: F) -> Result<(), EngineError>
    where
        F: FnMut() + Send + 'static,
    {
        let address = self.address;
        self.engine
            .query(move |state| {
                state
                    .central
                    .peripheral_mut(address)?
                    .observers_mut()
                    .set_connect(Box::new(observer));
                Ok(())
            })
            .await
    }

    /// Registers the disconnect callback; it receives the transport's reason, if any.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeripheral` or `EngineStopped`.
    pub async fn on_disconnect<F>(&self, observer: F) -> Result<(), EngineError>
    where
        F: FnMut(Option<&str>) + Send + 'static,
    {
        let address = self.address;
        self.engine
            .query(move |state| {
                state
                    .central
                    .peripheral_mut(address)?
                    .observers_mut()
                    .set_disconnect(Box::new(observer));
                Ok(())
            })
            .await
    }

    /// Registers the callback for transport errors naming this peripheral.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeripheral` or `EngineStopped`.
    pub async fn on_error<F>(&self, observer: F) -> Result<(), EngineError>
    where
        F: FnMut(&TransportFault) + Send + 'static,
    {
        let address = self.address;
        self.engine
            .query(move |state| {
                state
                    .central
                    .peripheral_mut(address)?
                    .observers_mut()
                    .set_error(Box::new(observer));
                Ok(())
            })
            .await
    }

    /// Registers the callback for notifications on subscribed characteristics.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeripheral` or `EngineStopped`.
    pub async fn on_notification<F>(&self, observer: F) -> Result<(), EngineError>
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        let address = self.address;
        self.engine
            .query(move |state| {
                state
                    .central
                    .peripheral_mut(address)?
                    .observers_mut()
                    .set_notification(Box::new(observer));
                Ok(())
            })
            .await
    }

    /// Registers the callback invoked for every characteristic write result.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeripheral` or `EngineStopped`.
    pub async fn on_write_result<F>(&self, observer: F) -> Result<(), EngineError>
    where
        F: FnMut(&WriteReport) + Send + 'static,
    {
        let address = self.address;
        self.engine
            .query(move |state| {
                state
                    .central
                    .peripheral_mut(address)?
                    .observers_mut()
                    .set_write_result(Box::new(observer));
                Ok(())
            })
            .await
    }
}

/// A GATT service on a remote peripheral.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    peripheral: PeripheralHandle,
    uuid: GattUuid,
}

impl ServiceHandle {
    /// Returns the service UUID.
    #[must_use]
    pub fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns the owning peripheral.
    #[must_use]
    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    /// Discovers every characteristic of the service, or serves them from cache.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a link, or `LinkLost` if the link drops
    /// before discovery finishes.
    #[instrument(skip(self), level = "debug", fields(service = %self.uuid))]
    pub async fn discover_characteristics(&self) -> Result<Vec<CharacteristicHandle>, EngineError> {
        let service = self.uuid.clone();
        let uuids = self
            .peripheral
            .engine
            .peripheral_command(self.peripheral.address, move |peripheral, resolver, outbox| {
                peripheral.discover_characteristics(&service, resolver, outbox);
            })
            .await?;
        Ok(uuids
            .into_iter()
            .map(|uuid| self.characteristic(uuid))
            .collect())
    }

    /// Returns a handle to a characteristic without checking that it exists.
    #[must_use]
    pub fn characteristic(&self, uuid: impl Into<GattUuid>) -> CharacteristicHandle {
        CharacteristicHandle {
            service: self.clone(),
            uuid: uuid.into(),
        }
    }
}

/// A characteristic of a remote service.
#[derive(Debug, Clone)]
pub struct CharacteristicHandle {
    service: ServiceHandle,
    uuid: GattUuid,
}

impl CharacteristicHandle {
    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns the owning service.
    #[must_use]
    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }

    fn engine(&self) -> &Engine {
        &self.service.peripheral.engine
    }

    fn address(&self) -> Address {
        self.service.peripheral.address
    }

    /// Reads the value.
    ///
    /// # Errors
    ///
    /// Returns `OperationPending` while another read is in flight,
    /// `NotConnected` without a link, or `OperationFailed` when the transport
    /// reports an error for this characteristic.
    #[instrument(skip(self), level = "debug", fields(characteristic = %self.uuid))]
    pub async fn read(&self) -> Result<Vec<u8>, EngineError> {
        let service = self.service.uuid.clone();
        let characteristic = self.uuid.clone();
        self.engine()
            .peripheral_command(self.address(), move |peripheral, resolver, outbox| {
                peripheral.read_characteristic(&service, &characteristic, resolver, outbox);
            })
            .await
    }

    /// Writes a value and waits for the transport's write result.
    ///
    /// # Errors
    ///
    /// Returns `OperationPending` while another write is in flight, or
    /// `OperationFailed` when the remote rejects the write.
    #[instrument(skip(self, data), level = "debug", fields(characteristic = %self.uuid))]
    pub async fn write(
        &self,
        data: impl Into<Vec<u8>>,
        without_response: bool,
    ) -> Result<(), EngineError> {
        let service = self.service.uuid.clone();
        let characteristic = self.uuid.clone();
        let data = data.into();
        self.engine()
            .peripheral_command(self.address(), move |peripheral, resolver, outbox| {
                peripheral.write_characteristic(
                    &service,
                    &characteristic,
                    data,
                    without_response,
                    resolver,
                    outbox,
                );
            })
            .await
    }

    /// Enables notifications; values arrive at the peripheral's notification callback.
    ///
    /// # Errors
    ///
    /// Returns `OperationPending` while another toggle is in flight, or
    /// `OperationFailed` when the remote refuses.
    #[instrument(skip(self), level = "debug", fields(characteristic = %self.uuid))]
    pub async fn subscribe(&self) -> Result<(), EngineError> {
        self.toggle_notifications(true).await
    }

    /// Disables notifications.
    ///
    /// # Errors
    ///
    /// Returns `OperationPending` while another toggle is in flight, or
    /// `OperationFailed` when the remote refuses.
    #[instrument(skip(self), level = "debug", fields(characteristic = %self.uuid))]
    pub async fn unsubscribe(&self) -> Result<(), EngineError> {
        self.toggle_notifications(false).await
    }

    async fn toggle_notifications(&self, enable: bool) -> Result<(), EngineError> {
        let service = self.service.uuid.clone();
        let characteristic = self.uuid.clone();
        self.engine()
            .peripheral_command(self.address(), move |peripheral, resolver, outbox| {
                peripheral.toggle_notifications(&service, &characteristic, enable, resolver, outbox);
            })
            .await
    }

    /// Discovers the characteristic's descriptors, or serves them from cache.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a link.
    #[instrument(skip(self), level = "debug", fields(characteristic = %self.uuid))]
    pub async fn discover_descriptors(&self) -> Result<Vec<DescriptorHandle>, EngineError> {
        let service = self.service.uuid.clone();
        let characteristic = self.uuid.clone();
        let uuids = self
            .engine()
            .peripheral_command(self.address(), move |peripheral, resolver, outbox| {
                peripheral.discover_descriptors(&service, &characteristic, resolver, outbox);
            })
            .await?;
        Ok(uuids.into_iter().map(|uuid| self.descriptor(uuid)).collect())
    }

    /// Returns a handle to a descriptor without checking that it exists.
    #[must_use]
    pub fn descriptor(&self, uuid: impl Into<GattUuid>) -> DescriptorHandle {
        DescriptorHandle {
            characteristic: self.clone(),
            uuid: uuid.into(),
        }
    }
}

/// A descriptor of a remote characteristic.
#[derive(Debug, Clone)]
pub struct DescriptorHandle {
    characteristic: CharacteristicHandle,
    uuid: GattUuid,
}

impl DescriptorHandle {
    /// Returns the descriptor UUID.
    #[must_use]
    pub fn uuid(&self) -> &GattUuid {
        &self.uuid
    }

    /// Returns the owning characteristic.
    #[must_use]
    pub fn characteristic(&self) -> &CharacteristicHandle {
        &self.characteristic
    }

    /// Reads the descriptor value.
    ///
    /// # Errors
    ///
    /// Returns `OperationPending` while another read is in flight, or
    /// `NotConnected` without a link.
    #[instrument(skip(self), level = "debug", fields(descriptor = %self.uuid))]
    pub async fn read(&self) -> Result<Vec<u8>, EngineError> {
        let service = self.characteristic.service.uuid.clone();
        let characteristic = self.characteristic.uuid.clone();
        let descriptor = self.uuid.clone();
        self.characteristic
            .engine()
            .peripheral_command(
                self.characteristic.address(),
                move |peripheral, resolver, outbox| {
                    peripheral.read_descriptor(
                        &service,
                        &characteristic,
                        &descriptor,
                        resolver,
                        outbox,
                    );
                },
            )
            .await
    }

    /// Writes the descriptor value and waits for the result.
    ///
    /// # Errors
    ///
    /// Returns `OperationPending` while another write is in flight, or
    /// `OperationFailed` when the remote rejects the write.
    #[instrument(skip(self, data), level = "debug", fields(descriptor = %self.uuid))]
    pub async fn write(&self, data: impl Into<Vec<u8>>) -> Result<(), EngineError> {
        let service = self.characteristic.service.uuid.clone();
        let characteristic = self.characteristic.uuid.clone();
        let descriptor = self.uuid.clone();
        let data = data.into();
        self.characteristic
            .engine()
            .peripheral_command(
                self.characteristic.address(),
                move |peripheral, resolver, outbox| {
                    peripheral.write_descriptor(
                        &service,
                        &characteristic,
                        &descriptor,
                        data,
                        resolver,
                        outbox,
                    );
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::channel;

    #[tokio::test]
    async fn handles_name_their_gatt_path() {
        let (transport, _peer) = channel();
        let engine = Engine::spawn(transport);
        let address: Address = "e5f678800700".parse().expect("address should parse");
        let peripheral = PeripheralHandle::new(engine, address);

        let descriptor = peripheral
            .service("180D")
            .characteristic("2A37")
            .descriptor("2902");

        assert_eq!(&GattUuid::new("180d"), descriptor.characteristic().service().uuid());
        assert_eq!(&GattUuid::new("2a37"), descriptor.characteristic().uuid());
        assert_eq!(address, descriptor.characteristic().service().peripheral().address());
    }

    #[tokio::test]
    async fn untracked_peripheral_is_unknown() {
        let (transport, _peer) = channel();
        let engine = Engine::spawn(transport);
        let address: Address = "e5f678800700".parse().expect("address should parse");

        assert_matches!(
            PeripheralHandle::new(engine, address).snapshot().await,
            Err(EngineError::UnknownPeripheral { .. })
        );
    }
}
