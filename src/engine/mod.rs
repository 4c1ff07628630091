//! The engine actor and its public async facade.

mod event;
mod handle;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{Outbox, ProtocolAdapter, Route, route};
use crate::address::{Address, AddressType};
use crate::advertisement::AdvertisementData;
use crate::bindings::{CentralBinding, PeripheralBinding, ScanFilter, ScanOptions};
use crate::error::{BleError, EngineError};
use crate::model::{PeripheralSnapshot, RemotePeripheral, Resolver, resolve};
use crate::protocol::{AdapterState, BleEvent};
use crate::transport::Transport;

pub use event::{EngineEvent, EventStream};
pub(crate) use event::EventSink;
pub use handle::{CharacteristicHandle, DescriptorHandle, PeripheralHandle, ServiceHandle};

const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(30);

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, Eq, PartialEq, bon::Builder)]
pub struct EngineConfig {
    /// Gate every command behind a successful `initialize()`.
    #[builder(default = true)]
    require_initialization: bool,
    /// Scan length used when [`ScanOptions`] leaves it unset.
    #[builder(default = DEFAULT_SCAN_DURATION)]
    default_scan_duration: Duration,
}

impl EngineConfig {
    /// Returns whether commands wait for the adapter handshake.
    #[must_use]
    pub fn require_initialization(&self) -> bool {
        self.require_initialization
    }

    /// Returns the scan length used when none is requested.
    #[must_use]
    pub fn default_scan_duration(&self) -> Duration {
        self.default_scan_duration
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything the actor owns.
#[derive(Debug)]
pub(crate) struct EngineState {
    adapter: ProtocolAdapter,
    central: CentralBinding,
    peripheral: PeripheralBinding,
    sink: EventSink,
    config: EngineConfig,
}

impl EngineState {
    fn new(config: EngineConfig) -> Self {
        Self {
            adapter: ProtocolAdapter::new(config.require_initialization()),
            central: CentralBinding::default(),
            peripheral: PeripheralBinding::default(),
            sink: EventSink::default(),
            config,
        }
    }

    fn dispatch_frame(&mut self, frame: &str) {
        for event in self.adapter.decode(frame) {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: BleEvent) {
        match (route(&event), event) {
            (Route::Session, BleEvent::AdapterState(state)) => self.on_adapter_state(state),
            (Route::Peripheral, BleEvent::PeripheralRole(record)) => {
                self.peripheral.handle_event(record, &mut self.sink);
            }
            (Route::Central, event) => {
                self.central
                    .handle_event(event, &mut self.sink, self.adapter.outbox_mut());
            }
            (route, event) => debug!(?route, kind = event.kind(), "event has no handler"),
        }
    }

    fn on_adapter_state(&mut self, state: AdapterState) {
        self.adapter.on_adapter_state(state);
        self.central.on_adapter_state(state);
        self.peripheral.on_adapter_state(state);
        self.sink.emit(EngineEvent::AdapterStateChanged(state));
    }

    fn fail_in_flight(&mut self) {
        self.adapter.fail_in_flight();
        self.central.fail_in_flight();
    }
}

type Job = Box<dyn FnOnce(&mut EngineState) + Send>;

enum Step {
    Job(Job),
    Frame(String),
    TransportClosed,
    Shutdown,
}

#[instrument(skip_all, level = "debug")]
async fn run<T: Transport>(
    mut transport: T,
    mut state: EngineState,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) {
    loop {
        let step = tokio::select! {
            biased;
            () = shutdown.cancelled() => Step::Shutdown,
            job = jobs.recv() => job.map_or(Step::Shutdown, Step::Job),
            message = transport.next_message() => match message {
                Ok(Some(frame)) => Step::Frame(frame),
                Ok(None) => Step::TransportClosed,
                Err(error) => {
                    warn!(%error, "transport receive failed");
                    Step::TransportClosed
                }
            },
        };

        match step {
            Step::Job(job) => job(&mut state),
            Step::Frame(frame) => state.dispatch_frame(&frame),
            Step::TransportClosed => {
                info!("transport closed; stopping engine");
                state.fail_in_flight();
                return;
            }
            Step::Shutdown => {
                debug!("engine shut down");
                return;
            }
        }

        for frame in state.adapter.take_frames() {
            if let Err(error) = transport.send(frame).await {
                warn!(%error, "transport send failed; stopping engine");
                state.fail_in_flight();
                return;
            }
        }
    }
}

/// Handle to a running engine actor; cheap to clone.
///
/// Every call is serialized through the actor, so the engine needs no locks.
/// Awaited operations have no built-in timeout: wrap them in
/// [`tokio::time::timeout`] where a deadline matters.
#[derive(Debug, Clone)]
pub struct Engine {
    jobs: mpsc::UnboundedSender<Job>,
    shutdown: CancellationToken,
}

impl Engine {
    /// Starts an engine with the default configuration on the current runtime.
    ///
    /// ```no_run
    /// # async fn demo() -> Result<(), blelink::EngineError> {
    /// let (transport, _peer) = blelink::transport::channel();
    /// let engine = blelink::Engine::spawn(transport);
    /// engine.initialize().await?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn spawn<T: Transport>(transport: T) -> Self {
        Self::spawn_with_config(transport, EngineConfig::default())
    }

    /// Starts an engine on the current runtime.
    #[must_use]
    pub fn spawn_with_config<T: Transport>(transport: T, config: EngineConfig) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(run(
            transport,
            EngineState::new(config),
            receiver,
            shutdown.clone(),
        ));
        Self { jobs, shutdown }
    }

    /// Runs `job` inside the actor and waits for it to resolve.
    async fn request<T, F>(&self, job: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EngineState, Resolver<T>) + Send + 'static,
    {
        let (resolver, receiver) = oneshot::channel();
        self.jobs
            .send(Box::new(move |state: &mut EngineState| job(state, resolver)))
            .map_err(|_stopped| EngineError::EngineStopped)?;
        receiver.await.map_err(|_dropped| EngineError::EngineStopped)?
    }

    /// Reads actor state without touching the wire.
    async fn query<T, F>(&self, read: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EngineState) -> Result<T, EngineError> + Send + 'static,
    {
        self.request(move |state, resolver| resolve(resolver, read(state)))
            .await
    }

    /// Like [`Self::request`], but fails with `NotInitialized` until the handshake completes.
    async fn command<T, F>(&self, job: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EngineState, Resolver<T>) + Send + 'static,
    {
        self.request(move |state, resolver| match state.adapter.ensure_initialized() {
            Ok(()) => job(state, resolver),
            Err(error) => resolve(resolver, Err(error)),
        })
        .await
    }

    /// Runs a gated command against one tracked peripheral.
    async fn peripheral_command<T, F>(&self, address: Address, job: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut RemotePeripheral, Resolver<T>, &mut Outbox) + Send + 'static,
    {
        self.command(move |state, resolver| match state.central.peripheral_mut(address) {
            Ok(peripheral) => job(peripheral, resolver, state.adapter.outbox_mut()),
            Err(error) => resolve(resolver, Err(error)),
        })
        .await
    }

    /// Sends `initialize` once and waits until the adapter reports `powered_on`.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` when the adapter is unauthorized or
    /// unsupported, or `EngineStopped` when the actor is gone.
    #[instrument(skip(self), level = "debug")]
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.request(|state, resolver| state.adapter.initialize(resolver))
            .await
    }

    /// Returns the last adapter state the transport reported.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn adapter_state(&self) -> Result<Option<AdapterState>, EngineError> {
        self.query(|state| Ok(state.adapter.adapter_state())).await
    }

    /// Starts scanning; discoveries arrive on [`Self::events`].
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the handshake completes.
    #[instrument(skip(self, filter), level = "debug")]
    pub async fn start_scan(
        &self,
        filter: Option<ScanFilter>,
        options: ScanOptions,
    ) -> Result<(), EngineError> {
        self.command(move |state, resolver| {
            let default_duration = state.config.default_scan_duration();
            state.central.start_scan(
                filter.unwrap_or_default(),
                options,
                default_duration,
                state.adapter.outbox_mut(),
            );
            resolve(resolver, Ok(()));
        })
        .await
    }

    /// Stops an active scan; a no-op otherwise.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the handshake completes.
    #[instrument(skip(self), level = "debug")]
    pub async fn stop_scan(&self) -> Result<(), EngineError> {
        self.command(|state, resolver| {
            state.central.stop_scan(state.adapter.outbox_mut());
            resolve(resolver, Ok(()));
        })
        .await
    }

    /// Starts connecting to an address without scanning for it first.
    ///
    /// An address type already learned from scanning wins over `address_type`.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the handshake completes.
    #[instrument(skip(self), level = "debug", fields(%address))]
    pub async fn direct_connect(
        &self,
        address: Address,
        address_type: AddressType,
    ) -> Result<PeripheralHandle, EngineError> {
        self.command(move |state, resolver| {
            state
                .central
                .direct_connect(address, address_type, None, state.adapter.outbox_mut());
            resolve(resolver, Ok(()));
        })
        .await?;
        Ok(PeripheralHandle::new(self.clone(), address))
    }

    /// Like [`Self::direct_connect`], but waits until the link is up.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` when the link closes before it is established.
    #[instrument(skip(self), level = "debug", fields(%address))]
    pub async fn direct_connect_wait(
        &self,
        address: Address,
        address_type: AddressType,
    ) -> Result<PeripheralHandle, EngineError> {
        self.command(move |state, resolver| {
            state.central.direct_connect(
                address,
                address_type,
                Some(resolver),
                state.adapter.outbox_mut(),
            );
        })
        .await?;
        Ok(PeripheralHandle::new(self.clone(), address))
    }

    /// Returns a handle to a tracked peripheral.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeripheral` when the address was never scanned or connected.
    pub async fn peripheral(&self, address: Address) -> Result<PeripheralHandle, EngineError> {
        self.query(move |state| {
            if state.central.contains(address) {
                Ok(())
            } else {
                Err(EngineError::UnknownPeripheral { address })
            }
        })
        .await?;
        Ok(PeripheralHandle::new(self.clone(), address))
    }

    /// Returns snapshots of every tracked peripheral in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn peripherals(&self) -> Result<Vec<PeripheralSnapshot>, EngineError> {
        self.query(|state| Ok(state.central.snapshots())).await
    }

    /// Subscribes to engine-wide events, replacing any previous subscriber.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn events(&self) -> Result<EventStream, EngineError> {
        self.query(|state| Ok(state.sink.subscribe())).await
    }

    /// Encodes and starts advertising the local GATT server.
    ///
    /// # Errors
    ///
    /// Returns an advertisement error when a payload does not encode, or an
    /// engine error when the command cannot be sent.
    #[instrument(skip_all, level = "debug")]
    pub async fn start_advertising(
        &self,
        advertisement: &AdvertisementData,
        scan_response: Option<&AdvertisementData>,
    ) -> Result<(), BleError> {
        let adv_data = advertisement.encode()?;
        let scan_resp = scan_response
            .map(AdvertisementData::encode)
            .transpose()?
            .unwrap_or_default();
        self.command(move |state, resolver| {
            state
                .peripheral
                .start_advertising(adv_data, scan_resp, state.adapter.outbox_mut());
            resolve(resolver, Ok(()));
        })
        .await?;
        Ok(())
    }

    /// Stops advertising; a no-op when not advertising.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the handshake completes.
    #[instrument(skip(self), level = "debug")]
    pub async fn stop_advertising(&self) -> Result<(), EngineError> {
        self.command(|state, resolver| {
            state.peripheral.stop_advertising(state.adapter.outbox_mut());
            resolve(resolver, Ok(()));
        })
        .await
    }

    /// Returns the remote central connected to the local GATT server, if any.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn connected_client(&self) -> Result<Option<Address>, EngineError> {
        self.query(|state| Ok(state.peripheral.connected_client()))
            .await
    }

    /// Returns the MTU of the peripheral-role link, once negotiated.
    ///
    /// # Errors
    ///
    /// Returns `EngineStopped` when the actor is gone.
    pub async fn mtu(&self) -> Result<Option<u16>, EngineError> {
        self.query(|state| Ok(state.peripheral.mtu())).await
    }

    /// Stops the actor and waits for it to exit.
    ///
    /// Calls still waiting fail with `EngineStopped`.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.jobs.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::transport::channel;

    #[tokio::test]
    async fn calls_after_shutdown_fail_with_engine_stopped() {
        let (transport, _peer) = channel();
        let engine = Engine::spawn(transport);

        engine.shutdown().await;

        assert_matches!(engine.initialize().await, Err(EngineError::EngineStopped));
    }

    #[tokio::test]
    async fn commands_are_gated_until_powered_on() {
        let (transport, mut peer) = channel();
        let engine = Engine::spawn(transport);

        assert_eq!(
            Err(EngineError::NotInitialized),
            engine.start_scan(None, ScanOptions::default()).await
        );
        assert!(peer.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn disabled_gate_lets_commands_through() {
        let (transport, mut peer) = channel();
        let config = EngineConfig::builder()
            .require_initialization(false)
            .default_scan_duration(Duration::from_secs(5))
            .build();
        let engine = Engine::spawn_with_config(transport, config);

        engine
            .start_scan(None, ScanOptions::default())
            .await
            .expect("scan should start");

        assert_eq!(
            Some(json!({"ble": {"scan": {"duration": 5, "duplicate": true}}})),
            peer.next_command().await
        );
    }

    #[test]
    fn default_config_requires_initialization() {
        let config = EngineConfig::default();
        assert!(config.require_initialization());
        assert_eq!(Duration::from_secs(30), config.default_scan_duration());
    }
}
