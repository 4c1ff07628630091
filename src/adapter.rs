//! Glue between typed engine state and the JSON wire: the ordered outbox,
//! the initialization handshake and the event routing table.

use std::collections::VecDeque;
use std::mem;

use tracing::{debug, trace, warn};

use crate::error::{EngineError, Operation};
use crate::model::{Resolver, resolve, resolve_all};
use crate::protocol::{AdapterState, BleEvent, Command, decode_events, encode_command};

/// FIFO queue of commands waiting to be written to the transport.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    queue: VecDeque<Command>,
}

impl Outbox {
    pub(crate) fn push(&mut self, command: Command) {
        trace!(command = command.name(), "queued command");
        self.queue.push_back(command);
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.queue.drain(..)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Which part of the engine consumes an event.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Route {
    /// Adapter power state: the handshake first, then both bindings.
    Session,
    Central,
    Peripheral,
}

pub(crate) fn route(event: &BleEvent) -> Route {
    match event {
        BleEvent::AdapterState(_) => Route::Session,
        BleEvent::ScanResult(_)
        | BleEvent::ScanFinished
        | BleEvent::Status(_)
        | BleEvent::ServiceDiscovered(_)
        | BleEvent::ServiceDiscoveryFinished(_)
        | BleEvent::CharacteristicDiscovered(_)
        | BleEvent::CharacteristicDiscoveryFinished(_)
        | BleEvent::DescriptorDiscovered(_)
        | BleEvent::DescriptorDiscoveryFinished(_)
        | BleEvent::CharacteristicRead(_)
        | BleEvent::CharacteristicWritten(_)
        | BleEvent::NotifyToggled(_)
        | BleEvent::Notification(_)
        | BleEvent::DescriptorRead(_)
        | BleEvent::DescriptorWritten(_)
        | BleEvent::Error(_) => Route::Central,
        BleEvent::PeripheralRole(_) => Route::Peripheral,
    }
}

/// Wire codec plus the one-time `initialize` handshake.
#[derive(Debug)]
pub(crate) struct ProtocolAdapter {
    outbox: Outbox,
    require_initialization: bool,
    initialize_sent: bool,
    adapter_state: Option<AdapterState>,
    init_waiters: Vec<Resolver<()>>,
}

impl ProtocolAdapter {
    pub(crate) fn new(require_initialization: bool) -> Self {
        Self {
            outbox: Outbox::default(),
            require_initialization,
            initialize_sent: false,
            adapter_state: None,
            init_waiters: Vec::new(),
        }
    }

    pub(crate) fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    pub(crate) fn adapter_state(&self) -> Option<AdapterState> {
        self.adapter_state
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.adapter_state == Some(AdapterState::PoweredOn)
    }

    /// Gates every command other than `initialize`.
    pub(crate) fn ensure_initialized(&self) -> Result<(), EngineError> {
        if !self.require_initialization || self.is_initialized() {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    /// Sends `initialize` once and resolves when the radio reports power-on.
    pub(crate) fn initialize(&mut self, resolver: Resolver<()>) {
        if self.is_initialized() {
            resolve(resolver, Ok(()));
            return;
        }
        self.init_waiters.push(resolver);
        if !self.initialize_sent {
            self.initialize_sent = true;
            self.outbox.push(Command::Initialize {});
        }
    }

    pub(crate) fn on_adapter_state(&mut self, state: AdapterState) {
        debug!(%state, "adapter state changed");
        self.adapter_state = Some(state);
        match state {
            AdapterState::PoweredOn => {
                resolve_all(mem::take(&mut self.init_waiters), &Ok(()));
            }
            AdapterState::Unauthorized | AdapterState::Unsupported => {
                self.initialize_sent = false;
                resolve_all(
                    mem::take(&mut self.init_waiters),
                    &Err(EngineError::OperationFailed {
                        operation: Operation::Initialize,
                        reason: format!("adapter is {state}"),
                    }),
                );
            }
            AdapterState::PoweredOff | AdapterState::Resetting | AdapterState::Unknown => {}
        }
    }

    /// Encodes queued commands in submission order.
    pub(crate) fn take_frames(&mut self) -> Vec<String> {
        self.outbox
            .drain()
            .filter_map(|command| match encode_command(&command) {
                Ok(frame) => {
                    trace!(command = command.name(), %frame, "encoded command");
                    Some(frame)
                }
                Err(error) => {
                    warn!(command = command.name(), %error, "dropping command that failed to encode");
                    None
                }
            })
            .collect()
    }

    /// Decodes one inbound frame; undecodable frames are logged and dropped.
    pub(crate) fn decode(&self, frame: &str) -> Vec<BleEvent> {
        match decode_events(frame) {
            Ok(events) => {
                trace!(count = events.len(), "decoded inbound frame");
                events
            }
            Err(error) => {
                warn!(%error, %frame, "dropping undecodable frame");
                Vec::new()
            }
        }
    }

    pub(crate) fn fail_in_flight(&mut self) {
        resolve_all(
            mem::take(&mut self.init_waiters),
            &Err(EngineError::OperationFailed {
                operation: Operation::Initialize,
                reason: "transport closed".to_string(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tokio::sync::oneshot;

    use super::*;

    #[test]
    fn initialize_is_sent_once_for_concurrent_callers() {
        let mut adapter = ProtocolAdapter::new(true);
        let (first, mut first_rx) = oneshot::channel();
        let (second, mut second_rx) = oneshot::channel();

        adapter.initialize(first);
        adapter.initialize(second);
        assert_eq!(vec![r#"{"ble":{"initialize":{}}}"#.to_string()], adapter.take_frames());

        adapter.on_adapter_state(AdapterState::PoweredOn);
        assert_matches!(first_rx.try_recv(), Ok(Ok(())));
        assert_matches!(second_rx.try_recv(), Ok(Ok(())));
        assert!(adapter.ensure_initialized().is_ok());
    }

    #[test]
    fn unsupported_adapter_fails_handshake() {
        let mut adapter = ProtocolAdapter::new(true);
        let (resolver, mut receiver) = oneshot::channel();
        adapter.initialize(resolver);

        adapter.on_adapter_state(AdapterState::Unsupported);

        assert_matches!(
            receiver.try_recv(),
            Ok(Err(EngineError::OperationFailed {
                operation: Operation::Initialize,
                ..
            }))
        );
        assert_eq!(Err(EngineError::NotInitialized), adapter.ensure_initialized());
    }

    #[test]
    fn gate_is_open_when_initialization_is_not_required() {
        let adapter = ProtocolAdapter::new(false);
        assert!(adapter.ensure_initialized().is_ok());
    }

    #[test]
    fn frames_preserve_submission_order() {
        let mut adapter = ProtocolAdapter::new(false);
        adapter.outbox_mut().push(Command::ScanStop {});
        adapter.outbox_mut().push(Command::AdvertisementStop {});

        let frames = adapter.take_frames();

        assert_eq!(
            vec![
                r#"{"ble":{"scan_stop":{}}}"#.to_string(),
                r#"{"ble":{"advertisement_stop":{}}}"#.to_string(),
            ],
            frames
        );
        assert!(adapter.outbox_mut().is_empty());
    }

    #[test]
    fn undecodable_frames_yield_no_events() {
        let adapter = ProtocolAdapter::new(true);
        assert!(adapter.decode("not json").is_empty());
    }

    #[test]
    fn peripheral_role_events_route_to_peripheral_binding() {
        let adapter = ProtocolAdapter::new(true);
        let events = adapter.decode(
            r#"{"ble":{"peripheral_events":[{"event":"accepted","address":"e5f678800700"}],"state_updates":[{"state":"powered_on"}]}}"#,
        );
        let routes: Vec<Route> = events.iter().map(route).collect();
        assert_eq!(vec![Route::Session, Route::Peripheral], routes);
    }
}
