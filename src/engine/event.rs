use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

use crate::address::Address;
use crate::model::{PeripheralSnapshot, TransportFault};
use crate::protocol::AdapterState;

/// Stream of engine-wide events returned by [`Engine::events`](super::Engine::events).
pub type EventStream = UnboundedReceiverStream<EngineEvent>;

/// Engine-wide notifications not tied to an awaited operation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EngineEvent {
    /// The radio reported a new power state.
    AdapterStateChanged(AdapterState),
    /// A scan record matched the active filter.
    Discovered(PeripheralSnapshot),
    /// The transport ended the scan.
    ScanFinished,
    /// A transport error that names no known peripheral.
    Error(TransportFault),
    /// A remote central connected to the local GATT server.
    ClientConnected(Address),
    /// The latched remote central went away.
    ClientDisconnected(Address),
    /// The negotiated MTU of the peripheral-role link changed.
    MtuChanged(u16),
}

/// Single-subscriber fan-out point for [`EngineEvent`]s.
#[derive(Debug, Default)]
pub(crate) struct EventSink {
    subscriber: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    /// Installs a new subscriber, replacing any previous one.
    pub(crate) fn subscribe(&mut self) -> EventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        if self.subscriber.replace(sender).is_some() {
            debug!("replacing engine event subscriber");
        }
        UnboundedReceiverStream::new(receiver)
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        let Some(subscriber) = &self.subscriber else {
            trace!(?event, "no event subscriber");
            return;
        };
        if subscriber.send(event).is_err() {
            debug!("event subscriber went away");
            self.subscriber = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn new_subscriber_replaces_the_previous_one() {
        let mut sink = EventSink::default();
        let mut first = sink.subscribe().into_inner();
        let mut second = sink.subscribe().into_inner();

        sink.emit(EngineEvent::ScanFinished);

        assert!(first.try_recv().is_err());
        assert_eq!(Ok(EngineEvent::ScanFinished), second.try_recv());
    }

    #[test]
    fn dropped_subscriber_is_forgotten() {
        let mut sink = EventSink::default();
        drop(sink.subscribe());

        sink.emit(EngineEvent::MtuChanged(23));

        assert!(sink.subscriber.is_none());
    }
}
