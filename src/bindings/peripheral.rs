use tracing::{debug, trace, warn};

use crate::adapter::Outbox;
use crate::address::Address;
use crate::engine::{EngineEvent, EventSink};
use crate::error::ProtocolAnomaly;
use crate::protocol::{AdapterState, Command, PeripheralRoleEvent, PeripheralRoleRecord};

/// The local GATT-server role: advertising plus at most one remote client.
#[derive(Debug, Default)]
pub(crate) struct PeripheralBinding {
    client: Option<Address>,
    mtu: Option<u16>,
    advertising: bool,
}

impl PeripheralBinding {
    pub(crate) fn connected_client(&self) -> Option<Address> {
        self.client
    }

    pub(crate) fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    #[cfg(test)]
    pub(crate) fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub(crate) fn start_advertising(
        &mut self,
        adv_data: Vec<u8>,
        scan_resp: Vec<u8>,
        outbox: &mut Outbox,
    ) {
        outbox.push(Command::AdvertisementStart {
            adv_data,
            scan_resp,
        });
        self.advertising = true;
    }

    /// Sends `advertisement_stop` only while advertising.
    pub(crate) fn stop_advertising(&mut self, outbox: &mut Outbox) {
        if self.advertising {
            outbox.push(Command::AdvertisementStop {});
            self.advertising = false;
        } else {
            trace!("stop_advertising while not advertising");
        }
    }

    pub(crate) fn on_adapter_state(&mut self, state: AdapterState) {
        if state == AdapterState::PoweredOff {
            self.client = None;
            self.mtu = None;
            self.advertising = false;
        }
    }

    pub(crate) fn handle_event(&mut self, record: PeripheralRoleRecord, sink: &mut EventSink) {
        match record.event {
            PeripheralRoleEvent::Accepted => {
                let Some(address) = record.address else {
                    warn_incomplete("accepted", "address");
                    return;
                };
                match self.client {
                    None => {
                        debug!(%address, "client accepted");
                        self.client = Some(address);
                        sink.emit(EngineEvent::ClientConnected(address));
                    }
                    Some(latched) if latched == address => {
                        trace!(%address, "duplicate accept for the connected client");
                    }
                    Some(latched) => {
                        warn!(
                            anomaly = %ProtocolAnomaly::SecondClientAccepted {
                                latched,
                                rejected: address,
                            },
                            "rejecting second client"
                        );
                    }
                }
            }
            PeripheralRoleEvent::Disconnected => {
                let Some(address) = record.address else {
                    warn_incomplete("disconnected", "address");
                    return;
                };
                if self.client == Some(address) {
                    debug!(%address, "client disconnected");
                    self.client = None;
                    sink.emit(EngineEvent::ClientDisconnected(address));
                } else {
                    warn!(
                        anomaly = %ProtocolAnomaly::UnexpectedClientDisconnect { address },
                        "dropping client disconnect"
                    );
                }
            }
            PeripheralRoleEvent::MtuChanged => {
                let Some(mtu) = record.mtu else {
                    warn_incomplete("mtu_changed", "mtu");
                    return;
                };
                debug!(mtu, "mtu changed");
                self.mtu = Some(mtu);
                sink.emit(EngineEvent::MtuChanged(mtu));
            }
        }
    }
}

fn warn_incomplete(event: &'static str, field: &'static str) {
    warn!(
        anomaly = %ProtocolAnomaly::IncompletePeripheralEvent { event, field },
        "dropping peripheral event"
    );
}
