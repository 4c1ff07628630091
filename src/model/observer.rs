use serde::Serialize;

use crate::address::Address;
use crate::protocol::ErrorRecord;
use crate::uuid::GattUuid;

/// A value pushed by a subscribed characteristic.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Notification {
    address: Address,
    service: GattUuid,
    characteristic: GattUuid,
    data: Vec<u8>,
}

impl Notification {
    pub(crate) fn new(
        address: Address,
        service: GattUuid,
        characteristic: GattUuid,
        data: Vec<u8>,
    ) -> Self {
        Self {
            address,
            service,
            characteristic,
            data,
        }
    }

    /// Returns the peripheral that sent the notification.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the service UUID.
    #[must_use]
    pub fn service(&self) -> &GattUuid {
        &self.service
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn characteristic(&self) -> &GattUuid {
        &self.characteristic
    }

    /// Returns the notified bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The remote's verdict on one characteristic write.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct WriteReport {
    address: Address,
    service: GattUuid,
    characteristic: GattUuid,
    succeeded: bool,
}

impl WriteReport {
    pub(crate) fn new(
        address: Address,
        service: GattUuid,
        characteristic: GattUuid,
        succeeded: bool,
    ) -> Self {
        Self {
            address,
            service,
            characteristic,
            succeeded,
        }
    }

    /// Returns the peripheral the write targeted.
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Returns the service UUID.
    #[must_use]
    pub fn service(&self) -> &GattUuid {
        &self.service
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn characteristic(&self) -> &GattUuid {
        &self.characteristic
    }

    /// Returns whether the remote accepted the write.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }
}

/// An `errors` record reported by the transport.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct TransportFault {
    code: Option<i64>,
    message: String,
    address: Option<Address>,
    service: Option<GattUuid>,
    characteristic: Option<GattUuid>,
    descriptor: Option<GattUuid>,
}

impl TransportFault {
    pub(crate) fn from_record(record: ErrorRecord) -> Self {
        Self {
            code: record.error_code,
            message: record.message.unwrap_or_default(),
            address: record.address,
            service: record.service_uuid,
            characteristic: record.characteristic_uuid,
            descriptor: record.descriptor_uuid,
        }
    }

    /// Returns the transport's error code, if it sent one.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the peripheral the error refers to.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// Returns the service UUID the error refers to.
    #[must_use]
    pub fn service(&self) -> Option<&GattUuid> {
        self.service.as_ref()
    }

    /// Returns the characteristic UUID the error refers to.
    #[must_use]
    pub fn characteristic(&self) -> Option<&GattUuid> {
        self.characteristic.as_ref()
    }

    /// Returns the descriptor UUID the error refers to.
    #[must_use]
    pub fn descriptor(&self) -> Option<&GattUuid> {
        self.descriptor.as_ref()
    }

    /// Renders the fault as an operation-failure reason.
    pub(crate) fn reason(&self) -> String {
        match self.code {
            Some(code) => format!("{} (code {code})", self.message),
            None => self.message.clone(),
        }
    }
}

type ConnectObserver = Box<dyn FnMut() + Send>;
type DisconnectObserver = Box<dyn FnMut(Option<&str>) + Send>;
type ErrorObserver = Box<dyn FnMut(&TransportFault) + Send>;
type NotificationObserver = Box<dyn FnMut(&Notification) + Send>;
type WriteResultObserver = Box<dyn FnMut(&WriteReport) + Send>;

/// Per-peripheral callback slots; each slot holds at most one callback.
#[derive(Default)]
pub(crate) struct Observers {
    on_connect: Option<ConnectObserver>,
    on_disconnect: Option<DisconnectObserver>,
    on_error: Option<ErrorObserver>,
    on_notification: Option<NotificationObserver>,
    on_write_result: Option<WriteResultObserver>,
}

impl Observers {
    pub(crate) fn set_connect(&mut self, observer: ConnectObserver) {
        self.on_connect = Some(observer);
    }

    pub(crate) fn set_disconnect(&mut self, observer: DisconnectObserver) {
        self.on_disconnect = Some(observer);
    }

    pub(crate) fn set_error(&mut self, observer: ErrorObserver) {
        self.on_error = Some(observer);
    }

    pub(crate) fn set_notification(&mut self, observer: NotificationObserver) {
        self.on_notification = Some(observer);
    }

    pub(crate) fn set_write_result(&mut self, observer: WriteResultObserver) {
        self.on_write_result = Some(observer);
    }

    pub(crate) fn connected(&mut self) {
        if let Some(observer) = self.on_connect.as_mut() {
            observer();
        }
    }

    pub(crate) fn disconnected(&mut self, reason: Option<&str>) {
        if let Some(observer) = self.on_disconnect.as_mut() {
            observer(reason);
        }
    }

    pub(crate) fn error(&mut self, fault: &TransportFault) {
        if let Some(observer) = self.on_error.as_mut() {
            observer(fault);
        }
    }

    pub(crate) fn notification(&mut self, notification: &Notification) {
        if let Some(observer) = self.on_notification.as_mut() {
            observer(notification);
        }
    }

    pub(crate) fn write_result(&mut self, report: &WriteReport) {
        if let Some(observer) = self.on_write_result.as_mut() {
            observer(report);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_notification", &self.on_notification.is_some())
            .field("on_write_result", &self.on_write_result.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn replacing_an_observer_drops_the_previous_one() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();

        let first = Arc::clone(&calls);
        observers.set_disconnect(Box::new(move |_| {
            first.lock().expect("lock should not be poisoned").push("first");
        }));
        let second = Arc::clone(&calls);
        observers.set_disconnect(Box::new(move |reason| {
            second
                .lock()
                .expect("lock should not be poisoned")
                .push(if reason.is_some() { "second+reason" } else { "second" });
        }));

        observers.disconnected(Some("timeout"));

        assert_eq!(
            vec!["second+reason"],
            *calls.lock().expect("lock should not be poisoned")
        );
    }

    #[test]
    fn fault_reason_includes_code_when_present() {
        let fault = TransportFault {
            code: Some(4),
            message: "gatt busy".to_string(),
            address: None,
            service: None,
            characteristic: None,
            descriptor: None,
        };
        assert_eq!("gatt busy (code 4)", fault.reason());
    }
}
