use serde::Serialize;

/// Connection lifecycle of one remote peripheral.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Seen by scanning or named by `direct_connect`, never linked.
    #[display("discovered")]
    Discovered,
    #[display("connecting")]
    Connecting,
    #[display("connected")]
    Connected,
    #[display("disconnecting")]
    Disconnecting,
    #[display("disconnected")]
    Disconnected,
}

impl ConnectionState {
    /// Returns whether a link is up or being brought up or down.
    #[must_use]
    pub fn has_link(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Disconnecting
        )
    }
}
