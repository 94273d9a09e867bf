//! Message-bus and network seams.
//!
//! The bridge never owns a transport. Platforms implement [`MessageBus`] over
//! whatever publish/subscribe client they have and [`NetworkInfo`] over their
//! network stack.

use crate::status::Payload;

/// Last-will registration sent with every connect.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a str,
    pub retained: bool,
}

/// Publish/subscribe client used by the bridge loop.
pub trait MessageBus {
    type Error;

    fn is_connected(&self) -> bool;

    /// Starts a session as `client`, registering `will`.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the broker cannot be reached.
    fn connect(&mut self, client: &str, will: LastWill<'_>) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns the transport error when the subscription is not accepted.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns the transport error when the message cannot be queued.
    fn publish(
        &mut self,
        topic: &str,
        payload: &Payload<'_>,
        retained: bool,
    ) -> Result<(), Self::Error>;
}

/// Read-only view of the platform's network interface.
pub trait NetworkInfo {
    fn hostname(&self) -> &str;
    fn ip_address(&self) -> &str;
    fn rssi(&self) -> i32;
    fn ssid(&self) -> &str;
    fn mac_address(&self) -> &str;
}
