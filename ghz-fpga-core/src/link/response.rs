use std::time::Duration;

use derive_new::new;
use getset::Getters;

use super::MacAddress;

/// A packet received by the transport.
#[derive(new, Clone, Debug, PartialEq, Eq, Getters)]
pub struct RawPacket {
    #[getset(get = "pub")]
    /// Source address.
    src: MacAddress,
    #[getset(get = "pub")]
    /// Destination address.
    dst: MacAddress,
    #[getset(get = "pub")]
    /// Payload.
    data: Vec<u8>,
}

impl RawPacket {
    /// Consumes the packet and returns its payload.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// The result of a [`Request`].
///
/// [`Request`]: super::Request
#[derive(new, Clone, Debug, Default, PartialEq, Eq, Getters)]
pub struct Response {
    #[getset(get = "pub")]
    /// Packets returned by [`Record::Read`] records, in order.
    ///
    /// [`Record::Read`]: super::Record::Read
    read: Vec<RawPacket>,
    #[getset(get = "pub")]
    /// Time spent in [`Record::WaitForTrigger`], if the request had one.
    ///
    /// [`Record::WaitForTrigger`]: super::Record::WaitForTrigger
    trigger_wait: Option<Duration>,
}

impl Response {
    /// Consumes the response and returns the read packets.
    #[must_use]
    pub fn into_read(self) -> Vec<RawPacket> {
        self.read
    }
}
