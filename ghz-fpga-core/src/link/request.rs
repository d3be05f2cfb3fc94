use std::time::Duration;

use super::{ContextId, MacAddress};

/// A single command executed by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    /// Binds the context to an ethernet adapter.
    Connect(u32),
    /// Sets the destination of subsequent writes.
    DestinationMac(MacAddress),
    /// Only accepts packets coming from this address.
    RequireSourceMac(MacAddress),
    /// Only accepts packets with this payload length.
    RequireLength(usize),
    /// Sets the timeout of subsequent collect and read records.
    Timeout(Duration),
    /// Starts buffering incoming packets.
    Listen,
    /// Writes a raw packet.
    Write(Vec<u8>),
    /// Waits until this many packets are buffered, without consuming them.
    Collect(usize),
    /// Consumes and returns this many buffered packets.
    Read(usize),
    /// Consumes and drops this many buffered packets.
    Discard(usize),
    /// Sends one trigger into the given context.
    SendTrigger(ContextId),
    /// Waits until this many triggers have been received, then consumes them.
    WaitForTrigger(u32),
    /// Drops every buffered packet.
    Clear,
}

/// An ordered list of [`Record`]s sent to one transport context.
///
/// Records are executed in order. If one fails, the rest of the request is not executed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    records: Vec<Record>,
}

impl Request {
    /// Creates an empty request.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a [`Record::Connect`].
    #[must_use]
    pub fn connect(self, port: u32) -> Self {
        self.push(Record::Connect(port))
    }

    /// Appends a [`Record::DestinationMac`].
    #[must_use]
    pub fn destination_mac(self, mac: MacAddress) -> Self {
        self.push(Record::DestinationMac(mac))
    }

    /// Appends a [`Record::RequireSourceMac`].
    #[must_use]
    pub fn require_source_mac(self, mac: MacAddress) -> Self {
        self.push(Record::RequireSourceMac(mac))
    }

    /// Appends a [`Record::RequireLength`].
    #[must_use]
    pub fn require_length(self, len: usize) -> Self {
        self.push(Record::RequireLength(len))
    }

    /// Appends a [`Record::Timeout`].
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        self.push(Record::Timeout(timeout))
    }

    /// Appends a [`Record::Listen`].
    #[must_use]
    pub fn listen(self) -> Self {
        self.push(Record::Listen)
    }

    /// Appends a [`Record::Write`].
    #[must_use]
    pub fn write(self, data: impl Into<Vec<u8>>) -> Self {
        self.push(Record::Write(data.into()))
    }

    /// Appends a [`Record::Collect`].
    #[must_use]
    pub fn collect(self, n: usize) -> Self {
        self.push(Record::Collect(n))
    }

    /// Appends a [`Record::Read`].
    #[must_use]
    pub fn read(self, n: usize) -> Self {
        self.push(Record::Read(n))
    }

    /// Appends a [`Record::Discard`].
    #[must_use]
    pub fn discard(self, n: usize) -> Self {
        self.push(Record::Discard(n))
    }

    /// Appends a [`Record::SendTrigger`].
    #[must_use]
    pub fn send_trigger(self, ctx: ContextId) -> Self {
        self.push(Record::SendTrigger(ctx))
    }

    /// Appends a [`Record::WaitForTrigger`].
    #[must_use]
    pub fn wait_for_trigger(self, n: u32) -> Self {
        self.push(Record::WaitForTrigger(n))
    }

    /// Appends a [`Record::Clear`].
    #[must_use]
    pub fn clear(self) -> Self {
        self.push(Record::Clear)
    }

    /// Appends all records of `other`.
    #[must_use]
    pub fn chain(mut self, other: Request) -> Self {
        self.records.extend(other.records);
        self
    }

    /// Appends a record.
    #[must_use]
    pub fn push(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    /// Returns the records.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns `true` if the request has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the payloads of the [`Record::Write`] records.
    pub fn writes(&self) -> impl Iterator<Item = &[u8]> {
        self.records.iter().filter_map(|r| match r {
            Record::Write(data) => Some(data.as_slice()),
            _ => None,
        })
    }
}

impl IntoIterator for Request {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
