//! Stable identifiers for streams, clients, and devices
//!
//! Grounded on `cras_types.h`'s `cras_stream_id_t` packing scheme (the top
//! 16 bits of a stream id are the client id, the bottom 16 are a per-client
//! sequence number) and on the Design Notes' redesign of the process-wide
//! registry: cross-references between objects (a `dev_stream`'s stream, a
//! device's index) are resolved ids, not raw pointers.

use std::fmt;

/// Identifies a connected client. The upper half of a [`StreamId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u16);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

/// Identifies one stream, unique process-wide. Packs a [`ClientId`] into
/// the upper 16 bits and a per-client sequence number into the lower 16,
/// matching `cras_get_stream_id`/`cras_valid_stream_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u32);

impl StreamId {
    /// Pack a client id and a per-client sequence number into one id.
    pub fn new(client_id: ClientId, sequence: u16) -> Self {
        Self(((client_id.0 as u32) << 16) | sequence as u32)
    }

    pub fn client_id(self) -> ClientId {
        ClientId((self.0 >> 16) as u16)
    }

    pub fn sequence(self) -> u16 {
        (self.0 & 0x0000_ffff) as u16
    }

    /// Whether this id's client half matches `client_id`, mirroring
    /// `cras_valid_stream_id`.
    pub fn belongs_to(self, client_id: ClientId) -> bool {
        self.client_id() == client_id
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{}.{}", self.client_id().0, self.sequence())
    }
}

/// Stable index identifying one device in the device registry. Devices are
/// never renumbered across their lifetime; a closed and reopened device
/// keeps its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIndex(pub u32);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev:{}", self.0)
    }
}
