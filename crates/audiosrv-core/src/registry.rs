//! Single-owner registries for streams and devices (spec.md §3, §5)
//!
//! Design Notes' "process-wide registry with intrusive cross-references ->
//! single-owner container keyed by a stable id" redesign: what the original
//! tracks as linked lists threaded through the objects themselves becomes
//! two plain keyed containers here. Per §5 the realtime thread is whichever
//! side currently owns both — [`crate::engine::AudioThreadEngine`] builds
//! them empty and moves them into the spawned thread, the same way the
//! teacher's `AudioEngine` moves its state into `audio_thread_main`. After
//! that handoff all mutation arrives as a [`crate::message::Command`]; nothing
//! outside the realtime thread ever touches either registry directly again.

use std::collections::HashMap;

use crate::device::IoDev;
use crate::ids::{ClientId, DeviceIndex, StreamId};
use crate::stream::Stream;

/// Exclusive owner of every live [`Stream`], keyed by its id.
#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<StreamId, Stream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stream: Stream) {
        self.streams.insert(stream.id(), stream);
    }

    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        self.streams.remove(&id)
    }

    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    /// Every stream belonging to one client, for teardown on disconnect
    /// (§3 invariant: a client's streams never outlive its connection).
    pub fn ids_for_client(&self, client_id: ClientId) -> Vec<StreamId> {
        self.streams
            .keys()
            .copied()
            .filter(|id| id.belongs_to(client_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Exclusive owner of every live [`IoDev`], keyed by a stable index that is
/// never reused for the lifetime of the registry.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceIndex, IoDev>,
    next_index: u32,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh index and insert the device `build` constructs for
    /// it. Indices are never reused, so a stale [`DeviceIndex`] a client
    /// still holds after removal is reliably "unknown device" rather than
    /// silently referring to whatever was inserted next.
    pub fn insert(&mut self, build: impl FnOnce(DeviceIndex) -> IoDev) -> DeviceIndex {
        let index = DeviceIndex(self.next_index);
        self.next_index += 1;
        self.devices.insert(index, build(index));
        index
    }

    pub fn remove(&mut self, index: DeviceIndex) -> Option<IoDev> {
        self.devices.remove(&index)
    }

    pub fn get_mut(&mut self, index: DeviceIndex) -> Option<&mut IoDev> {
        self.devices.get_mut(&index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&DeviceIndex, &mut IoDev)> {
        self.devices.iter_mut()
    }

    pub fn indices(&self) -> Vec<DeviceIndex> {
        self.devices.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
