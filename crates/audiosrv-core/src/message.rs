//! Control -> realtime message bus (spec.md §4.11, §5)
//!
//! Every mutation that crosses from the control thread to the realtime
//! thread travels as a typed `Command` over a bounded `crossbeam_channel`,
//! matching the teacher's `bounded::<Command>(32)` / `unbounded::<Event>()`
//! split. Commands whose sender must block for an acknowledgement carry
//! their own one-shot reply sender in place of the spec's "reply fd" — the
//! realtime thread answers directly on it instead of the control thread
//! polling a second fd.
//!
//! The realtime thread drains this queue at the top of every cycle (§4.11);
//! `Event`s flow the other way, informational only, and are never waited on
//! by the realtime thread.

use crossbeam_channel::Sender;

use crate::device::DeviceState;
use crate::format::Direction;
use crate::ids::{DeviceIndex, StreamId};
use crate::stream::Stream;

/// Result of a blocking command, carried back over its reply channel.
pub type Ack = Result<(), String>;

/// Commands sent from the control thread to the realtime thread (§4.11).
pub enum Command {
    /// `ADD_STREAM(stream_ref, device_list)`: attach `stream` to every
    /// device in `devices`. The realtime thread computes each attachment's
    /// join offset (§4.9) before the stream can be observed as "owed data".
    AddStream {
        stream: Stream,
        devices: Vec<DeviceIndex>,
        reply: Sender<Ack>,
    },

    /// `REMOVE_STREAM(stream_ref)`: detach from every device and drop. Per
    /// §5, the realtime thread finishes the stream's current sub-block
    /// before acking — no partial data is delivered after the ack.
    RemoveStream {
        stream_id: StreamId,
        reply: Sender<Ack>,
    },

    /// `ADD_DEV(device_ref)`: open a freshly constructed device and start
    /// cycling it. Replies with the index the realtime thread assigned.
    AddDevice {
        backend: Box<dyn audiosrv_platform::IoDevBackend>,
        direction: Direction,
        format: audiosrv_platform::DeviceFormat,
        reply: Sender<Result<DeviceIndex, String>>,
    },

    /// `REMOVE_DEV(device_ref)`.
    RemoveDevice {
        device: DeviceIndex,
        reply: Sender<Ack>,
    },

    /// `SWITCH_PROFILE(device_ref, enable_dev)`: a device changing its
    /// underlying transport while open (e.g. a Bluetooth profile change).
    /// Appears to attached streams as a brief suspend-then-resume (§5): the
    /// realtime thread closes the device, acks, and reopens it.
    SwitchProfile {
        device: DeviceIndex,
        enable_dev: bool,
        reply: Sender<Ack>,
    },

    /// Control-thread response to a [`Event::ResetRequested`] (§4.7 step 3):
    /// close and reopen `device` at its last negotiated format, preserving
    /// its attached `dev_stream`s (they live in the device's own list, which
    /// neither `close` nor `open` touches).
    ResetDevice {
        device: DeviceIndex,
        reply: Sender<Ack>,
    },

    /// `SCHEDULE_SUSPEND(device_ref, delay_ms)`: arm a deferred removal,
    /// serviced once per cycle rather than by a separate timer thread.
    ScheduleSuspend { device: DeviceIndex, delay_ms: u32 },

    /// `CANCEL_SUSPEND(device_ref)`.
    CancelSuspend { device: DeviceIndex },

    /// `DUMP_DEBUG(buffer_ref)`: the reply carries the rendered dump rather
    /// than writing through a caller-supplied buffer.
    DumpDebug { reply: Sender<String> },

    /// Stop the realtime loop cleanly. Not part of spec §4.11's mutation
    /// set, but needed so the daemon has a way to join the thread on exit.
    Shutdown,
}

/// Events sent from the realtime thread to the control thread. Informational
/// only — per §7 the realtime thread never propagates an error upward, it
/// logs, recovers, and/or posts one of these so the control thread can turn
/// it into an observable effect (close/open, client notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A device's state-machine transition (open/close/profile switch,
    /// NORMAL_RUN <-> NO_STREAM_RUN).
    DeviceStateChanged {
        device: DeviceIndex,
        state: DeviceState,
    },

    /// §4.7 step 3: a severe underrun was observed. The control thread
    /// should close and reopen the device, preserving stream attachments.
    ResetRequested { device: DeviceIndex },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClientId;

    #[test]
    fn ack_type_carries_reason_on_rejection() {
        let ack: Ack = Err("unknown device".to_string());
        assert!(ack.is_err());
    }

    #[test]
    fn events_are_copy_for_cheap_forwarding() {
        let event = Event::ResetRequested {
            device: DeviceIndex(0),
        };
        let copied = event;
        assert_eq!(event, copied);
    }

    #[test]
    fn remove_stream_command_carries_the_target_id() {
        let (reply, _rx) = crossbeam_channel::bounded(1);
        let command = Command::RemoveStream {
            stream_id: StreamId::new(ClientId(1), 0),
            reply,
        };
        match command {
            Command::RemoveStream { stream_id, .. } => {
                assert_eq!(stream_id.client_id(), ClientId(1));
            }
            _ => panic!("wrong variant"),
        }
    }
}
