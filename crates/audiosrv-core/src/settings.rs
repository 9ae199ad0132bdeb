//! Lock-free system settings snapshot (spec.md §5)
//!
//! Master volume and mute state are written by the control thread and read
//! once per cycle by the realtime thread. Generalizes the teacher's single
//! bit-cast `AtomicU32` (the `Shared` struct in
//! `audiosrv-platform/src/cpal_backend.rs`, itself grounded on a pattern
//! from the original's shared-memory volume scaler) to a small struct
//! snapshot: a bool and an f32 can't be packed into one atomic word, so the
//! writer instead bumps a sequence counter to odd before updating the
//! fields and back to even after, and the reader retries whenever it
//! observes an odd sequence or the sequence changes out from under it
//! (a classic seqlock, with no locking primitive and no allocation on
//! either side).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// One snapshot of the settings the realtime thread reads per cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub master_volume: f32,
    /// System-level mute (hardware mute key, policy decision).
    pub muted: bool,
    /// User-level mute, tracked separately so the two can be toggled
    /// independently without clobbering each other (§9 open question:
    /// the original conflated these into one flag).
    pub user_muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            muted: false,
            user_muted: false,
        }
    }
}

impl Settings {
    /// §8 property: a muted device commits all-zero frames regardless of
    /// stream content. Either mute source dominates.
    pub fn is_silent(&self) -> bool {
        self.muted || self.user_muted
    }

    pub fn effective_volume(&self) -> f32 {
        if self.is_silent() {
            0.0
        } else {
            self.master_volume
        }
    }

    fn pack(self) -> (u32, u32) {
        let flags = (self.muted as u32) | ((self.user_muted as u32) << 1);
        (self.master_volume.to_bits(), flags)
    }

    fn unpack(volume_bits: u32, flags: u32) -> Self {
        Self {
            master_volume: f32::from_bits(volume_bits),
            muted: flags & 0x1 != 0,
            user_muted: flags & 0x2 != 0,
        }
    }
}

/// Seqlock-guarded settings snapshot shared between the control and
/// realtime threads.
pub struct SystemSettings {
    sequence: AtomicU64,
    volume_bits: AtomicU32,
    flags: AtomicU32,
}

impl SystemSettings {
    pub fn new(initial: Settings) -> Self {
        let (volume_bits, flags) = initial.pack();
        Self {
            sequence: AtomicU64::new(0),
            volume_bits: AtomicU32::new(volume_bits),
            flags: AtomicU32::new(flags),
        }
    }

    /// Control-thread-only: publish a new snapshot derived from the current
    /// one. Only one writer is ever expected; concurrent writers would race
    /// each other's read-modify-write, which the seqlock does not protect
    /// against (the single-writer invariant is what `AudioThreadEngine`
    /// holds by routing every mutation through its own handle).
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut settings = self.read();
        f(&mut settings);
        let (volume_bits, flags) = settings.pack();

        self.sequence.fetch_add(1, Ordering::AcqRel);
        self.volume_bits.store(volume_bits, Ordering::Release);
        self.flags.store(flags, Ordering::Release);
        self.sequence.fetch_add(1, Ordering::AcqRel);
    }

    /// Realtime-thread-only: read the latest published snapshot, retrying
    /// if a writer was caught mid-update.
    pub fn read(&self) -> Settings {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before % 2 != 0 {
                std::hint::spin_loop();
                continue;
            }
            let volume_bits = self.volume_bits.load(Ordering::Acquire);
            let flags = self.flags.load(Ordering::Acquire);
            let after = self.sequence.load(Ordering::Acquire);
            if before == after {
                return Settings::unpack(volume_bits, flags);
            }
        }
    }
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
