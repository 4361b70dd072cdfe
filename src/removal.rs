//! Per-core handshake that lets the control plane unmap a guest device's memory safely.
//!
//! Protocol, per core:
//! 1. The control actor detaches the device from the switch, then moves the owning core's slot
//!    `Idle -> RemovalRequested`.
//! 2. The owning core checks its slot at the top of every loop iteration. Seeing a request, it
//!    moves the slot `RemovalRequested -> RemovalAcknowledged`. At that point the core has
//!    finished the previous iteration and holds no reference into the device.
//! 3. The control actor observes the acknowledgment, unmaps the memory and resets the slot to
//!    `Idle`.
//!
//! Every slot has exactly one external writer and one owning core, so plain atomics with
//! acquire/release ordering are enough. No lock is ever taken.

use crate::clock::CachePadded;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on execution core ids.
pub const MAX_CORES: usize = 128;

/// State of one core's removal slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RemovalState {
    Idle = 0,
    RemovalRequested = 1,
    RemovalAcknowledged = 2,
}

impl RemovalState {
    fn from_raw(raw: u8) -> RemovalState {
        match raw {
            1 => RemovalState::RemovalRequested,
            2 => RemovalState::RemovalAcknowledged,
            _ => RemovalState::Idle,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemovalError {
    #[error("core {0} has no device-removal slot")]
    UnknownCore(usize),
    #[error("core {core} is busy with another removal ({state:?})")]
    Busy { core: usize, state: RemovalState },
    #[error("core {core} did not acknowledge device removal within {timeout:?}")]
    Timeout { core: usize, timeout: Duration },
}

const IDLE_SLOT: CachePadded<AtomicU8> = CachePadded::new(AtomicU8::new(RemovalState::Idle as u8));

/// One removal slot per execution core, each on its own cache line.
pub struct DeviceRemovalSlots {
    slots: [CachePadded<AtomicU8>; MAX_CORES],
}

impl DeviceRemovalSlots {
    pub const fn new() -> Self {
        DeviceRemovalSlots {
            slots: [IDLE_SLOT; MAX_CORES],
        }
    }

    fn slot(&self, core: usize) -> Result<&AtomicU8, RemovalError> {
        self.slots
            .get(core)
            .map(|slot| &slot.value)
            .ok_or(RemovalError::UnknownCore(core))
    }

    /// Current state of `core`'s slot.
    pub fn state(&self, core: usize) -> Result<RemovalState, RemovalError> {
        Ok(RemovalState::from_raw(self.slot(core)?.load(Ordering::Acquire)))
    }

    /// Hot-path check run by the owning core at the top of each iteration.
    ///
    /// Returns `true` when a pending request was acknowledged by this call. Out-of-range cores
    /// have nothing to acknowledge.
    #[inline(always)]
    pub fn acknowledge_pending(&self, core: usize) -> bool {
        let Some(slot) = self.slots.get(core) else {
            return false;
        };
        if slot.value.load(Ordering::Acquire) != RemovalState::RemovalRequested as u8 {
            return false;
        }
        // Release: every access the core made to device memory happens-before the ack.
        slot.value
            .compare_exchange(
                RemovalState::RemovalRequested as u8,
                RemovalState::RemovalAcknowledged as u8,
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Control side: ask `core` to confirm it no longer touches the device being removed.
    pub fn request(&self, core: usize) -> Result<(), RemovalError> {
        self.slot(core)?
            .compare_exchange(
                RemovalState::Idle as u8,
                RemovalState::RemovalRequested as u8,
                Ordering::Release,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|raw| RemovalError::Busy {
                core,
                state: RemovalState::from_raw(raw),
            })
    }

    /// Control side: `true` once `core` acknowledged the outstanding request.
    pub fn is_acknowledged(&self, core: usize) -> Result<bool, RemovalError> {
        Ok(self.state(core)? == RemovalState::RemovalAcknowledged)
    }

    /// Control side: spin until `core` acknowledges, yielding the CPU between checks.
    pub fn wait_for_ack(&self, core: usize, timeout: Duration) -> Result<(), RemovalError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_acknowledged(core)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RemovalError::Timeout { core, timeout });
            }
            std::thread::yield_now();
        }
    }

    /// Control side: return an acknowledged slot to `Idle` once the device memory is gone.
    ///
    /// A slot that is not acknowledged is left untouched and reported as busy.
    pub fn reset(&self, core: usize) -> Result<(), RemovalError> {
        self.slot(core)?
            .compare_exchange(
                RemovalState::RemovalAcknowledged as u8,
                RemovalState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|raw| RemovalError::Busy {
                core,
                state: RemovalState::from_raw(raw),
            })
    }
}

impl Default for DeviceRemovalSlots {
    fn default() -> Self {
        Self::new()
    }
}

/// Removal slots shared by every dispatch core of the process.
pub static DEVICE_REMOVAL: DeviceRemovalSlots = DeviceRemovalSlots::new();

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn full_handshake() {
        let slots = DeviceRemovalSlots::new();
        assert_eq!(slots.state(3), Ok(RemovalState::Idle));
        assert!(!slots.acknowledge_pending(3));

        slots.request(3).unwrap();
        assert_eq!(slots.state(3), Ok(RemovalState::RemovalRequested));
        assert!(slots.acknowledge_pending(3));
        assert!(!slots.acknowledge_pending(3));
        assert_eq!(slots.is_acknowledged(3), Ok(true));

        slots.reset(3).unwrap();
        assert_eq!(slots.state(3), Ok(RemovalState::Idle));
    }

    #[test]
    fn other_cores_are_untouched() {
        let slots = DeviceRemovalSlots::new();
        slots.request(5).unwrap();
        assert!(!slots.acknowledge_pending(4));
        assert!(!slots.acknowledge_pending(6));
        assert_eq!(slots.state(4), Ok(RemovalState::Idle));
        assert_eq!(slots.state(5), Ok(RemovalState::RemovalRequested));
    }

    #[test]
    fn request_while_busy_is_rejected() {
        let slots = DeviceRemovalSlots::new();
        slots.request(1).unwrap();
        assert_eq!(
            slots.request(1),
            Err(RemovalError::Busy {
                core: 1,
                state: RemovalState::RemovalRequested
            })
        );
        assert!(slots.reset(1).is_err());
    }

    #[test]
    fn unknown_core_is_an_error() {
        let slots = DeviceRemovalSlots::new();
        assert_eq!(slots.request(MAX_CORES), Err(RemovalError::UnknownCore(MAX_CORES)));
        assert!(!slots.acknowledge_pending(MAX_CORES));
    }

    #[test]
    fn wait_times_out_without_owner() {
        let slots = DeviceRemovalSlots::new();
        slots.request(2).unwrap();
        let err = slots.wait_for_ack(2, Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, RemovalError::Timeout { core: 2, .. }));
    }

    #[test]
    fn wait_sees_ack_from_owner_thread() {
        let slots = Arc::new(DeviceRemovalSlots::new());
        slots.request(7).unwrap();
        let owner = {
            let slots = slots.clone();
            std::thread::spawn(move || while !slots.acknowledge_pending(7) {
                std::hint::spin_loop();
            })
        };
        slots.wait_for_ack(7, Duration::from_secs(5)).unwrap();
        owner.join().unwrap();
        slots.reset(7).unwrap();
    }
}
