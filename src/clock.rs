//! Cycle counter access, the coarse shared clock and the calibrated CPU frequency.
//!
//! The raw cycle counter changes on every read. Publishing it to shared memory on every loop
//! iteration would bounce the cache line between every core that reads it, at loop rate. The
//! [`SharedClock`] is therefore refreshed at a fixed microsecond cadence by a single writer core
//! (see [`crate::scheduler::cadence`]), and readers accept that it may lag by up to one period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Microseconds between two refreshes of the shared clock.
pub const TSC_RES_US: u64 = 1;

const US_PER_S: u64 = 1_000_000;

/// Pads and aligns a value to 128 bytes so neighbouring values never share a cache line
/// (or an adjacent-line prefetch pair).
#[repr(C, align(128))]
#[derive(Debug, Default)]
pub struct CachePadded<T> {
    pub value: T,
}

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        CachePadded { value }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn clock_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: FFI call with a valid mutable reference to a timespec.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Raw time-stamp counter read. Not serialising: ordering jitter is far below the refresh period.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn read_tsc() -> u64 {
    let lo: u32;
    let hi: u32;
    // SAFETY: rdtsc only writes eax/edx; no memory is touched.
    unsafe {
        core::arch::asm!(
            "rdtsc",
            out("eax") lo,
            out("edx") hi,
            options(nostack, nomem, preserves_flags)
        );
    }
    ((hi as u64) << 32) | (lo as u64)
}

/// Generic timer virtual count: constant rate, monotonic, readable from user space.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn read_tsc() -> u64 {
    let cnt: u64;
    // SAFETY: reading CNTVCT_EL0 has no memory side effects.
    unsafe {
        core::arch::asm!(
            "mrs {cnt}, CNTVCT_EL0",
            cnt = out(reg) cnt,
            options(nostack, nomem, preserves_flags)
        );
    }
    cnt
}

/// Other architectures count monotonic nanoseconds instead of cycles.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
pub fn read_tsc() -> u64 {
    clock_ns()
}

/// Hint the CPU to pull the first cache line of `data` into L1.
///
/// Never faults, whatever the slice points at.
#[inline(always)]
pub fn prefetch0(data: &[u8]) {
    let addr = data.as_ptr();
    #[cfg(target_arch = "x86_64")]
    // SAFETY: prefetch is a hint; it performs no architectural memory access.
    unsafe {
        core::arch::x86_64::_mm_prefetch(addr as *const i8, core::arch::x86_64::_MM_HINT_T0);
    }
    #[cfg(target_arch = "aarch64")]
    // SAFETY: prfm is a hint; it performs no architectural memory access.
    unsafe {
        core::arch::asm!("prfm pldl1keep, [{addr}]", addr = in(reg) addr, options(nostack, preserves_flags));
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = addr;
    }
}

/// Process-wide coarse timestamp in cycle-counter units.
///
/// Single writer (the clock/report core), any number of readers. The stored value never moves
/// backwards.
#[derive(Debug, Default)]
pub struct SharedClock {
    tsc: CachePadded<AtomicU64>,
}

impl SharedClock {
    pub const fn new() -> Self {
        SharedClock {
            tsc: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Last published timestamp.
    #[inline(always)]
    pub fn now(&self) -> u64 {
        self.tsc.value.load(Ordering::Acquire)
    }

    /// Publish `tsc`. A value older than the current one is ignored.
    #[inline(always)]
    pub fn publish(&self, tsc: u64) {
        self.tsc.value.fetch_max(tsc, Ordering::AcqRel);
    }
}

/// Clock shared by every dispatch core of the process.
pub static SHARED_CLOCK: SharedClock = SharedClock::new();

/// Cycle-counter ticks per second, rounded down to a whole million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CpuFrequency(u64);

impl CpuFrequency {
    /// Wrap a raw ticks-per-second figure, rounding it down to the nearest million.
    pub const fn from_hz(hz: u64) -> Self {
        CpuFrequency(hz / 1_000_000 * 1_000_000)
    }

    /// Count cycle-counter ticks across one second of wall time.
    ///
    /// Blocks the calling thread for one second. Only run before steady-state polling starts.
    pub fn measure() -> Self {
        let before = read_tsc();
        std::thread::sleep(Duration::from_secs(1));
        let after = read_tsc();
        CpuFrequency::from_hz(after.wrapping_sub(before))
    }

    pub const fn hz(self) -> u64 {
        self.0
    }

    pub const fn mhz(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Ticks between two shared-clock refreshes, rounded up so the cadence is never faster than
    /// [`TSC_RES_US`].
    pub const fn refresh_period(self) -> u64 {
        (self.0 + US_PER_S - 1) / US_PER_S * TSC_RES_US
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_rounds_down_to_millions() {
        assert_eq!(CpuFrequency::from_hz(2_999_999_999).hz(), 2_999_000_000);
        assert_eq!(CpuFrequency::from_hz(999_999).hz(), 0);
        assert_eq!(CpuFrequency::from_hz(3_400_000_000).mhz(), 3_400);
    }

    #[test]
    fn refresh_period_is_one_microsecond_of_ticks() {
        assert_eq!(CpuFrequency::from_hz(2_000_000).refresh_period(), 2);
        assert_eq!(CpuFrequency::from_hz(3_000_000_000).refresh_period(), 3_000);
        assert_eq!(CpuFrequency::from_hz(0).refresh_period(), 0);
    }

    #[test]
    fn shared_clock_never_moves_backwards() {
        let clock = SharedClock::new();
        clock.publish(10);
        clock.publish(5);
        assert_eq!(clock.now(), 10);
        clock.publish(11);
        assert_eq!(clock.now(), 11);
    }

    #[test]
    fn tsc_is_monotonic_on_one_thread() {
        let a = read_tsc();
        let b = read_tsc();
        assert!(b >= a);
    }

    #[test]
    fn prefetch_accepts_empty_slices() {
        prefetch0(&[]);
        prefetch0(&[1, 2, 3]);
    }
}
