//! Per-iteration work units combined by the dispatch loop.
//!
//! * [`round_robin`]: one port per round-robin class per iteration, then egress flushes.
//! * [`pinned`]: the physical ports statically assigned to a core, every iteration.
//! * [`cadence`]: shared-clock refresh and statistics reporting pace.

pub mod cadence;
pub mod pinned;
pub mod round_robin;

pub use cadence::StatsCadence;
pub use pinned::PinnedPorts;
pub use round_robin::{ClassScheduler, RoundRobinCursor};
