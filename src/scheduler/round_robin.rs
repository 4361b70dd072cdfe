//! Port-class round-robin scheduler.
//!
//! Algorithm, once per loop iteration:
//! 1. Client class (always): receive one burst from the vport under the client cursor, switch
//!    it, advance the cursor.
//! 2. Kernel-bridge, raw-socket and guest-transport classes, in that order, only when the class
//!    has at least one configured port: same as above with that class's cursor.
//! 3. Flush client, port and guest egress.
//!
//! Exactly one port per class is serviced per iteration, so any single port delays the others by
//! at most one receive-and-switch of a bounded burst, however many ports a class holds.

use crate::config::DispatchConfig;
use crate::datapath::{Burst, Datapath};
use crate::pipeline::switch_burst;
use crate::vport::{PortClass, PortClassTable, VportId, CLIENT1};

/// Persistent per-class position of the round-robin walk.
///
/// Walks `[first, base + count)` and wraps back to `first`. For every class except
/// [`PortClass::Client`], `first == base`; the client cursor starts at [`CLIENT1`] because client 0
/// is the switch-internal queue and is never serviced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobinCursor {
    first: VportId,
    end: VportId,
    current: VportId,
}

impl RoundRobinCursor {
    /// Cursor over the first `count` vports of `class`.
    ///
    /// Returns `None` when the class has nothing to service (no configured port, or for the
    /// client class nothing beyond the reserved client 0).
    pub fn new(class: PortClass, count: u32) -> Option<Self> {
        let count = count.min(class.capacity());
        let first = match class {
            PortClass::Client => CLIENT1,
            _ => class.base(),
        };
        let end = class.base() + count;
        if first >= end {
            return None;
        }
        Some(RoundRobinCursor {
            first,
            end,
            current: first,
        })
    }

    /// Vport serviced by the next call.
    #[inline(always)]
    pub fn current(&self) -> VportId {
        self.current
    }

    /// Step to the next vport, wrapping to the first serviceable one.
    #[inline(always)]
    pub fn advance(&mut self) {
        self.current += 1;
        if self.current == self.end {
            self.current = self.first;
        }
    }
}

/// Round-robin scheduler owned by the client-switching core.
pub struct ClassScheduler<P> {
    cursors: PortClassTable<Option<RoundRobinCursor>>,
    burst: Burst<P>,
}

impl<P> ClassScheduler<P> {
    /// Build the cursors from the configured class sizes.
    pub fn new(config: &DispatchConfig) -> Self {
        let cursors = PortClassTable::from_fn(|class| match class {
            PortClass::Physical => None,
            _ => RoundRobinCursor::new(class, config.class_count(class)),
        });
        ClassScheduler {
            cursors,
            burst: Burst::new(),
        }
    }

    /// Cursor of `class`, `None` for classes that are never serviced.
    pub fn cursor(&self, class: PortClass) -> Option<&RoundRobinCursor> {
        self.cursors[class].as_ref()
    }

    /// Run one iteration against `datapath`.
    #[inline]
    pub fn step<D>(&mut self, datapath: &mut D)
    where
        D: Datapath<Packet = P>,
    {
        for class in PortClass::ROUND_ROBIN {
            let Some(cursor) = self.cursors[class].as_mut() else {
                continue;
            };
            let vport = cursor.current();
            datapath.receive_from_vport(vport, &mut self.burst);
            switch_burst(datapath, vport, &mut self.burst);
            cursor.advance();
        }

        datapath.flush_clients();
        datapath.flush_ports();
        datapath.flush_vhost_devs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vport::{KNI0, VETH0, VHOST0};

    #[test]
    fn client_cursor_skips_reserved_client() {
        let mut cursor = RoundRobinCursor::new(PortClass::Client, 4).unwrap();
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(cursor.current());
            cursor.advance();
        }
        assert_eq!(seen, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn client_cursor_returns_to_one_after_count_minus_one_advances() {
        for count in 2..=16 {
            let mut cursor = RoundRobinCursor::new(PortClass::Client, count).unwrap();
            for _ in 0..count - 1 {
                assert_ne!(cursor.current(), 0);
                cursor.advance();
            }
            assert_eq!(cursor.current(), CLIENT1, "count {count}");
        }
    }

    #[test]
    fn other_classes_wrap_to_their_base() {
        let mut cursor = RoundRobinCursor::new(PortClass::RawSocket, 2).unwrap();
        assert_eq!(cursor.current(), VETH0);
        cursor.advance();
        assert_eq!(cursor.current(), VETH0 + 1);
        cursor.advance();
        assert_eq!(cursor.current(), VETH0);

        let mut single = RoundRobinCursor::new(PortClass::KernelBridge, 1).unwrap();
        single.advance();
        assert_eq!(single.current(), KNI0);
    }

    #[test]
    fn empty_classes_have_no_cursor() {
        assert!(RoundRobinCursor::new(PortClass::GuestTransport, 0).is_none());
        assert!(RoundRobinCursor::new(PortClass::Client, 1).is_none());
        assert_eq!(
            RoundRobinCursor::new(PortClass::GuestTransport, 1).map(|c| c.current()),
            Some(VHOST0)
        );
    }

    #[test]
    fn scheduler_builds_cursors_from_config() {
        let config = DispatchConfig {
            num_clients: 3,
            num_vhost: 2,
            ..DispatchConfig::default()
        };
        let scheduler: ClassScheduler<()> = ClassScheduler::new(&config);
        assert_eq!(scheduler.cursor(PortClass::Client).map(|c| c.current()), Some(CLIENT1));
        assert!(scheduler.cursor(PortClass::Physical).is_none());
        assert!(scheduler.cursor(PortClass::KernelBridge).is_none());
        assert!(scheduler.cursor(PortClass::RawSocket).is_none());
        assert_eq!(
            scheduler.cursor(PortClass::GuestTransport).map(|c| c.current()),
            Some(VHOST0)
        );
    }
}
