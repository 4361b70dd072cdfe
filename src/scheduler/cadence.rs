//! Shared-clock refresh and statistics reporting pace.
//!
//! Runs on the clock/report core only. Each step:
//! 1. reads the cycle counter and, once per refresh period, publishes it to the [`SharedClock`];
//! 2. converts the shared-clock delta since the last report into seconds and, once the configured
//!    interval is reached, invokes the reporter.
//!
//! Reporting is paced on the coarse clock, so a report can be late by at most one refresh period.

use crate::clock::{read_tsc, CpuFrequency, SharedClock};
use crate::datapath::StatsReporter;

pub struct StatsCadence<'a, R> {
    clock: &'a SharedClock,
    frequency: CpuFrequency,
    refresh_period: u64,
    next_refresh: u64,
    last_report: u64,
    interval_secs: u64,
    reporter: R,
}

impl<'a, R: StatsReporter> StatsCadence<'a, R> {
    /// Create a cadence whose first refresh happens on the first step and whose first report is
    /// due `interval_secs` after `start_tsc`.
    ///
    /// # Arguments
    /// * `clock` - clock this core publishes to (it must be its only writer)
    /// * `frequency` - calibrated cycle-counter frequency
    /// * `interval_secs` - seconds between reports, zero disables reporting
    /// * `start_tsc` - baseline for the first report
    pub fn new(
        clock: &'a SharedClock,
        frequency: CpuFrequency,
        interval_secs: u64,
        start_tsc: u64,
        reporter: R,
    ) -> Self {
        clock.publish(start_tsc);
        StatsCadence {
            clock,
            frequency,
            refresh_period: frequency.refresh_period(),
            next_refresh: start_tsc,
            last_report: clock.now(),
            interval_secs,
            reporter,
        }
    }

    pub fn frequency(&self) -> CpuFrequency {
        self.frequency
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// One step using the live cycle counter.
    #[inline(always)]
    pub fn step(&mut self) {
        self.step_at(read_tsc());
    }

    /// One step as if the cycle counter read `now_tsc`.
    #[inline]
    pub fn step_at(&mut self, now_tsc: u64) {
        if now_tsc >= self.next_refresh {
            self.clock.publish(now_tsc);
            self.next_refresh = now_tsc.saturating_add(self.refresh_period);
        }

        let hz = self.frequency.hz();
        if self.interval_secs == 0 || hz == 0 {
            return;
        }
        let now = self.clock.now();
        let elapsed_secs = now.saturating_sub(self.last_report) / hz;
        if elapsed_secs >= self.interval_secs {
            self.reporter.report();
            self.last_report = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Count(u32);

    impl StatsReporter for Count {
        fn report(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn reports_once_the_interval_elapses() {
        let clock = SharedClock::new();
        let mut cadence =
            StatsCadence::new(&clock, CpuFrequency::from_hz(2_000_000), 2, 0, Count::default());

        cadence.step_at(1_999_999);
        assert_eq!(cadence.reporter().0, 0);
        cadence.step_at(3_999_999);
        assert_eq!(cadence.reporter().0, 0);
        cadence.step_at(4_000_000);
        assert_eq!(cadence.reporter().0, 1);
        cadence.step_at(4_000_002);
        assert_eq!(cadence.reporter().0, 1);
        cadence.step_at(8_000_000);
        assert_eq!(cadence.reporter().0, 2);
    }

    #[test]
    fn zero_interval_never_reports() {
        let clock = SharedClock::new();
        let mut cadence =
            StatsCadence::new(&clock, CpuFrequency::from_hz(2_000_000), 0, 0, Count::default());
        for t in (0..100).map(|i| i * 1_000_000_000) {
            cadence.step_at(t);
        }
        assert_eq!(cadence.reporter().0, 0);
    }

    #[test]
    fn clock_refresh_is_rate_limited() {
        let clock = SharedClock::new();
        let mut cadence =
            StatsCadence::new(&clock, CpuFrequency::from_hz(3_000_000), 1, 100, Count::default());
        assert_eq!(clock.now(), 100);

        cadence.step_at(101);
        assert_eq!(clock.now(), 101);
        // Next refresh is due at 101 + 3.
        cadence.step_at(103);
        assert_eq!(clock.now(), 101);
        cadence.step_at(104);
        assert_eq!(clock.now(), 104);
    }

    #[test]
    fn shared_clock_is_non_decreasing_across_steps() {
        let clock = SharedClock::new();
        let mut cadence =
            StatsCadence::new(&clock, CpuFrequency::from_hz(1_000_000), 0, 50, Count::default());
        let mut last = clock.now();
        for t in [60, 55, 70, 10, 71, 200] {
            cadence.step_at(t);
            assert!(clock.now() >= last);
            last = clock.now();
        }
    }

    #[test]
    fn zero_frequency_never_reports() {
        let clock = SharedClock::new();
        let mut cadence =
            StatsCadence::new(&clock, CpuFrequency::from_hz(0), 1, 0, Count::default());
        for t in (1..100).map(|i| i * 1_000_000_000) {
            cadence.step_at(t);
            assert_eq!(clock.now(), t);
        }
        assert_eq!(cadence.reporter().0, 0);
    }

    #[test]
    fn refresh_deadline_saturates_at_counter_end() {
        let clock = SharedClock::new();
        let mut cadence =
            StatsCadence::new(&clock, CpuFrequency::from_hz(3_000_000), 0, 0, Count::default());
        cadence.step_at(u64::MAX - 1);
        assert_eq!(clock.now(), u64::MAX - 1);
        cadence.step_at(u64::MAX);
        assert_eq!(clock.now(), u64::MAX);
        cadence.step_at(u64::MAX);
        assert_eq!(clock.now(), u64::MAX);
    }
}
