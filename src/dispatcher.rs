//! Per-core role derivation and the poll loop.
//!
//! Every dispatch core runs the same entry point. Its roles are derived once from the static
//! configuration, the collaborators each role needs are built, and then the core polls forever:
//!
//! 1. acknowledge a pending device-removal request for this core;
//! 2. clock/report role: control requests, clock refresh and report pacing, egress flushes;
//! 3. client-switching role: one round-robin iteration over the vport classes;
//! 4. pinned physical ports, in configuration order.
//!
//! The loop body never blocks and never fails. Roles are fixed for the lifetime of the core.

use crate::clock::{read_tsc, CpuFrequency, SharedClock, SHARED_CLOCK};
use crate::config::{CoreId, DispatchConfig};
use crate::datapath::{Datapath, StatsReporter};
use crate::removal::{DeviceRemovalSlots, DEVICE_REMOVAL};
use crate::scheduler::{ClassScheduler, PinnedPorts, StatsCadence};
use crate::vport::PhyPortId;

/// Roles carried by one core. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub core: CoreId,
    /// Owns the shared clock, statistics reporting and control requests.
    pub clock_and_report: bool,
    /// Round-robins the client, kernel-bridge, raw-socket and guest vports.
    pub client_switching: bool,
    /// Physical ports serviced every iteration, in configuration order.
    pub pinned_ports: Vec<PhyPortId>,
}

impl RoleAssignment {
    /// Derive the roles of `core` by scanning a validated configuration.
    pub fn for_core(core: CoreId, config: &DispatchConfig) -> Self {
        let pinned_ports = config
            .port_queue_cores
            .iter()
            .filter(|pqc| pqc.core == core)
            .map(|pqc| pqc.port)
            .collect();
        RoleAssignment {
            core,
            clock_and_report: config.vswitchd_core == core,
            client_switching: config.client_switching_core == core,
            pinned_ports,
        }
    }

    /// `true` when the core carries no role at all.
    pub fn is_idle(&self) -> bool {
        !self.clock_and_report && !self.client_switching && self.pinned_ports.is_empty()
    }
}

/// Construction options for a [`CoreDispatcher`].
///
/// Defaults to the process-wide shared clock and removal slots, a measured CPU frequency and the
/// live cycle counter as the reporting baseline.
pub struct DispatcherBuilder<'a> {
    core: CoreId,
    config: &'a DispatchConfig,
    clock: &'a SharedClock,
    removal: &'a DeviceRemovalSlots,
    frequency: Option<CpuFrequency>,
    start_tsc: Option<u64>,
}

impl<'a> DispatcherBuilder<'a> {
    pub fn new(core: CoreId, config: &'a DispatchConfig) -> Self {
        DispatcherBuilder {
            core,
            config,
            clock: &SHARED_CLOCK,
            removal: &DEVICE_REMOVAL,
            frequency: None,
            start_tsc: None,
        }
    }

    pub fn clock(mut self, clock: &'a SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn removal(mut self, removal: &'a DeviceRemovalSlots) -> Self {
        self.removal = removal;
        self
    }

    /// Use `frequency` instead of calibrating against wall time.
    pub fn frequency(mut self, frequency: CpuFrequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    /// Baseline timestamp for the first clock refresh and report.
    pub fn start_tsc(mut self, tsc: u64) -> Self {
        self.start_tsc = Some(tsc);
        self
    }

    /// Derive the roles and build the collaborators they need.
    ///
    /// On the clock/report core this calibrates the CPU frequency (one second of sleep) unless a
    /// frequency was supplied.
    pub fn build<D, R>(self, datapath: D, reporter: R) -> CoreDispatcher<'a, D, R>
    where
        D: Datapath,
        R: StatsReporter,
    {
        let roles = RoleAssignment::for_core(self.core, self.config);
        tracing::info!(
            core = roles.core,
            clock_and_report = roles.clock_and_report,
            client_switching = roles.client_switching,
            pinned_ports = ?roles.pinned_ports,
            "core roles assigned"
        );

        let cadence = roles.clock_and_report.then(|| {
            let frequency = self.frequency.unwrap_or_else(CpuFrequency::measure);
            tracing::info!(core = roles.core, mhz = frequency.mhz(), "cpu frequency");
            StatsCadence::new(
                self.clock,
                frequency,
                self.config.stats_interval_secs,
                self.start_tsc.unwrap_or_else(read_tsc),
                reporter,
            )
        });
        let classes = roles
            .client_switching
            .then(|| ClassScheduler::new(self.config));
        let pinned = PinnedPorts::new(roles.pinned_ports.clone());

        CoreDispatcher {
            roles,
            removal: self.removal,
            datapath,
            cadence,
            classes,
            pinned,
        }
    }
}

/// Poll loop of one core.
pub struct CoreDispatcher<'a, D: Datapath, R> {
    roles: RoleAssignment,
    removal: &'a DeviceRemovalSlots,
    datapath: D,
    cadence: Option<StatsCadence<'a, R>>,
    classes: Option<ClassScheduler<D::Packet>>,
    pinned: PinnedPorts<D::Packet>,
}

impl<'a, D: Datapath, R: StatsReporter> CoreDispatcher<'a, D, R> {
    pub fn roles(&self) -> &RoleAssignment {
        &self.roles
    }

    pub fn datapath(&self) -> &D {
        &self.datapath
    }

    pub fn class_scheduler(&self) -> Option<&ClassScheduler<D::Packet>> {
        self.classes.as_ref()
    }

    pub fn cadence(&self) -> Option<&StatsCadence<'a, R>> {
        self.cadence.as_ref()
    }

    /// One loop iteration using the live cycle counter.
    #[inline]
    pub fn poll_once(&mut self) {
        self.poll_with(read_tsc);
    }

    /// One loop iteration as if the cycle counter read `now_tsc`.
    #[inline]
    pub fn poll_at(&mut self, now_tsc: u64) {
        self.poll_with(|| now_tsc);
    }

    /// The counter is only read by the clock/report role.
    #[inline(always)]
    fn poll_with(&mut self, now_tsc: impl FnOnce() -> u64) {
        if self.removal.acknowledge_pending(self.roles.core as usize) {
            tracing::debug!(core = self.roles.core, "device removal acknowledged");
        }

        if let Some(cadence) = self.cadence.as_mut() {
            self.datapath.handle_control_requests();
            cadence.step_at(now_tsc());
            self.datapath.flush_clients();
            self.datapath.flush_ports();
            self.datapath.flush_vhost_devs();
        }

        if let Some(classes) = self.classes.as_mut() {
            classes.step(&mut self.datapath);
        }

        self.pinned.step(&mut self.datapath);
    }

    /// Poll forever.
    pub fn run(mut self) -> ! {
        loop {
            self.poll_once();
        }
    }
}
