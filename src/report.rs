//! Console statistics reporter.
//!
//! Redraws the whole screen on every report: physical ports with their MAC address, one row per
//! named vport, switch-wide drops, ring overruns and the packet-buffer pool level.

use crate::buffer_pool::MbufPool;
use crate::datapath::StatsReporter;
use crate::stats::{MacAddressCache, StatsTable};
use crate::vport::{PhyPortId, MAX_VPORTS};
use std::io::{self, Write};
use std::sync::Arc;

const CLEAR_SCREEN: &str = "\x1b[2J";
const TOP_LEFT: &str = "\x1b[1;1H";
const RULE: &str = "=============   ============  ============  ============  ============";
const HEADER: &str = "Interface       rx_packets    rx_dropped    tx_packets    tx_dropped  ";
const SEPARATOR: &str = "-------------   ------------  ------------  ------------  ------------";

pub struct ConsoleReporter<W> {
    out: W,
    stats: Arc<StatsTable>,
    pool: Arc<MbufPool>,
    macs: MacAddressCache,
    ports: Vec<PhyPortId>,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(
        out: W,
        stats: Arc<StatsTable>,
        pool: Arc<MbufPool>,
        macs: MacAddressCache,
        ports: Vec<PhyPortId>,
    ) -> Self {
        ConsoleReporter {
            out,
            stats,
            pool,
            macs,
            ports,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write one full statistics screen.
    pub fn render(&mut self) -> io::Result<()> {
        let out = &mut self.out;
        write!(out, "{CLEAR_SCREEN}{TOP_LEFT}")?;

        writeln!(out, "Physical Ports")?;
        writeln!(out, "-----")?;
        for &port in &self.ports {
            write!(out, "Port {port}: '{}'\t", self.macs.get(port))?;
        }
        writeln!(out, "\n")?;

        writeln!(out, "\nVport Statistics\n{RULE}\n{HEADER}\n{SEPARATOR}")?;
        for vport in 0..MAX_VPORTS {
            let name = self.stats.name(vport);
            if name.is_empty() {
                continue;
            }
            let snap = self.stats.snapshot(vport);
            writeln!(
                out,
                "{:<13.13} {:>13} {:>13} {:>13} {:>13}",
                name, snap.rx_packets, snap.rx_dropped, snap.tx_packets, snap.tx_dropped
            )?;
        }
        writeln!(out, "{RULE}")?;

        writeln!(out, "\n Switch rx dropped {}", self.stats.switch_rx_dropped())?;
        writeln!(out, "\n Switch tx dropped {}", self.stats.switch_tx_dropped())?;
        writeln!(out, "\n Queue overruns    {}", self.stats.total_overruns())?;
        writeln!(out, "\n Mempool count     {:>9}", self.pool.available())?;
        writeln!(out)?;
        out.flush()
    }
}

impl<W: Write> StatsReporter for ConsoleReporter<W> {
    fn report(&mut self) {
        if let Err(err) = self.render() {
            tracing::warn!(error = %err, "failed to write statistics");
        }
    }
}
