//! Per-core poll-mode packet dispatch for a software switch dataplane.
//!
//! Each dispatch core derives its roles from a static [`config::DispatchConfig`] and then polls
//! forever ([`dispatcher::CoreDispatcher`]): pacing the shared clock and statistics reports,
//! round-robining the virtual port classes, and servicing its pinned physical ports. Every
//! received burst goes through the prefetching extraction/switch [`pipeline`].
//!
//! The switching decision itself is a collaborator behind [`datapath::Datapath`]; [`loopback`]
//! provides an in-process implementation driven by a static patch table.

pub mod buffer_pool;
pub mod clock;
pub mod config;
pub mod datapath;
pub mod dispatcher;
pub mod flow;
pub mod loopback;
pub mod packet;
pub mod pipeline;
pub mod queue;
pub mod removal;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod threading;
pub mod vport;

// Re-export for easier testing
pub use config::{ConfigError, DispatchConfig};
pub use datapath::{Burst, Datapath, PacketData, StatsReporter};
pub use dispatcher::{CoreDispatcher, DispatcherBuilder, RoleAssignment};
