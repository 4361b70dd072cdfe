// Dispatch binary - runs one pinned poll loop per configured core over the loopback datapath.
//
// The binary loads the dispatch configuration, starts one thread per distinct core named in it,
// and keeps running until Ctrl+C is received or a dispatch thread dies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vswitch_dispatch::buffer_pool::{MbufPool, DEFAULT_POOL_SIZE};
use vswitch_dispatch::config::CoreId;
use vswitch_dispatch::loopback::LoopbackSwitch;
use vswitch_dispatch::report::ConsoleReporter;
use vswitch_dispatch::stats::MacAddressCache;
use vswitch_dispatch::threading::spawn_core_thread;
use vswitch_dispatch::{DispatchConfig, DispatcherBuilder};

/// Command-line options parsed from program arguments.
#[derive(Debug, Default)]
struct CliOptions {
    /// JSON configuration file; defaults are used without one.
    config: Option<PathBuf>,
    /// Overrides the configured statistics interval (seconds, 0 disables).
    stats_interval_secs: Option<u64>,
}

/// Parse command-line arguments into `CliOptions`.
///
/// Supports `--key=value` and `--key value` for:
/// - `--config <path>`: configuration file
/// - `--stats <secs>`: statistics interval override
///
/// Unknown arguments are ignored.
fn parse_cli_options(args: impl IntoIterator<Item = String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        match key.as_str() {
            "--config" => {
                let value = value
                    .or_else(|| args.next())
                    .ok_or("--config requires a path")?;
                options.config = Some(PathBuf::from(value));
            }
            "--stats" => {
                let value = value
                    .or_else(|| args.next())
                    .ok_or("--stats requires a number of seconds")?;
                let secs = value
                    .parse()
                    .map_err(|_| format!("invalid --stats value '{value}'"))?;
                options.stats_interval_secs = Some(secs);
            }
            _ => {}
        }
    }
    Ok(options)
}

fn load_config(options: &CliOptions) -> Result<DispatchConfig, Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => DispatchConfig::load(path)?,
        None => DispatchConfig::default(),
    };
    if let Some(secs) = options.stats_interval_secs {
        config.stats_interval_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

/// Build this core's dispatcher and poll forever.
fn run_core(core: CoreId, config: &DispatchConfig, switch: &Arc<LoopbackSwitch>) -> ! {
    let reporter = ConsoleReporter::new(
        std::io::stdout(),
        Arc::clone(switch.stats()),
        Arc::clone(switch.pool()),
        MacAddressCache::new(LoopbackSwitch::mac_address),
        config.physical_ports(),
    );
    DispatcherBuilder::new(core, config)
        .build(switch.datapath(), reporter)
        .run()
}

/// Main entry point for the dispatch binary.
///
/// This function:
/// 1. Installs the tracing subscriber (`RUST_LOG`, default `info`)
/// 2. Loads and validates the configuration
/// 3. Builds the shared loopback switch and its packet-buffer pool
/// 4. Spawns one pinned dispatch thread per distinct configured core
/// 5. Waits for Ctrl+C (exit 0) or a dead dispatch thread (exit 1)
///
/// # Example Usage
/// ```bash
/// cargo run --release -- --config dispatch.json --stats 2
/// ```
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_cli_options(std::env::args().skip(1))?;
    let config = Arc::new(load_config(&options)?);

    tracing::info!(
        vswitchd_core = config.vswitchd_core,
        client_switching_core = config.client_switching_core,
        "configuration loaded"
    );
    for pqc in &config.port_queue_cores {
        tracing::info!(port = pqc.port, queue = pqc.queue, core = pqc.core, "port/queue/core");
    }
    tracing::info!(count = config.port_queue_cores.len(), "port/queue/core triples");

    let pool = MbufPool::new(DEFAULT_POOL_SIZE);
    let switch = LoopbackSwitch::new(&config, pool);

    ctrlc::set_handler(|| {
        tracing::info!("interrupted, exiting");
        std::process::exit(0);
    })?;

    let mut workers = Vec::new();
    for core in config.active_cores() {
        let config = Arc::clone(&config);
        let switch = Arc::clone(&switch);
        let handle = spawn_core_thread(core, move |core| {
            run_core(core, &config, &switch);
        })?;
        workers.push((core, handle));
    }

    loop {
        std::thread::sleep(Duration::from_millis(100));
        if let Some(index) = workers.iter().position(|(_, handle)| handle.is_finished()) {
            let (core, handle) = workers.swap_remove(index);
            let outcome = if handle.join().is_ok() { "returned" } else { "panicked" };
            tracing::error!(core, outcome, "dispatch thread terminated");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_both_argument_forms() {
        let options = parse_cli_options(args(&["--config=a.json", "--stats", "5"])).unwrap();
        assert_eq!(options.config, Some(PathBuf::from("a.json")));
        assert_eq!(options.stats_interval_secs, Some(5));

        let options = parse_cli_options(args(&["--config", "b.json", "--stats=0", "--other"])).unwrap();
        assert_eq!(options.config, Some(PathBuf::from("b.json")));
        assert_eq!(options.stats_interval_secs, Some(0));
    }

    #[test]
    fn rejects_missing_or_bad_values() {
        assert!(parse_cli_options(args(&["--config"])).is_err());
        assert!(parse_cli_options(args(&["--stats=soon"])).is_err());
    }

    #[test]
    fn stats_override_applies_to_defaults() {
        let options = CliOptions {
            config: None,
            stats_interval_secs: Some(0),
        };
        let config = load_config(&options).unwrap();
        assert_eq!(config.stats_interval_secs, 0);
    }
}
