//! Core pinning and per-core thread launch.
use crate::config::CoreId;
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("failed to pin thread to core {core}: errno {errno}")]
    Pin { core: CoreId, errno: i32 },
    #[error("failed to spawn thread for core {core}: {source}")]
    Spawn {
        core: CoreId,
        #[source]
        source: std::io::Error,
    },
}

/// Pin the current thread to a single core.
///
/// Restricts the calling thread to `core_id` so the poll loop never migrates and keeps its
/// caches warm.
///
/// # Platform Support
/// - **Linux**: `pthread_setaffinity_np`
/// - **Other platforms**: no-op
///
/// # Returns
/// `Ok(())` when pinned (or pinning is unsupported), [`ThreadError::Pin`] when the kernel
/// refused the mask.
pub fn set_thread_core(core_id: CoreId) -> Result<(), ThreadError> {
    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, pthread_self, pthread_setaffinity_np, CPU_SET, CPU_ZERO};
        // SAFETY: cpu_set_t is plain data; the mask outlives the call.
        let rc = unsafe {
            let mut set: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut set);
            CPU_SET(core_id as usize, &mut set);
            pthread_setaffinity_np(pthread_self(), std::mem::size_of::<cpu_set_t>(), &set)
        };
        if rc != 0 {
            return Err(ThreadError::Pin {
                core: core_id,
                errno: rc,
            });
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = core_id;
    }
    Ok(())
}

/// Core the calling thread is running on, when the platform can tell.
pub fn current_core() -> Option<CoreId> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: sched_getcpu takes no arguments and has no side effects.
        let cpu = unsafe { libc::sched_getcpu() };
        CoreId::try_from(cpu).ok()
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Spawn a thread named `lcore-<core>`, pin it, and run `body` with the core id.
///
/// A pin failure is logged and the thread keeps running unpinned. After pinning, the running
/// core is checked against `core` and a mismatch is logged as a warning.
pub fn spawn_core_thread<F, T>(core: CoreId, body: F) -> Result<JoinHandle<T>, ThreadError>
where
    F: FnOnce(CoreId) -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("lcore-{core}"))
        .spawn(move || {
            if let Err(err) = set_thread_core(core) {
                tracing::warn!(core, error = %err, "running unpinned");
            }
            match current_core() {
                Some(running) if running != core => {
                    tracing::warn!(core, running, "thread is not running on its assigned core");
                }
                _ => {}
            }
            body(core)
        })
        .map_err(|source| ThreadError::Spawn { core, source })
}
