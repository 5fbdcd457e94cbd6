//! Exit hooks - hand registry finalizers to the host's termination sequence
//!
//! A registry registers its finalizer once, when its first handle is
//! constructed. The hook only promises to run it once, after normal program
//! logic and before the process terminates.

use crate::logging::{debug, trace, warn};
use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::fmt;

/// Pending process-exit finalizers, keyed by registry id
static PENDING: Lazy<DashMap<u64, ExitFinalizer>> = Lazy::new(DashMap::new);

/// Set once the atexit trampoline is installed
static TRAMPOLINE: OnceCell<()> = OnceCell::new();

/// Zero-argument callback that shuts one registry down
pub struct ExitFinalizer {
    registry_id: u64,
    run: Box<dyn FnOnce() + Send + Sync>,
}

impl ExitFinalizer {
    pub fn new(registry_id: u64, run: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            registry_id,
            run: Box::new(run),
        }
    }

    #[inline]
    pub fn registry_id(&self) -> u64 {
        self.registry_id
    }

    pub fn run(self) {
        trace!(event = "exit_finalizer", registry = self.registry_id, "Running finalizer");
        (self.run)();
    }
}

impl fmt::Debug for ExitFinalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitFinalizer")
            .field("registry_id", &self.registry_id)
            .finish_non_exhaustive()
    }
}

/// Capability for running finalizers at process exit
pub trait ExitHook: Send + Sync {
    /// Run `finalizer` exactly once, after normal program logic
    fn register(&self, finalizer: ExitFinalizer);

    /// Forget the finalizer of a registry that was dropped
    fn unregister(&self, _registry_id: u64) {}
}

/// Process exit via `atexit(3)` on unix
///
/// Elsewhere finalizers stay pending until [`run_exit_finalizers`] is called.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExit;

impl ExitHook for ProcessExit {
    fn register(&self, finalizer: ExitFinalizer) {
        install_trampoline();
        debug!(
            event = "exit_hook_register",
            registry = finalizer.registry_id(),
            "Registry finalizer scheduled for process exit"
        );
        PENDING.insert(finalizer.registry_id(), finalizer);
    }

    fn unregister(&self, registry_id: u64) {
        PENDING.remove(&registry_id);
    }
}

fn install_trampoline() {
    TRAMPOLINE.get_or_init(|| {
        #[cfg(unix)]
        {
            // Safety: run_at_exit is a plain extern "C" fn with no arguments
            if unsafe { libc::atexit(run_at_exit) } != 0 {
                warn!(event = "exit_hook", "atexit registration failed");
            }
        }
    });
}

#[cfg(unix)]
extern "C" fn run_at_exit() {
    run_exit_finalizers();
}

/// Run every pending process-exit finalizer, newest registry first.
///
/// Returns the number of finalizers that ran.
pub fn run_exit_finalizers() -> usize {
    let mut ids: Vec<u64> = PENDING.iter().map(|entry| *entry.key()).collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));

    let mut ran = 0;
    for id in ids {
        // Removed before running; the finalizer may drop its registry
        if let Some((_, finalizer)) = PENDING.remove(&id) {
            finalizer.run();
            ran += 1;
        }
    }
    ran
}

/// Finalizers are held until the host calls [`ManualExit::fire`]
#[derive(Default)]
pub struct ManualExit {
    pending: Mutex<Vec<ExitFinalizer>>,
}

impl ManualExit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of finalizers waiting to run
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run and forget every pending finalizer, newest first
    pub fn fire(&self) -> usize {
        let finalizers = std::mem::take(&mut *self.pending.lock());
        let count = finalizers.len();
        for finalizer in finalizers.into_iter().rev() {
            finalizer.run();
        }
        count
    }
}

impl ExitHook for ManualExit {
    fn register(&self, finalizer: ExitFinalizer) {
        self.pending.lock().push(finalizer);
    }

    fn unregister(&self, registry_id: u64) {
        self.pending
            .lock()
            .retain(|finalizer| finalizer.registry_id() != registry_id);
    }
}

impl fmt::Debug for ManualExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualExit")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Discards finalizers; registries reclaim only when dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExit;

impl ExitHook for NoExit {
    fn register(&self, finalizer: ExitFinalizer) {
        trace!(
            event = "exit_hook_discard",
            registry = finalizer.registry_id(),
            "Finalizer discarded"
        );
    }
}
