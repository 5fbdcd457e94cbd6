//! Registry - address-indexed refcount records for one pointee type
//!
//! Design: An explicit, shareable object instead of process-wide state:
//! 1. One registry per pointee type and declared array length
//! 2. Hash index from address to record (O(1) lookup)
//! 3. A single lock around the table, counters and throttle state
//!
//! Handles hold an `Arc<Registry<T>>` and re-resolve their address on every
//! operation; the registry, not the handle, is authoritative.

mod record;
mod table;

#[cfg(test)]
mod tests;

pub use record::RecordInfo;

pub(crate) use record::Record;
pub(crate) use table::RecordTable;

use crate::collector::{CollectorStats, ExitFinalizer, ExitHook, NoExit, ProcessExit};
use crate::config::GcConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::logging::perf;
use core::marker::PhantomData;
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Mutable registry state, guarded by the registry lock
pub(crate) struct RegistryState<T> {
    pub(crate) table: RecordTable<T>,
    pub(crate) collect_cycle: usize,
    /// Collection triggers absorbed since the last sweep
    pub(crate) skipped: usize,
    pub(crate) stats: CollectorStats,
    /// Taken by the first handle ever constructed
    pub(crate) pending_finalizer: Option<ExitFinalizer>,
    pub(crate) hook_registered: bool,
}

/// Refcount registry for allocations of `T`
///
/// Every allocation tracked by one registry has the same shape: a scalar
/// `Box<T>` when `declared_len() == 0`, otherwise a `Box<[T]>` of exactly
/// `declared_len()` elements. Registries with different declared lengths
/// never observe each other's records, even for the same pointee type.
pub struct Registry<T> {
    pub(crate) id: u64,
    pub(crate) declared_len: usize,
    pub(crate) state: Mutex<RegistryState<T>>,
    pub(crate) hook: Arc<dyn ExitHook>,
    /// Set once the finalizer ran; no new addresses are accepted afterwards
    pub(crate) shut_down: AtomicBool,
    /// Set by a forced shutdown; every outstanding handle is dangling
    pub(crate) invalidated: AtomicBool,
}

// Safety: Raw pointers are only dereferenced under the registry lock or
// through handles, which carry the same Send + Sync bounds on T.
unsafe impl<T: Send> Send for Registry<T> {}
unsafe impl<T: Send + Sync> Sync for Registry<T> {}

impl<T: Send + Sync + 'static> Registry<T> {
    /// Scalar registry configured from the environment
    /// (see [`GcConfig::from_env`])
    pub fn new() -> Arc<Self> {
        Self::with_config(GcConfig::from_env())
    }

    /// Registry for arrays of exactly `len` elements, otherwise configured
    /// from the environment
    pub fn array(len: usize) -> Arc<Self> {
        Self::with_config(GcConfig {
            declared_len: len,
            ..GcConfig::from_env()
        })
    }

    pub fn with_config(config: GcConfig) -> Arc<Self> {
        Self::builder().config(config).build()
    }

    /// Builder starting from [`GcConfig::default`]; the environment is not
    /// consulted
    pub fn builder() -> RegistryBuilder<T> {
        RegistryBuilder::new()
    }
}

impl<T> Registry<T> {
    /// Unique id, used to key exit finalizers
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Element count of every tracked allocation (0 = scalar)
    #[inline]
    pub fn declared_len(&self) -> usize {
        self.declared_len
    }

    /// Number of tracked records, live or awaiting a sweep
    pub fn len(&self) -> usize {
        self.state.lock().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().table.is_empty()
    }

    /// Look up the record for `ptr`
    pub fn find(&self, ptr: *const T) -> Option<RecordInfo> {
        self.state.lock().table.find(ptr as usize).map(Record::info)
    }

    pub fn contains(&self, ptr: *const T) -> bool {
        self.state.lock().table.find(ptr as usize).is_some()
    }

    /// Current refcount for `ptr`, if tracked
    pub fn refcount(&self, ptr: *const T) -> Option<usize> {
        self.state
            .lock()
            .table
            .find(ptr as usize)
            .map(|record| record.refcount)
    }

    /// Snapshot of every record, newest first
    pub fn records(&self) -> Vec<RecordInfo> {
        self.state.lock().table.infos()
    }

    pub fn collect_cycle(&self) -> usize {
        self.state.lock().collect_cycle
    }

    /// Set how many collection triggers are skipped between sweeps
    pub fn set_collect_cycle(&self, cycle: usize) {
        self.state.lock().collect_cycle = cycle;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Resolve-or-insert `ptr` for a newly constructed handle
    pub(crate) fn acquire(&self, ptr: *mut T) -> RegistryResult<usize> {
        self.track(ptr, |table, len| table.acquire(ptr, len))
    }

    /// Insert a record for a fresh allocation; an address that is already
    /// tracked is a `DuplicateAddress`
    pub(crate) fn insert(&self, ptr: *mut T) -> RegistryResult<usize> {
        self.track(ptr, |table, len| table.insert(ptr, len).map(|record| record.refcount))
    }

    fn track<F>(&self, ptr: *mut T, op: F) -> RegistryResult<usize>
    where
        F: FnOnce(&mut RecordTable<T>, usize) -> RegistryResult<usize>,
    {
        let (count, finalizer) = {
            let mut state = self.state.lock();
            if self.is_shut_down() && state.table.find(ptr as usize).is_none() {
                return Err(RegistryError::ShutDown);
            }

            let count = op(&mut state.table, self.declared_len)?;
            let finalizer = state.pending_finalizer.take();
            if finalizer.is_some() {
                state.hook_registered = true;
            }
            (count, finalizer)
        };

        // Hook runs outside the lock; it may touch other registries
        if let Some(finalizer) = finalizer {
            self.hook.register(finalizer);
        }

        Ok(count)
    }

    /// Count one more handle for an address that is already tracked
    pub(crate) fn retain(&self, ptr: *mut T) -> RegistryResult<usize> {
        if self.is_invalidated() {
            return Err(RegistryError::ShutDown);
        }
        self.state.lock().table.retain(ptr as usize)
    }

    /// Drop one handle's reference. Returns the remaining count.
    pub(crate) fn release(&self, ptr: *mut T) -> RegistryResult<usize> {
        if self.is_invalidated() {
            return Err(RegistryError::ShutDown);
        }
        self.state.lock().table.release(ptr as usize)
    }

    /// Move one reference from `old` to `new` under a single lock.
    ///
    /// Returns true when the old record became collectible.
    pub(crate) fn reassign(&self, old: *mut T, new: *mut T) -> RegistryResult<bool> {
        if self.is_invalidated() {
            return Err(RegistryError::ShutDown);
        }

        let mut state = self.state.lock();
        if self.is_shut_down() && state.table.find(new as usize).is_none() {
            return Err(RegistryError::ShutDown);
        }

        state.table.release(old as usize)?;
        state.table.acquire(new, self.declared_len)?;

        Ok(state
            .table
            .find(old as usize)
            .map_or(false, |record| record.is_collectible()))
    }
}

impl<T: fmt::Debug> Registry<T> {
    /// Human-readable table of every record, newest first
    pub fn dump(&self) -> String {
        let _guard = perf::track("registry_dump");
        let state = self.state.lock();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Registry<{}, {}>;",
            std::any::type_name::<T>(),
            self.declared_len
        );
        out.push_str("raw_pointer       ref_count     value\n");

        if state.table.is_empty() {
            out.push_str("           -- Empty --\n\n");
            return out;
        }

        for record in state.table.newest_first() {
            let _ = write!(out, "[{:p}]       {}      ", record.ptr, record.refcount);
            if record.ptr.is_null() {
                out.push_str("---");
            } else if record.is_array() {
                // Safety: tracked records are live until swept, and sweeping
                // needs this lock
                let values = unsafe { core::slice::from_raw_parts(record.ptr, record.len) };
                let _ = write!(out, "{:?}", values);
            } else {
                let _ = write!(out, "{:?}", unsafe { &*record.ptr });
            }
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Print the dump to stdout
    pub fn print_dump(&self) {
        print!("{}", self.dump());
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Registry");
        debug
            .field("id", &self.id)
            .field("pointee", &std::any::type_name::<T>())
            .field("declared_len", &self.declared_len)
            .field("shut_down", &self.is_shut_down());

        // A pointee formatted by dump() may reach its own registry
        match self.state.try_lock() {
            Some(state) => debug
                .field("records", &state.table.len())
                .field("collect_cycle", &state.collect_cycle)
                .finish(),
            None => debug.finish_non_exhaustive(),
        }
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.hook_registered {
            self.hook.unregister(self.id);
        }

        // No handle can outlive the registry, so anything left is unreferenced
        state.table.zero_all();
        let leftover = state.sweep();
        for record in leftover {
            // Safety: the record was removed from the table and is unreferenced
            unsafe { crate::collector::release_allocation(record) };
        }
    }
}

/// Builder for [`Registry`]
pub struct RegistryBuilder<T> {
    config: GcConfig,
    hook: Option<Arc<dyn ExitHook>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> RegistryBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: GcConfig::default(),
            hook: None,
            _marker: PhantomData,
        }
    }

    pub fn config(mut self, config: GcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn collect_cycle(mut self, cycle: usize) -> Self {
        self.config.collect_cycle = cycle;
        self
    }

    pub fn declared_len(mut self, len: usize) -> Self {
        self.config.declared_len = len;
        self
    }

    /// Use `hook` instead of the process exit hook
    pub fn exit_hook(mut self, hook: Arc<dyn ExitHook>) -> Self {
        self.config.exit_hook = true;
        self.hook = Some(hook);
        self
    }

    pub fn without_exit_hook(mut self) -> Self {
        self.config.exit_hook = false;
        self
    }

    pub fn build(self) -> Arc<Registry<T>> {
        let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        let register = self.config.exit_hook;
        let hook: Arc<dyn ExitHook> = match (register, self.hook) {
            (false, _) => Arc::new(NoExit),
            (true, Some(hook)) => hook,
            (true, None) => Arc::new(ProcessExit),
        };

        Arc::new_cyclic(|weak: &Weak<Registry<T>>| {
            let weak = weak.clone();
            let pending_finalizer = register.then(|| {
                ExitFinalizer::new(id, move || {
                    if let Some(registry) = weak.upgrade() {
                        registry.shutdown();
                    }
                })
            });

            Registry {
                id,
                declared_len: self.config.declared_len,
                state: Mutex::new(RegistryState {
                    table: RecordTable::new(),
                    collect_cycle: self.config.collect_cycle,
                    skipped: 0,
                    stats: CollectorStats::default(),
                    pending_finalizer,
                    hook_registered: false,
                }),
                hook,
                shut_down: AtomicBool::new(false),
                invalidated: AtomicBool::new(false),
            }
        })
    }
}

impl<T: Send + Sync + 'static> Default for RegistryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
