//! Collector - throttled sweeping of zero-count records
//!
//! Design: Sweep avoidance optimized for destruction-heavy workloads:
//! 1. Every collection trigger consults a per-registry throttle
//! 2. Only every `collect_cycle + 1`-th trigger scans the table
//! 3. A scan frees every zero-count record, live records stay untouched
//!
//! Allocations are released after the registry lock is dropped, so pointee
//! destructors may construct or drop handles of the same registry.

mod exit;


pub use exit::{run_exit_finalizers, ExitFinalizer, ExitHook, ManualExit, NoExit, ProcessExit};

use crate::logging::{log_release, log_shutdown, log_sweep_complete, log_sweep_skipped, warn};
use crate::registry::{Record, Registry, RegistryState};
use std::sync::atomic::Ordering;
use std::time::Instant;

/// Collector statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub sweeps_run: usize,
    pub sweeps_skipped: usize,
    /// Allocations freed through the scalar (`Box<T>`) path
    pub scalars_released: usize,
    /// Allocations freed through the array (`Box<[T]>`) path
    pub arrays_released: usize,
    pub records_tracked: usize,
}

/// Outcome of a single collection trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// Absorbed by the throttle; `skipped` triggers since the last sweep
    Skipped { skipped: usize },
    /// Full scan that removed `records` zero-count records
    Swept { records: usize },
}

impl Sweep {
    pub fn is_sweep(&self) -> bool {
        matches!(self, Self::Swept { .. })
    }
}

impl<T> RegistryState<T> {
    /// Apply the throttle; `Ok` carries the records removed by a sweep,
    /// `Err` the number of triggers absorbed so far
    pub(crate) fn throttle(&mut self) -> Result<Vec<Record<T>>, usize> {
        if self.skipped < self.collect_cycle {
            self.skipped += 1;
            self.stats.sweeps_skipped += 1;
            log_sweep_skipped(self.skipped, self.collect_cycle);
            return Err(self.skipped);
        }

        self.skipped = 0;
        Ok(self.sweep())
    }

    /// Unconditional scan of the whole table
    pub(crate) fn sweep(&mut self) -> Vec<Record<T>> {
        let records = self.table.drain_collectible();
        self.stats.sweeps_run += 1;

        for record in records.iter().filter(|record| !record.ptr.is_null()) {
            if record.is_array() {
                self.stats.arrays_released += 1;
            } else {
                self.stats.scalars_released += 1;
            }
        }

        records
    }
}

impl<T> Registry<T> {
    /// Throttled sweep
    ///
    /// Skips the scan while fewer than `collect_cycle` triggers have been
    /// absorbed since the last sweep; otherwise resets the counter and frees
    /// every zero-count record.
    pub fn collect(&self) -> Sweep {
        let start = Instant::now();
        let (swept, remaining) = {
            let mut state = self.state.lock();
            match state.throttle() {
                Ok(swept) => (swept, state.table.len()),
                Err(skipped) => return Sweep::Skipped { skipped },
            }
        };

        self.finish_sweep(start, swept, remaining)
    }

    /// Sweep now, regardless of the throttle, and reset its counter
    pub fn force_collect(&self) -> Sweep {
        let start = Instant::now();
        let (swept, remaining) = {
            let mut state = self.state.lock();
            state.skipped = 0;
            let swept = state.sweep();
            (swept, state.table.len())
        };

        self.finish_sweep(start, swept, remaining)
    }

    fn finish_sweep(&self, start: Instant, swept: Vec<Record<T>>, remaining: usize) -> Sweep {
        let records = swept.len();
        for record in swept {
            // Safety: removed from the table with a zero count
            unsafe { release_allocation(record) };
        }

        log_sweep_complete(start.elapsed().as_micros() as u64, records, remaining);
        Sweep::Swept { records }
    }

    /// Exit finalizer: reclaim everything that is no longer referenced.
    ///
    /// Marks the registry shut down (no new addresses are accepted), forces
    /// the collect cycle to 0 and runs one sweep. Records that still have
    /// live handles are kept; with the cycle at 0 they are reclaimed as soon
    /// as their last handle drops. Returns the number of such records.
    ///
    /// Idempotent, and a no-op on an empty registry.
    pub fn shutdown(&self) -> usize {
        let start = Instant::now();
        let (swept, remaining) = {
            let mut state = self.state.lock();
            self.shut_down.store(true, Ordering::Release);
            if state.table.is_empty() {
                return 0;
            }

            log_shutdown(std::any::type_name::<T>(), self.declared_len, state.table.len());
            state.collect_cycle = 0;
            let swept = state.throttle().unwrap_or_default();
            (swept, state.table.len())
        };

        if remaining > 0 {
            warn!(
                event = "shutdown_live_records",
                records = remaining,
                "Records still referenced at shutdown were kept"
            );
        }

        self.finish_sweep(start, swept, remaining);
        remaining
    }

    /// Exit finalizer that reclaims every record, referenced or not.
    ///
    /// Returns the number of records removed. Afterwards every outstanding
    /// handle is invalid: dereferencing one panics and dropping one is a
    /// no-op.
    ///
    /// # Safety
    /// No reference obtained from a handle of this registry may be used after
    /// this call.
    pub unsafe fn force_shutdown(&self) -> usize {
        let start = Instant::now();
        let swept = {
            let mut state = self.state.lock();
            self.shut_down.store(true, Ordering::Release);
            self.invalidated.store(true, Ordering::Release);
            if state.table.is_empty() {
                return 0;
            }

            log_shutdown(std::any::type_name::<T>(), self.declared_len, state.table.len());
            state.table.zero_all();
            state.collect_cycle = 0;
            state.throttle().unwrap_or_default()
        };

        let records = swept.len();
        self.finish_sweep(start, swept, 0);
        records
    }

    /// Get collector statistics
    pub fn stats(&self) -> CollectorStats {
        let state = self.state.lock();
        CollectorStats {
            records_tracked: state.table.len(),
            ..state.stats
        }
    }
}

/// Free the allocation behind a swept record
///
/// # Safety
/// `record` must have been removed from its table, and its pointer must come
/// from `Box<T>` (scalar) or a `Box<[T]>` of `record.len` elements (array).
pub(crate) unsafe fn release_allocation<T>(record: Record<T>) {
    if record.ptr.is_null() {
        return;
    }

    log_release(record.address(), record.len);
    if record.is_array() {
        drop(Box::from_raw(core::ptr::slice_from_raw_parts_mut(
            record.ptr, record.len,
        )));
    } else {
        drop(Box::from_raw(record.ptr));
    }
}
