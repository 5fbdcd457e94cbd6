//! Record table - address-indexed refcount bookkeeping
//!
//! Design: Hash index from address to record, so every lookup is O(1) and a
//! successful lookup is the proof of registration. Absence and underflow are
//! reported as errors instead of being assumed away.

use super::record::{Record, RecordInfo};
use crate::error::{RegistryError, RegistryResult};
use crate::logging::{log_record_insert, log_refcount};
use std::collections::HashMap;

pub(crate) struct RecordTable<T> {
    records: HashMap<usize, Record<T>>,
    next_seq: u64,
}

impl<T> RecordTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_seq: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub(crate) fn find(&self, address: usize) -> Option<&Record<T>> {
        self.records.get(&address)
    }

    /// Track a new allocation with a refcount of 1
    pub(crate) fn insert(&mut self, ptr: *mut T, len: usize) -> RegistryResult<&Record<T>> {
        let address = ptr as usize;
        if self.records.contains_key(&address) {
            return Err(RegistryError::DuplicateAddress { address });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        log_record_insert(address, len);

        let record = self
            .records
            .entry(address)
            .or_insert_with(|| Record::new(ptr, len, seq));
        Ok(&*record)
    }

    /// Resolve-or-insert, then count one more reference. Returns the new count.
    pub(crate) fn acquire(&mut self, ptr: *mut T, len: usize) -> RegistryResult<usize> {
        let address = ptr as usize;
        if self.find(address).is_some() {
            return self.retain(address);
        }
        self.insert(ptr, len).map(|record| record.refcount)
    }

    /// Count one more reference to an already tracked address
    pub(crate) fn retain(&mut self, address: usize) -> RegistryResult<usize> {
        let record = self
            .records
            .get_mut(&address)
            .ok_or(RegistryError::UnregisteredAddress { address })?;

        record.refcount += 1;
        log_refcount(address, record.refcount);
        Ok(record.refcount)
    }

    /// Drop one reference. Returns the remaining count.
    pub(crate) fn release(&mut self, address: usize) -> RegistryResult<usize> {
        let record = self
            .records
            .get_mut(&address)
            .ok_or(RegistryError::UnregisteredAddress { address })?;

        if record.refcount == 0 {
            return Err(RegistryError::RefcountUnderflow { address });
        }

        record.refcount -= 1;
        log_refcount(address, record.refcount);
        Ok(record.refcount)
    }

    /// Force every record to be collectible
    pub(crate) fn zero_all(&mut self) {
        for record in self.records.values_mut() {
            record.refcount = 0;
        }
    }

    /// Remove and return every zero-count record
    pub(crate) fn drain_collectible(&mut self) -> Vec<Record<T>> {
        let addresses: Vec<usize> = self
            .records
            .iter()
            .filter(|(_, record)| record.is_collectible())
            .map(|(address, _)| *address)
            .collect();

        addresses
            .into_iter()
            .filter_map(|address| self.records.remove(&address))
            .collect()
    }

    /// Records ordered newest first
    pub(crate) fn newest_first(&self) -> Vec<&Record<T>> {
        let mut records: Vec<&Record<T>> = self.records.values().collect();
        records.sort_unstable_by(|a, b| b.seq.cmp(&a.seq));
        records
    }

    pub(crate) fn infos(&self) -> Vec<RecordInfo> {
        self.newest_first().into_iter().map(Record::info).collect()
    }
}
