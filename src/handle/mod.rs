//! Handles - pointer-like values whose lifetimes are counted by a registry
//!
//! Design: A handle owns no memory and caches no record:
//! - Construction, clone and reassignment bump the registry's refcount
//! - Drop decrements it and triggers the collector at zero
//! - Access passes straight through to the held address
//!
//! Refcount traffic goes through the registry lock, so handles are `Send`
//! and `Sync` exactly when the pointee is both.

mod cursor;


pub use cursor::Cursor;

use crate::error::{RegistryError, RegistryResult};
use crate::logging::log_handle_error;
use crate::registry::Registry;
use core::ops::{Deref, Index};
use core::ptr;
use std::fmt;
use std::sync::Arc;

/// Reference-counted handle to an allocation tracked by a [`Registry`]
pub struct Handle<T> {
    registry: Arc<Registry<T>>,
    ptr: *mut T,
    /// Declared element count; 0 marks a scalar
    len: usize,
}

impl<T> Handle<T> {
    /// Box `value` and track it in a scalar registry
    pub fn new(registry: &Arc<Registry<T>>, value: T) -> RegistryResult<Self> {
        expect_len(registry, 0)?;
        let ptr = Box::into_raw(Box::new(value));

        // Safety: fresh Box<T>, owned by nobody else
        unsafe { Self::adopt(registry, ptr) }.map_err(|err| {
            // Safety: the registry rejected the pointer, ownership is still ours
            drop(unsafe { Box::from_raw(ptr) });
            err
        })
    }

    /// Track a boxed slice in a registry whose declared length matches
    pub fn from_boxed_slice(registry: &Arc<Registry<T>>, values: Box<[T]>) -> RegistryResult<Self> {
        if registry.declared_len() == 0 {
            return Err(RegistryError::LengthMismatch {
                expected: 0,
                found: values.len(),
            });
        }
        expect_len(registry, values.len())?;

        let ptr = Box::into_raw(values) as *mut T;
        // Safety: fresh Box<[T]> of declared_len elements
        unsafe { Self::adopt(registry, ptr) }.map_err(|err| {
            let len = registry.declared_len();
            // Safety: the registry rejected the pointer, ownership is still ours
            drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)) });
            err
        })
    }

    pub fn from_vec(registry: &Arc<Registry<T>>, values: Vec<T>) -> RegistryResult<Self> {
        Self::from_boxed_slice(registry, values.into_boxed_slice())
    }

    /// Handle to the null address
    pub fn null(registry: &Arc<Registry<T>>) -> RegistryResult<Self> {
        // Safety: null is never released
        unsafe { Self::from_raw(registry, ptr::null_mut()) }
    }

    /// Wrap a raw address.
    ///
    /// An address already tracked by the registry gains one reference;
    /// otherwise a record is created with a count of 1. The first handle ever
    /// constructed for a registry registers its exit finalizer.
    ///
    /// # Safety
    /// `ptr` is null, already tracked by `registry`, or comes from
    /// `Box::into_raw` of a `Box<T>` (scalar registry) or a `Box<[T]>` of
    /// exactly `registry.declared_len()` elements (array registry) that
    /// nothing else will free.
    pub unsafe fn from_raw(registry: &Arc<Registry<T>>, ptr: *mut T) -> RegistryResult<Self> {
        registry.acquire(ptr)?;

        Ok(Self {
            registry: Arc::clone(registry),
            ptr,
            len: registry.declared_len(),
        })
    }

    /// Track a freshly boxed allocation under a new record.
    ///
    /// Boxes of zero-sized types all share one dangling address, so a second
    /// live value of such a type is rejected with `DuplicateAddress` rather
    /// than folded into the first value's record.
    ///
    /// # Safety
    /// `ptr` comes from `Box::into_raw` with the shape `registry` declares.
    unsafe fn adopt(registry: &Arc<Registry<T>>, ptr: *mut T) -> RegistryResult<Self> {
        registry.insert(ptr)?;

        Ok(Self {
            registry: Arc::clone(registry),
            ptr,
            len: registry.declared_len(),
        })
    }

    /// Clone, reporting bookkeeping failures instead of panicking
    pub fn try_clone(&self) -> RegistryResult<Self> {
        self.registry.retain(self.ptr)?;

        Ok(Self {
            registry: Arc::clone(&self.registry),
            ptr: self.ptr,
            len: self.len,
        })
    }

    /// Point this handle at another raw address.
    ///
    /// The old record loses a reference, the new address gains one (or is
    /// inserted), both under one registry lock. If the old record becomes
    /// collectible the collector runs afterwards.
    ///
    /// # Safety
    /// Same contract for `ptr` as [`Handle::from_raw`].
    pub unsafe fn assign_raw(&mut self, ptr: *mut T) -> RegistryResult<()> {
        let old_collectible = self.registry.reassign(self.ptr, ptr)?;
        self.ptr = ptr;

        if old_collectible {
            self.registry.collect();
        }
        Ok(())
    }

    /// Point this handle at the allocation held by `other`
    pub fn assign(&mut self, other: &Handle<T>) -> RegistryResult<()> {
        if !Arc::ptr_eq(&self.registry, &other.registry) {
            return Err(RegistryError::RegistryMismatch);
        }

        // Safety: other's address is tracked by the same registry
        unsafe { self.assign_raw(other.ptr) }
    }

    /// Current refcount of the held address
    pub fn refcount(&self) -> RegistryResult<usize> {
        if self.registry.is_invalidated() {
            return Err(RegistryError::ShutDown);
        }
        self.registry
            .refcount(self.ptr)
            .ok_or(RegistryError::UnregisteredAddress {
                address: self.ptr as usize,
            })
    }

    #[inline]
    pub fn registry(&self) -> &Arc<Registry<T>> {
        &self.registry
    }

    /// Held address
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.len > 0
    }

    /// Declared length (0 for scalars)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of elements reachable through the handle: declared length, or
    /// 1 for a scalar
    #[inline]
    pub fn extent(&self) -> usize {
        if self.len > 0 {
            self.len
        } else {
            1
        }
    }

    /// True when no element is reachable: null handles, and every handle
    /// after a forced shutdown
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

    /// First element, or `None` for null and invalidated handles
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.ptr.is_null() || self.registry.is_invalidated() {
            return None;
        }
        // Safety: a live handle keeps its record, and so the allocation, alive
        Some(unsafe { &*self.ptr })
    }

    /// Mutable access to the first element
    ///
    /// # Safety
    /// No other reference to the pointee may exist while the returned one is
    /// in use, including references from other handles and registry dumps.
    #[inline]
    pub unsafe fn as_mut(&mut self) -> Option<&mut T> {
        if self.ptr.is_null() || self.registry.is_invalidated() {
            return None;
        }
        Some(&mut *self.ptr)
    }

    /// Every reachable element; empty for null and invalidated handles
    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() || self.registry.is_invalidated() {
            return &[];
        }
        // Safety: the allocation holds `extent()` elements and outlives self
        unsafe { core::slice::from_raw_parts(self.ptr, self.extent()) }
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Element `index` without any check
    ///
    /// # Safety
    /// `index < extent()`, the handle is not null, and no forced shutdown ran.
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        &*self.ptr.add(index)
    }

    /// Cursor at the first element of `[ptr, ptr + extent())`
    pub fn begin(&self) -> Cursor<T> {
        let end = self.ptr.wrapping_add(self.extent());
        Cursor::new(self.ptr, self.ptr, end)
    }

    /// Cursor one past the last element
    pub fn end(&self) -> Cursor<T> {
        let end = self.ptr.wrapping_add(self.extent());
        Cursor::new(end, self.ptr, end)
    }
}

fn expect_len<T>(registry: &Registry<T>, found: usize) -> RegistryResult<()> {
    let expected = registry.declared_len();
    if expected != found {
        return Err(RegistryError::LengthMismatch { expected, found });
    }
    Ok(())
}

// Safety: same contract as Arc<T>; refcounts are only touched under the
// registry lock, and the last handle may free T on any thread.
unsafe impl<T: Send + Sync> Send for Handle<T> {}
unsafe impl<T: Send + Sync> Sync for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(handle) => handle,
            Err(err) => panic!("cannot clone handle: {}", err),
        }
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        match self.registry.release(self.ptr) {
            Ok(0) => {
                self.registry.collect();
            }
            Ok(_) => {}
            // A forced shutdown already reclaimed everything
            Err(RegistryError::ShutDown) => {}
            Err(err) => log_handle_error("drop", &err),
        }
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None if self.ptr.is_null() => panic!("dereferenced a null handle"),
            None => panic!("dereferenced a handle after forced shutdown"),
        }
    }
}

impl<T> Index<usize> for Handle<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<'a, T> IntoIterator for &'a Handle<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Handle");
        debug.field("ptr", &self.ptr).field("len", &self.len);

        // The lock is already held while a dump formats pointees
        match self.registry.state.try_lock() {
            Some(state) => {
                let refcount = state.table.find(self.ptr as usize).map(|r| r.refcount);
                debug.field("refcount", &refcount)
            }
            None => debug.field("refcount", &format_args!("<locked>")),
        };
        debug.finish()
    }
}

impl<T> fmt::Pointer for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
