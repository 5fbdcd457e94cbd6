//! Bounds cursor - raw traversal over a contiguous range
//!
//! Carries the current position plus the `[start, end)` range it was created
//! for. Comparisons, distances and offsets work on addresses only; nothing is
//! checked on dereference, which is why those accessors are `unsafe`.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

pub struct Cursor<T> {
    current: *mut T,
    start: *mut T,
    end: *mut T,
}

impl<T> Cursor<T> {
    #[inline]
    pub fn new(current: *mut T, start: *mut T, end: *mut T) -> Self {
        Self {
            current,
            start,
            end,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.current
    }

    #[inline]
    pub fn start(&self) -> *mut T {
        self.start
    }

    #[inline]
    pub fn end(&self) -> *mut T {
        self.end
    }

    /// Element count of the whole range
    #[inline]
    pub fn len(&self) -> usize {
        distance(self.end, self.start).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.current == self.end
    }

    /// # Safety
    /// `current` must point at a live element inside the range.
    #[inline]
    pub unsafe fn get(&self) -> &T {
        &*self.current
    }

    /// # Safety
    /// `current` must point at a live element inside the range, and no other
    /// reference to it may exist.
    #[inline]
    pub unsafe fn get_mut(&mut self) -> &mut T {
        &mut *self.current
    }

    /// Element `offset` positions away from `current`
    ///
    /// # Safety
    /// The target must be a live element inside the range.
    #[inline]
    pub unsafe fn at(&self, offset: isize) -> &T {
        &*self.current.offset(offset)
    }

    /// Pre-increment
    #[inline]
    pub fn advance(&mut self) -> &mut Self {
        self.current = self.current.wrapping_add(1);
        self
    }

    /// Pre-decrement
    #[inline]
    pub fn retreat(&mut self) -> &mut Self {
        self.current = self.current.wrapping_sub(1);
        self
    }

    /// Post-increment: step forward, returning the prior position
    #[inline]
    pub fn post_advance(&mut self) -> Self {
        let prior = *self;
        self.current = self.current.wrapping_add(1);
        prior
    }

    /// Post-decrement: step back, returning the prior position
    #[inline]
    pub fn post_retreat(&mut self) -> Self {
        let prior = *self;
        self.current = self.current.wrapping_sub(1);
        prior
    }

    /// Signed element distance from `other` to `self`
    #[inline]
    pub fn offset_from(&self, other: &Self) -> isize {
        distance(self.current, other.current)
    }
}

/// Element distance `a - b`; zero-sized pointees never move
#[inline]
fn distance<T>(a: *mut T, b: *mut T) -> isize {
    let size = core::mem::size_of::<T>();
    if size == 0 {
        return 0;
    }
    (a as isize).wrapping_sub(b as isize) / size as isize
}

impl<T> Clone for Cursor<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<T> {}

impl<T> PartialEq for Cursor<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current
    }
}

impl<T> Eq for Cursor<T> {}

impl<T> PartialOrd for Cursor<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Cursor<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        (self.current as usize).cmp(&(other.current as usize))
    }
}

impl<T> Add<isize> for Cursor<T> {
    type Output = Self;

    #[inline]
    fn add(mut self, n: isize) -> Self {
        self += n;
        self
    }
}

impl<T> Sub<isize> for Cursor<T> {
    type Output = Self;

    #[inline]
    fn sub(mut self, n: isize) -> Self {
        self -= n;
        self
    }
}

impl<T> AddAssign<isize> for Cursor<T> {
    #[inline]
    fn add_assign(&mut self, n: isize) {
        self.current = self.current.wrapping_offset(n);
    }
}

impl<T> SubAssign<isize> for Cursor<T> {
    #[inline]
    fn sub_assign(&mut self, n: isize) {
        self.current = self.current.wrapping_offset(n.wrapping_neg());
    }
}

impl<T> Sub for Cursor<T> {
    type Output = isize;

    #[inline]
    fn sub(self, other: Self) -> isize {
        self.offset_from(&other)
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("current", &self.current)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_array_range() {
        let mut values = [10u32, 20, 30, 40];
        let start = values.as_mut_ptr();
        let end = start.wrapping_add(values.len());

        let begin = Cursor::new(start, start, end);
        let finish = Cursor::new(end, start, end);
        assert_eq!(finish - begin, 4);
        assert_eq!(begin.len(), 4);

        let mut cursor = begin;
        let mut seen = Vec::new();
        while cursor != finish {
            seen.push(unsafe { *cursor.get() });
            cursor.advance();
        }
        assert_eq!(seen, vec![10, 20, 30, 40]);
        assert!(cursor.is_at_end());
    }

    #[test]
    fn test_post_increment_returns_prior_position() {
        let mut values = [1u8, 2, 3];
        let start = values.as_mut_ptr();
        let end = start.wrapping_add(3);

        let mut cursor = Cursor::new(start, start, end);
        let prior = cursor.post_advance();
        assert_eq!(prior.as_ptr(), start);
        assert_eq!(cursor.as_ptr(), start.wrapping_add(1));

        let prior = cursor.post_retreat();
        assert_eq!(prior.as_ptr(), start.wrapping_add(1));
        assert_eq!(cursor.as_ptr(), start);
    }

    #[test]
    fn test_offsets_and_ordering() {
        let mut values = [0i64; 8];
        let start = values.as_mut_ptr();
        let end = start.wrapping_add(8);

        let begin = Cursor::new(start, start, end);
        let middle = begin + 5isize;
        assert!(begin < middle);
        assert!(middle >= begin);
        assert_eq!(middle - begin, 5);
        assert_eq!(begin - middle, -5);
        assert_eq!((middle - 2isize) - begin, 3);

        let mut cursor = begin;
        cursor += 7;
        cursor -= 1;
        assert_eq!(cursor.offset_from(&begin), 6);
    }

    #[test]
    fn test_indexed_access_relative_to_current() {
        let mut values = [5u16, 6, 7, 8];
        let start = values.as_mut_ptr();
        let cursor = Cursor::new(start.wrapping_add(1), start, start.wrapping_add(4));

        unsafe {
            assert_eq!(*cursor.at(0), 6);
            assert_eq!(*cursor.at(2), 8);
            assert_eq!(*cursor.at(-1), 5);
        }
    }

    #[test]
    fn test_write_through_cursor() {
        let mut values = [0u32; 3];
        let start = values.as_mut_ptr();
        let end = start.wrapping_add(3);

        let mut cursor = Cursor::new(start, start, end);
        let mut n = 1;
        while !cursor.is_at_end() {
            unsafe { *cursor.get_mut() = n };
            n *= 10;
            cursor.advance();
        }
        assert_eq!(values, [1, 10, 100]);
    }
}
