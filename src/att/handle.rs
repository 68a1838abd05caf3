use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;
use std::ops::{Bound, RangeBounds};

use crate::name_of;

/// Attribute handle ([Vol 3] Part F, Section 3.2.2).
#[allow(clippy::unsafe_derive_deserialize)]
#[derive(
    Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    /// Minimum valid handle.
    pub const MIN: Self = Self(
        // SAFETY: Non-zero
        unsafe { NonZeroU16::new_unchecked(0x0001) },
    );
    /// Maximum valid handle.
    pub const MAX: Self = Self(
        // SAFETY: Non-zero
        unsafe { NonZeroU16::new_unchecked(0xFFFF) },
    );

    /// Wraps a raw handle. Returns `None` if the handle is invalid.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the next handle or `None` if the maximum handle was reached.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Self::new(self.0.get().wrapping_add(1))
    }

    /// Returns the previous handle or `None` if the minimum handle was
    /// reached.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        Self::new(self.0.get() - 1)
    }
}

impl Debug for Handle {
    #[allow(clippy::use_self)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(Handle), self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

impl From<Handle> for usize {
    #[inline]
    fn from(h: Handle) -> Self {
        Self::from(h.0.get())
    }
}

/// Inclusive range of attribute handles. This is a `Copy` version of
/// `RangeInclusive<Handle>`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[must_use]
pub struct HandleRange {
    start: Handle,
    end: Handle,
}

impl HandleRange {
    /// Handle range that includes all possible handles.
    pub const ALL: Self = Self {
        start: Handle::MIN,
        end: Handle::MAX,
    };

    /// Creates a new handle range `start..=end`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    #[inline]
    pub const fn new(start: Handle, end: Handle) -> Self {
        assert!(start.0.get() <= end.0.get());
        Self { start, end }
    }

    /// Creates a handle range from raw handles received from the stack.
    /// Returns `None` if either handle is invalid or `start > end`.
    #[inline]
    pub fn from_raw(start: u16, end: u16) -> Option<Self> {
        let (start, end) = (Handle::new(start)?, Handle::new(end)?);
        (start <= end).then_some(Self { start, end })
    }

    /// Returns the starting handle.
    #[inline(always)]
    #[must_use]
    pub const fn start(self) -> Handle {
        self.start
    }

    /// Returns the ending handle.
    #[inline(always)]
    #[must_use]
    pub const fn end(self) -> Handle {
        self.end
    }

    /// Returns whether `hdl` is within the range.
    #[inline]
    #[must_use]
    pub fn contains_handle(self, hdl: Handle) -> bool {
        self.start <= hdl && hdl <= self.end
    }

    /// Returns whether two ranges share at least one handle.
    #[inline]
    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl Display for HandleRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:#06X}..={:#06X}",
            u16::from(self.start),
            u16::from(self.end)
        )
    }
}

impl RangeBounds<Handle> for HandleRange {
    #[inline]
    fn start_bound(&self) -> Bound<&Handle> {
        Bound::Included(&self.start)
    }

    #[inline]
    fn end_bound(&self) -> Bound<&Handle> {
        Bound::Included(&self.end)
    }
}

impl Default for HandleRange {
    /// Returns a handle range that includes all possible handles.
    #[inline(always)]
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn handle_size() {
        assert_eq!(size_of::<Handle>(), 2);
        assert_eq!(size_of::<Option<Handle>>(), 2);
        assert_eq!(size_of::<HandleRange>(), 4);
    }

    #[test]
    fn handle_bounds() {
        assert_eq!(Handle::new(0), None);
        assert_eq!(Handle::MAX.next(), None);
        assert_eq!(Handle::MIN.prev(), None);
        assert_eq!(Handle::new(0x2A).unwrap().next(), Handle::new(0x2B));
        assert_eq!(format!("{}", Handle::new(0x2A).unwrap()), "Handle(0x002A)");
    }

    #[test]
    fn range() {
        let r = HandleRange::from_raw(0x10, 0x1F).unwrap();
        assert!(r.contains_handle(Handle::new(0x10).unwrap()));
        assert!(r.contains_handle(Handle::new(0x1F).unwrap()));
        assert!(!r.contains_handle(Handle::new(0x20).unwrap()));
        assert!(r.overlaps(HandleRange::from_raw(0x1F, 0x30).unwrap()));
        assert!(!r.overlaps(HandleRange::from_raw(0x20, 0x30).unwrap()));
        assert_eq!(HandleRange::from_raw(0x20, 0x10), None);
        assert_eq!(HandleRange::from_raw(0, 0x10), None);
        assert_eq!(r.to_string(), "0x0010..=0x001F");
    }
}
