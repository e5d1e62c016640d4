//! Half-open character ranges.
//!
//! A [`Span`] is the `[from, to)` region an anchor occupies in the buffer.
//! Offsets are char indices into the current buffer text; `from == to` is an
//! empty span. Spans never encode direction, unlike an editor selection: the
//! engine only ever needs position, length and intersection.

use serde::{
  Deserialize,
  Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
  pub from: usize,
  pub to:   usize,
}

impl Span {
  #[inline]
  pub fn new(from: usize, to: usize) -> Self {
    debug_assert!(from <= to, "span {from}..{to} is inverted");
    Self { from, to }
  }

  #[inline]
  #[must_use]
  pub fn len(&self) -> usize {
    self.to - self.from
  }

  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.from == self.to
  }

  #[inline]
  pub fn contains(&self, pos: usize) -> bool {
    self.from <= pos && pos < self.to
  }

  #[inline]
  pub fn contains_span(&self, other: &Self) -> bool {
    self.from <= other.from && other.to <= self.to
  }

  /// Strict interval intersection: the spans share at least one position.
  #[inline]
  pub fn overlaps(&self, other: &Self) -> bool {
    self.from < other.to && other.from < self.to
  }

  /// Overlapping, or separated by at most one character. This is the merge
  /// predicate: two corrections this close describe one visual region.
  #[inline]
  pub fn touches(&self, other: &Self) -> bool {
    let (first, second) = if self.from <= other.from {
      (self, other)
    } else {
      (other, self)
    };
    second.from <= first.to + 1
  }

  /// Intersection against a *closed* interval `[from, to]`, the shape a
  /// buffer-change notification reports. An insertion at a span edge still
  /// counts as touching the span.
  #[inline]
  pub fn intersects_closed(&self, from: usize, to: usize) -> bool {
    self.from <= to && from <= self.to
  }

  #[inline]
  #[must_use]
  pub fn union(&self, other: &Self) -> Self {
    Self::new(self.from.min(other.from), self.to.max(other.to))
  }

  /// Shift both endpoints by a signed delta. Saturates at zero rather than
  /// wrapping; callers only shift spans that start at or after the edit, so
  /// saturation is never hit in a consistent store.
  #[inline]
  #[must_use]
  pub fn shifted(&self, delta: isize) -> Self {
    Self::new(
      self.from.saturating_add_signed(delta),
      self.to.saturating_add_signed(delta),
    )
  }
}
