//! Cyclic navigation over anchors and over a single anchor's candidates.
//!
//! Anchors are totally ordered by `(span.from, span.to, id)` — the order
//! the store maintains — and focus navigation wraps at both ends. With
//! nothing focused, navigation seeds from the host's cursor offset instead
//! of starting at an arbitrary anchor. These functions are pure over the
//! store; issuing the host calls (cursor move, scroll) and the preview
//! edits is the engine's job.

use crate::anchor::{
  AnchorId,
  AnchorStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Next,
  Prev,
}

/// The anchor focus should move to, or `None` on an empty store.
///
/// With a focused anchor, its cyclic neighbor in store order. Without one,
/// the nearest anchor starting at/after (`Next`) or strictly before
/// (`Prev`) `cursor_offset`, wrapping around when the cursor sits past the
/// last anchor or before the first.
pub fn step(
  store: &AnchorStore,
  direction: Direction,
  cursor_offset: usize,
) -> Option<AnchorId> {
  if store.is_empty() {
    return None;
  }
  let len = store.len();

  let target = match store.focused_id().and_then(|id| store.position_of(id)) {
    Some(at) => {
      match direction {
        Direction::Next => (at + 1) % len,
        Direction::Prev => (at + len - 1) % len,
      }
    },
    None => {
      match direction {
        Direction::Next => {
          match store.first_at_or_after(cursor_offset) {
            Some(anchor) => store.position_of(anchor.id)?,
            None => 0, // wrap to the first anchor
          }
        },
        Direction::Prev => {
          match store.last_before(cursor_offset) {
            Some(anchor) => store.position_of(anchor.id)?,
            None => len - 1, // wrap to the last anchor
          }
        },
      }
    },
  };

  store.at(target).map(|anchor| anchor.id)
}

/// Move a candidate cursor circularly. `len` is the candidate count,
/// always at least one (the original).
pub fn cycle(len: usize, cursor: usize, direction: Direction) -> usize {
  debug_assert!(len > 0 && cursor < len);
  match direction {
    Direction::Next => (cursor + 1) % len,
    Direction::Prev => (cursor + len - 1) % len,
  }
}
