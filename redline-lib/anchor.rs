//! Tracked corrections and the store that owns them.
//!
//! An [`Anchor`] is one interactive correction bound to a live span of the
//! buffer. The [`AnchorStore`] is the single source of truth for the
//! current batch: anchors kept sorted by `(span.from, span.to, id)` so
//! position-neighbor queries are binary searches, plus the at-most-one
//! focused anchor.
//!
//! # Candidate list
//!
//! `candidates[0]` is always the original text of the region; the remaining
//! entries are suggestions. `cursor` indexes into this list and selects the
//! text currently shown in the buffer, so `cursor == 0` means "unmodified".
//!
//! # Merge-groups
//!
//! A spatial conflict between corrections is resolved into one anchor whose
//! [`AnchorKind::Group`] holds the constituent [`Correction`]s. Members are
//! plain corrections, never groups, so flattening is enforced by the type.
//! A member keeps its own sub-span and candidate list so it can be applied
//! on its own while the rest of the group stays live.

use std::{
  num::NonZeroU64,
  sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;
use serde_json::Value;

use crate::{
  Tendril,
  correction::Correction,
  span::Span,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(NonZeroU64);

impl AnchorId {
  pub fn new(id: NonZeroU64) -> Self {
    Self(id)
  }

  pub fn fresh() -> Self {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed).max(1);
    Self(NonZeroU64::new(id).expect("anchor id must be non-zero"))
  }

  pub fn get(self) -> u64 {
    self.0.get()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
  Active,
  Focused,
  /// Terminal: the anchor's text was committed into the buffer.
  Applied,
  /// Terminal: invalidated by an edit or discarded with its batch.
  Removed,
}

impl AnchorStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Applied | Self::Removed)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorKind {
  Simple,
  /// Constituents of a merged region, ordered by sub-span.
  Group(Vec<Correction>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
  pub id:         AnchorId,
  pub span:       Span,
  /// `[original, suggestion_1, …]`; never empty.
  pub candidates: Vec<Tendril>,
  pub cursor:     usize,
  pub status:     AnchorStatus,
  pub kind:       AnchorKind,
  pub help:       Option<Tendril>,
  pub metadata:   Option<Value>,
}

impl Anchor {
  pub fn simple(correction: Correction) -> Self {
    let mut candidates = Vec::with_capacity(correction.candidates.len() + 1);
    candidates.push(correction.original.clone());
    for candidate in &correction.candidates {
      if !candidates.contains(candidate) {
        candidates.push(candidate.clone());
      }
    }
    Self {
      id: AnchorId::fresh(),
      span: correction.span,
      candidates,
      cursor: 0,
      status: AnchorStatus::Active,
      kind: AnchorKind::Simple,
      help: correction.help,
      metadata: correction.metadata,
    }
  }

  /// Build a merge-group over `members` (already flattened, sorted by
  /// sub-span). `original` is the buffer text of the union span.
  pub fn group(span: Span, original: Tendril, members: Vec<Correction>) -> Self {
    debug_assert!(members.len() >= 2, "a group needs at least two members");
    let mut candidates = vec![original];
    for member in &members {
      for candidate in &member.candidates {
        if !candidates.contains(candidate) {
          candidates.push(candidate.clone());
        }
      }
    }
    Self {
      id: AnchorId::fresh(),
      span,
      candidates,
      cursor: 0,
      status: AnchorStatus::Active,
      kind: AnchorKind::Group(members),
      help: None,
      metadata: None,
    }
  }

  /// The text currently expected at `span`: the candidate `cursor` selects.
  #[inline]
  pub fn shown(&self) -> &Tendril {
    &self.candidates[self.cursor]
  }

  /// The text the region held before any preview.
  #[inline]
  pub fn original_text(&self) -> &Tendril {
    &self.candidates[0]
  }

  #[inline]
  pub fn is_group(&self) -> bool {
    matches!(self.kind, AnchorKind::Group(_))
  }

  pub fn members(&self) -> &[Correction] {
    match &self.kind {
      AnchorKind::Simple => &[],
      AnchorKind::Group(members) => members,
    }
  }

  /// The member a candidate text attributes to: the first member offering
  /// that candidate. `None` for the original (index 0) and for simple
  /// anchors.
  pub fn member_for_candidate(&self, text: &str) -> Option<usize> {
    match &self.kind {
      AnchorKind::Simple => None,
      AnchorKind::Group(members) => {
        members
          .iter()
          .position(|member| member.candidates.iter().any(|c| c == text))
      },
    }
  }

  fn sort_key(&self) -> (usize, usize, AnchorId) {
    (self.span.from, self.span.to, self.id)
  }
}

/// Host-facing view of one anchor, stable enough to serialize for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorSnapshot {
  pub id:         u64,
  pub span:       Span,
  pub candidates: Vec<String>,
  pub cursor:     usize,
  pub status:     AnchorStatus,
  /// Sub-spans of merge-group members; empty for simple anchors.
  pub members:    Vec<Span>,
}

impl AnchorSnapshot {
  pub fn of(anchor: &Anchor) -> Self {
    Self {
      id:         anchor.id.get(),
      span:       anchor.span,
      candidates: anchor.candidates.iter().map(|c| c.to_string()).collect(),
      cursor:     anchor.cursor,
      status:     anchor.status,
      members:    anchor.members().iter().map(|m| m.span).collect(),
    }
  }
}

#[derive(Debug, Default, Clone)]
pub struct AnchorStore {
  /// Sorted by `(span.from, span.to, id)`.
  anchors: Vec<Anchor>,
  focused: Option<AnchorId>,
}

impl AnchorStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
    self.anchors.iter()
  }

  pub fn focused_id(&self) -> Option<AnchorId> {
    self.focused
  }

  pub fn get(&self, id: AnchorId) -> Option<&Anchor> {
    self.anchors.iter().find(|anchor| anchor.id == id)
  }

  pub fn get_mut(&mut self, id: AnchorId) -> Option<&mut Anchor> {
    self.anchors.iter_mut().find(|anchor| anchor.id == id)
  }

  pub fn insert(&mut self, anchor: Anchor) {
    let key = anchor.sort_key();
    let at = self
      .anchors
      .partition_point(|existing| existing.sort_key() < key);
    self.anchors.insert(at, anchor);
  }

  /// Remove an anchor, marking it `Removed` (or leave `Applied` in place if
  /// the caller already set it). Clears focus if it pointed here.
  pub fn remove(&mut self, id: AnchorId) -> Option<Anchor> {
    let at = self.anchors.iter().position(|anchor| anchor.id == id)?;
    let mut anchor = self.anchors.remove(at);
    if self.focused == Some(id) {
      self.focused = None;
    }
    if !anchor.status.is_terminal() {
      anchor.status = AnchorStatus::Removed;
    }
    Some(anchor)
  }

  pub fn clear(&mut self) -> usize {
    let count = self.anchors.len();
    self.anchors.clear();
    self.focused = None;
    count
  }

  /// Transfer focus, upholding the at-most-one invariant. `None` clears.
  /// Returns false if `id` names no live anchor.
  pub fn set_focused(&mut self, id: Option<AnchorId>) -> bool {
    if let Some(previous) = self.focused.take()
      && let Some(anchor) = self.get_mut(previous)
    {
      anchor.status = AnchorStatus::Active;
    }
    match id {
      None => true,
      Some(id) => {
        match self.get_mut(id) {
          Some(anchor) => {
            anchor.status = AnchorStatus::Focused;
            self.focused = Some(id);
            true
          },
          None => false,
        }
      },
    }
  }

  /// Index of the first anchor starting at or after `offset`.
  fn partition_at(&self, offset: usize) -> usize {
    self
      .anchors
      .partition_point(|anchor| anchor.span.from < offset)
  }

  /// First anchor whose span starts at or after `offset`.
  pub fn first_at_or_after(&self, offset: usize) -> Option<&Anchor> {
    self.anchors.get(self.partition_at(offset))
  }

  /// Last anchor whose span starts strictly before `offset`.
  pub fn last_before(&self, offset: usize) -> Option<&Anchor> {
    let at = self.partition_at(offset);
    at.checked_sub(1).and_then(|at| self.anchors.get(at))
  }

  pub fn position_of(&self, id: AnchorId) -> Option<usize> {
    self.anchors.iter().position(|anchor| anchor.id == id)
  }

  pub fn at(&self, index: usize) -> Option<&Anchor> {
    self.anchors.get(index)
  }

  /// Replace the whole anchor list. Input need not be sorted.
  pub fn install(&mut self, anchors: Vec<Anchor>) {
    self.anchors = anchors;
    self.anchors.sort_by_key(Anchor::sort_key);
    self.focused = None;
  }

  /// Restore sort order after a caller mutated a span in place.
  pub fn resort(&mut self) {
    self.anchors.sort_by_key(Anchor::sort_key);
  }

  /// Mutate every anchor through `f`, extracting the ones `f` rejects as
  /// `Removed`, and restore sortedness after. Used by the rebaser.
  pub fn sift(&mut self, mut f: impl FnMut(&mut Anchor) -> bool) -> Vec<Anchor> {
    let mut removed = Vec::new();
    let mut i = 0;
    while i < self.anchors.len() {
      if f(&mut self.anchors[i]) {
        i += 1;
      } else {
        let mut anchor = self.anchors.remove(i);
        anchor.status = AnchorStatus::Removed;
        removed.push(anchor);
      }
    }
    if let Some(id) = self.focused
      && self.get(id).is_none()
    {
      self.focused = None;
    }
    self.anchors.sort_by_key(Anchor::sort_key);
    removed
  }

  /// Debug-build invariant check: sorted, in-bounds, pairwise disjoint.
  pub fn debug_validate(&self, buffer_len: usize) {
    if cfg!(debug_assertions) {
      for window in self.anchors.windows(2) {
        debug_assert!(window[0].sort_key() < window[1].sort_key(), "store unsorted");
        debug_assert!(
          !window[0].span.overlaps(&window[1].span),
          "live anchors {:?} and {:?} overlap",
          window[0].span,
          window[1].span
        );
      }
      for anchor in &self.anchors {
        debug_assert!(
          anchor.span.to <= buffer_len,
          "span {:?} out of bounds for len {buffer_len}",
          anchor.span
        );
        debug_assert!(anchor.cursor < anchor.candidates.len());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn correction(from: usize, to: usize, original: &str, candidate: &str) -> Correction {
    Correction {
      span:       Span::new(from, to),
      original:   original.into(),
      candidates: vec![candidate.into()],
      help:       None,
      metadata:   None,
    }
  }

  fn anchor(from: usize, to: usize) -> Anchor {
    Anchor::simple(correction(from, to, "ab", "cd"))
  }

  #[test]
  fn insert_keeps_position_order() {
    let mut store = AnchorStore::new();
    store.insert(anchor(10, 12));
    store.insert(anchor(0, 2));
    store.insert(anchor(5, 8));
    let froms: Vec<_> = store.iter().map(|a| a.span.from).collect();
    assert_eq!(froms, vec![0, 5, 10]);
  }

  #[test]
  fn neighbor_queries() {
    let mut store = AnchorStore::new();
    store.insert(anchor(0, 2));
    store.insert(anchor(5, 8));
    store.insert(anchor(10, 12));

    assert_eq!(store.first_at_or_after(3).unwrap().span.from, 5);
    assert_eq!(store.first_at_or_after(5).unwrap().span.from, 5);
    assert!(store.first_at_or_after(11).is_none());
    assert_eq!(store.last_before(5).unwrap().span.from, 0);
    assert_eq!(store.last_before(6).unwrap().span.from, 5);
    assert!(store.last_before(0).is_none());
  }

  #[test]
  fn focus_is_exclusive() {
    let mut store = AnchorStore::new();
    store.insert(anchor(0, 2));
    store.insert(anchor(5, 8));
    let first = store.at(0).unwrap().id;
    let second = store.at(1).unwrap().id;

    assert!(store.set_focused(Some(first)));
    assert!(store.set_focused(Some(second)));
    assert_eq!(store.focused_id(), Some(second));
    assert_eq!(store.get(first).unwrap().status, AnchorStatus::Active);
    assert_eq!(store.get(second).unwrap().status, AnchorStatus::Focused);

    assert!(store.set_focused(None));
    assert_eq!(store.get(second).unwrap().status, AnchorStatus::Active);
  }

  #[test]
  fn removing_focused_anchor_clears_focus() {
    let mut store = AnchorStore::new();
    store.insert(anchor(0, 2));
    let id = store.at(0).unwrap().id;
    store.set_focused(Some(id));
    let removed = store.remove(id).unwrap();
    assert_eq!(removed.status, AnchorStatus::Removed);
    assert!(store.focused_id().is_none());
  }

  #[test]
  fn simple_anchor_candidate_list_starts_with_original() {
    let anchor = Anchor::simple(correction(3, 5, "갔다", "갔었다"));
    assert_eq!(anchor.candidates.len(), 2);
    assert_eq!(anchor.original_text(), &Tendril::from("갔다"));
    assert_eq!(anchor.shown(), &Tendril::from("갔다"));
  }

  #[test]
  fn group_candidates_are_deduped_union() {
    let members = vec![
      correction(0, 2, "ab", "xy"),
      correction(2, 4, "cd", "xy"),
      correction(2, 4, "cd", "zw"),
    ];
    let group = Anchor::group(Span::new(0, 4), "abcd".into(), members);
    assert_eq!(group.candidates, vec![
      Tendril::from("abcd"),
      Tendril::from("xy"),
      Tendril::from("zw"),
    ]);
    assert_eq!(group.member_for_candidate("zw"), Some(2));
    assert_eq!(group.member_for_candidate("xy"), Some(0));
    assert_eq!(group.member_for_candidate("abcd"), None);
  }
}
