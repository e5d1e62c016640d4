//! Keeping anchors consistent across buffer edits.
//!
//! Every buffer mutation reaches the engine as an [`Edit`]: the replaced
//! range in the pre-edit buffer plus the inserted length. The rebaser
//! shifts anchors past the edit by the net length delta and invalidates
//! anchors the edit touched — unless the edit is one the engine issued
//! itself, which is distinguished by an explicit [`EditKind`] value rather
//! than a mode flag that someone has to remember to reset.
//!
//! - [`EditKind::External`]: a user keystroke. Anchors intersecting the
//!   *closed* interval `[from, to]` can no longer be trusted and are
//!   removed; an insertion at a span edge counts as touching it.
//! - [`EditKind::SelfIssuedPreview`]: a suggestion-cycling edit. The
//!   previewed anchor is exempt from invalidation; its end is recomputed
//!   from the candidate now shown. Everything after the edit shifts.
//! - [`EditKind::SelfIssuedCommit`]: a suggestion being applied. The
//!   applied anchor (or group member) is gone from the store before the
//!   rebase runs, so only the shift applies; neighbors touching the edit
//!   edge survive, unlike under an external edit.

use tracing::debug;

use crate::anchor::{
  Anchor,
  AnchorId,
  AnchorKind,
  AnchorStore,
};

/// One buffer mutation: `[from, to)` replaced by `inserted_len` characters.
/// Offsets are char indices into the pre-edit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
  pub from:         usize,
  pub to:           usize,
  pub inserted_len: usize,
}

impl Edit {
  pub fn new(from: usize, to: usize, inserted_len: usize) -> Self {
    debug_assert!(from <= to, "edit range {from}..{to} is inverted");
    Self {
      from,
      to,
      inserted_len,
    }
  }

  /// Net length change of the buffer.
  #[inline]
  pub fn delta(&self) -> isize {
    self.inserted_len as isize - (self.to - self.from) as isize
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
  /// A mutation the engine did not issue (user typing, external tooling).
  External,
  /// A suggestion-cycling edit; `target` is the anchor being previewed.
  SelfIssuedPreview { target: AnchorId },
  /// A suggestion commit; the applied anchor is already out of the store.
  SelfIssuedCommit,
}

/// Rebase every anchor in the store through `edit`. Returns the anchors the
/// edit invalidated (always empty for self-issued edits).
pub fn rebase(store: &mut AnchorStore, edit: Edit, kind: EditKind) -> Vec<Anchor> {
  let delta = edit.delta();

  let removed = store.sift(|anchor| {
    if let EditKind::SelfIssuedPreview { target } = kind
      && anchor.id == target
    {
      // The preview replaced this anchor's own text; trust it and track
      // the new length instead of invalidating.
      anchor.span.to = anchor.span.from + anchor.shown().chars().count();
      return true;
    }

    if anchor.span.from >= edit.to {
      shift_anchor(anchor, delta);
      return true;
    }

    match kind {
      EditKind::External => !anchor.span.intersects_closed(edit.from, edit.to),
      EditKind::SelfIssuedPreview { .. } => true,
      EditKind::SelfIssuedCommit => {
        // A member commit can land inside its group's span: members past
        // the edit shift individually and the union is recomputed.
        if let AnchorKind::Group(members) = &mut anchor.kind {
          for member in members.iter_mut() {
            if member.span.from >= edit.to {
              member.span = member.span.shifted(delta);
            }
          }
          if let Some(union) = members
            .iter()
            .map(|member| member.span)
            .reduce(|a, b| a.union(&b))
          {
            anchor.span = union;
          }
        }
        true
      },
    }
  });

  if !removed.is_empty() {
    debug!(
      edit = ?edit,
      invalidated = removed.len(),
      "edit invalidated anchors"
    );
  }

  removed
}

fn shift_anchor(anchor: &mut Anchor, delta: isize) {
  anchor.span = anchor.span.shifted(delta);
  if let AnchorKind::Group(members) = &mut anchor.kind {
    for member in members {
      member.span = member.span.shifted(delta);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    Tendril,
    anchor::AnchorStatus,
    correction::Correction,
    span::Span,
  };

  fn correction(from: usize, to: usize, original: &str, candidate: &str) -> Correction {
    Correction {
      span:       Span::new(from, to),
      original:   original.into(),
      candidates: vec![candidate.into()],
      help:       None,
      metadata:   None,
    }
  }

  fn store_with(spans: &[(usize, usize)]) -> AnchorStore {
    let mut store = AnchorStore::new();
    for &(from, to) in spans {
      store.insert(Anchor::simple(correction(from, to, "ab", "cd")));
    }
    store
  }

  #[test]
  fn insertion_shifts_anchors_at_or_after_the_edit() {
    let mut store = store_with(&[(0, 2), (5, 8), (10, 12)]);
    // insert 3 chars at offset 5
    let removed = rebase(&mut store, Edit::new(5, 5, 3), EditKind::SelfIssuedCommit);
    assert!(removed.is_empty());
    let spans: Vec<_> = store.iter().map(|a| (a.span.from, a.span.to)).collect();
    assert_eq!(spans, vec![(0, 2), (8, 11), (13, 15)]);
  }

  #[test]
  fn external_edit_invalidates_touched_anchors() {
    let mut store = store_with(&[(0, 2), (5, 8), (10, 12)]);
    let removed = rebase(&mut store, Edit::new(6, 7, 0), EditKind::External);
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].span, Span::new(5, 8));
    assert_eq!(removed[0].status, AnchorStatus::Removed);
    let spans: Vec<_> = store.iter().map(|a| (a.span.from, a.span.to)).collect();
    assert_eq!(spans, vec![(0, 2), (9, 11)]);
  }

  #[test]
  fn external_insertion_at_span_end_invalidates_it() {
    // Typing at the closed edge of a correction extends the word; the
    // stored text can no longer be trusted.
    let mut store = store_with(&[(5, 8)]);
    let removed = rebase(&mut store, Edit::new(8, 8, 1), EditKind::External);
    assert_eq!(removed.len(), 1);
    assert!(store.is_empty());
  }

  #[test]
  fn external_insertion_at_span_start_shifts_it() {
    let mut store = store_with(&[(5, 8)]);
    let removed = rebase(&mut store, Edit::new(5, 5, 2), EditKind::External);
    assert!(removed.is_empty());
    assert_eq!(store.iter().next().unwrap().span, Span::new(7, 10));
  }

  #[test]
  fn invalidating_the_focused_anchor_clears_focus() {
    let mut store = store_with(&[(5, 8)]);
    let id = store.iter().next().unwrap().id;
    store.set_focused(Some(id));
    rebase(&mut store, Edit::new(6, 6, 1), EditKind::External);
    assert!(store.focused_id().is_none());
  }

  #[test]
  fn preview_does_not_invalidate_its_own_anchor() {
    // Scenario: previewing a longer candidate over [3, 5).
    let mut store = AnchorStore::new();
    store.insert(Anchor::simple(correction(3, 5, "갔다", "갔었다")));
    store.insert(Anchor::simple(correction(9, 11, "갔다", "갔었다")));
    let target = store.iter().next().unwrap().id;
    store.get_mut(target).unwrap().cursor = 1;

    let edit = Edit::new(3, 5, 3);
    let removed = rebase(&mut store, edit, EditKind::SelfIssuedPreview { target });
    assert!(removed.is_empty());

    let previewed = store.get(target).unwrap();
    assert_eq!(previewed.span, Span::new(3, 6));
    assert_eq!(previewed.shown(), &Tendril::from("갔었다"));
    // the unrelated anchor shifted by the delta
    let other: Vec<_> = store
      .iter()
      .filter(|a| a.id != target)
      .map(|a| a.span)
      .collect();
    assert_eq!(other, vec![Span::new(10, 12)]);
  }

  #[test]
  fn commit_shift_matches_length_delta() {
    // Anchor at [5, 8) committed with a replacement two chars longer;
    // an anchor at [10, 12) must land at [12, 14).
    let mut store = store_with(&[(10, 12)]);
    let removed = rebase(&mut store, Edit::new(5, 8, 5), EditKind::SelfIssuedCommit);
    assert!(removed.is_empty());
    assert_eq!(store.iter().next().unwrap().span, Span::new(12, 14));
  }

  #[test]
  fn group_members_shift_with_their_group() {
    let members = vec![
      correction(10, 12, "ab", "xy"),
      correction(13, 15, "cd", "uv"),
    ];
    let mut store = AnchorStore::new();
    store.insert(Anchor::group(Span::new(10, 15), "ab cd".into(), members));

    rebase(&mut store, Edit::new(0, 2, 5), EditKind::External);
    let group = store.iter().next().unwrap();
    assert_eq!(group.span, Span::new(13, 18));
    let member_spans: Vec<_> = group.members().iter().map(|m| m.span).collect();
    assert_eq!(member_spans, vec![Span::new(13, 15), Span::new(16, 18)]);
  }

  #[test]
  fn commit_inside_a_group_shifts_only_trailing_members() {
    // Survivors of a member commit at [5, 8) sit on both sides of the
    // edit; only the trailing one moves, and the union is recomputed.
    let members = vec![correction(0, 2, "ab", "xy"), correction(10, 12, "cd", "uv")];
    let mut store = AnchorStore::new();
    store.insert(Anchor::group(Span::new(0, 12), "abcdefghijkl".into(), members));

    rebase(&mut store, Edit::new(5, 8, 5), EditKind::SelfIssuedCommit);
    let group = store.iter().next().unwrap();
    let member_spans: Vec<_> = group.members().iter().map(|m| m.span).collect();
    assert_eq!(member_spans, vec![Span::new(0, 2), Span::new(12, 14)]);
    assert_eq!(group.span, Span::new(0, 14));
  }

  quickcheck::quickcheck! {
      // Insertion law: inserting k chars at p shifts every anchor with
      // start >= p by exactly k and touches nothing else's length.
      fn insertion_shift_law(p: u8, k: u8, spans: Vec<(u8, u8)>) -> bool {
          let p = p as usize;
          let k = k as usize;
          let mut store = AnchorStore::new();
          let mut expected = Vec::new();
          let mut last_end = 0usize;
          let mut sorted: Vec<(usize, usize)> = spans
              .into_iter()
              .map(|(from, len)| (from as usize, from as usize + 1 + len as usize % 8))
              .collect();
          sorted.sort_unstable();
          for (from, to) in sorted {
              // keep the store invariant: live anchors never overlap
              if from < last_end {
                  continue;
              }
              last_end = to;
              store.insert(Anchor::simple(correction(from, to, "ab", "cd")));
              if from >= p {
                  expected.push((from + k, to + k));
              } else if p <= to {
                  // touched by the closed interval [p, p]
                  continue;
              } else {
                  expected.push((from, to));
              }
          }
          rebase(&mut store, Edit::new(p, p, k), EditKind::External);
          let got: Vec<_> = store.iter().map(|a| (a.span.from, a.span.to)).collect();
          got == expected
      }
  }
}
