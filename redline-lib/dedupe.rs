//! Collapsing raw corrections that restate the same underlying error.
//!
//! Correction sources routinely report one mistyped token several times,
//! segmented differently. Before anchors exist, every raw correction is
//! located ([`crate::locate`]) and occurrences that are *restatements* of
//! one another collapse to a single survivor. Two occurrences restate the
//! same error when they overlap and either come from the same raw
//! correction (overlapping repeats of one literal) or one span contains
//! the other (two segmentations of one token, identical spans included).
//!
//! Overlapping occurrences from different raw corrections that are merely
//! staggered describe *distinct* errors colliding in space; those all
//! survive here and are grouped downstream by [`crate::merge`], which is
//! what keeps each of them independently applicable.
//!
//! The winner among restatements is chosen by, in order:
//!
//! 1. original text exactly matching a morphological-analyzer token (the
//!    checker segmented the true error),
//! 2. longest original text (a longer match subsumes a shorter, noisier
//!    one),
//! 3. first in input order.
//!
//! Analyzer output is optional; without it rule 1 simply never fires.

use std::cmp::Reverse;

use ropey::RopeSlice;

use crate::{
  correction::{
    Correction,
    MorphemeToken,
    RawCorrection,
  },
  locate::{
    BoundaryRule,
    occurrences,
  },
  span::Span,
};

#[derive(Debug, Clone, Copy)]
struct Located {
  raw:  usize,
  span: Span,
}

/// Locate every raw correction and collapse overlapping restatements.
///
/// Returns one [`Correction`] per surviving occurrence, sorted by span.
/// Batches are small (one analysis pass over one document), so the pairwise
/// restatement check stays quadratic on purpose.
pub fn dedupe(
  text: RopeSlice,
  raws: &[RawCorrection],
  morphemes: Option<&[MorphemeToken]>,
  rule: BoundaryRule,
) -> Vec<Correction> {
  let mut located = Vec::new();
  for (raw, correction) in raws.iter().enumerate() {
    for span in occurrences(text, &correction.original, rule) {
      located.push(Located { raw, span });
    }
  }
  located.sort_by_key(|l| (l.span, l.raw));

  let mut kept: Vec<Located> = Vec::new();
  for loc in located {
    let mut beaten = false;
    kept.retain(|prior| {
      if beaten || !restates(prior, &loc) {
        return true;
      }
      if prior.raw == loc.raw || beats(raws, morphemes, prior.raw, loc.raw) {
        // Same literal repeating keeps its leftmost occurrence.
        beaten = true;
        true
      } else {
        false
      }
    });
    if !beaten {
      kept.push(loc);
    }
  }

  kept
    .into_iter()
    .map(|loc| Correction::from_raw(&raws[loc.raw], loc.span))
    .collect()
}

fn restates(a: &Located, b: &Located) -> bool {
  if !a.span.overlaps(&b.span) {
    return false;
  }
  a.raw == b.raw || a.span.contains_span(&b.span) || b.span.contains_span(&a.span)
}

/// Whether raw correction `a` wins over `b` under the resolution order.
fn beats(
  raws: &[RawCorrection],
  morphemes: Option<&[MorphemeToken]>,
  a: usize,
  b: usize,
) -> bool {
  let key = |raw: usize| {
    let original = &raws[raw].original;
    let segmented =
      morphemes.is_some_and(|tokens| tokens.iter().any(|token| token.text == *original));
    (
      if segmented { 0 } else { 1 },
      Reverse(original.chars().count()),
      raw,
    )
  };
  key(a) < key(b)
}
