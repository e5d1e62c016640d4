//! Overlap resolution: collapsing colliding corrections into merge-groups.
//!
//! The merger consumes the deduplicated, span-sorted corrections of one
//! batch and sweeps them left to right. Corrections whose spans overlap or
//! sit within one character of each other become a single group anchor
//! spanning their union; everything else becomes a simple anchor. Group
//! members keep their own sub-span and candidate list, which is what makes
//! one member applicable without committing the rest.

use std::borrow::Cow;

use ropey::RopeSlice;
use smallvec::SmallVec;

use crate::{
  Tendril,
  anchor::Anchor,
  correction::Correction,
  span::Span,
};

/// Sweep sorted corrections into anchors, merging touching spans.
pub fn merge(text: RopeSlice, corrections: Vec<Correction>) -> Vec<Anchor> {
  let mut anchors = Vec::new();
  let mut cluster: SmallVec<[Correction; 2]> = SmallVec::new();
  let mut cluster_span = Span::new(0, 0);

  for correction in corrections {
    if !cluster.is_empty() && correction.span.from <= cluster_span.to + 1 {
      cluster_span = cluster_span.union(&correction.span);
      cluster.push(correction);
    } else {
      if !cluster.is_empty() {
        anchors.push(emit(text, std::mem::take(&mut cluster), cluster_span));
      }
      cluster_span = correction.span;
      cluster.push(correction);
    }
  }
  if !cluster.is_empty() {
    anchors.push(emit(text, cluster, cluster_span));
  }

  anchors
}

fn emit(text: RopeSlice, mut cluster: SmallVec<[Correction; 2]>, span: Span) -> Anchor {
  if cluster.len() == 1 {
    Anchor::simple(cluster.pop().expect("cluster has one element"))
  } else {
    let original: Tendril = Cow::from(text.slice(span.from..span.to)).as_ref().into();
    Anchor::group(span, original, cluster.into_vec())
  }
}

#[cfg(test)]
mod tests {
  use ropey::Rope;

  use super::*;
  use crate::anchor::AnchorKind;

  fn correction(from: usize, to: usize, text: &str, candidate: &str) -> Correction {
    Correction {
      span:       Span::new(from, to),
      original:   text.into(),
      candidates: vec![candidate.into()],
      help:       None,
      metadata:   None,
    }
  }

  #[test]
  fn distant_spans_stay_separate() {
    let doc = Rope::from("abcdefgh");
    let anchors = merge(doc.slice(..), vec![
      correction(0, 2, "ab", "xy"),
      correction(4, 6, "ef", "uv"),
    ]);
    assert_eq!(anchors.len(), 2);
    assert!(anchors.iter().all(|a| !a.is_group()));
  }

  #[test]
  fn one_char_gap_merges() {
    let doc = Rope::from("abcdefgh");
    let anchors = merge(doc.slice(..), vec![
      correction(0, 2, "ab", "xy"),
      correction(3, 5, "de", "uv"),
    ]);
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].span, Span::new(0, 5));
    assert_eq!(anchors[0].original_text(), &Tendril::from("abcde"));
  }

  #[test]
  fn overlap_becomes_two_member_group() {
    let doc = Rope::from("abcd");
    let anchors = merge(doc.slice(..), vec![
      correction(0, 3, "abc", "abd"),
      correction(1, 4, "bcd", "bce"),
    ]);
    assert_eq!(anchors.len(), 1);
    let group = &anchors[0];
    assert_eq!(group.span, Span::new(0, 4));
    match &group.kind {
      AnchorKind::Group(members) => {
        assert_eq!(members.len(), 2);
        // members reconstruct the inputs losslessly
        assert_eq!(members[0].span, Span::new(0, 3));
        assert_eq!(members[0].original, Tendril::from("abc"));
        assert_eq!(members[1].span, Span::new(1, 4));
        assert_eq!(members[1].candidates, vec![Tendril::from("bce")]);
      },
      AnchorKind::Simple => panic!("expected a group"),
    }
    assert_eq!(group.candidates, vec![
      Tendril::from("abcd"),
      Tendril::from("abd"),
      Tendril::from("bce"),
    ]);
  }

  #[test]
  fn chain_of_overlaps_forms_one_group() {
    let doc = Rope::from("abcdef");
    let anchors = merge(doc.slice(..), vec![
      correction(0, 2, "ab", "x"),
      correction(1, 4, "bcd", "y"),
      correction(3, 6, "def", "z"),
    ]);
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].span, Span::new(0, 6));
    assert_eq!(anchors[0].members().len(), 3);
  }

  #[test]
  fn single_occurrence_stays_simple() {
    let doc = Rope::from("그는 갔다");
    let anchors = merge(doc.slice(..), vec![correction(3, 5, "갔다", "갔었다")]);
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].kind, AnchorKind::Simple);
    assert_eq!(anchors[0].members(), &[]);
  }

  quickcheck::quickcheck! {
      // Re-merging the merged output is a fixpoint: spans come out
      // identical, so running the pipeline twice changes nothing.
      fn merge_is_idempotent(raw_spans: Vec<(u8, u8)>) -> bool {
          let doc = Rope::from("a".repeat(600));
          let mut corrections: Vec<Correction> = raw_spans
              .into_iter()
              .map(|(from, len)| {
                  let from = from as usize;
                  let to = from + (len as usize % 16);
                  Correction {
                      span: Span::new(from, to),
                      original: "a".into(),
                      candidates: vec!["b".into()],
                      help: None,
                      metadata: None,
                  }
              })
              .collect();
          corrections.sort_by_key(|c| c.span);

          let once = merge(doc.slice(..), corrections);
          let again = merge(
              doc.slice(..),
              once
                  .iter()
                  .map(|anchor| Correction {
                      span: anchor.span,
                      original: anchor.original_text().clone(),
                      candidates: anchor.candidates[1..].to_vec(),
                      help: None,
                      metadata: None,
                  })
                  .collect(),
          );

          once.len() == again.len()
              && once
                  .iter()
                  .zip(again.iter())
                  .all(|(a, b)| a.span == b.span && a.candidates == b.candidates)
      }
  }
}
