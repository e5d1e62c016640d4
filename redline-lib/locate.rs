//! Occurrence location: binding a raw correction's original text to spans.
//!
//! The locator scans the buffer left to right for literal matches of the
//! correction's original text. Matches are reported one per start position
//! with the search resuming one character past each hit, so overlapping
//! repeats of the same literal are each reported; spatial conflicts between
//! them are resolved downstream by dedup and merging, not here.
//!
//! # Boundary rule
//!
//! Whether a hit must sit on a word boundary is an explicit
//! [`BoundaryRule`]. The default used by the engine is
//! [`BoundaryRule::Permissive`] (every literal hit counts), which matches
//! the behavior correction sources were tuned against. `WordStrict` rejects
//! hits whose neighboring character is a word character, for callers that
//! want mid-word matches suppressed.

use std::borrow::Cow;

use redline_core::chars::char_is_word;
use ropey::RopeSlice;

use crate::span::Span;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundaryRule {
  /// Accept every literal occurrence.
  #[default]
  Permissive,
  /// Reject occurrences flanked by word characters. Buffer start/end always
  /// qualify as boundaries.
  WordStrict,
}

/// All occurrence spans of `needle` in `text`, in char offsets.
///
/// An empty needle matches nowhere.
pub fn occurrences(text: RopeSlice, needle: &str, rule: BoundaryRule) -> Vec<Span> {
  if needle.is_empty() {
    return Vec::new();
  }

  let hay: Cow<str> = Cow::from(text);
  let needle_chars = needle.chars().count();

  let mut spans = Vec::new();
  let mut search_byte = 0;
  let mut search_char = 0;

  while let Some(rel) = hay[search_byte..].find(needle) {
    let hit_byte = search_byte + rel;
    let hit_char = search_char + hay[search_byte..hit_byte].chars().count();

    if boundary_ok(&hay, hit_byte, needle, rule) {
      spans.push(Span::new(hit_char, hit_char + needle_chars));
    }

    // Resume one character past the hit start.
    let step = hay[hit_byte..]
      .chars()
      .next()
      .map(char::len_utf8)
      .unwrap_or(1);
    search_byte = hit_byte + step;
    search_char = hit_char + 1;
  }

  spans
}

fn boundary_ok(hay: &str, hit_byte: usize, needle: &str, rule: BoundaryRule) -> bool {
  match rule {
    BoundaryRule::Permissive => true,
    BoundaryRule::WordStrict => {
      let before_ok = hay[..hit_byte]
        .chars()
        .next_back()
        .is_none_or(|c| !char_is_word(c));
      let after_ok = hay[hit_byte + needle.len()..]
        .chars()
        .next()
        .is_none_or(|c| !char_is_word(c));
      before_ok && after_ok
    },
  }
}
