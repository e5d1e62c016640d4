//! Character classification used by occurrence matching and dedup heuristics.
//!
//! Offsets everywhere in this workspace are char indices, so classification
//! operates on `char` values directly. "Word" deliberately includes all
//! alphanumerics, which covers Hangul syllables and other non-Latin scripts
//! the correction sources produce.

#[derive(Debug, Eq, PartialEq)]
pub enum CharCategory {
  Whitespace,
  Word,
  Punctuation,
  Unknown,
}

pub fn categorize_char(ch: char) -> CharCategory {
  match ch {
    c if c.is_whitespace() => CharCategory::Whitespace,
    c if char_is_word(c) => CharCategory::Word,
    c if char_is_punctuation(c) => CharCategory::Punctuation,
    _ => CharCategory::Unknown,
  }
}

/// Whether `ch` can sit inside a word for boundary purposes.
#[inline]
pub fn char_is_word(ch: char) -> bool {
  ch.is_alphanumeric() || ch == '_'
}

#[inline]
pub fn char_is_punctuation(ch: char) -> bool {
  use unicode_general_category::{
    GeneralCategory,
    get_general_category,
  };

  matches!(
    get_general_category(ch),
    GeneralCategory::OtherPunctuation
      | GeneralCategory::OpenPunctuation
      | GeneralCategory::ClosePunctuation
      | GeneralCategory::InitialPunctuation
      | GeneralCategory::FinalPunctuation
      | GeneralCategory::ConnectorPunctuation
      | GeneralCategory::DashPunctuation
      | GeneralCategory::MathSymbol
      | GeneralCategory::CurrencySymbol
      | GeneralCategory::ModifierSymbol
  )
}
