//! Input and intermediate shapes of the correction pipeline.
//!
//! A [`RawCorrection`] is what a correction source delivers: text in, text
//! out, not yet bound to a position. The locate/dedupe stages turn raw
//! corrections into [`Correction`]s, each pinned to one occurrence span in
//! the buffer. [`MorphemeToken`] is the analyzer port's output, consumed
//! only as a dedup tie-break signal.

use serde::{
  Deserialize,
  Serialize,
};
use serde_json::Value;

use crate::{
  Tendril,
  span::Span,
};

/// One suggestion from a correction source, not yet located.
///
/// `candidates` holds replacement texts only; the original is not repeated
/// inside it. `help` and `metadata` (confidence, provenance) pass through
/// the engine untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCorrection {
  pub original:   Tendril,
  pub candidates: Vec<Tendril>,
  pub help:       Option<Tendril>,
  pub metadata:   Option<Value>,
}

impl RawCorrection {
  pub fn new(original: impl Into<Tendril>, candidates: Vec<Tendril>) -> Self {
    Self {
      original: original.into(),
      candidates,
      help: None,
      metadata: None,
    }
  }

  pub fn with_help(mut self, help: impl Into<Tendril>) -> Self {
    self.help = Some(help.into());
    self
  }

  pub fn with_metadata(mut self, metadata: Value) -> Self {
    self.metadata = Some(metadata);
    self
  }
}

/// One token from the external morphological analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphemeToken {
  pub text: Tendril,
  pub span: Span,
  pub tags: Vec<Tendril>,
}

/// A raw correction bound to a single occurrence that survived dedup.
///
/// This is both the anchor seed and the merge-group member unit: a merged
/// anchor keeps its constituent `Correction`s so one member can later be
/// applied on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
  pub span:       Span,
  pub original:   Tendril,
  pub candidates: Vec<Tendril>,
  pub help:       Option<Tendril>,
  pub metadata:   Option<Value>,
}

impl Correction {
  pub fn from_raw(raw: &RawCorrection, span: Span) -> Self {
    Self {
      span,
      original: raw.original.clone(),
      candidates: raw.candidates.clone(),
      help: raw.help.clone(),
      metadata: raw.metadata.clone(),
    }
  }
}
