//! The per-session correction engine.
//!
//! An [`Engine`] owns the anchor store for one open document and the port
//! to its host buffer. All mutation happens synchronously on the caller's
//! thread; asynchronous collaborators (correction fetch, morphological
//! analysis) deliver their results as whole batches through
//! [`Engine::install_batch`], each batch fully replacing the previous one.
//!
//! # Reentrancy
//!
//! The host reports *every* buffer mutation through
//! [`Engine::handle_edit`], including the ones the engine issued itself via
//! `replace_range`. Before issuing an edit the engine records what it is
//! about to do; the matching notification is rebased with the recorded
//! [`EditKind`] instead of being mistaken for a user keystroke that would
//! invalidate the very anchor being previewed or applied. Any
//! non-matching notification clears the record and rebases as external, so
//! a recorded self-edit never outlives the next unrelated keystroke.
//!
//! # Failure posture
//!
//! A stale batch is discarded; a mismatch between an anchor's recorded
//! text and what the buffer actually holds triggers one bounded relocation
//! attempt and otherwise silently drops the anchor, turning the caller's
//! operation into a no-op. Collaborator failures simply mean no new batch
//! arrives: the installed one stays live.

use std::borrow::Cow;

use ropey::Rope;
use thiserror::Error;
use tracing::{
  debug,
  warn,
};

use crate::{
  Tendril,
  anchor::{
    Anchor,
    AnchorId,
    AnchorKind,
    AnchorSnapshot,
    AnchorStatus,
    AnchorStore,
  },
  correction::{
    MorphemeToken,
    RawCorrection,
  },
  dedupe::dedupe,
  locate::{
    BoundaryRule,
    occurrences,
  },
  merge::merge,
  navigate::{
    self,
    Direction,
  },
  rebase::{
    Edit,
    EditKind,
    rebase,
  },
  span::Span,
};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
  #[error("buffer text at anchor {id} no longer matches its recorded text")]
  AnchorNotFound { id: u64 },
  #[error("span {from}..{to} is out of bounds for buffer length {len}")]
  SpanOutOfBounds {
    from: usize,
    to:   usize,
    len:  usize,
  },
  #[error("batch generation {received} is stale; generation {installed} is already installed")]
  StaleGeneration { installed: u64, received: u64 },
  #[error("no anchor with id {id} is installed")]
  UnknownAnchor { id: u64 },
  #[error("{text:?} is not a candidate of anchor {id}")]
  UnknownCandidate { id: u64, text: String },
}

/// The host-editor port. The engine never owns the buffer; it reads it,
/// asks for mutations, and hears about every mutation (its own included)
/// through [`Engine::handle_edit`].
pub trait HostBuffer {
  fn text(&self) -> Rope;
  fn cursor_offset(&self) -> usize;
  fn replace_range(&mut self, from: usize, to: usize, text: &str);
  fn move_cursor(&mut self, offset: usize);
  fn scroll_into_view(&mut self, from: usize, to: usize);
}

/// Token for one analysis pass. Newer tokens always win; a batch arriving
/// under an older token than the installed one is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
  pub fn get(self) -> u64 {
    self.0
  }
}

/// A self-issued edit waiting for its host notification.
#[derive(Debug, Clone, Copy)]
struct PendingEdit {
  edit:    Edit,
  kind:    EditKind,
  /// Group to rebuild candidates for once spans are final.
  refresh: Option<AnchorId>,
}

pub struct Engine<H: HostBuffer> {
  host:       H,
  store:      AnchorStore,
  boundary:   BoundaryRule,
  /// Mirror of the host buffer's char length, kept current through
  /// [`Engine::handle_edit`]; lets span bounds be validated without
  /// re-reading the buffer.
  buffer_len: usize,
  installed:  u64,
  issued:     u64,
  pending:    Option<PendingEdit>,
}

impl<H: HostBuffer> Engine<H> {
  pub fn new(host: H) -> Self {
    Self::with_boundary(host, BoundaryRule::default())
  }

  pub fn with_boundary(host: H, boundary: BoundaryRule) -> Self {
    let buffer_len = host.text().len_chars();
    Self {
      host,
      store: AnchorStore::new(),
      boundary,
      buffer_len,
      installed: 0,
      issued: 0,
      pending: None,
    }
  }

  pub fn host(&self) -> &H {
    &self.host
  }

  pub fn host_mut(&mut self) -> &mut H {
    &mut self.host
  }

  pub fn store(&self) -> &AnchorStore {
    &self.store
  }

  /// Full anchor view for the rendering layer.
  pub fn snapshot(&self) -> Vec<AnchorSnapshot> {
    self.store.iter().map(AnchorSnapshot::of).collect()
  }

  /// Mint the token an analysis pass must present when its results come
  /// back. Requesting does not disturb the installed batch.
  pub fn request_generation(&mut self) -> Generation {
    self.issued += 1;
    Generation(self.issued)
  }

  /// Install one batch of raw corrections, fully replacing the previous
  /// batch. Returns the number of anchors created.
  pub fn install_batch(
    &mut self,
    generation: Generation,
    raws: &[RawCorrection],
    morphemes: Option<&[MorphemeToken]>,
  ) -> Result<usize> {
    if generation.0 <= self.installed {
      warn!(
        received = generation.0,
        installed = self.installed,
        "discarding stale correction batch"
      );
      return Err(EngineError::StaleGeneration {
        installed: self.installed,
        received:  generation.0,
      });
    }

    let text = self.host.text();
    let len = text.len_chars();

    // Generations never merge: the old batch goes before the new pipeline
    // runs.
    self.store.clear();
    self.pending = None;

    let corrections = dedupe(text.slice(..), raws, morphemes, self.boundary);
    let anchors = merge(text.slice(..), corrections);
    for anchor in &anchors {
      if anchor.span.to > len {
        debug_assert!(false, "pipeline produced span {:?} past len {len}", anchor.span);
        return Err(EngineError::SpanOutOfBounds {
          from: anchor.span.from,
          to:   anchor.span.to,
          len,
        });
      }
    }

    debug!(
      generation = generation.0,
      raw = raws.len(),
      anchors = anchors.len(),
      "installed correction batch"
    );
    self.store.install(anchors);
    self.buffer_len = len;
    self.installed = generation.0;
    self.store.debug_validate(self.buffer_len);
    Ok(self.store.len())
  }

  /// Discard the whole installed batch.
  pub fn clear_all(&mut self) {
    let dropped = self.store.clear();
    self.pending = None;
    if dropped > 0 {
      debug!(dropped, "cleared anchor batch");
    }
  }

  /// Move focus to `id`, or clear it with `None`. Focusing also parks the
  /// host cursor at the anchor and scrolls it into view.
  pub fn set_focused(&mut self, id: Option<AnchorId>) -> Result<()> {
    let Some(id) = id else {
      self.store.set_focused(None);
      return Ok(());
    };
    let span = self
      .store
      .get(id)
      .map(|anchor| anchor.span)
      .ok_or(EngineError::UnknownAnchor { id: id.get() })?;
    self.store.set_focused(Some(id));
    self.host.move_cursor(span.from);
    self.host.scroll_into_view(span.from, span.to);
    Ok(())
  }

  pub fn focus_next(&mut self) -> Result<Option<AnchorId>> {
    self.focus_step(Direction::Next)
  }

  pub fn focus_prev(&mut self) -> Result<Option<AnchorId>> {
    self.focus_step(Direction::Prev)
  }

  fn focus_step(&mut self, direction: Direction) -> Result<Option<AnchorId>> {
    let offset = self.host.cursor_offset();
    let Some(id) = navigate::step(&self.store, direction, offset) else {
      return Ok(None);
    };
    self.set_focused(Some(id))?;
    Ok(Some(id))
  }

  /// Preview the next/previous candidate of an anchor: a live, in-buffer
  /// replacement that commits nothing. Cycling back to index 0 restores
  /// the original text.
  pub fn cycle_suggestion(&mut self, id: AnchorId, direction: Direction) -> Result<()> {
    let text = self.host.text();
    let Some(span) = self.ensure_current(id, &text)? else {
      return Ok(());
    };

    let Some(anchor) = self.store.get_mut(id) else {
      return Err(EngineError::UnknownAnchor { id: id.get() });
    };
    let next = navigate::cycle(anchor.candidates.len(), anchor.cursor, direction);
    if next == anchor.cursor {
      return Ok(());
    }
    anchor.cursor = next;
    let replacement = anchor.candidates[next].clone();

    let edit = Edit::new(span.from, span.to, replacement.chars().count());
    self.pending = Some(PendingEdit {
      edit,
      kind: EditKind::SelfIssuedPreview { target: id },
      refresh: None,
    });
    self.host.replace_range(span.from, span.to, &replacement);
    Ok(())
  }

  /// Commit `text` for an anchor. For a merge-group with no preview
  /// active, only the member the candidate attributes to is applied; the
  /// group survives with its remaining members. A previewed group (or any
  /// simple anchor) commits its whole span and is removed.
  pub fn apply_suggestion(&mut self, id: AnchorId, text: &str) -> Result<()> {
    {
      let anchor = self
        .store
        .get(id)
        .ok_or(EngineError::UnknownAnchor { id: id.get() })?;
      if !anchor.candidates.iter().any(|c| c == text) {
        return Err(EngineError::UnknownCandidate {
          id:   id.get(),
          text: text.into(),
        });
      }
    }

    let rope = self.host.text();
    let Some(span) = self.ensure_current(id, &rope)? else {
      return Ok(());
    };

    let member = self.store.get(id).and_then(|anchor| {
      if anchor.cursor == 0 {
        anchor.member_for_candidate(text)
      } else {
        None
      }
    });

    let result = match member {
      Some(index) => self.apply_member(id, index, text),
      None => self.apply_whole(id, span, text),
    };
    self.store.set_focused(None);
    result
  }

  fn apply_whole(&mut self, id: AnchorId, span: Span, text: &str) -> Result<()> {
    if let Some(anchor) = self.store.get_mut(id) {
      anchor.status = AnchorStatus::Applied;
    }
    self.store.remove(id);
    debug!(id = id.get(), ?span, "applying suggestion");

    let edit = Edit::new(span.from, span.to, text.chars().count());
    self.pending = Some(PendingEdit {
      edit,
      kind: EditKind::SelfIssuedCommit,
      refresh: None,
    });
    self.host.replace_range(span.from, span.to, text);
    Ok(())
  }

  fn apply_member(&mut self, id: AnchorId, index: usize, text: &str) -> Result<()> {
    let (member_span, emptied) = {
      let Some(anchor) = self.store.get_mut(id) else {
        return Err(EngineError::UnknownAnchor { id: id.get() });
      };
      let AnchorKind::Group(members) = &mut anchor.kind else {
        unreachable!("member attribution only succeeds on groups");
      };
      let applied = members.remove(index);
      // Members sharing characters with the applied one lose their text
      // with this commit and go down with it.
      members.retain(|m| !m.span.overlaps(&applied.span));

      let emptied = members.is_empty();
      if emptied {
        anchor.status = AnchorStatus::Applied;
      } else {
        if let Some(union) = members.iter().map(|m| m.span).reduce(|a, b| a.union(&b)) {
          anchor.span = union;
        }
        anchor.cursor = 0;
      }
      (applied.span, emptied)
    };

    if emptied {
      self.store.remove(id);
    } else {
      self.store.resort();
    }
    debug!(
      id = id.get(),
      ?member_span,
      emptied,
      "applying merge-group member"
    );

    let edit = Edit::new(member_span.from, member_span.to, text.chars().count());
    self.pending = Some(PendingEdit {
      edit,
      kind: EditKind::SelfIssuedCommit,
      refresh: (!emptied).then_some(id),
    });
    self.host.replace_range(member_span.from, member_span.to, text);
    Ok(())
  }

  /// The host's change notification entry point. Returns the anchors the
  /// edit invalidated.
  pub fn handle_edit(&mut self, from: usize, to: usize, inserted_len: usize) -> Result<Vec<Anchor>> {
    // The notification describes the pre-edit buffer; the host is already
    // past the edit, so validate against what the inserted text must fit
    // into rather than a pre-edit length the engine may not have seen.
    let host_len = self.host.text().len_chars();
    if from > to || from + inserted_len > host_len {
      warn!(
        from,
        to, inserted_len, host_len, "rejecting malformed edit notification"
      );
      return Err(EngineError::SpanOutOfBounds {
        from,
        to,
        len: host_len,
      });
    }
    let edit = Edit::new(from, to, inserted_len);

    let (kind, refresh) = match self.pending.take() {
      Some(pending) if pending.edit == edit => (pending.kind, pending.refresh),
      // An unrelated mutation arrived first; the recorded self-edit is
      // abandoned rather than left waiting.
      Some(_) | None => (EditKind::External, None),
    };

    let removed = rebase(&mut self.store, edit, kind);
    self.buffer_len = host_len;
    if let Some(id) = refresh {
      self.refresh_group(id);
    }
    self.store.debug_validate(self.buffer_len);
    Ok(removed)
  }

  /// Rebuild a group's candidate list after a member commit, once spans
  /// reflect the post-edit buffer.
  fn refresh_group(&mut self, id: AnchorId) {
    let text = self.host.text();
    let Some(anchor) = self.store.get_mut(id) else {
      return;
    };
    let AnchorKind::Group(members) = &anchor.kind else {
      return;
    };
    let original: Tendril = Cow::from(text.slice(anchor.span.from..anchor.span.to))
      .as_ref()
      .into();
    let mut candidates = vec![original];
    for member in members {
      for candidate in &member.candidates {
        if !candidates.contains(candidate) {
          candidates.push(candidate.clone());
        }
      }
    }
    anchor.candidates = candidates;
    anchor.cursor = 0;
  }

  /// Verify the buffer still holds the anchor's recorded text, relocating
  /// once if it does not. `Ok(None)` means the anchor was dropped and the
  /// caller's operation becomes a no-op.
  fn ensure_current(&mut self, id: AnchorId, text: &Rope) -> Result<Option<Span>> {
    let anchor = self
      .store
      .get(id)
      .ok_or(EngineError::UnknownAnchor { id: id.get() })?;
    match verify_span(text, anchor.span, anchor.shown(), id) {
      Ok(()) => Ok(Some(anchor.span)),
      Err(EngineError::AnchorNotFound { .. }) => self.relocate(id, text),
      Err(err) => Err(err),
    }
  }

  /// One bounded recovery attempt: re-scan for the nearest occurrence of
  /// the expected text relative to the last known offset.
  fn relocate(&mut self, id: AnchorId, text: &Rope) -> Result<Option<Span>> {
    let Some(anchor) = self.store.get(id) else {
      return Ok(None);
    };
    let expected = anchor.shown().clone();
    let last_from = anchor.span.from;

    let hits = occurrences(text.slice(..), &expected, BoundaryRule::Permissive);
    let Some(found) = hits
      .into_iter()
      .min_by_key(|span| span.from.abs_diff(last_from))
    else {
      warn!(
        id = id.get(),
        expected = expected.as_str(),
        "anchor text vanished from the buffer; dropping anchor"
      );
      self.store.remove(id);
      return Ok(None);
    };

    let delta = found.from as isize - last_from as isize;
    if let Some(anchor) = self.store.get_mut(id) {
      anchor.span = found;
      if let AnchorKind::Group(members) = &mut anchor.kind {
        for member in members {
          member.span = member.span.shifted(delta);
        }
      }
    }
    // Relocation can land on ground another stale anchor claims; that one
    // loses.
    self.store.sift(|other| other.id == id || !other.span.overlaps(&found));
    warn!(id = id.get(), span = ?found, "anchor relocated after out-of-band edit");
    Ok(Some(found))
  }
}

fn verify_span(text: &Rope, span: Span, expected: &str, id: AnchorId) -> Result<()> {
  if span.to > text.len_chars() {
    return Err(EngineError::AnchorNotFound { id: id.get() });
  }
  let actual = Cow::from(text.slice(span.from..span.to));
  if actual == expected {
    Ok(())
  } else {
    Err(EngineError::AnchorNotFound { id: id.get() })
  }
}
