//! Undo/redo journal over document patches.
//!
//! A group opens by keeping a copy of the document and closes by diffing against it. The diff
//! holds only what the group changed, so undo and redo leave everything else alone. Nested groups
//! fold into the outermost one; every level can still be rolled back on its own.
//!
//! Suppressed scopes (`without_undo`) record nothing by themselves. The document as it was before
//! the first suppressed change becomes the gesture baseline, and the next recorded group diffs
//! from there: live previews of a drag and the commit at its end undo as one step.

use std::{collections::VecDeque, fmt};

use tracing::debug;

pub const DEFAULT_MAX_UNDO_DEPTH: usize = 200;

/// State the journal can record.
pub trait Journaled: Clone {
    type Patch: fmt::Debug + Clone;

    /// What changed from `before` to `after`, or `None` when nothing recordable did.
    fn diff(before: &Self, after: &Self) -> Option<Self::Patch>;

    /// Puts back the `before` side of `patch`.
    fn revert(&mut self, patch: &Self::Patch);

    /// Puts back the `after` side of `patch`.
    fn reapply(&mut self, patch: &Self::Patch);
}

#[derive(Debug, Clone)]
struct JournalEntry<P> {
    label: String,
    patch: P,
}

#[derive(Debug, Clone)]
struct OpenGroup<S> {
    label: String,
    rollback: S,
}

#[derive(Debug, Clone)]
pub struct MutationJournal<S: Journaled> {
    undo_stack: VecDeque<JournalEntry<S::Patch>>,
    redo_stack: VecDeque<JournalEntry<S::Patch>>,
    max_depth: usize,
    groups: Vec<OpenGroup<S>>,
    recording: bool,
    suppressed_depth: usize,
    gesture_baseline: Option<S>,
}

impl<S: Journaled> Default for MutationJournal<S> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_DEPTH)
    }
}

impl<S: Journaled> MutationJournal<S> {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_depth: max_depth.max(1),
            groups: Vec::new(),
            recording: false,
            suppressed_depth: 0,
            gesture_baseline: None,
        }
    }

    /// True while any group or suppressed scope is open.
    #[must_use]
    pub fn in_scope(&self) -> bool {
        !self.groups.is_empty() || self.suppressed_depth > 0
    }

    #[must_use]
    pub fn group_depth(&self) -> usize {
        self.groups.len()
    }

    pub fn begin_suppressed(&mut self, state: &S) {
        if self.suppressed_depth == 0 && self.groups.is_empty() && self.gesture_baseline.is_none() {
            self.gesture_baseline = Some(state.clone());
        }
        self.suppressed_depth += 1;
    }

    pub fn end_suppressed(&mut self) {
        debug_assert!(self.suppressed_depth > 0, "unbalanced end_suppressed");
        self.suppressed_depth = self.suppressed_depth.saturating_sub(1);
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.back().map(|entry| entry.label.as_str())
    }

    #[must_use]
    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.back().map(|entry| entry.label.as_str())
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Every recorded patch, undo side first.
    pub fn patches(&self) -> impl Iterator<Item = &S::Patch> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(|entry| &entry.patch)
    }

    /// Document copies held for rollback or as the gesture baseline.
    pub fn held_states(&self) -> impl Iterator<Item = &S> {
        self.groups
            .iter()
            .map(|group| &group.rollback)
            .chain(self.gesture_baseline.iter())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.gesture_baseline = None;
    }

    /// Reverts the last recorded group. Returns its label.
    pub fn undo(&mut self, state: &mut S) -> Option<String> {
        debug_assert!(!self.in_scope(), "undo inside an open group");
        let entry = self.undo_stack.pop_back()?;
        state.revert(&entry.patch);
        self.gesture_baseline = None;
        let label = entry.label.clone();
        self.redo_stack.push_back(entry);
        Some(label)
    }

    pub fn redo(&mut self, state: &mut S) -> Option<String> {
        debug_assert!(!self.in_scope(), "redo inside an open group");
        let entry = self.redo_stack.pop_back()?;
        state.reapply(&entry.patch);
        self.gesture_baseline = None;
        let label = entry.label.clone();
        self.push_undo(entry);
        Some(label)
    }

    fn push_undo(&mut self, entry: JournalEntry<S::Patch>) {
        if self.undo_stack.len() >= self.max_depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(entry);
    }

    pub fn begin_group(&mut self, label: &str, state: &S) {
        if self.groups.is_empty() {
            self.recording = self.suppressed_depth == 0;
        }
        self.groups.push(OpenGroup {
            label: label.to_string(),
            rollback: state.clone(),
        });
    }

    /// Closes a group. Returns true when the outermost group closed and recorded an entry.
    pub fn end_group(&mut self, state: &S) -> bool {
        debug_assert!(!self.groups.is_empty(), "unbalanced end_group");
        let Some(group) = self.groups.pop() else {
            return false;
        };
        if !self.groups.is_empty() || !self.recording {
            return false;
        }

        let before = self.gesture_baseline.take().unwrap_or(group.rollback);
        let Some(patch) = S::diff(&before, state) else {
            debug!(label = %group.label, "undo group made no changes");
            return false;
        };

        debug!(label = %group.label, "undo group recorded");
        self.push_undo(JournalEntry {
            label: group.label,
            patch,
        });
        self.redo_stack.clear();
        true
    }

    /// Closes the innermost group and puts `state` back to where that group began.
    pub fn abort_group(&mut self, state: &mut S) {
        debug_assert!(!self.groups.is_empty(), "unbalanced abort_group");
        if let Some(group) = self.groups.pop() {
            debug!(label = %group.label, "undo group rolled back");
            *state = group.rollback;
        }
    }
}
