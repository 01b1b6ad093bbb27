use std::collections::{BTreeMap, BTreeSet, HashSet};

use thiserror::Error;

use crate::record::{Artwork, RecordId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("requested row count must be positive")]
    NonPositiveCount,
}

/// Result of an explicit bulk request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Ids added by this call, in fetch order.
    pub newly_selected: Vec<RecordId>,
    /// Rows still owed by pages not loaded yet.
    pub pending: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManualChange {
    pub added: Vec<RecordId>,
    pub removed: Vec<RecordId>,
}

impl ManualChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Cross-page selection state.
///
/// Holds the selected records keyed by identity and the number of rows a
/// bulk request still expects from pages that have not been loaded. The
/// counter is plain state rather than a pending continuation so it can be
/// persisted and resumed after a restart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionLedger {
    selected: BTreeMap<RecordId, Artwork>,
    pending: u32,
    dismissed: BTreeSet<RecordId>,
}

impl SelectionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        selected: impl IntoIterator<Item = Artwork>,
        pending: u32,
        dismissed: impl IntoIterator<Item = RecordId>,
    ) -> Self {
        let selected: BTreeMap<RecordId, Artwork> =
            selected.into_iter().map(|r| (r.id, r)).collect();
        // A record can't be both selected and dismissed.
        let dismissed = dismissed
            .into_iter()
            .filter(|id| !selected.contains_key(id))
            .collect();
        Self {
            selected,
            pending,
            dismissed,
        }
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_selected(&self, id: RecordId) -> bool {
        self.selected.contains_key(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Artwork> {
        self.selected.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.selected.keys().copied()
    }

    pub fn dismissed(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.dismissed.iter().copied()
    }

    /// Selects up to `requested` not-yet-selected rows from `candidates` and
    /// remembers the shortfall for later pages.
    ///
    /// A new request overrides any earlier manual deselections and replaces
    /// the previous pending count.
    pub fn request_bulk_select(
        &mut self,
        candidates: &[Artwork],
        requested: u32,
    ) -> Result<BulkOutcome, SelectionError> {
        if requested == 0 {
            return Err(SelectionError::NonPositiveCount);
        }
        self.dismissed.clear();
        let newly_selected = self.take_unselected(candidates, requested);
        self.pending = requested.saturating_sub(newly_selected.len() as u32);
        Ok(BulkOutcome {
            newly_selected,
            pending: self.pending,
        })
    }

    /// Applies the pending count against a freshly fetched page. Returns the
    /// ids selected by this page, empty when nothing was pending.
    pub fn reconcile_on_page_load(&mut self, fetched: &[Artwork]) -> Vec<RecordId> {
        if self.pending == 0 {
            return Vec::new();
        }
        let taken = self.take_unselected(fetched, self.pending);
        self.pending = self.pending.saturating_sub(taken.len() as u32);
        taken
    }

    /// Replaces the selection restricted to `visible` with `selected`.
    ///
    /// Selections outside `visible` are kept, so a presentation layer that
    /// only knows about the rows on screen can't drop other pages' rows.
    pub fn set_manual_selection(
        &mut self,
        visible: &[Artwork],
        selected: impl IntoIterator<Item = Artwork>,
    ) -> ManualChange {
        let selected: Vec<Artwork> = selected.into_iter().collect();
        let keep: HashSet<RecordId> = selected.iter().map(|r| r.id).collect();

        let mut change = ManualChange::default();
        for record in visible {
            if !keep.contains(&record.id) && self.selected.remove(&record.id).is_some() {
                self.dismissed.insert(record.id);
                change.removed.push(record.id);
            }
        }
        for record in selected {
            self.dismissed.remove(&record.id);
            let id = record.id;
            if self.selected.insert(id, record).is_none() {
                change.added.push(id);
            }
        }
        change
    }

    /// Flips one row. Returns whether the row is selected afterwards.
    pub fn toggle(&mut self, record: &Artwork) -> bool {
        if self.selected.remove(&record.id).is_some() {
            self.dismissed.insert(record.id);
            false
        } else {
            self.dismissed.remove(&record.id);
            self.selected.insert(record.id, record.clone());
            true
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.dismissed.clear();
        self.pending = 0;
    }

    fn take_unselected(&mut self, candidates: &[Artwork], quota: u32) -> Vec<RecordId> {
        let mut taken = Vec::new();
        for record in candidates {
            if taken.len() as u32 >= quota {
                break;
            }
            if self.selected.contains_key(&record.id) || self.dismissed.contains(&record.id) {
                continue;
            }
            self.selected.insert(record.id, record.clone());
            taken.push(record.id);
        }
        taken
    }
}
