use log::{debug, info, warn};

use crate::record::{Artwork, Page, RecordId};
use crate::selection::{BulkOutcome, ManualChange, SelectionError, SelectionLedger};
use crate::source::{FetchError, PageSource};
use crate::store::{PersistedState, StateStore};

/// Page count used when neither the config nor the remote source says
/// otherwise.
pub const DEFAULT_TOTAL_PAGES: u32 = 10770;

/// Tags one fetch so a late response for a page the user already left can
/// be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTicket {
    generation: u64,
    page: u32,
}

impl PageTicket {
    pub fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug)]
pub enum PageLoad {
    Loaded { newly_selected: Vec<RecordId> },
    Failed(FetchError),
    Stale,
}

/// Owns the current page, the selection ledger and the store the two are
/// mirrored to.
#[derive(Debug)]
pub struct PageController<S, K> {
    source: S,
    store: K,
    ledger: SelectionLedger,
    current_page: u32,
    total_pages: u32,
    records: Vec<Artwork>,
    loading: bool,
    generation: u64,
}

impl<S, K> PageController<S, K>
where
    S: PageSource,
    K: StateStore,
{
    /// Rehydrates from whatever `store` holds.
    pub fn new(source: S, store: K, total_pages: u32) -> Self {
        let state = PersistedState::load(&store);
        Self::from_state(source, store, state, total_pages)
    }

    pub fn from_state(source: S, store: K, state: PersistedState, total_pages: u32) -> Self {
        let total_pages = total_pages.max(1);
        let ledger = SelectionLedger::from_parts(state.selection, state.pending, state.dismissed);
        info!(
            "restored {} selected rows, {} pending, page {}",
            ledger.len(),
            ledger.pending(),
            state.current_page
        );
        Self {
            source,
            store,
            ledger,
            current_page: state.current_page.clamp(1, total_pages),
            total_pages,
            records: Vec::new(),
            loading: false,
            generation: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn ledger(&self) -> &SelectionLedger {
        &self.ledger
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn records(&self) -> &[Artwork] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn pending(&self) -> u32 {
        self.ledger.pending()
    }

    pub fn clamp_page(&self, index: u32) -> u32 {
        index.clamp(1, self.total_pages)
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            selection: self.ledger.records().cloned().collect(),
            pending: self.ledger.pending(),
            current_page: self.current_page,
            dismissed: self.ledger.dismissed().collect(),
        }
    }

    /// Fetches `index` (clamped) and reconciles the pending count against it.
    pub async fn go_to_page(&mut self, index: u32) -> PageLoad {
        let ticket = self.begin_page_change(index);
        let result = self.source.fetch_page(ticket.page).await;
        self.complete_page_fetch(ticket, result)
    }

    /// Index of the following page, clamped to the last one.
    pub fn next_index(&self) -> u32 {
        self.clamp_page(self.current_page.saturating_add(1))
    }

    pub fn previous_index(&self) -> u32 {
        self.clamp_page(self.current_page.saturating_sub(1))
    }

    /// Moves to `index` and marks a fetch as outstanding. Any ticket handed
    /// out earlier becomes stale.
    pub fn begin_page_change(&mut self, index: u32) -> PageTicket {
        let page = self.clamp_page(index);
        if page != index {
            debug!("page {index} clamped to {page}");
        }
        self.current_page = page;
        self.records.clear();
        self.loading = true;
        self.generation += 1;
        self.persist();
        PageTicket {
            generation: self.generation,
            page,
        }
    }

    pub fn complete_page_fetch(
        &mut self,
        ticket: PageTicket,
        result: Result<Page, FetchError>,
    ) -> PageLoad {
        if ticket.generation != self.generation {
            debug!(
                "dropping stale response for page {} (now on page {})",
                ticket.page, self.current_page
            );
            return PageLoad::Stale;
        }
        self.loading = false;

        match result {
            Ok(page) => {
                if let Some(total) = page.total_pages {
                    self.total_pages = total.max(1);
                    self.current_page = self.current_page.min(self.total_pages);
                }
                self.records = page.records;
                let newly_selected = self.ledger.reconcile_on_page_load(&self.records);
                if !newly_selected.is_empty() {
                    info!(
                        "page {} selected {} rows, {} still pending",
                        ticket.page,
                        newly_selected.len(),
                        self.ledger.pending()
                    );
                }
                self.persist();
                PageLoad::Loaded { newly_selected }
            }
            Err(e) => {
                warn!("failed to fetch page {}: {e}", ticket.page);
                self.records.clear();
                PageLoad::Failed(e)
            }
        }
    }

    /// Bulk selection against the rows currently loaded.
    pub fn request_bulk_select(&mut self, count: u32) -> Result<BulkOutcome, SelectionError> {
        let outcome = self.ledger.request_bulk_select(&self.records, count)?;
        info!(
            "bulk select of {count}: {} rows now, {} pending",
            outcome.newly_selected.len(),
            outcome.pending
        );
        self.persist();
        Ok(outcome)
    }

    /// Replaces the selection for the visible page only.
    pub fn set_manual_selection(&mut self, selected: Vec<Artwork>) -> ManualChange {
        let change = self.ledger.set_manual_selection(&self.records, selected);
        if !change.is_empty() {
            self.persist();
        }
        change
    }

    /// Flips a row on the current page, or deselects a row selected on any
    /// page. Returns `None` when the id is neither.
    pub fn toggle(&mut self, id: RecordId) -> Option<bool> {
        let record = self
            .records
            .iter()
            .find(|r| r.id == id)
            .or_else(|| self.ledger.records().find(|r| r.id == id))
            .cloned()?;
        let selected = self.ledger.toggle(&record);
        self.persist();
        Some(selected)
    }

    pub fn clear_selection(&mut self) {
        self.ledger.clear();
        self.persist();
    }

    fn persist(&mut self) {
        if let Err(e) = self.snapshot().save(&mut self.store) {
            warn!("failed to persist state: {e}");
        }
    }
}
