use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::app::{FetchDone, Flow, Session};
use crate::output::OutputFormat;
use crate::pagination::{PageController, PageLoad, DEFAULT_TOTAL_PAGES};
use crate::record::{Artwork, Page, RecordId, PAGE_SIZE};
use crate::selection::SelectionLedger;
use crate::source::{FetchError, PageSource};
use crate::store::{FileStore, MemoryStore, PersistedState};

/// In-memory page source. Page `n` holds ids `(n-1)*12+1 ..= n*12` unless
/// overridden; listed pages fail with HTTP 503.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedSource {
    failing: HashSet<u32>,
    overrides: HashMap<u32, Vec<u64>>,
    total_pages: Option<u32>,
    calls: Arc<Mutex<Vec<u32>>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, page: u32) -> Self {
        self.failing.insert(page);
        self
    }

    pub(crate) fn with_page(mut self, page: u32, ids: Vec<u64>) -> Self {
        self.overrides.insert(page, ids);
        self
    }

    pub(crate) fn with_total_pages(mut self, total: u32) -> Self {
        self.total_pages = Some(total);
        self
    }

    pub(crate) fn calls(&self) -> Vec<u32> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl PageSource for ScriptedSource {
    async fn fetch_page(&self, page: u32) -> Result<Page, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(page);
        }
        if self.failing.contains(&page) {
            return Err(FetchError::Status { page, status: 503 });
        }
        let ids = self.overrides.get(&page).cloned().unwrap_or_else(|| {
            let first = (page as u64 - 1) * PAGE_SIZE as u64 + 1;
            (first..first + PAGE_SIZE as u64).collect()
        });
        Ok(Page {
            records: ids.into_iter().map(Artwork::with_id).collect(),
            total_pages: self.total_pages,
        })
    }
}

fn controller(source: ScriptedSource) -> PageController<ScriptedSource, MemoryStore> {
    PageController::new(source, MemoryStore::new(), DEFAULT_TOTAL_PAGES)
}

fn ids(range: std::ops::RangeInclusive<u64>) -> Vec<RecordId> {
    range.map(RecordId).collect()
}

fn selected_ids<S, K>(ctl: &PageController<S, K>) -> Vec<RecordId>
where
    S: PageSource,
    K: crate::store::StateStore,
{
    ctl.ledger().ids().collect()
}

#[tokio::test]
async fn bulk_select_larger_than_page_leaves_remainder_pending() {
    let mut ctl = controller(ScriptedSource::new());
    ctl.go_to_page(1).await;
    let outcome = ctl.request_bulk_select(15).unwrap();
    assert_eq!(outcome.newly_selected, ids(1..=12));
    assert_eq!(ctl.pending(), 3);
}

#[tokio::test]
async fn next_page_completes_pending_selection() {
    let mut ctl = controller(ScriptedSource::new());
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(15).unwrap();

    let load = ctl.go_to_page(2).await;
    match load {
        PageLoad::Loaded { newly_selected } => assert_eq!(newly_selected, ids(13..=15)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(ctl.pending(), 0);
    assert_eq!(selected_ids(&ctl), ids(1..=15));
}

#[tokio::test]
async fn second_request_on_same_page_adds_distinct_rows() {
    let mut ctl = controller(ScriptedSource::new());
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(5).unwrap();
    let second = ctl.request_bulk_select(3).unwrap();
    assert_eq!(second.newly_selected, ids(6..=8));
    assert_eq!(second.pending, 0);
    assert_eq!(ctl.ledger().len(), 8);
}

#[tokio::test]
async fn failed_page_shows_nothing_and_keeps_pending() {
    let mut ctl = controller(ScriptedSource::new().failing(3));
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(20).unwrap();
    ctl.go_to_page(3).await;
    assert!(ctl.records().is_empty());
    assert_eq!(ctl.pending(), 8);
    assert_eq!(selected_ids(&ctl), ids(1..=12));

    // the next good page still receives the carried count
    ctl.go_to_page(4).await;
    assert_eq!(ctl.pending(), 0);
    assert_eq!(ctl.ledger().len(), 20);
}

#[tokio::test]
async fn manual_deselect_sticks_through_later_pages() {
    let mut ctl = controller(ScriptedSource::new());
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(14).unwrap();
    let keep: Vec<Artwork> = ctl
        .records()
        .iter()
        .filter(|r| r.id != RecordId(4))
        .cloned()
        .collect();
    let change = ctl.set_manual_selection(keep);
    assert_eq!(change.removed, vec![RecordId(4)]);

    ctl.go_to_page(2).await;
    ctl.go_to_page(1).await;
    assert!(!ctl.ledger().is_selected(RecordId(4)));
    assert_eq!(ctl.ledger().len(), 13);

    // an explicit request may pick it up again
    ctl.request_bulk_select(1).unwrap();
    assert!(ctl.ledger().is_selected(RecordId(4)));
}

#[tokio::test]
async fn manual_selection_keeps_other_pages() {
    let mut ctl = controller(ScriptedSource::new());
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(3).unwrap();
    ctl.go_to_page(2).await;
    // only rows of page 2 are visible; page 1 selections must survive
    let visible = ctl.records()[..2].to_vec();
    ctl.set_manual_selection(visible);
    assert_eq!(
        selected_ids(&ctl),
        vec![RecordId(1), RecordId(2), RecordId(3), RecordId(13), RecordId(14)]
    );
}

#[tokio::test]
async fn selection_spanning_pages_counts_each_id_once() {
    // pages overlap: page 2 repeats two ids from page 1
    let source = ScriptedSource::new()
        .with_page(1, (1..=12).collect())
        .with_page(2, vec![11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22])
        .with_page(3, (23..=34).collect());
    let mut ctl = controller(source);
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(30).unwrap();
    ctl.go_to_page(2).await;
    assert_eq!(ctl.pending(), 8);
    ctl.go_to_page(3).await;
    assert_eq!(ctl.pending(), 0);
    assert_eq!(ctl.ledger().len(), 30);
    assert_eq!(selected_ids(&ctl), ids(1..=30));
}

#[tokio::test]
async fn selection_never_exceeds_distinct_rows_seen() {
    let mut ctl = PageController::new(ScriptedSource::new(), MemoryStore::new(), 2);
    ctl.go_to_page(1).await;
    ctl.request_bulk_select(100).unwrap();
    ctl.go_to_page(2).await;
    // past the end clamps back to page 2, nothing new to take
    ctl.go_to_page(3).await;
    assert_eq!(ctl.ledger().len(), 24);
    assert_eq!(ctl.pending(), 76);
}

#[tokio::test]
async fn conservation_over_request_sizes() {
    for start in [1u32, 2, 5] {
        for n in [1u32, 11, 12, 13, 24, 25, 40] {
            let mut ctl = controller(ScriptedSource::new());
            ctl.go_to_page(start).await;
            // something already selected before the request
            ctl.toggle(ctl.records()[0].id);
            let before: HashSet<RecordId> = ctl.ledger().ids().collect();

            ctl.request_bulk_select(n).unwrap();
            let mut seen: HashSet<RecordId> = ctl.records().iter().map(|r| r.id).collect();
            let mut page = start;
            while ctl.pending() > 0 && page < start + 5 {
                page += 1;
                ctl.go_to_page(page).await;
                seen.extend(ctl.records().iter().map(|r| r.id));
                assert!(ctl.ledger().len() <= before.len() + n as usize);
            }

            let fresh = seen.difference(&before).count();
            let gained = ctl.ledger().len() - before.len();
            assert_eq!(gained, (n as usize).min(fresh), "start={start} n={n}");
            assert_eq!(ctl.pending() as usize, n as usize - gained);
        }
    }
}

#[test]
fn quota_truncation_keeps_fetch_order_prefix() {
    let candidates: Vec<Artwork> = [9u64, 3, 7, 1, 12, 5]
        .into_iter()
        .map(Artwork::with_id)
        .collect();
    for n in 1..=6u32 {
        let mut ledger = SelectionLedger::new();
        let outcome = ledger.request_bulk_select(&candidates, n).unwrap();
        let prefix: Vec<RecordId> = candidates[..n as usize].iter().map(|r| r.id).collect();
        assert_eq!(outcome.newly_selected, prefix);
    }
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let mut ctl = PageController::new(
            ScriptedSource::new(),
            FileStore::open(&path),
            DEFAULT_TOTAL_PAGES,
        );
        ctl.go_to_page(1).await;
        ctl.request_bulk_select(15).unwrap();
        ctl.go_to_page(4).await;
        ctl.toggle(RecordId(38));
    }

    let mut ctl = PageController::new(
        ScriptedSource::new(),
        FileStore::open(&path),
        DEFAULT_TOTAL_PAGES,
    );
    assert_eq!(ctl.current_page(), 4);
    assert_eq!(ctl.pending(), 0);
    assert_eq!(ctl.ledger().len(), 14);
    assert!(!ctl.ledger().is_selected(RecordId(38)));

    assert_eq!(ctl.snapshot().dismissed, vec![RecordId(38)]);
    ctl.go_to_page(4).await;
    assert!(!ctl.ledger().is_selected(RecordId(38)));
}

#[tokio::test]
async fn pending_count_resumes_after_restart() {
    let mut store = MemoryStore::new();
    PersistedState {
        selection: (1..=12).map(Artwork::with_id).collect(),
        pending: 3,
        current_page: 1,
        dismissed: Vec::new(),
    }
    .save(&mut store)
    .unwrap();

    let mut ctl = PageController::new(ScriptedSource::new(), store, DEFAULT_TOTAL_PAGES);
    ctl.go_to_page(2).await;
    assert_eq!(ctl.pending(), 0);
    assert_eq!(selected_ids(&ctl), ids(1..=15));
}

#[tokio::test]
async fn every_mutation_is_persisted() {
    let mut ctl = controller(ScriptedSource::new());
    ctl.go_to_page(2).await;
    assert_eq!(PersistedState::load(ctl.store()), ctl.snapshot());
    ctl.request_bulk_select(20).unwrap();
    assert_eq!(PersistedState::load(ctl.store()), ctl.snapshot());
    ctl.toggle(RecordId(13));
    assert_eq!(PersistedState::load(ctl.store()), ctl.snapshot());
    ctl.go_to_page(3).await;
    let stored = PersistedState::load(ctl.store());
    assert_eq!(stored, ctl.snapshot());
    assert_eq!(stored.pending, 0);
    assert_eq!(stored.current_page, 3);
}

fn session(
    source: ScriptedSource,
) -> (
    Session<ScriptedSource, MemoryStore>,
    tokio::sync::mpsc::Receiver<FetchDone>,
) {
    colored::control::set_override(false);
    Session::new(controller(source), OutputFormat::Text, false)
}

fn text(flow: Flow) -> String {
    match flow {
        Flow::Continue(out) => out,
        Flow::Quit => panic!("unexpected quit"),
    }
}

#[tokio::test]
async fn session_carries_selection_to_next_page() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.open_page(1);
    let out = session.on_fetch_done(rx.recv().await.unwrap()).unwrap();
    assert!(out.contains(":: page 1/10770"));

    let out = text(session.handle_line("select 15"));
    assert!(out.contains("selected 12 rows here, 3 more"));

    assert_eq!(text(session.handle_line("next")), "");
    assert!(session.controller().is_loading());
    let out = session.on_fetch_done(rx.recv().await.unwrap()).unwrap();
    assert!(out.contains("3 more rows selected from this page"));
    assert_eq!(session.controller().pending(), 0);
}

#[tokio::test]
async fn session_refuses_selection_while_loading() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.open_page(1);
    let out = text(session.handle_line("select 5"));
    assert!(out.contains("still loading"));
    assert!(session.controller().ledger().is_empty());

    session.on_fetch_done(rx.recv().await.unwrap());
    text(session.handle_line("select 5"));
    assert_eq!(session.controller().ledger().len(), 5);
}

#[tokio::test]
async fn session_rejects_bad_counts() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.open_page(1);
    session.on_fetch_done(rx.recv().await.unwrap());
    for bad in ["select 0", "select -3", "select many", "select"] {
        let out = text(session.handle_line(bad));
        assert!(out.starts_with("ERR"), "{bad}: {out}");
    }
    assert!(session.controller().ledger().is_empty());
    assert_eq!(session.controller().pending(), 0);
}

#[tokio::test]
async fn session_applies_startup_selection_after_first_page() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.select_after_first_load(15);
    session.open_page(1);
    let out = session.on_fetch_done(rx.recv().await.unwrap()).unwrap();
    assert!(out.contains("selected 12 rows here, 3 more"));
    assert_eq!(session.controller().pending(), 3);
}

#[tokio::test]
async fn session_keep_replaces_visible_rows_only() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.open_page(1);
    session.on_fetch_done(rx.recv().await.unwrap());
    text(session.handle_line("select 5"));

    let out = text(session.handle_line("keep 2,40"));
    assert!(out.contains("not on this page: 40"));
    assert_eq!(session.controller().ledger().len(), 5);

    text(session.handle_line("keep 2 9"));
    assert_eq!(
        session.controller().ledger().ids().collect::<Vec<_>>(),
        vec![RecordId(2), RecordId(9)]
    );
}

#[tokio::test]
async fn session_reports_failed_page() {
    let (mut session, mut rx) = session(ScriptedSource::new().failing(2));
    session.open_page(2);
    let out = session.on_fetch_done(rx.recv().await.unwrap()).unwrap();
    assert!(out.contains("ERR page 2 returned HTTP 503"));
    assert!(out.contains("No available data"));
    assert!(!session.controller().is_loading());
}

#[tokio::test]
async fn session_quits() {
    let (mut session, _rx) = session(ScriptedSource::new());
    assert!(matches!(session.handle_line("quit"), Flow::Quit));
}

#[tokio::test]
async fn session_shows_loading_instead_of_previous_rows() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.open_page(1);
    session.on_fetch_done(rx.recv().await.unwrap());

    text(session.handle_line("next"));
    let out = text(session.handle_line("show"));
    assert!(out.contains("data is loading"), "{out}");
    assert!(out.contains("page 2"));
    assert!(!out.contains("[ ]"));

    let out = session.on_fetch_done(rx.recv().await.unwrap()).unwrap();
    assert!(out.contains(":: page 2/"));
}

#[tokio::test]
async fn session_renders_only_the_latest_page_request() {
    let (mut session, mut rx) = session(ScriptedSource::new());
    session.open_page(1);
    tokio::task::yield_now().await;
    session.open_page(2);
    assert!(session.controller().is_loading());

    let shown = loop {
        let done = rx.recv().await.unwrap();
        let page = done.0.page();
        match session.on_fetch_done(done) {
            Some(out) => {
                assert_eq!(page, 2);
                break out;
            }
            None => {
                assert_eq!(page, 1);
                assert!(session.controller().is_loading());
                assert_eq!(session.controller().current_page(), 2);
            }
        }
    };
    assert!(shown.contains(":: page 2/"));
    assert!(!shown.contains(":: page 1/"));
    assert!(!session.controller().is_loading());
    assert_eq!(session.controller().records()[0].id, RecordId(13));
}
