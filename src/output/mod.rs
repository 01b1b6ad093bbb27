use colored::Colorize;
use serde::Serialize;

use crate::record::{Artwork, RecordId};
use crate::selection::SelectionLedger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" | "table" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// What the table shows for one loaded page.
#[derive(Clone, Debug, Serialize)]
pub struct PageView {
    pub page: u32,
    pub total_pages: u32,
    pub selected_total: usize,
    pub pending: u32,
    pub rows: Vec<RowView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RowView {
    pub selected: bool,
    pub id: RecordId,
    pub title: String,
    pub place_of_origin: String,
    pub artist_display: String,
    pub inscriptions: String,
    pub date_start: Option<i64>,
    pub date_end: Option<i64>,
}

impl RowView {
    fn new(record: &Artwork, selected: bool) -> Self {
        Self {
            selected,
            id: record.id,
            title: record.display_title().to_string(),
            place_of_origin: record.place_of_origin.clone().unwrap_or_default(),
            artist_display: record.artist_display.clone().unwrap_or_default(),
            inscriptions: record.inscriptions.clone().unwrap_or_default(),
            date_start: record.date_start,
            date_end: record.date_end,
        }
    }
}

pub fn build_view(
    records: &[Artwork],
    ledger: &SelectionLedger,
    page: u32,
    total_pages: u32,
) -> PageView {
    PageView {
        page,
        total_pages,
        selected_total: ledger.len(),
        pending: ledger.pending(),
        rows: records
            .iter()
            .map(|r| RowView::new(r, ledger.is_selected(r.id)))
            .collect(),
    }
}

const COLUMNS: [(&str, usize); 7] = [
    ("ID", 8),
    ("Title", 28),
    ("Place of Origin", 16),
    ("Artist", 24),
    ("Inscriptions", 16),
    ("Start", 6),
    ("End", 6),
];

/// Cuts `value` to `width` characters, flattening newlines.
fn fit(value: &str, width: usize) -> String {
    let flat: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let count = flat.chars().count();
    if count <= width {
        return format!("{flat:<width$}");
    }
    let mut cut: String = flat.chars().take(width.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

fn year(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn render_text(view: &PageView) -> String {
    let mut out = String::new();

    let mut header = String::from("[ ]");
    for (name, width) in COLUMNS.iter() {
        header.push(' ');
        header.push_str(&fit(name, *width));
    }
    out.push_str(&header.trim_end().bold().to_string());
    out.push('\n');

    if view.rows.is_empty() {
        out.push_str("No available data\n");
    }

    for row in view.rows.iter() {
        let mark = if row.selected {
            "[x]".green().bold().to_string()
        } else {
            "[ ]".to_string()
        };
        let cells = [
            row.id.to_string(),
            row.title.clone(),
            row.place_of_origin.clone(),
            row.artist_display.clone(),
            row.inscriptions.clone(),
            year(row.date_start),
            year(row.date_end),
        ];
        let mut line = mark;
        for (cell, (_, width)) in cells.iter().zip(COLUMNS.iter()) {
            line.push(' ');
            line.push_str(&fit(cell, *width));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out.push_str(&render_status(view));
    out.push('\n');
    out
}

pub fn render_status(view: &PageView) -> String {
    let mut status = format!(
        ":: page {}/{} :: selected {}",
        view.page, view.total_pages, view.selected_total
    );
    if view.pending > 0 {
        status.push_str(&format!(
            " :: {} more to select from next pages",
            view.pending.to_string().yellow()
        ));
    }
    status
}

pub fn render_json(view: &PageView) -> Vec<u8> {
    serde_json::to_vec_pretty(view).unwrap_or_else(|_| b"{}\n".to_vec())
}

pub fn render(view: &PageView, format: OutputFormat) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(view).into_bytes(),
        OutputFormat::Json => {
            let mut out = render_json(view);
            out.push(b'\n');
            out
        }
    }
}

/// Lists every selected row in id order.
pub fn render_selection(ledger: &SelectionLedger) -> String {
    let mut out = String::new();
    for record in ledger.records() {
        out.push_str(&format!("{:>8}  {}\n", record.id, record.display_title()));
    }
    out.push_str(&format!(":: {} selected", ledger.len()));
    if ledger.pending() > 0 {
        out.push_str(&format!(", {} pending", ledger.pending()));
    }
    out.push('\n');
    out
}
