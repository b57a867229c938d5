//! Positional column layout of the internships sheet and the row normalizer built on it.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use interndex_core::{
    slugify, Listing, ListingStatus, StipendKind, TagCategory, TagLabels, WorkMode,
    PLACEHOLDER_LOGO_URL,
};
use thiserror::Error;
use tracing::debug;

use crate::{cell_at, RawCell, SheetTable};

/// Stipend cell value meaning "has stipend".
pub const STIPEND_MARKER: &str = "มี";
pub const OPEN_MARKER: &str = "Open";

const UNKNOWN_NAME: &str = "Unknown";
const NO_AMOUNT: &str = "-";
const NO_CONTACT: &str = "#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingField {
    Id,
    Name,
    Logo,
    Positions,
    WorkMode,
    Stipend,
    StipendAmount,
    Location,
    Deadline,
    ContactUrl,
    Notes,
    Status,
    JobPostUrl,
    WorkHours,
    Email,
    Requirements,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub index: usize,
    pub field: ListingField,
    pub parse: fn(&mut RowBuilder, &RawCell),
}

const INTERNSHIP_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec { index: 0, field: ListingField::Id, parse: parse_id },
    ColumnSpec { index: 1, field: ListingField::Name, parse: parse_name },
    ColumnSpec { index: 2, field: ListingField::Logo, parse: parse_logo },
    ColumnSpec { index: 3, field: ListingField::Positions, parse: parse_positions },
    ColumnSpec { index: 4, field: ListingField::WorkMode, parse: parse_work_mode },
    ColumnSpec { index: 5, field: ListingField::Stipend, parse: parse_stipend },
    ColumnSpec { index: 6, field: ListingField::StipendAmount, parse: parse_amount },
    ColumnSpec { index: 7, field: ListingField::Location, parse: parse_location },
    ColumnSpec { index: 8, field: ListingField::Deadline, parse: parse_deadline_cell },
    ColumnSpec { index: 9, field: ListingField::ContactUrl, parse: parse_contact_url },
    ColumnSpec { index: 10, field: ListingField::Notes, parse: parse_notes },
    ColumnSpec { index: 11, field: ListingField::Status, parse: parse_status },
    ColumnSpec { index: 12, field: ListingField::JobPostUrl, parse: parse_job_post_url },
    ColumnSpec { index: 13, field: ListingField::WorkHours, parse: parse_work_hours },
    ColumnSpec { index: 14, field: ListingField::Email, parse: parse_email },
    ColumnSpec { index: 15, field: ListingField::Requirements, parse: parse_requirements },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("column {0} is mapped more than once")]
    DuplicateIndex(usize),
    #[error("field {0:?} is mapped more than once")]
    DuplicateField(ListingField),
    #[error("layout has no column for required field {0:?}")]
    MissingField(ListingField),
}

/// Validated mapping from column position to listing field.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    columns: Vec<ColumnSpec>,
}

impl ColumnLayout {
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, LayoutError> {
        let mut indices = HashSet::new();
        let mut fields = HashSet::new();
        for column in &columns {
            if !indices.insert(column.index) {
                return Err(LayoutError::DuplicateIndex(column.index));
            }
            if !fields.insert(column.field) {
                return Err(LayoutError::DuplicateField(column.field));
            }
        }
        for required in [ListingField::Id, ListingField::Name] {
            if !fields.contains(&required) {
                return Err(LayoutError::MissingField(required));
            }
        }
        Ok(Self { columns })
    }

    pub fn internships() -> Result<Self, LayoutError> {
        Self::new(INTERNSHIP_COLUMNS.to_vec())
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }
}

/// Accumulates one listing while the layout's parsers run over a row.
#[derive(Debug, Clone)]
pub struct RowBuilder {
    listing: Listing,
    labels: Vec<(TagCategory, String, String)>,
}

impl RowBuilder {
    fn new() -> Self {
        Self {
            listing: Listing {
                id: String::new(),
                name: UNKNOWN_NAME.to_string(),
                logo_url: PLACEHOLDER_LOGO_URL.to_string(),
                positions: Vec::new(),
                work_mode: Vec::new(),
                stipend: StipendKind::Unpaid,
                stipend_amount: NO_AMOUNT.to_string(),
                location: String::new(),
                deadline: None,
                status: ListingStatus::Closed,
                requirements: Vec::new(),
                email: String::new(),
                contact_url: NO_CONTACT.to_string(),
                job_post_url: String::new(),
                work_hours: String::new(),
                notes: String::new(),
            },
            labels: Vec::new(),
        }
    }
}

/// A normalized listing plus the display labels its tag ids were derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    pub listing: Listing,
    pub labels: Vec<(TagCategory, String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedSheet {
    pub listings: Vec<Listing>,
    pub labels: TagLabels,
}

/// Pure: the same row and index always produce the same listing.
pub fn normalize_row(layout: &ColumnLayout, row: &[RawCell], index: usize) -> NormalizedRow {
    let mut builder = RowBuilder::new();
    for column in layout.columns() {
        (column.parse)(&mut builder, cell_at(row, column.index));
    }
    if builder.listing.id.is_empty() {
        builder.listing.id = index.to_string();
    }
    NormalizedRow {
        listing: builder.listing,
        labels: builder.labels,
    }
}

pub fn normalize_table(layout: &ColumnLayout, table: &SheetTable) -> NormalizedSheet {
    let mut sheet = NormalizedSheet::default();
    for (index, row) in table.rows.iter().enumerate() {
        let normalized = normalize_row(layout, row, index);
        for (category, id, label) in &normalized.labels {
            sheet.labels.insert_first(*category, id, label);
        }
        sheet.listings.push(normalized.listing);
    }
    debug!(rows = table.len(), listings = sheet.listings.len(), "normalized sheet");
    sheet
}

fn text_or(cell: &RawCell, default: &str) -> String {
    cell.as_text().unwrap_or_else(|| default.to_string())
}

fn parse_id(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.id = cell.as_text().unwrap_or_default();
}

fn parse_name(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.name = text_or(cell, UNKNOWN_NAME);
}

fn parse_logo(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.logo_url = text_or(cell, PLACEHOLDER_LOGO_URL);
}

fn parse_positions(b: &mut RowBuilder, cell: &RawCell) {
    let Some(text) = cell.as_text() else {
        return;
    };
    for token in text.split(',') {
        let label = token.trim();
        if label.is_empty() {
            continue;
        }
        let id = slugify(label);
        if b.listing.positions.contains(&id) {
            continue;
        }
        b.labels
            .push((TagCategory::Position, id.clone(), label.to_string()));
        b.listing.positions.push(id);
    }
}

fn parse_work_mode(b: &mut RowBuilder, cell: &RawCell) {
    let Some(text) = cell.as_text() else {
        return;
    };
    match canonical_work_mode(&text) {
        Some(mode) => {
            let id = mode.tag_id();
            b.labels
                .push((TagCategory::WorkMode, id.clone(), mode.label().to_string()));
            b.listing.work_mode.push(id);
        }
        None => debug!(value = %text, "unrecognized work mode"),
    }
}

/// Fold free text onto the canonical work modes. Hybrid is checked first since
/// hybrid descriptions often mention remote days.
pub fn canonical_work_mode(text: &str) -> Option<WorkMode> {
    const HYBRID: &[&str] = &["hybrid"];
    const REMOTE: &[&str] = &["remote", "wfh", "work from home", "online"];
    const ONSITE: &[&str] = &["onsite", "on-site", "on site", "office", "in person", "in-person"];

    let lower = text.to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
    if hit(HYBRID) {
        Some(WorkMode::Hybrid)
    } else if hit(REMOTE) {
        Some(WorkMode::Remote)
    } else if hit(ONSITE) {
        Some(WorkMode::Onsite)
    } else {
        None
    }
}

fn parse_stipend(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.stipend = match cell.as_text() {
        Some(text) if text == STIPEND_MARKER => StipendKind::Paid,
        _ => StipendKind::Unpaid,
    };
}

fn parse_amount(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.stipend_amount = text_or(cell, NO_AMOUNT);
}

fn parse_location(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.location = text_or(cell, "");
}

fn parse_deadline_cell(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.deadline = parse_deadline(cell);
}

/// Accepts a native date, `YYYY-MM-DD`, `YYYY/MM/DD`, an RFC 3339 timestamp, or
/// the gviz `Date(Y,M,D[,h,m,s])` wrapper with a zero-based month.
pub fn parse_deadline(cell: &RawCell) -> Option<NaiveDate> {
    let text = match cell {
        RawCell::Date(date) => return Some(*date),
        RawCell::Text(text) => text.trim(),
        RawCell::Empty => return None,
        other => {
            debug!(cell = ?other, "deadline cell is not a date");
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }

    let parsed = parse_gviz_date(text)
        .or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(text, "%Y/%m/%d").ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            text.get(..10)
                .filter(|_| matches!(text.as_bytes().get(10), Some(b'T') | Some(b' ')))
                .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        });
    if parsed.is_none() {
        debug!(value = text, "unparseable deadline");
    }
    parsed
}

fn parse_gviz_date(text: &str) -> Option<NaiveDate> {
    let inner = text.strip_prefix("Date(")?.strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<i64>());
    let year = parts.next()?.ok()?;
    let month_zero_based = parts.next()?.ok()?;
    let day = parts.next()?.ok()?;
    NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month_zero_based.checked_add(1)?).ok()?,
        u32::try_from(day).ok()?,
    )
}

fn parse_contact_url(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.contact_url = text_or(cell, NO_CONTACT);
}

fn parse_notes(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.notes = text_or(cell, "");
}

fn parse_status(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.status = match cell.as_text() {
        Some(text) if text == OPEN_MARKER => ListingStatus::Open,
        _ => ListingStatus::Closed,
    };
}

fn parse_job_post_url(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.job_post_url = text_or(cell, "");
}

fn parse_work_hours(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.work_hours = text_or(cell, "");
}

fn parse_email(b: &mut RowBuilder, cell: &RawCell) {
    b.listing.email = text_or(cell, "");
}

fn parse_requirements(b: &mut RowBuilder, cell: &RawCell) {
    let Some(text) = cell.as_text() else {
        return;
    };
    b.listing.requirements = text
        .split(['\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ColumnLayout {
        ColumnLayout::internships().expect("built-in layout is valid")
    }

    fn row(cells: &[&str]) -> Vec<RawCell> {
        cells
            .iter()
            .map(|c| if c.is_empty() { RawCell::Empty } else { RawCell::from(*c) })
            .collect()
    }

    #[test]
    fn blank_row_falls_back_to_defaults() {
        let normalized = normalize_row(&layout(), &[], 7);
        let listing = normalized.listing;
        assert_eq!(listing.id, "7");
        assert_eq!(listing.name, "Unknown");
        assert_eq!(listing.logo_url, PLACEHOLDER_LOGO_URL);
        assert_eq!(listing.stipend, StipendKind::Unpaid);
        assert_eq!(listing.stipend_amount, "-");
        assert_eq!(listing.status, ListingStatus::Closed);
        assert_eq!(listing.contact_url, "#");
        assert_eq!(listing.deadline, None);
        assert!(listing.positions.is_empty());
        assert!(listing.work_mode.is_empty());
        assert!(normalized.labels.is_empty());
    }

    #[test]
    fn full_row_maps_every_column() {
        let cells = row(&[
            "12",
            " PixelForge Studios ",
            "https://img.test/pf.png",
            "Game Dev, 2D/3D  Artist,, game dev",
            "WFH all week",
            "มี",
            "15,000 THB/month",
            "Bangkok",
            "Date(2026,3,15)",
            "https://pf.test/apply",
            "Great mentors",
            "Open",
            "https://pf.test/post",
            "09:00-18:00",
            "hr@pf.test",
            "Unity\nPortfolio; C#",
        ]);
        let normalized = normalize_row(&layout(), &cells, 0);
        let l = &normalized.listing;
        assert_eq!(l.id, "12");
        assert_eq!(l.name, "PixelForge Studios");
        assert_eq!(l.positions, vec!["game_dev", "2d/3d_artist"]);
        assert_eq!(l.work_mode, vec!["remote_100%"]);
        assert_eq!(l.stipend, StipendKind::Paid);
        assert_eq!(l.stipend_amount, "15,000 THB/month");
        assert_eq!(l.location, "Bangkok");
        assert_eq!(l.deadline, NaiveDate::from_ymd_opt(2026, 4, 15));
        assert_eq!(l.status, ListingStatus::Open);
        assert_eq!(l.requirements, vec!["Unity", "Portfolio", "C#"]);
        assert_eq!(l.email, "hr@pf.test");
        assert_eq!(
            normalized.labels,
            vec![
                (TagCategory::Position, "game_dev".into(), "Game Dev".into()),
                (TagCategory::Position, "2d/3d_artist".into(), "2D/3D  Artist".into()),
                (TagCategory::WorkMode, "remote_100%".into(), "Remote 100%".into()),
            ]
        );
    }

    #[test]
    fn stipend_marker_must_match_exactly() {
        let mut cells = row(&["1", "A", "", "", "", "ไม่มี"]);
        assert_eq!(normalize_row(&layout(), &cells, 0).listing.stipend, StipendKind::Unpaid);
        cells[5] = RawCell::from("มี");
        assert_eq!(normalize_row(&layout(), &cells, 0).listing.stipend, StipendKind::Paid);
        cells[5] = RawCell::Empty;
        assert_eq!(normalize_row(&layout(), &cells, 0).listing.stipend, StipendKind::Unpaid);
    }

    #[test]
    fn status_is_closed_unless_exactly_open() {
        let cells = row(&["1", "A", "", "", "", "", "", "", "", "", "", "open"]);
        assert_eq!(normalize_row(&layout(), &cells, 0).listing.status, ListingStatus::Closed);
    }

    #[test]
    fn work_mode_keywords_fold_to_canonical_labels() {
        assert_eq!(canonical_work_mode("Remote"), Some(WorkMode::Remote));
        assert_eq!(canonical_work_mode("wfh"), Some(WorkMode::Remote));
        assert_eq!(canonical_work_mode("Hybrid (remote Fridays)"), Some(WorkMode::Hybrid));
        assert_eq!(canonical_work_mode("On-site at HQ"), Some(WorkMode::Onsite));
        assert_eq!(canonical_work_mode("Onsite 100%"), Some(WorkMode::Onsite));
        assert_eq!(canonical_work_mode("flexible"), None);
    }

    #[test]
    fn deadline_formats_normalize_to_dates() {
        let d = NaiveDate::from_ymd_opt(2026, 3, 10);
        assert_eq!(parse_deadline(&RawCell::from("2026-03-10")), d);
        assert_eq!(parse_deadline(&RawCell::from("2026/03/10")), d);
        assert_eq!(parse_deadline(&RawCell::from("Date(2026,2,10)")), d);
        assert_eq!(parse_deadline(&RawCell::from("Date(2026,2,10,23,59,0)")), d);
        assert_eq!(parse_deadline(&RawCell::from("2026-03-10T00:00:00Z")), d);
        assert_eq!(parse_deadline(&RawCell::from("2026-03-10 18:00")), d);
        assert_eq!(parse_deadline(&RawCell::Date(d.unwrap())), d);
        assert_eq!(parse_deadline(&RawCell::from("Date(2026,13,40)")), None);
        assert_eq!(parse_deadline(&RawCell::from("next friday")), None);
        assert_eq!(parse_deadline(&RawCell::Number(46091.0)), None);
        assert_eq!(parse_deadline(&RawCell::Empty), None);
    }

    #[test]
    fn out_of_range_gviz_date_leaves_deadline_empty() {
        let mut cells = row(&["4", "Overflow Games"]);
        cells.resize(9, RawCell::Empty);
        cells[8] = RawCell::from("Date(2026,9223372036854775807,1)");
        let listing = normalize_row(&layout(), &cells, 0).listing;
        assert_eq!(listing.deadline, None);
        assert_eq!(listing.name, "Overflow Games");

        assert_eq!(parse_deadline(&RawCell::from("Date(99999999999,0,1)")), None);
        assert_eq!(parse_deadline(&RawCell::from("Date(2026,-1,1)")), None);
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let cells = row(&["", "Studio", "", "QA Tester", "hybrid", "มี", "", "", "2026-05-01"]);
        let a = normalize_row(&layout(), &cells, 3);
        let b = normalize_row(&layout(), &cells, 3);
        assert_eq!(a, b);
        assert_eq!(a.listing.id, "3");
    }

    #[test]
    fn layout_validation_rejects_bad_tables() {
        let mut cols = INTERNSHIP_COLUMNS.to_vec();
        cols[1].index = 0;
        assert_eq!(ColumnLayout::new(cols).unwrap_err(), LayoutError::DuplicateIndex(0));

        let cols = INTERNSHIP_COLUMNS
            .iter()
            .copied()
            .filter(|c| c.field != ListingField::Name)
            .collect();
        assert_eq!(
            ColumnLayout::new(cols).unwrap_err(),
            LayoutError::MissingField(ListingField::Name)
        );
    }

    #[test]
    fn table_labels_keep_first_spelling() {
        let table = SheetTable::new(vec![
            row(&["1", "A", "", "Game Dev"]),
            row(&["2", "B", "", "game   dev, Artist"]),
        ]);
        let sheet = normalize_table(&layout(), &table);
        assert_eq!(sheet.listings.len(), 2);
        assert_eq!(sheet.labels.get(TagCategory::Position, "game_dev"), Some("Game Dev"));
        assert_eq!(sheet.labels.get(TagCategory::Position, "artist"), Some("Artist"));
    }
}
