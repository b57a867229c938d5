//! Spreadsheet source contracts, gviz payload decoding, and row normalization.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use interndex_core::{slugify, TagCategory};
use interndex_storage::{FetchError, HttpFetcher};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

mod layout;

pub use layout::{
    canonical_work_mode, normalize_row, normalize_table, parse_deadline, ColumnLayout, ColumnSpec,
    LayoutError, ListingField, NormalizedRow, NormalizedSheet, RowBuilder, OPEN_MARKER,
    STIPEND_MARKER,
};

pub const CRATE_NAME: &str = "interndex-sheets";

pub const GVIZ_PREFIX: &str = "/*O_o*/\ngoogle.visualization.Query.setResponse(";
pub const GVIZ_SUFFIX: &str = ");";

const DEFAULT_SHEETS_BASE_URL: &str = "https://docs.google.com";

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("payload is not a gviz response wrapper")]
    Wrapper,
    #[error("invalid gviz json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sheet query failed: {0}")]
    Query(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("reading fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid sheet url: {0}")]
    Url(String),
}

/// One scalar spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl RawCell {
    /// Trimmed display text, `None` for blank cells.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            RawCell::Empty => return None,
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Number(n) => format_number(*n),
            RawCell::Bool(b) => b.to_string(),
            RawCell::Date(d) => d.format("%Y-%m-%d").to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) => RawCell::Text(s.clone()),
            JsonValue::Number(n) => n.as_f64().map(RawCell::Number).unwrap_or(RawCell::Empty),
            JsonValue::Bool(b) => RawCell::Bool(*b),
            _ => RawCell::Empty,
        }
    }
}

impl From<&str> for RawCell {
    fn from(value: &str) -> Self {
        RawCell::Text(value.to_string())
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Ordered rows of ordered cells; missing trailing cells read as [`RawCell::Empty`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetTable {
    pub rows: Vec<Vec<RawCell>>,
}

impl SheetTable {
    pub fn new(rows: Vec<Vec<RawCell>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn cell_at(row: &[RawCell], index: usize) -> &RawCell {
    row.get(index).unwrap_or(&RawCell::Empty)
}

/// Strip the fixed gviz prefix/suffix. Falls back to the outermost braces when the wrapper drifts.
pub fn unwrap_gviz_payload(text: &str) -> Result<&str, SheetError> {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix(GVIZ_PREFIX)
        .and_then(|rest| rest.strip_suffix(GVIZ_SUFFIX))
    {
        return Ok(inner);
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&trimmed[start..=end]),
        _ => Err(SheetError::Wrapper),
    }
}

#[derive(Debug, Deserialize)]
struct GvizResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<GvizMessage>,
    #[serde(default)]
    table: Option<GvizTable>,
}

#[derive(Debug, Deserialize)]
struct GvizMessage {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    detailed_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GvizTable {
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Debug, Deserialize)]
struct GvizRow {
    #[serde(default)]
    c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Deserialize)]
struct GvizCell {
    #[serde(default)]
    v: JsonValue,
}

pub fn parse_gviz_table(payload: &str) -> Result<SheetTable, SheetError> {
    let json = unwrap_gviz_payload(payload)?;
    let response: GvizResponse = serde_json::from_str(json)?;

    if response.status.as_deref() == Some("error") {
        let reasons = response
            .errors
            .iter()
            .filter_map(|e| e.detailed_message.as_deref().or(e.reason.as_deref()))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SheetError::Query(if reasons.is_empty() {
            "unknown error".to_string()
        } else {
            reasons
        }));
    }

    let table = response
        .table
        .ok_or_else(|| SheetError::Query("response has no table".to_string()))?;
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            row.c
                .iter()
                .map(|cell| match cell {
                    Some(cell) => RawCell::from_json(&cell.v),
                    None => RawCell::Empty,
                })
                .collect()
        })
        .collect();
    Ok(SheetTable { rows })
}

/// Read-only remote table keyed by sheet tab name.
#[async_trait]
pub trait SheetSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_sheet(&self, sheet_name: &str) -> Result<SheetTable, SheetError>;
}

#[derive(Debug, Clone)]
pub struct GvizSheetSource {
    http: HttpFetcher,
    spreadsheet_id: String,
    base_url: String,
}

impl GvizSheetSource {
    pub fn new(http: HttpFetcher, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            http,
            spreadsheet_id: spreadsheet_id.into(),
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn sheet_url(&self, sheet_name: &str) -> Result<String, SheetError> {
        let base = format!(
            "{}/spreadsheets/d/{}/gviz/tq",
            self.base_url.trim_end_matches('/'),
            self.spreadsheet_id
        );
        let mut url = reqwest_url(&base)?;
        url.query_pairs_mut()
            .append_pair("tqx", "out:json")
            .append_pair("sheet", sheet_name);
        Ok(url.to_string())
    }
}

fn reqwest_url(raw: &str) -> Result<interndex_storage::Url, SheetError> {
    interndex_storage::Url::parse(raw).map_err(|e| SheetError::Url(format!("{raw}: {e}")))
}

#[async_trait]
impl SheetSource for GvizSheetSource {
    fn source_id(&self) -> &'static str {
        "gviz"
    }

    async fn fetch_sheet(&self, sheet_name: &str) -> Result<SheetTable, SheetError> {
        let url = self.sheet_url(sheet_name)?;
        let resp = self.http.fetch_text(&url).await?;
        let table = parse_gviz_table(&resp.body)?;
        debug!(sheet = sheet_name, rows = table.len(), "decoded gviz sheet");
        Ok(table)
    }
}

/// Reads `<root>/<sheet>.txt` gviz payloads captured from the live endpoint.
#[derive(Debug, Clone)]
pub struct FixtureSheetSource {
    root: PathBuf,
}

impl FixtureSheetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payload_path(&self, sheet_name: &str) -> PathBuf {
        self.root.join(format!("{sheet_name}.txt"))
    }
}

#[async_trait]
impl SheetSource for FixtureSheetSource {
    fn source_id(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_sheet(&self, sheet_name: &str) -> Result<SheetTable, SheetError> {
        let path = self.payload_path(sheet_name);
        let text = fs::read_to_string(&path).map_err(|source| SheetError::Fixture {
            path: path.clone(),
            source,
        })?;
        parse_gviz_table(&text)
    }
}

/// One row of the optional Config sheet: `(category, tagName, colorHex, icon)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStyle {
    pub category: TagCategory,
    pub tag_id: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Rows with an unknown category (including a header row) or a blank tag name are skipped.
pub fn parse_config_sheet(table: &SheetTable) -> Vec<TagStyle> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let category = TagCategory::parse_loose(&cell_at(row, 0).as_text()?)?;
            let tag_id = slugify(&cell_at(row, 1).as_text()?);
            if tag_id.is_empty() {
                return None;
            }
            let color = cell_at(row, 2).as_text().and_then(|c| normalize_hex_color(&c));
            let icon = cell_at(row, 3).as_text();
            Some(TagStyle {
                category,
                tag_id,
                color,
                icon,
            })
        })
        .collect()
}

/// Accepts `#RRGGBB` or `RRGGBB`, returning upper-case `#RRGGBB`.
pub fn normalize_hex_color(raw: &str) -> Option<String> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", hex.to_ascii_uppercase()))
    } else {
        None
    }
}
