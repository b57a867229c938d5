//! Core domain model for the internship directory.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "interndex-core";

pub const PLACEHOLDER_LOGO_URL: &str = "https://via.placeholder.com/100";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StipendKind {
    Paid,
    Unpaid,
}

impl StipendKind {
    pub const ALL: [StipendKind; 2] = [StipendKind::Paid, StipendKind::Unpaid];

    pub fn tag_id(self) -> &'static str {
        match self {
            StipendKind::Paid => "paid",
            StipendKind::Unpaid => "unpaid",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StipendKind::Paid => "Paid",
            StipendKind::Unpaid => "Unpaid",
        }
    }
}

/// Top-level filter axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagCategory {
    Position,
    WorkMode,
    Stipend,
}

impl TagCategory {
    pub const ALL: [TagCategory; 3] = [
        TagCategory::Position,
        TagCategory::WorkMode,
        TagCategory::Stipend,
    ];

    pub fn id(self) -> &'static str {
        match self {
            TagCategory::Position => "position",
            TagCategory::WorkMode => "workMode",
            TagCategory::Stipend => "stipend",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TagCategory::Position => "Positions",
            TagCategory::WorkMode => "Work Mode",
            TagCategory::Stipend => "Stipend",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            TagCategory::Position => "#3B82F6",
            TagCategory::WorkMode => "#A855F7",
            TagCategory::Stipend => "#EAB308",
        }
    }

    /// Lenient parse used for hand-edited sheet cells ("Work Mode", "workmode", "work_mode").
    pub fn parse_loose(input: &str) -> Option<Self> {
        let key: String = input
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "position" | "positions" => Some(TagCategory::Position),
            "workmode" | "mode" => Some(TagCategory::WorkMode),
            "stipend" => Some(TagCategory::Stipend),
            _ => None,
        }
    }
}

/// Closed set of canonical work arrangements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    Onsite,
    Hybrid,
    Remote,
}

impl WorkMode {
    pub fn label(self) -> &'static str {
        match self {
            WorkMode::Onsite => "Onsite 100%",
            WorkMode::Hybrid => "Hybrid",
            WorkMode::Remote => "Remote 100%",
        }
    }

    pub fn tag_id(self) -> String {
        slugify(self.label())
    }
}

/// Sub-classification of position tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionClass {
    Programmer,
    Artist,
    Designer,
    Other,
}

impl PositionClass {
    pub const ALL: [PositionClass; 4] = [
        PositionClass::Programmer,
        PositionClass::Artist,
        PositionClass::Designer,
        PositionClass::Other,
    ];

    pub fn id(self) -> &'static str {
        match self {
            PositionClass::Programmer => "programmer",
            PositionClass::Artist => "artist",
            PositionClass::Designer => "designer",
            PositionClass::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PositionClass::Programmer => "Programmer",
            PositionClass::Artist => "Artist",
            PositionClass::Designer => "Designer",
            PositionClass::Other => "Other",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            PositionClass::Programmer => "#3B82F6",
            PositionClass::Artist => "#EC4899",
            PositionClass::Designer => "#F59E0B",
            PositionClass::Other => "#71717A",
        }
    }
}

/// Application progress a user assigns to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Saved,
    Applied,
    Interviewing,
    Offered,
    Rejected,
}

impl TrackStatus {
    pub const ALL: [TrackStatus; 5] = [
        TrackStatus::Saved,
        TrackStatus::Applied,
        TrackStatus::Interviewing,
        TrackStatus::Offered,
        TrackStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackStatus::Saved => "saved",
            TrackStatus::Applied => "applied",
            TrackStatus::Interviewing => "interviewing",
            TrackStatus::Offered => "offered",
            TrackStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTrackStatus(pub String);

impl fmt::Display for UnknownTrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown track status `{}`", self.0)
    }
}

impl std::error::Error for UnknownTrackStatus {}

impl FromStr for TrackStatus {
    type Err = UnknownTrackStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        TrackStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| UnknownTrackStatus(s.to_string()))
    }
}

/// One internship opportunity, immutable once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub name: String,
    pub logo_url: String,
    pub positions: Vec<String>,
    pub work_mode: Vec<String>,
    pub stipend: StipendKind,
    pub stipend_amount: String,
    pub location: String,
    #[serde(with = "deadline_format")]
    pub deadline: Option<NaiveDate>,
    pub status: ListingStatus,
    pub requirements: Vec<String>,
    pub email: String,
    pub contact_url: String,
    pub job_post_url: String,
    pub work_hours: String,
    pub notes: String,
}

impl Listing {
    /// Every tag id the listing carries, in display order.
    pub fn tag_ids(&self) -> impl Iterator<Item = &str> {
        self.positions
            .iter()
            .chain(self.work_mode.iter())
            .map(String::as_str)
            .chain(std::iter::once(self.stipend.tag_id()))
    }

    pub fn is_open(&self) -> bool {
        self.status == ListingStatus::Open
    }
}

/// Serializes an optional deadline as `YYYY-MM-DD`, or `""` for "no deadline".
pub mod deadline_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&date.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// One selectable filter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub label: String,
    pub color: String,
    pub category: TagCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_category: Option<PositionClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    pub id: PositionClass,
    pub label: String,
    pub color: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCategory {
    pub id: TagCategory,
    pub label: String,
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_categories: Vec<SubCategory>,
}

impl ConfigCategory {
    pub fn find_tag(&self, id: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id).or_else(|| {
            self.sub_categories
                .iter()
                .flat_map(|sub| sub.tags.iter())
                .find(|t| t.id == id)
        })
    }
}

/// Display labels keyed by (category, tag id); the first label seen for an id wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagLabels {
    labels: HashMap<(TagCategory, String), String>,
}

impl TagLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_first(&mut self, category: TagCategory, id: &str, label: &str) {
        self.labels
            .entry((category, id.to_string()))
            .or_insert_with(|| label.to_string());
    }

    pub fn get(&self, category: TagCategory, id: &str) -> Option<&str> {
        self.labels
            .get(&(category, id.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Look a tag up across every category, including nested sub-categories.
/// Categories are searched in order, so the first dimension claiming an id wins.
pub fn find_tag<'a>(config: &'a [ConfigCategory], id: &str) -> Option<&'a Tag> {
    config.iter().find_map(|category| category.find_tag(id))
}

pub fn category_of(config: &[ConfigCategory], id: &str) -> Option<TagCategory> {
    config
        .iter()
        .find(|category| category.find_tag(id).is_some())
        .map(|category| category.id)
}

/// Lower-case, trim, and collapse whitespace runs to `_`.
pub fn slugify(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
