//! Pure filter/sort derivation plus the small display helpers built on it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use interndex_core::{
    category_of, find_tag, ConfigCategory, Listing, StipendKind, Tag, TagCategory, TrackStatus,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Deadline,
    Stipend,
    Tracked,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Deadline => "deadline",
            SortKey::Stipend => "stipend",
            SortKey::Tracked => "tracked",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deadline" => Ok(SortKey::Deadline),
            "stipend" => Ok(SortKey::Stipend),
            "tracked" | "status" => Ok(SortKey::Tracked),
            other => Err(format!("unknown sort key `{other}` (deadline, stipend, tracked)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub query: String,
    pub selected_tags: Vec<String>,
    pub sort: SortKey,
    pub tracked_only: bool,
}

/// `sort(filter(listings))` with every active filter ANDed together.
///
/// Selected tag ids are grouped by the dimension the config assigns them to.
/// Position and work-mode groups match when the listing carries any selected id;
/// the stipend group matches when the listing's single stipend tag is selected.
/// Ids the config does not know are ignored.
pub fn derive_view<'a>(
    listings: &'a [Listing],
    config: &[ConfigCategory],
    query: &ViewQuery,
    tracked: &BTreeMap<String, TrackStatus>,
) -> Vec<&'a Listing> {
    let needle = query.query.to_lowercase();

    let mut selected: HashMap<TagCategory, HashSet<&str>> = HashMap::new();
    for id in &query.selected_tags {
        match category_of(config, id) {
            Some(category) => {
                selected.entry(category).or_default().insert(id.as_str());
            }
            None => debug!(tag = %id, "ignoring unknown tag id"),
        }
    }

    let mut visible: Vec<&Listing> = listings
        .iter()
        .filter(|l| needle.is_empty() || l.name.to_lowercase().contains(&needle))
        .filter(|l| {
            selected.iter().all(|(category, ids)| match category {
                TagCategory::Position => l.positions.iter().any(|p| ids.contains(p.as_str())),
                TagCategory::WorkMode => l.work_mode.iter().any(|m| ids.contains(m.as_str())),
                TagCategory::Stipend => ids.contains(l.stipend.tag_id()),
            })
        })
        .filter(|l| !query.tracked_only || tracked.contains_key(&l.id))
        .collect();

    // `sort_by` is stable, so equal keys keep sheet order.
    match query.sort {
        SortKey::Deadline => visible.sort_by(|a, b| by_deadline(a, b)),
        SortKey::Stipend => visible.sort_by(|a, b| {
            stipend_amount_value(&b.stipend_amount)
                .cmp(&stipend_amount_value(&a.stipend_amount))
                .then_with(|| stipend_rank(a.stipend).cmp(&stipend_rank(b.stipend)))
                .then_with(|| by_deadline(a, b))
        }),
        SortKey::Tracked => visible.sort_by(|a, b| {
            let a_tracked = tracked.contains_key(&a.id);
            let b_tracked = tracked.contains_key(&b.id);
            b_tracked.cmp(&a_tracked).then_with(|| by_deadline(a, b))
        }),
    }
    visible
}

/// Dated listings first, ascending; undated ones after, in their existing order.
fn by_deadline(a: &Listing, b: &Listing) -> Ordering {
    match (a.deadline, b.deadline) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn stipend_rank(kind: StipendKind) -> u8 {
    match kind {
        StipendKind::Paid => 0,
        StipendKind::Unpaid => 1,
    }
}

/// Digits of the display string read as one number; `0` when there are none.
/// Saturates at `u64::MAX` so oversized amounts still sort first.
pub fn stipend_amount_value(display: &str) -> u64 {
    display
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d)))
}

pub fn days_left(deadline: NaiveDate, today: NaiveDate) -> i64 {
    (deadline - today).num_days()
}

pub fn deadline_text(deadline: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(deadline) = deadline else {
        return "No deadline".to_string();
    };
    match days_left(deadline, today) {
        d if d < 0 => "Deadline passed".to_string(),
        0 => "Ends today".to_string(),
        1 => "1 day left".to_string(),
        d => format!("{d} days left"),
    }
}

pub const FEATURED_LIMIT: usize = 4;
pub const CLOSING_SOON_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeaturedMode {
    Closing,
    Stipend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Featured<'a> {
    pub mode: FeaturedMode,
    pub listings: Vec<&'a Listing>,
}

/// Open listings closing within two weeks, soonest first; otherwise the first
/// open paid listings. `None` when neither group has anything to show.
pub fn featured(listings: &[Listing], today: NaiveDate) -> Option<Featured<'_>> {
    let open: Vec<&Listing> = listings.iter().filter(|l| l.is_open()).collect();

    let mut closing: Vec<(i64, &Listing)> = open
        .iter()
        .filter_map(|l| {
            let days = days_left(l.deadline?, today);
            (0..=CLOSING_SOON_DAYS).contains(&days).then_some((days, *l))
        })
        .collect();
    closing.sort_by_key(|(days, _)| *days);

    let (mode, picked): (FeaturedMode, Vec<&Listing>) = if closing.is_empty() {
        (
            FeaturedMode::Stipend,
            open.into_iter()
                .filter(|l| l.stipend == StipendKind::Paid)
                .take(FEATURED_LIMIT)
                .collect(),
        )
    } else {
        (
            FeaturedMode::Closing,
            closing
                .into_iter()
                .take(FEATURED_LIMIT)
                .map(|(_, l)| l)
                .collect(),
        )
    };

    (!picked.is_empty()).then_some(Featured {
        mode,
        listings: picked,
    })
}

/// A listing resolved against the filter configuration for a detail panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail<'a> {
    pub listing: &'a Listing,
    pub tags: Vec<&'a Tag>,
    pub tracked: Option<TrackStatus>,
    pub deadline_text: String,
}

pub fn listing_detail<'a>(
    listing: &'a Listing,
    config: &'a [ConfigCategory],
    tracked: Option<TrackStatus>,
    today: NaiveDate,
) -> ListingDetail<'a> {
    ListingDetail {
        listing,
        tags: listing.tag_ids().filter_map(|id| find_tag(config, id)).collect(),
        tracked,
        deadline_text: deadline_text(listing.deadline, today),
    }
}
