//! Builds the filter configuration (tags with popularity counts) from a listing set.

use std::collections::{HashMap, HashSet};

use interndex_core::{
    ConfigCategory, Listing, PositionClass, StipendKind, SubCategory, Tag, TagCategory, TagLabels,
};
use interndex_sheets::TagStyle;

use crate::rules::PositionRules;

/// Counts distinct tag ids in first-seen order.
#[derive(Debug, Default)]
struct TagCounter {
    order: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl TagCounter {
    fn add_listing<'a>(&mut self, ids: impl Iterator<Item = &'a String>) {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.index.get(id) {
                Some(&slot) => self.order[slot].1 += 1,
                None => {
                    self.index.insert(id.clone(), self.order.len());
                    self.order.push((id.clone(), 1));
                }
            }
        }
    }

    /// Descending by count; `sort_by` is stable so ties keep first-seen order.
    fn into_sorted(mut self) -> Vec<(String, usize)> {
        self.order.sort_by(|a, b| b.1.cmp(&a.1));
        self.order
    }
}

/// Derive the three filter dimensions in fixed order: position, work mode, stipend.
pub fn aggregate_tags(
    listings: &[Listing],
    labels: &TagLabels,
    rules: &PositionRules,
    styles: &[TagStyle],
) -> Vec<ConfigCategory> {
    let mut positions = TagCounter::default();
    let mut work_modes = TagCounter::default();
    for listing in listings {
        positions.add_listing(listing.positions.iter());
        work_modes.add_listing(listing.work_mode.iter());
    }

    let mut sub_categories: Vec<SubCategory> = PositionClass::ALL
        .iter()
        .map(|class| SubCategory {
            id: *class,
            label: class.label().to_string(),
            color: class.color().to_string(),
            tags: Vec::new(),
        })
        .collect();
    for (id, count) in positions.into_sorted() {
        let mut tag = make_tag(TagCategory::Position, &id, labels, count);
        let class = rules.classify(&tag.label);
        tag.position_category = Some(class);
        if let Some(sub) = sub_categories.iter_mut().find(|sub| sub.id == class) {
            sub.tags.push(tag);
        }
    }
    sub_categories.retain(|sub| !sub.tags.is_empty());

    let work_mode_tags = work_modes
        .into_sorted()
        .into_iter()
        .map(|(id, count)| make_tag(TagCategory::WorkMode, &id, labels, count))
        .collect();

    let stipend_tags = StipendKind::ALL
        .iter()
        .map(|kind| Tag {
            id: kind.tag_id().to_string(),
            label: kind.label().to_string(),
            color: TagCategory::Stipend.color().to_string(),
            category: TagCategory::Stipend,
            position_category: None,
            icon: None,
            count: listings.iter().filter(|l| l.stipend == *kind).count(),
        })
        .collect();

    let mut config = vec![
        ConfigCategory {
            id: TagCategory::Position,
            label: TagCategory::Position.label().to_string(),
            tags: Vec::new(),
            sub_categories,
        },
        ConfigCategory {
            id: TagCategory::WorkMode,
            label: TagCategory::WorkMode.label().to_string(),
            tags: work_mode_tags,
            sub_categories: Vec::new(),
        },
        ConfigCategory {
            id: TagCategory::Stipend,
            label: TagCategory::Stipend.label().to_string(),
            tags: stipend_tags,
            sub_categories: Vec::new(),
        },
    ];
    apply_styles(&mut config, styles);
    config
}

fn make_tag(category: TagCategory, id: &str, labels: &TagLabels, count: usize) -> Tag {
    Tag {
        id: id.to_string(),
        label: labels.get(category, id).unwrap_or(id).to_string(),
        color: category.color().to_string(),
        category,
        position_category: None,
        icon: None,
        count,
    }
}

/// Config-sheet overrides; rows naming an unknown tag are ignored.
fn apply_styles(config: &mut [ConfigCategory], styles: &[TagStyle]) {
    for style in styles {
        let Some(category) = config.iter_mut().find(|c| c.id == style.category) else {
            continue;
        };
        let tag = category
            .tags
            .iter_mut()
            .chain(category.sub_categories.iter_mut().flat_map(|s| s.tags.iter_mut()))
            .find(|t| t.id == style.tag_id);
        if let Some(tag) = tag {
            if let Some(color) = &style.color {
                tag.color = color.clone();
            }
            if style.icon.is_some() {
                tag.icon = style.icon.clone();
            }
        }
    }
}
