//! Fetch, normalize and aggregate one catalog snapshot, and hold the current load state.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use interndex_core::{ConfigCategory, Listing, StipendKind};
use interndex_sheets::{
    normalize_table, parse_config_sheet, ColumnLayout, FixtureSheetSource, GvizSheetSource,
    SheetSource, TagStyle,
};
use interndex_storage::HttpFetcher;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregate::aggregate_tags;
use crate::config::AppConfig;
use crate::rules::PositionRules;

/// One immutable load of the directory. Replaced wholesale on every reload.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub load_id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub source_id: &'static str,
    pub listings: Vec<Listing>,
    pub config: Vec<ConfigCategory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub load_id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub source: &'static str,
    pub listings: usize,
    pub open: usize,
    pub paid: usize,
    pub tags: usize,
}

impl Catalog {
    pub fn listing(&self, id: &str) -> Option<&Listing> {
        self.listings.iter().find(|l| l.id == id)
    }

    pub fn summary(&self) -> CatalogSummary {
        let tags = self
            .config
            .iter()
            .map(|c| c.tags.len() + c.sub_categories.iter().map(|s| s.tags.len()).sum::<usize>())
            .sum();
        CatalogSummary {
            load_id: self.load_id,
            loaded_at: self.loaded_at,
            source: self.source_id,
            listings: self.listings.len(),
            open: self.listings.iter().filter(|l| l.is_open()).count(),
            paid: self
                .listings
                .iter()
                .filter(|l| l.stipend == StipendKind::Paid)
                .count(),
            tags,
        }
    }
}

pub struct CatalogLoader {
    source: Arc<dyn SheetSource>,
    layout: ColumnLayout,
    rules: PositionRules,
    sheet_name: String,
    config_sheet: Option<String>,
}

impl CatalogLoader {
    pub fn new(source: Arc<dyn SheetSource>, sheet_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            source,
            layout: ColumnLayout::internships().context("validating internships column layout")?,
            rules: PositionRules::builtin(),
            sheet_name: sheet_name.into(),
            config_sheet: None,
        })
    }

    pub fn with_config_sheet(mut self, config_sheet: Option<String>) -> Self {
        self.config_sheet = config_sheet;
        self
    }

    pub fn with_rules(mut self, rules: PositionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Fixture payloads when `INTERNDEX_FIXTURES_DIR` is set, the live gviz endpoint otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let source: Arc<dyn SheetSource> = match &config.fixtures_dir {
            Some(dir) => Arc::new(FixtureSheetSource::new(dir.clone())),
            None => {
                let http = HttpFetcher::new(config.http_client_config())?;
                Arc::new(GvizSheetSource::new(http, config.sheet_id.clone()))
            }
        };
        let rules = PositionRules::load(&config.rules_path)?;
        Ok(Self::new(source, config.sheet_name.clone())?
            .with_config_sheet(config.config_sheet.clone())
            .with_rules(rules))
    }

    pub async fn load(&self) -> Result<Catalog> {
        let load_id = Uuid::new_v4();
        let span = info_span!("catalog_load", %load_id, source = self.source.source_id());
        self.load_inner(load_id).instrument(span).await
    }

    async fn load_inner(&self, load_id: Uuid) -> Result<Catalog> {
        let table = self
            .source
            .fetch_sheet(&self.sheet_name)
            .await
            .with_context(|| format!("fetching sheet `{}`", self.sheet_name))?;
        let sheet = normalize_table(&self.layout, &table);

        let mut seen = HashSet::new();
        for listing in &sheet.listings {
            if !seen.insert(listing.id.as_str()) {
                warn!(id = %listing.id, "duplicate listing id; lookups return the first row");
            }
        }

        let styles = self.load_styles().await;
        let config = aggregate_tags(&sheet.listings, &sheet.labels, &self.rules, &styles);

        info!(
            listings = sheet.listings.len(),
            styles = styles.len(),
            "catalog loaded"
        );
        Ok(Catalog {
            load_id,
            loaded_at: Utc::now(),
            source_id: self.source.source_id(),
            listings: sheet.listings,
            config,
        })
    }

    /// The styling sheet is optional; any failure leaves default colors in place.
    async fn load_styles(&self) -> Vec<TagStyle> {
        let Some(name) = &self.config_sheet else {
            return Vec::new();
        };
        match self.source.fetch_sheet(name).await {
            Ok(table) => parse_config_sheet(&table),
            Err(err) => {
                warn!(sheet = %name, error = %err, "config sheet unavailable; using default tag colors");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoadState {
    Loading,
    Ready(Arc<Catalog>),
    Failed {
        error: String,
        last_good: Option<Arc<Catalog>>,
    },
}

impl LoadState {
    pub fn label(&self) -> &'static str {
        match self {
            LoadState::Loading => "loading",
            LoadState::Ready(_) => "ready",
            LoadState::Failed { .. } => "failed",
        }
    }

    /// The snapshot worth serving, including the last good one after a failed reload.
    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        match self {
            LoadState::Loading => None,
            LoadState::Ready(catalog) => Some(catalog.clone()),
            LoadState::Failed { last_good, .. } => last_good.clone(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }
}

/// Shared load state. Reloads are serialized, so at most one fetch is in flight.
#[derive(Clone)]
pub struct CatalogHandle {
    loader: Arc<CatalogLoader>,
    state: Arc<RwLock<LoadState>>,
    reload_gate: Arc<Mutex<()>>,
}

impl CatalogHandle {
    pub fn new(loader: CatalogLoader) -> Self {
        Self {
            loader: Arc::new(loader),
            state: Arc::new(RwLock::new(LoadState::Loading)),
            reload_gate: Arc::new(Mutex::new(())),
        }
    }

    pub async fn state(&self) -> LoadState {
        self.state.read().await.clone()
    }

    pub async fn current(&self) -> Option<Arc<Catalog>> {
        self.state.read().await.catalog()
    }

    pub async fn reload(&self) -> Result<Arc<Catalog>> {
        let _gate = self.reload_gate.lock().await;
        match self.loader.load().await {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                *self.state.write().await = LoadState::Ready(catalog.clone());
                Ok(catalog)
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(error = %error, "catalog load failed");
                let mut state = self.state.write().await;
                let last_good = state.catalog();
                *state = LoadState::Failed { error, last_good };
                Err(err)
            }
        }
    }

    /// Runs the first load in the background; failures land in [`LoadState::Failed`].
    pub fn spawn_initial_load(&self) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let _ = handle.reload().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use interndex_sheets::{SheetError, SheetTable};

    fn fixtures_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sheets")
    }

    fn fixture_loader() -> CatalogLoader {
        CatalogLoader::new(Arc::new(FixtureSheetSource::new(fixtures_dir())), "Internships")
            .unwrap()
            .with_config_sheet(Some("Config".into()))
    }

    /// Serves the fixture until switched off, then fails every fetch.
    struct FlakySource {
        inner: FixtureSheetSource,
        up: AtomicBool,
    }

    #[async_trait]
    impl SheetSource for FlakySource {
        fn source_id(&self) -> &'static str {
            "flaky"
        }

        async fn fetch_sheet(&self, sheet_name: &str) -> Result<SheetTable, SheetError> {
            if self.up.load(Ordering::SeqCst) {
                self.inner.fetch_sheet(sheet_name).await
            } else {
                Err(SheetError::Query("sheet offline".into()))
            }
        }
    }

    #[tokio::test]
    async fn fixture_load_builds_listings_and_styled_config() {
        let catalog = fixture_loader().load().await.unwrap();
        assert_eq!(catalog.source_id, "fixture");
        assert_eq!(catalog.listings.len(), 6);
        assert!(catalog.listing("7").is_some());

        let programmer = interndex_core::find_tag(&catalog.config, "game_programmer").unwrap();
        assert_eq!(programmer.count, 2);
        assert_eq!(programmer.color, "#22C55E");

        let summary = catalog.summary();
        assert_eq!(summary.listings, 6);
        assert_eq!(summary.open, 5);
        assert_eq!(summary.paid, 4);
    }

    #[tokio::test]
    async fn missing_config_sheet_only_drops_styles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::copy(
            fixtures_dir().join("Internships.txt"),
            dir.path().join("Internships.txt"),
        )
        .unwrap();
        let loader = CatalogLoader::new(Arc::new(FixtureSheetSource::new(dir.path())), "Internships")
            .unwrap()
            .with_config_sheet(Some("Config".into()));
        let catalog = loader.load().await.unwrap();
        let programmer = interndex_core::find_tag(&catalog.config, "game_programmer").unwrap();
        assert_eq!(programmer.color, interndex_core::TagCategory::Position.color());
    }

    #[tokio::test]
    async fn failed_reload_keeps_last_good_snapshot() {
        let source = Arc::new(FlakySource {
            inner: FixtureSheetSource::new(fixtures_dir()),
            up: AtomicBool::new(false),
        });
        let handle = CatalogHandle::new(CatalogLoader::new(source.clone(), "Internships").unwrap());
        assert_eq!(handle.state().await.label(), "loading");

        assert!(handle.reload().await.is_err());
        let state = handle.state().await;
        assert_eq!(state.label(), "failed");
        assert!(state.catalog().is_none());
        assert!(state.error().unwrap().contains("sheet offline"));

        source.up.store(true, Ordering::SeqCst);
        let first = handle.reload().await.unwrap();
        assert_eq!(handle.state().await.label(), "ready");

        source.up.store(false, Ordering::SeqCst);
        assert!(handle.reload().await.is_err());
        let state = handle.state().await;
        assert_eq!(state.label(), "failed");
        assert_eq!(state.catalog().unwrap().load_id, first.load_id);
    }

    #[tokio::test]
    async fn background_load_reaches_ready() {
        let handle = CatalogHandle::new(fixture_loader());
        handle.spawn_initial_load().await.unwrap();
        assert_eq!(handle.current().await.unwrap().listings.len(), 6);
    }
}
