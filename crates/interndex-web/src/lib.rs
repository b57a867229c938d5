//! Axum JSON API over the internship catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDate, Utc};
use interndex_catalog::{
    derive_view, featured, listing_detail, AppConfig, Catalog, CatalogHandle, CatalogLoader,
    LoadState, SortKey, ViewQuery,
};
use interndex_core::{Listing, TrackStatus};
use interndex_storage::{
    JsonFileKvStore, SuggestError, Suggestion, TrackedStatusStore, WebhookClient,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "interndex-web";

const RELOAD_ROUTE: &str = "/api/catalog/reload";

pub struct AppState {
    pub catalog: CatalogHandle,
    pub tracked: Mutex<TrackedStatusStore>,
    pub webhook: WebhookClient,
    today: Option<NaiveDate>,
}

impl AppState {
    pub fn new(catalog: CatalogHandle, tracked: TrackedStatusStore, webhook: WebhookClient) -> Self {
        Self {
            catalog,
            tracked: Mutex::new(tracked),
            webhook,
            today: None,
        }
    }

    /// Pin the date used for countdowns and featured selection.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route(RELOAD_ROUTE, post(reload_handler))
        .route("/api/config", get(config_handler))
        .route("/api/listings", get(listings_handler))
        .route("/api/listings/{id}", get(listing_detail_handler))
        .route("/api/featured", get(featured_handler))
        .route("/api/tracked", get(tracked_handler))
        .route("/api/tracked/{id}", put(track_handler))
        .route("/api/suggest", post(suggest_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let catalog = CatalogHandle::new(CatalogLoader::from_config(&config)?);
    catalog.spawn_initial_load();

    let tracked = TrackedStatusStore::load(Box::new(JsonFileKvStore::open(&config.state_path)));
    let webhook = WebhookClient::new(config.webhook_url.clone(), config.http_timeout())?;
    let state = AppState::new(catalog, tracked, webhook);

    let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
    info!(port = config.web_port, "serving interndex api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn unavailable(state: &LoadState) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "state": state.label(),
            "error": state.error(),
            "retry": format!("POST {RELOAD_ROUTE}"),
        })),
    )
        .into_response()
}

/// The snapshot to serve, or a 503 while loading / after a failure with nothing cached.
async fn ready_catalog(state: &AppState) -> Result<Arc<Catalog>, Response> {
    let load_state = state.catalog.state().await;
    load_state.catalog().ok_or_else(|| unavailable(&load_state))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let load_state = state.catalog.state().await;
    let catalog = load_state.catalog();
    Json(json!({
        "state": load_state.label(),
        "listings": catalog.as_ref().map(|c| c.listings.len()),
        "loaded_at": catalog.as_ref().map(|c| c.loaded_at),
        "error": load_state.error(),
    }))
    .into_response()
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.catalog.reload().await {
        Ok(catalog) => Json(catalog.summary()).into_response(),
        Err(_) => unavailable(&state.catalog.state().await),
    }
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Response {
    match ready_catalog(&state).await {
        Ok(catalog) => Json(&catalog.config).into_response(),
        Err(resp) => resp,
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListingsParams {
    q: Option<String>,
    tags: Option<String>,
    sort: Option<String>,
    tracked_only: Option<bool>,
}

impl ListingsParams {
    fn into_query(self) -> Result<ViewQuery, String> {
        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => SortKey::default(),
            Some(raw) => raw.parse()?,
        };
        Ok(ViewQuery {
            query: self.q.unwrap_or_default(),
            selected_tags: self
                .tags
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect(),
            sort,
            tracked_only: self.tracked_only.unwrap_or(false),
        })
    }
}

#[derive(Debug, Serialize)]
struct ListingsResponse<'a> {
    total: usize,
    visible: usize,
    listings: Vec<&'a Listing>,
}

async fn listings_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListingsParams>,
) -> Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(err) => return error_json(StatusCode::BAD_REQUEST, err),
    };
    let catalog = match ready_catalog(&state).await {
        Ok(catalog) => catalog,
        Err(resp) => return resp,
    };
    let tracked = state.tracked.lock().await.entries().clone();
    let listings = derive_view(&catalog.listings, &catalog.config, &query, &tracked);
    Json(ListingsResponse {
        total: catalog.listings.len(),
        visible: listings.len(),
        listings,
    })
    .into_response()
}

async fn listing_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let catalog = match ready_catalog(&state).await {
        Ok(catalog) => catalog,
        Err(resp) => return resp,
    };
    let Some(listing) = catalog.listing(&id) else {
        return error_json(StatusCode::NOT_FOUND, format!("listing `{id}` not found"));
    };
    let tracked = state.tracked.lock().await.get(&id);
    Json(listing_detail(listing, &catalog.config, tracked, state.today())).into_response()
}

async fn featured_handler(State(state): State<Arc<AppState>>) -> Response {
    match ready_catalog(&state).await {
        Ok(catalog) => Json(featured(&catalog.listings, state.today())).into_response(),
        Err(resp) => resp,
    }
}

async fn tracked_handler(State(state): State<Arc<AppState>>) -> Response {
    let tracked: BTreeMap<String, TrackStatus> = state.tracked.lock().await.entries().clone();
    Json(tracked).into_response()
}

#[derive(Debug, Deserialize)]
struct TrackBody {
    status: Option<TrackStatus>,
}

async fn track_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<TrackBody>,
) -> Response {
    let mut tracked = state.tracked.lock().await;
    match tracked.set(&id, body.status) {
        Ok(()) => Json(json!({ "id": id, "status": body.status })).into_response(),
        Err(err) => {
            warn!(id = %id, error = %err, "failed to persist tracked status");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

async fn suggest_handler(
    State(state): State<Arc<AppState>>,
    Json(suggestion): Json<Suggestion>,
) -> Response {
    match state.webhook.send_suggestion(&suggestion, Utc::now()).await {
        Ok(()) => Json(json!({ "delivered": true })).into_response(),
        Err(err) => {
            let status = match &err {
                SuggestError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                SuggestError::Invalid(_) => StatusCode::BAD_REQUEST,
                SuggestError::Request(_) | SuggestError::HttpStatus(_) => StatusCode::BAD_GATEWAY,
            };
            warn!(error = %err, "suggestion not delivered");
            error_json(status, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use interndex_sheets::FixtureSheetSource;
    use interndex_storage::MemoryKvStore;
    use serde_json::Value as JsonValue;
    use tower::ServiceExt;

    fn fixtures_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sheets")
    }

    fn handle_for(dir: &Path) -> CatalogHandle {
        let loader = CatalogLoader::new(Arc::new(FixtureSheetSource::new(dir)), "Internships")
            .unwrap()
            .with_config_sheet(Some("Config".into()));
        CatalogHandle::new(loader)
    }

    fn state_with(catalog: CatalogHandle, webhook_url: Option<String>) -> AppState {
        let tracked = TrackedStatusStore::load(Box::new(MemoryKvStore::new()));
        let webhook = WebhookClient::new(webhook_url, Duration::from_secs(5)).unwrap();
        AppState::new(catalog, tracked, webhook)
            .with_today(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
    }

    async fn ready_app() -> Router {
        let catalog = handle_for(&fixtures_dir());
        catalog.reload().await.unwrap();
        app(state_with(catalog, None))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: JsonValue) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> JsonValue {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn catalog_routes_answer_503_while_loading() {
        let app = app(state_with(handle_for(&fixtures_dir()), None));
        let resp = app.clone().oneshot(get_req("/api/listings")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await["state"], "loading");

        let resp = app.oneshot(get_req("/api/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["state"], "loading");
    }

    #[tokio::test]
    async fn failed_load_offers_reload_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with(handle_for(dir.path()), None));

        let resp = app.clone().oneshot(json_req("POST", RELOAD_ROUTE, json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(resp).await;
        assert_eq!(body["state"], "failed");
        assert_eq!(body["retry"], "POST /api/catalog/reload");

        std::fs::copy(fixtures_dir().join("Internships.txt"), dir.path().join("Internships.txt"))
            .unwrap();
        let resp = app.clone().oneshot(json_req("POST", RELOAD_ROUTE, json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["listings"], 6);

        let resp = app.oneshot(get_req("/api/config")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listings_filter_and_sort_via_query_string() {
        let app = ready_app().await;
        let resp = app
            .clone()
            .oneshot(get_req("/api/listings?q=PIXEL"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["total"], 6);
        assert_eq!(body["visible"], 1);
        assert_eq!(body["listings"][0]["name"], "PixelForge Studios");

        let resp = app
            .clone()
            .oneshot(get_req("/api/listings?tags=game_programmer,remote_100%25&sort=deadline"))
            .await
            .unwrap();
        let body = body_json(resp).await;
        let ids: Vec<_> = body["listings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);

        let resp = app.oneshot(get_req("/api/listings?sort=alphabet")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tracking_persists_and_feeds_tracked_only_view() {
        let app = ready_app().await;
        let resp = app
            .clone()
            .oneshot(json_req("PUT", "/api/tracked/2", json!({ "status": "applied" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(app.clone().oneshot(get_req("/api/tracked")).await.unwrap()).await;
        assert_eq!(body, json!({ "2": "applied" }));

        let body = body_json(
            app.clone()
                .oneshot(get_req("/api/listings?tracked_only=true"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["visible"], 1);
        assert_eq!(body["listings"][0]["id"], "2");

        let detail = body_json(app.clone().oneshot(get_req("/api/listings/2")).await.unwrap()).await;
        assert_eq!(detail["tracked"], "applied");
        assert_eq!(detail["deadlineText"], "20 days left");

        app.clone()
            .oneshot(json_req("PUT", "/api/tracked/2", json!({ "status": null })))
            .await
            .unwrap();
        let body = body_json(app.oneshot(get_req("/api/tracked")).await.unwrap()).await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn unknown_listing_is_404_and_featured_uses_pinned_date() {
        let app = ready_app().await;
        let resp = app.clone().oneshot(get_req("/api/listings/nope")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = body_json(app.oneshot(get_req("/api/featured")).await.unwrap()).await;
        assert_eq!(body["mode"], "closing");
        let ids: Vec<_> = body["listings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "6"]);
    }

    #[tokio::test]
    async fn suggest_without_webhook_is_503() {
        let app = ready_app().await;
        let resp = app
            .oneshot(json_req(
                "POST",
                "/api/suggest",
                json!({ "company_name": "Lantern Games", "job_post_url": "https://lantern.test" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn suggest_posts_embed_to_webhook_and_maps_failures() {
        let received = Arc::new(Mutex::new(Vec::<JsonValue>::new()));
        let sink = received.clone();
        let receiver = Router::new()
            .route(
                "/hook",
                post(move |Json(payload): Json<JsonValue>| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().await.push(payload);
                        StatusCode::NO_CONTENT
                    }
                }),
            )
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, receiver).await.unwrap();
        });

        let catalog = handle_for(&fixtures_dir());
        let app = app(state_with(catalog.clone(), Some(format!("http://{addr}/hook"))));
        let resp = app
            .oneshot(json_req(
                "POST",
                "/api/suggest",
                json!({
                    "company_name": "Lantern Games",
                    "job_post_url": "https://lantern.test/careers",
                    "note": "Great art team"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let payloads = received.lock().await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["embeds"][0]["title"], "Lantern Games");
        assert_eq!(payloads[0]["embeds"][0]["fields"][2]["value"], "Great art team");
        drop(payloads);

        let broken = crate::app(state_with(catalog, Some(format!("http://{addr}/broken"))));
        let resp = broken
            .oneshot(json_req(
                "POST",
                "/api/suggest",
                json!({ "company_name": "Moonbyte", "job_post_url": "https://moonbyte.test" }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
