use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AdminGate, AdminSession};
use crate::config::Config;
use crate::db::{Database, PostFilter};
use crate::ladder::{self, Pairing};
use crate::models::{DashboardStats, Post, PostPage, Site, Sort};
use crate::syncer::{self, CrawledPost, IngestReport, Syncer};

const DEFAULT_STATS_DAYS: i64 = 14;
const MAX_STATS_DAYS: i64 = 3650;
const TOP_POSTS: i64 = 10;

pub struct AppState {
    pub db: Arc<Database>,
    pub syncer: Arc<Syncer>,
    pub admin: AdminGate,
    pub page_size: i64,
    pub max_page_size: i64,
}

impl AppState {
    pub fn new(db: Arc<Database>, syncer: Arc<Syncer>, config: &Config) -> Self {
        Self {
            db,
            syncer,
            admin: AdminGate::new(config.admin.as_ref()),
            page_size: config.page_size,
            max_page_size: config.max_page_size,
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Internal(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", err))
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError::Internal(err.into())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sites", get(list_sites))
        .route("/api/posts", get(list_posts))
        .route("/api/posts/:no", get(get_post))
        .route("/api/posts/:no/view", post(record_view))
        .route("/api/ladder", get(ladder_game))
        .route("/api/admin/login", post(admin_login))
        .route("/api/admin/logout", post(admin_logout))
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/posts", get(admin_posts))
        .route("/api/admin/posts/:no", delete(admin_delete_post))
        .route("/api/admin/posts/:no/hide", post(admin_hide_post))
        .route("/api/admin/posts/:no/unhide", post(admin_unhide_post))
        .route("/api/admin/ingest", post(admin_ingest))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PostsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_no: Option<i64>,
}

async fn page_posts(
    state: &AppState,
    query: PostsQuery,
    include_hidden: bool,
) -> Result<PostPage, AppError> {
    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::BadRequest(format!("page must be at least 1, got {}", page)));
    }
    let page_size = query
        .size
        .unwrap_or(state.page_size)
        .clamp(1, state.max_page_size);
    if PostPage::offset(page, page_size).is_none() {
        return Err(AppError::BadRequest(format!("page {} is out of range", page)));
    }

    let site_id = match query.site.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => {
            let site = state
                .db
                .get_site_by_slug(slug)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Site '{}'", slug)))?;
            Some(site.id)
        }
        None => None,
    };

    let filter = PostFilter {
        site_id,
        keyword: query
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
        include_hidden,
    };

    let slice = state
        .db
        .query_posts(
            &filter,
            query.sort.unwrap_or_default(),
            page,
            page_size,
            query.max_no,
        )
        .await?;

    Ok(PostPage {
        has_more: PostPage::has_more(page, page_size, slice.total),
        posts: slice.posts,
        page,
        page_size,
        total: slice.total,
        max_no: slice.max_no,
    })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

pub async fn list_sites(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(state.db.get_all_sites().await?))
}

pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<PostPage>, AppError> {
    Ok(Json(page_posts(&state, query, false).await?))
}

pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(no): Path<i64>,
) -> Result<Json<Post>, AppError> {
    let post = state
        .db
        .get_post(no)
        .await?
        .filter(|post| !post.hidden)
        .ok_or_else(|| AppError::NotFound(format!("Post {}", no)))?;
    Ok(Json(post))
}

pub async fn record_view(
    State(state): State<Arc<AppState>>,
    Path(no): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.db.record_view(no).await? {
        return Err(AppError::NotFound(format!("Post {}", no)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LadderQuery {
    pub players: String,
    pub prizes: String,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LadderResult {
    pub seed: u64,
    pub pairings: Vec<Pairing>,
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn ladder_game(Query(query): Query<LadderQuery>) -> Result<Json<LadderResult>, AppError> {
    let seed = query.seed.unwrap_or_else(rand::random);
    let pairings = ladder::play(&split_names(&query.players), &split_names(&query.prizes), seed)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(Json(LadderResult { seed, pairings }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let token = state
        .admin
        .login(&request.password)
        .await
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(LoginResponse { token }))
}

pub async fn admin_logout(
    State(state): State<Arc<AppState>>,
    session: AdminSession,
) -> StatusCode {
    state.admin.logout(&session.token).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_stats_days")]
    pub days: i64,
}

fn default_stats_days() -> i64 {
    DEFAULT_STATS_DAYS
}

pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Query(query): Query<StatsQuery>,
) -> Result<Json<DashboardStats>, AppError> {
    if !(1..=MAX_STATS_DAYS).contains(&query.days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}, got {}",
            MAX_STATS_DAYS, query.days
        )));
    }
    Ok(Json(state.db.stats(query.days, TOP_POSTS).await?))
}

pub async fn admin_posts(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Query(query): Query<PostsQuery>,
) -> Result<Json<PostPage>, AppError> {
    Ok(Json(page_posts(&state, query, true).await?))
}

async fn set_hidden(state: &AppState, no: i64, hidden: bool) -> Result<StatusCode, AppError> {
    if !state.db.set_hidden(no, hidden).await? {
        return Err(AppError::NotFound(format!("Post {}", no)));
    }
    info!("Post {} hidden={}", no, hidden);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_hide_post(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Path(no): Path<i64>,
) -> Result<StatusCode, AppError> {
    set_hidden(&state, no, true).await
}

pub async fn admin_unhide_post(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Path(no): Path<i64>,
) -> Result<StatusCode, AppError> {
    set_hidden(&state, no, false).await
}

pub async fn admin_delete_post(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Path(no): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.db.delete_post(no).await? {
        return Err(AppError::NotFound(format!("Post {}", no)));
    }
    info!("Post {} deleted", no);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    pub site: String,
    pub posts: Vec<CrawledPost>,
}

pub async fn admin_ingest(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let site = state
        .db
        .get_site_by_slug(&request.site)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Site '{}'", request.site)))?;

    let report = syncer::ingest(&state.db, &site, &request.posts).await?;
    info!(
        "Ingested into '{}': {} new, {} updated, {} skipped",
        site.slug, report.inserted, report.updated, report.skipped
    );
    Ok(Json(report))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub refreshing: bool,
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    _session: AdminSession,
) -> Json<RefreshStatus> {
    let syncer = state.syncer.clone();
    tokio::spawn(async move {
        let _ = syncer.refresh_all_sites().await;
    });

    Json(RefreshStatus { refreshing: true })
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    let refreshing = state.syncer.is_refreshing().await;
    Json(RefreshStatus { refreshing })
}
