use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{
    fetch::validate_url, DetectRequest, DetectResponse, ExportFormat, HealthResponse, Job,
    JobRequest, JobSummary, QuickCrawlRequest, StatsResponse,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(create_job).get(list_jobs))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/export", get(export_job))
        .route("/api/v1/quick-crawl", post(quick_crawl))
        .route("/api/v1/detect", post(detect))
        .route("/api/v1/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.store.stats();
    Json(HealthResponse {
        status: "healthy".to_string(),
        active_jobs: stats.active(),
        total_jobs: stats.total_jobs,
    })
}

// Crea un job y lanza su runner en segundo plano
async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<JobRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    submit(&state, req)
}

// Atajo: una URL, sin selectores (auto-detect)
async fn quick_crawl(
    State(state): State<AppState>,
    Json(req): Json<QuickCrawlRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    submit(
        &state,
        JobRequest {
            name: req.name,
            url: Some(req.url),
            urls: Vec::new(),
            selectors: None,
            follow_links: req.follow_links,
        },
    )
}

fn submit(state: &AppState, req: JobRequest) -> Result<(StatusCode, Json<Job>), ApiError> {
    let targets = req.targets();

    if targets.len() > state.config.max_pages_per_job {
        return Err(ApiError::BadRequest(format!(
            "demasiadas URLs: {} (máximo {})",
            targets.len(),
            state.config.max_pages_per_job
        )));
    }
    for url in &targets {
        validate_url(url)?;
    }
    if req.selectors.as_ref().is_some_and(|s| s.is_empty()) {
        return Err(ApiError::BadRequest(
            "mapa de selectores vacío; omitilo para usar auto-detect".to_string(),
        ));
    }

    let id = state
        .store
        .create_bounded(req, state.config.max_concurrent_jobs)?;
    // snapshot antes de lanzar el runner, así la respuesta siempre es Pending
    let job = state.store.get(&id)?;

    info!(
        "job {} creado ({} urls, auto_detect={})",
        job.id,
        job.urls.len(),
        job.is_auto_detect()
    );
    state.runner.spawn(id);

    Ok((StatusCode::ACCEPTED, Json(job)))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(state.store.list())
}

// Devuelve el job completo (estado, registros, logs)
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

// Genera el archivo en el directorio de descargas y lo devuelve
async fn export_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = match query.format.as_deref() {
        Some(raw) => raw.parse::<ExportFormat>()?,
        None => ExportFormat::default(),
    };

    let job = state.store.get(&id)?;
    let summary = state.exporter.export_job(&job, format)?;

    let bytes = tokio::fs::read(&summary.path).await.map_err(|e| {
        ApiError::Internal(format!("no se pudo leer {}: {}", summary.path.display(), e))
    })?;
    let file_name = summary
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("export.{}", format.extension()));

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

// Trae la página y devuelve qué selectores elegiría el auto-detect
async fn detect(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    let url = req.url.trim().to_string();
    validate_url(&url)?;

    let html = state.fetcher.fetch(&url).await?;
    let selectors = state.detector.detect_selectors(&html);
    let preview = state.detector.detect(&html);

    if selectors.is_empty() {
        info!("auto-detect sin resultados para {}", url);
    }

    Ok(Json(DetectResponse {
        url,
        selectors,
        preview,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.store.stats())
}
