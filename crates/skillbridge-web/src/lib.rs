//! JSON API over the Query Service.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use skillbridge_query::{
    CandidateSummary, CorpusStats, ExtractionError, FeedJob, JobSummary, QueryError, QueryService,
    ResumeError, ServeConfig, TrainingSummary, DEFAULT_FEED_LIMIT, DEFAULT_JOB_K,
    DEFAULT_TRAINING_K,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "skillbridge-web";

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
}

impl AppState {
    pub fn new(query: QueryService) -> Self {
        Self { query }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file part")]
    NoFilePart,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("Could not extract text from file")]
    Extraction(#[source] ExtractionError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<ResumeError> for ApiError {
    fn from(err: ResumeError) -> Self {
        match err {
            ResumeError::Extraction(err) => ApiError::Extraction(err),
            ResumeError::Query(err) => ApiError::Query(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Query(err) => {
                error!(error = %err, "query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Extraction(err) => {
                warn!(error = %err, "resume extraction failed");
                StatusCode::BAD_REQUEST
            }
            other => {
                warn!(error = %other, "rejected request");
                StatusCode::BAD_REQUEST
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Missing and `null` both read as an empty query.
    pub query: Option<String>,
    pub k: Option<usize>,
}

impl SearchRequest {
    fn query_text(&self) -> &str {
        self.query.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub results: Vec<JobSummary>,
    pub extracted_text_preview: String,
    pub extracted_skills: Vec<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/jobs", get(jobs_handler))
        .route("/api/recommend", post(recommend_handler))
        .route("/api/trainings", post(trainings_handler))
        .route("/api/candidates", get(candidates_handler))
        .route("/api/upload-resume", post(upload_resume_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(Arc::new(state))
}

pub async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let query = QueryService::start(&config)
        .await
        .context("loading artifacts for serving")?;
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(port = config.port, "serving job matcher API");
    axum::serve(listener, app(AppState::new(query))).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(ServeConfig::from_env()?).await
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<CorpusStats> {
    Json(state.query.stats())
}

async fn jobs_handler(State(state): State<Arc<AppState>>) -> Json<Vec<FeedJob>> {
    Json(state.query.list_jobs(DEFAULT_FEED_LIMIT))
}

async fn candidates_handler(State(state): State<Arc<AppState>>) -> Json<Vec<CandidateSummary>> {
    Json(state.query.list_candidates())
}

async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse<JobSummary>>, ApiError> {
    let hits = state
        .query
        .search_jobs(request.query_text(), request.k.unwrap_or(DEFAULT_JOB_K))
        .await?;
    Ok(Json(SearchResponse {
        results: hits.iter().map(JobSummary::from).collect(),
    }))
}

async fn trainings_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse<TrainingSummary>>, ApiError> {
    let hits = state
        .query
        .search_trainings(request.query_text(), request.k.unwrap_or(DEFAULT_TRAINING_K))
        .await?;
    Ok(Json(SearchResponse {
        results: hits.iter().map(TrainingSummary::from).collect(),
    }))
}

async fn upload_resume_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ResumeResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        if field.name() != Some("resume") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or(ApiError::NoFilePart)?;
    if file_name.is_empty() {
        return Err(ApiError::NoSelectedFile);
    }
    info!(file_name = %file_name, bytes = bytes.len(), "matching uploaded resume");
    let matched = state
        .query
        .match_resume_file(&file_name, bytes.to_vec(), DEFAULT_JOB_K)
        .await?;
    Ok(Json(ResumeResponse {
        results: matched.hits.iter().map(JobSummary::from).collect(),
        extracted_text_preview: matched.extracted_text_preview,
        extracted_skills: matched.extracted_skills,
    }))
}
