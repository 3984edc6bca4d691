use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

use placegrab_common::Place;
use placegrab_pipeline::{AnalyzeOutcome, AnalyzePipeline, PipelineError};

use crate::auth::{AuthUser, JwtService};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalyzePipeline>,
    pub jwt: JwtService,
}

pub fn build_router(state: AppState, photo_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/analyze", post(analyze))
        .nest_service("/static/uploads", ServeDir::new(photo_dir.as_ref()))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaceResult {
    id: i64,
    name: String,
    address: String,
    category: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    photo: Option<String>,
    rating_avg: f64,
    rating_count: i64,
}

impl From<Place> for PlaceResult {
    fn from(place: Place) -> Self {
        Self {
            id: place.id,
            name: place.name,
            address: place.address,
            category: place.category.to_string(),
            latitude: place.latitude,
            longitude: place.longitude,
            photo: place.photo,
            rating_avg: place.rating_avg,
            rating_count: place.rating_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    status: &'static str,
    results: Vec<PlaceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'static str>,
    show_ad: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn analyze(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let url = match body {
        Ok(Json(AnalyzeRequest { url: Some(url) })) if !url.trim().is_empty() => url.trim().to_string(),
        _ => return error_response(StatusCode::BAD_REQUEST, "url is required"),
    };

    info!(user = %user, "analyze requested");
    outcome_response(state.pipeline.analyze(&user, &url).await)
}

/// Map a pipeline result onto the HTTP contract.
pub fn outcome_response(result: Result<AnalyzeOutcome, PipelineError>) -> Response {
    match result {
        Ok(AnalyzeOutcome::Found {
            places,
            source,
            show_ad,
        }) => Json(AnalyzeResponse {
            status: "success",
            results: places.into_iter().map(PlaceResult::from).collect(),
            source: Some(source.as_str()),
            show_ad,
            message: None,
        })
        .into_response(),
        Ok(AnalyzeOutcome::NoCandidates) => Json(AnalyzeResponse {
            status: "success",
            results: Vec::new(),
            source: None,
            show_ad: false,
            message: Some("no places were found in this post"),
        })
        .into_response(),
        Ok(AnalyzeOutcome::NotPlacePost) => {
            error_response(StatusCode::BAD_REQUEST, "this post does not look like a place post")
        }
        Ok(AnalyzeOutcome::Unresolved) => {
            error_response(StatusCode::NOT_FOUND, "no places in this post could be resolved")
        }
        Err(PipelineError::InvalidUrl(_)) => {
            error_response(StatusCode::BAD_REQUEST, "not a supported post url")
        }
        Err(PipelineError::Throttled) => {
            error_response(StatusCode::TOO_MANY_REQUESTS, "too many requests, try again in a minute")
        }
        Err(PipelineError::Blocked) => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "temporarily blocked after repeated failures",
        ),
        Err(e) => {
            error!(error = ?e, "analyze failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
