use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    capabilities::CapabilityMatrix,
    errors::{QaError, Result},
    notify::BroadcastSender,
    service::{FileUpload, GenerationOptions},
    workflow::{DOWNLOAD_FAILED, DispatchOutcome, GENERATION_FAILED, WorkflowRegistry},
};

/// Room for the requirement text and JSON framing around an encoded upload.
const BODY_ALLOWANCE: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    workflows: Arc<WorkflowRegistry>,
    capabilities: Arc<CapabilityMatrix>,
    broadcaster: BroadcastSender,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        capabilities: Arc<CapabilityMatrix>,
        broadcaster: BroadcastSender,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            workflows,
            capabilities,
            broadcaster,
            max_upload_bytes,
        }
    }

    /// Request body cap: the base64 form of the largest upload plus the rest of the JSON.
    fn body_limit(&self) -> usize {
        self.max_upload_bytes
            .div_ceil(3)
            .saturating_mul(4)
            .saturating_add(BODY_ALLOWANCE)
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadBody {
    name: String,
    data_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    text: String,
    #[serde(default)]
    file: Option<UploadBody>,
    #[serde(flatten)]
    options: GenerationOptions,
}

impl UploadBody {
    fn decode(self) -> Result<FileUpload> {
        let data = STANDARD
            .decode(self.data_base64.trim())
            .map_err(|err| QaError::validation(format!("file {} is not valid base64: {err}", self.name)))?;
        Ok(FileUpload::new(self.name, data))
    }
}

/// Maps workflow errors onto HTTP status codes. The message matches the
/// text the notification stream shows for the same failure.
pub struct ApiError {
    error: QaError,
    fallback: &'static str,
}

impl ApiError {
    fn download(error: QaError) -> Self {
        Self {
            error,
            fallback: DOWNLOAD_FAILED,
        }
    }

    fn message(&self) -> String {
        match &self.error {
            QaError::Validation(_) | QaError::Service { .. } | QaError::Reqwest(_) => {
                self.error.user_message(self.fallback)
            }
            other => other.to_string(),
        }
    }
}

impl From<QaError> for ApiError {
    fn from(error: QaError) -> Self {
        Self {
            error,
            fallback: GENERATION_FAILED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            QaError::Validation(_) => StatusCode::BAD_REQUEST,
            QaError::Busy => StatusCode::CONFLICT,
            QaError::PanelNotFound(_) => StatusCode::NOT_FOUND,
            QaError::Service { .. } | QaError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "status": "error",
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        .route("/health", get(health_handler))
        .route("/events", get(sse_handler))
        .route("/panels", get(panels_handler))
        .route("/panels/{id}", get(panel_handler))
        .route("/panels/{id}/generate", post(generate_handler))
        .route("/panels/{id}/download", post(download_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "server", %addr, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(target: "server", "shutdown signal received");
        })
        .await
        .map_err(|err| QaError::other(format!("HTTP server error: {err}")))?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "capabilities": state.capabilities.overview(),
    }))
}

async fn panels_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut panels = Vec::new();
    for workflow in state.workflows.iter() {
        panels.push(workflow.snapshot().await);
    }
    Json(json!({ "panels": panels }))
}

async fn panel_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<serde_json::Value>> {
    let workflow = state.workflows.get(&id)?;
    Ok(Json(json!(workflow.snapshot().await)))
}

async fn generate_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let workflow = state.workflows.get(&id)?;

    let mut request = workflow.request(body.text).with_options(body.options);
    if let Some(upload) = body.file {
        request = request.with_file(upload.decode()?);
    }

    let outcome = workflow.dispatch(request).await?;
    let payload = match outcome {
        DispatchOutcome::Generated { result, text, file } => json!({
            "status": "success",
            "result": result,
            "text": text,
            "file_name": file.map(|file| file.name),
        }),
        DispatchOutcome::Unavailable { result } => json!({
            "status": "unavailable",
            "result": result,
        }),
    };

    Ok(Json(payload))
}

async fn download_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let workflow = state.workflows.get(&id).map_err(ApiError::download)?;
    let artifact = workflow.download().await.map_err(ApiError::download)?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.filename.replace('"', "")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.media_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(artifact.data),
    )
        .into_response())
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(message) => Some(Ok(Event::default().data(message))),
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
