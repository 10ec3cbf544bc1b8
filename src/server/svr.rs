use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, io::ErrorKind, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, signal};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::downloader::{Downloader, MediaFormat, YtDlp};
use crate::jobs::{Job, JobId, JobRegistry, JobRunner};
use crate::server::error::{ApiError, ApiResult};
use crate::server::files::{self, FileEntry};

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const APP_JS: &str = include_str!("../../assets/app.js");
const STREAM_CAPACITY: usize = 256 * 1024;

pub struct AppState {
    runner: JobRunner,
    download_dir: PathBuf,
}

impl AppState {
    pub fn new(runner: JobRunner, download_dir: PathBuf) -> Self {
        Self {
            runner,
            download_dir,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DownloadBody {
    url: Option<String>,
    /// Only an absent key means video; `null` or a non-string is rejected.
    #[serde(default = "default_format")]
    format: Value,
}

fn default_format() -> Value {
    Value::from(MediaFormat::default().as_str())
}

impl DownloadBody {
    fn format(&self) -> Cow<'_, str> {
        match &self.format {
            Value::String(format) => Cow::Borrowed(format.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct StartedResponse {
    download_id: JobId,
    status: &'static str,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        APP_JS,
    )
}

async fn start_download(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadBody>, JsonRejection>,
) -> ApiResult<Json<StartedResponse>> {
    let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let download_id = state
        .runner
        .submit(body.url.as_deref(), &body.format())
        .await?;

    Ok(Json(StartedResponse {
        download_id,
        status: "started",
    }))
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(download_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.runner.registry().get(&download_id).await?;
    Ok(Json(job))
}

async fn list_files(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<FileEntry>>> {
    let dir = state.download_dir.clone();
    let files = tokio::task::spawn_blocking(move || files::list_files(&dir))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;
    Ok(Json(files))
}

fn file_not_found() -> ApiError {
    ApiError::NotFound("File not found".to_string())
}

async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = files::resolve_download(&state.download_dir, &filename).ok_or_else(file_not_found)?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(file_not_found()),
        Err(err) => return Err(err.into()),
    };
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(file_not_found());
    }

    let disposition = HeaderValue::from_str(&files::content_disposition(&filename))
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let stream = ReaderStream::with_capacity(file, STREAM_CAPACITY);
    let response = (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
        ],
        Body::from_stream(stream),
    )
        .into_response();
    Ok(response)
}

pub fn build_app(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/app.js", get(app_js))
        .route("/download", post(start_download))
        .route("/status/{download_id}", get(status))
        .route("/downloads/{filename}", get(serve_file))
        .route("/files", get(list_files))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}

pub async fn startup(config: ServerConfig) -> std::io::Result<()> {
    tokio::fs::create_dir_all(&config.download_dir).await?;

    let downloader: Arc<dyn Downloader> = Arc::new(YtDlp::new(config.yt_dlp.clone()));
    let runner = JobRunner::new(
        Arc::new(JobRegistry::new()),
        downloader,
        config.runner_options(),
    );
    let app_state = Arc::new(AppState::new(runner.clone(), config.download_dir.clone()));
    let app = build_app(app_state);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;

    tracing::info!(
        download_dir = %config.download_dir.display(),
        debug = config.debug,
        "listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !runner.shutdown(config.shutdown_grace).await {
        tracing::warn!(
            in_flight = runner.in_flight(),
            "shutting down with downloads still running"
        );
    }

    Ok(())
}
