//! Command-line client for a running server: starts a download, polls its
//! status until it settles, and optionally saves the produced file.

use clap::Args;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[arg(help = "Media page URL to download")]
    pub url: String,
    #[arg(short, long, default_value = "video", help = "video or audio")]
    pub format: String,
    #[arg(short, long, default_value = "http://127.0.0.1:5067", help = "Server address")]
    pub server: String,
    #[arg(long, default_value_t = 1000, help = "Status polling interval")]
    pub interval_ms: u64,
    #[arg(short, long, help = "Save the finished file into this directory")]
    pub output: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid server address {0}")]
    BadServer(String),

    #[error("server rejected the request ({status}): {message}")]
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("download failed: {0}")]
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct Started {
    download_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct JobView {
    status: String,
    progress: u8,
    filename: Option<String>,
    error: Option<String>,
}

fn endpoint(server: &str, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = Url::parse(server).map_err(|_| ClientError::BadServer(server.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::BadServer(server.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn rejected(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    ClientError::Rejected { status, message }
}

async fn start(client: &Client, args: &FetchArgs) -> Result<String, ClientError> {
    let resp = client
        .post(endpoint(&args.server, &["download"])?)
        .json(&serde_json::json!({
            "url": args.url,
            "format": args.format,
        }))
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(rejected(resp).await);
    }
    Ok(resp.json::<Started>().await?.download_id)
}

async fn wait_until_settled(
    client: &Client,
    server: &str,
    id: &str,
    interval: Duration,
) -> Result<JobView, ClientError> {
    let url = endpoint(server, &["status", id])?;
    let mut last_progress = None;

    loop {
        let resp = client.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        let job = resp.json::<JobView>().await?;

        match job.status.as_str() {
            "completed" => return Ok(job),
            "error" => {
                return Err(ClientError::Failed(
                    job.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
            _ => {
                if last_progress != Some(job.progress) {
                    tracing::info!(download_id = id, progress = job.progress, "downloading");
                    last_progress = Some(job.progress);
                }
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn save(
    client: &Client,
    server: &str,
    filename: &str,
    dir: &Path,
) -> Result<PathBuf, ClientError> {
    let resp = client
        .get(endpoint(server, &["downloads", filename])?)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(rejected(resp).await);
    }

    let local_name = Path::new(filename)
        .file_name()
        .ok_or_else(|| ClientError::Failed(format!("server reported bad file name {}", filename)))?;
    tokio::fs::create_dir_all(dir).await?;
    let target = dir.join(local_name);
    let mut file = tokio::fs::File::create(&target).await?;

    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;

    Ok(target)
}

async fn fetch_with(client: &Client, args: &FetchArgs) -> Result<Option<PathBuf>, ClientError> {
    let id = start(client, args).await?;
    tracing::info!(download_id = %id, url = %args.url, format = %args.format, "download started");

    let job = wait_until_settled(
        client,
        &args.server,
        &id,
        Duration::from_millis(args.interval_ms),
    )
    .await?;
    let filename = job
        .filename
        .ok_or_else(|| ClientError::Failed("server reported no file name".to_string()))?;
    tracing::info!(download_id = %id, filename = %filename, "download completed");

    match &args.output {
        Some(dir) => {
            let saved = save(client, &args.server, &filename, dir).await?;
            tracing::info!(path = %saved.display(), "saved");
            Ok(Some(saved))
        }
        None => Ok(None),
    }
}

pub async fn fetch(args: FetchArgs) -> Result<(), ClientError> {
    let client = Client::new();
    fetch_with(&client, &args).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Path as UrlPath,
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    async fn mock_start(Json(body): Json<Value>) -> impl IntoResponse {
        match body["url"].as_str() {
            Some("https://x/bad") => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "URL is required"})),
            ),
            Some(_) => (
                StatusCode::OK,
                Json(json!({"download_id": "7", "status": "started"})),
            ),
            None => (StatusCode::BAD_REQUEST, Json(json!({"error": "URL is required"}))),
        }
    }

    async fn mock_status(UrlPath(id): UrlPath<String>) -> Json<Value> {
        Json(json!({
            "id": id,
            "status": "completed",
            "progress": 100,
            "filename": "My Clip.mp4",
            "error": null,
        }))
    }

    async fn mock_failed_status(UrlPath(id): UrlPath<String>) -> Json<Value> {
        Json(json!({
            "id": id,
            "status": "error",
            "progress": 12,
            "filename": null,
            "error": "Video unavailable",
        }))
    }

    async fn mock_file(UrlPath(name): UrlPath<String>) -> impl IntoResponse {
        if name == "My Clip.mp4" {
            (StatusCode::OK, "clip-bytes").into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }

    async fn start_mock_server(failing: bool) -> String {
        let status = if failing {
            get(mock_failed_status)
        } else {
            get(mock_status)
        };
        let app = Router::new()
            .route("/status/{id}", status)
            .route("/download", post(mock_start))
            .route("/downloads/{name}", get(mock_file));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn args(server: String, url: &str, output: Option<PathBuf>) -> FetchArgs {
        FetchArgs {
            url: url.to_string(),
            format: "video".to_string(),
            server,
            interval_ms: 10,
            output,
        }
    }

    fn client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("http://127.0.0.1:5067/", &["downloads", "My Clip.mp4"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5067/downloads/My%20Clip.mp4");
        assert!(matches!(
            endpoint("not a url", &["status"]),
            Err(ClientError::BadServer(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_and_save() {
        let server = start_mock_server(false).await;
        let out = TempDir::new().unwrap();

        let saved = fetch_with(
            &client(),
            &args(server, "https://x/y", Some(out.path().to_path_buf())),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(saved, out.path().join("My Clip.mp4"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"clip-bytes");
    }

    #[tokio::test]
    async fn test_fetch_reports_job_error() {
        let server = start_mock_server(true).await;
        let err = fetch_with(&client(), &args(server, "https://x/y", None))
            .await
            .unwrap_err();
        match err {
            ClientError::Failed(message) => assert_eq!(message, "Video unavailable"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_reports_rejection() {
        let server = start_mock_server(false).await;
        let err = fetch_with(&client(), &args(server, "https://x/bad", None))
            .await
            .unwrap_err();
        match err {
            ClientError::Rejected { status, message } => {
                assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                assert_eq!(message, "URL is required");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
