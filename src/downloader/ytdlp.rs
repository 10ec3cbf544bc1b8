use futures::future::BoxFuture;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::{
    DownloadError, DownloadOutcome, DownloadRequest, Downloader, ProgressEvent, ProgressSender,
};

const PROGRESS_MARKER: &str = "[mediafetch-progress]";
const OUTPUT_MARKER: &str = "[mediafetch-output]";

#[derive(Debug, Clone)]
pub struct YtDlpOptions {
    pub program: PathBuf,
    /// Output template relative to the request's output directory.
    pub output_template: String,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            output_template: "%(title)s.%(ext)s".to_string(),
        }
    }
}

/// Drives the `yt-dlp` executable, one child process per download.
pub struct YtDlp {
    options: YtDlpOptions,
}

#[derive(Debug, PartialEq)]
enum Line {
    Progress(ProgressEvent),
    Output(PathBuf),
}

#[derive(Debug, Default)]
struct ScanReport {
    output: Option<PathBuf>,
    last_error: Option<String>,
    last_line: Option<String>,
}

fn parse_bytes(field: &str) -> Option<u64> {
    let value = field.trim().parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

fn parse_line(line: &str) -> Option<Line> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(path) = line.strip_prefix(OUTPUT_MARKER) {
        return (!path.is_empty()).then(|| Line::Output(PathBuf::from(path)));
    }

    let fields = line.strip_prefix(PROGRESS_MARKER)?.trim_start();
    let mut parts = fields.splitn(5, '|');
    let status = parts.next()?;
    let downloaded = parts.next().and_then(parse_bytes);
    let total = parts.next().and_then(parse_bytes).filter(|t| *t > 0);
    let estimate = parts.next().and_then(parse_bytes).filter(|t| *t > 0);
    let filename = parts.next().unwrap_or_default();

    match status {
        "downloading" => Some(Line::Progress(ProgressEvent::Downloading {
            downloaded_bytes: downloaded.unwrap_or(0),
            total_bytes: total.or(estimate),
        })),
        "finished" if !filename.is_empty() && filename != "NA" => {
            Some(Line::Progress(ProgressEvent::Finished {
                filename: PathBuf::from(filename),
            }))
        }
        _ => None,
    }
}

async fn scan_output<R>(reader: R, progress: ProgressSender) -> std::io::Result<ScanReport>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut report = ScanReport::default();

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Some(Line::Progress(event)) => {
                // The job may already be gone from the receiving side; the
                // download still runs to completion.
                let _ = progress.send(event);
            }
            Some(Line::Output(path)) => report.output = Some(path),
            None => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                tracing::debug!(target: "mediafetch::yt_dlp", "{}", trimmed);
                if let Some(message) = trimmed.strip_prefix("ERROR:") {
                    report.last_error = Some(message.trim().to_string());
                }
                report.last_line = Some(trimmed.to_string());
            }
        }
    }

    Ok(report)
}

fn failure_message(
    stdout: &ScanReport,
    stderr: &ScanReport,
    program: &str,
    status: ExitStatus,
) -> String {
    stderr
        .last_error
        .clone()
        .or_else(|| stdout.last_error.clone())
        .or_else(|| stderr.last_line.clone())
        .unwrap_or_else(|| format!("{} exited with {}", program, status))
}

impl YtDlp {
    pub fn new(options: YtDlpOptions) -> Self {
        Self { options }
    }

    fn program_name(&self) -> String {
        self.options.program.display().to_string()
    }

    fn command_args(&self, request: &DownloadRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--newline",
            "--progress",
            "--no-simulate",
            "--progress-template",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push(
            format!(
                "download:{} %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.filename)s",
                PROGRESS_MARKER
            )
            .into(),
        );
        args.push("--print".into());
        args.push(format!("after_move:{}%(filepath)s", OUTPUT_MARKER).into());
        args.push("-f".into());
        args.push(request.params.format_selector.into());
        args.push("-o".into());
        args.push(
            request
                .output_dir
                .join(&self.options.output_template)
                .into_os_string(),
        );

        if let Some(transcode) = &request.params.transcode {
            args.push("-x".into());
            args.push("--audio-format".into());
            args.push(transcode.codec.clone().into());
            args.push("--audio-quality".into());
            args.push(format!("{}K", transcode.bitrate_kbps).into());
        }

        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }

    async fn run(
        &self,
        request: &DownloadRequest,
        progress: ProgressSender,
    ) -> Result<DownloadOutcome, DownloadError> {
        let program = self.program_name();
        let mut child = Command::new(&self.options.program)
            .args(self.command_args(request))
            .env("PYTHONIOENCODING", "UTF-8")
            .env("PYTHONUTF8", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::Launch {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Failed("stdout of yt-dlp was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Failed("stderr of yt-dlp was not captured".to_string()))?;

        let (stdout_report, stderr_report, status) = tokio::try_join!(
            scan_output(stdout, progress.clone()),
            scan_output(stderr, progress),
            child.wait(),
        )?;

        if !status.success() {
            return Err(DownloadError::Failed(failure_message(
                &stdout_report,
                &stderr_report,
                &program,
                status,
            )));
        }

        stdout_report
            .output
            .or(stderr_report.output)
            .map(|path| DownloadOutcome { path })
            .ok_or(DownloadError::MissingOutput)
    }
}

impl Downloader for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn download<'a>(
        &'a self,
        request: &'a DownloadRequest,
        progress: ProgressSender,
    ) -> BoxFuture<'a, Result<DownloadOutcome, DownloadError>> {
        Box::pin(self.run(request, progress))
    }
}
