// Replay-chat downloader. The production implementation drives yt-dlp as a
// child process; tests substitute an in-process fake behind the same trait.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use chatscope_common::{PipelineError, Result};

/// Marker that prefixes our machine-readable progress lines on yt-dlp's stdout.
const PROGRESS_PREFIX: &str = "chatscope-progress";

const PROGRESS_TEMPLATE: &str = "download:chatscope-progress %(progress.fragment_index)s \
%(progress.fragment_count)s %(progress.downloaded_bytes)s";

/// Lines of yt-dlp stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Video fields reported by the downloader's info probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Upload time, epoch seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Scheduled start for premieres and streams; used when `timestamp` is missing.
    #[serde(default)]
    pub release_timestamp: Option<i64>,
}

impl VideoInfo {
    pub fn upload_timestamp(&self) -> Option<i64> {
        self.timestamp.or(self.release_timestamp)
    }
}

/// One progress report from an in-flight download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub fragment_index: Option<u64>,
    pub fragment_count: Option<u64>,
    pub downloaded_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Percent complete, when the fragment total is known.
    pub fn percent(&self) -> Option<u8> {
        let index = self.fragment_index?;
        let count = self.fragment_count.filter(|c| *c > 0)?;
        Some((index.min(count) * 100 / count) as u8)
    }
}

/// Result of a finished download: the probe info and the raw JSONL artifact.
#[derive(Debug, Clone)]
pub struct DownloadedChat {
    pub info: VideoInfo,
    pub path: PathBuf,
}

/// Called for every progress report. Returning an error aborts the download.
pub type ProgressHook<'a> = &'a (dyn Fn(DownloadProgress) -> Result<()> + Send + Sync);

#[async_trait]
pub trait ChatDownloader: Send + Sync {
    /// Download the replay chat of `url` into `work_dir`.
    ///
    /// The artifact is a line-delimited JSON file of chat actions at
    /// `<work_dir>/<id>.live_chat.json`. The caller owns and deletes it.
    async fn download(
        &self,
        url: &str,
        work_dir: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<DownloadedChat>;
}

/// Path of the replay-chat artifact for a video id.
pub fn live_chat_path(work_dir: &Path, video_id: &str) -> PathBuf {
    work_dir.join(format!("{video_id}.live_chat.json"))
}

pub struct YtDlpDownloader {
    program: String,
    socket_timeout: Duration,
}

impl YtDlpDownloader {
    pub fn new(program: impl Into<String>, socket_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            socket_timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--no-warnings")
            .arg("--socket-timeout")
            .arg(self.socket_timeout.as_secs().max(1).to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// `yt-dlp --dump-single-json`: title, id and timestamps without downloading.
    async fn probe(&self, url: &str) -> Result<VideoInfo> {
        let output = self
            .command()
            .args(["--dump-single-json", "--skip-download", url])
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Network(format!(
                "yt-dlp probe failed ({}): {}",
                output.status,
                tail(&stderr)
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::Format(format!("unreadable yt-dlp info JSON: {e}")))
    }

    /// Download the `live_chat` subtitle track, reporting progress per fragment.
    async fn fetch_live_chat(
        &self,
        url: &str,
        work_dir: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<()> {
        let mut cmd = self.command();
        cmd.args([
            "--skip-download",
            "--write-subs",
            "--sub-langs",
            "live_chat",
            "--newline",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "-o",
        ])
        .arg(work_dir.join("%(id)s"))
        .arg(url)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        debug!(pid = ?child.id(), "yt-dlp spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get yt-dlp stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get yt-dlp stderr"))?;

        let stderr_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).split(b'\n');
            let mut kept: Vec<String> = Vec::new();
            while let Ok(Some(raw)) = reader.next_segment().await {
                let line = decode_line(&raw);
                debug!("yt-dlp stderr: {}", line);
                kept.push(line);
                if kept.len() > STDERR_TAIL_LINES {
                    kept.remove(0);
                }
            }
            kept.join("\n")
        });

        // Titles and paths in yt-dlp output are not always valid UTF-8.
        let mut stdout_reader = BufReader::new(stdout).split(b'\n');
        while let Some(raw) = stdout_reader.next_segment().await? {
            let line = decode_line(&raw);
            match parse_progress_line(&line) {
                Some(progress) => {
                    if let Err(e) = on_progress(progress) {
                        if let Err(kill_err) = child.kill().await {
                            warn!(error = %kill_err, "Failed to kill yt-dlp");
                        }
                        stderr_handle.abort();
                        return Err(e);
                    }
                }
                None => debug!("yt-dlp: {}", line),
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_handle.await.unwrap_or_default();
        if !status.success() {
            return Err(PipelineError::Network(format!(
                "yt-dlp exited with {status}: {stderr_tail}"
            )));
        }
        Ok(())
    }

    fn spawn_error(&self, err: std::io::Error) -> PipelineError {
        if err.kind() == std::io::ErrorKind::NotFound {
            PipelineError::Configuration(format!(
                "downloader `{}` not found; install yt-dlp or set YT_DLP_PATH",
                self.program
            ))
        } else {
            PipelineError::Io(err)
        }
    }
}

#[async_trait]
impl ChatDownloader for YtDlpDownloader {
    async fn download(
        &self,
        url: &str,
        work_dir: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<DownloadedChat> {
        let info = self.probe(url).await?;
        info!(video_id = %info.id, title = ?info.title, "yt-dlp: probed video");

        let path = live_chat_path(work_dir, &info.id);
        if let Err(e) = self.fetch_live_chat(url, work_dir, on_progress).await {
            // Interrupted runs leave partial fragments behind.
            let partial = path.with_extension("json.part");
            for leftover in [&path, &partial] {
                if leftover.exists() {
                    let _ = std::fs::remove_file(leftover);
                }
            }
            return Err(e);
        }

        if !path.exists() {
            return Err(PipelineError::Format(format!(
                "no replay chat available for video {}",
                info.id
            )));
        }
        Ok(DownloadedChat { info, path })
    }
}

/// Parse a line produced by `PROGRESS_TEMPLATE`. yt-dlp prints `NA` for unknown fields.
fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace().map(|f| f.parse::<f64>().ok());
    let mut next = || fields.next().flatten().filter(|v| *v >= 0.0).map(|v| v as u64);
    Some(DownloadProgress {
        fragment_index: next(),
        fragment_count: next(),
        downloaded_bytes: next(),
    })
}

/// One output line without its `\r`, invalid bytes replaced.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_progress_template_output() {
        let p = parse_progress_line("chatscope-progress 3 12 40960").unwrap();
        assert_eq!(p.fragment_index, Some(3));
        assert_eq!(p.fragment_count, Some(12));
        assert_eq!(p.downloaded_bytes, Some(40960));
        assert_eq!(p.percent(), Some(25));
    }

    #[test]
    fn unknown_fields_are_none() {
        let p = parse_progress_line("chatscope-progress 7 NA 1.5e3").unwrap();
        assert_eq!(p.fragment_index, Some(7));
        assert_eq!(p.fragment_count, None);
        assert_eq!(p.downloaded_bytes, Some(1500));
        assert_eq!(p.percent(), None);
    }

    #[test]
    fn ignores_other_output() {
        assert!(parse_progress_line("[info] Writing video subtitles").is_none());
    }

    #[test]
    fn output_lines_decode_lossily() {
        assert_eq!(decode_line(b"[info] caf\xe9 title\r"), "[info] caf\u{fffd} title");
        assert_eq!(
            parse_progress_line(&decode_line(b"chatscope-progress 1 4 10\r")),
            Some(DownloadProgress {
                fragment_index: Some(1),
                fragment_count: Some(4),
                downloaded_bytes: Some(10),
            })
        );
    }

    #[test]
    fn percent_is_capped() {
        let p = DownloadProgress {
            fragment_index: Some(15),
            fragment_count: Some(10),
            downloaded_bytes: None,
        };
        assert_eq!(p.percent(), Some(100));
    }

    #[test]
    fn probe_json_prefers_timestamp() {
        let info: VideoInfo = serde_json::from_str(
            r#"{"id": "abc", "title": "t", "timestamp": 100, "release_timestamp": 50, "duration": 9}"#,
        )
        .unwrap();
        assert_eq!(info.upload_timestamp(), Some(100));

        let premiere: VideoInfo =
            serde_json::from_str(r#"{"id": "abc", "release_timestamp": 50}"#).unwrap();
        assert_eq!(premiere.upload_timestamp(), Some(50));
    }

    #[test]
    fn artifact_path_derives_from_id() {
        assert_eq!(
            live_chat_path(Path::new("/tmp/work"), "abc"),
            PathBuf::from("/tmp/work/abc.live_chat.json")
        );
    }

    #[tokio::test]
    async fn missing_binary_is_configuration_error() {
        let downloader = YtDlpDownloader::new(
            "chatscope-definitely-not-installed-binary",
            Duration::from_secs(5),
        );
        let dir = tempfile::tempdir().unwrap();
        let hook = |_: DownloadProgress| -> Result<()> { Ok(()) };
        let err = downloader
            .download("https://youtu.be/abc", dir.path(), &hook)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
