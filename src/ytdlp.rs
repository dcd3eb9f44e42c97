// yt-dlp backed strategy runner
//
// Translates an ExtractionStrategy into a yt-dlp invocation: player clients,
// headers and proxy from the client profile, format selector and transcode
// flags from the processing pipeline. Each run gets a bounded timeout; the
// process is killed on expiry.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::ExtractError;
use crate::models::{MediaMetadata, VideoDetails};
use crate::strategy::{Egress, ExtractionStrategy, PostProcessing};

/// Seam between the orchestrator and the actual media tooling, so tests can
/// script per-strategy outcomes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch title/duration/uploader for a strategy without committing to a
    /// transfer.
    async fn probe(
        &self,
        url: &str,
        strategy: &ExtractionStrategy,
    ) -> Result<MediaMetadata, ExtractError>;

    /// Perform the transfer for a strategy. The output lands at the
    /// strategy's output template with the resolved extension.
    async fn transfer(&self, url: &str, strategy: &ExtractionStrategy)
        -> Result<(), ExtractError>;

    /// Rich metadata for the info-only path.
    async fn video_details(&self, url: &str) -> Result<VideoDetails, ExtractError>;
}

pub struct YtDlpFetcher {
    ytdlp_path: String,
    metadata_timeout: Duration,
    transfer_timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(metadata_timeout: Duration, transfer_timeout: Duration) -> Self {
        Self {
            ytdlp_path: find_ytdlp(),
            metadata_timeout,
            transfer_timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.ytdlp_path)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Flags shared by every invocation for a strategy.
    fn common_args(&self, strategy: &ExtractionStrategy) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
            "--retries".to_string(),
            "1".to_string(),
            "--user-agent".to_string(),
            strategy.client.user_agent.to_string(),
        ];

        let extractor_args = if strategy.client.skip_manifests {
            format!(
                "youtube:player_client={};skip=dash,hls",
                strategy.client.player_clients
            )
        } else {
            format!("youtube:player_client={}", strategy.client.player_clients)
        };
        args.push("--extractor-args".to_string());
        args.push(extractor_args);

        for (name, value) in &strategy.client.extra_headers {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        if let Egress::Proxy(addr) = &strategy.egress {
            args.push("--proxy".to_string());
            args.push(addr.clone());
        }

        args
    }

    fn probe_args(&self, url: &str, strategy: &ExtractionStrategy) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string(), "--skip-download".to_string()];
        args.extend(self.common_args(strategy));
        args.push(url.to_string());
        args
    }

    fn transfer_args(&self, url: &str, strategy: &ExtractionStrategy) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            strategy.format_selector.to_string(),
            "-o".to_string(),
            strategy.output_template.clone(),
        ];
        args.extend(self.common_args(strategy));
        if let PostProcessing::Transcode { codec, quality } = &strategy.post_processing {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(codec.to_string());
            args.push("--audio-quality".to_string());
            args.push(format!("{}K", quality));
        }
        args.push(url.to_string());
        args
    }

    async fn run(&self, args: Vec<String>, limit: Duration) -> Result<Vec<u8>, ExtractError> {
        let output = run_output_with_timeout(&self.ytdlp_path, args, limit).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(ExtractError::Execution(stderr));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(
        &self,
        url: &str,
        strategy: &ExtractionStrategy,
    ) -> Result<MediaMetadata, ExtractError> {
        debug!("probing via {}", strategy.label);
        let stdout = self
            .run(self.probe_args(url, strategy), self.metadata_timeout)
            .await?;
        let json = parse_json(&stdout)?;
        Ok(MediaMetadata {
            title: json["title"].as_str().unwrap_or("audio").to_string(),
            duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
            uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
        })
    }

    async fn transfer(
        &self,
        url: &str,
        strategy: &ExtractionStrategy,
    ) -> Result<(), ExtractError> {
        debug!("transferring via {}", strategy.label);
        self.run(self.transfer_args(url, strategy), self.transfer_timeout)
            .await?;
        Ok(())
    }

    async fn video_details(&self, url: &str) -> Result<VideoDetails, ExtractError> {
        let args = vec![
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
            "--extractor-args".to_string(),
            "youtube:player_client=android_music,android,web;skip=dash,hls".to_string(),
            url.to_string(),
        ];
        let stdout = self.run(args, self.metadata_timeout).await?;
        let json = parse_json(&stdout)?;
        Ok(parse_video_details(&json))
    }
}

fn parse_json(stdout: &[u8]) -> Result<serde_json::Value, ExtractError> {
    let text = String::from_utf8_lossy(stdout);
    serde_json::from_str(&text).map_err(|e| ExtractError::Parse(format!("invalid JSON: {}", e)))
}

fn parse_video_details(json: &serde_json::Value) -> VideoDetails {
    let description_excerpt = json["description"].as_str().and_then(|d| {
        if d.is_empty() {
            None
        } else {
            let excerpt: String = d.chars().take(300).collect();
            Some(if d.chars().count() > 300 {
                format!("{}...", excerpt)
            } else {
                excerpt
            })
        }
    });

    let string_list = |value: &serde_json::Value, limit: usize| -> Vec<String> {
        value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .take(limit)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };

    VideoDetails {
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
        view_count: json["view_count"].as_u64(),
        upload_date: json["upload_date"].as_str().map(String::from),
        description_excerpt,
        thumbnail_url: json["thumbnail"].as_str().unwrap_or("").to_string(),
        categories: string_list(&json["categories"], usize::MAX),
        tags: string_list(&json["tags"], 10),
    }
}

/// Locate the yt-dlp binary. `YTDLP_PATH` overrides the search.
fn find_ytdlp() -> String {
    if let Ok(path) = std::env::var("YTDLP_PATH") {
        if !path.is_empty() {
            return path;
        }
    }

    let common_paths = ["/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp", "/opt/homebrew/bin/yt-dlp"];
    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    "yt-dlp".to_string()
}

/// Run a command, capture output, kill it if the limit expires.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    limit: Duration,
) -> Result<std::process::Output, ExtractError> {
    // kill_on_drop: caller-side cancellation must not leave the process
    // running to the end of its own timeout.
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExtractError::ToolNotFound(format!("{}: {}", program, e)))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| ExtractError::Execution(format!("no stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| ExtractError::Execution(format!("no stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    match timeout(limit, child.wait()).await {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| ExtractError::Execution(format!("failed to wait for {}: {}", program, e)))?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ExtractError::Timeout(limit.as_secs()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::build_chain;
    use std::path::Path;

    fn strategies() -> Vec<ExtractionStrategy> {
        build_chain(Path::new("/tmp/store"), "id123", Some("socks5h://10.0.0.1:1080"))
    }

    #[test]
    fn probe_args_never_download() {
        let fetcher = YtDlpFetcher::new(Duration::from_secs(30), Duration::from_secs(300));
        for strategy in strategies() {
            let args = fetcher.probe_args("https://youtu.be/abc", &strategy);
            assert!(args.contains(&"--dump-json".to_string()));
            assert!(args.contains(&"--skip-download".to_string()));
            assert!(!args.contains(&"-x".to_string()));
        }
    }

    #[test]
    fn transfer_args_carry_selector_and_template() {
        let fetcher = YtDlpFetcher::new(Duration::from_secs(30), Duration::from_secs(300));
        let strategy = &strategies()[0];
        let args = fetcher.transfer_args("https://youtu.be/abc", strategy);
        let f_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_pos + 1], "bestaudio/best");
        let o_pos = args.iter().position(|a| a == "-o").unwrap();
        assert!(args[o_pos + 1].contains("id123"));
        assert!(args.contains(&"--audio-format".to_string()));
        assert!(args.contains(&"192K".to_string()));
    }

    #[test]
    fn raw_strategy_skips_transcoding() {
        let fetcher = YtDlpFetcher::new(Duration::from_secs(30), Duration::from_secs(300));
        let raw = strategies().into_iter().last().unwrap();
        let args = fetcher.transfer_args("https://youtu.be/abc", &raw);
        assert!(!args.contains(&"-x".to_string()));
        assert!(!args.contains(&"--audio-format".to_string()));
    }

    #[test]
    fn proxied_strategy_sets_proxy_flag() {
        let fetcher = YtDlpFetcher::new(Duration::from_secs(30), Duration::from_secs(300));
        let proxied = strategies()
            .into_iter()
            .find(|s| s.is_proxied())
            .unwrap();
        let args = fetcher.transfer_args("https://youtu.be/abc", &proxied);
        let pos = args.iter().position(|a| a == "--proxy").unwrap();
        assert_eq!(args[pos + 1], "socks5h://10.0.0.1:1080");
        assert!(args
            .iter()
            .any(|a| a.starts_with("X-Forwarded-For:")));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let err = run_output_with_timeout(
            "sleep",
            vec!["5".to_string()],
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_tool_reports_not_found() {
        let err = run_output_with_timeout(
            "definitely-not-a-real-binary",
            Vec::new(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::ToolNotFound(_)));
    }

    #[test]
    fn details_excerpt_is_bounded() {
        let long = "x".repeat(400);
        let json = serde_json::json!({
            "title": "t", "uploader": "u", "duration": 12.0,
            "description": long, "thumbnail": "http://t",
            "tags": (0..20).map(|i| i.to_string()).collect::<Vec<_>>(),
            "categories": ["Music"],
        });
        let details = parse_video_details(&json);
        let excerpt = details.description_excerpt.unwrap();
        assert_eq!(excerpt.chars().count(), 303);
        assert!(excerpt.ends_with("..."));
        assert_eq!(details.tags.len(), 10);
        assert_eq!(details.categories, vec!["Music"]);
    }
}
