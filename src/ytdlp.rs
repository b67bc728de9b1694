// yt-dlp engine adapter
//
// Drives the native yt-dlp binary as a child process and translates its
// line-oriented output into the progress protocol. The binary exposes no
// stop API, so an Abort verdict from the progress hook is translated
// into killing the child.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use crate::engine::{Engine, EventSink, HookAction};
use crate::errors::FetchError;
use crate::models::{
    FetchOptions, ItemInfo, LogLevel, MediaInfo, PlaylistEntry, PlaylistInfo, Postprocessor,
    ProgressEvent,
};
use crate::tools;

/// Upper bound for one metadata probe, on top of the engine's own
/// per-request socket timeout.
const PROBE_TIMEOUT_SECS: u64 = 60;

/// How many trailing warning/error lines to keep for the failure report.
const STDERR_TAIL_LINES: usize = 20;

pub struct YtdlpEngine {
    ytdlp_path: String,
}

impl YtdlpEngine {
    pub fn new() -> Self {
        Self {
            ytdlp_path: tools::find_ytdlp(),
        }
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: path.into(),
        }
    }

    fn build_fetch_args(options: &FetchOptions) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            options.format.clone(),
            "-o".to_string(),
            options.output_template.clone(),
            // One progress line per tick instead of carriage returns.
            "--newline".to_string(),
        ];

        if options.geo_bypass {
            args.push("--geo-bypass".to_string());
            if let Some(country) = &options.geo_country {
                args.push("--geo-bypass-country".to_string());
                args.push(country.clone());
            }
        }

        if options.live_from_start {
            args.push("--live-from-start".to_string());
        }

        if let Some(items) = &options.playlist_items {
            args.push("--playlist-items".to_string());
            args.push(items.clone());
        }

        if options.write_subtitles {
            args.push("--write-subs".to_string());
            if let Some(lang) = &options.subtitle_language {
                args.push("--sub-langs".to_string());
                args.push(lang.clone());
            }
        }

        if options.write_thumbnail {
            args.push("--write-thumbnail".to_string());
        }

        for postprocessor in &options.postprocessors {
            match postprocessor {
                Postprocessor::ExtractAudio { codec, quality } => {
                    args.push("-x".to_string());
                    args.push("--audio-format".to_string());
                    args.push(codec.clone());
                    args.push("--audio-quality".to_string());
                    args.push(quality.clone());
                }
                Postprocessor::Remux { container } => {
                    args.push("--remux-video".to_string());
                    args.push(container.clone());
                }
                Postprocessor::EmbedThumbnail => {
                    args.push("--embed-thumbnail".to_string());
                }
            }
        }

        args.extend(options.urls.iter().cloned());
        args
    }

    fn build_probe_args(url: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            // Shallow entries are enough for a playlist listing.
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
            "--retries".to_string(),
            "2".to_string(),
            url.to_string(),
        ]
    }
}

impl Default for YtdlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for YtdlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(
        &self,
        options: &FetchOptions,
        sink: &mut dyn EventSink,
    ) -> Result<(), FetchError> {
        let args = Self::build_fetch_args(options);

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FetchError::Spawn(format!("Failed to start {}: {}", self.ytdlp_path, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Spawn("Failed to capture yt-dlp stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Spawn("Failed to capture yt-dlp stderr".to_string()))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;

        let mut current_title = String::new();
        let mut stderr_tail: Vec<String> = Vec::new();
        let mut aborted = false;

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_progress_line(&line, &mut current_title) {
                            if sink.on_progress(event) == HookAction::Abort {
                                aborted = true;
                                break;
                            }
                        } else if !line.trim().is_empty() {
                            sink.on_log(&line, classify_log_line(&line));
                        }
                    }
                    _ => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(line)) => {
                        if relay_stderr_line(line, sink, &mut stderr_tail) == HookAction::Abort {
                            aborted = true;
                            break;
                        }
                    }
                    _ => err_done = true,
                },
            }
        }

        if aborted {
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Err(FetchError::Cancelled);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FetchError::Engine(format!("Failed to wait for yt-dlp: {}", e)))?;

        if status.success() {
            Ok(())
        } else if stderr_tail.is_empty() {
            Err(FetchError::Engine(format!(
                "yt-dlp exited with {}",
                status
            )))
        } else {
            Err(FetchError::from(stderr_tail.join("\n")))
        }
    }

    async fn probe(&self, url: &str) -> Result<MediaInfo, FetchError> {
        let args = Self::build_probe_args(url);
        let output =
            run_output_with_timeout(&self.ytdlp_path, args, PROBE_TIMEOUT_SECS).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FetchError::Engine(format!(
                "Failed to read media info: {}",
                stderr
            )));
        }

        parse_media_info(&output.stdout)
    }
}

/// Run a command to completion with a hard timeout, collecting output.
async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, FetchError> {
    let child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Reap the process if the timeout wins the race below.
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| FetchError::Spawn(format!("Failed to start {}: {}", program, e)))?;

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(result) => {
            result.map_err(|e| FetchError::Engine(format!("Failed to wait for {}: {}", program, e)))
        }
        Err(_) => Err(FetchError::Engine(format!(
            "{} timed out after {}s",
            program, timeout_secs
        ))),
    }
}

lazy_static! {
    // [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*)\s*([KMGT]?i?B)\s+at\s+(\S+)(?:\s+ETA\s+(\S+))?"
    ).unwrap();
    static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
    // [download] 100% of 343.72MiB in 00:12
    static ref DONE_RE: Regex = Regex::new(r"\[download\]\s+100%\s+of\s+\S+\s+in\s+").unwrap();
    static ref MERGE_RE: Regex = Regex::new(r"\[Merger\]\s+Merging").unwrap();
    static ref ALREADY_RE: Regex = Regex::new(r"has already been downloaded").unwrap();
}

/// Map one stdout line to a progress event, tracking the current item
/// title from Destination lines. Returns `None` for plain log lines.
fn parse_progress_line(line: &str, current_title: &mut String) -> Option<ProgressEvent> {
    if let Some(caps) = DEST_RE.captures(line) {
        let filename = caps.get(1).map(|m| m.as_str()).unwrap_or("file");
        let short_name = filename.rsplit('/').next().unwrap_or(filename);
        *current_title = short_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(short_name)
            .to_string();

        return Some(ProgressEvent::Downloading {
            percent: 0.0,
            rate: String::new(),
            downloaded_bytes: 0,
            total_bytes: None,
            eta: String::new(),
            title: current_title.clone(),
        });
    }

    if DONE_RE.is_match(line) || MERGE_RE.is_match(line) || ALREADY_RE.is_match(line) {
        return Some(ProgressEvent::Finished {
            title: current_title.clone(),
        });
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        // Unparseable percentage degrades to 0 instead of failing.
        let percent: f32 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0);
        let total_bytes = match (caps.get(2), caps.get(3)) {
            (Some(value), Some(unit)) => parse_size(value.as_str(), unit.as_str()),
            _ => None,
        };
        let rate = caps.get(4).map(|m| m.as_str()).unwrap_or("").to_string();
        let eta = caps.get(5).map(|m| m.as_str()).unwrap_or("").to_string();
        let downloaded_bytes = total_bytes
            .map(|total| (total as f64 * f64::from(percent) / 100.0) as u64)
            .unwrap_or(0);

        return Some(ProgressEvent::Downloading {
            percent,
            rate,
            downloaded_bytes,
            total_bytes,
            eta,
            title: current_title.clone(),
        });
    }

    None
}

fn parse_size(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    let multiplier: f64 = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

/// Relay one stderr line to the sink. Exactly one foreground event per
/// line: error lines travel as `ProgressEvent::Error` ticks (which also
/// gives cancellation a poll point during phases with no download
/// progress), everything else as log traffic. Warnings and errors are
/// kept in `tail` for the failure report.
fn relay_stderr_line(
    line: String,
    sink: &mut dyn EventSink,
    tail: &mut Vec<String>,
) -> HookAction {
    let level = classify_log_line(&line);

    if level >= LogLevel::Warning {
        tail.push(line.clone());
        if tail.len() > STDERR_TAIL_LINES {
            tail.remove(0);
        }
    }

    if level == LogLevel::Error {
        sink.on_progress(ProgressEvent::Error { message: line })
    } else {
        sink.on_log(&line, level);
        HookAction::Continue
    }
}

/// Severity of an output line, by yt-dlp's own prefixes.
fn classify_log_line(line: &str) -> LogLevel {
    if line.starts_with("ERROR:") {
        LogLevel::Error
    } else if line.starts_with("WARNING:") {
        LogLevel::Warning
    } else if line.starts_with("[debug]") {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Parse `--dump-single-json` output. A non-empty entries array means
/// the source is a playlist; anything else is a single item.
fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, FetchError> {
    let json_str = String::from_utf8_lossy(stdout);
    let json: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| FetchError::Parse(format!("Invalid JSON from yt-dlp: {}", e)))?;

    if let Some(entries) = json["entries"].as_array() {
        if !entries.is_empty() {
            let entries = entries
                .iter()
                .map(|entry| PlaylistEntry {
                    id: entry["id"].as_str().unwrap_or("").to_string(),
                    title: entry["title"].as_str().unwrap_or("Unknown").to_string(),
                    duration: entry["duration"].as_f64(),
                })
                .collect();

            return Ok(MediaInfo::Playlist(PlaylistInfo {
                title: json["title"].as_str().unwrap_or("Unknown").to_string(),
                entries,
            }));
        }
    }

    Ok(MediaInfo::Single(ItemInfo {
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        duration: json["duration"].as_f64(),
        uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
        thumbnail: json["thumbnail"].as_str().map(str::to_string),
        thumbnail_data: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::options::build_fetch_options;
    use crate::range::PlaylistRange;

    fn parse(line: &str) -> Option<ProgressEvent> {
        let mut title = String::new();
        parse_progress_line(line, &mut title)
    }

    #[test]
    fn test_progress_line_parsing() {
        let event = parse("[download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32");
        match event {
            Some(ProgressEvent::Downloading {
                percent,
                rate,
                total_bytes,
                eta,
                ..
            }) => {
                assert!((percent - 6.2).abs() < 0.01);
                assert_eq!(rate, "420.30KiB/s");
                assert_eq!(eta, "12:32");
                assert_eq!(total_bytes, Some((343.72 * 1024.0 * 1024.0) as u64));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_progress_without_eta() {
        let event = parse("[download]  50.0% of 10.00MiB at 1.00MiB/s");
        match event {
            Some(ProgressEvent::Downloading { percent, eta, downloaded_bytes, .. }) => {
                assert_eq!(percent, 50.0);
                assert!(eta.is_empty());
                assert_eq!(downloaded_bytes, 5 * 1024 * 1024);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_destination_line_sets_title() {
        let mut title = String::new();
        let event =
            parse_progress_line("[download] Destination: /tmp/out/My Video.mp4", &mut title);
        assert_eq!(title, "My Video");
        match event {
            Some(ProgressEvent::Downloading { percent, title, .. }) => {
                assert_eq!(percent, 0.0);
                assert_eq!(title, "My Video");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_final_line_is_finished() {
        assert!(matches!(
            parse("[download] 100% of 343.72MiB in 00:12"),
            Some(ProgressEvent::Finished { .. })
        ));
    }

    #[test]
    fn test_merge_and_already_downloaded_are_finished() {
        assert!(matches!(
            parse("[Merger] Merging formats into \"out.mp4\""),
            Some(ProgressEvent::Finished { .. })
        ));
        assert!(matches!(
            parse("[download] /tmp/out/clip.mp4 has already been downloaded"),
            Some(ProgressEvent::Finished { .. })
        ));
    }

    #[test]
    fn test_plain_lines_are_not_progress() {
        assert_eq!(parse("[youtube] abc123: Downloading webpage"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1.5", "KiB"), Some(1536));
        assert_eq!(parse_size("2", "MB"), Some(2_000_000));
        assert_eq!(parse_size("1", "GiB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("x", "MiB"), None);
        assert_eq!(parse_size("1", "parsecs"), None);
    }

    #[derive(Default)]
    struct RecordingSink {
        progress: Vec<ProgressEvent>,
        logs: Vec<(String, LogLevel)>,
    }

    impl EventSink for RecordingSink {
        fn on_progress(&mut self, event: ProgressEvent) -> HookAction {
            self.progress.push(event);
            HookAction::Continue
        }

        fn on_log(&mut self, message: &str, level: LogLevel) {
            self.logs.push((message.to_string(), level));
        }
    }

    #[test]
    fn test_stderr_error_line_is_relayed_exactly_once() {
        let mut sink = RecordingSink::default();
        let mut tail = Vec::new();

        let verdict = relay_stderr_line(
            "ERROR: fragment 3 not found".to_string(),
            &mut sink,
            &mut tail,
        );

        assert_eq!(verdict, HookAction::Continue);
        assert_eq!(
            sink.progress,
            vec![ProgressEvent::Error {
                message: "ERROR: fragment 3 not found".to_string()
            }]
        );
        assert!(sink.logs.is_empty());
        assert_eq!(tail, vec!["ERROR: fragment 3 not found".to_string()]);
    }

    #[test]
    fn test_stderr_warning_goes_to_log_channel_only() {
        let mut sink = RecordingSink::default();
        let mut tail = Vec::new();

        relay_stderr_line("WARNING: throttled".to_string(), &mut sink, &mut tail);

        assert!(sink.progress.is_empty());
        assert_eq!(
            sink.logs,
            vec![("WARNING: throttled".to_string(), LogLevel::Warning)]
        );
        assert_eq!(tail, vec!["WARNING: throttled".to_string()]);
    }

    #[test]
    fn test_stderr_tail_is_capped() {
        let mut sink = RecordingSink::default();
        let mut tail = Vec::new();

        for n in 0..STDERR_TAIL_LINES + 5 {
            relay_stderr_line(format!("WARNING: {}", n), &mut sink, &mut tail);
        }

        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.last().unwrap(), &format!("WARNING: {}", STDERR_TAIL_LINES + 4));
    }

    #[test]
    fn test_log_line_classification() {
        assert_eq!(classify_log_line("ERROR: boom"), LogLevel::Error);
        assert_eq!(classify_log_line("WARNING: old"), LogLevel::Warning);
        assert_eq!(classify_log_line("[debug] command line"), LogLevel::Debug);
        assert_eq!(classify_log_line("[youtube] extracting"), LogLevel::Info);
    }

    fn audio_options() -> FetchOptions {
        let mut config = AppConfig::default();
        config.download_path = "/tmp/out".to_string();
        config.output_format = crate::config::OutputFormat::Audio;
        build_fetch_options(
            &config,
            vec!["https://example.com/v".to_string()],
            &PlaylistRange::Full,
            false,
        )
    }

    #[test]
    fn test_audio_args() {
        let args = YtdlpEngine::build_fetch_args(&audio_options());
        assert!(args.contains(&"-x".to_string()));
        let codec_pos = args.iter().position(|a| a == "--audio-format").unwrap();
        assert_eq!(args[codec_pos + 1], "mp3");
        let quality_pos = args.iter().position(|a| a == "--audio-quality").unwrap();
        assert_eq!(args[quality_pos + 1], "192");
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn test_geo_flags_travel_together() {
        let mut config = AppConfig::default();
        config.download_path = "/tmp/out".to_string();
        config.geo_bypass = true;
        config.geo_country = "DE".to_string();
        let options = build_fetch_options(
            &config,
            vec!["u".to_string()],
            &PlaylistRange::Full,
            false,
        );

        let args = YtdlpEngine::build_fetch_args(&options);
        assert!(args.contains(&"--geo-bypass".to_string()));
        let pos = args.iter().position(|a| a == "--geo-bypass-country").unwrap();
        assert_eq!(args[pos + 1], "DE");

        config.geo_bypass = false;
        let options = build_fetch_options(
            &config,
            vec!["u".to_string()],
            &PlaylistRange::Full,
            false,
        );
        let args = YtdlpEngine::build_fetch_args(&options);
        assert!(!args.iter().any(|a| a.starts_with("--geo-bypass")));
    }

    #[test]
    fn test_playlist_and_livestream_args() {
        let mut config = AppConfig::default();
        config.download_path = "/tmp/out".to_string();
        let options = build_fetch_options(
            &config,
            vec!["u".to_string()],
            &PlaylistRange::Items("1-3,7".to_string()),
            true,
        );

        let args = YtdlpEngine::build_fetch_args(&options);
        let pos = args.iter().position(|a| a == "--playlist-items").unwrap();
        assert_eq!(args[pos + 1], "1-3,7");
        assert!(args.contains(&"--live-from-start".to_string()));
    }

    #[test]
    fn test_thumbnail_args() {
        let mut config = AppConfig::default();
        config.download_path = "/tmp/out".to_string();
        config.embed_thumbnail = true;
        let options = build_fetch_options(
            &config,
            vec!["u".to_string()],
            &PlaylistRange::Full,
            false,
        );

        let args = YtdlpEngine::build_fetch_args(&options);
        assert!(args.contains(&"--write-thumbnail".to_string()));
        assert!(args.contains(&"--embed-thumbnail".to_string()));
    }

    #[test]
    fn test_parse_media_info_playlist() {
        let json = r#"{
            "title": "My Mix",
            "entries": [
                {"id": "a1", "title": "First", "duration": 61.0},
                {"id": "b2", "title": "Second"}
            ]
        }"#;

        match parse_media_info(json.as_bytes()).unwrap() {
            MediaInfo::Playlist(playlist) => {
                assert_eq!(playlist.title, "My Mix");
                assert_eq!(playlist.entries.len(), 2);
                assert_eq!(playlist.entries[0].id, "a1");
                assert_eq!(playlist.entries[0].duration, Some(61.0));
                assert_eq!(playlist.entries[1].duration, None);
            }
            other => panic!("expected playlist, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_info_single_item() {
        let json = r#"{
            "title": "Solo",
            "duration": 120.5,
            "uploader": "someone",
            "thumbnail": "https://example.com/t.jpg"
        }"#;

        match parse_media_info(json.as_bytes()).unwrap() {
            MediaInfo::Single(item) => {
                assert_eq!(item.title, "Solo");
                assert_eq!(item.duration, Some(120.5));
                assert_eq!(item.uploader, "someone");
                assert_eq!(item.thumbnail.as_deref(), Some("https://example.com/t.jpg"));
                assert!(item.thumbnail_data.is_none());
            }
            other => panic!("expected single item, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_info_empty_entries_is_single() {
        let json = r#"{"title": "Odd", "entries": []}"#;
        assert!(matches!(
            parse_media_info(json.as_bytes()).unwrap(),
            MediaInfo::Single(_)
        ));
    }

    #[test]
    fn test_parse_media_info_rejects_garbage() {
        assert!(matches!(
            parse_media_info(b"not json"),
            Err(FetchError::Parse(_))
        ));
    }
}
