// Thin CLI over the orchestration core

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use ytdlp_driver::config::{AppConfig, OutputFormat};
use ytdlp_driver::models::{JobOutcome, LogLevel, MediaInfo, ProgressEvent};
use ytdlp_driver::probe::{spawn_probe, ProbeEvent};
use ytdlp_driver::range::{validate_range_expr, PlaylistRange};
use ytdlp_driver::tools::{self, ToolKind};
use ytdlp_driver::worker::{JobEvent, JobWorker};
use ytdlp_driver::{build_fetch_options, validate_submission, FetchError, YtdlpEngine};

#[derive(Parser)]
#[command(name = "ytdlp-driver", version, about = "Headless yt-dlp job driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download one or more URLs
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Extract audio instead of downloading video
        #[arg(long)]
        audio: bool,
        /// Vertical resolution cap ("720", "1080") or "best"
        #[arg(long)]
        quality: Option<String>,
        /// Download folder (defaults to the configured one)
        #[arg(long, value_name = "DIR")]
        output: Option<String>,
        /// Playlist items to fetch, e.g. "1-3,5-7,10"
        #[arg(long, value_name = "RANGE")]
        items: Option<String>,
        /// Capture a livestream from its start
        #[arg(long)]
        live_from_start: bool,
        /// Also download subtitles in the configured language
        #[arg(long)]
        subtitles: bool,
        /// Embed the thumbnail into the output file
        #[arg(long)]
        embed_thumbnail: bool,
        /// Print every engine log line, not just warnings and errors
        #[arg(long)]
        verbose: bool,
    },
    /// Inspect a URL without downloading anything
    Probe { url: String },
    /// Show detected external tools
    Tools,
    /// Print the active configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(message) = startup_checks(&cli.command) {
        eprintln!("{}", message);
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Fail fast on a missing engine; degrade gracefully on missing ffmpeg.
fn startup_checks(command: &Command) -> Result<(), String> {
    if matches!(command, Command::Tools | Command::Config) {
        return Ok(());
    }

    let ytdlp = tools::detect(ToolKind::YtDlp);
    if !ytdlp.is_available {
        return Err(
            "yt-dlp was not found on this system.\n\
             Install it first, e.g.:\n\
               brew install yt-dlp\n\
               pip install yt-dlp"
                .to_string(),
        );
    }

    let ffmpeg = tools::detect(ToolKind::Ffmpeg);
    if !ffmpeg.is_available {
        eprintln!(
            "[Startup] ffmpeg not found: audio extraction, remuxing and \
             thumbnail embedding are unavailable. Plain downloads still work."
        );
    }

    Ok(())
}

async fn run(command: Command) -> Result<(), FetchError> {
    match command {
        Command::Fetch {
            urls,
            audio,
            quality,
            output,
            items,
            live_from_start,
            subtitles,
            embed_thumbnail,
            verbose,
        } => {
            let mut config = AppConfig::load();
            if audio {
                config.output_format = OutputFormat::Audio;
            }
            if let Some(quality) = quality {
                config.video_quality = quality;
            }
            if let Some(output) = output {
                config.download_path = output;
            }
            if subtitles {
                config.download_subtitles = true;
            }
            if embed_thumbnail {
                config.embed_thumbnail = true;
            }

            let range = match items {
                Some(expr) => {
                    // Reject malformed ranges before anything spawns.
                    validate_range_expr(&expr)?;
                    PlaylistRange::Items(expr)
                }
                None => PlaylistRange::Full,
            };

            validate_submission(&config, &range)?;
            let options = build_fetch_options(&config, urls, &range, live_from_start);

            run_fetch(options, verbose).await
        }
        Command::Probe { url } => run_probe(url).await,
        Command::Tools => {
            for kind in [ToolKind::YtDlp, ToolKind::Ffmpeg] {
                let info = tools::detect(kind);
                match (&info.path, &info.version) {
                    (Some(path), Some(version)) => {
                        println!("{:<8} {} ({})", info.name, version, path)
                    }
                    (Some(path), None) => println!("{:<8} found at {}", info.name, path),
                    _ => println!("{:<8} not found", info.name),
                }
            }
            Ok(())
        }
        Command::Config => {
            let config = AppConfig::load();
            let text = serde_json::to_string_pretty(&config)
                .map_err(|e| FetchError::Parse(e.to_string()))?;
            println!("{}", text);
            if let Some(path) = AppConfig::config_file() {
                println!("# {}", path.display());
            }
            Ok(())
        }
    }
}

async fn run_fetch(
    options: ytdlp_driver::FetchOptions,
    verbose: bool,
) -> Result<(), FetchError> {
    let worker = JobWorker::new(Arc::new(YtdlpEngine::new()));
    let mut handle = worker.submit(options);

    // Ctrl-C requests cooperative cancellation; the engine stops at its
    // next progress tick.
    let token = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            token.cancel();
        }
    });

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")
            .expect("static progress template"),
    );

    let mut outcome = None;
    while let Some(event) = handle.recv().await {
        match event {
            JobEvent::Progress(ProgressEvent::Downloading {
                percent,
                rate,
                eta,
                title,
                ..
            }) => {
                bar.set_position(percent as u64);
                if eta.is_empty() {
                    bar.set_message(title);
                } else {
                    bar.set_message(format!("{} @ {} ETA {}", title, rate, eta));
                }
            }
            JobEvent::Progress(ProgressEvent::Finished { title }) => {
                bar.set_position(100);
                bar.set_message(format!("processing {}", title));
            }
            JobEvent::Progress(ProgressEvent::Error { message }) => {
                bar.println(message);
            }
            JobEvent::Log { message, level } => {
                if verbose || level >= LogLevel::Warning {
                    bar.println(format!("[{}] {}", level.as_str(), message));
                }
            }
            JobEvent::Done(done) => {
                outcome = Some(done);
            }
        }
    }
    bar.finish_and_clear();

    match outcome {
        Some(JobOutcome::Succeeded(message)) => {
            println!("{}", message);
            Ok(())
        }
        Some(JobOutcome::Cancelled) => {
            println!("Download cancelled.");
            Ok(())
        }
        Some(JobOutcome::Failed(message)) => Err(FetchError::Engine(message)),
        // The worker guarantees a terminal event; this is unreachable in
        // practice but should not panic the CLI.
        None => Err(FetchError::Unknown("job ended without an outcome".to_string())),
    }
}

async fn run_probe(url: String) -> Result<(), FetchError> {
    let handle = spawn_probe(Arc::new(YtdlpEngine::new()), url);

    match handle.recv().await {
        Some(ProbeEvent::Info(info)) => {
            match *info {
                MediaInfo::Playlist(playlist) => {
                    println!("Playlist: {} ({} items)", playlist.title, playlist.entries.len());
                    for (position, entry) in playlist.entries.iter().enumerate() {
                        match entry.duration {
                            Some(seconds) => println!(
                                "{:>4}. {} [{}]",
                                position + 1,
                                entry.title,
                                format_duration(seconds)
                            ),
                            None => println!("{:>4}. {}", position + 1, entry.title),
                        }
                    }
                }
                MediaInfo::Single(item) => {
                    println!("Title:    {}", item.title);
                    println!("Uploader: {}", item.uploader);
                    if let Some(seconds) = item.duration {
                        println!("Duration: {}", format_duration(seconds));
                    }
                    if let Some(thumbnail) = &item.thumbnail {
                        println!("Thumbnail: {}", thumbnail);
                    }
                    if let Some(data) = &item.thumbnail_data {
                        println!("Thumbnail cached ({} bytes)", data.len());
                    }
                }
            }
            Ok(())
        }
        Some(ProbeEvent::Error(message)) => Err(FetchError::Engine(message)),
        None => Err(FetchError::Unknown("probe ended without a result".to_string())),
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds as i64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_under_an_hour() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(65.0), "1:05");
        assert_eq!(format_duration(3599.0), "59:59");
    }

    #[test]
    fn test_format_duration_with_hours() {
        assert_eq!(format_duration(3600.0), "1:00:00");
        assert_eq!(format_duration(5405.0), "1:30:05");
        assert_eq!(format_duration(7322.5), "2:02:02");
    }
}
