// OptionsBuilder - maps persisted user configuration to engine options
//
// The format expression and post-processor ordering are the
// compatibility contract with the engine; change them only against a
// real yt-dlp run.

use crate::config::{AppConfig, OutputFormat};
use crate::errors::FetchError;
use crate::models::{FetchOptions, Postprocessor};
use crate::range::PlaylistRange;

/// Container yt-dlp merges into by default; no remux needed for it.
const NATIVE_CONTAINER: &str = "mp4";

/// Build the engine's format selection expression.
///
/// - audio output: best audio stream, falling back to best combined
/// - "best" video: best separate video+audio, falling back to combined
/// - capped video: best streams bounded by the requested height
pub fn build_format_string(config: &AppConfig) -> String {
    if config.output_format == OutputFormat::Audio {
        return "bestaudio/best".to_string();
    }

    if config.video_quality == "best" {
        return "bestvideo+bestaudio/best".to_string();
    }

    format!(
        "bestvideo[height<={q}]+bestaudio/best[height<={q}]",
        q = config.video_quality
    )
}

/// Assemble the immutable options for one job.
///
/// Never fails for well-formed input; `validate_submission` must have
/// been called first.
pub fn build_fetch_options(
    config: &AppConfig,
    urls: Vec<String>,
    range: &PlaylistRange,
    live_from_start: bool,
) -> FetchOptions {
    let mut postprocessors = Vec::new();

    if config.output_format == OutputFormat::Audio {
        postprocessors.push(Postprocessor::ExtractAudio {
            codec: config.audio_format.clone(),
            quality: config.audio_quality.clone(),
        });
    } else if config.video_format != NATIVE_CONTAINER {
        postprocessors.push(Postprocessor::Remux {
            container: config.video_format.clone(),
        });
    }

    if config.embed_thumbnail {
        postprocessors.push(Postprocessor::EmbedThumbnail);
    }

    FetchOptions {
        urls,
        output_template: format!("{}/%(title)s.%(ext)s", config.download_path),
        format: build_format_string(config),
        geo_bypass: config.geo_bypass,
        geo_country: if config.geo_bypass {
            Some(config.geo_country.clone())
        } else {
            None
        },
        write_subtitles: config.download_subtitles,
        subtitle_language: if config.download_subtitles {
            Some(config.subtitle_language.clone())
        } else {
            None
        },
        // Embedding needs the raw asset on disk first.
        write_thumbnail: config.embed_thumbnail,
        live_from_start,
        playlist_items: range.as_expr().map(str::to_string),
        postprocessors,
    }
}

/// Synchronous checks that must pass before a job ever reaches a worker.
pub fn validate_submission(config: &AppConfig, range: &PlaylistRange) -> Result<(), FetchError> {
    if config.download_path.trim().is_empty() {
        return Err(FetchError::EmptyDestination);
    }
    if *range == PlaylistRange::Empty {
        return Err(FetchError::EmptySelection);
    }
    Ok(())
}
