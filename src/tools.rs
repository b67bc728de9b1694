// External tool detection for the startup surface

use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    YtDlp,
    Ffmpeg,
}

impl ToolKind {
    pub fn binary_name(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => "yt-dlp",
            ToolKind::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => "--version",
            ToolKind::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub kind: ToolKind,
    pub path: Option<String>,
    pub version: Option<String>,
    pub is_available: bool,
}

/// Locate a tool in the common install locations, then PATH.
pub fn detect(kind: ToolKind) -> ToolInfo {
    let (path, version) = find_binary(kind);
    ToolInfo {
        name: kind.binary_name().to_string(),
        kind,
        is_available: path.is_some(),
        path,
        version,
    }
}

/// Path to yt-dlp for spawning. Falls back to the bare name so PATH
/// resolution still gets a chance at spawn time.
pub fn find_ytdlp() -> String {
    detect(ToolKind::YtDlp)
        .path
        .unwrap_or_else(|| "yt-dlp".to_string())
}

fn find_binary(kind: ToolKind) -> (Option<String>, Option<String>) {
    let name = kind.binary_name();

    let common_paths = [
        format!("/opt/homebrew/bin/{}", name), // Homebrew on Apple Silicon
        format!("/usr/local/bin/{}", name),    // Homebrew on Intel Mac
        format!("/usr/bin/{}", name),          // System installation
    ];

    for path in common_paths {
        if std::path::Path::new(&path).exists() {
            let version = get_version(&path, kind);
            return (Some(path), version);
        }
    }

    if let Ok(output) = Command::new("which").arg(name).output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                let version = get_version(&path, kind);
                return (Some(path), version);
            }
        }
    }

    (None, None)
}

fn get_version(path: &str, kind: ToolKind) -> Option<String> {
    match Command::new(path).arg(kind.version_arg()).output() {
        Ok(output) if output.status.success() => {
            // ffmpeg prints a banner; the first line is enough.
            let out = String::from_utf8_lossy(&output.stdout);
            out.lines().next().map(|line| line.trim().to_string())
        }
        _ => None,
    }
}
