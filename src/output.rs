//! # Output Formatting
//!
//! Renders query results for the terminal (`table`), for scripts (`json`) and
//! as M3U8 playlists. Playlist files are written atomically: the content goes
//! to a temporary file next to the target, which is then renamed over it.

use crate::db::MediaFile;
use crate::engine::MixQueryResult;
use anyhow::{Context, Result};
use log::{info, warn};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const PLAYLIST_EXTENSION: &str = "m3u8";

/// Fixed-width table of `rows`, one line per file.
#[must_use]
pub fn render_table(rows: &[MediaFile]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>8}  {:>5}  {:>8}  {}", "ID", "TRACK", "DURATION", "PATH");

    for file in rows {
        let track = file
            .track_number
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        let _ = writeln!(
            out,
            "{:>8}  {:>5}  {:>8}  {}",
            file.id,
            track,
            format_duration(file.duration),
            file.relative_path()
        );
    }
    out
}

/// `m:ss`, or `h:mm:ss` from one hour on.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Pretty-printed JSON of a whole result, diagnostics included.
///
/// # Errors
///
/// Returns an error if serialisation fails.
pub fn render_json(result: &MixQueryResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialise query result")
}

/// `#EXTM3U` followed by one relative path per row.
#[must_use]
pub fn render_m3u8(rows: &[MediaFile]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for file in rows {
        out.push_str(&file.relative_path());
        out.push('\n');
    }
    out
}

/// `path` with an `.m3u8` extension, warning when it had to be changed.
#[must_use]
pub fn playlist_path(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PLAYLIST_EXTENSION));
    if has_extension {
        return path.to_path_buf();
    }

    let corrected = path.with_extension(PLAYLIST_EXTENSION);
    warn!(
        "Playlist path {} has no .{PLAYLIST_EXTENSION} extension, writing {} instead",
        path.display(),
        corrected.display()
    );
    corrected
}

/// Write `rows` as an M3U8 playlist to `path` and return the final path.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, written or
/// renamed into place.
pub fn write_m3u8(path: &Path, rows: &[MediaFile]) -> Result<PathBuf> {
    let target = playlist_path(path);
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    temp.write_all(render_m3u8(rows).as_bytes())
        .context("Failed to write playlist contents")?;
    temp.flush().context("Failed to flush playlist contents")?;
    temp.persist(&target)
        .with_context(|| format!("Failed to move playlist into place at {}", target.display()))?;

    info!("Wrote {} entries to {}", rows.len(), target.display());
    Ok(target)
}
