//! Filename and folder sanitization plus unique destination-path resolution.
//!
//! Every name that ends up on disk passes through here: case folder names,
//! filenames derived from URLs, and synthetic artifact names.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Placeholder filename used when a location URL yields no usable segment.
pub const PLACEHOLDER_FILENAME: &str = "document";

/// Sanitizes a single path segment for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// `< > : " / \ | ? *` (plus control characters). Idempotent: sanitizing an
/// already-sanitized segment returns it unchanged.
#[must_use]
pub fn sanitize_path_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Derives a filename from the last path segment of a URL, percent-decoded.
///
/// Falls back to [`PLACEHOLDER_FILENAME`] when the URL cannot be parsed or
/// has no non-empty final segment.
#[must_use]
pub fn filename_from_url(location_url: &str) -> String {
    let Ok(parsed) = Url::parse(location_url) else {
        return PLACEHOLDER_FILENAME.to_string();
    };

    let Some(last) = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back().map(ToString::to_string))
        .filter(|segment| !segment.is_empty())
    else {
        return PLACEHOLDER_FILENAME.to_string();
    };

    let decoded = urlencoding::decode(&last).map_or(last.clone(), |cow| cow.into_owned());
    let sanitized = sanitize_path_segment(&decoded);
    if sanitized.trim_matches('_').is_empty() {
        PLACEHOLDER_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Resolves a unique file path under `dir`, adding a numeric suffix if the
/// file already exists (`file.pdf`, `file_1.pdf`, `file_2.pdf`, ...).
///
/// Existing files are never overwritten.
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = {
        let sanitized = sanitize_path_segment(filename);
        // No path separators may remain (defense in depth against traversal)
        if !is_safe_filename_segment(&sanitized) || sanitized.trim_matches('_').is_empty() {
            PLACEHOLDER_FILENAME.to_string()
        } else {
            sanitized
        }
    };
    let base_path = dir.join(&filename);

    if !base_path.exists() {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], &filename[pos..]),
        None => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let new_path = dir.join(format!("{stem}_{i}{ext}"));
        if !new_path.exists() {
            return new_path;
        }
    }

    // Fallback (extremely unlikely)
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    let path = Path::new(name);
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
