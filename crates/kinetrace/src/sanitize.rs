//! Helpers for sanitizing data before it enters tracing span attributes
//! or gets joined into a storage path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::error::FilesystemError;

/// Filename of an upload or artifact, without the user-scoped directories
/// above it.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Short stable hash of a path, used to correlate runs of the same upload
/// in logs.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Accepts `value` only if it can be used verbatim as one path component.
///
/// Video ids and uploaded filenames end up inside user-scoped directories,
/// so separators and parent references are rejected outright.
pub fn ensure_component(kind: &'static str, value: &str) -> Result<(), FilesystemError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);

    if invalid {
        return Err(FilesystemError::InvalidComponent {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Keeps the last `max_chars` characters of process output for log lines.
pub fn tail_excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - max_chars).collect();
    format!("...{}", tail)
}
