//! Collision-free, sanitized naming for write targets.
//!
//! Every write into the browsed directory goes through [`resolve`] (or at
//! least [`sanitize_name`]) so that nothing silently overwrites an existing
//! entry. The resolver only checks for existence; it never creates anything.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::NamingError;

/// Maximum number of `"{stem} ({n})"` candidates tried before giving up.
pub const MAX_COLLISION_PROBES: u32 = 1000;

/// Characters stripped from names before they reach the filesystem.
pub const DISALLOWED_CHARS: &[char] = &['/', ':', '?', '*', '<', '>', '|', '"', '\\'];

/// Used when sanitizing leaves nothing of the requested name.
const FALLBACK_NAME: &str = "untitled";

/// Strip disallowed and control characters from a single name component.
///
/// Surrounding whitespace is trimmed. The result may be empty; `.` and `..`
/// are not names and come back empty too.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !DISALLOWED_CHARS.contains(c) && !c.is_control())
        .collect();
    match cleaned.trim() {
        "." | ".." => String::new(),
        trimmed => trimmed.to_string(),
    }
}

/// The directory `path` points into when its last component is not a name
/// (`dir/.`, `dir/..`, a bare root).
fn directory_without_name(path: &Path) -> Option<PathBuf> {
    let raw = path.as_os_str().as_encoded_bytes();
    let trailing_dot = raw == b"." || raw.ends_with(&[std::path::MAIN_SEPARATOR as u8, b'.']);

    match path.components().next_back() {
        Some(Component::ParentDir) => {
            Some(path.parent().map(Path::to_path_buf).unwrap_or_default())
        }
        Some(Component::Normal(_)) if !trailing_dot => None,
        // `components` drops a trailing `.`, leaving the directory itself.
        Some(Component::Normal(_)) => Some(path.components().collect()),
        _ => Some(path.to_path_buf()),
    }
}

/// Sanitize the last component of `path`, leaving its parent untouched.
///
/// A path ending in `.` or `..` never resolves outside the directory it
/// names: the name becomes the fallback inside that directory.
pub fn sanitize_path(path: &Path) -> PathBuf {
    if let Some(directory) = directory_without_name(path) {
        return directory.join(FALLBACK_NAME);
    }
    let Some(name) = path.file_name() else {
        return path.join(FALLBACK_NAME);
    };

    let mut cleaned = sanitize_name(&name.to_string_lossy());
    if cleaned.is_empty() {
        cleaned = FALLBACK_NAME.to_string();
    }
    path.with_file_name(cleaned)
}

/// Split a file name into stem and extension.
///
/// A leading dot does not start an extension (`.profile` has none), and
/// neither does a trailing one.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

fn probe_name(stem: &str, extension: Option<&str>, n: u32) -> String {
    match extension {
        Some(ext) => format!("{stem} ({n}).{ext}"),
        None => format!("{stem} ({n})"),
    }
}

/// Anything at the path counts as occupied, including dangling symlinks.
fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Find a free path for `desired`, reporting exhaustion as an error.
///
/// Returns the sanitized `desired` path when it is free; otherwise the first
/// free `"{stem} ({n}){.ext}"` for `n` in `1..=MAX_COLLISION_PROBES`.
pub fn try_resolve(desired: &Path) -> Result<PathBuf, NamingError> {
    let desired = sanitize_path(desired);
    if !occupied(&desired) {
        return Ok(desired);
    }

    let name = desired
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, extension) = split_name(&name);

    let mut last_probe = desired.clone();
    for n in 1..=MAX_COLLISION_PROBES {
        last_probe = desired.with_file_name(probe_name(stem, extension, n));
        if !occupied(&last_probe) {
            return Ok(last_probe);
        }
    }

    Err(NamingError::Exhausted {
        desired,
        last_probe,
        attempts: MAX_COLLISION_PROBES,
    })
}

/// Find a free path for `desired`.
///
/// Best effort: once [`MAX_COLLISION_PROBES`] candidates are taken, the last
/// probed path is returned even though it collides.
pub fn resolve(desired: &Path) -> PathBuf {
    match try_resolve(desired) {
        Ok(path) => path,
        Err(err) => {
            warn!(error = %err, "Collision probing exhausted, using last candidate");
            match err {
                NamingError::Exhausted { last_probe, .. } => last_probe,
            }
        }
    }
}
