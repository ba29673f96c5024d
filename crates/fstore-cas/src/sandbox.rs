//! Path resolution confined to the store root.
//!
//! Caller-supplied names are normalized, truncated to at most
//! [`MAX_NAME_SEGMENTS`] components, joined to the root, and canonicalized.
//! The canonical result must still lie under the canonical root; the check
//! runs after canonicalization so `..` segments and symlinks that lead
//! outward are caught.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{is_missing, Result, StoreError};

/// Components kept from a caller-supplied name; the rest is dropped.
pub const MAX_NAME_SEGMENTS: usize = 3;

/// Resolve `prefix`/`name` under `root`.
///
/// `root` should already be canonical. Fails with `PathForbidden` when the
/// result escapes the root.
pub fn resolve(root: &Path, prefix: &str, name: &str) -> Result<PathBuf> {
    let prefix = strip_leading_separator(normalize_separators(prefix));
    let name = normalize_separators(name);
    let name = strip_leading_separator(name)
        .splitn(MAX_NAME_SEGMENTS + 1, '/')
        .take(MAX_NAME_SEGMENTS)
        .collect::<Vec<_>>()
        .join("/");

    let joined = root.join(&prefix).join(&name);
    let resolved = canonicalize_lenient(&joined)
        .map_err(|e| StoreError::io("resolve", display_name(&prefix, &name), e))?;

    if !resolved.starts_with(root) {
        tracing::debug!(?resolved, "path escapes store root");
        return Err(StoreError::forbidden(display_name(&prefix, &name)));
    }
    Ok(resolved)
}

/// Canonicalize a path whose tail may not exist yet.
///
/// The deepest existing ancestor is canonicalized by the filesystem; the
/// remaining components are applied lexically.
pub fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    let components: Vec<Component<'_>> = path.components().collect();

    for split in (1..=components.len()).rev() {
        let head: PathBuf = components[..split].iter().collect();
        match head.canonicalize() {
            Ok(mut resolved) => {
                for component in &components[split..] {
                    match component {
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        Component::Normal(part) => resolved.push(part),
                        Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                    }
                }
                return Ok(resolved);
            }
            Err(e) if is_missing(&e) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "no existing ancestor",
    ))
}

fn normalize_separators(s: &str) -> String {
    s.replace('\\', "/")
}

fn strip_leading_separator(s: String) -> String {
    match s.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => s,
    }
}

fn display_name(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{name}"),
    }
}
