use crate::{Result, ShepherdError};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| ShepherdError::io(format!("failed to create directory {}", dir.display()), e))
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Modification time of `path`, following symlinks.
pub(crate) fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

pub(crate) fn absolutize(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| ShepherdError::io(format!("failed to resolve {}", path.display()), e))
}

/// `/`-joined normal components of a relative path; `./a//b` becomes `a/b`.
pub(crate) fn normalize_relative(path: &str) -> String {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of `path` relative to `base` with `/` separators, if `path` is under `base`.
pub(crate) fn relative_slash(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    Some(normalize_relative(&rel.to_string_lossy()))
}

/// Lexical path from directory `from_dir` to `to`. Both must be absolute.
pub(crate) fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from_dir.components().collect();
    let target: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    rel
}
