use crate::fsutil::{ensure_parent_dir, normalize_relative};
use crate::{Result, ShepherdError};
use std::fs::File;
use std::path::Path;
use std::process::Stdio;

/// Child stdio for the optional capture paths, relative to `workdir`.
/// Unset streams are inherited; identical paths share one file handle so the
/// streams interleave in write order.
pub(crate) fn open_capture(
    workdir: &Path,
    stdout_path: Option<&str>,
    stderr_path: Option<&str>,
) -> Result<(Stdio, Stdio)> {
    let stdout_file = stdout_path.map(|p| create(workdir, p)).transpose()?;

    let shared = matches!(
        (stdout_path, stderr_path),
        (Some(out), Some(err)) if normalize_relative(out) == normalize_relative(err)
    );

    let stderr = match (stderr_path, &stdout_file) {
        (Some(_), Some(out)) if shared => Stdio::from(out.try_clone().map_err(|e| {
            ShepherdError::io("failed to share stdout capture with stderr", e)
        })?),
        (Some(p), _) => Stdio::from(create(workdir, p)?),
        (None, _) => Stdio::inherit(),
    };
    let stdout = stdout_file.map_or_else(Stdio::inherit, Stdio::from);
    Ok((stdout, stderr))
}

fn create(workdir: &Path, relative: &str) -> Result<File> {
    let path = workdir.join(relative);
    ensure_parent_dir(&path)?;
    File::create(&path)
        .map_err(|e| ShepherdError::io(format!("failed to create capture file {}", path.display()), e))
}
