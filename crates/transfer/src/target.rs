//! Output file resolution for the receiver.

use std::path::{Component, Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::TransferError;

/// Upper bound on numbered candidates tried after a collision.
const MAX_COLLISION_SUFFIX: u32 = 1000;

/// Validates that a received file name is a single plain path component.
///
/// Rejects:
/// - Empty names, `.` and `..`
/// - Anything with a directory separator (`/` or `\`)
/// - Absolute paths, and on Windows drive prefixes (`C:`)
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidFileName("empty name".into()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidFileName(format!(
            "directory components not allowed: {name}"
        )));
    }
    #[cfg(windows)]
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err(TransferError::InvalidFileName(format!(
            "drive prefix not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidFileName(format!(
            "not a plain file name: {name}"
        ))),
    }
}

/// Creates `dir` (and parents) and a new, empty file for `file_name` in it.
///
/// If the name is taken, `<stem><unix-timestamp>.<ext>` is tried next, then
/// `<stem><unix-timestamp>-N.<ext>`. Existing files are never overwritten.
pub async fn create_target(dir: &Path, file_name: &str) -> Result<(PathBuf, File), TransferError> {
    validate_file_name(file_name)?;

    if !dir.as_os_str().is_empty() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let timestamp = chrono::Utc::now().timestamp();
    let first = std::iter::once(file_name.to_string());
    let stamped = std::iter::once(with_suffix(file_name, &timestamp.to_string()));
    let numbered =
        (1..=MAX_COLLISION_SUFFIX).map(|n| with_suffix(file_name, &format!("{timestamp}-{n}")));

    for candidate in first.chain(stamped).chain(numbered) {
        let path = dir.join(&candidate);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                if candidate != file_name {
                    tracing::info!(original = file_name, chosen = %candidate, "name taken, renamed");
                }
                return Ok((path, file));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(TransferError::InvalidFileName(format!(
        "no free name for {file_name} in {}",
        dir.display()
    )))
}

/// Inserts `suffix` between the stem and the extension.
fn with_suffix(file_name: &str, suffix: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    }
}
