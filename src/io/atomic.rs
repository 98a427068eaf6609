//! Write-then-rename file replacement.

use anyhow::{Context, Result};
use std::fs::{File, create_dir_all, rename};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sibling temp path used while `path` is being written.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

/// Run `write` against a buffered temp file next to `path`, fsync it, then rename it
/// over `path`. On any error the temp file is removed and `path` is left untouched.
///
/// Parent directories are created as needed.
///
/// # Errors
/// Returns an error if the directory, the temp file, the writer callback, the flush or
/// the final rename fails.
pub fn write_atomic<T>(
    path: impl AsRef<Path>,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<T>,
) -> Result<T> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let tmp = temp_path_for(path);
    let result = (|| {
        let f = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let mut w = BufWriter::new(f);
        let out = write(&mut w)?;
        w.flush().with_context(|| format!("flush {}", tmp.display()))?;
        w.get_ref()
            .sync_all()
            .with_context(|| format!("sync {}", tmp.display()))?;
        rename(&tmp, path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(out)
    })();
    if result.is_err() {
        std::fs::remove_file(&tmp).ok();
    }
    result
}
