use std::path::{Path, PathBuf};

use crate::{error::Result, util::expand_globs};

/// Copies every file matched by `patterns` (relative to `root`) into
/// `out_dir`, flattening directories. Errors propagate; there is no
/// isolation for this one-shot copy.
pub async fn copy_fonts(root: &Path, patterns: &[String], out_dir: &Path) -> Result<Vec<PathBuf>> {
    let sources = expand_globs(root, patterns)?;
    if sources.is_empty() {
        tracing::warn!("No font files matched {}", patterns.join(", "));
        return Ok(Vec::new());
    }

    tokio::fs::create_dir_all(out_dir).await?;

    let mut written = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = out_dir.join(name);
        tokio::fs::copy(&source, &target).await?;
        written.push(target);
    }

    tracing::debug!("Copied {} font files to {}", written.len(), out_dir.display());
    Ok(written)
}
