//! Best-effort diff-artifact output.
//!
//! Artifacts land at `{base_dir}/{design_id}/{pair_name}.png`. Both
//! path components are sanitized so a panel key can never escape the
//! base directory. Callers treat every [`ArtifactError`] as non-fatal.

use std::path::{Path, PathBuf};

use xview_metrics::RgbaImage;
use xview_metrics::pixel_diff::encode_png;

/// Why a diff artifact could not be written.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Creating the directory or writing the file failed.
    #[error("failed to write diff artifact {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// PNG encoding failed.
    #[error("failed to encode diff artifact: {0}")]
    Encode(String),
}

/// Writes diff images under a base directory.
#[derive(Debug, Clone)]
pub struct DiffArtifactWriter {
    base_dir: PathBuf,
}

impl DiffArtifactWriter {
    /// A writer rooted at `base_dir`. Nothing is created until the
    /// first write.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Where the artifact for `design_id` / `pair_name` is written.
    #[must_use]
    pub fn artifact_path(&self, design_id: &str, pair_name: &str) -> PathBuf {
        self.base_dir
            .join(sanitize_component(design_id))
            .join(format!("{}.png", sanitize_component(pair_name)))
    }

    /// Encode `diff` as PNG and write it, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Encode`] if encoding fails and
    /// [`ArtifactError::Io`] if the directory or file cannot be written.
    pub fn write_diff(
        &self,
        design_id: &str,
        pair_name: &str,
        diff: &RgbaImage,
    ) -> Result<PathBuf, ArtifactError> {
        let png = encode_png(diff).map_err(|e| ArtifactError::Encode(e.to_string()))?;
        self.write_png(design_id, pair_name, &png)
    }

    /// Write already-encoded PNG bytes, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] if the directory or file cannot be
    /// written.
    pub fn write_png(
        &self,
        design_id: &str,
        pair_name: &str,
        png: &[u8],
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.artifact_path(design_id, pair_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, png).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = png.len(), "wrote diff artifact");
        Ok(path)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`, and refuse the
/// relative components `.` and `..`.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn path_layout_is_design_then_pair() {
        let writer = DiffArtifactWriter::new("/out");
        assert_eq!(
            writer.artifact_path("design-7", "hero_3d__elevation_north"),
            PathBuf::from("/out/design-7/hero_3d__elevation_north.png")
        );
    }

    #[test]
    fn components_cannot_escape_base_dir() {
        let writer = DiffArtifactWriter::new("/out");
        let path = writer.artifact_path("..", "../../etc/passwd");
        assert!(path.starts_with("/out"));
        assert_eq!(path, PathBuf::from("/out/_/.._.._etc_passwd.png"));
    }

    #[test]
    fn writes_png_under_design_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiffArtifactWriter::new(dir.path());
        let diff = RgbaImage::from_pixel(3, 2, image::Rgba([10, 10, 10, 255]));
        let path = writer.write_diff("d1", "a__b", &diff).unwrap();
        assert!(path.exists());
        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[1..4], b"PNG");
    }

    #[test]
    fn unwritable_base_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let writer = DiffArtifactWriter::new(&blocker);
        let err = writer.write_png("d1", "pair", b"png").unwrap_err();
        assert!(matches!(err, ArtifactError::Io { .. }));
    }
}
