//! Destinations for recovered images.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::WriteError;
use crate::models::image::ExtractedImage;

/// Receives every image the engine recovers.
pub trait ImageSink {
    /// Store one image. An error aborts the run.
    fn save(&mut self, image: &ExtractedImage) -> Result<(), WriteError>;
}

impl ImageSink for Vec<ExtractedImage> {
    fn save(&mut self, image: &ExtractedImage) -> Result<(), WriteError> {
        self.push(image.clone());
        Ok(())
    }
}

/// Writes images into a per-document folder, creating it on first use.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    path: PathBuf,
    file_prefix: String,
}

impl ImageDirectory {
    /// Directory `path` holding `img_<xref>.<ext>` files.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_prefix: "img_".to_string(),
        }
    }

    /// Subfolder of `root` named after the PDF's file stem.
    pub fn for_pdf(root: impl AsRef<Path>, pdf_path: impl AsRef<Path>) -> Self {
        let stem = pdf_path
            .as_ref()
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "document".into());
        Self::new(root.as_ref().join(stem))
    }

    /// Use a different file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path an image would be written to.
    pub fn image_path(&self, image: &ExtractedImage) -> PathBuf {
        self.path.join(image.file_name(&self.file_prefix))
    }
}

impl ImageSink for ImageDirectory {
    fn save(&mut self, image: &ExtractedImage) -> Result<(), WriteError> {
        fs::create_dir_all(&self.path).map_err(|source| WriteError {
            path: self.path.clone(),
            source,
        })?;

        let path = self.image_path(image);
        fs::write(&path, &image.data).map_err(|source| WriteError {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote {} ({} bytes)", path.display(), image.data.len());
        Ok(())
    }
}
