//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for pdfimg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfImgConfig {
    /// Output layout configuration.
    pub output: OutputConfig,

    /// Image recovery configuration.
    pub extraction: ExtractionConfig,
}

/// Where recovered images are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory; each PDF gets a subfolder named after its file stem.
    pub root_dir: PathBuf,

    /// File name prefix, followed by the object number.
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("extracted_images"),
            file_prefix: "img_".to_string(),
        }
    }
}

impl OutputConfig {
    /// Anchor a relative `root_dir` at `app_dir`, the directory the application runs from.
    pub fn anchor_root(&mut self, app_dir: &Path) {
        if self.root_dir.is_relative() {
            self.root_dir = app_dir.join(&self.root_dir);
        }
    }
}

/// What to do when a classified image cannot be rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionPolicy {
    /// Stop the run and report the error.
    #[default]
    Abort,
    /// Log a warning and continue with the next object.
    Skip,
}

/// Image recovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Reconstruction failure handling.
    pub on_reconstruction_error: ReconstructionPolicy,

    /// Quality used when an image is re-encoded as JPEG (1 - 100).
    pub jpeg_quality: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            on_reconstruction_error: ReconstructionPolicy::Abort,
            jpeg_quality: 90,
        }
    }
}

impl PdfImgConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
