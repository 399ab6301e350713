//! Core library for recovering embedded images from PDF files.
//!
//! This crate provides:
//! - PDF object access backed by lopdf
//! - Pixel buffers with colourspace conversion and encoding
//! - The recovery engine: soft-mask fusion, stencil masks, CMYK normalisation
//! - Output sinks writing `img_<xref>.<ext>` files

pub mod error;
pub mod models;
pub mod pdf;
pub mod pixmap;
pub mod recovery;

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use tracing::info;

pub use error::{
    ExtractError, ExtractionError, OpenError, PixelError, ReconstructionError, Result, WriteError,
};
pub use models::config::{ExtractionConfig, OutputConfig, PdfImgConfig, ReconstructionPolicy};
pub use models::image::{ExtractedImage, ImageRecord, Payload};
pub use pdf::{LopdfDocument, PdfDocument};
pub use pixmap::{Colorspace, PixelBuffer};
pub use recovery::{DELIVERABLE_FORMATS, ImageDirectory, ImageExtractor, ImageSink};

/// Outcome of a completed extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Number of images written.
    pub image_count: usize,
    /// Size of the document's object table.
    pub object_count: u32,
    /// Folder the images were written to.
    pub output_dir: PathBuf,
}

/// Recover every image of the PDF at `path` into `<root_dir>/<file stem>/`.
///
/// `on_progress(xref, total)` runs before each object is examined; returning
/// `ControlFlow::Break` cancels the run.
pub fn extract_pdf<F>(path: impl AsRef<Path>, config: &PdfImgConfig, on_progress: F) -> Result<ExtractionSummary>
where
    F: FnMut(u32, u32) -> ControlFlow<()>,
{
    let path = path.as_ref();
    let doc = LopdfDocument::open(path)?;
    let object_count = doc.object_count();

    let mut sink = ImageDirectory::for_pdf(&config.output.root_dir, path)
        .with_prefix(config.output.file_prefix.clone());

    let image_count = ImageExtractor::with_config(&doc, &config.extraction)
        .extract_images_with_progress(&mut sink, on_progress)?;

    info!(
        "Extracted {} images from {} into {}",
        image_count,
        path.display(),
        sink.path().display()
    );

    Ok(ExtractionSummary {
        image_count,
        object_count,
        output_dir: sink.path().to_path_buf(),
    })
}
