//! Error types for the pdfimg-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Run-level error returned from an extraction run.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The PDF could not be opened.
    #[error("failed to open PDF: {0}")]
    Open(#[from] OpenError),

    /// A classified image could not be rebuilt.
    #[error("failed to recover image object {xref}: {source}")]
    Reconstruction {
        xref: u32,
        #[source]
        source: ReconstructionError,
    },

    /// Writing an output image failed.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// The progress callback asked the scan to stop.
    #[error("extraction cancelled at object {xref}")]
    Cancelled { xref: u32 },
}

/// Errors raised while opening a PDF document.
#[derive(Error, Debug)]
pub enum OpenError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a parseable PDF.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted with a non-empty password.
    #[error("PDF is encrypted")]
    Encrypted,
}

/// Per-object extraction failures. These only ever cause an object to be skipped.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No object with this number exists in the document.
    #[error("object {0} does not exist")]
    MissingObject(u32),

    /// The object is not an image stream.
    #[error("object {0} is not an image stream")]
    NotAnImage(u32),

    /// The stream uses a filter chain that cannot be handed out as an image.
    #[error("unsupported filter chain: {0}")]
    UnsupportedFilter(String),

    /// The raw samples could not be decoded.
    #[error("failed to decode samples: {0}")]
    Samples(#[from] PixelError),
}

/// Errors raised by pixel buffer construction, conversion and encoding.
#[derive(Error, Debug)]
pub enum PixelError {
    /// Encoded image bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// A pixel buffer could not be encoded.
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    /// Sample data does not match the buffer geometry.
    #[error("sample count mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The colourspace cannot be represented by the requested operation.
    #[error("unsupported colorspace: {0}")]
    UnsupportedColorspace(String),

    /// No conversion exists between the two colourspaces.
    #[error("cannot convert {from} to {to}")]
    UnsupportedConversion { from: String, to: String },

    /// The target extension has no encoder.
    #[error("unsupported output format: {0}")]
    UnsupportedEncoding(String),

    /// The stream filter has no pixel decoder.
    #[error("unsupported image filter: {0}")]
    UnsupportedFilter(String),

    /// The image dictionary is malformed.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Failures while rebuilding a classified image.
#[derive(Error, Debug)]
pub enum ReconstructionError {
    /// A referenced object (usually the soft mask) could not be extracted.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Pixel work failed.
    #[error(transparent)]
    Pixel(#[from] PixelError),

    /// Nothing could turn the object into a deliverable format.
    #[error("no deliverable format for extension {0:?}")]
    Undeliverable(String),
}

/// Failure saving an output image.
#[derive(Error, Debug)]
#[error("failed to write {}: {source}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Result type for extraction runs.
pub type Result<T> = std::result::Result<T, ExtractError>;
