//! PDF document access.

mod document;
mod filters;
mod samples;
mod syntax;

pub use document::LopdfDocument;
pub use syntax::render_object;

use crate::error::{ExtractionError, PixelError};
use crate::models::image::ImageRecord;
use crate::pixmap::PixelBuffer;

/// Capabilities the recovery engine needs from a parsed PDF.
pub trait PdfDocument {
    /// Size of the indirect-object table. Object 0 is the free-list head.
    fn object_count(&self) -> u32;

    /// Object rendered in PDF syntax. Streams render as their dictionary; missing objects as "".
    fn raw_object_text(&self, xref: u32) -> String;

    /// Extract the image stored in an object.
    fn extract_image(&self, xref: u32) -> Result<ImageRecord, ExtractionError>;

    /// Decode an image object into a pixel buffer.
    fn pixel_buffer(&self, xref: u32) -> Result<PixelBuffer, PixelError>;
}
