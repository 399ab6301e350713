//! Image recovery engine.
//!
//! Walks the indirect-object table of a document, classifies image objects,
//! fuses soft masks into alpha channels and normalises raw or CMYK images into
//! deliverable files.

mod output;

pub use output::{ImageDirectory, ImageSink};

use std::collections::HashSet;
use std::ops::ControlFlow;

use tracing::{debug, info, trace, warn};

use crate::error::{ExtractError, ReconstructionError, Result};
use crate::models::config::{ExtractionConfig, ReconstructionPolicy};
use crate::models::image::{ExtractedImage, ImageRecord, Payload};
use crate::pdf::PdfDocument;
use crate::pixmap::{Colorspace, PixelBuffer};

/// Extensions written without any reconstruction.
pub const DELIVERABLE_FORMATS: [&str; 10] = [
    "png", "pnm", "pgm", "ppm", "pbm", "pam", "psd", "ps", "jpg", "jpeg",
];

const IMAGE_MARKER: &str = "/Image";
const IMAGE_MASK_MARKER: &str = "/ImageMask";
const COLORSPACE_MARKER: &str = "/ColorSpace";

const CMYK_COMPONENTS: u8 = 4;

/// Whether files with this extension can be written as they are.
pub fn is_deliverable(extension: &str) -> bool {
    DELIVERABLE_FORMATS.contains(&extension)
}

/// Recovers the images of one document.
///
/// The soft-mask set lives as long as the extractor, which borrows a single
/// document, so it never leaks between runs on different files.
pub struct ImageExtractor<'a, D: PdfDocument + ?Sized> {
    doc: &'a D,
    masks: HashSet<u32>,
    policy: ReconstructionPolicy,
    jpeg_quality: u8,
}

impl<'a, D: PdfDocument + ?Sized> ImageExtractor<'a, D> {
    /// Create an extractor with the default configuration.
    pub fn new(doc: &'a D) -> Self {
        Self::with_config(doc, &ExtractionConfig::default())
    }

    /// Create an extractor from an extraction configuration.
    pub fn with_config(doc: &'a D, config: &ExtractionConfig) -> Self {
        Self {
            doc,
            masks: HashSet::new(),
            policy: config.on_reconstruction_error,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    /// Set how reconstruction failures are handled.
    pub fn with_policy(mut self, policy: ReconstructionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Objects known to be soft masks of another image.
    pub fn masks(&self) -> &HashSet<u32> {
        &self.masks
    }

    /// Scan every object and hand each recovered image to `sink`.
    pub fn extract_images<S: ImageSink + ?Sized>(&mut self, sink: &mut S) -> Result<usize> {
        self.extract_images_with_progress(sink, |_, _| ControlFlow::Continue(()))
    }

    /// Like [`extract_images`](Self::extract_images), calling `on_progress(xref, total)`
    /// before each object is classified.
    ///
    /// Returning `ControlFlow::Break` stops the scan with [`ExtractError::Cancelled`].
    /// Images saved up to that point are kept.
    pub fn extract_images_with_progress<S, F>(&mut self, sink: &mut S, mut on_progress: F) -> Result<usize>
    where
        S: ImageSink + ?Sized,
        F: FnMut(u32, u32) -> ControlFlow<()>,
    {
        let total = self.doc.object_count();
        debug!("Scanning {} objects", total);

        let mut image_count = 0;
        // Object 0 is the free-list head, never a real object.
        for xref in 1..total {
            if on_progress(xref, total).is_break() {
                debug!("Scan cancelled at object {}", xref);
                return Err(ExtractError::Cancelled { xref });
            }

            let Some(record) = self.classify(xref) else {
                continue;
            };

            let image = match self.process_image(xref, record) {
                Ok(image) => image,
                Err(source) if self.policy == ReconstructionPolicy::Skip => {
                    warn!("Skipping object {}: {}", xref, source);
                    continue;
                }
                Err(source) => return Err(ExtractError::Reconstruction { xref, source }),
            };

            image_count += 1;
            sink.save(&image)?;
        }

        info!("Recovered {} images from {} objects", image_count, total);
        Ok(image_count)
    }

    /// Extract `xref` if it is an image that should be delivered on its own.
    ///
    /// Objects that are not images, known soft masks, and objects whose image data
    /// cannot be extracted all yield `None`.
    pub fn classify(&self, xref: u32) -> Option<ImageRecord> {
        if !self.doc.raw_object_text(xref).contains(IMAGE_MARKER) {
            return None;
        }

        if self.masks.contains(&xref) {
            trace!("Object {} is a soft mask, skipping", xref);
            return None;
        }

        match self.doc.extract_image(xref) {
            Ok(record) => Some(record),
            Err(e) => {
                trace!("Object {} is not extractable: {}", xref, e);
                None
            }
        }
    }

    /// Turn a classified record into a deliverable image.
    pub fn process_image(
        &mut self,
        xref: u32,
        record: ImageRecord,
    ) -> std::result::Result<ExtractedImage, ReconstructionError> {
        let record = if record.has_smask() {
            self.masks.insert(record.smask_ref);
            self.recover_pix(xref, record)?
        } else if !is_deliverable(&record.extension) {
            self.recover_pix(xref, record)?
        } else if record.component_count == Some(CMYK_COMPONENTS) {
            self.convert_cmyk_to_rgb(xref, record)?
        } else {
            record
        };

        let (extension, data) = match record.payload {
            Payload::Encoded(data) => (record.extension, data),
            Payload::Pixels(pixels) => ("png".to_string(), pixels.encode("png", self.jpeg_quality)?),
        };
        if !is_deliverable(&extension) {
            return Err(ReconstructionError::Undeliverable(extension));
        }

        debug!("Object {} recovered as {}", xref, extension);
        Ok(ExtractedImage {
            xref,
            extension,
            component_count: record.component_count,
            data,
        })
    }

    /// Rebuild an image through pixel buffers.
    fn recover_pix(
        &self,
        xref: u32,
        record: ImageRecord,
    ) -> std::result::Result<ImageRecord, ReconstructionError> {
        if record.has_smask() {
            trace!("Fusing object {} with soft mask {}", xref, record.smask_ref);
            let mut base = PixelBuffer::from_payload(record.payload)?.without_alpha();
            if base.colorspace() == Colorspace::Cmyk {
                base = base.convert_colorspace(Colorspace::Rgb)?;
            }

            let mask = self.doc.extract_image(record.smask_ref)?;
            let mask = PixelBuffer::from_payload(mask.payload)?
                .convert_colorspace(Colorspace::Gray)?
                .without_alpha();

            let pix = base.with_alpha(mask.samples())?;
            return Ok(ImageRecord::encoded(
                "png",
                Some(pix.component_count()),
                pix.encode("png", self.jpeg_quality)?,
            ));
        }

        let object_text = self.doc.raw_object_text(xref);

        if object_text.contains(IMAGE_MASK_MARKER) {
            trace!("Rendering stencil mask {}", xref);
            let pix = self.doc.pixel_buffer(xref)?;
            return Ok(ImageRecord::encoded("png", None, pix.encode("png", self.jpeg_quality)?));
        }

        if object_text.contains(COLORSPACE_MARKER) {
            let pix = self.doc.pixel_buffer(xref)?.convert_colorspace(Colorspace::Rgb)?;
            let extension = if record.extension.contains("jp") { "jpg" } else { "png" };
            trace!("Converted object {} to RGB {}", xref, extension);
            return Ok(ImageRecord::encoded(
                extension,
                Some(pix.component_count()),
                pix.encode(extension, self.jpeg_quality)?,
            ));
        }

        Ok(self.doc.extract_image(xref)?)
    }

    /// Re-encode a CMYK image as RGB, keeping its format.
    fn convert_cmyk_to_rgb(
        &self,
        xref: u32,
        record: ImageRecord,
    ) -> std::result::Result<ImageRecord, ReconstructionError> {
        trace!("Converting CMYK object {} to RGB", xref);
        let pix = self.doc.pixel_buffer(xref)?.convert_colorspace(Colorspace::Rgb)?;
        let data = pix.encode(&record.extension, self.jpeg_quality)?;
        Ok(ImageRecord::encoded(record.extension, Some(pix.component_count()), data))
    }
}
