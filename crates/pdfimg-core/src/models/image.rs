//! Image records produced while scanning a document.

use serde::Serialize;

use crate::pixmap::PixelBuffer;

/// Image data carried by a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes of an encoded image file (JPEG, PNG, JPX, ...).
    Encoded(Vec<u8>),
    /// Decoded samples that still need encoding.
    Pixels(PixelBuffer),
}

/// An image object as extracted from the document, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Lowercase format tag, used as the file extension.
    pub extension: String,
    /// Colour components, `None` for masks or when unknown.
    pub component_count: Option<u8>,
    /// Image data.
    pub payload: Payload,
    /// Object number of the soft mask, 0 if there is none.
    pub smask_ref: u32,
}

impl ImageRecord {
    /// Record holding already encoded bytes.
    pub fn encoded(extension: impl Into<String>, component_count: Option<u8>, data: Vec<u8>) -> Self {
        Self {
            extension: extension.into(),
            component_count,
            payload: Payload::Encoded(data),
            smask_ref: 0,
        }
    }

    /// Attach a soft mask reference.
    pub fn with_smask(mut self, smask_ref: u32) -> Self {
        self.smask_ref = smask_ref;
        self
    }

    /// Whether the record points at a soft mask object.
    pub fn has_smask(&self) -> bool {
        self.smask_ref > 0
    }
}

/// A recovered image ready to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedImage {
    /// Object number the image came from.
    pub xref: u32,
    /// File extension of `data`.
    pub extension: String,
    /// Colour components of the written image, `None` for masks.
    pub component_count: Option<u8>,
    /// Encoded image bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ExtractedImage {
    /// File name used when the image is saved with the given prefix.
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{}.{}", prefix, self.xref, self.extension)
    }
}
