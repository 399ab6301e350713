//! lopdf-backed document handle.

use std::path::Path;

use lopdf::{Document, Object, Stream};
use tracing::{debug, trace};

use super::{PdfDocument, filters, samples, syntax};
use crate::error::{ExtractionError, OpenError, PixelError};
use crate::models::image::{ImageRecord, Payload};
use crate::pixmap::PixelBuffer;

/// A parsed PDF document.
pub struct LopdfDocument {
    document: Document,
}

impl LopdfDocument {
    /// Open and parse a PDF file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let data = std::fs::read(path.as_ref())?;
        debug!("Read {} bytes from {}", data.len(), path.as_ref().display());
        Self::from_bytes(&data)
    }

    /// Parse a PDF held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self, OpenError> {
        let mut document = Document::load_mem(data).map_err(|e| OpenError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(OpenError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        Ok(Self::from_document(document))
    }

    /// Wrap an already loaded document.
    pub fn from_document(document: Document) -> Self {
        Self { document }
    }

    /// The underlying lopdf document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Look up an object by number, whatever its generation.
    fn object(&self, xref: u32) -> Option<&Object> {
        self.document
            .objects
            .range((xref, 0)..=(xref, u16::MAX))
            .next()
            .map(|(_, object)| object)
    }

    fn image_stream(&self, xref: u32) -> Result<&Stream, ExtractionError> {
        let object = self.object(xref).ok_or(ExtractionError::MissingObject(xref))?;
        let Object::Stream(stream) = object else {
            return Err(ExtractionError::NotAnImage(xref));
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => Ok(stream),
            _ => Err(ExtractionError::NotAnImage(xref)),
        }
    }
}

/// Image formats that a filter leaves encoded in the stream.
fn encoded_extension(filter: &str) -> Option<&'static str> {
    match filter {
        "DCTDecode" => Some("jpeg"),
        "JPXDecode" => Some("jpx"),
        "JBIG2Decode" => Some("jb2"),
        "CCITTFaxDecode" => Some("fax"),
        _ => None,
    }
}

fn filter_names(doc: &Document, stream: &Stream) -> Vec<String> {
    let filter = match stream.dict.get(b"Filter").or_else(|_| stream.dict.get(b"F")) {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(object) => Some(object),
        Err(_) => None,
    };
    match filter {
        Some(Object::Name(name)) => vec![filter_name(name)],
        Some(Object::Array(items)) => items.iter().filter_map(|o| o.as_name().ok()).map(filter_name).collect(),
        _ => Vec::new(),
    }
}

fn filter_name(name: &[u8]) -> String {
    filters::canonical_name(&String::from_utf8_lossy(name)).to_string()
}

impl PdfDocument for LopdfDocument {
    fn object_count(&self) -> u32 {
        let declared = self
            .document
            .trailer
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        declared.max(self.document.max_id.saturating_add(1))
    }

    fn raw_object_text(&self, xref: u32) -> String {
        self.object(xref).map(syntax::render_object).unwrap_or_default()
    }

    fn extract_image(&self, xref: u32) -> Result<ImageRecord, ExtractionError> {
        let stream = self.image_stream(xref)?;
        let dict = &stream.dict;

        let smask_ref = match dict.get(b"SMask") {
            Ok(Object::Reference((id, _))) => *id,
            _ => 0,
        };
        let component_count = if samples::is_image_mask(dict) {
            None
        } else {
            samples::image_color_model(&self.document, dict)
                .ok()
                .flatten()
                .map(|model| model.output().components())
        };

        let chain = filter_names(&self.document, stream);
        if let Some(extension) = chain.last().and_then(|f| encoded_extension(f)) {
            if chain.len() > 1 {
                return Err(ExtractionError::UnsupportedFilter(chain.join(" ")));
            }
            trace!("Object {} holds encoded {} data", xref, extension);
            return Ok(ImageRecord::encoded(extension, component_count, stream.content.clone())
                .with_smask(smask_ref));
        }

        let data = filters::decode_chain(&self.document, stream, &chain)?;
        let pixels = samples::decode_samples(&self.document, dict, &data)?;
        trace!(
            "Object {} holds raw {}x{} {} samples",
            xref,
            pixels.width(),
            pixels.height(),
            pixels.colorspace()
        );

        Ok(ImageRecord {
            extension: "raw".to_string(),
            component_count,
            payload: Payload::Pixels(pixels),
            smask_ref,
        })
    }

    fn pixel_buffer(&self, xref: u32) -> Result<PixelBuffer, PixelError> {
        let stream = self
            .image_stream(xref)
            .map_err(|e| PixelError::InvalidImage(e.to_string()))?;
        let chain = filter_names(&self.document, stream);

        match chain.last().map(String::as_str) {
            Some("DCTDecode") if chain.len() == 1 => {
                let image = image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                    .map_err(PixelError::Decode)?;
                Ok(PixelBuffer::from_dynamic(image))
            }
            Some("CCITTFaxDecode") => {
                let last = chain.len() - 1;
                let data = filters::decode_chain(&self.document, stream, &chain[..last])?;
                let (width, height) = samples::image_size(&stream.dict)?;
                let params = filters::decode_params(&self.document, &stream.dict, last);
                let bits = filters::ccitt_decode(&data, params, width, height)?;
                samples::decode_samples(&self.document, &stream.dict, &bits)
            }
            Some(filter) if encoded_extension(filter).is_some() => {
                Err(PixelError::UnsupportedFilter(chain.join(" ")))
            }
            _ => {
                let data = filters::decode_chain(&self.document, stream, &chain)?;
                samples::decode_samples(&self.document, &stream.dict, &data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Dictionary;

    fn image_stream(colorspace: &[u8], width: i64, height: i64, data: Vec<u8>) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(width));
        dict.set("Height", Object::Integer(height));
        dict.set("ColorSpace", Object::Name(colorspace.to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        Stream::new(dict, data)
    }

    #[test]
    fn test_object_count_covers_max_id() {
        let mut doc = Document::new();
        doc.add_object(Object::Integer(1));
        doc.add_object(Object::Integer(2));
        let pdf = LopdfDocument::from_document(doc);
        assert_eq!(pdf.object_count(), 3);
    }

    #[test]
    fn test_extract_raw_image_with_smask() {
        let mut doc = Document::new();
        let mask_id = doc.add_object(Object::Stream(image_stream(b"DeviceGray", 1, 1, vec![128])));
        let mut stream = image_stream(b"DeviceRGB", 1, 1, vec![1, 2, 3]);
        stream.dict.set("SMask", Object::Reference(mask_id));
        stream.compress().unwrap();
        let image_id = doc.add_object(Object::Stream(stream));

        let pdf = LopdfDocument::from_document(doc);
        let record = pdf.extract_image(image_id.0).unwrap();
        assert_eq!(record.extension, "raw");
        assert_eq!(record.component_count, Some(3));
        assert_eq!(record.smask_ref, mask_id.0);
        let Payload::Pixels(pixels) = record.payload else {
            panic!("expected raw pixels");
        };
        assert_eq!(pixels.samples(), &[1, 2, 3]);
    }

    #[test]
    fn test_extract_jpeg_keeps_stream_bytes() {
        let mut doc = Document::new();
        let mut stream = image_stream(b"DeviceCMYK", 1, 1, vec![0xFF, 0xD8, 0xFF, 0xD9]);
        stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        let id = doc.add_object(Object::Stream(stream));

        let record = LopdfDocument::from_document(doc).extract_image(id.0).unwrap();
        assert_eq!(record.extension, "jpeg");
        assert_eq!(record.component_count, Some(4));
        assert_eq!(record.payload, Payload::Encoded(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        assert_eq!(record.smask_ref, 0);
    }

    #[test]
    fn test_extract_rejects_non_images() {
        let mut doc = Document::new();
        let dict_id = doc.add_object(Object::Dictionary(Dictionary::new()));
        let pdf = LopdfDocument::from_document(doc);

        assert!(matches!(
            pdf.extract_image(dict_id.0),
            Err(ExtractionError::NotAnImage(_))
        ));
        assert!(matches!(
            pdf.extract_image(99),
            Err(ExtractionError::MissingObject(99))
        ));
        assert_eq!(pdf.raw_object_text(99), "");
    }

    #[test]
    fn test_jpx_has_no_pixel_decoder() {
        let mut doc = Document::new();
        let mut stream = image_stream(b"DeviceRGB", 1, 1, vec![0; 8]);
        stream.dict.set("Filter", Object::Name(b"JPXDecode".to_vec()));
        let id = doc.add_object(Object::Stream(stream));
        let pdf = LopdfDocument::from_document(doc);

        assert_eq!(pdf.extract_image(id.0).unwrap().extension, "jpx");
        assert!(matches!(
            pdf.pixel_buffer(id.0),
            Err(PixelError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn test_extract_runlength_image() {
        let mut doc = Document::new();
        let mut stream = image_stream(b"DeviceGray", 2, 1, vec![1, 5, 6, 128]);
        stream.dict.set("Filter", Object::Name(b"RunLengthDecode".to_vec()));
        let id = doc.add_object(Object::Stream(stream));

        let record = LopdfDocument::from_document(doc).extract_image(id.0).unwrap();
        assert_eq!(record.extension, "raw");
        let Payload::Pixels(pixels) = record.payload else {
            panic!("expected raw pixels");
        };
        assert_eq!(pixels.samples(), &[5, 6]);
    }

    #[test]
    fn test_extract_asciihex_image_with_abbreviated_filter() {
        let mut doc = Document::new();
        let mut stream = image_stream(b"DeviceRGB", 1, 1, b"FF 80 00>".to_vec());
        stream.dict.set("Filter", Object::Name(b"AHx".to_vec()));
        let id = doc.add_object(Object::Stream(stream));

        let pdf = LopdfDocument::from_document(doc);
        assert_eq!(pdf.pixel_buffer(id.0).unwrap().samples(), &[255, 128, 0]);
    }

    #[test]
    fn test_ccitt_stencil_decodes_to_pixels() {
        use fax::encoder::Encoder;
        use fax::{Color, VecWriter};

        let mut encoder = Encoder::new(VecWriter::new());
        let row = [Color::White, Color::Black, Color::Black, Color::White];
        encoder.encode_line(row.iter().copied(), 4).unwrap();
        encoder.encode_line(row.iter().copied(), 4).unwrap();
        let data = encoder.finish().unwrap().finish();

        let mut dict = Dictionary::new();
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(4));
        dict.set("Height", Object::Integer(2));
        dict.set("ImageMask", Object::Boolean(true));
        dict.set("Filter", Object::Name(b"CCITTFaxDecode".to_vec()));
        let mut params = Dictionary::new();
        params.set("K", Object::Integer(-1));
        params.set("Columns", Object::Integer(4));
        dict.set("DecodeParms", Object::Dictionary(params));

        let mut doc = Document::new();
        let id = doc.add_object(Object::Stream(Stream::new(dict, data)));
        let pdf = LopdfDocument::from_document(doc);

        let record = pdf.extract_image(id.0).unwrap();
        assert_eq!(record.extension, "fax");
        assert_eq!(record.component_count, None);

        let pixels = pdf.pixel_buffer(id.0).unwrap();
        assert_eq!(pixels.samples(), &[255, 0, 0, 255, 255, 0, 0, 255]);
    }

    #[test]
    fn test_raw_object_text_marks_image() {
        let mut doc = Document::new();
        let id = doc.add_object(Object::Stream(image_stream(b"DeviceRGB", 1, 1, vec![0; 3])));
        let text = LopdfDocument::from_document(doc).raw_object_text(id.0);
        assert!(text.contains("/Image"));
        assert!(text.contains("/ColorSpace /DeviceRGB"));
        assert!(!text.contains("/ImageMask"));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            LopdfDocument::open("/nonexistent/file.pdf"),
            Err(OpenError::Io(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(matches!(
            LopdfDocument::from_bytes(b"not a pdf"),
            Err(OpenError::Parse(_))
        ));
    }
}
