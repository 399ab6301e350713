//! End-to-end extraction over PDFs built with lopdf.

use std::fs;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use pretty_assertions::assert_eq;

use pdfimg_core::{Colorspace, ExtractError, OpenError, PdfImgConfig, PixelBuffer, extract_pdf};

fn image_stream(colorspace: &str, width: i64, height: i64, data: Vec<u8>) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => colorspace,
        "BitsPerComponent" => 8,
    };
    Stream::new(dict, data)
}

fn jpeg_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(4, 4, Rgb([200, 10, 10]));
    let mut data = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Jpeg)
        .unwrap();
    data
}

/// Add an empty page tree and catalog, then write the document.
fn save(mut doc: Document, path: &Path) {
    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<Object>::new(),
        "Count" => 0,
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

struct Fixture {
    dir: tempfile::TempDir,
    pdf: PathBuf,
    config: PdfImgConfig,
}

impl Fixture {
    fn new(name: &str, doc: Document) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join(name);
        save(doc, &pdf);

        let mut config = PdfImgConfig::default();
        config.output.root_dir = dir.path().join("extracted_images");
        Self { dir, pdf, config }
    }

    fn output_dir(&self) -> PathBuf {
        let stem = self.pdf.file_stem().unwrap();
        self.config.output.root_dir.join(stem)
    }

    fn run(&self) -> pdfimg_core::Result<pdfimg_core::ExtractionSummary> {
        extract_pdf(&self.pdf, &self.config, |_, _| ControlFlow::Continue(()))
    }

    fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

#[test]
fn test_jpeg_is_written_unchanged() {
    let jpeg = jpeg_bytes();
    let mut doc = Document::with_version("1.5");
    let mut stream = image_stream("DeviceRGB", 4, 4, jpeg.clone());
    stream.dict.set("Filter", "DCTDecode");
    let (id, _) = doc.add_object(Object::Stream(stream));

    let fixture = Fixture::new("photo.pdf", doc);
    let summary = fixture.run().unwrap();

    assert_eq!(summary.image_count, 1);
    assert_eq!(summary.output_dir, fixture.output_dir());
    assert_eq!(fixture.files(), vec![format!("img_{id}.jpeg")]);
    let written = fs::read(fixture.output_dir().join(format!("img_{id}.jpeg"))).unwrap();
    assert_eq!(written, jpeg);
}

#[test]
fn test_soft_mask_is_fused_into_host() {
    let mut doc = Document::with_version("1.5");
    // Reserve the host first so the mask gets the higher object number.
    let host_id: ObjectId = doc.new_object_id();
    let mask_id = doc.add_object(Object::Stream(image_stream("DeviceGray", 2, 1, vec![0, 255])));

    let mut host = image_stream("DeviceRGB", 2, 1, vec![255, 0, 0, 0, 0, 255]);
    host.dict.set("SMask", mask_id);
    host.compress().unwrap();
    doc.objects.insert(host_id, Object::Stream(host));

    let fixture = Fixture::new("masked.pdf", doc);
    let summary = fixture.run().unwrap();

    assert_eq!(summary.image_count, 1);
    let name = format!("img_{}.png", host_id.0);
    assert_eq!(fixture.files(), vec![name.clone()]);

    let pixels = PixelBuffer::from_encoded(&fs::read(fixture.output_dir().join(name)).unwrap()).unwrap();
    assert!(pixels.has_alpha());
    assert_eq!(pixels.samples(), &[255, 0, 0, 0, 0, 0, 255, 255]);
}

#[test]
fn test_raw_cmyk_image_becomes_rgb_png() {
    let mut doc = Document::with_version("1.5");
    let (id, _) = doc.add_object(Object::Stream(image_stream(
        "DeviceCMYK",
        2,
        1,
        vec![0, 0, 0, 0, 0, 0, 0, 255],
    )));

    let fixture = Fixture::new("print.pdf", doc);
    fixture.run().unwrap();

    let name = format!("img_{id}.png");
    assert_eq!(fixture.files(), vec![name.clone()]);
    let pixels = PixelBuffer::from_encoded(&fs::read(fixture.output_dir().join(name)).unwrap()).unwrap();
    assert_eq!(pixels.colorspace(), Colorspace::Rgb);
    assert_eq!(pixels.samples(), &[255, 255, 255, 0, 0, 0]);
}

#[test]
fn test_stencil_mask_becomes_png() {
    let mut doc = Document::with_version("1.5");
    let mut dict = Dictionary::new();
    dict.set("Type", "XObject");
    dict.set("Subtype", "Image");
    dict.set("Width", 8);
    dict.set("Height", 2);
    dict.set("ImageMask", true);
    let (id, _) = doc.add_object(Object::Stream(Stream::new(dict, vec![0b1010_1010, 0xFF])));

    let fixture = Fixture::new("stencil.pdf", doc);
    fixture.run().unwrap();

    let name = format!("img_{id}.png");
    assert_eq!(fixture.files(), vec![name.clone()]);
    let pixels = PixelBuffer::from_encoded(&fs::read(fixture.output_dir().join(name)).unwrap()).unwrap();
    assert_eq!((pixels.width(), pixels.height()), (8, 2));
}

#[test]
fn test_document_without_images_writes_nothing() {
    let mut doc = Document::with_version("1.5");
    doc.add_object(dictionary! { "Type" => "Font" });

    let fixture = Fixture::new("text.pdf", doc);
    let summary = fixture.run().unwrap();

    assert_eq!(summary.image_count, 0);
    assert!(summary.object_count > 1);
    assert!(!fixture.output_dir().exists());
}

#[test]
fn test_unreadable_path_fails_before_scan() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PdfImgConfig::default();
    config.output.root_dir = dir.path().join("out");

    let mut calls = 0;
    let result = extract_pdf(dir.path().join("missing.pdf"), &config, |_, _| {
        calls += 1;
        ControlFlow::Continue(())
    });

    assert!(matches!(result, Err(ExtractError::Open(OpenError::Io(_)))));
    assert_eq!(calls, 0);
    assert!(!config.output.root_dir.exists());
}

#[test]
fn test_progress_reports_every_object() {
    let mut doc = Document::with_version("1.5");
    doc.add_object(Object::Stream(image_stream("DeviceGray", 1, 1, vec![7])));
    let fixture = Fixture::new("progress.pdf", doc);

    let mut seen = Vec::new();
    let summary = extract_pdf(&fixture.pdf, &fixture.config, |xref, total| {
        seen.push((xref, total));
        ControlFlow::Continue(())
    })
    .unwrap();

    let total = summary.object_count;
    let expected: Vec<(u32, u32)> = (1..total).map(|xref| (xref, total)).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_cancel_from_progress() {
    let mut doc = Document::with_version("1.5");
    doc.add_object(Object::Stream(image_stream("DeviceGray", 1, 1, vec![7])));
    let fixture = Fixture::new("cancel.pdf", doc);

    let result = extract_pdf(&fixture.pdf, &fixture.config, |_, _| ControlFlow::Break(()));
    assert!(matches!(result, Err(ExtractError::Cancelled { xref: 1 })));
}

#[test]
fn test_second_run_produces_same_files() {
    let mut doc = Document::with_version("1.5");
    let mut jpeg = image_stream("DeviceRGB", 4, 4, jpeg_bytes());
    jpeg.dict.set("Filter", "DCTDecode");
    doc.add_object(Object::Stream(jpeg));
    doc.add_object(Object::Stream(image_stream("DeviceCMYK", 1, 1, vec![0, 255, 255, 0])));

    let fixture = Fixture::new("twice.pdf", doc);
    let first = fixture.run().unwrap();
    let first_files = read_all(&first.output_dir);

    // Second run into an untouched root so nothing from the first run is reused.
    let mut config = fixture.config.clone();
    config.output.root_dir = fixture.dir.path().join("second_run");
    let second = extract_pdf(&fixture.pdf, &config, |_, _| ControlFlow::Continue(())).unwrap();
    let second_files = read_all(&second.output_dir);

    assert_ne!(first.output_dir, second.output_dir);
    assert_eq!(first.image_count, second.image_count);
    assert_eq!(first.object_count, second.object_count);
    assert_eq!(first_files.len(), 2);
    assert_eq!(first_files, second_files);
}

fn read_all(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().into_owned();
            (name, fs::read(entry.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_runlength_image_is_delivered() {
    let mut doc = Document::with_version("1.5");
    let mut stream = image_stream("DeviceGray", 2, 1, vec![1, 5, 6, 128]);
    stream.dict.set("Filter", "RunLengthDecode");
    let (id, _) = doc.add_object(Object::Stream(stream));

    let fixture = Fixture::new("runlength.pdf", doc);
    let summary = fixture.run().unwrap();

    assert_eq!(summary.image_count, 1);
    let name = format!("img_{id}.png");
    assert_eq!(fixture.files(), vec![name.clone()]);
    let pixels = PixelBuffer::from_encoded(&fs::read(fixture.output_dir().join(name)).unwrap()).unwrap();
    assert_eq!(pixels.samples(), &[5, 6]);
}

#[test]
fn test_ccitt_stencil_does_not_stop_the_scan() {
    use fax::encoder::Encoder;
    use fax::{Color, VecWriter};

    let row = [Color::White, Color::Black, Color::Black, Color::White];
    let mut encoder = Encoder::new(VecWriter::new());
    for _ in 0..2 {
        encoder.encode_line(row.iter().copied(), 4).unwrap();
    }
    let fax_data = encoder.finish().unwrap().finish();

    let mut doc = Document::with_version("1.5");
    let scan = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 4,
            "Height" => 2,
            "ImageMask" => true,
            "Filter" => "CCITTFaxDecode",
            "DecodeParms" => dictionary! { "K" => -1, "Columns" => 4 },
        },
        fax_data,
    );
    let (scan_id, _) = doc.add_object(Object::Stream(scan));
    let (gray_id, _) = doc.add_object(Object::Stream(image_stream("DeviceGray", 1, 1, vec![9])));
    assert_eq!((scan_id, gray_id), (1, 2));

    let fixture = Fixture::new("scan.pdf", doc);
    let summary = fixture.run().unwrap();

    assert_eq!(summary.image_count, 2);
    assert_eq!(fixture.files(), vec!["img_1.png".to_string(), "img_2.png".to_string()]);
    let stencil = PixelBuffer::from_encoded(&fs::read(fixture.output_dir().join("img_1.png")).unwrap()).unwrap();
    assert_eq!((stencil.width(), stencil.height()), (4, 2));
    assert_eq!(stencil.samples(), &[255, 0, 0, 255, 255, 0, 0, 255]);
}

#[test]
fn test_oversized_dimensions_are_not_images() {
    let mut doc = Document::with_version("1.5");
    let huge = i64::from(u32::MAX);
    let mut stream = image_stream("DeviceCMYK", huge, huge, vec![0; 8]);
    stream.dict.set("BitsPerComponent", 16);
    doc.add_object(Object::Stream(stream));
    doc.add_object(Object::Stream(image_stream("DeviceGray", 1, 1, vec![3])));

    let fixture = Fixture::new("huge.pdf", doc);
    let summary = fixture.run().unwrap();

    assert_eq!(summary.image_count, 1);
    assert_eq!(fixture.files(), vec!["img_2.png".to_string()]);
}
