//! In-memory rasters used while rebuilding images.

use std::fmt;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use tracing::trace;

use crate::error::PixelError;
use crate::models::image::Payload;

/// Colour model of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Gray,
    Rgb,
    Cmyk,
}

impl Colorspace {
    /// Number of colour components, alpha excluded.
    pub fn components(self) -> u8 {
        match self {
            Colorspace::Gray => 1,
            Colorspace::Rgb => 3,
            Colorspace::Cmyk => 4,
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Colorspace::Gray => "DeviceGray",
            Colorspace::Rgb => "DeviceRGB",
            Colorspace::Cmyk => "DeviceCMYK",
        };
        f.write_str(name)
    }
}

/// A decoded raster with interleaved 8-bit samples.
///
/// The alpha channel, when present, follows the colour components of each pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    colorspace: Colorspace,
    alpha: bool,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Create a buffer without alpha, checking the sample count against the geometry.
    pub fn new(
        width: u32,
        height: u32,
        colorspace: Colorspace,
        samples: Vec<u8>,
    ) -> Result<Self, PixelError> {
        let expected = sample_count(width, height, colorspace.components() as usize)
            .ok_or_else(|| PixelError::InvalidImage(format!("{width}x{height} image is too large")))?;
        if samples.len() != expected {
            return Err(PixelError::SizeMismatch {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            colorspace,
            alpha: false,
            samples,
        })
    }

    /// Decode encoded image bytes (PNG, JPEG, PNM, ...).
    pub fn from_encoded(data: &[u8]) -> Result<Self, PixelError> {
        let image = image::load_from_memory(data).map_err(PixelError::Decode)?;
        Ok(Self::from_dynamic(image))
    }

    /// Build a buffer from a record payload.
    pub fn from_payload(payload: Payload) -> Result<Self, PixelError> {
        match payload {
            Payload::Encoded(data) => Self::from_encoded(&data),
            Payload::Pixels(pixels) => Ok(pixels),
        }
    }

    /// Wrap a decoded `image` raster. Deep colour is reduced to 8 bits.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (colorspace, alpha, samples) = match image {
            DynamicImage::ImageLuma8(img) => (Colorspace::Gray, false, img.into_raw()),
            DynamicImage::ImageLumaA8(img) => (Colorspace::Gray, true, img.into_raw()),
            DynamicImage::ImageRgb8(img) => (Colorspace::Rgb, false, img.into_raw()),
            DynamicImage::ImageRgba8(img) => (Colorspace::Rgb, true, img.into_raw()),
            other => {
                let color = other.color();
                match (color.has_color(), color.has_alpha()) {
                    (false, false) => (Colorspace::Gray, false, other.to_luma8().into_raw()),
                    (false, true) => (Colorspace::Gray, true, other.to_luma_alpha8().into_raw()),
                    (true, false) => (Colorspace::Rgb, false, other.to_rgb8().into_raw()),
                    (true, true) => (Colorspace::Rgb, true, other.to_rgba8().into_raw()),
                }
            }
        };
        Self {
            width,
            height,
            colorspace,
            alpha,
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha
    }

    /// Colour components per pixel, alpha excluded.
    pub fn component_count(&self) -> u8 {
        self.colorspace.components()
    }

    /// Total samples per pixel, alpha included.
    pub fn channels(&self) -> usize {
        self.colorspace.components() as usize + usize::from(self.alpha)
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Copy of this buffer with the alpha channel removed.
    pub fn without_alpha(&self) -> Self {
        if !self.alpha {
            return self.clone();
        }
        let channels = self.channels();
        let components = self.colorspace.components() as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .flat_map(|px| px[..components].iter().copied())
            .collect();
        Self {
            alpha: false,
            samples,
            ..*self
        }
    }

    /// Copy of this buffer whose alpha channel is taken from `alpha`, one sample per pixel.
    ///
    /// Any existing alpha is replaced.
    pub fn with_alpha(&self, alpha: &[u8]) -> Result<Self, PixelError> {
        let pixels = self.samples.len() / self.channels();
        if alpha.len() != pixels {
            return Err(PixelError::SizeMismatch {
                expected: pixels,
                actual: alpha.len(),
            });
        }

        let base = self.without_alpha();
        let components = base.colorspace.components() as usize;
        let mut samples = Vec::with_capacity(pixels * (components + 1));
        for (px, &a) in base.samples.chunks_exact(components).zip(alpha) {
            samples.extend_from_slice(px);
            samples.push(a);
        }

        Ok(Self {
            alpha: true,
            samples,
            ..base
        })
    }

    /// Convert into another colourspace, keeping alpha.
    pub fn convert_colorspace(&self, target: Colorspace) -> Result<Self, PixelError> {
        if self.colorspace == target {
            return Ok(self.clone());
        }

        if target == Colorspace::Cmyk {
            return Err(PixelError::UnsupportedConversion {
                from: self.colorspace.to_string(),
                to: target.to_string(),
            });
        }

        let components = self.colorspace.components() as usize;
        let channels = self.channels();
        let pixels = self.samples.len() / channels;
        let mut samples =
            Vec::with_capacity(pixels * (target.components() as usize + usize::from(self.alpha)));
        for px in self.samples.chunks_exact(channels) {
            convert_pixel(&px[..components], self.colorspace, target, &mut samples);
            if self.alpha {
                samples.push(px[components]);
            }
        }

        trace!("Converted {}x{} buffer {} -> {}", self.width, self.height, self.colorspace, target);

        Ok(Self {
            colorspace: target,
            samples,
            ..*self
        })
    }

    /// Convert to an `image` raster. CMYK has no counterpart there.
    pub fn to_dynamic(&self) -> Result<DynamicImage, PixelError> {
        let (w, h) = (self.width, self.height);
        let data = self.samples.clone();
        let image = match (self.colorspace, self.alpha) {
            (Colorspace::Gray, false) => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            (Colorspace::Gray, true) => {
                GrayAlphaImage::from_raw(w, h, data).map(DynamicImage::ImageLumaA8)
            }
            (Colorspace::Rgb, false) => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            (Colorspace::Rgb, true) => RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            (Colorspace::Cmyk, _) => {
                return Err(PixelError::UnsupportedColorspace(self.colorspace.to_string()));
            }
        };
        image.ok_or_else(|| PixelError::InvalidImage(format!("{w}x{h} buffer has wrong sample count")))
    }

    /// Encode into the file format named by `extension`.
    pub fn encode(&self, extension: &str, jpeg_quality: u8) -> Result<Vec<u8>, PixelError> {
        let image = self.to_dynamic()?;
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);

        match extension.to_ascii_lowercase().as_str() {
            "png" => image
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(PixelError::Encode)?,
            "jpg" | "jpeg" => {
                // JPEG carries no alpha
                let opaque = if image.color().has_color() {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                } else {
                    DynamicImage::ImageLuma8(image.to_luma8())
                };
                opaque
                    .write_with_encoder(JpegEncoder::new_with_quality(&mut cursor, jpeg_quality))
                    .map_err(PixelError::Encode)?;
            }
            "ppm" => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(
                    PnmEncoder::new(&mut cursor).with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary)),
                )
                .map_err(PixelError::Encode)?,
            "pgm" => DynamicImage::ImageLuma8(image.to_luma8())
                .write_with_encoder(
                    PnmEncoder::new(&mut cursor).with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary)),
                )
                .map_err(PixelError::Encode)?,
            "pnm" => {
                let (opaque, subtype) = match self.colorspace {
                    Colorspace::Gray => (
                        DynamicImage::ImageLuma8(image.to_luma8()),
                        PnmSubtype::Graymap(SampleEncoding::Binary),
                    ),
                    _ => (
                        DynamicImage::ImageRgb8(image.to_rgb8()),
                        PnmSubtype::Pixmap(SampleEncoding::Binary),
                    ),
                };
                opaque
                    .write_with_encoder(PnmEncoder::new(&mut cursor).with_subtype(subtype))
                    .map_err(PixelError::Encode)?;
            }
            other => return Err(PixelError::UnsupportedEncoding(other.to_string())),
        }

        Ok(data)
    }
}

fn convert_pixel(px: &[u8], from: Colorspace, to: Colorspace, out: &mut Vec<u8>) {
    let [r, g, b] = match from {
        Colorspace::Gray => [px[0]; 3],
        Colorspace::Rgb => [px[0], px[1], px[2]],
        Colorspace::Cmyk => cmyk_to_rgb(px),
    };
    match to {
        Colorspace::Gray if from == Colorspace::Gray => out.push(px[0]),
        Colorspace::Gray => out.push(luma(r, g, b)),
        Colorspace::Rgb => out.extend_from_slice(&[r, g, b]),
        Colorspace::Cmyk => out.extend_from_slice(px),
    }
}

fn sample_count(width: u32, height: u32, channels: usize) -> Option<usize> {
    (width as usize).checked_mul(height as usize)?.checked_mul(channels)
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

fn cmyk_to_rgb(px: &[u8]) -> [u8; 3] {
    let inv_k = 255 - u16::from(px[3]);
    let channel = |v: u8| (((255 - u16::from(v)) * inv_k + 127) / 255) as u8;
    [channel(px[0]), channel(px[1]), channel(px[2])]
}
