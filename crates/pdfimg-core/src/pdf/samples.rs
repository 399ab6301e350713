//! Decoding of raw image samples into pixel buffers.

use lopdf::{Dictionary, Document, Object};
use tracing::trace;

use crate::error::PixelError;
use crate::pixmap::{Colorspace, PixelBuffer};

/// Colour model declared by an image dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModel {
    Device(Colorspace),
    /// Palette image: one index per pixel mapped through `lookup`.
    Indexed { base: Colorspace, lookup: Vec<u8> },
}

impl ColorModel {
    /// Colourspace of the decoded pixels.
    pub fn output(&self) -> Colorspace {
        match self {
            ColorModel::Device(cs) | ColorModel::Indexed { base: cs, .. } => *cs,
        }
    }

    /// Samples stored per pixel in the stream.
    fn stored_components(&self) -> usize {
        match self {
            ColorModel::Device(cs) => cs.components() as usize,
            ColorModel::Indexed { .. } => 1,
        }
    }
}

/// Resolve the `/ColorSpace` entry of an image dictionary, `None` when absent.
pub fn image_color_model(doc: &Document, dict: &Dictionary) -> Result<Option<ColorModel>, PixelError> {
    match dict.get(b"ColorSpace").or_else(|_| dict.get(b"CS")) {
        Ok(object) => resolve_color_model(doc, object, 0).map(Some),
        Err(_) => Ok(None),
    }
}

/// Whether the dictionary declares a stencil mask.
pub fn is_image_mask(dict: &Dictionary) -> bool {
    dict.get(b"ImageMask")
        .or_else(|_| dict.get(b"IM"))
        .and_then(Object::as_bool)
        .unwrap_or(false)
}

/// Decode unfiltered samples of an image stream.
pub fn decode_samples(doc: &Document, dict: &Dictionary, data: &[u8]) -> Result<PixelBuffer, PixelError> {
    let (width, height) = image_size(dict)?;

    let (model, bits) = if is_image_mask(dict) {
        (ColorModel::Device(Colorspace::Gray), 1)
    } else {
        let model = image_color_model(doc, dict)?
            .ok_or_else(|| PixelError::InvalidImage("missing /ColorSpace".to_string()))?;
        let bits = dict
            .get(b"BitsPerComponent")
            .or_else(|_| dict.get(b"BPC"))
            .and_then(Object::as_i64)
            .unwrap_or(8);
        (model, bits)
    };

    trace!("Decoding {}x{} samples, {:?}, {} bits", width, height, model, bits);

    let output = model.output();
    let components = model.stored_components();
    let indexed = matches!(model, ColorModel::Indexed { .. });
    let mut samples = unpack_samples(data, width, height, components, bits, !indexed)?;

    let samples = match model {
        ColorModel::Indexed { base, lookup } => expand_palette(&samples, base, &lookup),
        ColorModel::Device(Colorspace::Gray) => {
            if is_decode_inverted(dict) {
                for value in &mut samples {
                    *value = 255 - *value;
                }
            }
            samples
        }
        ColorModel::Device(_) => samples,
    };

    PixelBuffer::new(width, height, output, samples)
}

/// `/Width` and `/Height` of an image dictionary.
pub fn image_size(dict: &Dictionary) -> Result<(u32, u32), PixelError> {
    Ok((dimension(dict, b"Width", b"W")?, dimension(dict, b"Height", b"H")?))
}

fn dimension(dict: &Dictionary, key: &[u8], abbreviation: &[u8]) -> Result<u32, PixelError> {
    let value = dict
        .get(key)
        .or_else(|_| dict.get(abbreviation))
        .and_then(Object::as_i64)
        .map_err(|_| {
            PixelError::InvalidImage(format!("missing /{}", String::from_utf8_lossy(key)))
        })?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| PixelError::InvalidImage(format!("bad /{} {value}", String::from_utf8_lossy(key))))
}

/// Follow indirect references to the object they point at.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    // Bounded so reference cycles terminate.
    for _ in 0..32 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

fn resolve_color_model(doc: &Document, object: &Object, depth: u8) -> Result<ColorModel, PixelError> {
    if depth > 4 {
        return Err(PixelError::UnsupportedColorspace("nested too deeply".to_string()));
    }

    match resolve(doc, object) {
        Object::Name(name) => device_colorspace(name).map(ColorModel::Device),
        Object::Array(items) => {
            let family = items
                .first()
                .map(|o| resolve(doc, o))
                .and_then(|o| o.as_name().ok())
                .ok_or_else(|| PixelError::UnsupportedColorspace("empty array".to_string()))?;

            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .map(|o| resolve(doc, o))
                        .and_then(|o| o.as_stream().ok())
                        .ok_or_else(|| PixelError::InvalidImage("ICCBased without profile".to_string()))?;
                    match profile.dict.get(b"N").and_then(Object::as_i64) {
                        Ok(1) => Ok(ColorModel::Device(Colorspace::Gray)),
                        Ok(3) => Ok(ColorModel::Device(Colorspace::Rgb)),
                        Ok(4) => Ok(ColorModel::Device(Colorspace::Cmyk)),
                        _ => match profile.dict.get(b"Alternate") {
                            Ok(alternate) => resolve_color_model(doc, alternate, depth + 1),
                            Err(_) => Err(PixelError::UnsupportedColorspace("ICCBased".to_string())),
                        },
                    }
                }
                b"Indexed" | b"I" => {
                    let base = items
                        .get(1)
                        .ok_or_else(|| PixelError::InvalidImage("Indexed without base".to_string()))
                        .and_then(|o| resolve_color_model(doc, o, depth + 1))?;
                    let ColorModel::Device(base) = base else {
                        return Err(PixelError::UnsupportedColorspace("nested Indexed".to_string()));
                    };
                    let lookup = items
                        .get(3)
                        .map(|o| lookup_bytes(doc, o))
                        .transpose()?
                        .ok_or_else(|| PixelError::InvalidImage("Indexed without lookup".to_string()))?;
                    Ok(ColorModel::Indexed { base, lookup })
                }
                b"CalGray" | b"CalRGB" | b"CalCMYK" => device_colorspace(family).map(ColorModel::Device),
                other => Err(PixelError::UnsupportedColorspace(
                    String::from_utf8_lossy(other).into_owned(),
                )),
            }
        }
        other => Err(PixelError::UnsupportedColorspace(format!("{other:?}"))),
    }
}

fn device_colorspace(name: &[u8]) -> Result<Colorspace, PixelError> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(Colorspace::Gray),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(Colorspace::Rgb),
        b"DeviceCMYK" | b"CalCMYK" | b"CMYK" => Ok(Colorspace::Cmyk),
        other => Err(PixelError::UnsupportedColorspace(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

fn lookup_bytes(doc: &Document, object: &Object) -> Result<Vec<u8>, PixelError> {
    match resolve(doc, object) {
        Object::String(bytes, _) => Ok(bytes.clone()),
        Object::Stream(stream) => Ok(stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())),
        _ => Err(PixelError::InvalidImage("bad Indexed lookup table".to_string())),
    }
}

/// Unpack row-aligned samples to one byte each. Sub-byte depths are scaled to 0..=255 when `scale` is set.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bits: i64,
    scale: bool,
) -> Result<Vec<u8>, PixelError> {
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(PixelError::InvalidImage(format!("unsupported BitsPerComponent {bits}")));
    }
    let bits = bits as usize;

    let overflow = || PixelError::InvalidImage(format!("{width}x{height} image is too large"));
    let per_row = (width as usize).checked_mul(components).ok_or_else(overflow)?;
    let row_bytes = per_row.checked_mul(bits).ok_or_else(overflow)?.div_ceil(8);
    let expected = row_bytes.checked_mul(height as usize).ok_or_else(overflow)?;
    if data.len() < expected {
        return Err(PixelError::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    let mut out = Vec::with_capacity(per_row * height as usize);
    for row in data[..expected].chunks_exact(row_bytes) {
        match bits {
            8 => out.extend_from_slice(&row[..per_row]),
            16 => out.extend(row.chunks_exact(2).take(per_row).map(|pair| pair[0])),
            _ => {
                let max = (1u16 << bits) - 1;
                for i in 0..per_row {
                    let bit_offset = i * bits;
                    let byte = row[bit_offset / 8];
                    let shift = 8 - bits - (bit_offset % 8);
                    let value = (u16::from(byte) >> shift) & max;
                    out.push(if scale { (value * 255 / max) as u8 } else { value as u8 });
                }
            }
        }
    }
    Ok(out)
}

fn expand_palette(indices: &[u8], base: Colorspace, lookup: &[u8]) -> Vec<u8> {
    let n = base.components() as usize;
    let mut out = Vec::with_capacity(indices.len() * n);
    for &index in indices {
        let start = index as usize * n;
        match lookup.get(start..start + n) {
            Some(entry) => out.extend_from_slice(entry),
            None => out.extend(std::iter::repeat_n(0, n)),
        }
    }
    out
}

fn is_decode_inverted(dict: &Dictionary) -> bool {
    let Ok(decode) = dict.get(b"Decode").or_else(|_| dict.get(b"D")).and_then(Object::as_array) else {
        return false;
    };
    match (
        decode.first().and_then(|v| v.as_float().ok()),
        decode.get(1).and_then(|v| v.as_float().ok()),
    ) {
        (Some(first), Some(second)) => first > second,
        _ => false,
    }
}
