//! Stream filter decoding.
//!
//! Flate, LZW and ASCII85 stages go through lopdf. ASCIIHex and RunLength are
//! decoded here, and CCITT fax data is expanded to 1-bit rows with `fax`.

use fax::Color;
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::trace;

use super::samples::resolve;
use crate::error::PixelError;

/// Full filter name for the abbreviations allowed in image dictionaries.
pub fn canonical_name(name: &str) -> &str {
    match name {
        "AHx" => "ASCIIHexDecode",
        "A85" => "ASCII85Decode",
        "LZW" => "LZWDecode",
        "Fl" => "FlateDecode",
        "RL" => "RunLengthDecode",
        "CCF" => "CCITTFaxDecode",
        "DCT" => "DCTDecode",
        other => other,
    }
}

/// Decode parameters of the filter at `index` in the stream's chain.
pub fn decode_params<'a>(doc: &'a Document, dict: &'a Dictionary, index: usize) -> Option<&'a Dictionary> {
    let params = dict.get(b"DecodeParms").or_else(|_| dict.get(b"DP")).ok()?;
    let params = match resolve(doc, params) {
        Object::Array(items) => resolve(doc, items.get(index)?),
        other if index == 0 => other,
        _ => return None,
    };
    params.as_dict().ok()
}

/// Undo `filters` in order, starting from the raw stream bytes.
pub fn decode_chain(doc: &Document, stream: &Stream, filters: &[String]) -> Result<Vec<u8>, PixelError> {
    let mut data = stream.content.clone();
    for (index, filter) in filters.iter().enumerate() {
        let params = decode_params(doc, &stream.dict, index);
        let input_len = data.len();
        data = decode_stage(filter, params, data)?;
        trace!("{} decoded {} bytes into {}", filter, input_len, data.len());
    }
    Ok(data)
}

fn decode_stage(filter: &str, params: Option<&Dictionary>, data: Vec<u8>) -> Result<Vec<u8>, PixelError> {
    match filter {
        "ASCIIHexDecode" => Ok(asciihex_decode(&data)),
        "RunLengthDecode" => Ok(runlength_decode(&data)),
        "FlateDecode" | "LZWDecode" | "ASCII85Decode" => {
            let mut dict = Dictionary::new();
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
            if let Some(params) = params {
                dict.set("DecodeParms", Object::Dictionary(params.clone()));
            }
            Stream::new(dict, data)
                .decompressed_content()
                .map_err(|e| PixelError::UnsupportedFilter(format!("{filter}: {e}")))
        }
        other => Err(PixelError::UnsupportedFilter(other.to_string())),
    }
}

/// Decode ASCIIHex data. Whitespace is skipped, `>` ends the data and an odd
/// final digit is padded with zero.
pub fn asciihex_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        let nibble = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => continue,
        };
        match pending.take() {
            Some(high) => out.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        out.push(high << 4);
    }
    out
}

/// Decode RunLength data.
///
/// Length byte 0-127 copies the next `length + 1` bytes, 129-255 repeats the
/// next byte `257 - length` times and 128 ends the data. Truncated runs stop
/// decoding.
pub fn runlength_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;

    while let Some(&length) = data.get(i) {
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let Some(run) = data.get(i..i + count) else {
                    break;
                };
                out.extend_from_slice(run);
                i += count;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else {
                    break;
                };
                out.extend(std::iter::repeat_n(byte, 257 - length as usize));
                i += 1;
            }
        }
    }
    out
}

/// Expand CCITT Group 3 or Group 4 data into `height` rows of 1-bit samples.
///
/// Bits follow the PDF convention: black is 0 unless `/BlackIs1` is set.
/// Missing rows are filled with white, extra rows are dropped.
pub fn ccitt_decode(
    data: &[u8],
    params: Option<&Dictionary>,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, PixelError> {
    let int = |key: &[u8]| params.and_then(|p| p.get(key).ok()).and_then(|o| o.as_i64().ok());
    let k = int(b"K").unwrap_or(0);
    let columns = int(b"Columns").unwrap_or(i64::from(width));
    let black_is_1 = params
        .and_then(|p| p.get(b"BlackIs1").ok())
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);

    let columns = u16::try_from(columns)
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| PixelError::InvalidImage(format!("bad CCITT /Columns {columns}")))?;
    let rows = u16::try_from(height).ok();

    let row_bytes = usize::from(columns).div_ceil(8);
    let expected = row_bytes
        .checked_mul(height as usize)
        .ok_or_else(|| PixelError::InvalidImage(format!("{width}x{height} image is too large")))?;

    let mut out = Vec::with_capacity(expected);
    let mut lines = 0usize;
    let push_line = |transitions: &[u16]| {
        if out.len() >= expected {
            return;
        }
        let mut row = vec![0u8; row_bytes];
        for (i, color) in fax::decoder::pels(transitions, columns).enumerate() {
            if (color == Color::Black) == black_is_1 {
                row[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out.extend_from_slice(&row);
        lines += 1;
    };

    let finished = if k < 0 {
        fax::decoder::decode_g4(data.iter().copied(), columns, rows, push_line)
    } else {
        fax::decoder::decode_g3(data.iter().copied(), push_line)
    };

    if lines == 0 {
        return Err(PixelError::InvalidImage("no CCITT rows could be decoded".to_string()));
    }
    if finished.is_none() {
        trace!("CCITT data ended early after {} rows", lines);
    }

    let white = if black_is_1 { 0x00 } else { 0xFF };
    out.resize(expected, white);
    Ok(out)
}
