//! Stream decoding.
//!
//! Only what the document structure needs is supported: FlateDecode with
//! optional PNG predictors, as used by cross-reference and object streams.

use super::error::{PDFError, PDFResult};
use super::parser::{Dict, PDFObject};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Decodes a FlateDecode (zlib/deflate) compressed stream.
pub fn decode_flate(compressed_data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed_data);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| PDFError::parse(format!("FlateDecode error: {}", e)))?;

    Ok(decompressed)
}

/// Undoes a PNG predictor (`/Predictor` 10..=15) applied row by row.
///
/// Every row carries a leading filter-type byte, as in the PNG format.
pub fn apply_png_predictor(
    data: &[u8],
    colors: usize,
    bpc: usize,
    columns: usize,
) -> PDFResult<Vec<u8>> {
    let bits_per_pixel = colors
        .checked_mul(bpc)
        .ok_or_else(|| PDFError::parse("PNG predictor pixel size overflows"))?;
    let row_bits = bits_per_pixel
        .checked_mul(columns)
        .ok_or_else(|| PDFError::parse("PNG predictor row width overflows"))?;
    let bpp = bits_per_pixel.div_ceil(8).max(1);
    let row_len = row_bits.div_ceil(8);
    if row_len == 0 {
        return Err(PDFError::parse("PNG predictor with empty rows"));
    }
    // A row wider than the data is a single truncated row
    let row_len = row_len.min(data.len().saturating_sub(1).max(1));

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    for row in data.chunks(row_len + 1) {
        let (filter, raw) = match row.split_first() {
            Some((filter, raw)) => (*filter, raw),
            None => break,
        };
        let mut cur = raw.to_vec();
        cur.resize(row_len, 0);

        for i in 0..row_len {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            cur[i] = match filter {
                0 => cur[i],
                1 => cur[i].wrapping_add(left),
                2 => cur[i].wrapping_add(up),
                3 => cur[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => cur[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(PDFError::parse(format!("Unknown PNG filter type {}", other)));
                }
            };
        }

        out.extend_from_slice(&cur[..raw.len().min(row_len)]);
        prev = cur;
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Decodes stream `data` according to the `/Filter` and `/DecodeParms`
/// entries of its dictionary.
pub fn decode_stream(dict: &Dict, data: &[u8]) -> PDFResult<Vec<u8>> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None | Some(PDFObject::Null) => return Ok(data.to_vec()),
        Some(PDFObject::Name(name)) => vec![name.as_str()],
        Some(PDFObject::Array(items)) => items.iter().filter_map(PDFObject::as_name).collect(),
        Some(other) => {
            return Err(PDFError::parse(format!("Invalid /Filter entry {:?}", other)));
        }
    };
    let params: Vec<Option<&PDFObject>> = match dict.get("DecodeParms") {
        Some(PDFObject::Array(items)) => items.iter().map(Some).collect(),
        Some(obj @ PDFObject::Dictionary(_)) => vec![Some(obj)],
        _ => Vec::new(),
    };

    let mut buffer = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        buffer = match *filter {
            "FlateDecode" | "Fl" => {
                let inflated = decode_flate(&buffer)?;
                match params.get(i).copied().flatten() {
                    Some(parms) => apply_predictor(parms, inflated)?,
                    None => inflated,
                }
            }
            other => {
                return Err(PDFError::parse(format!("Unsupported filter: {}", other)));
            }
        };
    }

    Ok(buffer)
}

fn apply_predictor(parms: &PDFObject, data: Vec<u8>) -> PDFResult<Vec<u8>> {
    let int = |key: &str, default: i64| {
        parms
            .get(key)
            .and_then(PDFObject::as_int)
            .unwrap_or(default)
    };
    let predictor = int("Predictor", 1);

    match predictor {
        1 => Ok(data),
        10..=15 => apply_png_predictor(
            &data,
            int("Colors", 1).max(1) as usize,
            int("BitsPerComponent", 8).max(1) as usize,
            int("Columns", 1).max(1) as usize,
        ),
        other => Err(PDFError::parse(format!("Unsupported predictor {}", other))),
    }
}
