//! Filter-chain execution for image streams.
//!
//! Standard filters (Flate, LZW, ASCII85, ASCIIHex, RunLength) decode fully
//! to sample bytes. Native containers (DCT, JPX, CCITTFax) are never decoded
//! here: they must sit at the end of the chain and are passed through to the
//! raster backend, CCITT after being rewrapped as a one-strip TIFF so a
//! stock TIFF reader can ingest it.

use crate::core::document::{dict_bool, dict_int, resolve};
use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object};
use std::io::Read;

/// Container format left over after the chain ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeFilter {
  None,
  Dct,
  Jpx,
  CcittFax,
}

impl NativeFilter {
  pub(crate) fn name(self) -> &'static str {
    match self {
      NativeFilter::None => "",
      NativeFilter::Dct => "DCTDecode",
      NativeFilter::Jpx => "JPXDecode",
      NativeFilter::CcittFax => "CCITTFaxDecode",
    }
  }
}

pub(crate) struct FilterOutcome {
  pub data: Vec<u8>,
  pub native: NativeFilter,
}

/// Run the stream's filter chain over `data`.
///
/// `dict` is the image dictionary: it names the filters and their parameter
/// dictionaries and supplies the Height fallback for CCITT rows.
pub(crate) fn run_filter_chain(
  doc: &Document,
  dict: &Dictionary,
  data: Vec<u8>,
) -> Result<FilterOutcome> {
  let names = filter_names(doc, dict);
  let last = names.len().saturating_sub(1);
  let mut data = data;

  for (index, name) in names.iter().enumerate() {
    let parms = decode_parms(doc, dict, index);
    match name.as_str() {
      "FlateDecode" => {
        data = inflate(&data)?;
        data = apply_predictor(data, parms.as_ref())?;
      }
      "LZWDecode" => {
        let early_change = parms
          .as_ref()
          .and_then(|p| dict_int(p, b"EarlyChange"))
          .unwrap_or(1)
          == 1;
        data = decode_lzw(&data, early_change)?;
        data = apply_predictor(data, parms.as_ref())?;
      }
      "ASCII85Decode" => data = decode_ascii85(&data)?,
      "ASCIIHexDecode" => data = decode_ascii_hex(&data)?,
      "RunLengthDecode" => data = decode_run_length(&data)?,
      "DCTDecode" | "JPXDecode" | "CCITTFaxDecode" => {
        if index != last {
          return Err(Error::UnsupportedFilter(format!(
            "{name} before the end of the filter chain"
          )));
        }
        let native = match name.as_str() {
          "DCTDecode" => NativeFilter::Dct,
          "JPXDecode" => NativeFilter::Jpx,
          _ => {
            data = wrap_ccitt_in_tiff(parms.as_ref(), dict, &data);
            NativeFilter::CcittFax
          }
        };
        return Ok(FilterOutcome { data, native });
      }
      other => return Err(Error::UnsupportedFilter(other.to_string())),
    }
  }

  Ok(FilterOutcome {
    data,
    native: NativeFilter::None,
  })
}

/// Filter names from /Filter, expanded from their inline abbreviations.
fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<String> {
  let Ok(filter) = dict.get(b"Filter") else {
    return Vec::new();
  };
  match resolve(doc, filter) {
    Object::Name(name) => vec![expand_filter_name(name)],
    Object::Array(arr) => arr
      .iter()
      .filter_map(|o| match resolve(doc, o) {
        Object::Name(name) => Some(expand_filter_name(name)),
        _ => None,
      })
      .collect(),
    _ => Vec::new(),
  }
}

fn expand_filter_name(name: &[u8]) -> String {
  let full: &[u8] = match name {
    b"Fl" => b"FlateDecode",
    b"LZW" => b"LZWDecode",
    b"A85" => b"ASCII85Decode",
    b"AHx" => b"ASCIIHexDecode",
    b"RL" => b"RunLengthDecode",
    b"CCF" => b"CCITTFaxDecode",
    b"DCT" => b"DCTDecode",
    other => other,
  };
  String::from_utf8_lossy(full).into_owned()
}

/// The /DecodeParms entry for the filter at `index`: either one dictionary
/// for a single filter or an array parallel to the /Filter array.
fn decode_parms(doc: &Document, dict: &Dictionary, index: usize) -> Option<Dictionary> {
  let dp = dict.get(b"DecodeParms").ok()?;
  match resolve(doc, dp) {
    Object::Dictionary(d) => (index == 0).then(|| d.clone()),
    Object::Array(arr) => match resolve(doc, arr.get(index)?) {
      Object::Dictionary(d) => Some(d.clone()),
      _ => None,
    },
    _ => None,
  }
}

// ── Flate ───────────────────────────────────────────────────────

/// Raw inflate without predictor handling: zlib wrapper first (most common
/// in PDF), then headerless deflate.
fn inflate(data: &[u8]) -> Result<Vec<u8>> {
  let mut output = Vec::new();
  if flate2::read::ZlibDecoder::new(data)
    .read_to_end(&mut output)
    .is_ok()
  {
    return Ok(output);
  }
  output.clear();
  if flate2::read::DeflateDecoder::new(data)
    .read_to_end(&mut output)
    .is_ok()
  {
    return Ok(output);
  }
  Err(Error::Decode("inflate failed".into()))
}

// ── LZW ─────────────────────────────────────────────────────────

fn decode_lzw(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
  use weezl::{BitOrder, decode::Decoder};

  let mut decoder = if early_change {
    Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
  } else {
    Decoder::new(BitOrder::Msb, 8)
  };
  let mut output = Vec::new();
  let result = decoder.into_stream(&mut output).decode_all(data);
  if let Err(err) = result.status {
    return Err(Error::Decode(format!("LZW: {err}")));
  }
  Ok(output)
}

// ── ASCII85 / ASCIIHex / RunLength ──────────────────────────────

fn decode_ascii85(data: &[u8]) -> Result<Vec<u8>> {
  let mut out = Vec::with_capacity(data.len() / 5 * 4 + 4);
  let mut group = [0u8; 5];
  let mut len = 0usize;

  for &byte in data {
    match byte {
      b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => {}
      b'~' => break,
      b'z' if len == 0 => out.extend_from_slice(&[0; 4]),
      0x21..=0x75 => {
        group[len] = byte - 0x21;
        len += 1;
        if len == 5 {
          let word = group.iter().fold(0u64, |acc, &d| acc * 85 + d as u64);
          out.extend_from_slice(&(word as u32).to_be_bytes());
          len = 0;
        }
      }
      _ => return Err(Error::Decode(format!("invalid ASCII85 byte 0x{byte:02x}"))),
    }
  }

  match len {
    0 => {}
    1 => return Err(Error::Decode("truncated ASCII85 group".into())),
    _ => {
      // Pad with the highest digit and keep len-1 output bytes.
      for slot in group.iter_mut().skip(len) {
        *slot = 84;
      }
      let word = group.iter().fold(0u64, |acc, &d| acc * 85 + d as u64);
      out.extend_from_slice(&(word as u32).to_be_bytes()[..len - 1]);
    }
  }
  Ok(out)
}

fn decode_ascii_hex(data: &[u8]) -> Result<Vec<u8>> {
  let mut out = Vec::with_capacity(data.len() / 2);
  let mut high: Option<u8> = None;

  for &byte in data {
    let nibble = match byte {
      b'>' => break,
      b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => continue,
      b'0'..=b'9' => byte - b'0',
      b'a'..=b'f' => byte - b'a' + 10,
      b'A'..=b'F' => byte - b'A' + 10,
      _ => return Err(Error::Decode(format!("invalid hex byte 0x{byte:02x}"))),
    };
    match high.take() {
      Some(h) => out.push((h << 4) | nibble),
      None => high = Some(nibble),
    }
  }

  // An odd trailing digit acts as if followed by 0.
  if let Some(h) = high {
    out.push(h << 4);
  }
  Ok(out)
}

fn decode_run_length(data: &[u8]) -> Result<Vec<u8>> {
  let mut out = Vec::with_capacity(data.len() * 2);
  let mut pos = 0usize;

  while pos < data.len() {
    let control = data[pos];
    pos += 1;
    match control {
      128 => break,
      0..=127 => {
        let count = control as usize + 1;
        let literal = data
          .get(pos..pos + count)
          .ok_or_else(|| Error::Decode("truncated RunLength literal".into()))?;
        out.extend_from_slice(literal);
        pos += count;
      }
      129..=255 => {
        let count = 257 - control as usize;
        let byte = *data
          .get(pos)
          .ok_or_else(|| Error::Decode("truncated RunLength run".into()))?;
        pos += 1;
        out.extend(std::iter::repeat_n(byte, count));
      }
    }
  }
  Ok(out)
}

// ── Predictors ──────────────────────────────────────────────────

/// Reverse the Predictor a Flate/LZW parameter dictionary declares, with
/// the sample geometry (Colors, BitsPerComponent, Columns) taken from the
/// same dictionary. Data whose length does not fit that geometry is passed
/// through untouched; a corrupt row tag inside an otherwise well-formed
/// PNG-predicted stream is a decode error.
fn apply_predictor(data: Vec<u8>, parms: Option<&Dictionary>) -> Result<Vec<u8>> {
  let Some(parms) = parms else {
    return Ok(data);
  };
  let predictor = dict_int(parms, b"Predictor").unwrap_or(1);
  if predictor <= 1 {
    return Ok(data);
  }

  let colors = dict_int(parms, b"Colors").unwrap_or(1).max(1) as usize;
  let bits = dict_int(parms, b"BitsPerComponent").unwrap_or(8).max(1) as usize;
  let columns = dict_int(parms, b"Columns").unwrap_or(1).max(1) as usize;
  // Both predictor families look back one pixel's worth of bytes.
  let lag = (colors * bits).div_ceil(8);
  let row_bytes = (columns * colors * bits).div_ceil(8);

  match predictor {
    2 if data.len().is_multiple_of(row_bytes) => {
      let mut data = data;
      undo_horizontal_differencing(&mut data, lag, row_bytes);
      Ok(data)
    }
    10..=15 if data.len().is_multiple_of(row_bytes + 1) => {
      undo_png_prediction(&data, lag, row_bytes)
    }
    _ => {
      log::warn!(
        "predictor {predictor} does not fit {} bytes at {row_bytes} per row; data left as-is",
        data.len()
      );
      Ok(data)
    }
  }
}

/// Undo PNG row filters. Every source row leads with a tag byte naming the
/// filter; each output byte is reconstructed from its left, upper, and
/// upper-left neighbors, all of which read as zero beyond the image border.
fn undo_png_prediction(data: &[u8], lag: usize, row_bytes: usize) -> Result<Vec<u8>> {
  let rows = data.len() / (row_bytes + 1);
  let mut out = vec![0u8; rows * row_bytes];
  let mut done = 0usize;

  for tagged in data.chunks_exact(row_bytes + 1) {
    let (tag, filtered) = (tagged[0], &tagged[1..]);
    let (written, rest) = out.split_at_mut(done);
    let prev = &written[done.saturating_sub(row_bytes)..];
    let row = &mut rest[..row_bytes];

    for i in 0..row_bytes {
      let left = if i >= lag { row[i - lag] } else { 0 };
      let up = prev.get(i).copied().unwrap_or(0);
      let diag = if i >= lag {
        prev.get(i - lag).copied().unwrap_or(0)
      } else {
        0
      };
      let predicted = match tag {
        0 => 0,
        1 => left,
        2 => up,
        3 => ((left as u16 + up as u16) / 2) as u8,
        4 => paeth(left, up, diag),
        other => {
          return Err(Error::Decode(format!("unknown PNG row filter {other}")));
        }
      };
      row[i] = filtered[i].wrapping_add(predicted);
    }
    done += row_bytes;
  }
  Ok(out)
}

/// Paeth picks whichever neighbor lies closest to the gradient estimate
/// `left + up - diag`, preferring left, then up.
fn paeth(left: u8, up: u8, diag: u8) -> u8 {
  let estimate = left as i32 + up as i32 - diag as i32;
  let to_left = (estimate - left as i32).abs();
  let to_up = (estimate - up as i32).abs();
  let to_diag = (estimate - diag as i32).abs();
  if to_left <= to_up && to_left <= to_diag {
    left
  } else if to_up <= to_diag {
    up
  } else {
    diag
  }
}

/// Undo TIFF horizontal differencing: past the first pixel, every byte in a
/// row is stored as a delta against the byte one pixel back.
fn undo_horizontal_differencing(data: &mut [u8], lag: usize, row_bytes: usize) {
  for row in data.chunks_exact_mut(row_bytes) {
    for i in lag..row.len() {
      row[i] = row[i].wrapping_add(row[i - lag]);
    }
  }
}

// ── CCITT rewrap ────────────────────────────────────────────────

const CCITT_TIFF_TAGS: u16 = 10;

/// Synthesize a minimal little-endian TIFF around a still-compressed CCITT
/// payload. One strip, ten tags, Group 3 when K ≥ 0 and Group 4 otherwise.
/// The header is padded to the declared strip offset so the offset value
/// and the actual payload position always agree.
fn wrap_ccitt_in_tiff(parms: Option<&Dictionary>, dict: &Dictionary, payload: &[u8]) -> Vec<u8> {
  let k = parms.and_then(|p| dict_int(p, b"K")).unwrap_or(0);
  let columns = parms
    .and_then(|p| dict_int(p, b"Columns"))
    .unwrap_or(1728)
    .max(0) as u32;
  let rows = parms
    .and_then(|p| dict_int(p, b"Rows"))
    .or_else(|| dict_int(dict, b"Height"))
    .unwrap_or(0)
    .max(0) as u32;
  let black_is1 = parms.and_then(|p| dict_bool(p, b"BlackIs1")).unwrap_or(false);
  let byte_align = parms
    .and_then(|p| dict_bool(p, b"EncodedByteAlign"))
    .unwrap_or(false);

  let compression: u32 = if k >= 0 { 3 } else { 4 };
  let options_tag: u16 = if k >= 0 { 292 } else { 293 };
  let mut options = 0u32;
  if k > 0 {
    options |= 0x01;
  }
  if byte_align {
    options |= 0x04;
  }

  let strip_offset = 12 + 12 * CCITT_TIFF_TAGS as u32;

  let mut out = Vec::with_capacity(strip_offset as usize + payload.len());
  out.extend_from_slice(b"II");
  out.extend_from_slice(&42u16.to_le_bytes());
  out.extend_from_slice(&8u32.to_le_bytes()); // first IFD offset
  out.extend_from_slice(&CCITT_TIFF_TAGS.to_le_bytes());

  let mut tag = |out: &mut Vec<u8>, id: u16, value: u32| {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes()); // LONG
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
  };

  tag(&mut out, 256, columns); // ImageWidth
  tag(&mut out, 257, rows); // ImageLength
  tag(&mut out, 258, 1); // BitsPerSample
  tag(&mut out, 259, compression); // Compression
  tag(&mut out, 262, u32::from(black_is1)); // PhotometricInterpretation
  tag(&mut out, 273, strip_offset); // StripOffsets
  tag(&mut out, 277, 1); // SamplesPerPixel
  tag(&mut out, 278, rows); // RowsPerStrip
  tag(&mut out, 279, payload.len() as u32); // StripByteCounts
  tag(&mut out, options_tag, options); // T4Options / T6Options

  out.resize(strip_offset as usize, 0);
  out.extend_from_slice(payload);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use lopdf::dictionary;
  use std::io::Write;

  fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder =
      flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
  }

  fn tag_value(tiff: &[u8], id: u16) -> Option<u32> {
    let count = u16::from_le_bytes([tiff[8], tiff[9]]) as usize;
    (0..count)
      .map(|i| 10 + 12 * i)
      .find(|&off| u16::from_le_bytes([tiff[off], tiff[off + 1]]) == id)
      .map(|off| {
        u32::from_le_bytes([tiff[off + 8], tiff[off + 9], tiff[off + 10], tiff[off + 11]])
      })
  }

  #[test]
  fn flate_round_trips_raw_samples() {
    let doc = lopdf::Document::with_version("1.5");
    let raw = b"some raw sample bytes with repetition repetition".to_vec();
    let dict = dictionary! { "Filter" => "FlateDecode" };
    let outcome = run_filter_chain(&doc, &dict, deflate(&raw)).unwrap();
    assert_eq!(outcome.data, raw);
    assert_eq!(outcome.native, NativeFilter::None);
  }

  #[test]
  fn flate_accepts_headerless_deflate() {
    let mut encoder =
      flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"abc").unwrap();
    let compressed = encoder.finish().unwrap();
    assert_eq!(inflate(&compressed).unwrap(), b"abc");
  }

  #[test]
  fn lzw_round_trips_with_early_change() {
    let raw = b"aaaabbbbccccddddaaaabbbb";
    let mut encoder =
      weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    let compressed = encoder.encode(raw).unwrap();
    assert_eq!(decode_lzw(&compressed, true).unwrap(), raw);
  }

  #[test]
  fn ascii85_full_group() {
    assert_eq!(decode_ascii85(b"!!!!#~>").unwrap(), vec![0, 0, 0, 2]);
  }

  #[test]
  fn ascii85_z_shorthand_and_whitespace() {
    assert_eq!(
      decode_ascii85(b"z \n !!!!#~>").unwrap(),
      vec![0, 0, 0, 0, 0, 0, 0, 2]
    );
  }

  #[test]
  fn ascii85_partial_group() {
    assert_eq!(decode_ascii85(b"5l~>").unwrap(), b"A".to_vec());
  }

  #[test]
  fn ascii85_lone_trailing_digit_fails() {
    assert!(decode_ascii85(b"!!!!#!~>").is_err());
  }

  #[test]
  fn ascii_hex_pairs_and_terminator() {
    assert_eq!(decode_ascii_hex(b"48 65 6C>").unwrap(), b"Hel".to_vec());
  }

  #[test]
  fn ascii_hex_odd_digit_pads_zero() {
    assert_eq!(decode_ascii_hex(b"4>").unwrap(), vec![0x40]);
  }

  #[test]
  fn run_length_literals_and_runs() {
    let data = [2u8, b'a', b'b', b'c', 255, b'z', 128];
    assert_eq!(decode_run_length(&data).unwrap(), b"abczz".to_vec());
  }

  #[test]
  fn png_predictor_sub_and_up_rows() {
    let parms = dictionary! {
      "Predictor" => 15,
      "Colors" => 1,
      "BitsPerComponent" => 8,
      "Columns" => 4,
    };
    let filtered = vec![
      1, 1, 1, 1, 1, // Sub row
      2, 1, 1, 1, 1, // Up row
    ];
    assert_eq!(
      apply_predictor(filtered, Some(&parms)).unwrap(),
      vec![1, 2, 3, 4, 2, 3, 4, 5]
    );
  }

  #[test]
  fn png_predictor_average_row() {
    // Average of a zero previous row halves only the left neighbor.
    assert_eq!(
      undo_png_prediction(&[3, 10, 10], 1, 2).unwrap(),
      vec![10, 15]
    );
  }

  #[test]
  fn png_predictor_paeth_rows() {
    let data = [4, 5, 1, 4, 1, 2];
    assert_eq!(undo_png_prediction(&data, 1, 2).unwrap(), vec![5, 6, 6, 8]);
  }

  #[test]
  fn png_predictor_unknown_row_tag_fails() {
    assert!(undo_png_prediction(&[9, 0], 1, 1).is_err());
  }

  #[test]
  fn png_predictor_geometry_mismatch_passes_through() {
    let parms = dictionary! {
      "Predictor" => 15,
      "Colors" => 1,
      "BitsPerComponent" => 8,
      "Columns" => 4,
    };
    // 7 bytes cannot be tagged 4-byte rows.
    assert_eq!(
      apply_predictor(vec![0; 7], Some(&parms)).unwrap(),
      vec![0; 7]
    );
  }

  #[test]
  fn tiff_predictor_reverses_differencing() {
    let parms = dictionary! {
      "Predictor" => 2,
      "Colors" => 1,
      "BitsPerComponent" => 8,
      "Columns" => 4,
    };
    assert_eq!(
      apply_predictor(vec![10, 1, 1, 1], Some(&parms)).unwrap(),
      vec![10, 11, 12, 13]
    );
  }

  #[test]
  fn tiff_predictor_lag_spans_whole_pixels() {
    // Three channels: each byte deltas against the same channel one pixel
    // back.
    let mut data = vec![10, 20, 30, 1, 2, 3];
    undo_horizontal_differencing(&mut data, 3, 6);
    assert_eq!(data, vec![10, 20, 30, 11, 22, 33]);
  }

  #[test]
  fn chained_hex_then_flate() {
    let doc = lopdf::Document::with_version("1.5");
    let raw = b"pixels".to_vec();
    let mut hex = Vec::new();
    for byte in deflate(&raw) {
      hex.extend_from_slice(format!("{byte:02x}").as_bytes());
    }
    hex.push(b'>');
    let dict = dictionary! {
      "Filter" => vec!["ASCIIHexDecode".into(), "FlateDecode".into()],
    };
    let outcome = run_filter_chain(&doc, &dict, hex).unwrap();
    assert_eq!(outcome.data, raw);
  }

  #[test]
  fn abbreviated_filter_names_expand() {
    let doc = lopdf::Document::with_version("1.5");
    let dict = dictionary! { "Filter" => "Fl" };
    let raw = b"inline payload".to_vec();
    let outcome = run_filter_chain(&doc, &dict, deflate(&raw)).unwrap();
    assert_eq!(outcome.data, raw);
  }

  #[test]
  fn native_container_passes_through_as_final_filter() {
    let doc = lopdf::Document::with_version("1.5");
    let dict = dictionary! { "Filter" => "DCTDecode" };
    let payload = vec![0xFF, 0xD8, 0xFF];
    let outcome = run_filter_chain(&doc, &dict, payload.clone()).unwrap();
    assert_eq!(outcome.native, NativeFilter::Dct);
    assert_eq!(outcome.data, payload);
  }

  #[test]
  fn native_container_before_end_is_rejected() {
    let doc = lopdf::Document::with_version("1.5");
    let dict = dictionary! {
      "Filter" => vec!["DCTDecode".into(), "FlateDecode".into()],
    };
    assert!(matches!(
      run_filter_chain(&doc, &dict, Vec::new()),
      Err(Error::UnsupportedFilter(_))
    ));
  }

  #[test]
  fn unknown_filter_is_rejected() {
    let doc = lopdf::Document::with_version("1.5");
    let dict = dictionary! { "Filter" => "JBIG2Decode" };
    assert!(matches!(
      run_filter_chain(&doc, &dict, Vec::new()),
      Err(Error::UnsupportedFilter(_))
    ));
  }

  #[test]
  fn no_filter_passes_data_through() {
    let doc = lopdf::Document::with_version("1.5");
    let dict = dictionary! {};
    let outcome = run_filter_chain(&doc, &dict, vec![1, 2, 3]).unwrap();
    assert_eq!(outcome.data, vec![1, 2, 3]);
    assert_eq!(outcome.native, NativeFilter::None);
  }

  #[test]
  fn ccitt_wrapper_group4_layout() {
    let doc = lopdf::Document::with_version("1.5");
    let dict = dictionary! {
      "Filter" => "CCITTFaxDecode",
      "Height" => 64,
      "DecodeParms" => dictionary! { "K" => -1, "Columns" => 1728 },
    };
    let payload = vec![0x26, 0x45, 0x99];
    let outcome = run_filter_chain(&doc, &dict, payload.clone()).unwrap();
    assert_eq!(outcome.native, NativeFilter::CcittFax);

    let tiff = &outcome.data;
    assert_eq!(&tiff[..2], b"II");
    assert_eq!(tag_value(tiff, 259), Some(4)); // Group 4
    assert_eq!(tag_value(tiff, 256), Some(1728));
    assert_eq!(tag_value(tiff, 257), Some(64)); // Rows from Height fallback
    assert_eq!(tag_value(tiff, 273), Some(132));
    assert_eq!(tag_value(tiff, 279), Some(3));
    assert_eq!(tag_value(tiff, 293), Some(0)); // T6 options present
    assert_eq!(&tiff[132..], payload.as_slice());
  }

  #[test]
  fn ccitt_wrapper_group3_options() {
    let parms = dictionary! {
      "K" => 1,
      "EncodedByteAlign" => true,
      "Rows" => 8,
      "Columns" => 16,
    };
    let dict = dictionary! {};
    let tiff = wrap_ccitt_in_tiff(Some(&parms), &dict, &[0xAA]);
    assert_eq!(tag_value(&tiff, 259), Some(3)); // Group 3
    assert_eq!(tag_value(&tiff, 292), Some(0x05)); // K>0 | byte-aligned
    assert_eq!(tag_value(&tiff, 257), Some(8));
    assert_eq!(tiff.len(), 132 + 1);
  }
}
