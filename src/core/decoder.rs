//! Per-image orchestration: read the stream dictionary, resolve color
//! space and masks, run the filter chain, then drive the chosen builder
//! through the samples or the native container.

use crate::core::builder::{BuilderConfig, ImageBuilder, new_builder};
use crate::core::colorspace::{ResolvedSpace, resolve_color_space};
use crate::core::document::{dict_bool, dict_int, dict_number_array, resolve};
use crate::core::filters::{NativeFilter, run_filter_chain};
use crate::core::mask::Mask;
use crate::core::unpack::{BitUnpacker, build_decode_entries, is_default_decode, is_pure_negation};
use crate::error::{Error, Result};
use crate::types::{
  DecodedImage, DeviceSpace, ImageRecord, ImageSource, Placement, Point, Renderer,
};
use lopdf::{Dictionary, Document, Object};

/// Masks are themselves images and recurse through the decoder; chains
/// deeper than this are treated as malformed.
const MAX_MASK_DEPTH: usize = 4;

/// Decode one discovered image to pixels, carrying its placement through.
pub(crate) fn decode_record(
  doc: &Document,
  record: &ImageRecord,
  renderer: Renderer,
) -> Result<DecodedImage> {
  let (dict, data) = match &record.source {
    ImageSource::External(id) => match doc.get_object(*id)? {
      Object::Stream(s) => (s.dict.clone(), s.content.clone()),
      _ => return Err(Error::Decode("image reference is not a stream".into())),
    },
    ImageSource::Inline { dict, data } => (dict.clone(), data.clone()),
  };
  let mut image = decode_to_image(doc, &dict, data, renderer, 0)?;
  image.placement = record.placement.clone();
  Ok(image)
}

/// Decode a bare stream (dictionary + payload). Used for the top-level
/// image and, recursively, for its soft and stencil masks.
pub(crate) fn decode_to_image(
  doc: &Document,
  dict: &Dictionary,
  data: Vec<u8>,
  renderer: Renderer,
  depth: usize,
) -> Result<DecodedImage> {
  if depth > MAX_MASK_DEPTH {
    return Err(Error::Decode("mask chain too deep".into()));
  }

  let width = dict_int(dict, b"Width")
    .ok_or_else(|| Error::Decode("image dictionary missing Width".into()))?
    .max(0) as u32;
  let height = dict_int(dict, b"Height")
    .ok_or_else(|| Error::Decode("image dictionary missing Height".into()))?
    .max(0) as u32;
  if width == 0 || height == 0 {
    return Err(Error::Decode("image has zero extent".into()));
  }
  let bits_raw = dict_int(dict, b"BitsPerComponent").unwrap_or(1);
  let is_stencil = dict_bool(dict, b"ImageMask").unwrap_or(false);

  // Stencils have no color space of their own; their one-bit samples are
  // treated as gray coverage.
  let space = if is_stencil {
    ResolvedSpace::device(DeviceSpace::Gray)
  } else {
    match dict.get(b"ColorSpace") {
      Ok(cs) => resolve_color_space(doc, cs)?,
      Err(_) => ResolvedSpace::device(DeviceSpace::Gray),
    }
  };

  if !matches!(bits_raw, 1 | 2 | 4 | 8) {
    return Err(Error::UnsupportedBitDepth(bits_raw.clamp(0, u16::MAX as i64) as u16));
  }
  let bits = bits_raw as u8;

  let mask = resolve_mask(doc, dict, &space, renderer, depth)?;

  // Decode array: nothing to do when absent or equal to the default; a
  // pure negation folds into a flag; anything else becomes a remap table.
  let mut negated = false;
  let mut entries = None;
  if let Some(pairs) = dict_number_array(doc, dict, b"Decode")
    && !is_default_decode(&pairs, space.indexed, bits, space.base.components())
  {
    if !space.indexed && is_pure_negation(&pairs, space.base.components()) {
      negated = true;
    } else {
      entries = Some(build_decode_entries(&pairs, bits));
    }
  }

  let outcome = run_filter_chain(doc, dict, data)?;

  if outcome.native != NativeFilter::None && entries.is_some() {
    // Per-sample remapping cannot reach inside a native container.
    return Err(Error::UnsupportedDecodeArray);
  }

  let icc_profile = space.icc_profile.clone();
  let sample_components = space.sample_components() as usize;
  let space_label = space.describe();

  let mut builder = new_builder(
    renderer,
    BuilderConfig {
      width,
      height,
      space,
      bits,
      entries,
      negated,
      mask,
    },
  );

  if outcome.native != NativeFilter::None {
    if !builder.can_read(outcome.native) {
      return Err(Error::UnsupportedByRenderer {
        renderer: builder.renderer(),
        filter: outcome.native.name().to_string(),
        space: space_label,
      });
    }
    builder.read_blob(outcome.native, &outcome.data)?;
  } else {
    write_samples(
      builder.as_mut(),
      &outcome.data,
      width,
      height,
      bits,
      sample_components,
    )?;
  }

  builder.finalize()?;
  let parts = builder.take_parts();

  Ok(DecodedImage {
    width,
    height,
    space: parts.space,
    pixels: parts.pixels,
    alpha: parts.alpha,
    icc_profile,
    placement: intrinsic_placement(width, height),
  })
}

/// Feed decoded sample bytes through the builder, one pixel at a time.
/// Rows of sub-byte samples are padded to the next byte boundary.
fn write_samples(
  builder: &mut dyn ImageBuilder,
  data: &[u8],
  width: u32,
  height: u32,
  bits: u8,
  components: usize,
) -> Result<()> {
  let row_bytes = (width as usize * components * bits as usize).div_ceil(8);
  let expected = row_bytes * height as usize;
  if data.len() < expected {
    return Err(Error::TruncatedImage {
      expected,
      actual: data.len(),
    });
  }

  if bits == 8 {
    for pixel in data[..expected].chunks_exact(components) {
      builder.write_pixel(pixel)?;
    }
    return Ok(());
  }

  for row in 0..height as usize {
    let row_data = &data[row * row_bytes..(row + 1) * row_bytes];
    let mut unpacker = BitUnpacker::new(row_data);
    for _ in 0..width {
      let mut raw = [0u8; 4];
      for slot in raw.iter_mut().take(components) {
        *slot = unpacker.read(bits).ok_or(Error::TruncatedImage {
          expected,
          actual: data.len(),
        })?;
      }
      builder.write_pixel(&raw[..components])?;
    }
  }
  Ok(())
}

/// SMask wins over /Mask; /Mask is a stencil stream or a color-key array.
fn resolve_mask(
  doc: &Document,
  dict: &Dictionary,
  space: &ResolvedSpace,
  renderer: Renderer,
  depth: usize,
) -> Result<Option<Mask>> {
  let pixel_by_pixel = renderer == Renderer::Basic;

  if let Ok(smask_obj) = dict.get(b"SMask")
    && let Object::Stream(s) = resolve(doc, smask_obj)
  {
    let image = decode_to_image(doc, &s.dict.clone(), s.content.clone(), renderer, depth + 1)?;
    return Ok(Some(Mask::Soft {
      image,
      pixel_by_pixel,
    }));
  }

  if let Ok(mask_obj) = dict.get(b"Mask") {
    match resolve(doc, mask_obj) {
      Object::Stream(s) => {
        let image = decode_to_image(doc, &s.dict.clone(), s.content.clone(), renderer, depth + 1)?;
        return Ok(Some(Mask::Stencil {
          image,
          pixel_by_pixel,
        }));
      }
      Object::Array(arr) => {
        let ranges: Option<Vec<f64>> = arr
          .iter()
          .map(|o| crate::core::document::number(resolve(doc, o)))
          .collect();
        if let Some(ranges) = ranges {
          return Mask::color_key(&ranges, space).map(Some);
        }
      }
      _ => {}
    }
  }

  Ok(None)
}

/// Placement of an image that was never painted (mask recursion): the unit
/// square under the identity matrix.
fn intrinsic_placement(width: u32, height: u32) -> Placement {
  Placement {
    lower_left: Point { x: 0.0, y: 0.0 },
    upper_left: Point { x: 0.0, y: 1.0 },
    upper_right: Point { x: 1.0, y: 1.0 },
    lower_right: Point { x: 1.0, y: 0.0 },
    user_width: 1.0,
    user_height: 1.0,
    pixel_width: width,
    pixel_height: height,
    resolution_x: width as f64 * 72.0,
    resolution_y: height as f64 * 72.0,
  }
}
