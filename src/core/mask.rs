//! The three alpha sources an image can carry: a grayscale soft mask, a
//! one-bit stencil, and a color-key range match against the raw samples.

use crate::core::colorspace::ResolvedSpace;
use crate::error::{Error, Result};
use crate::types::DecodedImage;

/// Alpha source attached to an image while it decodes. Soft and stencil
/// masks are themselves decoded images, produced by recursing the decoder
/// on the mask stream before the base image is built.
pub(crate) enum Mask {
  Soft {
    image: DecodedImage,
    pixel_by_pixel: bool,
  },
  Stencil {
    image: DecodedImage,
    pixel_by_pixel: bool,
  },
  /// Per-component `(lo, hi)` ranges over the raw source samples. A pixel
  /// whose every component falls inside its range becomes transparent.
  ColorKey { ranges: Vec<(u32, u32)> },
}

impl Mask {
  /// Build a color-key mask from the /Mask array. Only palette-indexed
  /// sources carry the raw samples the range match needs.
  pub(crate) fn color_key(ranges: &[f64], space: &ResolvedSpace) -> Result<Mask> {
    if !space.indexed {
      return Err(Error::UnsupportedMaskColorSpace(space.describe()));
    }
    if ranges.is_empty() || !ranges.len().is_multiple_of(2) {
      return Err(Error::Decode("odd color-key range count".into()));
    }
    let ranges = ranges
      .chunks_exact(2)
      .map(|pair| (pair[0].max(0.0) as u32, pair[1].max(0.0) as u32))
      .collect();
    Ok(Mask::ColorKey { ranges })
  }

  /// Whether alpha must be fetched while pixels are written rather than in
  /// one pass at finalize.
  pub(crate) fn reads_pixel_by_pixel(&self) -> bool {
    match self {
      Mask::Soft { pixel_by_pixel, .. } | Mask::Stencil { pixel_by_pixel, .. } => *pixel_by_pixel,
      Mask::ColorKey { .. } => true,
    }
  }

  pub(crate) fn can_emit_blob(&self) -> bool {
    match self {
      Mask::Soft { pixel_by_pixel, .. } | Mask::Stencil { pixel_by_pixel, .. } => !pixel_by_pixel,
      Mask::ColorKey { .. } => false,
    }
  }

  /// The full alpha plane of an image-backed mask, with its dimensions.
  pub(crate) fn emit_blob(&self) -> Option<(Vec<u8>, u32, u32)> {
    match self {
      Mask::Soft { image, .. } => {
        let comps = image.components() as usize;
        let plane = image.pixels.iter().step_by(comps).copied().collect();
        Some((plane, image.width, image.height))
      }
      Mask::Stencil { image, .. } => {
        let comps = image.components() as usize;
        let plane = image
          .pixels
          .iter()
          .step_by(comps)
          .map(|&s| if s == 0 { 255 } else { 0 })
          .collect();
        Some((plane, image.width, image.height))
      }
      Mask::ColorKey { .. } => None,
    }
  }

  /// Alpha for the pixel at `(x, y)`. `current` carries the raw source
  /// components of the pixel being written, sparing a random-access read
  /// for color-key masks during a sequential pass.
  pub(crate) fn alpha_at(&self, x: u32, y: u32, current: Option<&[u8]>) -> u8 {
    match self {
      Mask::Soft { image, .. } => sample_first_component(image, x, y).unwrap_or(255),
      Mask::Stencil { image, .. } => match sample_first_component(image, x, y) {
        Some(0) => 255,
        Some(_) => 0,
        None => 255,
      },
      Mask::ColorKey { ranges } => {
        let Some(raw) = current else {
          return 255;
        };
        let keyed = ranges
          .iter()
          .zip(raw.iter())
          .all(|(&(lo, hi), &component)| lo <= component as u32 && component as u32 <= hi);
        if keyed && ranges.len() == raw.len() { 0 } else { 255 }
      }
    }
  }
}

fn sample_first_component(image: &DecodedImage, x: u32, y: u32) -> Option<u8> {
  if x >= image.width || y >= image.height {
    return None;
  }
  let comps = image.components() as usize;
  image
    .pixels
    .get((y as usize * image.width as usize + x as usize) * comps)
    .copied()
}
