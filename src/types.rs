use image::{DynamicImage, ImageBuffer};
use lopdf::{Dictionary, ObjectId};

// ── Public data model ───────────────────────────────────────────

/// A point in user space (PDF units, 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

/// Where an image lands on the page: the four corners of the unit square
/// pushed through the transformation matrix in effect at the paint operator,
/// plus the extents and effective resolution derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
  pub lower_left: Point,
  pub upper_left: Point,
  pub upper_right: Point,
  pub lower_right: Point,
  pub user_width: f64,
  pub user_height: f64,
  pub pixel_width: u32,
  pub pixel_height: u32,
  /// Pixels per inch along each axis (pixel extent / user extent × 72).
  pub resolution_x: f64,
  pub resolution_y: f64,
}

/// Whether an image lives as an indirect XObject stream or was embedded
/// inline in the content stream. Inline images own their dictionary and
/// payload; external ones are fetched from the document on decode.
#[derive(Debug, Clone)]
pub enum ImageSource {
  External(ObjectId),
  Inline { dict: Dictionary, data: Vec<u8> },
}

/// One image discovered on a page, in content-stream order.
#[derive(Debug, Clone)]
pub struct ImageRecord {
  pub source: ImageSource,
  pub placement: Placement,
  /// True for stencils painted as masks rather than content. Callers
  /// building a gallery usually want to filter these out.
  pub is_mask: bool,
}

impl ImageRecord {
  pub fn is_inline(&self) -> bool {
    matches!(self.source, ImageSource::Inline { .. })
  }
}

/// Terminal device color space of a decoded pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpace {
  Gray,
  Rgb,
  Cmyk,
}

impl DeviceSpace {
  pub fn components(self) -> u8 {
    match self {
      DeviceSpace::Gray => 1,
      DeviceSpace::Rgb => 3,
      DeviceSpace::Cmyk => 4,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      DeviceSpace::Gray => "DeviceGray",
      DeviceSpace::Rgb => "DeviceRGB",
      DeviceSpace::Cmyk => "DeviceCMYK",
    }
  }
}

/// Raster backend selector.
///
/// `Basic` bakes mask alpha into each pixel as it is written and only reads
/// DCT containers with up to three components. `Full` composes masks in one
/// pass at finalize and additionally reads JPX and CCITT containers plus
/// four-component DCT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
  Basic,
  Full,
}

/// Fully decoded pixel data plus the geometry it was painted with.
#[derive(Debug, Clone)]
pub struct DecodedImage {
  pub width: u32,
  pub height: u32,
  pub space: DeviceSpace,
  /// Row-major samples, `space.components()` bytes per pixel.
  pub pixels: Vec<u8>,
  /// Row-major alpha plane, one byte per pixel, when any mask applied.
  pub alpha: Option<Vec<u8>>,
  /// Raw ICC profile payload when the source color space was ICCBased.
  pub icc_profile: Option<Vec<u8>>,
  pub placement: Placement,
}

impl DecodedImage {
  pub fn components(&self) -> u8 {
    self.space.components()
  }

  /// Hand the buffer to the raster engine. CMYK is converted to RGB on the
  /// way out since the engine has no four-component variant.
  pub fn to_dynamic_image(&self) -> Option<DynamicImage> {
    let (w, h) = (self.width, self.height);
    match (self.space, &self.alpha) {
      (DeviceSpace::Gray, None) => {
        ImageBuffer::from_raw(w, h, self.pixels.clone()).map(DynamicImage::ImageLuma8)
      }
      (DeviceSpace::Gray, Some(alpha)) => {
        let mut data = Vec::with_capacity(self.pixels.len() * 2);
        for (&l, &a) in self.pixels.iter().zip(alpha.iter()) {
          data.push(l);
          data.push(a);
        }
        ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLumaA8)
      }
      (DeviceSpace::Rgb, None) => {
        ImageBuffer::from_raw(w, h, self.pixels.clone()).map(DynamicImage::ImageRgb8)
      }
      (DeviceSpace::Rgb, Some(alpha)) => {
        ImageBuffer::from_raw(w, h, interleave_alpha(&self.pixels, alpha))
          .map(DynamicImage::ImageRgba8)
      }
      (DeviceSpace::Cmyk, None) => {
        ImageBuffer::from_raw(w, h, cmyk_to_rgb(&self.pixels)).map(DynamicImage::ImageRgb8)
      }
      (DeviceSpace::Cmyk, Some(alpha)) => {
        let rgb = cmyk_to_rgb(&self.pixels);
        ImageBuffer::from_raw(w, h, interleave_alpha(&rgb, alpha)).map(DynamicImage::ImageRgba8)
      }
    }
  }
}

/// Zip an RGB buffer with an alpha plane into RGBA.
fn interleave_alpha(rgb: &[u8], alpha: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
  for (pixel, &a) in rgb.chunks_exact(3).zip(alpha.iter()) {
    out.extend_from_slice(pixel);
    out.push(a);
  }
  out
}

/// Naive ink-subtraction conversion: each additive channel is what the
/// matching ink and the key together leave uncovered, rounded to the
/// nearest level.
fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
  for pixel in cmyk.chunks_exact(4) {
    let key = pixel[3] as f32 / 255.0;
    for &ink in &pixel[..3] {
      let coverage = ink as f32 / 255.0;
      rgb.push((255.0 * (1.0 - coverage) * (1.0 - key)).round() as u8);
    }
  }
  rgb
}

#[cfg(test)]
pub(crate) fn unit_placement(pixel_width: u32, pixel_height: u32) -> Placement {
  Placement {
    lower_left: Point { x: 0.0, y: 0.0 },
    upper_left: Point { x: 0.0, y: 1.0 },
    upper_right: Point { x: 1.0, y: 1.0 },
    lower_right: Point { x: 1.0, y: 0.0 },
    user_width: 1.0,
    user_height: 1.0,
    pixel_width,
    pixel_height,
    resolution_x: pixel_width as f64 * 72.0,
    resolution_y: pixel_height as f64 * 72.0,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cmyk_black_maps_to_rgb_black() {
    assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
  }

  #[test]
  fn cmyk_white_maps_to_rgb_white() {
    assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
  }

  #[test]
  fn cmyk_pure_cyan() {
    assert_eq!(cmyk_to_rgb(&[255, 0, 0, 0]), vec![0, 255, 255]);
  }

  #[test]
  fn cmyk_rounds_to_nearest_level() {
    // 255·(55/255)² = 11.86 rounds up rather than truncating to 11.
    assert_eq!(cmyk_to_rgb(&[200, 200, 200, 200]), vec![12, 12, 12]);
  }

  #[test]
  fn gray_image_with_alpha_interleaves() {
    let img = DecodedImage {
      width: 1,
      height: 1,
      space: DeviceSpace::Gray,
      pixels: vec![0x80],
      alpha: Some(vec![0x40]),
      icc_profile: None,
      placement: unit_placement(1, 1),
    };
    let dynamic = img.to_dynamic_image().unwrap();
    assert_eq!(dynamic.as_luma_alpha8().unwrap().as_raw().as_slice(), [0x80, 0x40]);
  }

  #[test]
  fn rgba_interleave_order() {
    assert_eq!(
      interleave_alpha(&[1, 2, 3, 4, 5, 6], &[9, 8]),
      vec![1, 2, 3, 9, 4, 5, 6, 8]
    );
  }
}
