//! The raster side of the pipeline: two builder implementations over one
//! shared pixel core. The basic builder bakes mask alpha into every pixel
//! as it is written; the full builder ignores masks until finalize and
//! composes them in a single pass. They also differ in which native
//! containers they accept.

use crate::core::colorspace::ResolvedSpace;
use crate::core::filters::NativeFilter;
use crate::core::mask::Mask;
use crate::core::unpack::{DecodeEntry, scale_sample};
use crate::error::{Error, Result};
use crate::types::{DeviceSpace, Renderer};
use image::DynamicImage;

pub(crate) struct BuilderConfig {
  pub width: u32,
  pub height: u32,
  pub space: ResolvedSpace,
  pub bits: u8,
  pub entries: Option<Vec<DecodeEntry>>,
  pub negated: bool,
  pub mask: Option<Mask>,
}

/// What is left of a builder once it has finalized.
pub(crate) struct RasterParts {
  pub space: DeviceSpace,
  pub pixels: Vec<u8>,
  pub alpha: Option<Vec<u8>>,
}

pub(crate) trait ImageBuilder {
  fn renderer(&self) -> &'static str;
  fn reads_pixel_by_pixel(&self) -> bool;
  fn can_read(&self, filter: NativeFilter) -> bool;
  fn write_pixel(&mut self, raw: &[u8]) -> Result<()>;
  fn read_blob(&mut self, filter: NativeFilter, data: &[u8]) -> Result<()>;
  fn set_negated(&mut self, negated: bool);
  fn negated(&self) -> bool;
  fn finalize(&mut self) -> Result<()>;
  fn take_parts(&mut self) -> RasterParts;
}

pub(crate) fn new_builder(renderer: Renderer, config: BuilderConfig) -> Box<dyn ImageBuilder> {
  match renderer {
    Renderer::Basic => Box::new(BasicBuilder {
      core: RasterCore::new(config),
    }),
    Renderer::Full => Box::new(FullBuilder {
      core: RasterCore::new(config),
    }),
  }
}

// ── Shared pixel core ───────────────────────────────────────────

struct RasterCore {
  width: u32,
  height: u32,
  /// Space the output buffer is in. Starts at the resolved base and may
  /// change when a native container decodes to something else.
  out_space: DeviceSpace,
  space: ResolvedSpace,
  bits: u8,
  negated: bool,
  /// Per-component remap tables, built once from the decode entries and
  /// dropped at finalize.
  luts: Option<Vec<[u8; 256]>>,
  index_entry: Option<DecodeEntry>,
  mask: Option<Mask>,
  /// Raw palette indices, kept only while a color-key mask needs them for
  /// the batch pass.
  raw_samples: Vec<u8>,
  keep_raw: bool,
  pixels: Vec<u8>,
  alpha: Option<Vec<u8>>,
  cursor: usize,
}

impl RasterCore {
  fn new(config: BuilderConfig) -> Self {
    let (luts, index_entry) = match (&config.entries, config.space.indexed) {
      (Some(entries), true) => (None, entries.first().copied()),
      (Some(entries), false) => (
        Some(entries.iter().map(DecodeEntry::lut).collect()),
        None,
      ),
      (None, _) => (None, None),
    };
    let keep_raw = config.space.indexed && matches!(config.mask, Some(Mask::ColorKey { .. }));
    let capacity =
      config.width as usize * config.height as usize * config.space.base.components() as usize;

    RasterCore {
      width: config.width,
      height: config.height,
      out_space: config.space.base,
      space: config.space,
      bits: config.bits,
      negated: config.negated,
      luts,
      index_entry,
      mask: config.mask,
      raw_samples: Vec::new(),
      keep_raw,
      pixels: Vec::with_capacity(capacity),
      alpha: None,
      cursor: 0,
    }
  }

  fn pixel_count(&self) -> usize {
    self.width as usize * self.height as usize
  }

  fn coords(&self) -> (u32, u32) {
    (
      (self.cursor % self.width as usize) as u32,
      (self.cursor / self.width as usize) as u32,
    )
  }

  /// Raw source components → device-space components, through the palette
  /// or the decode tables.
  fn decode_pixel(&self, raw: &[u8], out: &mut [u8; 4]) -> Result<usize> {
    if self.space.indexed {
      let palette = self
        .space
        .palette
        .as_ref()
        .ok_or_else(|| Error::Decode("indexed image without palette".into()))?;
      let index = match self.index_entry {
        Some(entry) => entry.apply_index(raw[0]),
        None => raw[0] as usize,
      };
      let color = palette
        .color(index)
        .ok_or_else(|| Error::Decode(format!("palette index {index} out of range")))?;
      out[..color.len()].copy_from_slice(color);
      return Ok(color.len());
    }

    let count = self.out_space.components() as usize;
    for i in 0..count {
      let sample = *raw
        .get(i)
        .ok_or_else(|| Error::Decode("short pixel sample".into()))?;
      out[i] = match &self.luts {
        Some(luts) => luts[i][sample as usize],
        None if self.bits == 8 => sample,
        None => scale_sample(sample, self.bits),
      };
    }
    Ok(count)
  }

  fn push(&mut self, components: &[u8], alpha: Option<u8>, raw: &[u8]) -> Result<()> {
    if self.cursor >= self.pixel_count() {
      return Err(Error::Decode("pixel write past image extent".into()));
    }
    self.pixels.extend_from_slice(components);
    if let Some(a) = alpha {
      self
        .alpha
        .get_or_insert_with(|| Vec::with_capacity(self.width as usize * self.height as usize))
        .push(a);
    }
    if self.keep_raw {
      self.raw_samples.push(raw[0]);
    }
    self.cursor += 1;
    Ok(())
  }

  /// Replace the buffer with a natively decoded frame.
  fn set_blob(
    &mut self,
    space: DeviceSpace,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    alpha: Option<Vec<u8>>,
  ) -> Result<()> {
    if (width, height) != (self.width, self.height) {
      return Err(Error::Decode(format!(
        "container decodes to {width}x{height}, dictionary says {}x{}",
        self.width, self.height
      )));
    }
    let expected = self.pixel_count() * space.components() as usize;
    if pixels.len() != expected {
      return Err(Error::TruncatedImage {
        expected,
        actual: pixels.len(),
      });
    }
    self.out_space = space;
    self.pixels = pixels;
    self.alpha = alpha;
    self.cursor = self.pixel_count();
    Ok(())
  }

  fn negate_colors(&mut self) {
    for byte in &mut self.pixels {
      *byte = 255 - *byte;
    }
  }

  /// Alpha plane sampled from an image-backed mask, nearest-neighbor when
  /// the mask dimensions differ.
  fn sample_mask_plane(&self, plane: &[u8], mask_w: u32, mask_h: u32) -> Vec<u8> {
    let mut alpha = Vec::with_capacity(self.pixel_count());
    if mask_w == 0 || mask_h == 0 {
      alpha.resize(self.pixel_count(), 255);
      return alpha;
    }
    for y in 0..self.height {
      let my = (y as u64 * mask_h as u64 / self.height.max(1) as u64).min(mask_h as u64 - 1);
      for x in 0..self.width {
        let mx = (x as u64 * mask_w as u64 / self.width.max(1) as u64).min(mask_w as u64 - 1);
        alpha.push(
          plane
            .get((my * mask_w as u64 + mx) as usize)
            .copied()
            .unwrap_or(255),
        );
      }
    }
    alpha
  }

  fn drop_caches(&mut self) {
    self.luts = None;
    self.index_entry = None;
    self.space.palette = None;
    self.raw_samples = Vec::new();
  }

  fn take_parts(&mut self) -> RasterParts {
    RasterParts {
      space: self.out_space,
      pixels: std::mem::take(&mut self.pixels),
      alpha: self.alpha.take(),
    }
  }
}

// ── Per-pixel-alpha builder ─────────────────────────────────────

pub(crate) struct BasicBuilder {
  core: RasterCore,
}

impl ImageBuilder for BasicBuilder {
  fn renderer(&self) -> &'static str {
    "basic"
  }

  fn reads_pixel_by_pixel(&self) -> bool {
    true
  }

  fn can_read(&self, filter: NativeFilter) -> bool {
    filter == NativeFilter::Dct
      && !self.core.space.indexed
      && self.core.space.base != DeviceSpace::Cmyk
  }

  fn write_pixel(&mut self, raw: &[u8]) -> Result<()> {
    let mut components = [0u8; 4];
    let count = self.core.decode_pixel(raw, &mut components)?;
    let alpha = self.core.mask.as_ref().map(|mask| {
      let (x, y) = self.core.coords();
      mask.alpha_at(x, y, Some(raw))
    });
    self.core.push(&components[..count], alpha, raw)
  }

  fn read_blob(&mut self, filter: NativeFilter, data: &[u8]) -> Result<()> {
    if filter != NativeFilter::Dct {
      return Err(Error::Decode(format!(
        "basic renderer cannot read {}",
        filter.name()
      )));
    }
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
      .map_err(|e| Error::Decode(format!("DCT: {e}")))?;
    let (w, h) = (img.width(), img.height());
    let (space, pixels) = match self.core.space.base {
      DeviceSpace::Gray => (DeviceSpace::Gray, img.to_luma8().into_raw()),
      _ => (DeviceSpace::Rgb, img.to_rgb8().into_raw()),
    };
    self.core.set_blob(space, w, h, pixels, None)?;

    // Still per-pixel policy: bake the mask right after the frame lands.
    if let Some(mask) = self.core.mask.as_ref() {
      let mut alpha = Vec::with_capacity(self.core.pixel_count());
      for y in 0..self.core.height {
        for x in 0..self.core.width {
          alpha.push(mask.alpha_at(x, y, None));
        }
      }
      self.core.alpha = Some(alpha);
    }
    Ok(())
  }

  fn set_negated(&mut self, negated: bool) {
    self.core.negated = negated;
  }

  fn negated(&self) -> bool {
    self.core.negated
  }

  fn finalize(&mut self) -> Result<()> {
    if self.core.negated {
      self.core.negate_colors();
    }
    self.core.mask = None;
    self.core.drop_caches();
    Ok(())
  }

  fn take_parts(&mut self) -> RasterParts {
    self.core.take_parts()
  }
}

// ── Batch-alpha builder ─────────────────────────────────────────

pub(crate) struct FullBuilder {
  core: RasterCore,
}

impl ImageBuilder for FullBuilder {
  fn renderer(&self) -> &'static str {
    "full"
  }

  fn reads_pixel_by_pixel(&self) -> bool {
    false
  }

  fn can_read(&self, filter: NativeFilter) -> bool {
    !self.core.space.indexed
      && matches!(
        filter,
        NativeFilter::Dct | NativeFilter::Jpx | NativeFilter::CcittFax
      )
  }

  fn write_pixel(&mut self, raw: &[u8]) -> Result<()> {
    let mut components = [0u8; 4];
    let count = self.core.decode_pixel(raw, &mut components)?;
    self.core.push(&components[..count], None, raw)
  }

  fn read_blob(&mut self, filter: NativeFilter, data: &[u8]) -> Result<()> {
    match filter {
      NativeFilter::Dct => self.read_dct(data),
      NativeFilter::Jpx => self.read_jpx(data),
      NativeFilter::CcittFax => self.read_ccitt(data),
      NativeFilter::None => Err(Error::Decode("no native container to read".into())),
    }
  }

  fn set_negated(&mut self, negated: bool) {
    self.core.negated = negated;
  }

  fn negated(&self) -> bool {
    self.core.negated
  }

  fn finalize(&mut self) -> Result<()> {
    if self.core.negated {
      self.core.negate_colors();
    }

    if let Some(mask) = self.core.mask.take() {
      let alpha = if let Some((plane, mask_w, mask_h)) = mask.emit_blob() {
        self.core.sample_mask_plane(&plane, mask_w, mask_h)
      } else {
        let mut alpha = Vec::with_capacity(self.core.pixel_count());
        for index in 0..self.core.pixel_count() {
          let x = (index % self.core.width as usize) as u32;
          let y = (index / self.core.width as usize) as u32;
          let raw = self.core.raw_samples.get(index..index + 1);
          alpha.push(mask.alpha_at(x, y, raw));
        }
        alpha
      };
      self.core.alpha = Some(alpha);
    }

    self.core.drop_caches();
    Ok(())
  }

  fn take_parts(&mut self) -> RasterParts {
    self.core.take_parts()
  }
}

impl FullBuilder {
  fn read_dct(&mut self, data: &[u8]) -> Result<()> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let pixels = decoder
      .decode()
      .map_err(|e| Error::Decode(format!("DCT: {e}")))?;
    let info = decoder
      .info()
      .ok_or_else(|| Error::Decode("DCT frame without header info".into()))?;
    let (w, h) = (info.width as u32, info.height as u32);

    match info.pixel_format {
      jpeg_decoder::PixelFormat::L8 => self.core.set_blob(DeviceSpace::Gray, w, h, pixels, None),
      jpeg_decoder::PixelFormat::RGB24 => self.core.set_blob(DeviceSpace::Rgb, w, h, pixels, None),
      jpeg_decoder::PixelFormat::CMYK32 => {
        self.core.set_blob(DeviceSpace::Cmyk, w, h, pixels, None)?;
        // Adobe CMYK JPEG stores inverted ink values.
        self.core.negated = !self.core.negated;
        Ok(())
      }
      other => Err(Error::Decode(format!("DCT pixel format {other:?}"))),
    }
  }

  fn read_jpx(&mut self, data: &[u8]) -> Result<()> {
    let jp2 = hayro_jpeg2000::Image::new(data, &hayro_jpeg2000::DecodeSettings::default())
      .map_err(|e| Error::Decode(format!("JPX: {e:?}")))?;
    let img =
      DynamicImage::from_decoder(jp2).map_err(|e| Error::Decode(format!("JPX: {e}")))?;
    let (w, h) = (img.width(), img.height());

    match img {
      DynamicImage::ImageLuma8(buf) => {
        self.core.set_blob(DeviceSpace::Gray, w, h, buf.into_raw(), None)
      }
      img if img.color().has_alpha() => {
        let rgba = img.to_rgba8();
        let mut rgb = Vec::with_capacity(w as usize * h as usize * 3);
        let mut alpha = Vec::with_capacity(w as usize * h as usize);
        for pixel in rgba.pixels() {
          rgb.extend_from_slice(&pixel.0[..3]);
          alpha.push(pixel.0[3]);
        }
        self
          .core
          .set_blob(DeviceSpace::Rgb, w, h, rgb, Some(alpha))
      }
      img => self
        .core
        .set_blob(DeviceSpace::Rgb, w, h, img.to_rgb8().into_raw(), None),
    }
  }

  fn read_ccitt(&mut self, data: &[u8]) -> Result<()> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Tiff)
      .map_err(|e| Error::Decode(format!("CCITT: {e}")))?;
    let (w, h) = (img.width(), img.height());
    self
      .core
      .set_blob(DeviceSpace::Gray, w, h, img.to_luma8().into_raw(), None)
  }
}
