//! Color-space resolution: collapse a PDF color-space chain down to a
//! terminal device space, keeping the palette and ICC payload alive for
//! the per-pixel stage.

use crate::core::document::{dict_int, number, resolve};
use crate::error::{Error, Result};
use crate::types::DeviceSpace;
use lopdf::{Document, Object};

/// Indexed-to-base nesting deeper than this is treated as unresolvable.
const MAX_NESTING: usize = 8;

/// Index → raw component bytes in the base space.
#[derive(Debug, Clone)]
pub(crate) struct Palette {
  pub components: u8,
  pub data: Vec<u8>,
}

impl Palette {
  pub(crate) fn color(&self, index: usize) -> Option<&[u8]> {
    let start = index * self.components as usize;
    self.data.get(start..start + self.components as usize)
  }

  pub(crate) fn len(&self) -> usize {
    self.data.len() / self.components as usize
  }
}

/// Outcome of reducing a color-space chain: the terminal device space, the
/// outermost Indexed palette if one wrapped it, and the ICC payload if an
/// ICCBased layer was crossed.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSpace {
  pub base: DeviceSpace,
  pub indexed: bool,
  pub palette: Option<Palette>,
  pub icc_profile: Option<Vec<u8>>,
}

impl ResolvedSpace {
  pub(crate) fn device(base: DeviceSpace) -> Self {
    ResolvedSpace {
      base,
      indexed: false,
      palette: None,
      icc_profile: None,
    }
  }

  /// Components carried per sample in the packed payload: one palette
  /// index for Indexed, otherwise the base component count.
  pub(crate) fn sample_components(&self) -> u8 {
    if self.indexed { 1 } else { self.base.components() }
  }

  pub(crate) fn describe(&self) -> String {
    if self.indexed {
      format!("Indexed({})", self.base.name())
    } else {
      self.base.name().to_string()
    }
  }
}

pub(crate) fn resolve_color_space(doc: &Document, obj: &Object) -> Result<ResolvedSpace> {
  reduce(doc, obj, 0)
}

fn reduce(doc: &Document, obj: &Object, depth: usize) -> Result<ResolvedSpace> {
  if depth > MAX_NESTING {
    return Err(Error::UnsupportedColorSpace(
      "color space nesting too deep".into(),
    ));
  }

  match resolve(doc, obj) {
    Object::Name(name) => device_from_name(name)
      .map(ResolvedSpace::device)
      .ok_or_else(|| Error::UnsupportedColorSpace(String::from_utf8_lossy(name).into_owned())),
    Object::Array(arr) => reduce_array(doc, arr, depth),
    other => Err(Error::UnsupportedColorSpace(format!(
      "unexpected color space object: {other:?}"
    ))),
  }
}

fn reduce_array(doc: &Document, arr: &[Object], depth: usize) -> Result<ResolvedSpace> {
  let family = match arr.first() {
    Some(Object::Name(n)) => n.as_slice(),
    _ => return Err(Error::UnsupportedColorSpace("empty color space array".into())),
  };

  match family {
    b"Indexed" | b"I" => reduce_indexed(doc, arr, depth),
    b"ICCBased" => reduce_icc_based(doc, arr, depth),
    b"CalRGB" => Ok(ResolvedSpace::device(DeviceSpace::Rgb)),
    b"CalGray" => Ok(ResolvedSpace::device(DeviceSpace::Gray)),
    other => Err(Error::UnsupportedColorSpace(
      String::from_utf8_lossy(other).into_owned(),
    )),
  }
}

fn reduce_indexed(doc: &Document, arr: &[Object], depth: usize) -> Result<ResolvedSpace> {
  if arr.len() < 4 {
    return Err(Error::UnsupportedColorSpace("short Indexed array".into()));
  }
  let base = reduce(doc, &arr[1], depth + 1)?;
  if base.indexed {
    // An Indexed base of another Indexed space has no defined lookup.
    return Err(Error::UnsupportedColorSpace("Indexed base is Indexed".into()));
  }

  let hival = number(resolve(doc, &arr[2])).unwrap_or(0.0).max(0.0) as usize;
  let mut data = lookup_bytes(doc, &arr[3])?;
  let entry_len = base.base.components() as usize;
  data.truncate((hival + 1) * entry_len);

  Ok(ResolvedSpace {
    base: base.base,
    indexed: true,
    palette: Some(Palette {
      components: base.base.components(),
      data,
    }),
    icc_profile: base.icc_profile,
  })
}

fn reduce_icc_based(doc: &Document, arr: &[Object], depth: usize) -> Result<ResolvedSpace> {
  let stream = match arr.get(1).map(|o| resolve(doc, o)) {
    Some(Object::Stream(s)) => s,
    _ => {
      return Err(Error::UnsupportedColorSpace(
        "ICCBased without profile stream".into(),
      ));
    }
  };

  let profile = {
    let mut s = stream.clone();
    let _ = s.decompress();
    s.content
  };

  if let Ok(alternate) = stream.dict.get(b"Alternate") {
    let mut resolved = reduce(doc, alternate, depth + 1)?;
    resolved.icc_profile = Some(profile);
    return Ok(resolved);
  }

  // No alternate named: infer the device space from the component count.
  let base = match dict_int(&stream.dict, b"N").unwrap_or(3) {
    1 => DeviceSpace::Gray,
    3 => DeviceSpace::Rgb,
    4 => DeviceSpace::Cmyk,
    n => {
      return Err(Error::UnsupportedColorSpace(format!(
        "ICCBased with {n} components"
      )));
    }
  };
  let mut resolved = ResolvedSpace::device(base);
  resolved.icc_profile = Some(profile);
  Ok(resolved)
}

fn lookup_bytes(doc: &Document, obj: &Object) -> Result<Vec<u8>> {
  match resolve(doc, obj) {
    Object::String(bytes, _) => Ok(bytes.clone()),
    Object::Stream(s) => {
      let mut s = s.clone();
      let _ = s.decompress();
      Ok(s.content)
    }
    other => Err(Error::UnsupportedColorSpace(format!(
      "unexpected Indexed lookup object: {other:?}"
    ))),
  }
}

fn device_from_name(name: &[u8]) -> Option<DeviceSpace> {
  match name {
    b"DeviceGray" | b"G" | b"CalGray" => Some(DeviceSpace::Gray),
    b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(DeviceSpace::Rgb),
    b"DeviceCMYK" | b"CMYK" => Some(DeviceSpace::Cmyk),
    _ => None,
  }
}
