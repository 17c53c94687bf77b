//! Content-stream walk: a small interpreter over the operators that affect
//! image placement (`q`, `Q`, `cm`, `Do`, `BI…ID…EI`), tracking the current
//! transformation matrix and emitting one record per painted image.

use crate::core::document::{self, dict_bool, dict_int, number, resolve, resolve_to_dict};
use crate::error::{Error, Result};
use crate::types::{ImageRecord, ImageSource, Placement, Point};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};

/// Form XObjects nested deeper than this are treated as a reference cycle.
const MAX_FORM_DEPTH: usize = 16;

// ── Transformation matrices ─────────────────────────────────────

/// Affine user-space transform `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix {
  pub a: f64,
  pub b: f64,
  pub c: f64,
  pub d: f64,
  pub e: f64,
  pub f: f64,
}

impl Matrix {
  pub(crate) const IDENTITY: Matrix = Matrix {
    a: 1.0,
    b: 0.0,
    c: 0.0,
    d: 1.0,
    e: 0.0,
    f: 0.0,
  };

  fn from_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
      return None;
    }
    Some(Matrix {
      a: number(&operands[0])?,
      b: number(&operands[1])?,
      c: number(&operands[2])?,
      d: number(&operands[3])?,
      e: number(&operands[4])?,
      f: number(&operands[5])?,
    })
  }

  /// `self` applied first, then `rhs`.
  pub(crate) fn multiply(self, rhs: Matrix) -> Matrix {
    Matrix {
      a: self.a * rhs.a + self.b * rhs.c,
      b: self.a * rhs.b + self.b * rhs.d,
      c: self.c * rhs.a + self.d * rhs.c,
      d: self.c * rhs.b + self.d * rhs.d,
      e: self.e * rhs.a + self.f * rhs.c + rhs.e,
      f: self.e * rhs.b + self.f * rhs.d + rhs.f,
    }
  }

  pub(crate) fn apply(&self, x: f64, y: f64) -> Point {
    Point {
      x: self.a * x + self.c * y + self.e,
      y: self.b * x + self.d * y + self.f,
    }
  }
}

/// The current transformation matrix plus its save stack. The stack is
/// never empty; a `Q` with nothing saved is ignored.
pub(crate) struct GraphicsState {
  stack: Vec<Matrix>,
}

impl GraphicsState {
  pub(crate) fn new() -> Self {
    Self::with_matrix(Matrix::IDENTITY)
  }

  pub(crate) fn with_matrix(matrix: Matrix) -> Self {
    GraphicsState {
      stack: vec![matrix],
    }
  }

  pub(crate) fn save(&mut self) {
    self.stack.push(self.current());
  }

  pub(crate) fn restore(&mut self) {
    if self.stack.len() > 1 {
      self.stack.pop();
    }
  }

  pub(crate) fn concat(&mut self, matrix: Matrix) {
    let top = self.stack.last_mut().expect("graphics stack is never empty");
    *top = matrix.multiply(*top);
  }

  pub(crate) fn current(&self) -> Matrix {
    *self.stack.last().expect("graphics stack is never empty")
  }
}

// ── Page walk ───────────────────────────────────────────────────

/// Discover every image painted on a page, in content-stream order, with
/// its effective placement.
pub(crate) fn walk_page(doc: &Document, page_number: u32) -> Result<Vec<ImageRecord>> {
  let page = document::page_id(doc, page_number)?;
  let rotation = document::page_rotation(doc, page);
  let switch_wh = (rotation / 90) % 2 != 0;
  let content = document::page_content(doc, page)?;
  let resources = match document::inherited_resources(doc, page) {
    Some(resources) => resources,
    None => Dictionary::new(),
  };

  let mut walker = Walker {
    doc,
    switch_wh,
    records: Vec::new(),
  };
  let mut gs = GraphicsState::new();
  walker.walk(&content, &resources, &mut gs, 0)?;
  Ok(walker.records)
}

struct Walker<'a> {
  doc: &'a Document,
  switch_wh: bool,
  records: Vec<ImageRecord>,
}

impl Walker<'_> {
  fn walk(
    &mut self,
    content: &[u8],
    resources: &Dictionary,
    gs: &mut GraphicsState,
    depth: usize,
  ) -> Result<()> {
    if depth > MAX_FORM_DEPTH {
      return Err(Error::MalformedContentStream(
        "form XObject nesting too deep".into(),
      ));
    }

    for segment in split_inline_images(content)? {
      match segment {
        Segment::Operators(bytes) => self.walk_operators(bytes, resources, gs, depth)?,
        Segment::InlineImage { dict, data } => {
          let is_mask = dict_bool(&dict, b"ImageMask").unwrap_or(false);
          let placement = self.placement(&dict, gs);
          self.records.push(ImageRecord {
            source: ImageSource::Inline { dict, data },
            placement,
            is_mask,
          });
        }
      }
    }
    Ok(())
  }

  fn walk_operators(
    &mut self,
    bytes: &[u8],
    resources: &Dictionary,
    gs: &mut GraphicsState,
    depth: usize,
  ) -> Result<()> {
    let content =
      Content::decode(bytes).map_err(|e| Error::MalformedContentStream(e.to_string()))?;

    for op in &content.operations {
      match op.operator.as_str() {
        "q" => gs.save(),
        "Q" => gs.restore(),
        "cm" => {
          if let Some(matrix) = Matrix::from_operands(&op.operands) {
            gs.concat(matrix);
          }
        }
        "Do" => self.invoke_xobject(&op.operands, resources, gs, depth)?,
        _ => {}
      }
    }
    Ok(())
  }

  /// `Do`: paint a named XObject. Unresolvable names skip silently — the
  /// rest of the stream is still worth walking.
  fn invoke_xobject(
    &mut self,
    operands: &[Object],
    resources: &Dictionary,
    gs: &mut GraphicsState,
    depth: usize,
  ) -> Result<()> {
    let Some(Object::Name(name)) = operands.first() else {
      return Ok(());
    };
    let Some(xobjects) = resources
      .get(b"XObject")
      .ok()
      .and_then(|o| resolve_to_dict(self.doc, o))
    else {
      log::debug!("Do with no XObject resources");
      return Ok(());
    };
    let Ok(entry) = xobjects.get(name) else {
      log::debug!("unresolved XObject name {}", String::from_utf8_lossy(name));
      return Ok(());
    };
    let Object::Stream(stream) = resolve(self.doc, entry) else {
      return Ok(());
    };

    let subtype = stream.dict.get(b"Subtype").ok().and_then(|v| {
      if let Object::Name(n) = v {
        Some(n.as_slice())
      } else {
        None
      }
    });

    match subtype {
      Some(b"Image") => {
        let is_mask = dict_bool(&stream.dict, b"ImageMask").unwrap_or(false);
        let placement = self.placement(&stream.dict, gs);
        let id = match entry {
          Object::Reference(id) => *id,
          _ => return Ok(()), // images embedded directly in resources are not addressable
        };
        self.records.push(ImageRecord {
          source: ImageSource::External(id),
          placement,
          is_mask,
        });
      }
      Some(b"Form") => {
        // A child state seeded with the current matrix keeps unmatched
        // inner `Q`s from popping the caller's frames, and drops on any
        // exit path.
        let mut child = GraphicsState::with_matrix(gs.current());
        if let Some(matrix) = stream
          .dict
          .get(b"Matrix")
          .ok()
          .and_then(|m| matrix_from_array(self.doc, m))
        {
          child.concat(matrix);
        }

        let form_resources = stream
          .dict
          .get(b"Resources")
          .ok()
          .and_then(|o| resolve_to_dict(self.doc, o))
          .unwrap_or_else(|| resources.clone());

        let mut form = stream.clone();
        let _ = form.decompress();
        self.walk(&form.content, &form_resources, &mut child, depth + 1)?;
      }
      _ => {}
    }
    Ok(())
  }

  /// Transform the unit square through the current matrix.
  fn placement(&self, dict: &Dictionary, gs: &GraphicsState) -> Placement {
    let matrix = gs.current();
    let pixel_width = dict_int(dict, b"Width").unwrap_or(0).max(0) as u32;
    let pixel_height = dict_int(dict, b"Height").unwrap_or(0).max(0) as u32;

    let lower_left = matrix.apply(0.0, 0.0);
    let upper_left = matrix.apply(0.0, 1.0);
    let upper_right = matrix.apply(1.0, 1.0);
    let lower_right = matrix.apply(1.0, 0.0);

    let mut user_width = (upper_right.x - lower_left.x).abs();
    let mut user_height = (upper_right.y - lower_left.y).abs();
    if self.switch_wh {
      std::mem::swap(&mut user_width, &mut user_height);
    }

    Placement {
      lower_left,
      upper_left,
      upper_right,
      lower_right,
      user_width,
      user_height,
      pixel_width,
      pixel_height,
      resolution_x: pixel_width as f64 / user_width * 72.0,
      resolution_y: pixel_height as f64 / user_height * 72.0,
    }
  }
}

fn matrix_from_array(doc: &Document, obj: &Object) -> Option<Matrix> {
  match resolve(doc, obj) {
    Object::Array(arr) => Matrix::from_operands(arr),
    _ => None,
  }
}

// ── Inline images ───────────────────────────────────────────────

enum Segment<'a> {
  Operators(&'a [u8]),
  InlineImage { dict: Dictionary, data: Vec<u8> },
}

fn is_pdf_whitespace(byte: u8) -> bool {
  matches!(byte, 0 | 9 | 10 | 12 | 13 | 32)
}

fn is_delimiter(byte: u8) -> bool {
  matches!(byte, b'/' | b'[' | b']' | b'<' | b'>' | b'(' | b')' | b'{' | b'}' | b'%')
}

/// Split a content stream into plain operator runs and `BI…ID…EI` inline
/// images. lopdf's operator parser never sees the binary payload.
fn split_inline_images(content: &[u8]) -> Result<Vec<Segment<'_>>> {
  let mut segments = Vec::new();
  let mut start = 0usize;
  let mut pos = 0usize;

  while pos + 1 < content.len() {
    let at_token = content[pos] == b'B'
      && content[pos + 1] == b'I'
      && (pos == 0 || is_pdf_whitespace(content[pos - 1]) || is_delimiter(content[pos - 1]))
      && content
        .get(pos + 2)
        .is_none_or(|&b| is_pdf_whitespace(b) || is_delimiter(b));
    if !at_token {
      pos += 1;
      continue;
    }

    match parse_inline_image(content, pos + 2)? {
      Some((dict, data, next)) => {
        if start < pos {
          segments.push(Segment::Operators(&content[start..pos]));
        }
        segments.push(Segment::InlineImage { dict, data });
        start = next;
        pos = next;
      }
      // `BI` bytes that are not followed by an image dictionary (e.g.
      // inside a string operand) stay part of the operator run.
      None => pos += 2,
    }
  }

  if start < content.len() {
    segments.push(Segment::Operators(&content[start..]));
  }
  Ok(segments)
}

/// Parse the inline dictionary after `BI` and capture the payload. Returns
/// the expanded dictionary, the payload bytes, and the offset just past
/// `EI`; `None` when the bytes after `BI` are not an image dictionary at
/// all. A valid dictionary with no terminated payload is a hard error.
fn parse_inline_image(content: &[u8], from: usize) -> Result<Option<(Dictionary, Vec<u8>, usize)>> {
  let mut parser = InlineParser {
    data: content,
    pos: from,
  };
  let Ok(dict) = parser.parse_dict_until_id() else {
    return Ok(None);
  };

  // `ID` is followed by exactly one whitespace byte before the payload.
  let mut payload_start = parser.pos;
  if payload_start < content.len() && is_pdf_whitespace(content[payload_start]) {
    payload_start += 1;
  }

  // A declared length wins over scanning: payloads may contain `EI`.
  let declared = dict_int(&dict, b"L").or_else(|| dict_int(&dict, b"Length"));
  if let Some(len) = declared {
    let len = len.max(0) as usize;
    if let Some(data) = content.get(payload_start..payload_start + len) {
      let mut after = payload_start + len;
      while after < content.len() && is_pdf_whitespace(content[after]) {
        after += 1;
      }
      if content.get(after..after + 2) == Some(b"EI".as_slice()) {
        return Ok(Some((dict, data.to_vec(), after + 2)));
      }
    }
    log::warn!("inline image /L does not land on EI; falling back to scan");
  }

  // First `EI` preceded by whitespace and followed by whitespace or EOF.
  let mut pos = payload_start;
  while pos + 1 < content.len() {
    if content[pos] == b'E'
      && content[pos + 1] == b'I'
      && pos > payload_start
      && is_pdf_whitespace(content[pos - 1])
      && content.get(pos + 2).is_none_or(|&b| is_pdf_whitespace(b))
    {
      let data = content[payload_start..pos - 1].to_vec();
      return Ok(Some((dict, data, pos + 2)));
    }
    pos += 1;
  }
  Err(Error::MalformedContentStream(
    "inline image without EI terminator".into(),
  ))
}

/// Minimal token reader for the key/value pairs between `BI` and `ID`.
struct InlineParser<'a> {
  data: &'a [u8],
  pos: usize,
}

impl InlineParser<'_> {
  fn skip_whitespace(&mut self) {
    while self.pos < self.data.len() && is_pdf_whitespace(self.data[self.pos]) {
      self.pos += 1;
    }
  }

  fn parse_dict_until_id(&mut self) -> Result<Dictionary> {
    let mut dict = Dictionary::new();
    loop {
      self.skip_whitespace();
      if self.pos >= self.data.len() {
        return Err(Error::MalformedContentStream(
          "inline image without ID".into(),
        ));
      }
      if self.data.get(self.pos..self.pos + 2) == Some(b"ID".as_slice()) {
        self.pos += 2;
        return Ok(dict);
      }
      if self.data[self.pos] != b'/' {
        return Err(Error::MalformedContentStream(format!(
          "unexpected byte 0x{:02x} in inline image dictionary",
          self.data[self.pos]
        )));
      }
      let key = self.parse_name()?;
      self.skip_whitespace();
      let value = self.parse_value()?;
      dict.set(expand_inline_key(&key), value);
    }
  }

  fn parse_name(&mut self) -> Result<Vec<u8>> {
    // Caller verified the leading '/'.
    self.pos += 1;
    let start = self.pos;
    while self.pos < self.data.len()
      && !is_pdf_whitespace(self.data[self.pos])
      && !is_delimiter(self.data[self.pos])
    {
      self.pos += 1;
    }
    Ok(self.data[start..self.pos].to_vec())
  }

  fn parse_value(&mut self) -> Result<Object> {
    self.skip_whitespace();
    let byte = *self.data.get(self.pos).ok_or_else(|| {
      Error::MalformedContentStream("truncated inline image dictionary".into())
    })?;

    match byte {
      b'/' => Ok(Object::Name(self.parse_name()?)),
      b'[' => {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
          self.skip_whitespace();
          match self.data.get(self.pos) {
            Some(b']') => {
              self.pos += 1;
              return Ok(Object::Array(items));
            }
            Some(_) => items.push(self.parse_value()?),
            None => {
              return Err(Error::MalformedContentStream(
                "unterminated inline array".into(),
              ));
            }
          }
        }
      }
      b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
        self.pos += 2;
        let mut dict = Dictionary::new();
        loop {
          self.skip_whitespace();
          if self.data.get(self.pos..self.pos + 2) == Some(b">>".as_slice()) {
            self.pos += 2;
            return Ok(Object::Dictionary(dict));
          }
          if self.data.get(self.pos) != Some(&b'/') {
            return Err(Error::MalformedContentStream(
              "malformed nested inline dictionary".into(),
            ));
          }
          let key = self.parse_name()?;
          let value = self.parse_value()?;
          dict.set(key, value);
        }
      }
      b'<' => {
        self.pos += 1;
        let mut bytes = Vec::new();
        let mut nibbles: Vec<u8> = Vec::new();
        while let Some(&b) = self.data.get(self.pos) {
          self.pos += 1;
          match b {
            b'>' => {
              if nibbles.len() == 1 {
                bytes.push(nibbles[0] << 4);
              }
              return Ok(Object::String(bytes, lopdf::StringFormat::Hexadecimal));
            }
            b'0'..=b'9' => nibbles.push(b - b'0'),
            b'a'..=b'f' => nibbles.push(b - b'a' + 10),
            b'A'..=b'F' => nibbles.push(b - b'A' + 10),
            _ if is_pdf_whitespace(b) => {}
            _ => {
              return Err(Error::MalformedContentStream(
                "invalid hex string in inline dictionary".into(),
              ));
            }
          }
          if nibbles.len() == 2 {
            bytes.push((nibbles[0] << 4) | nibbles[1]);
            nibbles.clear();
          }
        }
        Err(Error::MalformedContentStream(
          "unterminated hex string".into(),
        ))
      }
      b't' if self.data.get(self.pos..self.pos + 4) == Some(b"true".as_slice()) => {
        self.pos += 4;
        Ok(Object::Boolean(true))
      }
      b'f' if self.data.get(self.pos..self.pos + 5) == Some(b"false".as_slice()) => {
        self.pos += 5;
        Ok(Object::Boolean(false))
      }
      b'n' if self.data.get(self.pos..self.pos + 4) == Some(b"null".as_slice()) => {
        self.pos += 4;
        Ok(Object::Null)
      }
      b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number(),
      other => Err(Error::MalformedContentStream(format!(
        "unexpected byte 0x{other:02x} in inline image value"
      ))),
    }
  }

  fn parse_number(&mut self) -> Result<Object> {
    let start = self.pos;
    if matches!(self.data[self.pos], b'+' | b'-') {
      self.pos += 1;
    }
    let mut is_real = false;
    while let Some(&b) = self.data.get(self.pos) {
      match b {
        b'0'..=b'9' => self.pos += 1,
        b'.' if !is_real => {
          is_real = true;
          self.pos += 1;
        }
        _ => break,
      }
    }
    let text = std::str::from_utf8(&self.data[start..self.pos])
      .map_err(|_| Error::MalformedContentStream("invalid number".into()))?;
    if is_real {
      text
        .parse::<f32>()
        .map(Object::Real)
        .map_err(|_| Error::MalformedContentStream(format!("invalid real: {text}")))
    } else {
      text
        .parse::<i64>()
        .map(Object::Integer)
        .map_err(|_| Error::MalformedContentStream(format!("invalid integer: {text}")))
    }
  }
}

/// Inline dictionaries abbreviate the common image keys.
fn expand_inline_key(key: &[u8]) -> Vec<u8> {
  let expanded: &[u8] = match key {
    b"BPC" => b"BitsPerComponent",
    b"CS" => b"ColorSpace",
    b"D" => b"Decode",
    b"DP" => b"DecodeParms",
    b"F" => b"Filter",
    b"H" => b"Height",
    b"IM" => b"ImageMask",
    b"I" => b"Interpolate",
    b"W" => b"Width",
    other => other,
  };
  expanded.to_vec()
}

#[cfg(test)]
mod tests {
  use super::*;
  use lopdf::{Stream, dictionary};

  fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
  }

  fn gray_image_stream(width: i64, height: i64) -> Stream {
    Stream::new(
      dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "BitsPerComponent" => 8,
        "ColorSpace" => "DeviceGray",
      },
      vec![0u8; (width * height) as usize],
    )
  }

  /// Attach a one-page tree (content + XObject resources) to `doc`.
  fn finish_page(doc: &mut Document, content: &[u8], xobjects: Dictionary, rotate: i64) {
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Object::Stream(Stream::new(
      dictionary! {},
      content.to_vec(),
    )));
    let page_id = doc.add_object(dictionary! {
      "Type" => "Page",
      "Parent" => pages_id,
      "Contents" => content_id,
      "Rotate" => rotate,
      "Resources" => dictionary! { "XObject" => xobjects },
    });
    doc.objects.insert(
      pages_id,
      Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
      }),
    );
    let catalog_id = doc.add_object(dictionary! {
      "Type" => "Catalog",
      "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
  }

  #[test]
  fn matrix_concat_applies_left_to_right() {
    let scale = Matrix {
      a: 2.0,
      b: 0.0,
      c: 0.0,
      d: 2.0,
      e: 0.0,
      f: 0.0,
    };
    let translate = Matrix {
      a: 1.0,
      b: 0.0,
      c: 0.0,
      d: 1.0,
      e: 10.0,
      f: 20.0,
    };
    // Scale applied first, then the translation.
    let combined = scale.multiply(translate);
    let p = combined.apply(1.0, 1.0);
    assert!(approx(p.x, 12.0) && approx(p.y, 22.0));
  }

  #[test]
  fn graphics_state_restores_saved_matrix() {
    let mut gs = GraphicsState::new();
    gs.save();
    gs.concat(Matrix {
      a: 3.0,
      b: 0.0,
      c: 0.0,
      d: 3.0,
      e: 5.0,
      f: 5.0,
    });
    assert!(!approx(gs.current().a, 1.0));
    gs.restore();
    assert_eq!(gs.current(), Matrix::IDENTITY);
  }

  #[test]
  fn unmatched_restore_is_ignored() {
    let mut gs = GraphicsState::new();
    gs.restore();
    gs.restore();
    assert_eq!(gs.current(), Matrix::IDENTITY);
  }

  #[test]
  fn do_image_records_placement_and_order() {
    let mut doc = Document::with_version("1.5");
    let im_a = doc.add_object(Object::Stream(gray_image_stream(4, 4)));
    let im_b = doc.add_object(Object::Stream(gray_image_stream(2, 2)));
    finish_page(
      &mut doc,
      b"q 100 0 0 50 10 20 cm /A Do Q /B Do",
      dictionary! { "A" => im_a, "B" => im_b },
      0,
    );

    let records = walk_page(&doc, 1).unwrap();
    assert_eq!(records.len(), 2);

    let first = &records[0].placement;
    assert!(approx(first.lower_left.x, 10.0) && approx(first.lower_left.y, 20.0));
    assert!(approx(first.upper_right.x, 110.0) && approx(first.upper_right.y, 70.0));
    assert!(approx(first.user_width, 100.0) && approx(first.user_height, 50.0));
    assert!(approx(first.resolution_x, 4.0 / 100.0 * 72.0));
    assert_eq!(first.pixel_width, 4);

    // After Q the identity matrix is back.
    let second = &records[1].placement;
    assert!(approx(second.lower_left.x, 0.0) && approx(second.upper_right.x, 1.0));
  }

  #[test]
  fn form_xobject_concatenates_outer_matrix() {
    let mut doc = Document::with_version("1.5");
    let im_id = doc.add_object(Object::Stream(gray_image_stream(4, 4)));
    let form = Stream::new(
      dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "Resources" => dictionary! {
          "XObject" => dictionary! { "Im1" => im_id },
        },
      },
      b"/Im1 Do".to_vec(),
    );
    let form_id = doc.add_object(Object::Stream(form));
    finish_page(
      &mut doc,
      b"q 2 0 0 2 10 20 cm /F1 Do Q",
      dictionary! { "F1" => form_id },
      0,
    );

    let records = walk_page(&doc, 1).unwrap();
    assert_eq!(records.len(), 1);
    let placement = &records[0].placement;
    assert!(approx(placement.lower_left.x, 10.0));
    assert!(approx(placement.lower_left.y, 20.0));
    assert!(approx(placement.upper_right.x, 12.0));
    assert!(approx(placement.upper_right.y, 22.0));
  }

  #[test]
  fn rotated_page_swaps_user_extents() {
    let mut doc = Document::with_version("1.5");
    let im_id = doc.add_object(Object::Stream(gray_image_stream(8, 4)));
    finish_page(
      &mut doc,
      b"q 100 0 0 50 0 0 cm /A Do Q",
      dictionary! { "A" => im_id },
      90,
    );

    let records = walk_page(&doc, 1).unwrap();
    let placement = &records[0].placement;
    assert!(approx(placement.user_width, 50.0));
    assert!(approx(placement.user_height, 100.0));
    assert!(approx(placement.resolution_x, 8.0 / 50.0 * 72.0));
  }

  #[test]
  fn unresolved_do_name_is_skipped() {
    let mut doc = Document::with_version("1.5");
    finish_page(&mut doc, b"/Missing Do", dictionary! {}, 0);
    let records = walk_page(&doc, 1).unwrap();
    assert!(records.is_empty());
  }

  #[test]
  fn inline_image_dictionary_expands_abbreviations() {
    let content = b"BI /W 2 /H 1 /BPC 8 /CS /G /D [0 1] ID \x11\x22 EI Q";
    let segments = split_inline_images(content).unwrap();
    let inline = segments
      .iter()
      .find_map(|s| match s {
        Segment::InlineImage { dict, data } => Some((dict, data)),
        _ => None,
      })
      .unwrap();
    let (dict, data) = inline;
    assert_eq!(dict_int(dict, b"Width"), Some(2));
    assert_eq!(dict_int(dict, b"Height"), Some(1));
    assert_eq!(dict_int(dict, b"BitsPerComponent"), Some(8));
    assert!(matches!(dict.get(b"ColorSpace"), Ok(Object::Name(n)) if n == b"G"));
    assert!(matches!(dict.get(b"Decode"), Ok(Object::Array(_))));
    assert_eq!(data.as_slice(), &[0x11, 0x22]);
  }

  #[test]
  fn inline_payload_stops_at_whitespace_ei() {
    // "EI" without a leading whitespace byte stays part of the payload.
    let content = b"BI /W 1 /H 1 /BPC 8 /CS /G ID xEIx EI ";
    let segments = split_inline_images(content).unwrap();
    let data = segments
      .iter()
      .find_map(|s| match s {
        Segment::InlineImage { data, .. } => Some(data.clone()),
        _ => None,
      })
      .unwrap();
    assert_eq!(data.as_slice(), b"xEIx");
  }

  #[test]
  fn inline_declared_length_survives_embedded_ei() {
    let content = b"BI /W 1 /H 1 /L 4 ID x EI EI";
    let segments = split_inline_images(content).unwrap();
    let data = segments
      .iter()
      .find_map(|s| match s {
        Segment::InlineImage { data, .. } => Some(data.clone()),
        _ => None,
      })
      .unwrap();
    assert_eq!(data.as_slice(), b"x EI");
  }

  #[test]
  fn inline_image_without_terminator_fails() {
    let content = b"BI /W 1 ID payload-without-end";
    assert!(matches!(
      split_inline_images(content),
      Err(Error::MalformedContentStream(_))
    ));
  }

  #[test]
  fn inline_image_emitted_between_operators() {
    let mut doc = Document::with_version("1.5");
    let im_id = doc.add_object(Object::Stream(gray_image_stream(4, 4)));
    finish_page(
      &mut doc,
      b"q 3 0 0 3 0 0 cm BI /W 1 /H 1 /BPC 8 /CS /G ID \x7f EI Q /A Do",
      dictionary! { "A" => im_id },
      0,
    );

    let records = walk_page(&doc, 1).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].is_inline());
    assert!(approx(records[0].placement.user_width, 3.0));
    assert!(!records[1].is_inline());
  }

  #[test]
  fn nested_inline_decode_parms_dictionary() {
    let content = b"BI /W 1 /H 1 /F /Fl /DP << /Predictor 1 >> ID \x00 EI ";
    let segments = split_inline_images(content).unwrap();
    let dict = segments
      .iter()
      .find_map(|s| match s {
        Segment::InlineImage { dict, .. } => Some(dict.clone()),
        _ => None,
      })
      .unwrap();
    assert!(matches!(
      dict.get(b"DecodeParms"),
      Ok(Object::Dictionary(_))
    ));
    assert!(matches!(dict.get(b"Filter"), Ok(Object::Name(n)) if n == b"Fl"));
  }
}
