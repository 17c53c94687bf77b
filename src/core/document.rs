//! Page-level access on top of the lopdf object model: inherited
//! resources, rotation, and concatenated content-stream bytes.

use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Resolve a 1-based page number to its page object.
pub(crate) fn page_id(doc: &Document, page_number: u32) -> Result<ObjectId> {
  doc
    .get_pages()
    .get(&page_number)
    .copied()
    .ok_or(Error::Pdf(lopdf::Error::PageNumberNotFound(page_number)))
}

/// Walk the page tree to find /Resources (handles inheritance from /Parent).
pub(crate) fn inherited_resources(doc: &Document, page: ObjectId) -> Option<Dictionary> {
  let mut current_id = Some(page);
  while let Some(id) = current_id {
    let dict = doc.get_dictionary(id).ok()?;
    if let Ok(resources_obj) = dict.get(b"Resources") {
      return resolve_to_dict(doc, resources_obj);
    }
    // Walk up to /Parent
    current_id = dict.get(b"Parent").ok().and_then(|p| match p {
      Object::Reference(ref_id) => Some(*ref_id),
      _ => None,
    });
  }
  None
}

/// Effective /Rotate for a page (inheritable, degrees, default 0).
pub(crate) fn page_rotation(doc: &Document, page: ObjectId) -> i64 {
  let mut current_id = Some(page);
  while let Some(id) = current_id {
    let Ok(dict) = doc.get_dictionary(id) else {
      return 0;
    };
    if let Ok(obj) = dict.get(b"Rotate")
      && let Object::Integer(deg) = resolve(doc, obj)
    {
      return *deg;
    }
    current_id = dict.get(b"Parent").ok().and_then(|p| match p {
      Object::Reference(ref_id) => Some(*ref_id),
      _ => None,
    });
  }
  0
}

/// Decompressed bytes of the page's content, with split /Contents arrays
/// concatenated in order.
pub(crate) fn page_content(doc: &Document, page: ObjectId) -> Result<Vec<u8>> {
  let page_dict = doc.get_dictionary(page)?;

  let contents = match page_dict.get(b"Contents") {
    Ok(c) => c,
    Err(_) => return Ok(Vec::new()),
  };

  let stream_ids: Vec<ObjectId> = match contents {
    Object::Reference(id) => vec![*id],
    Object::Array(arr) => arr
      .iter()
      .filter_map(|o| {
        if let Object::Reference(id) = o {
          Some(*id)
        } else {
          None
        }
      })
      .collect(),
    _ => return Ok(Vec::new()),
  };

  let mut all_bytes = Vec::new();
  for stream_id in stream_ids {
    if let Ok(Object::Stream(s)) = doc.get_object(stream_id) {
      let mut s = s.clone();
      let _ = s.decompress();
      all_bytes.extend_from_slice(&s.content);
      // A stream boundary is also a token boundary.
      all_bytes.push(b'\n');
    }
  }
  Ok(all_bytes)
}

/// Chase indirect references down to a concrete object. Bounded so that a
/// reference cycle cannot spin forever.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
  let mut current = obj;
  for _ in 0..16 {
    match current {
      Object::Reference(id) => match doc.get_object(*id) {
        Ok(target) => current = target,
        Err(_) => return current,
      },
      _ => return current,
    }
  }
  current
}

pub(crate) fn resolve_to_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
  match resolve(doc, obj) {
    Object::Dictionary(d) => Some(d.clone()),
    Object::Stream(s) => Some(s.dict.clone()),
    _ => None,
  }
}

pub(crate) fn dict_int(dict: &Dictionary, key: &[u8]) -> Option<i64> {
  match dict.get(key).ok()? {
    Object::Integer(i) => Some(*i),
    _ => None,
  }
}

pub(crate) fn dict_bool(dict: &Dictionary, key: &[u8]) -> Option<bool> {
  match dict.get(key).ok()? {
    Object::Boolean(b) => Some(*b),
    _ => None,
  }
}

/// Numeric value of an operand or dictionary entry.
pub(crate) fn number(obj: &Object) -> Option<f64> {
  match obj {
    Object::Integer(i) => Some(*i as f64),
    Object::Real(f) => Some(*f as f64),
    _ => None,
  }
}

/// A dictionary entry holding an array of numbers (e.g. /Decode, /Mask
/// ranges), resolved through indirect references.
pub(crate) fn dict_number_array(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Vec<f64>> {
  let obj = dict.get(key).ok()?;
  match resolve(doc, obj) {
    Object::Array(arr) => arr.iter().map(|o| number(resolve(doc, o))).collect(),
    _ => None,
  }
}
