#![deny(clippy::all)]

//! Extract and decode raster images embedded in PDF documents.
//!
//! Discovery walks a page's content stream with a graphics-state stack, so
//! each record carries the placement the image was actually painted with
//! (corners, user-space extent, effective DPI), covering both image
//! XObjects and inline `BI…ID…EI` images, including those painted through
//! nested Form XObjects. Decoding runs the stream's filter chain, unpacks
//! samples by bit depth, resolves the color space down to a device space,
//! applies decode arrays, and composes soft, stencil, and color-key masks
//! into an alpha plane.

pub use lopdf;

mod core;
mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
  DecodedImage, DeviceSpace, ImageRecord, ImageSource, Placement, Point, Renderer,
};

use lopdf::Document;
use rayon::prelude::*;

// Whole-document extraction fans pages out across threads.
const _: () = {
  fn assert_send_sync<T: Send + Sync>() {}
  fn check() {
    assert_send_sync::<lopdf::Document>();
  }
};

/// Load a PDF document from disk.
pub fn load_document<P: AsRef<std::path::Path>>(path: P) -> Result<Document> {
  Ok(Document::load(path)?)
}

/// Every image painted on a page, in content-stream order, with placement.
///
/// Unresolvable XObject names are skipped; an unparsable content stream
/// fails the whole page.
pub fn page_images(doc: &Document, page_number: u32) -> Result<Vec<ImageRecord>> {
  core::walker::walk_page(doc, page_number)
}

/// Decode one discovered image to pixels with the chosen renderer.
///
/// Failures here are per-image: a record that cannot be decoded leaves the
/// rest of the page's records untouched.
pub fn decode_image(
  doc: &Document,
  record: &ImageRecord,
  renderer: Renderer,
) -> Result<DecodedImage> {
  core::decoder::decode_record(doc, record, renderer)
}

/// Discover images on every page of the document.
///
/// Pages fan out across threads; within a page the walk stays sequential so
/// records keep content-stream order. Pages that fail to parse are dropped
/// from the result.
pub fn document_images(doc: &Document) -> Vec<(u32, Vec<ImageRecord>)> {
  let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
  let mut results: Vec<(u32, Vec<ImageRecord>)> = page_numbers
    .par_iter()
    .filter_map(|&page| match page_images(doc, page) {
      Ok(records) => Some((page, records)),
      Err(err) => {
        log::warn!("page {page}: {err}");
        None
      }
    })
    .collect();
  results.sort_unstable_by_key(|(page, _)| *page);
  results
}

#[cfg(test)]
mod tests {
  use super::*;
  use lopdf::{Dictionary, Object, Stream, dictionary};
  use std::io::Write;

  fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder =
      flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
  }

  fn rgb_flate_stream(width: i64, height: i64, raw: &[u8]) -> Stream {
    Stream::new(
      dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "BitsPerComponent" => 8,
        "ColorSpace" => "DeviceRGB",
        "Filter" => "FlateDecode",
      },
      deflate(raw),
    )
  }

  /// Attach a page tree with one page per (content, xobjects) pair.
  fn finish_pages(doc: &mut Document, pages: Vec<(&[u8], Dictionary)>) {
    let pages_id = doc.new_object_id();
    let count = pages.len() as i64;
    let mut kids: Vec<Object> = Vec::new();
    for (content, xobjects) in pages {
      let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.to_vec(),
      )));
      let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => xobjects },
      });
      kids.push(page_id.into());
    }
    doc.objects.insert(
      pages_id,
      Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
      }),
    );
    let catalog_id = doc.add_object(dictionary! {
      "Type" => "Catalog",
      "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
  }

  #[test]
  fn end_to_end_flate_rgb_round_trip() {
    let raw = vec![
      0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00, // red, green
      0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, // blue, white
    ];
    let mut doc = Document::with_version("1.5");
    let im_id = doc.add_object(Object::Stream(rgb_flate_stream(2, 2, &raw)));
    finish_pages(
      &mut doc,
      vec![(
        b"q 144 0 0 144 36 36 cm /Im1 Do Q".as_slice(),
        dictionary! { "Im1" => im_id },
      )],
    );

    let records = page_images(&doc, 1).unwrap();
    assert_eq!(records.len(), 1);
    let placement = &records[0].placement;
    assert_eq!(placement.pixel_width, 2);
    assert!((placement.resolution_x - 1.0).abs() < 1e-9); // 2px over 2in

    for renderer in [Renderer::Basic, Renderer::Full] {
      let image = decode_image(&doc, &records[0], renderer).unwrap();
      assert_eq!((image.width, image.height), (2, 2));
      assert_eq!(image.space, DeviceSpace::Rgb);
      assert_eq!(image.pixels, raw, "{renderer:?}");
      assert_eq!(image.placement, records[0].placement);
    }
  }

  #[test]
  fn per_image_decode_errors_do_not_poison_discovery() {
    let mut doc = Document::with_version("1.5");
    let good = doc.add_object(Object::Stream(rgb_flate_stream(1, 1, &[1, 2, 3])));
    let bad = doc.add_object(Object::Stream(Stream::new(
      dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => 1,
        "Height" => 1,
        "BitsPerComponent" => 8,
        "ColorSpace" => "DeviceGray",
        "Filter" => "JBIG2Decode",
      },
      vec![0],
    )));
    finish_pages(
      &mut doc,
      vec![(
        b"/Good Do /Bad Do".as_slice(),
        dictionary! { "Good" => good, "Bad" => bad },
      )],
    );

    let records = page_images(&doc, 1).unwrap();
    assert_eq!(records.len(), 2);
    assert!(decode_image(&doc, &records[0], Renderer::Full).is_ok());
    assert!(matches!(
      decode_image(&doc, &records[1], Renderer::Full),
      Err(Error::UnsupportedFilter(_))
    ));
  }

  #[test]
  fn inline_image_decodes_from_owned_payload() {
    let mut doc = Document::with_version("1.5");
    finish_pages(
      &mut doc,
      vec![(
        b"q 10 0 0 10 0 0 cm BI /W 2 /H 1 /BPC 8 /CS /G ID \x20\xE0 EI Q".as_slice(),
        dictionary! {},
      )],
    );

    let records = page_images(&doc, 1).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_inline());

    let image = decode_image(&doc, &records[0], Renderer::Full).unwrap();
    assert_eq!(image.space, DeviceSpace::Gray);
    assert_eq!(image.pixels, vec![0x20, 0xE0]);
  }

  #[test]
  fn stencil_records_are_flagged_for_filtering() {
    let mut doc = Document::with_version("1.5");
    let stencil = doc.add_object(Object::Stream(Stream::new(
      dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => 8,
        "Height" => 1,
        "BitsPerComponent" => 1,
        "ImageMask" => true,
      },
      vec![0xF0],
    )));
    finish_pages(&mut doc, vec![(b"/S Do".as_slice(), dictionary! { "S" => stencil })]);

    let records = page_images(&doc, 1).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_mask);
  }

  #[test]
  fn document_images_keeps_page_order() {
    let mut doc = Document::with_version("1.5");
    let a = doc.add_object(Object::Stream(rgb_flate_stream(1, 1, &[0, 0, 0])));
    let b = doc.add_object(Object::Stream(rgb_flate_stream(1, 1, &[9, 9, 9])));
    finish_pages(
      &mut doc,
      vec![
        (b"/A Do".as_slice(), dictionary! { "A" => a }),
        (b"/B Do /B Do".as_slice(), dictionary! { "B" => b }),
      ],
    );

    let by_page = document_images(&doc);
    assert_eq!(by_page.len(), 2);
    assert_eq!(by_page[0].0, 1);
    assert_eq!(by_page[0].1.len(), 1);
    assert_eq!(by_page[1].0, 2);
    assert_eq!(by_page[1].1.len(), 2);
  }
}
