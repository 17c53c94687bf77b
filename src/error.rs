use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the extraction and decoding pipeline.
///
/// Per-image errors abort that image's decode only; they never poison the
/// page walk that discovered the image.
#[derive(Debug, Error)]
pub enum Error {
  #[error("unsupported filter: {0}")]
  UnsupportedFilter(String),

  #[error("unsupported color space: {0}")]
  UnsupportedColorSpace(String),

  #[error("unsupported bits per component: {0}")]
  UnsupportedBitDepth(u16),

  #[error("renderer {renderer} cannot read {filter} in {space}")]
  UnsupportedByRenderer {
    renderer: &'static str,
    filter: String,
    space: String,
  },

  #[error("decode array cannot be applied to a natively decoded image")]
  UnsupportedDecodeArray,

  #[error("color-key mask on unsupported color space: {0}")]
  UnsupportedMaskColorSpace(String),

  #[error("image payload truncated: expected {expected} bytes, got {actual}")]
  TruncatedImage { expected: usize, actual: usize },

  #[error("malformed content stream: {0}")]
  MalformedContentStream(String),

  #[error("decode failed: {0}")]
  Decode(String),

  #[error(transparent)]
  Pdf(#[from] lopdf::Error),
}
