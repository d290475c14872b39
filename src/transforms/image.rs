//! Lossless image optimisation.
//!
//! Every path returns the smaller of the input and the re-encoded candidate,
//! so optimising is idempotent, never grows a file, and leaves decoded pixels
//! unchanged.

use std::io::Cursor;
use std::ops::Range;
use std::sync::LazyLock;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageEncoder, ImageFormat};
use regex::{Captures, Regex};

use crate::config::PngCompression;
use crate::error::ImageError;

#[allow(clippy::expect_used)]
static SVG_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

#[allow(clippy::expect_used)]
static SVG_DOCTYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<!DOCTYPE[^>\[]*(\[[^\]]*\])?\s*>").expect("valid doctype regex"));

/// Whitespace between tags that spans a line break.
#[allow(clippy::expect_used)]
static SVG_GAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">[ \t]*\r?\n\s*<").expect("valid whitespace regex"));

/// Text content elements, whose inner whitespace is rendered.
#[allow(clippy::expect_used)]
static SVG_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text\b.*?</text\s*>").expect("valid text regex"));

/// Supported formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Re-encoded losslessly.
    Png,
    /// Validated and passed through.
    Jpeg,
    /// Validated and passed through.
    Gif,
    /// Minified as text.
    Svg,
}

impl Format {
    /// Map a file extension (any case, without dot) to a format.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Unsupported`] for anything else.
    pub fn from_extension(ext: &str) -> Result<Self, ImageError> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "gif" => Ok(Self::Gif),
            "svg" => Ok(Self::Svg),
            other => Err(ImageError::Unsupported(other.to_string())),
        }
    }
}

/// Optimiser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    /// Compression level for re-encoded PNGs.
    pub png_compression: PngCompression,
    /// Strip `<!-- -->` comments from SVGs.
    pub svg_remove_comments: bool,
    /// Strip the `<!DOCTYPE>` declaration from SVGs.
    pub svg_remove_doctype: bool,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            png_compression: PngCompression::Best,
            svg_remove_comments: true,
            svg_remove_doctype: false,
        }
    }
}

/// Optimise one image.
///
/// # Errors
///
/// Returns [`ImageError::Codec`] if the input does not decode as `format`,
/// or [`ImageError::InvalidSvg`] for non-UTF-8 SVG input.
pub fn optimize(bytes: &[u8], format: Format, settings: &ImageSettings) -> Result<Vec<u8>, ImageError> {
    let candidate = match format {
        Format::Png => reencode_png(bytes, settings.png_compression)?,
        Format::Svg => minify_svg(bytes, settings)?.into_bytes(),
        Format::Jpeg => {
            validate(bytes, ImageFormat::Jpeg)?;
            return Ok(bytes.to_vec());
        }
        Format::Gif => {
            validate(bytes, ImageFormat::Gif)?;
            return Ok(bytes.to_vec());
        }
    };
    Ok(smaller(bytes, candidate))
}

fn smaller(original: &[u8], candidate: Vec<u8>) -> Vec<u8> {
    if candidate.len() < original.len() {
        candidate
    } else {
        original.to_vec()
    }
}

fn validate(bytes: &[u8], format: ImageFormat) -> Result<(), ImageError> {
    image::io::Reader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    Ok(())
}

fn reencode_png(bytes: &[u8], compression: PngCompression) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    let compression = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive).write_image(
        decoded.as_bytes(),
        decoded.width(),
        decoded.height(),
        decoded.color(),
    )?;
    Ok(out)
}

/// Remove comments (and optionally the doctype) and whitespace between tags.
///
/// # Errors
///
/// Returns [`ImageError::InvalidSvg`] if `bytes` is not UTF-8.
pub fn minify_svg(bytes: &[u8], settings: &ImageSettings) -> Result<String, ImageError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ImageError::InvalidSvg)?;
    let mut svg = text.to_string();
    if settings.svg_remove_comments {
        svg = SVG_COMMENT_RE.replace_all(&svg, "").into_owned();
    }
    if settings.svg_remove_doctype {
        svg = SVG_DOCTYPE_RE.replace_all(&svg, "").into_owned();
    }
    Ok(collapse_gaps(&svg).trim().to_string())
}

/// Drop line-break whitespace between tags, leaving the inside of `<text>`
/// elements as written.
fn collapse_gaps(svg: &str) -> String {
    let texts: Vec<Range<usize>> = SVG_TEXT_RE.find_iter(svg).map(|m| m.range()).collect();
    SVG_GAP_RE
        .replace_all(svg, |caps: &Captures<'_>| {
            let gap = caps.get(0).map_or(0..0, |m| m.range());
            if texts.iter().any(|t| t.start <= gap.start && gap.end <= t.end) {
                caps.get(0).map_or_else(String::new, |m| m.as_str().to_string())
            } else {
                "><".to_string()
            }
        })
        .into_owned()
}
