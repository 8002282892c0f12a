use std::{fmt, io::Cursor, str::FromStr};

use image::{ExtendedColorType, ImageEncoder as _, RgbImage, RgbaImage};

use crate::foundation::{
    error::{FramecutError, FramecutResult},
    math::quality_to_percent,
};

/// Output encoding for sliced cells and captured frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputFormat {
    /// `image/png`, lossless.
    #[default]
    Png,
    /// `image/jpeg`, lossy; honours the quality setting.
    Jpeg,
    /// `image/webp`, lossless only.
    Webp,
}

impl OutputFormat {
    /// MIME type string.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    /// Whether the quality setting changes the encoded output.
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for OutputFormat {
    type Err = FramecutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "image/png" | "png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Ok(Self::Jpeg),
            "image/webp" | "webp" => Ok(Self::Webp),
            _ => Err(FramecutError::invalid_input(format!(
                "unsupported output format '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = FramecutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OutputFormat> for String {
    fn from(value: OutputFormat) -> Self {
        value.mime().to_string()
    }
}

/// Quality used for lossy formats when the caller leaves it unset.
pub const DEFAULT_LOSSY_QUALITY: f32 = 0.92;

/// Encode straight-alpha RGBA8 pixels into `out`, replacing its contents.
///
/// `out` is reused across calls so a batch keeps a single encode buffer alive.
pub fn encode_rgba8_into(
    out: &mut Vec<u8>,
    img: &RgbaImage,
    format: OutputFormat,
    quality: Option<f32>,
) -> FramecutResult<()> {
    out.clear();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(FramecutError::encode(format!(
            "cannot encode empty {width}x{height} canvas"
        )));
    }

    let mut cursor = Cursor::new(&mut *out);
    let res = match format {
        OutputFormat::Png => image::codecs::png::PngEncoder::new(&mut cursor).write_image(
            img.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        OutputFormat::Jpeg => {
            let rgb = flatten_over_black(img);
            let q = quality_to_percent(quality.unwrap_or(DEFAULT_LOSSY_QUALITY));
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, q).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Webp => image::codecs::webp::WebPEncoder::new_lossless(&mut cursor)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8),
    };
    res.map_err(|e| FramecutError::encode(format!("{format} encode failed: {e}")))?;

    if out.is_empty() {
        return Err(FramecutError::encode(format!(
            "{format} encoder produced no output"
        )));
    }
    Ok(())
}

/// Composite straight-alpha pixels onto opaque black; JPEG has no alpha channel.
fn flatten_over_black(img: &RgbaImage) -> RgbImage {
    let mut rgb = RgbImage::new(img.width(), img.height());
    for (dst, src) in rgb.pixels_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        let a = u16::from(a);
        let scale = |c: u8| ((u16::from(c) * a + 127) / 255) as u8;
        *dst = image::Rgb([scale(r), scale(g), scale(b)]);
    }
    rgb
}

/// Encode into a fresh buffer.
pub fn encode_rgba8(
    img: &RgbaImage,
    format: OutputFormat,
    quality: Option<f32>,
) -> FramecutResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_rgba8_into(&mut out, img, format, quality)?;
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/raster.rs"]
mod tests;
