use image::{ImageFormat, RgbaImage};

use crate::{
    foundation::error::{FramecutError, FramecutResult},
    grid::fetch::SourceBytes,
};

/// One way of turning compressed source bytes into RGBA8 pixels.
pub trait DecodeStrategy: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Decode `src`, or explain why this strategy cannot.
    fn decode(&self, src: &SourceBytes) -> FramecutResult<RgbaImage>;
}

/// Decode by sniffing the container from its magic bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SniffedDecode;

impl DecodeStrategy for SniffedDecode {
    fn name(&self) -> &'static str {
        "sniffed"
    }

    fn decode(&self, src: &SourceBytes) -> FramecutResult<RgbaImage> {
        let img = image::load_from_memory(&src.bytes)
            .map_err(|e| FramecutError::decode(format!("sniffed decode failed: {e}")))?;
        Ok(img.to_rgba8())
    }
}

/// Decode using the declared content type, falling back to the source's file extension.
///
/// Covers formats without reliable magic bytes (TGA, for instance).
#[derive(Clone, Copy, Debug, Default)]
pub struct HintedDecode;

impl HintedDecode {
    fn format_hint(src: &SourceBytes) -> Option<ImageFormat> {
        let from_mime = src.content_type.as_deref().and_then(|ct| {
            let essence = ct.split(';').next().unwrap_or(ct).trim();
            ImageFormat::from_mime_type(essence)
        });
        from_mime.or_else(|| {
            if src.source.starts_with("data:") {
                return None;
            }
            let path = src.source.split(['?', '#']).next().unwrap_or(&src.source);
            ImageFormat::from_path(path).ok()
        })
    }
}

impl DecodeStrategy for HintedDecode {
    fn name(&self) -> &'static str {
        "hinted"
    }

    fn decode(&self, src: &SourceBytes) -> FramecutResult<RgbaImage> {
        let format = Self::format_hint(src)
            .ok_or_else(|| FramecutError::decode("no content type or extension hint"))?;
        let img = image::load_from_memory_with_format(&src.bytes, format)
            .map_err(|e| FramecutError::decode(format!("{format:?} decode failed: {e}")))?;
        Ok(img.to_rgba8())
    }
}

/// Sniffed decode first, then the hinted decode.
pub fn default_strategies() -> Vec<Box<dyn DecodeStrategy>> {
    vec![Box::new(SniffedDecode), Box::new(HintedDecode)]
}

/// Try `strategies` in order; the first one that yields non-zero dimensions wins.
pub fn decode_first(
    strategies: &[Box<dyn DecodeStrategy>],
    src: &SourceBytes,
) -> FramecutResult<RgbaImage> {
    let mut failures = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        match strategy.decode(src) {
            Ok(img) if img.width() > 0 && img.height() > 0 => {
                tracing::debug!(
                    strategy = strategy.name(),
                    width = img.width(),
                    height = img.height(),
                    "decoded source"
                );
                return Ok(img);
            }
            Ok(_) => failures.push(format!("{}: zero dimensions", strategy.name())),
            Err(e) => {
                tracing::debug!(strategy = strategy.name(), error = %e, "decode strategy failed");
                failures.push(format!("{}: {e}", strategy.name()));
            }
        }
    }
    Err(FramecutError::decode(format!(
        "no decode strategy produced a usable image for '{}' ({})",
        display_source(&src.source),
        failures.join("; ")
    )))
}

fn display_source(source: &str) -> &str {
    if source.starts_with("data:") {
        "data URL"
    } else {
        source
    }
}

#[cfg(test)]
#[path = "../../tests/unit/grid/decode.rs"]
mod tests;
