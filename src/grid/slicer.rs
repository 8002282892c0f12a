use std::sync::Arc;

use image::RgbaImage;

use crate::{
    encode::raster::{OutputFormat, encode_rgba8_into},
    foundation::{
        core::MIB,
        error::{FramecutError, FramecutResult},
    },
    grid::{
        decode::{DecodeStrategy, decode_first, default_strategies},
        fetch::{DEFAULT_HTTP_TIMEOUT, DefaultFetcher, SourceFetcher},
        layout::{
            CellRect, DEFAULT_MAX_COLS, DEFAULT_MIN_COLS, GridLayout, cell_bounds, compute_layout,
        },
    },
    handles::{
        batch::HandleBatch,
        registry::{HandleRegistry, ResourceHandle},
    },
};

/// Default ceiling on the compressed source size.
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 30 * MIB;

/// Caller-facing options for a slicing call.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SliceOpts {
    /// Output encoding for every cell.
    pub format: OutputFormat,
    /// Quality in `[0, 1]` for lossy formats. Unset means the encoder default.
    pub quality: Option<f32>,
    /// Sources larger than this fail before decoding.
    pub max_source_bytes: u64,
    /// Lower column bound used by [`GridSlicer::slice`].
    pub min_cols: u32,
    /// Upper column bound used by [`GridSlicer::slice`].
    pub max_cols: u32,
}

impl Default for SliceOpts {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            quality: None,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            min_cols: DEFAULT_MIN_COLS,
            max_cols: DEFAULT_MAX_COLS,
        }
    }
}

impl SliceOpts {
    /// Reject option combinations no call could satisfy.
    pub fn validate(&self) -> FramecutResult<()> {
        if let Some(q) = self.quality
            && !(q.is_finite() && (0.0..=1.0).contains(&q))
        {
            return Err(FramecutError::invalid_input(format!(
                "quality must be within [0, 1], got {q}"
            )));
        }
        if self.max_source_bytes == 0 {
            return Err(FramecutError::invalid_input(
                "max_source_bytes must be non-zero",
            ));
        }
        if self.min_cols == 0 || self.max_cols < self.min_cols {
            return Err(FramecutError::invalid_input(format!(
                "column bounds must satisfy 1 <= min_cols <= max_cols, got {}..={}",
                self.min_cols, self.max_cols
            )));
        }
        Ok(())
    }
}

/// One encoded grid cell.
#[derive(Clone, Debug)]
pub struct SlicedFrame {
    /// 0-based cell ordinal, row-major.
    pub index: u32,
    /// Encoded bytes.
    pub data: Vec<u8>,
    /// Registry handle for `data`.
    pub handle: ResourceHandle,
    /// Cell width in pixels.
    pub width: u32,
    /// Cell height in pixels.
    pub height: u32,
}

/// Result of one slicing call.
#[derive(Debug)]
pub struct SliceOutput {
    /// Emitted cells in index order.
    pub frames: Vec<SlicedFrame>,
    /// Grid the cells were cut from.
    pub layout: GridLayout,
    /// Decoded source width.
    pub source_width: u32,
    /// Decoded source height.
    pub source_height: u32,
    /// Handles for every emitted cell.
    pub batch: HandleBatch,
}

impl SliceOutput {
    /// Release every cell handle. Safe to call repeatedly.
    pub fn revoke(&self) -> usize {
        self.batch.revoke()
    }
}

/// Offscreen RGBA canvas whose allocation is reused across cells.
#[derive(Default)]
struct Canvas {
    img: RgbaImage,
}

impl Canvas {
    /// Resize to exactly `rect` and copy that region of `src` in.
    fn draw_region(&mut self, src: &RgbaImage, rect: CellRect) -> FramecutResult<&RgbaImage> {
        let src_w = src.width() as usize;
        let (x, y) = (rect.x as usize, rect.y as usize);
        let (w, h) = (rect.width as usize, rect.height as usize);
        let raw = src.as_raw();

        let mut buf = std::mem::take(&mut self.img).into_raw();
        buf.clear();
        buf.reserve(w * h * 4);
        for row in y..y + h {
            let start = (row * src_w + x) * 4;
            let line = raw.get(start..start + w * 4).ok_or_else(|| {
                FramecutError::encode(format!("cell {rect:?} lies outside the source"))
            })?;
            buf.extend_from_slice(line);
        }

        self.img = RgbaImage::from_raw(rect.width, rect.height, buf)
            .ok_or_else(|| FramecutError::encode("canvas buffer size mismatch"))?;
        Ok(&self.img)
    }
}

/// Cuts a fetched image into grid cells and registers each cell as an output resource.
pub struct GridSlicer {
    fetcher: Arc<dyn SourceFetcher>,
    registry: Arc<dyn HandleRegistry>,
    decoders: Vec<Box<dyn DecodeStrategy>>,
}

impl GridSlicer {
    /// Slicer with the default decode chain.
    pub fn new(fetcher: Arc<dyn SourceFetcher>, registry: Arc<dyn HandleRegistry>) -> Self {
        Self {
            fetcher,
            registry,
            decoders: default_strategies(),
        }
    }

    /// Slicer using [`DefaultFetcher`] with the default HTTP timeout.
    pub fn with_default_fetcher(registry: Arc<dyn HandleRegistry>) -> FramecutResult<Self> {
        let fetcher = DefaultFetcher::new(DEFAULT_HTTP_TIMEOUT)?;
        Ok(Self::new(Arc::new(fetcher), registry))
    }

    /// Replace the ordered decode chain.
    pub fn with_decoders(mut self, decoders: Vec<Box<dyn DecodeStrategy>>) -> Self {
        self.decoders = decoders;
        self
    }

    /// Compute the layout for `count` from the column bounds in `opts`, then slice.
    pub fn slice(
        &self,
        source_url: &str,
        count: u32,
        opts: &SliceOpts,
    ) -> FramecutResult<SliceOutput> {
        let layout = compute_layout(f64::from(count), opts.min_cols, opts.max_cols);
        self.slice_to_outputs(source_url, layout, count, opts)
    }

    /// Fetch `source_url`, cut cells `0..count` of `layout`, and register each one.
    ///
    /// Indices past `layout.cols * layout.rows` are skipped. On failure every handle registered
    /// by this call is revoked before the error is returned.
    #[tracing::instrument(skip(self, opts), fields(cols = layout.cols, rows = layout.rows))]
    pub fn slice_to_outputs(
        &self,
        source_url: &str,
        layout: GridLayout,
        count: u32,
        opts: &SliceOpts,
    ) -> FramecutResult<SliceOutput> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(FramecutError::invalid_input("source url is empty"));
        }
        if layout.cols == 0 || layout.rows == 0 {
            return Err(FramecutError::invalid_input(format!(
                "grid must be at least 1x1, got {}x{}",
                layout.cols, layout.rows
            )));
        }
        opts.validate()?;

        let fetched = self.fetcher.fetch(source_url)?;
        let src = fetched.read_bounded(source_url, opts.max_source_bytes)?;
        let decoded = decode_first(&self.decoders, &src)?;
        drop(src);

        let (source_width, source_height) = decoded.dimensions();
        let batch = HandleBatch::new(Arc::clone(&self.registry));
        let rendered = self.render_cells(&decoded, layout, count, opts, &batch);
        drop(decoded);

        match rendered {
            Ok(frames) => {
                tracing::info!(
                    frames = frames.len(),
                    source_width,
                    source_height,
                    format = %opts.format,
                    "sliced grid"
                );
                Ok(SliceOutput {
                    frames,
                    layout,
                    source_width,
                    source_height,
                    batch,
                })
            }
            Err(err) => {
                let released = batch.revoke();
                tracing::debug!(released, error = %err, "slicing failed; released partial output");
                Err(err)
            }
        }
    }

    fn render_cells(
        &self,
        src: &RgbaImage,
        layout: GridLayout,
        count: u32,
        opts: &SliceOpts,
        batch: &HandleBatch,
    ) -> FramecutResult<Vec<SlicedFrame>> {
        let (width, height) = src.dimensions();
        let mut canvas = Canvas::default();
        let mut encoded = Vec::new();
        let mut frames = Vec::new();

        for index in 0..count {
            let Some(rect) = cell_bounds(index, layout.cols, layout.rows, width, height) else {
                continue;
            };
            let cell = canvas.draw_region(src, rect)?;
            encode_rgba8_into(&mut encoded, cell, opts.format, opts.quality)?;

            let handle = self
                .registry
                .register(&encoded, opts.format, &format!("cell-{index:03}"))?;
            batch.push(handle.clone());
            frames.push(SlicedFrame {
                index,
                data: encoded.clone(),
                handle,
                width: rect.width,
                height: rect.height,
            });
        }
        Ok(frames)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/grid/slicer.rs"]
mod tests;
