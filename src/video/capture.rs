use std::{io::Write as _, sync::Arc, time::Duration};

use anyhow::Context as _;

use crate::{
    encode::raster::{OutputFormat, encode_rgba8_into},
    foundation::{
        core::{Clock, SystemClock},
        error::{FramecutError, FramecutResult},
    },
    handles::{
        batch::HandleBatch,
        registry::{HandleRegistry, ResourceHandle},
    },
    video::{
        media::{MediaBackend, MediaElement, MediaLocator, VideoSource},
        seek::{DEFAULT_SEEK_TIMEOUT, drive_seek},
    },
};

/// Default quality for captured frames.
pub const DEFAULT_CAPTURE_QUALITY: f32 = 0.9;

/// Caller-facing options for a capture call.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptureOpts {
    /// Output encoding for every frame.
    pub format: OutputFormat,
    /// Quality in `[0, 1]` for lossy formats.
    pub quality: Option<f32>,
    /// Per-timestamp seek budget in milliseconds.
    pub seek_timeout_ms: u64,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: Some(DEFAULT_CAPTURE_QUALITY),
            seek_timeout_ms: DEFAULT_SEEK_TIMEOUT.as_millis() as u64,
        }
    }
}

impl CaptureOpts {
    /// Reject option combinations no call could satisfy.
    pub fn validate(&self) -> FramecutResult<()> {
        if let Some(q) = self.quality
            && !(q.is_finite() && (0.0..=1.0).contains(&q))
        {
            return Err(FramecutError::invalid_input(format!(
                "quality must be within [0, 1], got {q}"
            )));
        }
        if self.seek_timeout_ms == 0 {
            return Err(FramecutError::invalid_input(
                "seek_timeout_ms must be non-zero",
            ));
        }
        Ok(())
    }

    /// Seek budget as a [`Duration`].
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }
}

/// One encoded video frame.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    /// Requested time after clamping into `[0, duration]`.
    pub requested_time: f64,
    /// Playback position the frame was drawn at; may differ from the request by the decoder's
    /// seek granularity.
    pub actual_time: f64,
    /// Encoded bytes.
    pub data: Vec<u8>,
    /// Registry handle for `data`.
    pub handle: ResourceHandle,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

/// Result of one capture call.
#[derive(Debug)]
pub struct CaptureOutput {
    /// Frames in request order.
    pub frames: Vec<CapturedFrame>,
    /// Media duration in seconds; `0.0` when unknown or nothing was loaded.
    pub duration: f64,
    /// Native video width.
    pub width: u32,
    /// Native video height.
    pub height: u32,
    /// Handles for every frame.
    pub batch: HandleBatch,
}

impl CaptureOutput {
    /// Release every frame handle. Safe to call repeatedly.
    pub fn revoke(&self) -> usize {
        self.batch.revoke()
    }
}

/// Clamp a requested time into `[0, duration]`.
///
/// With an unknown or zero duration the request passes through unchanged (non-finite
/// requests still become `0.0`).
pub fn clamp_time(requested: f64, duration: f64) -> f64 {
    let t = if requested.is_finite() { requested } else { 0.0 };
    if duration.is_finite() && duration > 0.0 {
        t.clamp(0.0, duration)
    } else {
        t
    }
}

/// Captures encoded still frames from a video at requested timestamps.
pub struct FrameCapturer {
    backend: Arc<dyn MediaBackend>,
    registry: Arc<dyn HandleRegistry>,
    clock: Arc<dyn Clock>,
}

impl FrameCapturer {
    /// Capturer using wall-clock seek deadlines.
    pub fn new(backend: Arc<dyn MediaBackend>, registry: Arc<dyn HandleRegistry>) -> Self {
        Self {
            backend,
            registry,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Replace the clock seek deadlines are measured against.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seek to each of `times` in order and register one encoded frame per time.
    ///
    /// Any failure revokes the frames produced so far. A temporary file created for
    /// [`VideoSource::Bytes`] is removed regardless of outcome.
    #[tracing::instrument(skip(self, source, opts), fields(frames = times.len()))]
    pub fn capture_at_times(
        &self,
        source: &VideoSource,
        times: &[f64],
        opts: &CaptureOpts,
    ) -> FramecutResult<CaptureOutput> {
        let batch = HandleBatch::new(Arc::clone(&self.registry));
        if times.is_empty() {
            return Ok(CaptureOutput {
                frames: Vec::new(),
                duration: 0.0,
                width: 0,
                height: 0,
                batch,
            });
        }
        opts.validate()?;

        let (locator, temp) = materialize(source)?;
        let result = self.capture_from(&locator, times, opts, batch);
        if let Some(temp) = temp
            && let Err(err) = temp.close()
        {
            tracing::debug!(error = %err, "ignoring temporary source release failure");
        }
        result
    }

    fn capture_from(
        &self,
        locator: &MediaLocator,
        times: &[f64],
        opts: &CaptureOpts,
        batch: HandleBatch,
    ) -> FramecutResult<CaptureOutput> {
        let mut element = self.backend.open(locator)?;
        let meta = element.load()?;
        tracing::debug!(
            duration = meta.duration,
            width = meta.width,
            height = meta.height,
            "media metadata loaded"
        );

        match self.capture_loop(element.as_mut(), meta.duration, times, opts, &batch) {
            Ok(frames) => {
                tracing::info!(
                    frames = frames.len(),
                    duration = meta.duration,
                    format = %opts.format,
                    "captured frames"
                );
                Ok(CaptureOutput {
                    frames,
                    duration: meta.duration,
                    width: meta.width,
                    height: meta.height,
                    batch,
                })
            }
            Err(err) => {
                let released = batch.revoke();
                tracing::debug!(released, error = %err, "capture failed; released partial output");
                Err(err)
            }
        }
    }

    fn capture_loop(
        &self,
        element: &mut dyn MediaElement,
        duration: f64,
        times: &[f64],
        opts: &CaptureOpts,
        batch: &HandleBatch,
    ) -> FramecutResult<Vec<CapturedFrame>> {
        let timeout = opts.seek_timeout();
        let mut encoded = Vec::new();
        let mut frames = Vec::with_capacity(times.len());

        for (i, &requested) in times.iter().enumerate() {
            let target = clamp_time(requested, duration);
            drive_seek(element, target, self.clock.as_ref(), timeout)?;

            let canvas = element.draw_frame()?;
            encode_rgba8_into(&mut encoded, &canvas, opts.format, opts.quality)?;
            let handle = self
                .registry
                .register(&encoded, opts.format, &format!("frame-{i:03}"))?;
            batch.push(handle.clone());

            frames.push(CapturedFrame {
                requested_time: target,
                actual_time: element.current_time(),
                data: encoded.clone(),
                handle,
                width: canvas.width(),
                height: canvas.height(),
            });
        }
        Ok(frames)
    }
}

/// Resolve `source` to a locator, spilling in-memory bytes to a temporary file.
fn materialize(
    source: &VideoSource,
) -> FramecutResult<(MediaLocator, Option<tempfile::NamedTempFile>)> {
    match source {
        VideoSource::Path(p) => Ok((MediaLocator::Path(p.clone()), None)),
        VideoSource::Url(u) => {
            if u.trim().is_empty() {
                return Err(FramecutError::invalid_input("video url is empty"));
            }
            Ok((MediaLocator::Url(u.clone()), None))
        }
        VideoSource::Bytes { data, extension } => {
            if data.is_empty() {
                return Err(FramecutError::invalid_input("video bytes are empty"));
            }
            let suffix = extension
                .as_deref()
                .map(|e| format!(".{}", e.trim_start_matches('.')))
                .unwrap_or_default();
            let mut temp = tempfile::Builder::new()
                .prefix("framecut-src-")
                .suffix(&suffix)
                .tempfile()
                .context("failed to create temporary video source")?;
            temp.write_all(data)
                .and_then(|()| temp.flush())
                .context("failed to write temporary video source")?;
            Ok((MediaLocator::Path(temp.path().to_path_buf()), Some(temp)))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/capture.rs"]
mod tests;
