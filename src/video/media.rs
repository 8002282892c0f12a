use std::{path::PathBuf, time::Duration};

use image::RgbaImage;

use crate::foundation::error::FramecutResult;

/// Events a media element reports while a seek is in flight.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    /// Playback position moved to the requested time.
    Seeked,
    /// Data for the current position became available.
    LoadedData,
    /// A decoded frame for the current position is ready to draw.
    FrameReady,
    /// The element failed.
    Error(String),
}

/// Stream properties known once metadata has loaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaMetadata {
    /// Duration in seconds; `0.0` when unknown.
    pub duration: f64,
    /// Native frame width.
    pub width: u32,
    /// Native frame height.
    pub height: u32,
}

/// A loaded, seekable video stream with a single drawable current frame.
///
/// Event delivery is pull-based: [`MediaElement::next_event`] blocks for at most `timeout`
/// and returns `None` when nothing arrived. Events are only delivered between
/// [`MediaElement::listen`] and [`MediaElement::unlisten`].
pub trait MediaElement {
    /// Wait for metadata. Failure aborts before any capture.
    fn load(&mut self) -> FramecutResult<MediaMetadata>;

    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Whether the element reports [`MediaEvent::FrameReady`] after a seek lands.
    fn supports_frame_callback(&self) -> bool;

    /// Arm seek listeners.
    fn listen(&mut self);

    /// Disarm seek listeners; anything still pending is discarded.
    fn unlisten(&mut self);

    /// Start moving the playback position to `target` seconds.
    fn seek(&mut self, target: f64) -> FramecutResult<()>;

    /// Next event, or `None` once `timeout` elapses without one.
    fn next_event(&mut self, timeout: Duration) -> Option<MediaEvent>;

    /// Snapshot of the current frame at native size.
    fn draw_frame(&mut self) -> FramecutResult<RgbaImage>;
}

/// Where a media element reads its stream from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaLocator {
    /// Local file.
    Path(PathBuf),
    /// Remote resource.
    Url(String),
}

impl MediaLocator {
    /// Form passed to external tools.
    pub fn as_arg(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Path(p) => p.to_string_lossy(),
            Self::Url(u) => std::borrow::Cow::Borrowed(u.as_str()),
        }
    }
}

/// Opens media elements.
pub trait MediaBackend: Send + Sync {
    /// Create an element for `locator`. Loading happens later, in [`MediaElement::load`].
    fn open(&self, locator: &MediaLocator) -> FramecutResult<Box<dyn MediaElement>>;
}

/// Video input accepted by the frame capturer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VideoSource {
    /// Local file path.
    Path(PathBuf),
    /// Remote URL.
    Url(String),
    /// In-memory file contents, exposed to the backend through a temporary file.
    Bytes {
        /// Container bytes.
        data: Vec<u8>,
        /// File extension hint such as `mp4`, without the dot.
        extension: Option<String>,
    },
}

impl VideoSource {
    /// Classify a command-line style argument as a URL or a path.
    pub fn from_arg(arg: &str) -> Self {
        let lowered = arg.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            Self::Url(arg.to_string())
        } else {
            Self::Path(PathBuf::from(arg.strip_prefix("file://").unwrap_or(arg)))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/media.rs"]
mod tests;
