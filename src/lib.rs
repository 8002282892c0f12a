//! framecut cuts images into grids and captures still frames from video.
//!
//! Two independent pipelines share the same output model: every produced image is encoded,
//! registered with a [`HandleRegistry`] and returned together with a [`HandleBatch`] that
//! releases all of the call's handles at once.
//!
//! - [`GridSlicer`] fetches one source image, decodes it and renders each cell of a near-square
//!   grid ([`compute_layout`], [`cell_bounds`]).
//! - [`FrameCapturer`] loads a video through a [`MediaBackend`], seeks to each requested time
//!   and snapshots the frame. The bundled [`FfmpegBackend`] drives the system `ffprobe`/`ffmpeg`
//!   binaries and requires the `media-ffmpeg` feature.
//!
//! Every call is synchronous. Failures abort the call, revoke what it registered so far and
//! release its decode buffers; nothing is retried.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod encode;
mod foundation;
mod grid;
mod handles;
mod video;

pub use crate::foundation::core::{Clock, MIB, ManualClock, SystemClock};
pub use crate::foundation::error::{FramecutError, FramecutResult};

pub use crate::encode::raster::{
    DEFAULT_LOSSY_QUALITY, OutputFormat, encode_rgba8, encode_rgba8_into,
};
pub use crate::handles::batch::HandleBatch;
pub use crate::handles::registry::{DirRegistry, HandleRegistry, MemoryRegistry, ResourceHandle};

pub use crate::grid::decode::{
    DecodeStrategy, HintedDecode, SniffedDecode, decode_first, default_strategies,
};
pub use crate::grid::fetch::{
    DEFAULT_HTTP_TIMEOUT, DefaultFetcher, FetchedSource, SourceBytes, SourceFetcher,
};
pub use crate::grid::layout::{
    CellRect, DEFAULT_MAX_COLS, DEFAULT_MIN_COLS, GridLayout, cell_bounds, compute_layout,
};
pub use crate::grid::slicer::{
    DEFAULT_MAX_SOURCE_BYTES, GridSlicer, SliceOpts, SliceOutput, SlicedFrame,
};

pub use crate::video::capture::{
    CaptureOpts, CaptureOutput, CapturedFrame, DEFAULT_CAPTURE_QUALITY, FrameCapturer, clamp_time,
};
pub use crate::video::ffmpeg::FfmpegBackend;
pub use crate::video::media::{
    MediaBackend, MediaElement, MediaEvent, MediaLocator, MediaMetadata, VideoSource,
};
pub use crate::video::seek::{
    DEFAULT_SEEK_TIMEOUT, SEEK_EPSILON, SeekFailure, SeekMachine, SeekState, drive_seek,
};
