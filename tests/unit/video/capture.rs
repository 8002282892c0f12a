use std::{
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use image::RgbaImage;

use super::*;
use crate::{
    foundation::core::ManualClock,
    handles::registry::MemoryRegistry,
    video::media::{MediaEvent, MediaMetadata},
};

#[derive(Clone, Copy, PartialEq)]
enum SeekOutcome {
    Lands,
    Errors,
    Silent,
}

struct FakeBackend {
    duration: f64,
    fail_load: bool,
    /// Outcome for the n-th seek; seeks past the end land.
    outcomes: Vec<SeekOutcome>,
    clock: Arc<ManualClock>,
    opens: AtomicUsize,
    opened: Mutex<Vec<(MediaLocator, bool)>>,
}

impl FakeBackend {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            fail_load: false,
            outcomes: Vec::new(),
            clock: Arc::new(ManualClock::new()),
            opens: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }
}

impl MediaBackend for FakeBackend {
    fn open(&self, locator: &MediaLocator) -> FramecutResult<Box<dyn MediaElement>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let exists = match locator {
            MediaLocator::Path(p) => p.exists(),
            MediaLocator::Url(_) => false,
        };
        self.opened.lock().unwrap().push((locator.clone(), exists));
        Ok(Box::new(FakeElement {
            duration: self.duration,
            fail_load: self.fail_load,
            outcomes: self.outcomes.clone(),
            clock: self.clock.clone(),
            seeks: 0,
            current: 0.0,
            pending: None,
        }))
    }
}

struct FakeElement {
    duration: f64,
    fail_load: bool,
    outcomes: Vec<SeekOutcome>,
    clock: Arc<ManualClock>,
    seeks: usize,
    current: f64,
    pending: Option<(f64, SeekOutcome)>,
}

impl MediaElement for FakeElement {
    fn load(&mut self) -> FramecutResult<MediaMetadata> {
        if self.fail_load {
            return Err(FramecutError::media_load("unsupported container"));
        }
        Ok(MediaMetadata {
            duration: self.duration,
            width: 4,
            height: 2,
        })
    }

    fn current_time(&self) -> f64 {
        self.current
    }

    fn supports_frame_callback(&self) -> bool {
        false
    }

    fn listen(&mut self) {}

    fn unlisten(&mut self) {
        self.pending = None;
    }

    fn seek(&mut self, target: f64) -> FramecutResult<()> {
        let outcome = self
            .outcomes
            .get(self.seeks)
            .copied()
            .unwrap_or(SeekOutcome::Lands);
        self.seeks += 1;
        self.pending = Some((target, outcome));
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Option<MediaEvent> {
        match self.pending.take() {
            Some((target, SeekOutcome::Lands)) => {
                self.current = target;
                Some(MediaEvent::Seeked)
            }
            Some((_, SeekOutcome::Errors)) => Some(MediaEvent::Error("bad frame".to_string())),
            Some((_, SeekOutcome::Silent)) | None => {
                self.clock.advance(timeout);
                None
            }
        }
    }

    fn draw_frame(&mut self) -> FramecutResult<RgbaImage> {
        let shade = (self.current * 10.0) as u8;
        Ok(RgbaImage::from_pixel(4, 2, image::Rgba([shade, 0, 0, 255])))
    }
}

fn capturer(backend: Arc<FakeBackend>) -> (FrameCapturer, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new());
    let clock = backend.clock.clone();
    let capturer = FrameCapturer::new(backend, registry.clone()).with_clock(clock);
    (capturer, registry)
}

fn file_source() -> VideoSource {
    VideoSource::Path(PathBuf::from("clip.mp4"))
}

#[test]
fn clamp_time_respects_known_durations_only() {
    assert_eq!(clamp_time(12.0, 10.0), 10.0);
    assert_eq!(clamp_time(-1.0, 10.0), 0.0);
    assert_eq!(clamp_time(3.5, 10.0), 3.5);
    assert_eq!(clamp_time(12.0, 0.0), 12.0);
    assert_eq!(clamp_time(12.0, f64::NAN), 12.0);
    assert_eq!(clamp_time(f64::NAN, 10.0), 0.0);
    assert_eq!(clamp_time(f64::INFINITY, 10.0), 0.0);
}

#[test]
fn empty_times_never_open_the_media() {
    let backend = Arc::new(FakeBackend::new(10.0));
    let (capturer, registry) = capturer(backend.clone());

    let out = capturer
        .capture_at_times(&file_source(), &[], &CaptureOpts::default())
        .unwrap();
    assert!(out.frames.is_empty());
    assert_eq!(out.duration, 0.0);
    assert_eq!((out.width, out.height), (0, 0));
    assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn frames_follow_request_order_with_clamping() {
    let backend = Arc::new(FakeBackend::new(10.0));
    let (capturer, registry) = capturer(backend.clone());

    let out = capturer
        .capture_at_times(&file_source(), &[12.0, -1.0, 3.5], &CaptureOpts::default())
        .unwrap();
    assert_eq!(out.duration, 10.0);
    assert_eq!((out.width, out.height), (4, 2));
    assert_eq!(
        out.frames
            .iter()
            .map(|f| f.requested_time)
            .collect::<Vec<_>>(),
        vec![10.0, 0.0, 3.5]
    );
    for frame in &out.frames {
        assert_eq!(frame.actual_time, frame.requested_time);
        assert_eq!((frame.width, frame.height), (4, 2));
        assert_eq!(
            image::guess_format(&frame.data).unwrap(),
            image::ImageFormat::Jpeg
        );
    }
    assert_eq!(registry.live_count(), 3);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);

    assert_eq!(out.revoke(), 3);
    assert_eq!(out.revoke(), 0);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn unknown_duration_leaves_requests_unclamped() {
    let backend = Arc::new(FakeBackend::new(0.0));
    let (capturer, _) = capturer(backend);
    let out = capturer
        .capture_at_times(&file_source(), &[12.0], &CaptureOpts::default())
        .unwrap();
    assert_eq!(out.frames[0].requested_time, 12.0);
}

#[test]
fn seek_error_mid_batch_releases_earlier_frames() {
    let mut backend = FakeBackend::new(10.0);
    backend.outcomes = vec![SeekOutcome::Lands, SeekOutcome::Lands, SeekOutcome::Errors];
    let (capturer, registry) = capturer(Arc::new(backend));

    let err = capturer
        .capture_at_times(
            &file_source(),
            &[1.0, 2.0, 3.0, 4.0],
            &CaptureOpts::default(),
        )
        .unwrap_err();
    assert!(matches!(err, FramecutError::Seek { .. }));
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn seek_timeout_mid_batch_releases_earlier_frames() {
    let mut backend = FakeBackend::new(10.0);
    backend.outcomes = vec![SeekOutcome::Lands, SeekOutcome::Silent];
    let backend = Arc::new(backend);
    let (capturer, registry) = capturer(backend.clone());

    let err = capturer
        .capture_at_times(&file_source(), &[1.0, 2.0], &CaptureOpts::default())
        .unwrap_err();
    assert!(matches!(
        err,
        FramecutError::SeekTimeout {
            timeout_ms: 2500,
            ..
        }
    ));
    assert_eq!(backend.clock.now(), DEFAULT_SEEK_TIMEOUT);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn load_failure_aborts_before_capture() {
    let mut backend = FakeBackend::new(10.0);
    backend.fail_load = true;
    let (capturer, registry) = capturer(Arc::new(backend));

    let err = capturer
        .capture_at_times(&file_source(), &[1.0], &CaptureOpts::default())
        .unwrap_err();
    assert!(matches!(err, FramecutError::MediaLoad(_)));
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn byte_sources_use_a_temporary_file_that_is_always_removed() {
    for outcomes in [vec![], vec![SeekOutcome::Errors]] {
        let mut backend = FakeBackend::new(10.0);
        backend.outcomes = outcomes.clone();
        let backend = Arc::new(backend);
        let (capturer, _) = capturer(backend.clone());

        let source = VideoSource::Bytes {
            data: b"not really a video".to_vec(),
            extension: Some("mp4".to_string()),
        };
        let res = capturer.capture_at_times(&source, &[1.0], &CaptureOpts::default());
        assert_eq!(res.is_ok(), outcomes.is_empty());

        let opened = backend.opened.lock().unwrap();
        let (locator, existed) = &opened[0];
        let MediaLocator::Path(path) = locator else {
            panic!("expected a path locator");
        };
        assert!(*existed);
        assert_eq!(path.extension().unwrap(), "mp4");
        assert!(!path.exists());
    }
}

#[test]
fn empty_inputs_are_rejected() {
    let backend = Arc::new(FakeBackend::new(10.0));
    let (capturer, _) = capturer(backend.clone());
    let opts = CaptureOpts::default();

    let empty_bytes = VideoSource::Bytes {
        data: Vec::new(),
        extension: None,
    };
    assert!(matches!(
        capturer.capture_at_times(&empty_bytes, &[1.0], &opts),
        Err(FramecutError::InvalidInput(_))
    ));
    assert!(matches!(
        capturer.capture_at_times(&VideoSource::Url(" ".to_string()), &[1.0], &opts),
        Err(FramecutError::InvalidInput(_))
    ));
    assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
}

#[test]
fn opts_defaults_and_validation() {
    let opts: CaptureOpts = serde_json::from_str("{}").unwrap();
    assert_eq!(opts, CaptureOpts::default());
    assert_eq!(opts.format, OutputFormat::Jpeg);
    assert_eq!(opts.quality, Some(0.9));
    assert_eq!(opts.seek_timeout(), DEFAULT_SEEK_TIMEOUT);

    let bad = CaptureOpts {
        seek_timeout_ms: 0,
        ..CaptureOpts::default()
    };
    assert!(bad.validate().is_err());
    let bad = CaptureOpts {
        quality: Some(-0.1),
        ..CaptureOpts::default()
    };
    assert!(bad.validate().is_err());
}
