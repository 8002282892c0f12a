use std::{
    io::Cursor,
    sync::atomic::{AtomicUsize, Ordering},
};

use super::*;
use crate::{
    grid::{
        decode::SniffedDecode,
        fetch::{FetchedSource, SourceBytes},
    },
    handles::registry::MemoryRegistry,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn quadrant_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let px = match (x < width / 2, y < height / 2) {
            (true, true) => RED,
            (false, true) => GREEN,
            (true, false) => BLUE,
            (false, false) => WHITE,
        };
        image::Rgba(px)
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

struct StaticFetcher {
    status: u16,
    declared_len: Option<u64>,
    bytes: Vec<u8>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    fn ok(bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            declared_len: Some(bytes.len() as u64),
            bytes,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SourceFetcher for StaticFetcher {
    fn fetch(&self, _source: &str) -> FramecutResult<FetchedSource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedSource {
            status: self.status,
            content_length: self.declared_len,
            content_type: None,
            body: Box::new(Cursor::new(self.bytes.clone())),
        })
    }
}

struct CountingDecode {
    calls: Arc<AtomicUsize>,
}

impl DecodeStrategy for CountingDecode {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn decode(&self, src: &SourceBytes) -> FramecutResult<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SniffedDecode.decode(src)
    }
}

/// Memory registry whose `fail_at`-th registration (0-based) errors.
struct FlakyRegistry {
    inner: MemoryRegistry,
    registered: AtomicUsize,
    fail_at: usize,
}

impl HandleRegistry for FlakyRegistry {
    fn register(
        &self,
        bytes: &[u8],
        format: OutputFormat,
        label: &str,
    ) -> FramecutResult<ResourceHandle> {
        if self.registered.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(FramecutError::encode("registry is full"));
        }
        self.inner.register(bytes, format, label)
    }

    fn revoke(&self, handle: &ResourceHandle) -> FramecutResult<()> {
        self.inner.revoke(handle)
    }
}

fn slicer(fetcher: StaticFetcher) -> (GridSlicer, Arc<StaticFetcher>, Arc<MemoryRegistry>) {
    let fetcher = Arc::new(fetcher);
    let registry = Arc::new(MemoryRegistry::new());
    let slicer = GridSlicer::new(fetcher.clone(), registry.clone());
    (slicer, fetcher, registry)
}

fn decoded(registry: &MemoryRegistry, frame: &SlicedFrame) -> RgbaImage {
    let bytes = registry.resolve(&frame.handle).unwrap();
    image::load_from_memory(&bytes).unwrap().to_rgba8()
}

#[test]
fn two_by_two_grid_yields_quadrants() {
    let (slicer, _, registry) = slicer(StaticFetcher::ok(quadrant_png(10, 10)));
    let out = slicer
        .slice_to_outputs(
            "https://cdn.test/q.png",
            GridLayout { cols: 2, rows: 2 },
            4,
            &SliceOpts::default(),
        )
        .unwrap();

    assert_eq!((out.source_width, out.source_height), (10, 10));
    assert_eq!(out.frames.len(), 4);
    assert_eq!(registry.live_count(), 4);
    for (frame, colour) in out.frames.iter().zip([RED, GREEN, BLUE, WHITE]) {
        assert_eq!((frame.width, frame.height), (5, 5));
        let img = decoded(&registry, frame);
        assert_eq!(img.dimensions(), (5, 5));
        assert!(img.pixels().all(|p| p.0 == colour));
        assert_eq!(&*registry.resolve(&frame.handle).unwrap(), frame.data.as_slice());
    }
    assert_eq!(
        out.frames.iter().map(|f| f.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    assert_eq!(out.revoke(), 4);
    assert_eq!(registry.live_count(), 0);
    assert_eq!(out.revoke(), 0);
}

#[test]
fn slice_derives_layout_from_column_bounds() {
    let (slicer, _, _) = slicer(StaticFetcher::ok(quadrant_png(30, 20)));
    let out = slicer.slice("q.png", 5, &SliceOpts::default()).unwrap();
    assert_eq!(out.layout, GridLayout { cols: 3, rows: 2 });
    assert_eq!(out.frames.len(), 5);
    assert!(out.frames.iter().all(|f| (f.width, f.height) == (10, 10)));
}

#[test]
fn indices_past_the_grid_are_skipped() {
    let (slicer, _, registry) = slicer(StaticFetcher::ok(quadrant_png(8, 8)));
    let out = slicer
        .slice_to_outputs(
            "q.png",
            GridLayout { cols: 2, rows: 1 },
            5,
            &SliceOpts::default(),
        )
        .unwrap();
    assert_eq!(out.frames.len(), 2);
    assert_eq!(registry.live_count(), 2);
}

#[test]
fn invalid_input_fails_before_any_fetch() {
    let (slicer, fetcher, _) = slicer(StaticFetcher::ok(quadrant_png(4, 4)));
    let opts = SliceOpts::default();

    let err = slicer
        .slice_to_outputs("   ", GridLayout { cols: 2, rows: 2 }, 4, &opts)
        .unwrap_err();
    assert!(matches!(err, FramecutError::InvalidInput(_)));

    let err = slicer
        .slice_to_outputs("q.png", GridLayout { cols: 0, rows: 2 }, 4, &opts)
        .unwrap_err();
    assert!(matches!(err, FramecutError::InvalidInput(_)));

    let bad_quality = SliceOpts {
        quality: Some(1.5),
        ..SliceOpts::default()
    };
    let err = slicer
        .slice_to_outputs("q.png", GridLayout { cols: 2, rows: 2 }, 4, &bad_quality)
        .unwrap_err();
    assert!(matches!(err, FramecutError::InvalidInput(_)));

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn oversize_source_fails_without_decoding() {
    let calls = Arc::new(AtomicUsize::new(0));
    let png = quadrant_png(16, 16);
    let limit = png.len() as u64 - 1;
    let opts = SliceOpts {
        max_source_bytes: limit,
        ..SliceOpts::default()
    };

    for declared in [true, false] {
        let mut fetcher = StaticFetcher::ok(png.clone());
        if !declared {
            fetcher.declared_len = None;
        }
        let (slicer, _, registry) = slicer(fetcher);
        let slicer = slicer.with_decoders(vec![Box::new(CountingDecode {
            calls: calls.clone(),
        })]);

        let err = slicer
            .slice_to_outputs("q.png", GridLayout { cols: 2, rows: 2 }, 4, &opts)
            .unwrap_err();
        let msg = err.to_string();
        match err {
            FramecutError::ResourceTooLarge { size, limit: l } => {
                assert_eq!(l, limit);
                assert!(size > limit);
                assert!(msg.contains(&size.to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.live_count(), 0);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn non_success_status_reports_the_code() {
    let mut fetcher = StaticFetcher::ok(Vec::new());
    fetcher.status = 404;
    let (slicer, _, _) = slicer(fetcher);
    let err = slicer
        .slice("https://cdn.test/missing.png", 4, &SliceOpts::default())
        .unwrap_err();
    assert!(matches!(err, FramecutError::Fetch { status: 404, .. }));
}

#[test]
fn undecodable_source_is_a_decode_error() {
    let (slicer, _, registry) = slicer(StaticFetcher::ok(b"not an image".to_vec()));
    let err = slicer
        .slice("https://cdn.test/x", 4, &SliceOpts::default())
        .unwrap_err();
    assert!(matches!(err, FramecutError::Decode(_)));
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn mid_batch_failure_releases_every_handle() {
    let registry = Arc::new(FlakyRegistry {
        inner: MemoryRegistry::new(),
        registered: AtomicUsize::new(0),
        fail_at: 2,
    });
    let slicer = GridSlicer::new(
        Arc::new(StaticFetcher::ok(quadrant_png(10, 10))),
        registry.clone(),
    );

    let err = slicer
        .slice_to_outputs(
            "q.png",
            GridLayout { cols: 2, rows: 2 },
            4,
            &SliceOpts::default(),
        )
        .unwrap_err();
    assert!(matches!(err, FramecutError::Encode(_)));
    assert_eq!(registry.registered.load(Ordering::SeqCst), 3);
    assert_eq!(registry.inner.live_count(), 0);
}

#[test]
fn jpeg_output_honours_format() {
    let (slicer, _, registry) = slicer(StaticFetcher::ok(quadrant_png(12, 12)));
    let opts = SliceOpts {
        format: OutputFormat::Jpeg,
        quality: Some(0.8),
        ..SliceOpts::default()
    };
    let out = slicer.slice("q.png", 4, &opts).unwrap();
    for frame in &out.frames {
        assert_eq!(
            image::guess_format(&frame.data).unwrap(),
            image::ImageFormat::Jpeg
        );
        assert_eq!(registry.format_of(&frame.handle), Some(OutputFormat::Jpeg));
    }
}

#[test]
fn zero_count_emits_nothing() {
    let (slicer, _, registry) = slicer(StaticFetcher::ok(quadrant_png(4, 4)));
    let out = slicer
        .slice_to_outputs(
            "q.png",
            GridLayout { cols: 2, rows: 2 },
            0,
            &SliceOpts::default(),
        )
        .unwrap();
    assert!(out.frames.is_empty());
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn opts_deserialize_with_defaults() {
    let opts: SliceOpts = serde_json::from_str(r#"{ "format": "image/webp" }"#).unwrap();
    assert_eq!(opts.format, OutputFormat::Webp);
    assert_eq!(opts.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
    assert_eq!((opts.min_cols, opts.max_cols), (2, 4));
    opts.validate().unwrap();

    let bad = SliceOpts {
        min_cols: 5,
        max_cols: 4,
        ..SliceOpts::default()
    };
    assert!(bad.validate().is_err());
}
