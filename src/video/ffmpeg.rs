//! Media backend driving the system `ffprobe`/`ffmpeg` binaries.
//!
//! Loading runs `ffprobe`; each seek decodes a single RGBA frame in a child `ffmpeg` process
//! whose output is collected on a worker thread and reported back as `Seeked` followed by
//! `FrameReady`. Requires the `media-ffmpeg` feature.

use crate::{
    foundation::error::FramecutResult,
    video::media::{MediaBackend, MediaElement, MediaLocator},
};

/// Backend built on the system `ffprobe` and `ffmpeg` binaries.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Whether both `ffmpeg` and `ffprobe` can be spawned.
    pub fn tools_available() -> bool {
        ["ffmpeg", "ffprobe"].iter().all(|tool| {
            std::process::Command::new(tool)
                .arg("-version")
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }
}

#[cfg(feature = "media-ffmpeg")]
impl MediaBackend for FfmpegBackend {
    fn open(&self, locator: &MediaLocator) -> FramecutResult<Box<dyn MediaElement>> {
        Ok(Box::new(imp::FfmpegMedia::new(locator)))
    }
}

#[cfg(not(feature = "media-ffmpeg"))]
impl MediaBackend for FfmpegBackend {
    fn open(&self, _locator: &MediaLocator) -> FramecutResult<Box<dyn MediaElement>> {
        Err(crate::foundation::error::FramecutError::media_load(
            "video capture requires the 'media-ffmpeg' feature",
        ))
    }
}

#[cfg(feature = "media-ffmpeg")]
mod imp {
    use std::{
        collections::VecDeque,
        io::Read as _,
        process::{Child, Command, Stdio},
        sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
        time::{Duration, Instant},
    };

    use image::RgbaImage;

    use crate::{
        foundation::error::{FramecutError, FramecutResult},
        video::media::{MediaElement, MediaEvent, MediaLocator, MediaMetadata},
    };

    pub(super) struct Probe {
        pub(super) meta: MediaMetadata,
        pub(super) fps: Option<(u32, u32)>,
    }

    pub(super) fn probe(input: &str) -> FramecutResult<Probe> {
        #[derive(serde::Deserialize)]
        struct ProbeStream {
            codec_type: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            r_frame_rate: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct ProbeOut {
            streams: Vec<ProbeStream>,
            format: Option<ProbeFormat>,
        }

        let out = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FramecutError::media_load(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(FramecutError::media_load(format!(
                "ffprobe failed for '{input}': {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
            .map_err(|e| FramecutError::media_load(format!("ffprobe json parse failed: {e}")))?;
        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| FramecutError::media_load("no video stream found"))?;
        let width = video
            .width
            .ok_or_else(|| FramecutError::media_load("missing video width from ffprobe"))?;
        let height = video
            .height
            .ok_or_else(|| FramecutError::media_load("missing video height from ffprobe"))?;
        let duration = parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_ref())
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);

        Ok(Probe {
            meta: MediaMetadata {
                duration,
                width,
                height,
            },
            fps: video.r_frame_rate.as_deref().and_then(parse_ff_ratio),
        })
    }

    pub(super) fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
        let mut parts = s.split('/');
        let a = parts.next()?.parse::<u32>().ok()?;
        let b = parts.next()?.parse::<u32>().ok()?;
        if a == 0 || b == 0 {
            return None;
        }
        Some((a, b))
    }

    /// Last decodable position for `target`: a seek to the very end yields no frame, so
    /// targets are held one frame interval short of the duration.
    pub(super) fn decodable_time(target: f64, duration: f64, fps: Option<(u32, u32)>) -> f64 {
        if duration <= 0.0 {
            return target.max(0.0);
        }
        let interval = fps
            .map(|(num, den)| f64::from(den) / f64::from(num))
            .unwrap_or(1.0 / 30.0);
        target.min((duration - interval).max(0.0)).max(0.0)
    }

    struct Decoded {
        generation: u64,
        time: f64,
        result: Result<Vec<u8>, String>,
    }

    pub(super) struct FfmpegMedia {
        input: String,
        probe: Option<Probe>,
        current_time: f64,
        frame: Option<Vec<u8>>,
        generation: u64,
        listening: bool,
        pending: VecDeque<MediaEvent>,
        tx: Sender<Decoded>,
        rx: Receiver<Decoded>,
        inflight: Option<Child>,
    }

    impl FfmpegMedia {
        pub(super) fn new(locator: &MediaLocator) -> Self {
            let (tx, rx) = mpsc::channel();
            Self {
                input: locator.as_arg().into_owned(),
                probe: None,
                current_time: 0.0,
                frame: None,
                generation: 0,
                listening: false,
                pending: VecDeque::new(),
                tx,
                rx,
                inflight: None,
            }
        }

        fn kill_inflight(&mut self) {
            if let Some(mut child) = self.inflight.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        fn accept(&mut self, decoded: Decoded) -> MediaEvent {
            self.kill_inflight();
            match decoded.result {
                Ok(bytes) => {
                    self.frame = Some(bytes);
                    self.current_time = decoded.time;
                    self.pending.push_back(MediaEvent::FrameReady);
                    MediaEvent::Seeked
                }
                Err(reason) => MediaEvent::Error(reason),
            }
        }
    }

    impl MediaElement for FfmpegMedia {
        fn load(&mut self) -> FramecutResult<MediaMetadata> {
            let probe = probe(&self.input)?;
            let meta = probe.meta;
            self.probe = Some(probe);
            Ok(meta)
        }

        fn current_time(&self) -> f64 {
            self.current_time
        }

        fn supports_frame_callback(&self) -> bool {
            true
        }

        fn listen(&mut self) {
            self.listening = true;
            self.pending.clear();
        }

        fn unlisten(&mut self) {
            self.listening = false;
            self.generation += 1;
            self.pending.clear();
            self.kill_inflight();
        }

        fn seek(&mut self, target: f64) -> FramecutResult<()> {
            let probe = self
                .probe
                .as_ref()
                .ok_or_else(|| FramecutError::seek(target, "media is not loaded"))?;
            let (width, height) = (probe.meta.width, probe.meta.height);
            let time = decodable_time(target, probe.meta.duration, probe.fps);
            let expected_len = width as usize * height as usize * 4;
            if expected_len == 0 {
                return Err(FramecutError::seek(
                    target,
                    "video has zero-sized frames (invalid source dimensions)",
                ));
            }

            self.kill_inflight();
            self.generation += 1;
            let generation = self.generation;

            let ss = format!("{time:.6}");
            let mut child = Command::new("ffmpeg")
                .args(["-v", "error", "-ss", ss.as_str()])
                .arg("-i")
                .arg(&self.input)
                .args([
                    "-frames:v", "1", "-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1",
                ])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| FramecutError::seek(target, format!("failed to spawn ffmpeg: {e}")))?;
            let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
            else {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FramecutError::seek(target, "failed to open ffmpeg pipes"));
            };
            self.inflight = Some(child);

            let tx = self.tx.clone();
            std::thread::spawn(move || {
                let mut frame = Vec::with_capacity(expected_len);
                let read = stdout.read_to_end(&mut frame);
                let mut err_text = String::new();
                let _ = stderr.read_to_string(&mut err_text);

                let result = match read {
                    Ok(_) if frame.len() >= expected_len => {
                        frame.truncate(expected_len);
                        Ok(frame)
                    }
                    Ok(_) if err_text.trim().is_empty() => {
                        Err(format!("ffmpeg decoded no frame at {time:.3}s"))
                    }
                    Ok(_) => Err(err_text.trim().to_string()),
                    Err(e) => Err(format!("failed reading ffmpeg output: {e}")),
                };
                // The receiver is gone once the element is dropped.
                let _ = tx.send(Decoded {
                    generation,
                    time,
                    result,
                });
            });
            Ok(())
        }

        fn next_event(&mut self, timeout: Duration) -> Option<MediaEvent> {
            if !self.listening {
                return None;
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.rx.recv_timeout(remaining) {
                    Ok(decoded) if decoded.generation != self.generation => {
                        tracing::debug!(
                            generation = decoded.generation,
                            "dropping stale ffmpeg frame"
                        );
                    }
                    Ok(decoded) => return Some(self.accept(decoded)),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                        return None;
                    }
                }
            }
        }

        fn draw_frame(&mut self) -> FramecutResult<RgbaImage> {
            let (width, height) = self
                .probe
                .as_ref()
                .map(|p| (p.meta.width, p.meta.height))
                .unwrap_or((0, 0));
            let bytes = self
                .frame
                .clone()
                .ok_or_else(|| FramecutError::decode("no decoded video frame to draw"))?;
            RgbaImage::from_raw(width, height, bytes).ok_or_else(|| {
                FramecutError::decode(format!(
                    "decoded frame does not match {width}x{height} rgba"
                ))
            })
        }
    }

    impl Drop for FfmpegMedia {
        fn drop(&mut self) {
            self.kill_inflight();
        }
    }
}

#[cfg(all(test, feature = "media-ffmpeg"))]
#[path = "../../tests/unit/video/ffmpeg.rs"]
mod tests;
