#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use ui_target_core::cache::Clock;
use ui_target_core::config::{Config, Timeouts};
use ui_target_core::geometry::{Point, Quad, Rect};
use ui_target_core::optical::{OpticalEngine, TextRecognizer, TextRegion};
use ui_target_core::{AppError, DeviceChannel, ElementService, Result, Settings};

pub fn dump(nodes: &str) -> String {
    format!(
        "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\
         <hierarchy rotation=\"0\">\
         <node index=\"0\" text=\"\" resource-id=\"\" class=\"android.widget.FrameLayout\" \
         content-desc=\"\" clickable=\"false\" enabled=\"true\" bounds=\"[0,0][1080,2400]\">\
         {nodes}</node></hierarchy>"
    )
}

pub fn submit_dump() -> String {
    dump(
        "<node index=\"0\" text=\"Submit\" resource-id=\"com.app:id/submit\" \
         class=\"android.widget.Button\" content-desc=\"\" clickable=\"true\" \
         enabled=\"true\" bounds=\"[10,20][110,70]\" />",
    )
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 30, 30, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Clock that only moves when told to.
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock to `secs` seconds after its creation.
    pub fn set_secs(&self, secs: u64) {
        *self.offset.lock().unwrap() = Duration::from_secs(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }
}

/// Scripted device: serves a fixed dump (or fails) and records taps.
pub struct FakeChannel {
    pub dump: Mutex<Option<String>>,
    pub screenshot: Vec<u8>,
    pub dumps: AtomicUsize,
    pub screenshots: AtomicUsize,
    pub taps: Mutex<Vec<(Option<String>, i32, i32)>>,
}

impl FakeChannel {
    pub fn with_dump(dump: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            dump: Mutex::new(Some(dump.into())),
            screenshot: png(200, 200),
            dumps: AtomicUsize::new(0),
            screenshots: AtomicUsize::new(0),
            taps: Mutex::new(Vec::new()),
        })
    }

    /// A device whose hierarchy dump always fails.
    pub fn broken_tree() -> Arc<Self> {
        let channel = Self::with_dump("");
        *channel.dump.lock().unwrap() = None;
        channel
    }

    pub fn set_dump(&self, dump: impl Into<String>) {
        *self.dump.lock().unwrap() = Some(dump.into());
    }

    pub fn dump_count(&self) -> usize {
        self.dumps.load(Ordering::SeqCst)
    }

    pub fn taps(&self) -> Vec<(Option<String>, i32, i32)> {
        self.taps.lock().unwrap().clone()
    }
}

impl DeviceChannel for FakeChannel {
    fn dump_tree(&self, _device: Option<&str>, _timeouts: &Timeouts) -> Result<String> {
        self.dumps.fetch_add(1, Ordering::SeqCst);
        self.dump
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::capture("uiautomator dump failed"))
    }

    fn capture_screenshot(&self, _device: Option<&str>, _timeout: Duration) -> Result<Vec<u8>> {
        self.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(self.screenshot.clone())
    }

    fn send_tap(&self, device: Option<&str>, x: i32, y: i32) -> Result<()> {
        self.taps
            .lock()
            .unwrap()
            .push((device.map(str::to_string), x, y));
        Ok(())
    }
}

/// Recognizer returning the same regions for every image.
pub struct FakeRecognizer {
    pub regions: Vec<TextRegion>,
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> Result<Vec<TextRegion>> {
        Ok(self.regions.clone())
    }
}

pub fn region(text: &str, confidence: f32, rect: Rect) -> TextRegion {
    TextRegion {
        text: text.to_string(),
        confidence,
        quad: Quad::from_rect(rect),
    }
}

pub fn recognizer(regions: Vec<TextRegion>) -> Arc<OpticalEngine> {
    Arc::new(OpticalEngine::with_recognizer(Box::new(FakeRecognizer { regions })))
}

pub fn unavailable_optical() -> Arc<OpticalEngine> {
    Arc::new(OpticalEngine::new(|| {
        Err(AppError::unavailable("no OCR backend installed"))
    }))
}

/// Routes library logs into the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ui_target_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn service(
    channel: Arc<FakeChannel>,
    optical: Arc<OpticalEngine>,
) -> (ElementService, Arc<ManualClock>) {
    service_with(channel, optical, Config::default())
}

pub fn service_with(
    channel: Arc<FakeChannel>,
    optical: Arc<OpticalEngine>,
    config: Config,
) -> (ElementService, Arc<ManualClock>) {
    init_tracing();
    let clock = Arc::new(ManualClock::new());
    let service = ElementService::with_clock(
        channel,
        optical,
        &config,
        Settings::default(),
        clock.clone(),
    );
    (service, clock)
}

pub fn center(x: i32, y: i32) -> Point {
    Point::new(x, y)
}
