#![allow(dead_code)]

use std::{io::{self, Write}, sync::Arc};

use parking_lot::Mutex;
use projectkit::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRecord {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub density_dpi: u32,
    pub flags: MirrorFlags,
    pub surface: Surface,
    pub released: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderLog {
    pub prepared: Option<EncoderConfig>,
    pub output_name: Option<String>,
    pub started: bool,
    pub stopped: bool,
    pub resets: usize,
}

#[derive(Default)]
pub struct Failures {
    pub open_projection: Option<PlatformError>,
    pub frame_sink: Option<PlatformError>,
    pub virtual_display: Option<PlatformError>,
    pub prepare: Option<PlatformError>,
    pub start: Option<PlatformError>,
    pub stop: Option<PlatformError>,
}

struct FakeSink {
    surface: Surface,
    handler: Option<FrameHandler>,
    closed: bool,
}

#[derive(Default)]
struct FakeState {
    consent_requests: Vec<ConsentRequest>,
    projections_opened: usize,
    projections_stopped: usize,
    mirrors: Vec<MirrorRecord>,
    sinks: Vec<Arc<Mutex<FakeSink>>>,
    sink_depths: Vec<usize>,
    encoders: Vec<Arc<Mutex<EncoderLog>>>,
    created_videos: Vec<String>,
    next_surface: u64,
    failures: Failures,
}

/// In-memory platform that records every call made into it
#[derive(Clone)]
pub struct FakePlatform {
    metrics: DisplayMetrics,
    state: Arc<Mutex<FakeState>>,
    store: Arc<dyn MediaStore>,
}

impl FakePlatform {
    pub fn new(metrics: DisplayMetrics) -> Self {
        let state = Arc::new(Mutex::new(FakeState::default()));
        Self {
            metrics,
            store: Arc::new(MemoryStore { state: state.clone() }),
            state,
        }
    }

    pub fn with_store(self, store: impl MediaStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
            ..self
        }
    }

    pub fn controller(&self, app_name: &str) -> ProjectionController {
        ProjectionController::new(Arc::new(self.clone()), ControllerConfig::new(app_name))
    }

    pub fn fail(&self, configure: impl FnOnce(&mut Failures)) {
        configure(&mut self.state.lock().failures);
    }

    pub fn consent_requests(&self) -> Vec<ConsentRequest> {
        self.state.lock().consent_requests.clone()
    }

    pub fn last_consent_request(&self) -> ConsentRequest {
        *self.state.lock().consent_requests.last().expect("no consent was requested")
    }

    pub fn projections_opened(&self) -> usize {
        self.state.lock().projections_opened
    }

    pub fn projections_stopped(&self) -> usize {
        self.state.lock().projections_stopped
    }

    pub fn mirrors(&self) -> Vec<MirrorRecord> {
        self.state.lock().mirrors.clone()
    }

    pub fn sink_depths(&self) -> Vec<usize> {
        self.state.lock().sink_depths.clone()
    }

    pub fn sink_closed(&self, index: usize) -> bool {
        self.state.lock().sinks[index].lock().closed
    }

    pub fn encoder_log(&self, index: usize) -> EncoderLog {
        self.state.lock().encoders[index].lock().clone()
    }

    pub fn encoder_count(&self) -> usize {
        self.state.lock().encoders.len()
    }

    pub fn created_videos(&self) -> Vec<String> {
        self.state.lock().created_videos.clone()
    }

    /// Hand a frame to the newest sink's handler. Returns false if no open sink had one.
    pub fn deliver_frame(&self, buffer: &[u8], pixel_stride: usize, row_stride: usize) -> bool {
        let sink = match self.state.lock().sinks.last() {
            Some(sink) => sink.clone(),
            None => return false,
        };
        let handler = {
            let mut sink = sink.lock();
            if sink.closed {
                return false;
            }
            sink.handler.take()
        };
        let Some(mut handler) = handler else {
            return false;
        };
        handler(RawFrame::new(buffer, pixel_stride, row_stride, self.metrics.width(), self.metrics.height()));
        let mut sink = sink.lock();
        if !sink.closed {
            sink.handler = Some(handler);
        }
        true
    }

    /// Deliver a frame from a separate thread, like a real image reader would
    pub fn deliver_frame_from_thread(&self, buffer: Vec<u8>, pixel_stride: usize, row_stride: usize) -> bool {
        let platform = self.clone();
        std::thread::spawn(move || platform.deliver_frame(&buffer, pixel_stride, row_stride))
            .join()
            .expect("delivery thread panicked")
    }

    fn next_surface(&self) -> Surface {
        let mut state = self.state.lock();
        state.next_surface += 1;
        Surface::from_raw(state.next_surface)
    }
}

impl Platform for FakePlatform {
    fn display_metrics(&self) -> DisplayMetrics {
        self.metrics
    }

    fn request_consent(&self, request: ConsentRequest) {
        self.state.lock().consent_requests.push(request);
    }

    fn open_projection(&self, _grant: &CaptureGrant) -> Result<Box<dyn Projection>, PlatformError> {
        let mut state = self.state.lock();
        if let Some(error) = state.failures.open_projection.clone() {
            return Err(error);
        }
        state.projections_opened += 1;
        Ok(Box::new(FakeProjection { state: self.state.clone(), stopped: false }))
    }

    fn create_frame_sink(&self, _width: u32, _height: u32, format: PixelFormat, max_images: usize) -> Result<Box<dyn FrameSink>, PlatformError> {
        assert_eq!(format, PixelFormat::Rgba8888);
        if let Some(error) = self.state.lock().failures.frame_sink.clone() {
            return Err(error);
        }
        let sink = Arc::new(Mutex::new(FakeSink {
            surface: self.next_surface(),
            handler: None,
            closed: false,
        }));
        let mut state = self.state.lock();
        state.sinks.push(sink.clone());
        state.sink_depths.push(max_images);
        Ok(Box::new(FakeSinkHandle { sink }))
    }

    fn create_encoder(&self) -> Box<dyn VideoEncoder> {
        let log = Arc::new(Mutex::new(EncoderLog::default()));
        self.state.lock().encoders.push(log.clone());
        Box::new(FakeEncoder {
            platform: self.clone(),
            log,
            output: None,
            surface: None,
        })
    }

    fn media_store(&self) -> &dyn MediaStore {
        self.store.as_ref()
    }
}

struct FakeProjection {
    state: Arc<Mutex<FakeState>>,
    stopped: bool,
}

impl Projection for FakeProjection {
    fn create_virtual_display(&mut self, name: &str, width: u32, height: u32, density_dpi: u32, flags: MirrorFlags, surface: Surface) -> Result<Box<dyn VirtualDisplay>, PlatformError> {
        let mut state = self.state.lock();
        if let Some(error) = state.failures.virtual_display.clone() {
            return Err(error);
        }
        state.mirrors.push(MirrorRecord {
            name: name.to_string(),
            width,
            height,
            density_dpi,
            flags,
            surface,
            released: false,
        });
        Ok(Box::new(FakeVirtualDisplay { state: self.state.clone(), index: state.mirrors.len() - 1 }))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.state.lock().projections_stopped += 1;
        }
    }
}

struct FakeVirtualDisplay {
    state: Arc<Mutex<FakeState>>,
    index: usize,
}

impl VirtualDisplay for FakeVirtualDisplay {
    fn release(&mut self) {
        let mut state = self.state.lock();
        assert!(!state.mirrors[self.index].released, "mirror released twice");
        state.mirrors[self.index].released = true;
    }
}

struct FakeSinkHandle {
    sink: Arc<Mutex<FakeSink>>,
}

impl FrameSink for FakeSinkHandle {
    fn surface(&self) -> Surface {
        self.sink.lock().surface
    }

    fn set_frame_handler(&mut self, handler: FrameHandler) {
        self.sink.lock().handler = Some(handler);
    }

    fn close(&mut self) {
        let mut sink = self.sink.lock();
        sink.closed = true;
        sink.handler = None;
    }
}

struct FakeEncoder {
    platform: FakePlatform,
    log: Arc<Mutex<EncoderLog>>,
    output: Option<OutputTarget>,
    surface: Option<Surface>,
}

impl FakeEncoder {
    fn failure(&self, pick: impl FnOnce(&Failures) -> Option<PlatformError>) -> Option<PlatformError> {
        pick(&self.platform.state.lock().failures)
    }
}

impl VideoEncoder for FakeEncoder {
    fn prepare(&mut self, config: &EncoderConfig, output: OutputTarget) -> Result<(), PlatformError> {
        if let Some(error) = self.failure(|failures| failures.prepare.clone()) {
            return Err(error);
        }
        self.surface = Some(self.platform.next_surface());
        let mut log = self.log.lock();
        log.prepared = Some(config.clone());
        log.output_name = Some(output.display_name().to_string());
        self.output = Some(output);
        Ok(())
    }

    fn input_surface(&self) -> Option<Surface> {
        self.surface
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        if let Some(error) = self.failure(|failures| failures.start.clone()) {
            return Err(error);
        }
        self.log.lock().started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        if let Some(error) = self.failure(|failures| failures.stop.clone()) {
            return Err(error);
        }
        if let Some(output) = self.output.as_mut() {
            output.writer().write_all(b"\0\0\0\x18ftypmp42")?;
            output.writer().flush()?;
        }
        self.log.lock().stopped = true;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), PlatformError> {
        self.output = None;
        self.surface = None;
        self.log.lock().resets += 1;
        Ok(())
    }
}

struct MemoryStore {
    state: Arc<Mutex<FakeState>>,
}

impl MediaStore for MemoryStore {
    fn create_video(&self, display_name: &str) -> Result<OutputTarget, PlatformError> {
        self.state.lock().created_videos.push(display_name.to_string());
        Ok(OutputTarget::new(display_name, Box::new(io::sink())))
    }
}

/// A frame buffer for `metrics` whose rows carry `padding_pixels` of padding
pub fn padded_frame(metrics: DisplayMetrics, pixel_stride: usize, padding_pixels: usize) -> (Vec<u8>, usize) {
    let row_stride = (metrics.width() as usize + padding_pixels) * pixel_stride;
    let mut buffer = vec![0u8; row_stride * metrics.height() as usize];
    for (y, row) in buffer.chunks_mut(row_stride).enumerate() {
        for (x, pixel) in row.chunks_mut(pixel_stride).enumerate() {
            let fill = if x < metrics.width() as usize { (x + y) as u8 } else { 0xEE };
            pixel.iter_mut().for_each(|byte| *byte = fill);
        }
    }
    (buffer, row_stride)
}

pub fn granted() -> ConsentResult {
    ConsentResult::granted(vec![0x5a, 0x01, 0x02])
}
