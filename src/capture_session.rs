//! One-shot still capture of the display.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{
    frame::{normalize, NormalizedImage, RawFrame},
    grant::{CaptureGrant, ConsentRequest, ConsentResult, ConsentRoutingError, GrantCache, RequestCode},
    mirror::{MirrorCreationError, MirrorFlags, MirrorSurfaceFactory, MirrorTarget, ProjectionHandle},
    platform::{FrameSink, PixelFormat, Platform},
    session::{completion_channel, resolved, Completion, CompletionSender, SessionError},
    util::DisplayMetrics,
};

pub const CAPTURE_DISPLAY_NAME: &str = "screenCapture";
pub const DEFAULT_CAPTURE_QUEUE_DEPTH: usize = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    AwaitingGrant,
    Active,
}

struct ActiveCapture {
    completion: CompletionSender<NormalizedImage>,
    metrics: DisplayMetrics,
    projection: ProjectionHandle,
    mirror: MirrorTarget,
    sink: Box<dyn FrameSink>,
}

enum CaptureStage {
    Idle,
    AwaitingGrant(CompletionSender<NormalizedImage>),
    Active(ActiveCapture),
}

struct CaptureInner {
    generation: u64,
    stage: CaptureStage,
    // A sink closed from inside its own frame handler is kept until the next
    // activation so it is never dropped while the handler runs.
    retired_sink: Option<Box<dyn FrameSink>>,
}

struct CaptureShared {
    platform: Arc<dyn Platform>,
    grants: GrantCache,
    queue_depth: usize,
    inner: Mutex<CaptureInner>,
}

/// Takes a single frame of the display per [`CaptureSession::start`]
pub struct CaptureSession {
    shared: Arc<CaptureShared>,
}

impl CaptureSession {
    pub fn new(platform: Arc<dyn Platform>, grants: GrantCache, queue_depth: usize) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                platform,
                grants,
                queue_depth: queue_depth.max(1),
                inner: Mutex::new(CaptureInner {
                    generation: 0,
                    stage: CaptureStage::Idle,
                    retired_sink: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        match self.shared.inner.lock().stage {
            CaptureStage::Idle => CaptureState::Idle,
            CaptureStage::AwaitingGrant(_) => CaptureState::AwaitingGrant,
            CaptureStage::Active(_) => CaptureState::Active,
        }
    }

    /// Start a capture. Resolves with the first frame the mirror delivers.
    ///
    /// Reuses the cached grant when there is one, otherwise asks the host for
    /// consent. Resolves with [`SessionError::Busy`] if a capture is already in
    /// flight.
    pub fn start(&self) -> Completion<NormalizedImage> {
        let (completion_tx, completion) = completion_channel();
        let consent_request = {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.stage, CaptureStage::Idle) {
                warn!("capture requested while another capture is in flight");
                return resolved(Err(SessionError::Busy));
            }
            inner.generation += 1;
            match self.shared.grants.get_cached() {
                Some(grant) => {
                    debug!(ticket = inner.generation, "capture reusing cached grant");
                    activate(&self.shared, &mut inner, completion_tx, grant, true);
                    None
                },
                None => {
                    inner.stage = CaptureStage::AwaitingGrant(completion_tx);
                    Some(ConsentRequest::new(RequestCode::Capture, inner.generation))
                },
            }
        };
        if let Some(request) = consent_request {
            debug!(ticket = request.ticket(), "capture requesting consent");
            self.shared.platform.request_consent(request);
        }
        completion
    }

    /// Route the host's answer to a consent request issued by this session
    pub fn deliver_consent(&self, request: ConsentRequest, result: ConsentResult) -> Result<(), ConsentRoutingError> {
        if request.code() != RequestCode::Capture {
            return Err(ConsentRoutingError::UnknownRequestCode(request.code().as_raw()));
        }
        let mut inner = self.shared.inner.lock();
        if inner.generation != request.ticket() {
            debug!(ticket = request.ticket(), current = inner.generation, "stale capture consent");
            return Err(ConsentRoutingError::Stale(request));
        }
        let completion = match std::mem::replace(&mut inner.stage, CaptureStage::Idle) {
            CaptureStage::AwaitingGrant(completion) => completion,
            other => {
                inner.stage = other;
                return Err(ConsentRoutingError::Stale(request));
            },
        };
        match result.into_grant() {
            Some(grant) => {
                self.shared.grants.store(grant.clone());
                activate(&self.shared, &mut inner, completion, grant, false);
            },
            None => {
                info!(ticket = request.ticket(), "capture consent denied");
                let _ = completion.send(Err(SessionError::PermissionDenied));
            },
        }
        Ok(())
    }
}

fn activate(shared: &Arc<CaptureShared>, inner: &mut CaptureInner, completion: CompletionSender<NormalizedImage>, grant: CaptureGrant, from_cache: bool) {
    inner.retired_sink.take();
    match open_mirror(shared, inner.generation, &grant) {
        Ok((metrics, projection, mirror, sink)) => {
            debug!(ticket = inner.generation, width = metrics.width(), height = metrics.height(), "capture active");
            inner.stage = CaptureStage::Active(ActiveCapture {
                completion,
                metrics,
                projection,
                mirror,
                sink,
            });
        },
        Err(error) => {
            if from_cache && matches!(error, MirrorCreationError::GrantRejected(_)) && shared.grants.invalidate_if(&grant) {
                info!("cached grant rejected, dropped from cache");
            }
            warn!(%error, "capture mirror creation failed");
            inner.stage = CaptureStage::Idle;
            let _ = completion.send(Err(error.into()));
        },
    }
}

fn open_mirror(
    shared: &Arc<CaptureShared>,
    generation: u64,
    grant: &CaptureGrant,
) -> Result<(DisplayMetrics, ProjectionHandle, MirrorTarget, Box<dyn FrameSink>), MirrorCreationError> {
    let metrics = shared.platform.display_metrics();
    let mut projection = ProjectionHandle::open(shared.platform.as_ref(), grant)?;
    let mut sink = shared.platform
        .create_frame_sink(metrics.width(), metrics.height(), PixelFormat::Rgba8888, shared.queue_depth)
        .map_err(MirrorCreationError::SinkUnavailable)?;

    let weak_shared: Weak<CaptureShared> = Arc::downgrade(shared);
    sink.set_frame_handler(Box::new(move |frame| {
        if let Some(shared) = weak_shared.upgrade() {
            shared.on_frame(generation, frame);
        }
    }));

    match MirrorSurfaceFactory::create(&mut projection, CAPTURE_DISPLAY_NAME, metrics, sink.surface(), MirrorFlags::CAPTURE) {
        Ok(mirror) => Ok((metrics, projection, mirror, sink)),
        Err(error) => {
            sink.close();
            Err(error)
        },
    }
}

impl CaptureShared {
    fn on_frame(&self, generation: u64, frame: RawFrame<'_>) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            trace!(generation, current = inner.generation, "dropping frame from an earlier capture");
            return;
        }
        let metrics = match &inner.stage {
            CaptureStage::Active(active) => active.metrics,
            _ => {
                trace!(generation, "dropping frame, capture already finished");
                return;
            },
        };
        let image = match normalize(&frame, metrics.width(), metrics.height()) {
            Ok(image) => image,
            Err(error) => {
                warn!(%error, pixel_stride = frame.pixel_stride, row_stride = frame.row_stride, "dropping malformed frame");
                return;
            },
        };
        let mut active = match std::mem::replace(&mut inner.stage, CaptureStage::Idle) {
            CaptureStage::Active(active) => active,
            other => {
                inner.stage = other;
                return;
            },
        };
        active.projection.stop();
        active.mirror.release();
        active.sink.close();
        inner.retired_sink = Some(active.sink);
        info!(generation, width = image.width(), height = image.height(), "captured display frame");
        let _ = active.completion.send(Ok(image));
    }
}

impl Drop for CaptureShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let CaptureStage::Active(active) = &mut inner.stage {
            debug!(generation = inner.generation, "capture dropped while active");
            active.projection.stop();
            active.mirror.release();
            active.sink.close();
        }
    }
}
