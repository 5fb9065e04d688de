use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::{
    capture_session::{CaptureSession, DEFAULT_CAPTURE_QUEUE_DEPTH},
    frame::NormalizedImage,
    grant::{ConsentRequest, ConsentResult, ConsentRoutingError, GrantCache, RequestCode},
    platform::Platform,
    recording_session::{local_clock, Clock, RecordingSession, RecordingStarted, RecordingStopped},
    session::{Completion, SessionError},
    util::ObservableFlag,
};

#[derive(Clone)]
pub struct ControllerConfig {
    pub(crate) app_name: String,
    pub(crate) capture_queue_depth: usize,
    pub(crate) clock: Clock,
}

impl ControllerConfig {
    /// `app_name` prefixes the name of every recording
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            capture_queue_depth: DEFAULT_CAPTURE_QUEUE_DEPTH,
            clock: local_clock(),
        }
    }

    /// Number of frames the capture sink may hold at once
    pub fn with_capture_queue_depth(self, capture_queue_depth: usize) -> Self {
        Self {
            capture_queue_depth,
            ..self
        }
    }

    /// Replace the local clock used to timestamp recording names
    pub fn with_clock(self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            ..self
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn capture_queue_depth(&self) -> usize {
        self.capture_queue_depth
    }
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("app_name", &self.app_name)
            .field("capture_queue_depth", &self.capture_queue_depth)
            .finish_non_exhaustive()
    }
}

/// Owns the capture and recording paths and the grant they share.
///
/// The two paths are independent and may run at the same time; each allows
/// one session in flight.
pub struct ProjectionController {
    grants: GrantCache,
    capture: CaptureSession,
    recording: RecordingSession,
}

impl ProjectionController {
    pub fn new(platform: Arc<dyn Platform>, config: ControllerConfig) -> Self {
        let grants = GrantCache::new();
        Self {
            capture: CaptureSession::new(platform.clone(), grants.clone(), config.capture_queue_depth),
            recording: RecordingSession::new(platform, grants.clone(), config.app_name, config.clock),
            grants,
        }
    }

    pub fn grants(&self) -> &GrantCache {
        &self.grants
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    pub fn recording(&self) -> &RecordingSession {
        &self.recording
    }

    pub fn screen_capture(&self) -> Completion<NormalizedImage> {
        self.capture.start()
    }

    pub fn start_recording(&self) -> Completion<RecordingStarted> {
        self.recording.start()
    }

    pub fn stop_recording(&self) -> Option<Result<RecordingStopped, SessionError>> {
        self.recording.stop()
    }

    pub fn is_recording(&self) -> &ObservableFlag {
        self.recording.is_recording()
    }

    /// Route a consent answer to the session that asked for it
    pub fn deliver_consent(&self, request: ConsentRequest, result: ConsentResult) -> Result<(), ConsentRoutingError> {
        let routed = match request.code() {
            RequestCode::Capture => self.capture.deliver_consent(request, result),
            RequestCode::Record => self.recording.deliver_consent(request, result),
        };
        if let Err(error) = &routed {
            warn!(%error, "consent answer not delivered");
        }
        routed
    }

    /// Route a consent answer identified by the raw request code the host received
    pub fn deliver_raw_consent(&self, request_code: i32, ticket: u64, result: ConsentResult) -> Result<(), ConsentRoutingError> {
        let code = RequestCode::from_raw(request_code).ok_or(ConsentRoutingError::UnknownRequestCode(request_code))?;
        self.deliver_consent(ConsentRequest::new(code, ticket), result)
    }
}
