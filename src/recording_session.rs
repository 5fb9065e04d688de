//! Continuous recording of the display into a surface-fed encoder.

use std::{path::PathBuf, sync::Arc};

use chrono::{Local, NaiveDateTime};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::{
    encoder::EncoderConfig,
    grant::{CaptureGrant, ConsentRequest, ConsentResult, ConsentRoutingError, GrantCache, RequestCode},
    mirror::{MirrorCreationError, MirrorFlags, MirrorSurfaceFactory, MirrorTarget, ProjectionHandle},
    platform::{Platform, PlatformError, VideoEncoder},
    session::{completion_channel, resolved, Completion, CompletionSender, SessionError, TeardownError, TeardownStep},
    util::{FlagNotification, ObservableFlag},
};

pub const RECORD_DISPLAY_NAME: &str = "screenRecord";

/// Source of the local wall-clock time stamped into recording names
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    AwaitingGrant,
    Preparing,
    Recording,
    Stopping,
}

/// The encoder is running and writing to `output_name`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingStarted {
    pub output_name: String,
    pub location: Option<PathBuf>,
}

/// The encoder was stopped and its output finalized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingStopped {
    pub output_name: String,
    pub location: Option<PathBuf>,
}

struct ActiveRecording {
    config: EncoderConfig,
    location: Option<PathBuf>,
    encoder: Box<dyn VideoEncoder>,
    mirror: MirrorTarget,
    projection: ProjectionHandle,
}

enum RecordingStage {
    Idle,
    AwaitingGrant(CompletionSender<RecordingStarted>),
    Preparing,
    Recording(ActiveRecording),
    Stopping,
}

struct RecordingInner {
    generation: u64,
    stage: RecordingStage,
}

struct RecordingShared {
    platform: Arc<dyn Platform>,
    grants: GrantCache,
    app_name: String,
    clock: Clock,
    is_recording: ObservableFlag,
    // Held across a state change and its flag notification so observers see
    // transitions in order. Reentrant so observers may start or stop.
    transition: ReentrantMutex<()>,
    inner: Mutex<RecordingInner>,
}

/// Records the display until [`RecordingSession::stop`] is called
pub struct RecordingSession {
    shared: Arc<RecordingShared>,
}

impl RecordingSession {
    pub fn new(platform: Arc<dyn Platform>, grants: GrantCache, app_name: impl Into<String>, clock: Clock) -> Self {
        Self {
            shared: Arc::new(RecordingShared {
                platform,
                grants,
                app_name: app_name.into(),
                clock,
                is_recording: ObservableFlag::new(false),
                transition: ReentrantMutex::new(()),
                inner: Mutex::new(RecordingInner {
                    generation: 0,
                    stage: RecordingStage::Idle,
                }),
            }),
        }
    }

    pub fn state(&self) -> RecordingState {
        match self.shared.inner.lock().stage {
            RecordingStage::Idle => RecordingState::Idle,
            RecordingStage::AwaitingGrant(_) => RecordingState::AwaitingGrant,
            RecordingStage::Preparing => RecordingState::Preparing,
            RecordingStage::Recording(_) => RecordingState::Recording,
            RecordingStage::Stopping => RecordingState::Stopping,
        }
    }

    /// True exactly while the session is in [`RecordingState::Recording`].
    ///
    /// Observers run on the thread that made the transition, in transition order.
    pub fn is_recording(&self) -> &ObservableFlag {
        &self.shared.is_recording
    }

    /// Start recording. Resolves once the encoder is running.
    pub fn start(&self) -> Completion<RecordingStarted> {
        let _transition = self.shared.transition.lock();
        let (completion_tx, completion) = completion_channel();
        let (consent_request, notification) = {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.stage, RecordingStage::Idle) {
                warn!("recording requested while another recording is in flight");
                return resolved(Err(SessionError::Busy));
            }
            inner.generation += 1;
            match self.shared.grants.get_cached() {
                Some(grant) => {
                    debug!(ticket = inner.generation, "recording reusing cached grant");
                    (None, self.shared.begin(&mut inner, completion_tx, grant, true))
                },
                None => {
                    inner.stage = RecordingStage::AwaitingGrant(completion_tx);
                    (Some(ConsentRequest::new(RequestCode::Record, inner.generation)), None)
                },
            }
        };
        if let Some(notification) = notification {
            notification.notify();
        }
        if let Some(request) = consent_request {
            debug!(ticket = request.ticket(), "recording requesting consent");
            self.shared.platform.request_consent(request);
        }
        completion
    }

    /// Route the host's answer to a consent request issued by this session
    pub fn deliver_consent(&self, request: ConsentRequest, result: ConsentResult) -> Result<(), ConsentRoutingError> {
        if request.code() != RequestCode::Record {
            return Err(ConsentRoutingError::UnknownRequestCode(request.code().as_raw()));
        }
        let _transition = self.shared.transition.lock();
        let notification = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != request.ticket() {
                debug!(ticket = request.ticket(), current = inner.generation, "stale recording consent");
                return Err(ConsentRoutingError::Stale(request));
            }
            let completion = match std::mem::replace(&mut inner.stage, RecordingStage::Idle) {
                RecordingStage::AwaitingGrant(completion) => completion,
                other => {
                    inner.stage = other;
                    return Err(ConsentRoutingError::Stale(request));
                },
            };
            match result.into_grant() {
                Some(grant) => {
                    self.shared.grants.store(grant.clone());
                    self.shared.begin(&mut inner, completion, grant, false)
                },
                None => {
                    info!(ticket = request.ticket(), "recording consent denied");
                    let _ = completion.send(Err(SessionError::PermissionDenied));
                    None
                },
            }
        };
        if let Some(notification) = notification {
            notification.notify();
        }
        Ok(())
    }

    /// Stop a running recording and tear it down.
    ///
    /// Returns `None` without doing anything unless the session is recording.
    /// Teardown always runs to the end; failed steps are reported in
    /// [`SessionError::Teardown`] once the session is back to idle.
    pub fn stop(&self) -> Option<Result<RecordingStopped, SessionError>> {
        let _transition = self.shared.transition.lock();
        let (result, notification) = {
            let mut inner = self.shared.inner.lock();
            let active = match std::mem::replace(&mut inner.stage, RecordingStage::Stopping) {
                RecordingStage::Recording(active) => active,
                other => {
                    inner.stage = other;
                    debug!("stop ignored, not recording");
                    return None;
                },
            };
            let result = teardown(active);
            inner.stage = RecordingStage::Idle;
            (result, self.shared.is_recording.set_deferred(false))
        };
        if let Some(notification) = notification {
            notification.notify();
        }
        Some(result)
    }
}

impl RecordingShared {
    /// Prepare and start the encoder for `grant`, leaving the session either
    /// recording or idle.
    fn begin(&self, inner: &mut RecordingInner, completion: CompletionSender<RecordingStarted>, grant: CaptureGrant, from_cache: bool) -> Option<FlagNotification> {
        inner.stage = RecordingStage::Preparing;
        match self.prepare_and_start(&grant) {
            Ok(active) => {
                let started = RecordingStarted {
                    output_name: active.config.output_name().to_string(),
                    location: active.location.clone(),
                };
                info!(ticket = inner.generation, output_name = %started.output_name, "recording started");
                inner.stage = RecordingStage::Recording(active);
                let notification = self.is_recording.set_deferred(true);
                let _ = completion.send(Ok(started));
                notification
            },
            Err(error) => {
                if from_cache && matches!(error, SessionError::MirrorCreation(MirrorCreationError::GrantRejected(_))) && self.grants.invalidate_if(&grant) {
                    info!("cached grant rejected, dropped from cache");
                }
                warn!(%error, "recording failed to start");
                inner.stage = RecordingStage::Idle;
                let _ = completion.send(Err(error));
                None
            },
        }
    }

    fn prepare_and_start(&self, grant: &CaptureGrant) -> Result<ActiveRecording, SessionError> {
        let metrics = self.platform.display_metrics();
        let mut projection = ProjectionHandle::open(self.platform.as_ref(), grant)?;

        let config = EncoderConfig::at(&self.app_name, metrics, (self.clock)());
        let output = self.platform.media_store()
            .create_video(config.output_name())
            .map_err(SessionError::EncoderPrepare)?;
        let location = output.location().cloned();

        let mut encoder = self.platform.create_encoder();
        if let Err(error) = encoder.prepare(&config, output) {
            reset_quietly(encoder.as_mut());
            return Err(SessionError::EncoderPrepare(error));
        }
        let surface = match encoder.input_surface() {
            Some(surface) => surface,
            None => {
                reset_quietly(encoder.as_mut());
                return Err(SessionError::EncoderPrepare(PlatformError::Unavailable("encoder has no input surface".into())));
            },
        };
        debug!(output_name = config.output_name(), bitrate = config.bitrate_bps(), fps = config.frame_rate(), "encoder prepared");

        let mut mirror = match MirrorSurfaceFactory::create(&mut projection, RECORD_DISPLAY_NAME, metrics, surface, MirrorFlags::RECORD) {
            Ok(mirror) => mirror,
            Err(error) => {
                reset_quietly(encoder.as_mut());
                return Err(error.into());
            },
        };

        if let Err(error) = encoder.start() {
            mirror.release();
            reset_quietly(encoder.as_mut());
            projection.stop();
            return Err(SessionError::EncoderStart(error));
        }

        Ok(ActiveRecording {
            config,
            location,
            encoder,
            mirror,
            projection,
        })
    }
}

fn reset_quietly(encoder: &mut dyn VideoEncoder) {
    if let Err(error) = encoder.reset() {
        warn!(%error, "encoder reset failed");
    }
}

/// Stop the encoder, release the mirror and stop the projection, in that order
fn teardown(mut active: ActiveRecording) -> Result<RecordingStopped, SessionError> {
    let mut failures = Vec::new();
    if let Err(error) = active.encoder.stop() {
        warn!(%error, "encoder stop failed");
        failures.push((TeardownStep::StopEncoder, error));
    }
    if let Err(error) = active.encoder.reset() {
        warn!(%error, "encoder reset failed");
        failures.push((TeardownStep::ResetEncoder, error));
    }
    active.mirror.release();
    active.projection.stop();

    if failures.is_empty() {
        info!(output_name = active.config.output_name(), "recording stopped");
        Ok(RecordingStopped {
            output_name: active.config.output_name().to_string(),
            location: active.location,
        })
    } else {
        Err(TeardownError { failures }.into())
    }
}

impl Drop for RecordingShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let RecordingStage::Recording(active) = std::mem::replace(&mut inner.stage, RecordingStage::Idle) {
            if let Err(error) = teardown(active) {
                warn!(%error, "recording dropped with failed teardown");
            }
            if let Some(notification) = self.is_recording.set_deferred(false) {
                notification.notify();
            }
        }
    }
}
