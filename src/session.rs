//! Errors and completion channel shared by the capture and recording sessions.

use std::{error::Error, fmt::Display, future::Future, pin::Pin, task::{Context, Poll}};

use futures::channel::oneshot;

use crate::{mirror::MirrorCreationError, platform::PlatformError};

/// A step of the recording teardown sequence
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TeardownStep {
    StopEncoder,
    ResetEncoder,
}

/// Teardown finished, but some steps reported failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownError {
    pub failures: Vec<(TeardownStep, PlatformError)>,
}

impl Display for TeardownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TeardownError(")?;
        for (i, (step, error)) in self.failures.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            f.write_fmt(format_args!("{:?}: {}", step, error))?;
        }
        f.write_str(")")
    }
}

impl Error for TeardownError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The user declined the consent dialog
    PermissionDenied,
    /// The path already has a session in flight
    Busy,
    MirrorCreation(MirrorCreationError),
    EncoderPrepare(PlatformError),
    EncoderStart(PlatformError),
    Teardown(TeardownError),
    /// The session was dropped before it could finish
    Abandoned,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("SessionError::PermissionDenied"),
            Self::Busy => f.write_str("SessionError::Busy"),
            Self::MirrorCreation(error) => f.write_fmt(format_args!("SessionError::MirrorCreation({})", error)),
            Self::EncoderPrepare(error) => f.write_fmt(format_args!("SessionError::EncoderPrepare({})", error)),
            Self::EncoderStart(error) => f.write_fmt(format_args!("SessionError::EncoderStart({})", error)),
            Self::Teardown(error) => f.write_fmt(format_args!("SessionError::Teardown({})", error)),
            Self::Abandoned => f.write_str("SessionError::Abandoned"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MirrorCreation(error) => Some(error),
            Self::EncoderPrepare(error) | Self::EncoderStart(error) => Some(error),
            Self::Teardown(error) => Some(error),
            _ => None,
        }
    }
}

impl From<MirrorCreationError> for SessionError {
    fn from(error: MirrorCreationError) -> Self {
        Self::MirrorCreation(error)
    }
}

impl From<TeardownError> for SessionError {
    fn from(error: TeardownError) -> Self {
        Self::Teardown(error)
    }
}

pub(crate) type CompletionSender<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) fn completion_channel<T>() -> (CompletionSender<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (tx, Completion { rx, taken: false })
}

/// A completion that is already resolved
pub(crate) fn resolved<T>(result: Result<T, SessionError>) -> Completion<T> {
    let (tx, completion) = completion_channel();
    let _ = tx.send(result);
    completion
}

/// Resolves once with the outcome of a session attempt
#[must_use = "a completion carries the session's only result"]
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, SessionError>>,
    taken: bool,
}

impl<T> Completion<T> {
    /// The outcome if it is ready. Returns `Some` at most once.
    pub fn try_take(&mut self) -> Option<Result<T, SessionError>> {
        if self.taken {
            return None;
        }
        let result = match self.rx.try_recv() {
            Ok(Some(result)) => result,
            Ok(None) => return None,
            Err(oneshot::Canceled) => Err(SessionError::Abandoned),
        };
        self.taken = true;
        Some(result)
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.taken = true;
                Poll::Ready(result.unwrap_or(Err(SessionError::Abandoned)))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}
