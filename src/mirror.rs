//! Mirrors of the display bound to a render destination.

use std::{error::Error, fmt::Display, ops::BitOr};

use tracing::debug;

use crate::{grant::CaptureGrant, platform::{Platform, PlatformError, Projection, Surface, VirtualDisplay}, util::DisplayMetrics};

/// Virtual display flags passed to the platform when creating a mirror
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct MirrorFlags(u32);

impl MirrorFlags {
    pub const NONE: MirrorFlags = MirrorFlags(0);
    pub const PUBLIC: MirrorFlags = MirrorFlags(1 << 0);
    pub const OWN_CONTENT_ONLY: MirrorFlags = MirrorFlags(1 << 3);
    pub const AUTO_MIRROR: MirrorFlags = MirrorFlags(1 << 4);

    /// Still capture: only this process's own content, publicly visible
    pub const CAPTURE: MirrorFlags = MirrorFlags(Self::OWN_CONTENT_ONLY.0 | Self::PUBLIC.0);
    /// Recording: mirror the whole display
    pub const RECORD: MirrorFlags = Self::AUTO_MIRROR;

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, other: MirrorFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MirrorFlags {
    type Output = MirrorFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        MirrorFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCreationError {
    /// The projection backing the grant was already stopped
    ProjectionStopped,
    /// The platform no longer honors the grant
    GrantRejected(PlatformError),
    /// The destination surface could not be created or bound
    SinkUnavailable(PlatformError),
    Platform(PlatformError),
}

impl Display for MirrorCreationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectionStopped => f.write_str("MirrorCreationError::ProjectionStopped"),
            Self::GrantRejected(error) => f.write_fmt(format_args!("MirrorCreationError::GrantRejected({})", error)),
            Self::SinkUnavailable(error) => f.write_fmt(format_args!("MirrorCreationError::SinkUnavailable({})", error)),
            Self::Platform(error) => f.write_fmt(format_args!("MirrorCreationError::Platform({})", error)),
        }
    }
}

impl Error for MirrorCreationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ProjectionStopped => None,
            Self::GrantRejected(error) | Self::SinkUnavailable(error) | Self::Platform(error) => Some(error),
        }
    }
}

/// A projection opened from a grant, owned by one session
pub struct ProjectionHandle {
    grant: CaptureGrant,
    projection: Box<dyn Projection>,
    stopped: bool,
}

impl ProjectionHandle {
    pub fn open(platform: &dyn Platform, grant: &CaptureGrant) -> Result<Self, MirrorCreationError> {
        let projection = platform.open_projection(grant).map_err(MirrorCreationError::GrantRejected)?;
        Ok(Self {
            grant: grant.clone(),
            projection,
            stopped: false,
        })
    }

    pub fn grant(&self) -> &CaptureGrant {
        &self.grant
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.projection.stop();
        }
    }
}

impl Drop for ProjectionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A live binding between the display mirror and a render destination
pub struct MirrorTarget {
    metrics: DisplayMetrics,
    surface: Surface,
    flags: MirrorFlags,
    display: Option<Box<dyn VirtualDisplay>>,
}

impl MirrorTarget {
    pub fn width(&self) -> u32 {
        self.metrics.width()
    }

    pub fn height(&self) -> u32 {
        self.metrics.height()
    }

    pub fn density_dpi(&self) -> u32 {
        self.metrics.density_dpi
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn flags(&self) -> MirrorFlags {
        self.flags
    }

    pub fn is_released(&self) -> bool {
        self.display.is_none()
    }

    /// Release the virtual display. Releasing twice does nothing.
    pub fn release(&mut self) {
        if let Some(mut display) = self.display.take() {
            debug!(surface = self.surface.as_raw(), "releasing mirror");
            display.release();
        }
    }
}

impl Drop for MirrorTarget {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MirrorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorTarget")
            .field("metrics", &self.metrics)
            .field("surface", &self.surface)
            .field("flags", &self.flags)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Creates mirrors on an open projection
pub struct MirrorSurfaceFactory;

impl MirrorSurfaceFactory {
    pub fn create(
        projection: &mut ProjectionHandle,
        name: &str,
        metrics: DisplayMetrics,
        surface: Surface,
        flags: MirrorFlags,
    ) -> Result<MirrorTarget, MirrorCreationError> {
        if projection.is_stopped() {
            return Err(MirrorCreationError::ProjectionStopped);
        }
        let display = projection.projection
            .create_virtual_display(name, metrics.width(), metrics.height(), metrics.density_dpi, flags, surface)
            .map_err(|error| match error {
                PlatformError::Revoked => MirrorCreationError::GrantRejected(error),
                error => MirrorCreationError::Platform(error),
            })?;
        debug!(name, width = metrics.width(), height = metrics.height(), dpi = metrics.density_dpi, flags = flags.bits(), "created mirror");
        Ok(MirrorTarget {
            metrics,
            surface,
            flags,
            display: Some(display),
        })
    }

    pub fn release(target: &mut MirrorTarget) {
        target.release();
    }
}
