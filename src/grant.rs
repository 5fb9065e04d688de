//! Capture grants, the consent request/response pair, and the grant cache.

use std::{error::Error, fmt::Display, sync::Arc};

use parking_lot::Mutex;

/// Activity-result status the host reports when the user accepted
pub const STATUS_OK: i32 = -1;
/// Activity-result status the host reports when the user dismissed the dialog
pub const STATUS_CANCELED: i32 = 0;

/// Identifies which path a consent request was issued for
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RequestCode {
    Capture,
    Record,
}

impl RequestCode {
    pub const fn as_raw(&self) -> i32 {
        match self {
            Self::Capture => 100,
            Self::Record => 101,
        }
    }

    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            100 => Some(Self::Capture),
            101 => Some(Self::Record),
            _ => None,
        }
    }
}

/// An outstanding request for user consent.
///
/// The ticket ties the eventual answer to the session attempt that asked for
/// it; answers for an older attempt are rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConsentRequest {
    pub(crate) code: RequestCode,
    pub(crate) ticket: u64,
}

impl ConsentRequest {
    pub fn new(code: RequestCode, ticket: u64) -> Self {
        Self { code, ticket }
    }

    pub fn code(&self) -> RequestCode {
        self.code
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// What the host's consent dialog returned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsentResult {
    pub status_code: i32,
    pub grant_data: Option<Vec<u8>>,
}

impl ConsentResult {
    pub fn granted(grant_data: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code: STATUS_OK,
            grant_data: Some(grant_data.into()),
        }
    }

    pub fn denied() -> Self {
        Self {
            status_code: STATUS_CANCELED,
            grant_data: None,
        }
    }

    /// The grant carried by this result, if the user accepted
    pub fn into_grant(self) -> Option<CaptureGrant> {
        match (self.status_code, self.grant_data) {
            (STATUS_OK, Some(grant_data)) => Some(CaptureGrant::new(self.status_code, grant_data)),
            _ => None,
        }
    }
}

/// Opaque platform-issued token authorizing this process to mirror the display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureGrant {
    status_code: i32,
    grant_data: Arc<[u8]>,
}

impl CaptureGrant {
    pub fn new(status_code: i32, grant_data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            status_code,
            grant_data: grant_data.into(),
        }
    }

    pub fn status_code(&self) -> i32 {
        self.status_code
    }

    pub fn grant_data(&self) -> &[u8] {
        &self.grant_data
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsentRoutingError {
    /// The session that issued the request has moved on
    Stale(ConsentRequest),
    UnknownRequestCode(i32),
}

impl Display for ConsentRoutingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale(request) => f.write_fmt(format_args!("ConsentRoutingError::Stale(code: {}, ticket: {})", request.code.as_raw(), request.ticket)),
            Self::UnknownRequestCode(code) => f.write_fmt(format_args!("ConsentRoutingError::UnknownRequestCode({})", code)),
        }
    }
}

impl Error for ConsentRoutingError {}

/// Holds the most recent grant so later sessions can skip the consent dialog
#[derive(Clone, Debug, Default)]
pub struct GrantCache {
    grant: Arc<Mutex<Option<CaptureGrant>>>,
}

impl GrantCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_cached(&self) -> Option<CaptureGrant> {
        self.grant.lock().clone()
    }

    /// Replace whatever grant was cached
    pub fn store(&self, grant: CaptureGrant) {
        *self.grant.lock() = Some(grant);
    }

    pub fn invalidate(&self) {
        self.grant.lock().take();
    }

    /// Drop the cached grant only if it is still `grant`
    pub(crate) fn invalidate_if(&self, grant: &CaptureGrant) -> bool {
        let mut cached = self.grant.lock();
        if cached.as_ref() == Some(grant) {
            *cached = None;
            true
        } else {
            false
        }
    }
}
