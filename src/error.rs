//! Error taxonomy for the geospatial session.
//!
//! - [`SessionError`]: session-fatal, drives localization into `Failed`.
//! - [`ResolveError`]: a resolution round was refused before any request was sent.
//! - [`FrameSyncError`]: transient per-tick failure; the tick is skipped.
//! - [`RooftopAnchorState`]: outcome reported by each rooftop anchor completion.

use thiserror::Error;

/// Unrecoverable session errors reported by the positioning service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("This device or OS version is not currently supported.")]
    DeviceNotCompatible,

    #[error("An unexpected input was passed to the session.")]
    InvalidArgument,

    #[error("There are no available resources to continue with the session.")]
    ResourceExhausted,

    #[error(
        "The operation could not be completed because location permission was not granted with full accuracy"
    )]
    LocationPermissionNotGranted,

    #[error(
        "The configuration for the session could not be set because it is unsupported on this device"
    )]
    ConfigurationNotSupported,

    #[error(
        "The operation could not be completed because the session entered an unpredictable state."
    )]
    IllegalState,

    #[error("The positioning service is not authorized for this application.")]
    NotAuthorized,

    #[error("The positioning service reported an internal error.")]
    Internal,

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// Refusal of a resolution round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("session is not active")]
    SessionInactive,

    #[error("anchors were already resolved for this session")]
    AlreadyResolved,

    #[error("catalog is empty")]
    EmptyCatalog,

    #[error(
        "too many anchors: {requested} requested, {available} of {ceiling} available; clear anchors to continue"
    )]
    ResourceExhausted {
        requested: usize,
        available: usize,
        ceiling: usize,
    },
}

/// Transient failure to correlate a local frame with the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameSyncError {
    #[error("the session lost synchronization with the camera input")]
    FrameOutOfOrder,

    #[error("the session is unable to track the surrounding environment")]
    NotTracking,

    #[error("remote frame unavailable: {0}")]
    Unavailable(String),
}

/// Completion state of a single rooftop anchor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RooftopAnchorState {
    None,
    Success,
    ErrorInternal,
    ErrorNotAuthorized,
    ErrorUnsupportedLocation,
}

impl RooftopAnchorState {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for RooftopAnchorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Success => "Success",
            Self::ErrorInternal => "Error Internal",
            Self::ErrorNotAuthorized => "Not Authorized",
            Self::ErrorUnsupportedLocation => "Unsupported Location",
        };
        f.write_str(s)
    }
}
