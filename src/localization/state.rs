//! Localization state machine states.

/// How far the session has come in fixing its geospatial pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalizationState {
    /// Service enabled, earth not yet tracking.
    #[default]
    Pretracking,
    /// Tracking, waiting for accuracy to drop under the low thresholds.
    Localizing,
    /// Accurate enough to place content. Can regress to `Localizing`.
    Localized,
    /// Terminal for the session. Requires teardown and a new session.
    Failed,
}

impl LocalizationState {
    /// Only `Failed` is terminal.
    pub fn is_terminal(self) -> bool {
        self == Self::Failed
    }
}

impl std::fmt::Display for LocalizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pretracking => "Pretracking",
            Self::Localizing => "Localizing",
            Self::Localized => "Localized",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}
