//! Localization: fusing the remote geospatial pose quality into a single
//! session-level state.

pub mod machine;
pub mod sample;
pub mod state;

pub use machine::{LocalizationStateMachine, TickOutcome};
pub use sample::{
    AccuracySample, EarthFrame, EarthState, EarthTrackingState, GeospatialPose, LocalizationInput,
};
pub use state::LocalizationState;
