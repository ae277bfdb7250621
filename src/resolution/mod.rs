//! Anchor resolution against the remote positioning service.

pub mod gate;
pub mod pipeline;

pub use gate::{OutstandingGate, Permit};
pub use pipeline::{AnchorResolutionPipeline, ResolutionRound};
