//! Session orchestration and thread management.
//!
//! This module contains the top-level `GeospatialSession` that owns the
//! per-frame synchronizer and the VPS worker thread, along with the shared
//! state and the statistics they publish.

pub mod frame_sync;
pub mod session;
pub mod shared_state;
pub mod statistics;
pub mod vps;

pub use frame_sync::{FrameReport, FrameSynchronizer};
pub use session::GeospatialSession;
pub use shared_state::SharedState;
pub use statistics::SessionStatistics;
pub use vps::{Debouncer, VpsMonitor};
