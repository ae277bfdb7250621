//! Anchor registry: bidirectional pairing of local and remote anchors.
//!
//! - [`AnchorKey`] - composite `(local, remote)` key, one per placed marker
//! - [`AnchorRecord`] - anchor handles, location payload and render proxy
//! - [`AnchorRegistry`] - lock-guarded table with per-namespace indices

pub mod anchor_registry;
pub mod record;
pub mod types;

pub use anchor_registry::{AnchorRegistry, Generation};
pub use record::AnchorRecord;
pub use types::{
    AnchorKey, AnchorTrackingState, LocalAnchor, LocalAnchorId, RemoteAnchor, RemoteAnchorId,
};
