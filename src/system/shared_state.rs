//! State shared between the frame loop, resolution completions and the VPS
//! worker.
//!
//! The registry carries its own lock; the catalog sits behind an `RwLock`
//! and the session flags are atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::catalog::Catalog;
use crate::registry::AnchorRegistry;

pub struct SharedState {
    /// Resolved anchors and their render proxies.
    pub registry: AnchorRegistry,

    /// Locations to place markers for. Replaced wholesale.
    pub catalog: RwLock<Catalog>,

    /// False once the session is paused; late completions check it before
    /// touching the registry.
    session_active: AtomicBool,

    /// Set when a resolution round has been dispatched.
    resolution_started: AtomicBool,

    /// Ask the VPS worker to exit.
    shutdown_requested: AtomicBool,

    vps_available: AtomicBool,

    resolved_anchors: AtomicUsize,
    failed_anchors: AtomicUsize,
}

impl SharedState {
    /// Create inactive shared state holding `catalog` and an empty registry.
    pub fn new(catalog: Catalog) -> Arc<Self> {
        Arc::new(Self {
            registry: AnchorRegistry::new(),
            catalog: RwLock::new(catalog),
            session_active: AtomicBool::new(false),
            resolution_started: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            vps_available: AtomicBool::new(false),
            resolved_anchors: AtomicUsize::new(0),
            failed_anchors: AtomicUsize::new(0),
        })
    }

    /// Check if the session is running.
    pub fn is_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    /// Set the session_active flag.
    pub fn set_active(&self, value: bool) {
        self.session_active.store(value, Ordering::SeqCst);
    }

    /// Claim the once-per-session resolution round. Returns false if it was
    /// already claimed.
    pub fn try_begin_resolution(&self) -> bool {
        self.resolution_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the resolution claim so another round may start.
    pub fn reset_resolution(&self) {
        self.resolution_started.store(false, Ordering::SeqCst);
    }

    /// Check if a resolution round has been claimed.
    pub fn resolution_started(&self) -> bool {
        self.resolution_started.load(Ordering::SeqCst)
    }

    /// Request shutdown of the VPS worker.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Clear the shutdown flag before the worker is started again.
    pub fn clear_shutdown(&self) {
        self.shutdown_requested.store(false, Ordering::SeqCst);
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Store VPS availability; returns the previous value.
    pub fn set_vps_available(&self, value: bool) -> bool {
        self.vps_available.swap(value, Ordering::SeqCst)
    }

    /// Last VPS availability reported by the service.
    pub fn vps_available(&self) -> bool {
        self.vps_available.load(Ordering::SeqCst)
    }

    /// Count a completion that produced a tracking anchor.
    pub fn record_resolved(&self) {
        self.resolved_anchors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completion that failed or was not tracking.
    pub fn record_failed(&self) {
        self.failed_anchors.fetch_add(1, Ordering::Relaxed);
    }

    /// Completions counted by `record_resolved`.
    pub fn resolved_anchors(&self) -> usize {
        self.resolved_anchors.load(Ordering::Relaxed)
    }

    /// Completions counted by `record_failed`.
    pub fn failed_anchors(&self) -> usize {
        self.failed_anchors.load(Ordering::Relaxed)
    }

    /// Clone of the current catalog.
    pub fn catalog(&self) -> Catalog {
        self.catalog.read().clone()
    }
}
