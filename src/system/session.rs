//! Geospatial session: the top-level object a host drives.
//!
//! The `GeospatialSession` owns the shared state, the per-frame synchronizer
//! and the VPS worker thread. The host calls [`GeospatialSession::on_frame`]
//! from its render loop; resolution completions and VPS checks arrive on
//! other threads.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::geometry::GeoCoordinate;
use crate::localization::{LocalizationState, LocalizationStateMachine};
use crate::registry::AnchorRegistry;
use crate::render::RenderScene;
use crate::resolution::AnchorResolutionPipeline;
use crate::services::{LocalFrame, LocalTracker, PositioningService};

use super::frame_sync::{FrameReport, FrameSynchronizer};
use super::shared_state::SharedState;
use super::statistics::SessionStatistics;
use super::vps::VpsMonitor;

/// Capacity of the statistics channel. Ticks drop statistics when the
/// consumer falls this far behind.
const STATISTICS_CHANNEL_CAPACITY: usize = 64;

pub struct GeospatialSession {
    /// Registry, catalog and flags, shared with completions and the VPS worker.
    shared: Arc<SharedState>,

    sync: FrameSynchronizer,

    vps: VpsMonitor,

    tracker: Arc<dyn LocalTracker>,
    scene: Arc<dyn RenderScene>,

    stats_rx: Receiver<SessionStatistics>,

    /// Session-fatal error reported while configuring the service.
    last_error: Option<SessionError>,
}

impl GeospatialSession {
    /// Create a paused session.
    ///
    /// A configuration error from the service does not fail construction: the
    /// session starts in `Failed` and the error is kept for the host to show.
    pub fn new(
        config: SessionConfig,
        catalog: Catalog,
        service: Arc<dyn PositioningService>,
        tracker: Arc<dyn LocalTracker>,
        scene: Arc<dyn RenderScene>,
    ) -> Result<Self> {
        config.validate().context("invalid session configuration")?;

        let shared = SharedState::new(catalog);
        let (stats_tx, stats_rx) = bounded(STATISTICS_CHANNEL_CAPACITY);

        let mut machine = LocalizationStateMachine::new(config.localization.clone(), Instant::now());
        let last_error = match service.configure() {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "failed to configure positioning session");
                machine.fail();
                Some(e)
            }
        };

        let pipeline = AnchorResolutionPipeline::new(
            Arc::clone(&service),
            Arc::clone(&tracker),
            Arc::clone(&scene),
            Arc::clone(&shared),
            &config.resolution,
            config.marker.clone(),
        );
        let vps = VpsMonitor::new(Arc::clone(&shared), Arc::clone(&service), config.vps.debounce_window);
        let sync = FrameSynchronizer::new(
            machine,
            pipeline,
            service,
            Arc::clone(&tracker),
            Arc::clone(&scene),
            Arc::clone(&shared),
            stats_tx,
        );

        Ok(Self {
            shared,
            sync,
            vps,
            tracker,
            scene,
            stats_rx,
            last_error,
        })
    }

    /// Activate the session and start VPS monitoring.
    pub fn run(&mut self) {
        if self.shared.is_active() {
            return;
        }
        self.shared.reset_resolution();
        self.sync.machine_mut().reset(Instant::now());
        self.shared.set_active(true);
        self.vps.start();
        info!(locations = self.shared.catalog.read().len(), "session running");
    }

    /// Stop issuing requests, clear every anchor and stop VPS monitoring.
    /// Completions still in flight are ignored when they arrive.
    pub fn pause(&mut self) {
        if !self.shared.is_active() {
            return;
        }
        self.shared.set_active(false);
        self.vps.stop();
        let cleared = self.detach_all();
        info!(cleared, "session paused");
    }

    /// Replace the catalog. Existing anchors are dropped and the new catalog
    /// resolves on the next localized tick.
    pub fn set_catalog(&mut self, catalog: Catalog) {
        let locations = catalog.len();
        *self.shared.catalog.write() = catalog;
        let cleared = self.detach_all();
        self.rearm();
        info!(locations, cleared, "catalog replaced");
    }

    /// Drop every anchor and allow another resolution round. This is the
    /// way out of a refused round.
    pub fn clear_anchors(&mut self) -> usize {
        let cleared = self.detach_all();
        self.rearm();
        info!(cleared, "anchors cleared");
        cleared
    }

    /// Tick for `frame` at the current time.
    pub fn on_frame(&mut self, frame: &LocalFrame) -> FrameReport {
        self.on_frame_at(frame, Instant::now())
    }

    /// Tick with an explicit clock.
    pub fn on_frame_at(&mut self, frame: &LocalFrame, now: Instant) -> FrameReport {
        self.sync.on_frame(frame, now)
    }

    /// Current localization state.
    pub fn localization_state(&self) -> LocalizationState {
        self.sync.state()
    }

    /// Whether the session is running.
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// One item per successful tick that had something to report.
    pub fn statistics(&self) -> Receiver<SessionStatistics> {
        self.stats_rx.clone()
    }

    /// Hand a location fix to the VPS monitor. Only the latest pending fix
    /// is kept.
    pub fn offer_location(&self, coordinate: GeoCoordinate) {
        self.vps.offer_location(coordinate);
    }

    /// VPS availability changes, `true` when it became available.
    pub fn vps_events(&self) -> Receiver<bool> {
        self.vps.events()
    }

    /// Last known VPS availability.
    pub fn vps_available(&self) -> bool {
        self.shared.vps_available()
    }

    /// Anchors currently placed.
    pub fn registry(&self) -> &AnchorRegistry {
        &self.shared.registry
    }

    /// Snapshot of the current catalog.
    pub fn catalog(&self) -> Catalog {
        self.shared.catalog()
    }

    /// Rooftop requests awaiting a completion.
    pub fn outstanding_requests(&self) -> usize {
        self.sync.pipeline().outstanding()
    }

    /// Completions that produced a tracking anchor.
    pub fn resolved_anchors(&self) -> usize {
        self.shared.resolved_anchors()
    }

    /// Completions that failed or produced no tracking anchor.
    pub fn failed_anchors(&self) -> usize {
        self.shared.failed_anchors()
    }

    /// Configuration error that failed the session, if any.
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    /// Deactivate, join the VPS worker and detach every anchor. Safe to call
    /// more than once.
    pub fn shutdown(&mut self) {
        self.shared.set_active(false);
        self.vps.stop();
        let cleared = self.detach_all();
        if cleared > 0 {
            info!(cleared, "session shut down");
        }
    }

    fn detach_all(&self) -> usize {
        let records = self.shared.registry.clear();
        for record in &records {
            self.scene.detach(record.local.id);
            self.tracker.remove_anchor(record.local.id);
        }
        records.len()
    }

    fn rearm(&mut self) {
        self.shared.reset_resolution();
        self.sync.machine_mut().rearm_resolution();
    }
}

impl Drop for GeospatialSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
