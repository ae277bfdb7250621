//! VPS availability monitoring.
//!
//! Location fixes arrive far more often than the service should be asked
//! about them. The worker keeps only the latest fix and checks at most one
//! per debounce window; the answer lands in [`SharedState::vps_available`]
//! and every change is also published as an event.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, info};

use crate::geometry::GeoCoordinate;
use crate::services::{PositioningService, VpsAvailability};

use super::shared_state::SharedState;

/// Timeout for receiving fixes. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Capacity of the availability change channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Only the latest fix is ever checked, so one queued fix is enough.
const LOCATION_CHANNEL_CAPACITY: usize = 1;

/// Latest-wins throttle: at most one fix released per window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_released: Option<Instant>,
    pending: Option<GeoCoordinate>,
}

impl Debouncer {
    /// Debouncer releasing at most one fix per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_released: None,
            pending: None,
        }
    }

    /// Replace any pending fix with `coordinate`.
    pub fn offer(&mut self, coordinate: GeoCoordinate) {
        self.pending = Some(coordinate);
    }

    /// Release the pending fix if the window since the last release has
    /// elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<GeoCoordinate> {
        if let Some(last) = self.last_released {
            if now.saturating_duration_since(last) < self.window {
                return None;
            }
        }
        let coordinate = self.pending.take()?;
        self.last_released = Some(now);
        Some(coordinate)
    }
}

/// Owns the VPS worker thread and the channels around it.
pub struct VpsMonitor {
    shared: Arc<SharedState>,
    service: Arc<dyn PositioningService>,
    window: Duration,
    location_tx: Sender<GeoCoordinate>,
    location_rx: Receiver<GeoCoordinate>,
    event_tx: Sender<bool>,
    event_rx: Receiver<bool>,
    handle: Option<JoinHandle<()>>,
}

impl VpsMonitor {
    /// Monitor that is not yet running.
    pub fn new(
        shared: Arc<SharedState>,
        service: Arc<dyn PositioningService>,
        window: Duration,
    ) -> Self {
        let (location_tx, location_rx) = bounded(LOCATION_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            shared,
            service,
            window,
            location_tx,
            location_rx,
            event_tx,
            event_rx,
            handle: None,
        }
    }

    /// Queue a location fix, replacing any fix the worker has not taken
    /// yet. Never blocks, also while the worker is stopped.
    pub fn offer_location(&self, coordinate: GeoCoordinate) {
        match self.location_tx.try_send(coordinate) {
            Ok(()) => {}
            Err(TrySendError::Full(coordinate)) => {
                let _ = self.location_rx.try_recv();
                let _ = self.location_tx.try_send(coordinate);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Availability changes, `true` when VPS became available.
    pub fn events(&self) -> Receiver<bool> {
        self.event_rx.clone()
    }

    /// Whether the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the worker. No-op if it is already running.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.shared.clear_shutdown();

        let worker = VpsWorker {
            shared: Arc::clone(&self.shared),
            service: Arc::clone(&self.service),
            debouncer: Debouncer::new(self.window),
            event_tx: self.event_tx.clone(),
        };
        let rx = self.location_rx.clone();
        self.handle = Some(thread::spawn(move || worker.run(rx)));
        debug!("vps monitor started");
    }

    /// Signal the worker and wait for it.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.request_shutdown();
            let _ = handle.join();
            debug!("vps monitor stopped");
        }
    }
}

impl Drop for VpsMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct VpsWorker {
    shared: Arc<SharedState>,
    service: Arc<dyn PositioningService>,
    debouncer: Debouncer,
    event_tx: Sender<bool>,
}

impl VpsWorker {
    fn run(mut self, rx: Receiver<GeoCoordinate>) {
        loop {
            if self.shared.is_shutdown_requested() {
                break;
            }

            match rx.recv_timeout(RECV_TIMEOUT) {
                Ok(coordinate) => {
                    self.debouncer.offer(coordinate);
                    for newer in rx.try_iter() {
                        self.debouncer.offer(newer);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(coordinate) = self.debouncer.poll(Instant::now()) {
                self.check(coordinate);
            }
        }
    }

    fn check(&self, coordinate: GeoCoordinate) {
        debug!(%coordinate, "checking vps availability");
        let shared = Arc::clone(&self.shared);
        let event_tx = self.event_tx.clone();
        self.service.check_vps_availability(
            coordinate,
            Box::new(move |availability: VpsAvailability| {
                let available = availability.is_available();
                let previous = shared.set_vps_available(available);
                if previous != available {
                    info!(available, ?availability, "vps availability changed");
                    let _ = event_tx.try_send(available);
                }
            }),
        );
    }
}
