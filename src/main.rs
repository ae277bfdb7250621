use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use nalgebra::{Matrix4, Vector3};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use geoanchor::catalog::{Catalog, Category, LocationEntry};
use geoanchor::config::SessionConfig;
use geoanchor::geometry::{GeoCoordinate, SE3, translation_of};
use geoanchor::registry::{LocalAnchor, LocalAnchorId};
use geoanchor::render::{LocationMarker, MarkerUpdate, RenderScene};
use geoanchor::services::{LocalFrame, LocalTracker};
use geoanchor::services::simulated::{SimulatedPositioningService, SimulationConfig};
use geoanchor::system::{GeospatialSession, SessionStatistics};

const FRAME_RATE_HZ: f64 = 30.0;
const WALK_DURATION: Duration = Duration::from_secs(20);
/// Meters per second.
const WALK_SPEED: f64 = 1.4;
const EYE_HEIGHT: f64 = 1.6;
/// Frames between location fixes pushed to the VPS monitor.
const FIX_INTERVAL_FRAMES: u32 = 30;

/// Tracker that hands out anchor ids and logs their lifetime.
#[derive(Default)]
struct LoggingTracker {
    live: Mutex<HashSet<LocalAnchorId>>,
}

impl LoggingTracker {
    fn live_anchors(&self) -> usize {
        self.live.lock().len()
    }
}

impl LocalTracker for LoggingTracker {
    fn add_anchor(&self, transform: &Matrix4<f64>) -> LocalAnchor {
        let anchor = LocalAnchor {
            id: LocalAnchorId::new_v4(),
            transform: *transform,
        };
        self.live.lock().insert(anchor.id);
        let p = translation_of(transform);
        debug!(anchor = %anchor.id, x = p.x, y = p.y, z = p.z, "local anchor added");
        anchor
    }

    fn remove_anchor(&self, id: LocalAnchorId) {
        if self.live.lock().remove(&id) {
            debug!(anchor = %id, "local anchor removed");
        }
    }
}

/// Scene that only logs what a renderer would draw.
struct LoggingScene;

impl RenderScene for LoggingScene {
    fn attach(&self, anchor: LocalAnchorId, marker: &LocationMarker) {
        info!(
            %anchor,
            location = %marker.location_name,
            category = %marker.category_name,
            "marker attached"
        );
    }

    fn update(&self, anchor: LocalAnchorId, update: &MarkerUpdate) {
        match update.relabel {
            Some(distance) => info!(%anchor, distance = format!("{distance:.1}m"), scale = update.scale, "marker relabeled"),
            None => debug!(%anchor, scale = update.scale, "marker moved"),
        }
    }

    fn detach(&self, anchor: LocalAnchorId) {
        info!(%anchor, "marker detached");
    }
}

fn sample_catalog(origin: GeoCoordinate) -> Catalog {
    let category = |id: i64, name: &str| Category {
        id,
        name: name.to_string(),
        icon_url: None,
    };
    let academic = category(1, "Academic");
    let student_life = category(2, "Student Life");
    let athletics = category(3, "Athletics");

    let entry = |id: i64, name: &str, category: &Category, east: f64, north: f64| LocationEntry {
        id,
        name: name.to_string(),
        category: category.clone(),
        coordinate: origin.offset_by(east, north),
    };

    Catalog::new(vec![
        entry(101, "Kellogg Library", &academic, -40.0, 60.0),
        entry(102, "Markstein Hall", &academic, 55.0, 20.0),
        entry(103, "Craven Hall", &academic, -20.0, 140.0),
        entry(104, "University Student Union", &student_life, 70.0, 110.0),
        entry(105, "Sports Center", &athletics, 160.0, -80.0),
    ])
}

/// Walk due north at constant speed.
fn walk_pose(elapsed: Duration) -> SE3 {
    SE3::from_translation(Vector3::new(0.0, EYE_HEIGHT, -WALK_SPEED * elapsed.as_secs_f64()))
}

fn log_statistics(stats: &SessionStatistics) {
    match stats {
        SessionStatistics::Accuracy {
            location,
            altitude,
            orientation,
        } => info!(
            location = format!("{location:.2}m"),
            altitude = format!("{altitude:.2}m"),
            orientation = format!("{orientation:.2}°"),
            "accuracy"
        ),
        SessionStatistics::Error(message) => info!(%message, "statistics"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let catalog_path = args.next();
    let config_path = args.next();

    let config = match config_path {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    let simulation = SimulationConfig::default();
    let catalog = match catalog_path {
        Some(path) => Catalog::from_json_file(path)?,
        None => sample_catalog(simulation.origin),
    };
    info!(locations = catalog.len(), "loaded catalog");

    let service = Arc::new(SimulatedPositioningService::new(simulation.clone()));
    let tracker = Arc::new(LoggingTracker::default());
    let mut session = GeospatialSession::new(config, catalog, service, tracker.clone(), Arc::new(LoggingScene))?;
    if let Some(error) = session.last_error() {
        warn!(%error, "session failed to configure");
    }

    let statistics = session.statistics();
    let vps_events = session.vps_events();
    session.run();

    let period = Duration::from_secs_f64(1.0 / FRAME_RATE_HZ);
    let frames = (WALK_DURATION.as_secs_f64() * FRAME_RATE_HZ) as u32;
    let start = Instant::now();

    for i in 0..frames {
        let timestamp = start + period * i;
        let camera_pose = walk_pose(timestamp - start);
        let position = camera_pose.translation;
        let report = session.on_frame_at(&LocalFrame { timestamp, camera_pose }, timestamp);

        if let Some(Err(e)) = &report.resolution {
            warn!(error = %e, "anchors not resolved");
        }

        if i % FIX_INTERVAL_FRAMES == 0 {
            session.offer_location(simulation.origin.offset_by(position.x, -position.z));
            if let Some(stats) = statistics.try_iter().last() {
                log_statistics(&stats);
            }
        }
        for available in vps_events.try_iter() {
            info!(available, "vps availability");
        }

        let next = timestamp + period;
        thread::sleep(next.saturating_duration_since(Instant::now()));
    }

    info!(
        state = %session.localization_state(),
        anchors = session.registry().len(),
        resolved = session.resolved_anchors(),
        failed = session.failed_anchors(),
        local_anchors = tracker.live_anchors(),
        "walk finished"
    );
    for (key, record) in session.registry().snapshot() {
        info!(%key, location = %record.location.name, distance = format!("{:.1}m", record.marker.last_reported_distance()), "marker");
    }

    session.pause();
    session.shutdown();
    Ok(())
}
