use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::camera::CameraPort;

/// Images captured after one rising edge.
///
/// Immutable once built; ownership moves to the analysis worker on enqueue.
#[derive(Clone, Debug)]
pub struct BurstSession {
    session_id: Uuid,
    images: Vec<Vec<u8>>,
    captured_at: DateTime<Utc>,
}

impl BurstSession {
    pub fn new(images: Vec<Vec<u8>>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            images,
            captured_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Evidence group key: the hyphenated session id.
    pub fn group_id(&self) -> String {
        self.session_id.to_string()
    }

    pub fn images(&self) -> &[Vec<u8>] {
        &self.images
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Take up to `count` snapshots, `interval` apart.
///
/// Failed snapshots are logged and skipped. The returned images keep capture
/// order; an empty vector means every request failed.
pub fn capture_images(camera: &mut dyn CameraPort, count: u32, interval: Duration) -> Vec<Vec<u8>> {
    let mut images = Vec::with_capacity(count as usize);
    for attempt in 1..=count {
        match camera.capture_snapshot() {
            Ok(Some(image)) => images.push(image),
            Ok(None) => {
                log::warn!(
                    target: "sentinel::capture",
                    "snapshot {}/{} returned no data, skipped",
                    attempt,
                    count
                );
            }
            Err(e) => {
                log::warn!(
                    target: "sentinel::capture",
                    "snapshot {}/{} failed, skipped: {}",
                    attempt,
                    count,
                    e
                );
            }
        }
        if attempt < count && !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
    images
}

/// Capture a burst and wrap it in a session. `None` when no snapshot succeeded.
pub fn capture_burst(
    camera: &mut dyn CameraPort,
    count: u32,
    interval: Duration,
) -> Option<BurstSession> {
    let images = capture_images(camera, count, interval);
    if images.is_empty() {
        log::warn!(
            target: "sentinel::capture",
            "burst discarded: all {} snapshots failed",
            count
        );
        return None;
    }
    let session = BurstSession::new(images);
    log::info!(
        target: "sentinel::capture",
        "burst {} captured: {}/{} images",
        session.session_id(),
        session.images().len(),
        count
    );
    Some(session)
}
