//! Detection loop.
//!
//! Polls the camera's motion and AI flags, and captures a burst on each
//! idle-to-active transition of the AI flags. The loop never waits on
//! classification: finished bursts are handed to a `SessionSink` and polling
//! resumes immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use crate::camera::{AiState, CameraPort};
use crate::capture::{capture_burst, BurstSession};
use crate::config::BurstSettings;
use crate::error::TransportError;
use crate::worker::WorkerHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceState {
    Idle,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Steady,
}

fn transition(state: PresenceState, active: bool) -> (PresenceState, Edge) {
    match (state, active) {
        (PresenceState::Idle, true) => (PresenceState::Active, Edge::Rising),
        (PresenceState::Active, false) => (PresenceState::Idle, Edge::Falling),
        (state, _) => (state, Edge::Steady),
    }
}

/// Rising/falling edge detector over the AI flags.
#[derive(Clone, Copy, Debug)]
pub struct EdgeDetector {
    state: PresenceState,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self {
            state: PresenceState::Idle,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn observe(&mut self, active: bool) -> Edge {
        let (next, edge) = transition(self.state, active);
        self.state = next;
        edge
    }
}

/// Last observed camera flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionState {
    pub motion_active: bool,
    pub animal_active: bool,
}

/// Receives captured bursts. Must not block.
pub trait SessionSink {
    fn enqueue(&self, session: BurstSession);
}

impl SessionSink for WorkerHandle {
    fn enqueue(&self, session: BurstSession) {
        self.submit(session);
    }
}

impl SessionSink for mpsc::Sender<BurstSession> {
    fn enqueue(&self, session: BurstSession) {
        if self.send(session).is_err() {
            log::warn!(target: "sentinel::detect", "session receiver gone, burst dropped");
        }
    }
}

pub struct DetectionLoop {
    edges: EdgeDetector,
    state: DetectionState,
    burst: BurstSettings,
    poll_interval: Duration,
    bursts_captured: u64,
}

impl DetectionLoop {
    pub fn new(burst: BurstSettings, poll_interval: Duration) -> Self {
        Self {
            edges: EdgeDetector::new(),
            state: DetectionState::default(),
            burst,
            poll_interval,
            bursts_captured: 0,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn bursts_captured(&self) -> u64 {
        self.bursts_captured
    }

    /// One poll cycle: read both flags, capture and enqueue on a rising edge.
    pub fn poll_once(
        &mut self,
        camera: &mut dyn CameraPort,
        sink: &dyn SessionSink,
    ) -> Result<Edge, TransportError> {
        let motion = camera.poll_motion()?;
        let ai: AiState = camera.poll_ai_state()?;

        if motion != self.state.motion_active {
            log::debug!(
                target: "sentinel::detect",
                "motion {}",
                if motion { "started" } else { "stopped" }
            );
        }
        self.state = DetectionState {
            motion_active: motion,
            animal_active: ai.any_active(),
        };

        let edge = self.edges.observe(self.state.animal_active);
        match edge {
            Edge::Rising => {
                log::info!(
                    target: "sentinel::detect",
                    "detection started (dog_cat={} people={} motion={}), capturing {} images",
                    ai.dog_cat,
                    ai.people,
                    motion,
                    self.burst.count
                );
                if let Some(session) = capture_burst(camera, self.burst.count, self.burst.interval)
                {
                    self.bursts_captured += 1;
                    sink.enqueue(session);
                }
            }
            Edge::Falling => {
                log::info!(target: "sentinel::detect", "detection ended");
            }
            Edge::Steady => {}
        }
        Ok(edge)
    }

    /// Poll until `stop` is set. A failed poll ends the loop with its error.
    pub fn run(
        &mut self,
        camera: &mut dyn CameraPort,
        sink: &dyn SessionSink,
        stop: &AtomicBool,
    ) -> Result<(), TransportError> {
        log::info!(
            target: "sentinel::detect",
            "monitoring {} every {}ms",
            camera.name(),
            self.poll_interval.as_millis()
        );
        while !stop.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_once(camera, sink) {
                log::error!(target: "sentinel::detect", "camera poll failed: {}", e);
                return Err(e);
            }
            std::thread::sleep(self.poll_interval);
        }
        log::info!(
            target: "sentinel::detect",
            "stop requested after {} bursts",
            self.bursts_captured
        );
        Ok(())
    }
}
