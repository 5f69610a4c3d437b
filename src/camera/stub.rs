use super::{AiState, CameraPort};
use crate::error::TransportError;

/// Polls between synthetic visits.
const VISIT_PERIOD: u64 = 40;
/// Polls a synthetic visitor stays in frame.
const VISIT_LENGTH: u64 = 8;

/// Scenes cycled through by consecutive visits.
const SCENES: [&str; 3] = ["cat", "cat+prey", "empty"];

/// Synthetic camera for `stub://` addresses.
///
/// Simulates a visitor every `VISIT_PERIOD` polls. Snapshot payloads carry a
/// plain-text scene marker that `StubClassifier` understands.
pub struct StubCamera {
    address: String,
    polls: u64,
    snapshots: u64,
    connected: bool,
}

impl StubCamera {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            polls: 0,
            snapshots: 0,
            connected: false,
        }
    }

    fn visitor_present(&self) -> bool {
        self.polls % VISIT_PERIOD >= VISIT_PERIOD - VISIT_LENGTH
    }

    fn current_scene(&self) -> &'static str {
        let visit = (self.polls / VISIT_PERIOD) as usize;
        SCENES[visit % SCENES.len()]
    }
}

impl CameraPort for StubCamera {
    fn name(&self) -> &'static str {
        "stub"
    }

    /// Synthetic cameras are always reachable.
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        log::info!(target: "sentinel::camera", "connected to {} (synthetic)", self.address);
        Ok(())
    }

    fn poll_motion(&mut self) -> Result<bool, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(self.visitor_present())
    }

    // Each AI poll advances the synthetic clock by one tick.
    fn poll_ai_state(&mut self) -> Result<AiState, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.polls += 1;
        Ok(AiState {
            dog_cat: self.visitor_present(),
            people: false,
        })
    }

    fn capture_snapshot(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.snapshots += 1;
        let scene = if self.visitor_present() {
            self.current_scene()
        } else {
            "empty"
        };
        Ok(Some(
            format!("stub-frame:{}:{}", self.snapshots, scene).into_bytes(),
        ))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }
}
