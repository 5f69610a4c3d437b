//! Camera port.
//!
//! The detection loop talks to the camera only through `CameraPort`:
//! - Reolink-style CGI cameras over HTTP(S)
//! - Stub camera (`stub://`) for demos and tests
//!
//! Every call may fail with a `TransportError`. The caller decides whether a
//! failure is recoverable (a dropped burst frame) or fatal (a failed poll).

pub mod reolink;
pub mod stub;

use anyhow::Result;

use crate::config::CameraSettings;
use crate::error::TransportError;

pub use reolink::ReolinkCamera;
pub use stub::StubCamera;

/// Camera-side AI detection flags for one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AiState {
    pub dog_cat: bool,
    pub people: bool,
}

impl AiState {
    /// True when any monitored label is active.
    pub fn any_active(&self) -> bool {
        self.dog_cat || self.people
    }
}

pub trait CameraPort: Send {
    /// Adapter identifier, for logs.
    fn name(&self) -> &'static str;

    /// Establish a session with the device.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Current motion-detection flag.
    fn poll_motion(&mut self) -> Result<bool, TransportError>;

    /// Current AI detection flags.
    fn poll_ai_state(&mut self) -> Result<AiState, TransportError>;

    /// Fetch one JPEG snapshot. `Ok(None)` means the camera answered without image data.
    fn capture_snapshot(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Release the device session.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Build the camera adapter selected by the configured address.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn CameraPort>> {
    if settings.is_stub() {
        Ok(Box::new(StubCamera::new(&settings.address)))
    } else {
        Ok(Box::new(ReolinkCamera::new(settings)?))
    }
}
