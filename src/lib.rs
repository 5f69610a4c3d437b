//! Cat Sentinel
//!
//! Watches a network camera for cats and decides, per visit, whether the cat
//! is carrying prey.
//!
//! # Architecture
//!
//! Two threads with one handoff:
//!
//! 1. **Detection loop** (caller's thread): polls motion and AI flags, and on
//!    each idle-to-active transition captures a short burst of snapshots.
//! 2. **Analysis worker** (one background thread): drains bursts in FIFO order,
//!    classifies them, persists evidence, triggers automations and enforces
//!    retention.
//!
//! The loop never waits on classification; the worker never touches the
//! camera. A burst is owned by exactly one side at a time.
//!
//! # Module Structure
//!
//! - `camera`: camera port, Reolink CGI adapter, stub camera
//! - `capture`: burst capture and `BurstSession`
//! - `classify`: classifier port, Gemini and stub backends, burst analysis
//! - `evidence`: filename codec, evidence store, retention sweep
//! - `automation`: automation routing and the Home Assistant sink
//! - `detection`: edge detector and detection loop
//! - `worker`: analysis worker and session processing
//! - `sentinel`: orchestrator and shutdown sequence
//! - `config`: options file, environment overrides, validation

pub mod automation;
pub mod camera;
pub mod capture;
pub mod classify;
pub mod config;
pub mod detection;
pub mod error;
pub mod evidence;
pub mod sentinel;
pub mod worker;

pub use automation::{AutomationRoutes, AutomationSink, HomeAssistantSink};
pub use camera::{open_camera, AiState, CameraPort, ReolinkCamera, StubCamera};
pub use capture::{capture_burst, capture_images, BurstSession};
pub use classify::{
    AnalysisStrategy, BurstAnalyzer, BurstVerdict, ClassifierCapability, ClassifierPort,
    DetectionType, GeminiClassifier, ImageVerdict, JointVerdict, StubClassifier,
};
pub use config::SentinelConfig;
pub use detection::{DetectionLoop, DetectionState, Edge, EdgeDetector, SessionSink};
pub use error::{AutomationError, ClassifyError, EvidenceError, TransportError};
pub use evidence::{EvidenceRecord, EvidenceStore, SweepReport};
pub use sentinel::{RunSummary, Sentinel};
pub use worker::{SessionOutcome, SessionProcessor, WorkerHandle, WorkerShutdown, WorkerStats};
