//! Orchestrator: wires the camera, detection loop and analysis worker together
//! and owns the shutdown sequence.

use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::automation::{AutomationRoutes, HomeAssistantSink};
use crate::camera::{open_camera, CameraPort};
use crate::classify::{BurstAnalyzer, ClassifierPort, GeminiClassifier, StubClassifier};
use crate::config::{ClassifierKind, SentinelConfig};
use crate::detection::DetectionLoop;
use crate::evidence::EvidenceStore;
use crate::worker::{self, SessionProcessor, WorkerStats};

/// Final state of a run that stopped on request.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub bursts_captured: u64,
    pub worker: WorkerStats,
    /// False when the worker was still busy when the grace period ran out.
    pub worker_drained: bool,
}

pub struct Sentinel {
    camera: Box<dyn CameraPort>,
    processor: SessionProcessor,
    detection: DetectionLoop,
    shutdown_grace: Duration,
}

impl Sentinel {
    pub fn new(
        camera: Box<dyn CameraPort>,
        processor: SessionProcessor,
        detection: DetectionLoop,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            camera,
            processor,
            detection,
            shutdown_grace,
        }
    }

    /// Build the production adapters described by `cfg`.
    pub fn from_config(cfg: &SentinelConfig) -> Result<Self> {
        let camera = open_camera(&cfg.camera)?;

        let classifier: Box<dyn ClassifierPort> = match cfg.classifier.kind {
            ClassifierKind::Gemini => Box::new(GeminiClassifier::new(&cfg.classifier)),
            ClassifierKind::Stub => Box::new(StubClassifier::new()),
        };
        let analyzer = BurstAnalyzer::new(classifier);
        log::info!(
            target: "sentinel::run",
            "classifier backend: {}",
            analyzer.backend_name()
        );

        let sink = Box::new(HomeAssistantSink::new(&cfg.automation));
        let mut processor = SessionProcessor::new(
            analyzer,
            sink,
            AutomationRoutes::from_settings(&cfg.automation),
        );
        if cfg.evidence.save_images {
            let store = EvidenceStore::open(&cfg.evidence.images_dir)
                .context("failed to open evidence directory")?;
            log::info!(
                target: "sentinel::run",
                "evidence directory: {} (retention {} days)",
                store.dir().display(),
                cfg.evidence.retention_days
            );
            processor = processor.with_evidence(store, cfg.evidence.retention_days);
        } else {
            log::info!(target: "sentinel::run", "image saving disabled");
        }

        let detection = DetectionLoop::new(cfg.burst.clone(), cfg.poll_interval);
        Ok(Self::new(camera, processor, detection, cfg.shutdown_grace))
    }

    /// Run until `stop` is set or the camera fails.
    ///
    /// Whatever ends the loop, the worker is drained within the grace period
    /// and the camera session is released.
    pub fn run(self, stop: &AtomicBool) -> Result<RunSummary> {
        let Sentinel {
            mut camera,
            processor,
            mut detection,
            shutdown_grace,
        } = self;

        if let Err(e) = camera.connect() {
            release(camera.as_mut());
            return Err(e).context(format!("failed to connect to camera {}", camera.name()));
        }
        log::info!(target: "sentinel::run", "connected to camera {}", camera.name());

        let worker = match worker::spawn(processor) {
            Ok(worker) => worker,
            Err(e) => {
                release(camera.as_mut());
                return Err(e).context("failed to start analysis worker");
            }
        };

        let outcome = detection.run(camera.as_mut(), &worker, stop);

        let stats = worker.stats();
        log::info!(
            target: "sentinel::run",
            "monitoring ended: bursts={} submitted={} completed={} failed={}",
            detection.bursts_captured(),
            stats.sessions_submitted,
            stats.sessions_completed,
            stats.sessions_failed
        );
        let shutdown = worker.shutdown(shutdown_grace);
        release(camera.as_mut());

        outcome.context("camera monitoring failed")?;
        Ok(RunSummary {
            bursts_captured: detection.bursts_captured(),
            worker: shutdown.stats,
            worker_drained: shutdown.drained,
        })
    }
}

fn release(camera: &mut dyn CameraPort) {
    if let Err(e) = camera.disconnect() {
        log::warn!(target: "sentinel::run", "camera disconnect failed: {}", e);
    }
}
