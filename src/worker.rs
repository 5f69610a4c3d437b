//! Analysis worker.
//!
//! One background thread drains an unbounded FIFO channel of burst sessions.
//! Each session runs to completion (classification, evidence, automation,
//! retention) before the next one starts, so at most one unit of work touches
//! `latest.jpg` or the automation sink at any time.
//!
//! Submitting never blocks the detection loop. Shutdown enqueues a sentinel
//! behind any pending sessions and waits a bounded grace period; a worker that
//! is still busy after that is detached.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

use crate::automation::{AutomationRoutes, AutomationSink};
use crate::capture::BurstSession;
use crate::classify::{BurstAnalyzer, BurstVerdict, DetectionType};
use crate::evidence::EvidenceStore;

enum WorkItem {
    Analyze(BurstSession),
    Shutdown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub sessions_submitted: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_pending: u64,
    pub last_error: Option<String>,
}

/// How the worker ended.
#[derive(Clone, Debug)]
pub struct WorkerShutdown {
    /// False when the grace period ran out before the queue was drained.
    pub drained: bool,
    pub stats: WorkerStats,
}

/// Result of processing one session.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub verdict: BurstVerdict,
    pub images_saved: usize,
    pub automation: Option<String>,
    pub failures: Vec<String>,
}

/// Everything one session needs after capture: analysis, evidence, automation.
pub struct SessionProcessor {
    analyzer: BurstAnalyzer,
    sink: Box<dyn AutomationSink>,
    routes: AutomationRoutes,
    store: Option<EvidenceStore>,
    retention_days: u32,
}

impl SessionProcessor {
    pub fn new(
        analyzer: BurstAnalyzer,
        sink: Box<dyn AutomationSink>,
        routes: AutomationRoutes,
    ) -> Self {
        Self {
            analyzer,
            sink,
            routes,
            store: None,
            retention_days: 0,
        }
    }

    /// Persist evidence to `store` and sweep it with `retention_days` after each session.
    pub fn with_evidence(mut self, store: EvidenceStore, retention_days: u32) -> Self {
        self.store = Some(store);
        self.retention_days = retention_days;
        self
    }

    pub fn process(&mut self, session: BurstSession) -> SessionOutcome {
        let session_id = session.session_id();
        let group_id = session.group_id();
        let images = session.images();
        log::info!(
            target: "sentinel::worker",
            "analyzing burst {} ({} images, captured {})",
            session_id,
            images.len(),
            session.captured_at().format("%Y-%m-%d %H:%M:%S")
        );

        let verdict = self.analyzer.analyze(images);
        let detection = verdict.detection_type();
        match detection {
            DetectionType::CatWithPrey => log::warn!(
                target: "sentinel::worker",
                "ALERT: cat with prey in burst {} (best image {:?}, {:?} strategy)",
                session_id,
                verdict.best_index,
                verdict.strategy
            ),
            DetectionType::Cat => log::info!(
                target: "sentinel::worker",
                "cat without prey in burst {} (best image {:?}, {:?} strategy)",
                session_id,
                verdict.best_index,
                verdict.strategy
            ),
            DetectionType::None => log::info!(
                target: "sentinel::worker",
                "no cat in burst {} ({:?} strategy)",
                session_id,
                verdict.strategy
            ),
        }

        let mut outcome = SessionOutcome {
            session_id,
            verdict,
            images_saved: 0,
            automation: None,
            failures: Vec::new(),
        };

        // Negative bursts still designate their first image so every group has one best image.
        let best_index = verdict.best_index.unwrap_or(0);
        if let Some(store) = &self.store {
            for (index, image) in images.iter().enumerate() {
                match store.save(
                    image,
                    detection,
                    &group_id,
                    index == best_index,
                    Some(index as u32),
                ) {
                    Ok(_) => outcome.images_saved += 1,
                    Err(e) => {
                        log::error!(target: "sentinel::worker", "evidence not saved: {}", e);
                        outcome.failures.push(e.to_string());
                    }
                }
            }
        }

        if let Some(automation_id) = self.routes.route(detection) {
            match self.sink.trigger(automation_id) {
                Ok(()) => outcome.automation = Some(automation_id.to_string()),
                Err(e) => {
                    log::error!(
                        target: "sentinel::worker",
                        "automation {} failed: {}",
                        automation_id,
                        e
                    );
                    outcome.failures.push(e.to_string());
                }
            }
        } else if detection != DetectionType::None {
            log::debug!(
                target: "sentinel::worker",
                "no automation configured for {}",
                detection.as_str()
            );
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.sweep(self.retention_days) {
                log::error!(target: "sentinel::worker", "retention sweep failed: {}", e);
                outcome.failures.push(e.to_string());
            }
        }

        outcome
    }
}

/// Handle to the running worker thread.
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkItem>,
    stats: Arc<Mutex<WorkerStats>>,
    done_rx: mpsc::Receiver<()>,
    join: Option<JoinHandle<()>>,
}

/// Start the worker thread.
pub fn spawn(processor: SessionProcessor) -> std::io::Result<WorkerHandle> {
    let (tx, rx) = mpsc::channel::<WorkItem>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let stats = Arc::new(Mutex::new(WorkerStats::default()));
    let stats_thread = stats.clone();

    let join = std::thread::Builder::new()
        .name("analysis-worker".to_string())
        .spawn(move || {
            run_worker(rx, processor, stats_thread);
            let _ = done_tx.send(());
        })?;

    Ok(WorkerHandle {
        tx,
        stats,
        done_rx,
        join: Some(join),
    })
}

impl WorkerHandle {
    /// Queue a session. Never blocks; returns false if the worker has exited.
    pub fn submit(&self, session: BurstSession) -> bool {
        let session_id = session.session_id();
        // Counted before the send; the worker decrements on completion.
        let pending = {
            let mut stats = lock_stats(&self.stats);
            stats.sessions_submitted += 1;
            stats.sessions_pending += 1;
            stats.sessions_pending
        };
        if self.tx.send(WorkItem::Analyze(session)).is_err() {
            let mut stats = lock_stats(&self.stats);
            stats.sessions_submitted -= 1;
            stats.sessions_pending = stats.sessions_pending.saturating_sub(1);
            log::error!(
                target: "sentinel::worker",
                "worker not running, burst {} dropped",
                session_id
            );
            return false;
        }
        log::debug!(
            target: "sentinel::worker",
            "burst {} queued ({} pending)",
            session_id,
            pending
        );
        true
    }

    pub fn stats(&self) -> WorkerStats {
        lock_stats(&self.stats).clone()
    }

    /// Drain queued sessions and stop, waiting at most `grace`.
    ///
    /// A worker still busy after `grace` is left to finish on its own.
    pub fn shutdown(mut self, grace: Duration) -> WorkerShutdown {
        log::info!(
            target: "sentinel::worker",
            "stopping analysis worker ({} sessions pending)",
            self.stats().sessions_pending
        );
        let _ = self.tx.send(WorkItem::Shutdown);

        let drained = match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(join) = self.join.take() {
                    if join.join().is_err() {
                        log::error!(target: "sentinel::worker", "analysis worker thread panicked");
                    }
                }
                log::info!(target: "sentinel::worker", "analysis worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    target: "sentinel::worker",
                    "analysis worker still busy after {:.1}s, not waiting any longer",
                    grace.as_secs_f64()
                );
                false
            }
        };
        WorkerShutdown {
            drained,
            stats: self.stats(),
        }
    }
}

fn run_worker(
    rx: mpsc::Receiver<WorkItem>,
    mut processor: SessionProcessor,
    stats: Arc<Mutex<WorkerStats>>,
) {
    log::info!(target: "sentinel::worker", "analysis worker started");

    while let Ok(item) = rx.recv() {
        let session = match item {
            WorkItem::Analyze(session) => session,
            WorkItem::Shutdown => break,
        };
        let session_id = session.session_id();

        let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(session)));

        let mut stats = lock_stats(&stats);
        stats.sessions_pending = stats.sessions_pending.saturating_sub(1);
        match result {
            Ok(outcome) if outcome.failures.is_empty() => {
                stats.sessions_completed += 1;
            }
            Ok(outcome) => {
                stats.sessions_completed += 1;
                stats.sessions_failed += 1;
                stats.last_error = outcome.failures.last().cloned();
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!(
                    target: "sentinel::worker",
                    "burst {} aborted: {}",
                    session_id,
                    message
                );
                stats.sessions_failed += 1;
                stats.last_error = Some(message);
            }
        }
    }

    log::info!(target: "sentinel::worker", "analysis worker exiting");
}

fn lock_stats(stats: &Mutex<WorkerStats>) -> MutexGuard<'_, WorkerStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
