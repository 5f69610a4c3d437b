use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use cat_sentinel::config::BurstSettings;
use cat_sentinel::evidence::LATEST_FILE_NAME;
use cat_sentinel::worker::{self, SessionProcessor};
use cat_sentinel::{
    AiState, AutomationError, AutomationRoutes, AutomationSink, BurstAnalyzer, BurstSession,
    CameraPort, ClassifierCapability, ClassifierPort, ClassifyError, DetectionLoop,
    DetectionType, Edge, EvidenceStore, ImageVerdict, Sentinel, TransportError,
};

/// Camera that replays a script of AI flags, then fails every poll.
struct ScriptedCamera {
    ai_script: Vec<bool>,
    polls: usize,
    scene: &'static str,
    snapshots: usize,
    disconnected: Arc<AtomicBool>,
}

impl ScriptedCamera {
    fn new(ai_script: &[bool], scene: &'static str) -> Self {
        Self {
            ai_script: ai_script.to_vec(),
            polls: 0,
            scene,
            snapshots: 0,
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CameraPort for ScriptedCamera {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn poll_motion(&mut self) -> Result<bool, TransportError> {
        Ok(self.ai_script.get(self.polls).copied().unwrap_or(false))
    }

    fn poll_ai_state(&mut self) -> Result<AiState, TransportError> {
        let Some(active) = self.ai_script.get(self.polls).copied() else {
            return Err(TransportError::Unreachable("camera went away".into()));
        };
        self.polls += 1;
        Ok(AiState {
            dog_cat: active,
            people: false,
        })
    }

    fn capture_snapshot(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let frame = format!("{}-{}", self.scene, self.snapshots);
        self.snapshots += 1;
        Ok(Some(frame.into_bytes()))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Classifies by payload text and records every image it sees.
///
/// `prey` marks cat with prey, `cat` marks a cat, `slow` delays the answer and
/// `boom` panics.
struct PayloadClassifier {
    seen: Arc<Mutex<Vec<String>>>,
}

impl ClassifierPort for PayloadClassifier {
    fn name(&self) -> &'static str {
        "payload"
    }

    fn supports(&self, capability: ClassifierCapability) -> bool {
        capability == ClassifierCapability::SingleImage
    }

    fn classify_one(&mut self, image: &[u8]) -> Result<ImageVerdict, ClassifyError> {
        let text = String::from_utf8_lossy(image).into_owned();
        self.seen.lock().unwrap().push(text.clone());
        if text.contains("boom") {
            panic!("classifier exploded on {}", text);
        }
        if text.contains("slow") {
            std::thread::sleep(Duration::from_millis(200));
        }
        if text.contains("broken") {
            return Err(ClassifyError::Malformed("unreadable".into()));
        }
        Ok(ImageVerdict {
            cat: text.contains("cat"),
            prey: text.contains("prey"),
        })
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    triggered: Arc<Mutex<Vec<String>>>,
}

impl AutomationSink for RecordingSink {
    fn trigger(&mut self, automation_id: &str) -> Result<(), AutomationError> {
        self.triggered.lock().unwrap().push(automation_id.to_string());
        Ok(())
    }
}

fn routes() -> AutomationRoutes {
    AutomationRoutes {
        with_prey: "automation.prey".to_string(),
        without_prey: "automation.cat".to_string(),
    }
}

fn processor(seen: &Arc<Mutex<Vec<String>>>, sink: &RecordingSink) -> SessionProcessor {
    let classifier = PayloadClassifier { seen: seen.clone() };
    SessionProcessor::new(
        BurstAnalyzer::new(Box::new(classifier)),
        Box::new(sink.clone()),
        routes(),
    )
}

fn session(frames: &[&str]) -> BurstSession {
    BurstSession::new(frames.iter().map(|f| f.as_bytes().to_vec()).collect())
}

fn burst(count: u32) -> BurstSettings {
    BurstSettings {
        count,
        interval: Duration::ZERO,
    }
}

#[test]
fn one_burst_per_run_of_active_polls() {
    let mut camera = ScriptedCamera::new(&[false, true, true, true, false, false, true], "cat");
    let mut detection = DetectionLoop::new(burst(3), Duration::from_millis(1));
    let (tx, rx) = mpsc::channel::<BurstSession>();

    let mut edges = Vec::new();
    for _ in 0..7 {
        edges.push(detection.poll_once(&mut camera, &tx).unwrap());
    }
    drop(tx);

    assert_eq!(edges.iter().filter(|e| **e == Edge::Rising).count(), 2);
    let sessions: Vec<BurstSession> = rx.iter().collect();
    assert_eq!(sessions.len(), 2);
    assert_eq!(detection.bursts_captured(), 2);
    assert!(sessions.iter().all(|s| s.images().len() == 3));
    assert_ne!(sessions[0].session_id(), sessions[1].session_id());
    assert_eq!(sessions[0].images()[0], b"cat-0".to_vec());
    assert_eq!(sessions[1].images()[0], b"cat-3".to_vec());
}

#[test]
fn detection_loop_stops_on_poll_failure() {
    let mut camera = ScriptedCamera::new(&[false, true], "cat");
    let mut detection = DetectionLoop::new(burst(1), Duration::from_millis(1));
    let (tx, rx) = mpsc::channel::<BurstSession>();
    let stop = AtomicBool::new(false);

    let result = detection.run(&mut camera, &tx, &stop);

    assert!(matches!(result, Err(TransportError::Unreachable(_))));
    drop(tx);
    assert_eq!(rx.iter().count(), 1);
}

#[test]
fn detection_loop_honours_stop_flag() {
    let mut camera = ScriptedCamera::new(&[true; 4], "cat");
    let mut detection = DetectionLoop::new(burst(1), Duration::from_millis(1));
    let (tx, _rx) = mpsc::channel::<BurstSession>();
    let stop = AtomicBool::new(true);

    assert!(detection.run(&mut camera, &tx, &stop).is_ok());
    assert_eq!(camera.polls, 0);
}

#[test]
fn worker_processes_sessions_in_submission_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::default();
    let handle = worker::spawn(processor(&seen, &sink)).unwrap();

    handle.submit(session(&["slow-first"]));
    handle.submit(session(&["second"]));
    handle.submit(session(&["third"]));

    let shutdown = handle.shutdown(Duration::from_secs(10));
    assert!(shutdown.drained);
    assert_eq!(shutdown.stats.sessions_submitted, 3);
    assert_eq!(shutdown.stats.sessions_completed, 3);
    assert_eq!(shutdown.stats.sessions_pending, 0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["slow-first".to_string(), "second".to_string(), "third".to_string()]
    );
}

#[test]
fn worker_survives_panicking_session() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::default();
    let handle = worker::spawn(processor(&seen, &sink)).unwrap();

    handle.submit(session(&["boom"]));
    handle.submit(session(&["cat+prey"]));

    let shutdown = handle.shutdown(Duration::from_secs(10));
    assert!(shutdown.drained);
    assert_eq!(shutdown.stats.sessions_failed, 1);
    assert_eq!(shutdown.stats.sessions_completed, 1);
    assert!(shutdown
        .stats
        .last_error
        .as_deref()
        .unwrap()
        .contains("exploded"));
    assert_eq!(*sink.triggered.lock().unwrap(), vec!["automation.prey".to_string()]);
}

#[test]
fn classifier_errors_count_as_negative() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::default();
    let mut processor = processor(&seen, &sink);

    let outcome = processor.process(session(&["broken", "broken"]));

    assert!(!outcome.verdict.cat);
    assert_eq!(outcome.verdict.best_index, None);
    assert_eq!(outcome.automation, None);
    assert!(sink.triggered.lock().unwrap().is_empty());
}

#[test]
fn session_persists_group_with_one_best_image() {
    let dir = tempfile::tempdir().unwrap();
    let store = EvidenceStore::open(dir.path()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::default();
    let mut processor = processor(&seen, &sink).with_evidence(store, 7);

    let burst = session(&["empty", "cat+prey", "cat"]);
    let group_id = burst.group_id();
    let outcome = processor.process(burst);

    assert_eq!(outcome.verdict.best_index, Some(1));
    assert_eq!(outcome.images_saved, 3);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.automation.as_deref(), Some("automation.prey"));
    // Early exit: the third image is never classified.
    assert_eq!(seen.lock().unwrap().len(), 2);

    let store = EvidenceStore::open(dir.path()).unwrap();
    let records = store.list().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .all(|r| r.group_id.as_deref() == Some(group_id.as_str())
            && r.detection_type == DetectionType::CatWithPrey));
    let best: Vec<_> = records.iter().filter(|r| r.is_best).collect();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].sequence_index, Some(1));
    assert_eq!(
        std::fs::read(dir.path().join(LATEST_FILE_NAME)).unwrap(),
        b"cat+prey"
    );
}

#[test]
fn negative_burst_still_names_a_best_image() {
    let dir = tempfile::tempdir().unwrap();
    let store = EvidenceStore::open(dir.path()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::default();
    let mut processor = processor(&seen, &sink).with_evidence(store, 7);

    processor.process(session(&["empty-0", "empty-1"]));

    let records = EvidenceStore::open(dir.path()).unwrap().list().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.detection_type == DetectionType::None));
    assert_eq!(records.iter().filter(|r| r.is_best).count(), 1);
    assert_eq!(
        std::fs::read(dir.path().join(LATEST_FILE_NAME)).unwrap(),
        b"empty-0"
    );
    assert!(sink.triggered.lock().unwrap().is_empty());
}

#[test]
fn sentinel_drains_worker_and_disconnects_on_camera_failure() {
    let camera = ScriptedCamera::new(&[false, true, true, false], "cat");
    let disconnected = camera.disconnected.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink::default();

    let sentinel = Sentinel::new(
        Box::new(camera),
        processor(&seen, &sink),
        DetectionLoop::new(burst(2), Duration::from_millis(1)),
        Duration::from_secs(10),
    );
    let stop = AtomicBool::new(false);

    let err = sentinel.run(&stop).unwrap_err();

    assert!(format!("{:#}", err).contains("camera went away"));
    assert!(disconnected.load(Ordering::SeqCst));
    assert_eq!(*sink.triggered.lock().unwrap(), vec!["automation.cat".to_string()]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["cat-0".to_string(), "cat-1".to_string()]
    );
}

#[test]
fn stub_deployment_runs_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let config = tempfile::NamedTempFile::new().unwrap();
    let json = serde_json::json!({
        "camera_ip": "stub://garden",
        "classifier": "stub",
        "images_dir": dir.path(),
        "burst_count": 2,
        "burst_interval_secs": 0.0,
        "poll_interval_ms": 1,
        "shutdown_grace_secs": 5
    });
    std::fs::write(config.path(), json.to_string()).unwrap();
    let cfg = cat_sentinel::SentinelConfig::load_from(Some(config.path())).unwrap();

    let sentinel = Sentinel::from_config(&cfg).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let stopper = {
        let stop = stop.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            stop.store(true, Ordering::SeqCst);
        })
    };

    let summary = sentinel.run(&stop).unwrap();
    stopper.join().unwrap();

    assert!(summary.bursts_captured >= 1);
    assert!(summary.worker_drained);
    assert_eq!(summary.worker.sessions_pending, 0);
    let records = EvidenceStore::open(dir.path()).unwrap().list().unwrap();
    assert_eq!(records.len() as u64, summary.bursts_captured * 2);
    assert!(dir.path().join(LATEST_FILE_NAME).exists());
}
