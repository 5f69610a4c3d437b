//! Home Assistant sink against local HTTP endpoints.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cat_sentinel::config::AutomationSettings;
use cat_sentinel::{AutomationError, AutomationSink, HomeAssistantSink};

const TRIGGER_PATH: &str = "/api/services/automation/trigger";

/// One request as seen by an endpoint.
#[derive(Clone, Debug)]
struct Received {
    authorization: String,
    body: String,
}

/// Answers every request with a fixed status and records what it received.
struct Endpoint {
    url: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl Endpoint {
    fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind endpoint");
        let url = format!("http://{}{}", listener.local_addr().unwrap(), TRIGGER_PATH);
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                answer(stream, status, &log);
            }
        });
        Self { url, received }
    }

    fn requests(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

fn answer(stream: TcpStream, status: u16, log: &Mutex<Vec<Received>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut content_length = 0usize;
    let mut authorization = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = value.trim().to_string(),
                _ => {}
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }
    log.lock().unwrap().push(Received {
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let payload = format!("status-{}", status);
    let reason = if status == 200 { "OK" } else { "Error" };
    let mut stream = stream;
    let _ = write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        payload.len(),
        payload
    );
    let _ = stream.flush();
}

fn sink(primary: &Endpoint, fallback: &Endpoint) -> HomeAssistantSink {
    HomeAssistantSink::new(&AutomationSettings {
        with_prey: "automation.lock_cat_flap".to_string(),
        without_prey: String::new(),
        primary_url: primary.url.clone(),
        fallback_url: fallback.url.clone(),
        token: Some("supervisor-secret".to_string()),
        timeout: Duration::from_secs(5),
    })
}

#[test]
fn primary_success_skips_fallback() {
    let primary = Endpoint::start(200);
    let fallback = Endpoint::start(200);

    sink(&primary, &fallback)
        .trigger("automation.lock_cat_flap")
        .expect("trigger");

    let requests = primary.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization, "Bearer supervisor-secret");
    assert_eq!(requests[0].body, r#"{"entity_id":"automation.lock_cat_flap"}"#);
    assert!(fallback.requests().is_empty());
}

#[test]
fn primary_failure_retries_fallback_once() {
    let primary = Endpoint::start(500);
    let fallback = Endpoint::start(200);

    sink(&primary, &fallback)
        .trigger("automation.lock_cat_flap")
        .expect("fallback should succeed");

    assert_eq!(primary.requests().len(), 1);
    let requests = fallback.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization, "Bearer supervisor-secret");
    assert_eq!(requests[0].body, r#"{"entity_id":"automation.lock_cat_flap"}"#);
}

#[test]
fn both_endpoints_failing_reports_fallback_status() {
    let primary = Endpoint::start(500);
    let fallback = Endpoint::start(503);

    let err = sink(&primary, &fallback)
        .trigger("automation.lock_cat_flap")
        .unwrap_err();

    match err {
        AutomationError::Status { url, status, body } => {
            assert_eq!(url, fallback.url);
            assert_eq!(status, 503);
            assert_eq!(body, "status-503");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(primary.requests().len(), 1);
    assert_eq!(fallback.requests().len(), 1);
}
