//! Reolink CGI camera client.
//!
//! Commands are JSON arrays POSTed to `/cgi-bin/api.cgi?cmd=<Command>&token=<token>`;
//! snapshots are fetched with `GET /cgi-bin/api.cgi?cmd=Snap`. The session token
//! comes from `Login` and is released with `Logout`.

use anyhow::{anyhow, Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::{AiState, CameraPort};
use crate::config::CameraSettings;
use crate::error::TransportError;

const MAX_SNAPSHOT_BYTES: u64 = 5 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const API_PATH: &str = "/cgi-bin/api.cgi";

pub struct ReolinkCamera {
    agent: ureq::Agent,
    base: Url,
    username: String,
    password: String,
    channel: u8,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    cmd: String,
    code: i64,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    #[serde(rename = "rspCode", default)]
    rsp_code: i64,
    #[serde(default)]
    detail: String,
}

impl ReolinkCamera {
    pub fn new(settings: &CameraSettings) -> Result<Self> {
        let base = parse_base_url(&settings.address)?;
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Ok(Self {
            agent,
            base,
            username: settings.username.clone(),
            password: settings.password.clone(),
            channel: settings.channel,
            token: None,
        })
    }

    fn api_url(&self, cmd: &str, token: Option<&str>) -> Url {
        let mut url = self.base.clone();
        url.set_path(API_PATH);
        url.query_pairs_mut().append_pair("cmd", cmd);
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        url
    }

    fn post(&self, cmd: &str, param: Value, token: Option<&str>) -> Result<Value, TransportError> {
        let url = self.api_url(cmd, token);
        let body = json!([{ "cmd": cmd, "action": 0, "param": param }]);
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
            .map_err(TransportError::from_ureq)?;
        let text = response
            .into_string()
            .map_err(|e| TransportError::Malformed(format!("read {} reply: {}", cmd, e)))?;
        parse_command_reply(cmd, &text)
    }

    fn command(&self, cmd: &str, param: Value) -> Result<Value, TransportError> {
        let token = self.token.as_deref().ok_or(TransportError::NotConnected)?;
        self.post(cmd, param, Some(token))
    }
}

impl CameraPort for ReolinkCamera {
    fn name(&self) -> &'static str {
        "reolink"
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        let login = json!({
            "User": {
                "Version": "0",
                "userName": self.username,
                "password": self.password,
            }
        });
        let value = self.post("Login", login, None)?;
        let token = value
            .pointer("/Token/name")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Malformed("login reply without token".to_string()))?;
        self.token = Some(token.to_string());

        // A first state read proves the token is usable before monitoring starts.
        self.poll_motion()?;
        log::info!(
            target: "sentinel::camera",
            "camera connection established ({}, channel {})",
            self.base,
            self.channel
        );
        Ok(())
    }

    fn poll_motion(&mut self) -> Result<bool, TransportError> {
        let value = self.command("GetMdState", json!({ "channel": self.channel }))?;
        parse_motion_state(&value)
    }

    fn poll_ai_state(&mut self) -> Result<AiState, TransportError> {
        let value = self.command("GetAiState", json!({ "channel": self.channel }))?;
        parse_ai_state(&value)
    }

    fn capture_snapshot(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let token = self.token.as_deref().ok_or(TransportError::NotConnected)?;
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let mut url = self.api_url("Snap", Some(token));
        url.query_pairs_mut()
            .append_pair("channel", &self.channel.to_string())
            .append_pair("rs", &nonce);

        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(TransportError::from_ureq)?;
        let is_json = response.content_type().contains("json");
        let bytes = read_limited(response.into_reader(), MAX_SNAPSHOT_BYTES)?;

        if is_json {
            let text = String::from_utf8_lossy(&bytes);
            parse_command_reply("Snap", &text)?;
            return Ok(None);
        }
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.token.is_none() {
            return Ok(());
        }
        let result = self.command("Logout", json!({}));
        self.token = None;
        result.map(|_| ())
    }
}

/// Read a whole body, rejecting anything larger than `limit` instead of truncating it.
fn read_limited(reader: impl Read, limit: u64) -> Result<Vec<u8>, TransportError> {
    let mut bytes = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| TransportError::Unreachable(format!("read snapshot: {}", e)))?;
    if bytes.len() as u64 > limit {
        return Err(TransportError::Malformed(format!(
            "snapshot exceeds {} bytes",
            limit
        )));
    }
    Ok(bytes)
}

fn parse_base_url(address: &str) -> Result<Url> {
    let address = address.trim();
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let url = Url::parse(&candidate).context("parse camera address")?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected http(s) or stub",
            other
        )),
    }
}

fn parse_command_reply(cmd: &str, text: &str) -> Result<Value, TransportError> {
    let replies: Vec<CommandReply> = serde_json::from_str(text)
        .map_err(|e| TransportError::Malformed(format!("{} reply: {}", cmd, e)))?;
    let reply = replies
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Malformed(format!("{} reply is empty", cmd)))?;
    if reply.code != 0 {
        let (code, detail) = match reply.error {
            Some(err) => (err.rsp_code, err.detail),
            None => (reply.code, String::new()),
        };
        return Err(TransportError::Command {
            command: reply.cmd,
            code,
            detail,
        });
    }
    Ok(reply.value.unwrap_or(Value::Null))
}

fn parse_motion_state(value: &Value) -> Result<bool, TransportError> {
    value
        .get("state")
        .and_then(Value::as_i64)
        .map(|state| state == 1)
        .ok_or_else(|| TransportError::Malformed("GetMdState reply without state".to_string()))
}

fn parse_ai_state(value: &Value) -> Result<AiState, TransportError> {
    let alarm = |label: &str| -> Option<bool> {
        value
            .get(label)?
            .get("alarm_state")
            .and_then(Value::as_i64)
            .map(|state| state == 1)
    };
    if value.get("dog_cat").is_none() && value.get("people").is_none() {
        return Err(TransportError::Malformed(
            "GetAiState reply without dog_cat or people".to_string(),
        ));
    }
    Ok(AiState {
        dog_cat: alarm("dog_cat").unwrap_or(false),
        people: alarm("people").unwrap_or(false),
    })
}
