//! Automation sink.
//!
//! Home Assistant automations are triggered through
//! `POST <endpoint>` with `{"entity_id": "<automation id>"}` and the supervisor
//! bearer token. The primary endpoint is the supervisor proxy; on failure the
//! core API endpoint is tried once.

use serde::Serialize;

use crate::classify::DetectionType;
use crate::config::AutomationSettings;
use crate::error::AutomationError;

pub trait AutomationSink: Send {
    /// Trigger one automation. An empty id is a no-op.
    fn trigger(&mut self, automation_id: &str) -> Result<(), AutomationError>;
}

/// Automation ids for each detection outcome.
#[derive(Clone, Debug, Default)]
pub struct AutomationRoutes {
    pub with_prey: String,
    pub without_prey: String,
}

impl AutomationRoutes {
    pub fn from_settings(settings: &AutomationSettings) -> Self {
        Self {
            with_prey: settings.with_prey.clone(),
            without_prey: settings.without_prey.clone(),
        }
    }

    /// Automation for a detection outcome; `None` when nothing should run.
    pub fn route(&self, detection: DetectionType) -> Option<&str> {
        let id = match detection {
            DetectionType::CatWithPrey => &self.with_prey,
            DetectionType::Cat => &self.without_prey,
            DetectionType::None => return None,
        };
        (!id.trim().is_empty()).then_some(id.as_str())
    }
}

#[derive(Serialize)]
struct TriggerRequest<'a> {
    entity_id: &'a str,
}

pub struct HomeAssistantSink {
    agent: ureq::Agent,
    primary_url: String,
    fallback_url: String,
    token: Option<String>,
}

impl HomeAssistantSink {
    pub fn new(settings: &AutomationSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self {
            agent,
            primary_url: settings.primary_url.clone(),
            fallback_url: settings.fallback_url.clone(),
            token: settings.token.clone(),
        }
    }

    fn post(&self, url: &str, token: &str, body: &str) -> Result<(), AutomationError> {
        match self
            .agent
            .post(url)
            .set("Authorization", &format!("Bearer {}", token))
            .set("Content-Type", "application/json")
            .send_string(body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(AutomationError::Status {
                url: url.to_string(),
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(AutomationError::Transport {
                url: url.to_string(),
                detail: transport.to_string(),
            }),
        }
    }
}

impl AutomationSink for HomeAssistantSink {
    fn trigger(&mut self, automation_id: &str) -> Result<(), AutomationError> {
        if automation_id.trim().is_empty() {
            log::warn!(target: "sentinel::automation", "no automation id configured, skipping");
            return Ok(());
        }
        let token = self.token.as_deref().ok_or(AutomationError::MissingToken)?;
        let body = serde_json::to_string(&TriggerRequest {
            entity_id: automation_id,
        })
        .unwrap_or_default();

        log::info!(target: "sentinel::automation", "triggering automation {}", automation_id);
        let primary_err = match self.post(&self.primary_url, token, &body) {
            Ok(()) => {
                log::info!(target: "sentinel::automation", "automation {} triggered", automation_id);
                return Ok(());
            }
            Err(e) => e,
        };
        log::error!(target: "sentinel::automation", "{}", primary_err);
        log::info!(
            target: "sentinel::automation",
            "retrying automation {} via {}",
            automation_id,
            self.fallback_url
        );

        self.post(&self.fallback_url, token, &body)?;
        log::info!(
            target: "sentinel::automation",
            "automation {} triggered via fallback endpoint",
            automation_id
        );
        Ok(())
    }
}
