use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;

/// Which probe a service is checked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    OpenVpn,
    Proxy,
    Generic,
}

impl ProbeKind {
    /// Unknown or missing types are probed as plain HTTP endpoints.
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared {
            Some("openvpn") => ProbeKind::OpenVpn,
            Some("proxy") => ProbeKind::Proxy,
            _ => ProbeKind::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::OpenVpn => "openvpn",
            ProbeKind::Proxy => "proxy",
            ProbeKind::Generic => "generic",
        }
    }
}

/// Verdict of a single probe. `reason` is empty when there is nothing to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub is_up: bool,
    pub reason: String,
}

impl ProbeOutcome {
    pub fn up() -> Self {
        Self {
            is_up: true,
            reason: String::new(),
        }
    }

    pub fn down(reason: impl Into<String>) -> Self {
        Self {
            is_up: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub kind: ProbeKind,
    pub url: String,
    pub is_up: bool,
    pub reason: String,
    pub checked_at: DateTime<Utc>,
    pub latency_ms: Option<f64>,
}

impl StatusRecord {
    pub fn new(service: &ServiceConfig, outcome: ProbeOutcome, latency_ms: Option<f64>) -> Self {
        Self::finished_at(service, outcome, latency_ms, Utc::now())
    }

    /// Record for a probe that completed at `checked_at`.
    pub fn finished_at(
        service: &ServiceConfig,
        outcome: ProbeOutcome,
        latency_ms: Option<f64>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: service.name.clone(),
            service_type: service.service_type.clone(),
            kind: service.kind(),
            url: service.url.clone(),
            is_up: outcome.is_up,
            reason: outcome.reason,
            checked_at,
            latency_ms,
        }
    }

    /// Declared type, or the probe kind it fell back to.
    pub fn display_type(&self) -> &str {
        self.service_type.as_deref().unwrap_or(self.kind.as_str())
    }

    pub fn verdict(&self) -> &'static str {
        if self.is_up { "up" } else { "down" }
    }
}
