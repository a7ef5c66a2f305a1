//! Best-effort event and error reporting to a Plausible-compatible endpoint.

use color_eyre::{eyre::eyre, Report, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

use crate::config::AnalyticsConfig;
use crate::http::{Network, Request};

/// Event name used for worker errors.
pub const ERROR_EVENT: &str = "Error (Service Worker)";

/// Reporter for analytics events. Never fails; problems are only logged.
pub struct Analytics {
  target: Option<(String, Url)>,
  /// Page URL reported with every event
  location: Url,
  network: Arc<dyn Network>,
}

impl Analytics {
  pub fn new(config: &AnalyticsConfig, location: Url, network: Arc<dyn Network>) -> Result<Self> {
    let target = match config.domain.as_deref().filter(|d| !d.is_empty()) {
      Some(domain) => {
        let endpoint = Url::parse(&config.endpoint)
          .map_err(|e| eyre!("Invalid analytics endpoint '{}': {}", config.endpoint, e))?;
        Some((domain.to_string(), endpoint))
      }
      None => None,
    };

    Ok(Self {
      target,
      location,
      network,
    })
  }

  pub fn is_enabled(&self) -> bool {
    self.target.is_some()
  }

  /// Request body for an event, `None` when reporting is disabled.
  fn payload(&self, name: &str, props: Option<&Map<String, Value>>) -> Option<(Url, Value)> {
    let (domain, endpoint) = self.target.as_ref()?;

    let mut payload = json!({
      "n": name,
      "u": self.location.as_str(),
      "d": domain,
      "r": null,
    });
    if let Some(props) = props {
      // props are sent as a JSON string
      payload["p"] = Value::String(Value::Object(props.clone()).to_string());
    }

    Some((endpoint.clone(), payload))
  }

  /// Send an event.
  pub async fn event(&self, name: &str, props: Option<Map<String, Value>>) {
    let Some((endpoint, payload)) = self.payload(name, props.as_ref()) else {
      return;
    };

    let request = Request::post(endpoint, "text/plain", payload.to_string().into_bytes());
    match self.network.fetch(request).await {
      Ok(response) => debug!("analytics: {} -> {}", name, response.status),
      Err(e) => error!("reporting event failed: {:#}", e),
    }
  }

  /// Report an error caught by the worker's global error listener.
  pub async fn report_error(&self, source: &str, err: &Report) {
    let key = format!("{}: {}", source, err);
    let value = err
      .chain()
      .map(|cause| cause.to_string())
      .collect::<Vec<_>>()
      .join(" - ");
    debug!("report error {} {}", key, value);

    self.event(ERROR_EVENT, Some(props(key, value))).await;
  }
}

/// Single-entry props map.
pub fn props(key: impl Into<String>, value: impl Into<String>) -> Map<String, Value> {
  let mut map = Map::new();
  map.insert(key.into(), Value::String(value.into()));
  map
}
