//! Request/response types and the network port used by the worker.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// Plain GET request.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  /// POST request with a body and content type.
  pub fn post(url: Url, content_type: &str, body: Vec<u8>) -> Self {
    Self {
      method: Method::POST,
      url,
      headers: vec![("Content-Type".to_string(), content_type.to_string())],
      body: Some(body),
    }
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }
}

/// A response as stored in the cache and handed back to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  /// Final URL after redirects
  pub url: Url,
  /// Whether the network followed at least one redirect
  pub redirected: bool,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  /// 200 response with the given body.
  #[cfg(test)]
  pub fn ok(url: Url, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status: 200,
      url,
      redirected: false,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// 302 redirect pointing at `location`.
  pub fn redirect(url: Url, location: &Url) -> Self {
    Self {
      status: 302,
      url,
      redirected: false,
      headers: vec![("Location".to_string(), location.to_string())],
      body: Vec::new(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Network port. Implementations perform the request or fail with a
/// transport error; HTTP error statuses are returned as responses.
pub trait Network: Send + Sync {
  fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response>>;
}

/// Network implementation backed by reqwest.
#[derive(Clone)]
pub struct ReqwestNetwork {
  client: reqwest::Client,
}

impl ReqwestNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("vplan-worker/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }

  async fn send(&self, request: Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let url = response.url().clone();
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?
      .to_vec();

    Ok(Response {
      status,
      redirected: url != request.url,
      url,
      headers,
      body,
    })
  }
}

impl Network for ReqwestNetwork {
  fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
    self.send(request).boxed()
  }
}

/// Network that is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

impl Network for OfflineNetwork {
  fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
    async move { Err(eyre!("Network unavailable for {}", request.url)) }.boxed()
  }
}
