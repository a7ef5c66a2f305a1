//! Test doubles shared by the unit tests.

use color_eyre::eyre::eyre;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::http::{Network, Request, Response};

enum Route {
  Respond { status: u16, body: String },
  Redirect { to: Url },
}

/// Scripted network: answers known URLs, 404s the rest, fails when offline.
pub struct StubNetwork {
  routes: Mutex<HashMap<String, Route>>,
  requests: Mutex<Vec<Request>>,
  online: AtomicBool,
}

impl StubNetwork {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      requests: Mutex::new(Vec::new()),
      online: AtomicBool::new(true),
    }
  }

  pub fn route(&self, url: &str, status: u16, body: &str) {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      Route::Respond {
        status,
        body: body.to_string(),
      },
    );
  }

  /// Answer `url` as if the server redirected to `to`.
  pub fn redirect(&self, url: &str, to: &str) {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      Route::Redirect {
        to: Url::parse(to).unwrap(),
      },
    );
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// URLs of all requests seen so far.
  pub fn requests(&self) -> Vec<String> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .map(|r| r.url.to_string())
      .collect()
  }

  pub fn request_count(&self, url: &str) -> usize {
    self.requests().iter().filter(|u| *u == url).count()
  }

  /// Bodies of all requests sent to `url`.
  pub fn bodies(&self, url: &str) -> Vec<String> {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .map(|r| String::from_utf8_lossy(r.body.as_deref().unwrap_or_default()).into_owned())
      .collect()
  }
}

impl Network for StubNetwork {
  fn fetch(&self, request: Request) -> BoxFuture<'_, color_eyre::Result<Response>> {
    async move {
      self.requests.lock().unwrap().push(request.clone());
      if !self.online.load(Ordering::SeqCst) {
        return Err(eyre!("Network unavailable for {}", request.url));
      }

      let routes = self.routes.lock().unwrap();
      let response = match routes.get(request.url.as_str()) {
        Some(Route::Respond { status, body }) => Response {
          status: *status,
          url: request.url.clone(),
          redirected: false,
          headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
          body: body.clone().into_bytes(),
        },
        Some(Route::Redirect { to }) => Response {
          status: 200,
          url: to.clone(),
          redirected: true,
          headers: Vec::new(),
          body: b"login".to_vec(),
        },
        None => Response {
          status: 404,
          url: request.url.clone(),
          redirected: false,
          headers: Vec::new(),
          body: Vec::new(),
        },
      };
      Ok(response)
    }
    .boxed()
  }
}
