//! Canned-response invoker for testing plugins without the network.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use reqwest::ResponseBuilderExt;

use super::{BoxFuture, HttpInvoker, PluginContext, PluginError};

/// Maps URLs to `(status, body)` pairs. Unknown URLs answer 404 with an
/// empty body. Every request URL is recorded in call order.
#[derive(Default)]
pub struct MockInvoker {
    routes: HashMap<String, (u16, String)>,
    broken: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

/// A genuine `reqwest::Error`, for routes that fail at the transport.
fn transport_error() -> reqwest::Error {
    reqwest::Client::new()
        .get("not a url")
        .build()
        .unwrap_err()
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.insert(url.to_string(), (status, body.into()));
        self
    }

    /// Requests to `url` fail with [`PluginError::Transport`].
    pub fn with_transport_error(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    /// Requested URLs, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl HttpInvoker for MockInvoker {
    fn invoke<'a>(
        &'a self,
        ctx: &'a PluginContext,
        req: reqwest::Request,
    ) -> BoxFuture<'a, Result<reqwest::Response, PluginError>> {
        let url = req.url().clone();
        self.calls.lock().unwrap().push(url.to_string());
        let (status, body) = self
            .routes
            .get(url.as_str())
            .cloned()
            .unwrap_or((404, String::new()));
        let broken = self.broken.contains(url.as_str());

        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(PluginError::Cancelled);
            }
            if broken {
                return Err(PluginError::Transport(transport_error()));
            }
            let http_resp = http::Response::builder()
                .status(status)
                .url(url)
                .body(body)
                .unwrap();
            Ok(reqwest::Response::from(http_resp))
        })
    }
}
