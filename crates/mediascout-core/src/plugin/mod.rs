//! Plugin contract: the lifecycle hooks a catalog source implements.
//!
//! Every hook has a default, so an adapter only overrides what differs for
//! its source. At minimum that is [`Plugin::build_request`] and
//! [`Plugin::decode_response`].

pub mod avsox;
mod context;
mod invoker;
#[cfg(test)]
pub(crate) mod mock;
pub mod registry;
pub mod runner;

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use crate::decoder::DecodeError;
use crate::model::AvMeta;
use crate::number::Number;

pub use crate::BoxFuture;
pub use context::PluginContext;
pub use invoker::{ClientInvoker, HttpInvoker};
pub use registry::{PluginArgs, PluginCreator, PluginRegistry, plugin_to_creator};
pub use runner::{Outcome, PluginRunner, SearchError, Stage};

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("failed to build request: {0}")]
    RequestConstruction(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP {status} from {url}")]
    UnexpectedStatus { url: String, status: StatusCode },
    #[error("search for `{query}` matched {count} entries, refusing to guess")]
    AmbiguousSearchResult { query: String, count: usize },
    #[error("no search results for any of {tried:?}")]
    NoSearchMatch { tried: Vec<String> },
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("cancelled")]
    Cancelled,
    #[error("plugin:{0} not found")]
    PluginNotFound(String),
    #[error("invalid plugin name `{0}`")]
    InvalidName(String),
    #[error("invalid args for plugin {plugin}: {reason}")]
    InvalidArgs { plugin: String, reason: String },
}

/// A catalog source adapter.
///
/// Hooks run in a fixed order for each lookup; see [`PluginRunner::search`].
pub trait Plugin: Send + Sync {
    /// Source-specific transport. `None` uses the runner's invoker.
    fn http_invoker(&self) -> Option<Arc<dyn HttpInvoker>> {
        None
    }

    /// Cheap gate before any I/O. `Ok(false)` skips this source.
    fn precheck_request(
        &self,
        _ctx: &mut PluginContext,
        _number: &Number,
    ) -> Result<bool, PluginError> {
        Ok(true)
    }

    fn build_request(
        &self,
        _ctx: &mut PluginContext,
        _number: &Number,
    ) -> Result<reqwest::Request, PluginError> {
        Err(PluginError::NotImplemented("build_request"))
    }

    /// Mutate the request (headers, cookies) before it is sent.
    fn decorate_request(
        &self,
        _ctx: &mut PluginContext,
        _req: &mut reqwest::Request,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Execute the request. Sources with a search step override this to
    /// issue several requests and return the final detail page.
    fn handle_request<'a>(
        &'a self,
        ctx: &'a mut PluginContext,
        invoker: &'a dyn HttpInvoker,
        req: reqwest::Request,
    ) -> BoxFuture<'a, Result<reqwest::Response, PluginError>> {
        Box::pin(async move { invoker.invoke(ctx, req).await })
    }

    /// Filter definite negatives before decoding. HTTP 404 is a clean miss.
    fn precheck_response(
        &self,
        _ctx: &mut PluginContext,
        resp: &reqwest::Response,
    ) -> Result<bool, PluginError> {
        Ok(resp.status() != StatusCode::NOT_FOUND)
    }

    /// Parse the response body. `Ok(None)` means the page holds no record.
    fn decode_response(
        &self,
        _ctx: &mut PluginContext,
        _data: &[u8],
    ) -> Result<Option<AvMeta>, PluginError> {
        Err(PluginError::NotImplemented("decode_response"))
    }

    /// Mutate asset (cover, poster) requests before they are sent.
    fn decorate_media_request(
        &self,
        _ctx: &mut PluginContext,
        _req: &mut reqwest::Request,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// A plugin that overrides nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlugin;

impl Plugin for DefaultPlugin {}

/// Build a bodyless GET request, mapping a bad URL to a construction error.
pub fn get_request(url: &str) -> Result<reqwest::Request, PluginError> {
    let url = reqwest::Url::parse(url)
        .map_err(|e| PluginError::RequestConstruction(format!("{url}: {e}")))?;
    Ok(reqwest::Request::new(reqwest::Method::GET, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> reqwest::Response {
        let http_resp = http::Response::builder().status(status).body("").unwrap();
        reqwest::Response::from(http_resp)
    }

    #[test]
    fn default_build_and_decode_are_not_implemented() {
        let mut ctx = PluginContext::default();
        let number = Number::parse("ABC-123").unwrap();
        let err = DefaultPlugin.build_request(&mut ctx, &number).unwrap_err();
        assert!(matches!(err, PluginError::NotImplemented("build_request")));
        let err = DefaultPlugin.decode_response(&mut ctx, b"").unwrap_err();
        assert_eq!(err.to_string(), "decode_response is not implemented");
    }

    #[test]
    fn default_precheck_request_proceeds() {
        let mut ctx = PluginContext::default();
        let number = Number::parse("ABC-123").unwrap();
        assert!(DefaultPlugin.precheck_request(&mut ctx, &number).unwrap());
        assert!(DefaultPlugin.http_invoker().is_none());
    }

    #[test]
    fn default_precheck_response_treats_404_as_miss() {
        let mut ctx = PluginContext::default();
        assert!(!DefaultPlugin.precheck_response(&mut ctx, &response(404)).unwrap());
        assert!(DefaultPlugin.precheck_response(&mut ctx, &response(200)).unwrap());
        assert!(DefaultPlugin.precheck_response(&mut ctx, &response(500)).unwrap());
    }

    #[test]
    fn get_request_rejects_bad_urls() {
        let req = get_request("https://catalog.example/cn/search/ABC").unwrap();
        assert_eq!(req.method(), reqwest::Method::GET);
        assert!(req.body().is_none());
        assert!(matches!(
            get_request("not a url"),
            Err(PluginError::RequestConstruction(_))
        ));
    }
}
