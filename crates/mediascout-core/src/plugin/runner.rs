//! The per-plugin lookup pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::{ClientInvoker, HttpInvoker, Plugin, PluginContext, PluginError, get_request};
use crate::model::AvMeta;
use crate::number::Number;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PrecheckRequest,
    BuildRequest,
    DecorateRequest,
    HandleRequest,
    PrecheckResponse,
    ReadBody,
    DecodeResponse,
    FetchMedia,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PrecheckRequest => "precheck_request",
            Stage::BuildRequest => "build_request",
            Stage::DecorateRequest => "decorate_request",
            Stage::HandleRequest => "handle_request",
            Stage::PrecheckResponse => "precheck_response",
            Stage::ReadBody => "read_body",
            Stage::DecodeResponse => "decode_response",
            Stage::FetchMedia => "fetch_media",
        };
        f.write_str(name)
    }
}

/// A pipeline failure, tagged with the plugin and the stage that raised it.
#[derive(Error, Debug)]
#[error("plugin {plugin} failed at {stage}: {source}")]
pub struct SearchError {
    pub plugin: String,
    pub stage: Stage,
    #[source]
    pub source: PluginError,
}

impl SearchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, PluginError::Cancelled)
    }
}

/// Non-error results of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Found(AvMeta),
    /// The source answered but holds no record for the identifier.
    NotFound,
    /// The plugin declined the identifier before doing any I/O.
    Skipped,
}

fn at(plugin: &str, stage: Stage) -> impl FnOnce(PluginError) -> SearchError + '_ {
    move |source| SearchError {
        plugin: plugin.to_string(),
        stage,
        source,
    }
}

/// Runs plugins through their lifecycle hooks.
#[derive(Clone)]
pub struct PluginRunner {
    invoker: Arc<dyn HttpInvoker>,
}

impl PluginRunner {
    pub fn new(invoker: Arc<dyn HttpInvoker>) -> Self {
        Self { invoker }
    }

    /// Runner over the default [`ClientInvoker`].
    pub fn from_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self::new(Arc::new(ClientInvoker::new(client).with_timeout(timeout)))
    }

    fn invoker_for<'a>(&'a self, custom: &'a Option<Arc<dyn HttpInvoker>>) -> &'a dyn HttpInvoker {
        match custom {
            Some(invoker) => invoker.as_ref(),
            None => self.invoker.as_ref(),
        }
    }

    /// Resolve `number` through one plugin.
    ///
    /// Stages run strictly in order and the first error ends the run. A
    /// declined precheck yields [`Outcome::Skipped`]; a negative response or
    /// a page without an identifier yields [`Outcome::NotFound`].
    pub async fn search(
        &self,
        name: &str,
        plugin: &dyn Plugin,
        ctx: &mut PluginContext,
        number: &Number,
    ) -> Result<Outcome, SearchError> {
        if ctx.is_cancelled() {
            return Err(at(name, Stage::PrecheckRequest)(PluginError::Cancelled));
        }
        ctx.set_number(number.clone());

        if !plugin
            .precheck_request(ctx, number)
            .map_err(at(name, Stage::PrecheckRequest))?
        {
            tracing::debug!(plugin = name, number = %number, "precheck declined identifier");
            return Ok(Outcome::Skipped);
        }

        let mut req = plugin
            .build_request(ctx, number)
            .map_err(at(name, Stage::BuildRequest))?;
        plugin
            .decorate_request(ctx, &mut req)
            .map_err(at(name, Stage::DecorateRequest))?;

        let custom = plugin.http_invoker();
        let invoker = self.invoker_for(&custom);
        tracing::debug!(plugin = name, number = %number, url = %req.url(), "executing request");
        let resp = plugin
            .handle_request(ctx, invoker, req)
            .await
            .map_err(at(name, Stage::HandleRequest))?;

        if !plugin
            .precheck_response(ctx, &resp)
            .map_err(at(name, Stage::PrecheckResponse))?
        {
            tracing::debug!(plugin = name, status = %resp.status(), "response rejected");
            return Ok(Outcome::NotFound);
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| at(name, Stage::ReadBody)(e.into()))?;

        match plugin
            .decode_response(ctx, &body)
            .map_err(at(name, Stage::DecodeResponse))?
        {
            Some(meta) if meta.is_found() => {
                tracing::debug!(plugin = name, number = %meta.number, "record decoded");
                Ok(Outcome::Found(meta))
            }
            _ => Ok(Outcome::NotFound),
        }
    }

    /// Download an asset (cover, poster, sample image) the way `plugin`
    /// wants it requested.
    pub async fn fetch_media(
        &self,
        name: &str,
        plugin: &dyn Plugin,
        ctx: &mut PluginContext,
        url: &str,
    ) -> Result<Vec<u8>, SearchError> {
        let fail = |source| at(name, Stage::FetchMedia)(source);

        let mut req = get_request(url).map_err(fail)?;
        plugin.decorate_media_request(ctx, &mut req).map_err(fail)?;

        let custom = plugin.http_invoker();
        let resp = self
            .invoker_for(&custom)
            .invoke(ctx, req)
            .await
            .map_err(fail)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(PluginError::UnexpectedStatus {
                url: url.to_string(),
                status,
            }));
        }
        let bytes = resp.bytes().await.map_err(|e| fail(e.into()))?;
        Ok(bytes.to_vec())
    }
}
