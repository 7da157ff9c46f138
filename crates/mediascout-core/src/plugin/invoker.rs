use std::time::Duration;

use super::{BoxFuture, PluginContext, PluginError};

/// Executes one HTTP request on behalf of a plugin.
pub trait HttpInvoker: Send + Sync {
    fn invoke<'a>(
        &'a self,
        ctx: &'a PluginContext,
        req: reqwest::Request,
    ) -> BoxFuture<'a, Result<reqwest::Response, PluginError>>;
}

/// Default invoker backed by a shared [`reqwest::Client`].
///
/// Requests without their own timeout get the configured one. The call
/// returns [`PluginError::Cancelled`] as soon as the context is cancelled.
#[derive(Debug, Clone)]
pub struct ClientInvoker {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ClientInvoker {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl HttpInvoker for ClientInvoker {
    fn invoke<'a>(
        &'a self,
        ctx: &'a PluginContext,
        mut req: reqwest::Request,
    ) -> BoxFuture<'a, Result<reqwest::Response, PluginError>> {
        if req.timeout().is_none() {
            *req.timeout_mut() = self.timeout;
        }
        Box::pin(async move {
            tracing::debug!(method = %req.method(), url = %req.url(), "sending request");
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => Err(PluginError::Cancelled),
                resp = self.client.execute(req) => Ok(resp?),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = PluginContext::new(cancel);
        let invoker = ClientInvoker::new(reqwest::Client::new());
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "http://127.0.0.1:9/never".parse().unwrap(),
        );
        let err = invoker.invoke(&ctx, req).await.unwrap_err();
        assert!(matches!(err, PluginError::Cancelled));
    }
}
