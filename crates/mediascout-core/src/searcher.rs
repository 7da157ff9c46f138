//! Resolve one identifier by trying plugins in order until one finds it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::Config;
use crate::model::AvMeta;
use crate::number::Number;
use crate::plugin::{
    Outcome, Plugin, PluginContext, PluginError, PluginRegistry, PluginRunner, SearchError, Stage,
};

/// How a single plugin attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Found,
    NotFound,
    Skipped,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PluginAttempt {
    pub plugin: String,
    pub status: AttemptStatus,
    pub elapsed: Duration,
}

/// Result of a multi-plugin lookup.
#[derive(Debug, Clone, Default)]
pub struct SearchReport {
    pub meta: Option<AvMeta>,
    /// Name of the plugin that produced `meta`.
    pub source: Option<String>,
    pub attempts: Vec<PluginAttempt>,
}

impl SearchReport {
    pub fn is_found(&self) -> bool {
        self.meta.is_some()
    }

    pub fn failed_plugins(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.status, AttemptStatus::Failed(_)))
            .map(|a| a.plugin.as_str())
            .collect()
    }
}

pub struct Searcher {
    runner: PluginRunner,
    plugins: Vec<(String, Arc<dyn Plugin>)>,
}

impl Searcher {
    pub fn new(runner: PluginRunner) -> Self {
        Self {
            runner,
            plugins: Vec::new(),
        }
    }

    /// Append a plugin; plugins are tried in insertion order.
    pub fn with_plugin(mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push((name.into(), plugin));
        self
    }

    /// Instantiate the configured plugins, in configured order, skipping
    /// disabled ones. Unknown names are an error.
    pub fn from_config(
        registry: &PluginRegistry,
        config: &Config,
        runner: PluginRunner,
    ) -> Result<Self, PluginError> {
        let mut searcher = Self::new(runner);
        for name in config.enabled_plugins() {
            let plugin = registry.create(name, config.plugin_args.get(name))?;
            searcher = searcher.with_plugin(name, plugin);
        }
        Ok(searcher)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, plugin)| plugin)
    }

    pub fn runner(&self) -> &PluginRunner {
        &self.runner
    }

    /// Download an asset of a found record through the plugin that found it.
    pub async fn fetch_media(
        &self,
        source: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SearchError> {
        let plugin = self.plugin(source).ok_or_else(|| SearchError {
            plugin: source.to_string(),
            stage: Stage::FetchMedia,
            source: PluginError::PluginNotFound(source.to_string()),
        })?;
        let mut ctx = PluginContext::new(cancel.child_token());
        self.runner
            .fetch_media(source, plugin.as_ref(), &mut ctx, url)
            .await
    }

    /// Try each plugin with a fresh context. The first record found wins and
    /// is stamped with its source and the scrape time. Failures are logged
    /// and the next plugin is tried; cancellation ends the loop.
    pub async fn search(&self, number: &Number, cancel: &CancellationToken) -> SearchReport {
        let mut report = SearchReport::default();

        for (name, plugin) in &self.plugins {
            if cancel.is_cancelled() {
                tracing::debug!(number = %number, "search cancelled");
                break;
            }

            let mut ctx = PluginContext::new(cancel.child_token());
            let start = Instant::now();
            let result = self
                .runner
                .search(name, plugin.as_ref(), &mut ctx, number)
                .await;
            let elapsed = start.elapsed();

            let status = match result {
                Ok(Outcome::Found(mut meta)) => {
                    meta.ext_info.scrape_source = name.clone();
                    meta.ext_info.scrape_date_ts = chrono::Utc::now().timestamp();
                    tracing::info!(plugin = %name, number = %number, ?elapsed, "record found");
                    report.meta = Some(meta);
                    report.source = Some(name.clone());
                    AttemptStatus::Found
                }
                Ok(Outcome::NotFound) => AttemptStatus::NotFound,
                Ok(Outcome::Skipped) => AttemptStatus::Skipped,
                Err(e) if e.is_cancelled() => AttemptStatus::Cancelled,
                Err(e) => {
                    tracing::warn!(plugin = %name, number = %number, stage = %e.stage, error = %e.source, "plugin failed");
                    AttemptStatus::Failed(e.to_string())
                }
            };

            let stop = matches!(status, AttemptStatus::Found | AttemptStatus::Cancelled);
            report.attempts.push(PluginAttempt {
                plugin: name.clone(),
                status,
                elapsed,
            });
            if stop {
                break;
            }
        }

        report
    }
}
