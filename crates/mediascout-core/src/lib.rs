use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub mod config_file;
pub mod decoder;
pub mod model;
pub mod number;
pub mod plugin;
pub mod processor;
pub mod searcher;
pub mod translator;

// Re-export for convenience
pub use decoder::{DecodeError, DecodeOptions, Decoded, Field, Parsed, XPathHtmlDecoder};
pub use model::{AvMeta, ExtInfo, File, TranslateOption};
pub use number::{Number, NumberError};
pub use plugin::{
    Outcome, Plugin, PluginArgs, PluginContext, PluginError, PluginRegistry, PluginRunner,
    SearchError,
};
pub use processor::{Processor, TranslateProcessor, run_processors};
pub use searcher::{AttemptStatus, PluginAttempt, SearchReport, Searcher};
pub use translator::{HttpTranslator, TranslateError, Translator};

/// Boxed future returned by the async hooks of `dyn`-compatible traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runtime configuration for a lookup session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Plugins to try, in order.
    pub plugins: Vec<String>,
    pub disabled_plugins: Vec<String>,
    /// Per-plugin constructor arguments, keyed by plugin name.
    pub plugin_args: BTreeMap<String, PluginArgs>,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Which fields to translate on found records.
    pub translate: TranslateOption,
    pub translate_endpoint: Option<String>,
    pub translate_api_key: Option<String>,
    pub translate_source_lang: String,
    pub translate_target_lang: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugins: vec![plugin::avsox::AVSOX.to_string()],
            disabled_plugins: vec![],
            plugin_args: BTreeMap::new(),
            timeout_secs: 10,
            user_agent: concat!("mediascout/", env!("CARGO_PKG_VERSION")).to_string(),
            translate: TranslateOption::default(),
            translate_endpoint: None,
            translate_api_key: None,
            translate_source_lang: "auto".to_string(),
            translate_target_lang: "zh".to_string(),
        }
    }
}

impl Config {
    /// Configured plugins minus disabled ones, in order.
    pub fn enabled_plugins(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .filter(|p| !self.disabled_plugins.iter().any(|d| d.eq_ignore_ascii_case(p)))
            .map(String::as_str)
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Build the shared HTTP client for all plugins.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.timeout())
        .build()
}
