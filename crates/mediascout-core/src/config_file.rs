use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;
use crate::plugin::PluginArgs;

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub search: Option<SearchConfig>,
    pub translate: Option<TranslateConfig>,
    /// `[plugins.<name>]` tables, handed to the plugin's constructor.
    pub plugins: Option<BTreeMap<String, PluginArgs>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Plugins to try, in order.
    pub plugins: Option<Vec<String>>,
    pub disabled: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslateConfig {
    pub enable_title: Option<bool>,
    pub enable_plot: Option<bool>,
    /// LibreTranslate-compatible endpoint, e.g. `http://localhost:5000/translate`.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
}

/// Platform config directory path: `<config_dir>/mediascout/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mediascout").join("config.toml"))
}

/// Load config by cascading CWD `.mediascout.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".mediascout.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
/// Plugin tables merge key by key.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_search = base.search.unwrap_or_default();
    let over_search = overlay.search.unwrap_or_default();
    let base_translate = base.translate.unwrap_or_default();
    let over_translate = overlay.translate.unwrap_or_default();

    let plugins = match (base.plugins, overlay.plugins) {
        (None, None) => None,
        (Some(p), None) | (None, Some(p)) => Some(p),
        (Some(mut merged), Some(over)) => {
            for (name, table) in over {
                merged.entry(name).or_default().extend(table);
            }
            Some(merged)
        }
    };

    ConfigFile {
        search: Some(SearchConfig {
            plugins: over_search.plugins.or(base_search.plugins),
            disabled: over_search.disabled.or(base_search.disabled),
            timeout_secs: over_search.timeout_secs.or(base_search.timeout_secs),
            user_agent: over_search.user_agent.or(base_search.user_agent),
        }),
        translate: Some(TranslateConfig {
            enable_title: over_translate.enable_title.or(base_translate.enable_title),
            enable_plot: over_translate.enable_plot.or(base_translate.enable_plot),
            endpoint: over_translate.endpoint.or(base_translate.endpoint),
            api_key: over_translate.api_key.or(base_translate.api_key),
            source_lang: over_translate.source_lang.or(base_translate.source_lang),
            target_lang: over_translate.target_lang.or(base_translate.target_lang),
        }),
        plugins,
    }
}

impl ConfigFile {
    /// Copy every value present in the file onto `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(search) = &self.search {
            if let Some(plugins) = &search.plugins {
                config.plugins = plugins.clone();
            }
            if let Some(disabled) = &search.disabled {
                config.disabled_plugins = disabled.clone();
            }
            if let Some(secs) = search.timeout_secs {
                config.timeout_secs = secs;
            }
            if let Some(ua) = &search.user_agent {
                config.user_agent = ua.clone();
            }
        }
        if let Some(translate) = &self.translate {
            if let Some(v) = translate.enable_title {
                config.translate.enable_title_translate = v;
            }
            if let Some(v) = translate.enable_plot {
                config.translate.enable_plot_translate = v;
            }
            if let Some(endpoint) = &translate.endpoint {
                config.translate_endpoint = Some(endpoint.clone());
            }
            if let Some(key) = &translate.api_key {
                config.translate_api_key = Some(key.clone());
            }
            if let Some(lang) = &translate.source_lang {
                config.translate_source_lang = lang.clone();
            }
            if let Some(lang) = &translate.target_lang {
                config.translate_target_lang = lang.clone();
            }
        }
        if let Some(plugins) = &self.plugins {
            for (name, args) in plugins {
                config.plugin_args.insert(name.clone(), args.clone());
            }
        }
    }
}

impl From<&Config> for ConfigFile {
    fn from(config: &Config) -> Self {
        ConfigFile {
            search: Some(SearchConfig {
                plugins: Some(config.plugins.clone()),
                disabled: Some(config.disabled_plugins.clone()),
                timeout_secs: Some(config.timeout_secs),
                user_agent: Some(config.user_agent.clone()),
            }),
            translate: Some(TranslateConfig {
                enable_title: Some(config.translate.enable_title_translate),
                enable_plot: Some(config.translate.enable_plot_translate),
                endpoint: config.translate_endpoint.clone(),
                api_key: config.translate_api_key.clone(),
                source_lang: Some(config.translate_source_lang.clone()),
                target_lang: Some(config.translate_target_lang.clone()),
            }),
            plugins: (!config.plugin_args.is_empty()).then(|| config.plugin_args.clone()),
        }
    }
}

/// Save the config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, ConfigFileError> {
    let path = config_path().ok_or(ConfigFileError::NoConfigDir)?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), ConfigFileError> {
    let io_err = |source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[search]
plugins = ["avsox"]
timeout_secs = 20

[translate]
enable_title = true

[plugins.avsox]
base_url = "https://mirror.example"
"#;

    #[test]
    fn parses_all_sections() {
        let parsed: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let search = parsed.search.unwrap();
        assert_eq!(search.plugins.unwrap(), vec!["avsox"]);
        assert_eq!(search.timeout_secs, Some(20));
        assert!(search.disabled.is_none());
        assert_eq!(parsed.translate.unwrap().enable_title, Some(true));
        let plugins = parsed.plugins.unwrap();
        assert_eq!(plugins["avsox"]["base_url"].as_str(), Some("https://mirror.example"));
    }

    #[test]
    fn empty_file_is_default() {
        let parsed: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(parsed, ConfigFile::default());
    }

    #[test]
    fn merge_overlay_wins_and_base_fills_gaps() {
        let base: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let overlay: ConfigFile = toml::from_str(
            r#"
[search]
timeout_secs = 5
disabled = ["avsox"]

[plugins.avsox]
extra = 1
"#,
        )
        .unwrap();

        let merged = merge(base, overlay);
        let search = merged.search.unwrap();
        assert_eq!(search.timeout_secs, Some(5));
        assert_eq!(search.plugins.unwrap(), vec!["avsox"]);
        assert_eq!(search.disabled.unwrap(), vec!["avsox"]);
        assert_eq!(merged.translate.unwrap().enable_title, Some(true));
        let avsox = &merged.plugins.unwrap()["avsox"];
        assert!(avsox.contains_key("base_url"));
        assert!(avsox.contains_key("extra"));
    }

    #[test]
    fn apply_to_overrides_defaults() {
        let parsed: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let mut config = Config::default();
        parsed.apply_to(&mut config);
        assert_eq!(config.timeout_secs, 20);
        assert!(config.translate.enable_title_translate);
        assert!(!config.translate.enable_plot_translate);
        assert!(config.plugin_args.contains_key("avsox"));
        assert_eq!(config.user_agent, Config::default().user_agent);
    }

    #[test]
    fn config_round_trips_through_file_form() {
        let mut config = Config {
            timeout_secs: 3,
            disabled_plugins: vec!["x".into()],
            ..Default::default()
        };
        config.translate.enable_plot_translate = true;
        let file = ConfigFile::from(&config);

        let mut restored = Config::default();
        file.apply_to(&mut restored);
        assert_eq!(restored.timeout_secs, 3);
        assert_eq!(restored.disabled_plugins, vec!["x"]);
        assert!(restored.translate.enable_plot_translate);
        assert!(file.plugins.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config: ConfigFile = toml::from_str(SAMPLE).unwrap();

        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn unparseable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[search\ntimeout_secs = ").unwrap();
        assert!(load_from_path(&path).is_none());
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());
    }
}
