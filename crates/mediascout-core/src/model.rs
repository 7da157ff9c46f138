//! Metadata record produced by a successful lookup.

use serde::{Deserialize, Serialize};

/// Structured metadata for one media identifier.
///
/// A record counts as found iff `number` is non-empty. Timestamps are unix
/// seconds, durations are seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvMeta {
    pub number: String,
    pub title: String,
    pub plot: String,
    pub actors: Vec<String>,
    pub release_date: i64,
    pub duration: i64,
    pub studio: String,
    pub label: String,
    pub series: String,
    pub genres: Vec<String>,
    pub cover: Option<File>,
    pub poster: Option<File>,
    pub sample_images: Vec<File>,
    pub director: String,
    pub ext_info: ExtInfo,
}

impl AvMeta {
    pub fn is_found(&self) -> bool {
        !self.number.is_empty()
    }
}

/// A retrievable asset. `key` is an opaque handle owned by the storage layer;
/// it stays empty until something downloads the asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub key: String,
}

impl File {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            name: url.into(),
            key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtInfo {
    /// Name of the plugin that produced the record.
    pub scrape_source: String,
    pub scrape_date_ts: i64,
    #[serde(rename = "translated_info")]
    pub translate_info: TranslateInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateOption {
    pub enable_title_translate: bool,
    pub enable_plot_translate: bool,
}

impl TranslateOption {
    pub fn any_enabled(&self) -> bool {
        self.enable_title_translate || self.enable_plot_translate
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateData {
    pub translated_title: String,
    pub translated_plot: String,
}

/// Serialized keys are capitalized: `Option`, `Data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateInfo {
    #[serde(rename = "Option")]
    pub option: TranslateOption,
    #[serde(rename = "Data")]
    pub data: TranslateData,
}
