//! Declarative HTML-to-record decoding.
//!
//! A plugin describes a page as an [`XPathHtmlDecoder`]: one query per
//! metadata field. Decoding evaluates every non-empty query against the
//! parsed page, runs the matches through the configured parsers and returns
//! the populated [`AvMeta`]. A malformed value degrades to the field's zero
//! value; it never fails the whole record.

pub mod convert;
pub mod xpath;

use std::collections::HashMap;
use std::fmt;

use scraper::Html;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AvMeta, File};
pub use convert::{to_duration, to_timestamp};
pub use xpath::{XPath, XPathError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bad expression for field `{field}`: {source}")]
    Expression {
        field: Field,
        #[source]
        source: XPathError,
    },
    #[error("bad expression: {0}")]
    Query(#[from] XPathError),
}

/// Target fields of the extraction rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Number,
    Title,
    Plot,
    Actors,
    ReleaseDate,
    Duration,
    Studio,
    Label,
    Director,
    Series,
    Genres,
    Cover,
    Poster,
    SampleImages,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Number => "number",
            Field::Title => "title",
            Field::Plot => "plot",
            Field::Actors => "actors",
            Field::ReleaseDate => "release_date",
            Field::Duration => "duration",
            Field::Studio => "studio",
            Field::Label => "label",
            Field::Director => "director",
            Field::Series => "series",
            Field::Genres => "genres",
            Field::Cover => "cover",
            Field::Poster => "poster",
            Field::SampleImages => "sample_images",
        };
        f.write_str(name)
    }
}

/// Outcome of a fallible field parser. `Defaulted` collapses to the type's
/// zero value when the record is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    Value(T),
    Defaulted,
}

impl<T: Default> Parsed<T> {
    pub fn into_value(self) -> T {
        match self {
            Parsed::Value(v) => v,
            Parsed::Defaulted => T::default(),
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Parsed::Defaulted)
    }
}

impl<T> From<Option<T>> for Parsed<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Parsed::Value(v),
            None => Parsed::Defaulted,
        }
    }
}

pub type StringProcessor = Box<dyn Fn(&str) -> String + Send + Sync>;
pub type ListProcessor = Box<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;
pub type NumberParser = Box<dyn Fn(&str) -> Parsed<i64> + Send + Sync>;

/// Parser configuration for one decode call.
pub struct DecodeOptions {
    default_string_processor: StringProcessor,
    string_parsers: HashMap<Field, StringProcessor>,
    list_parsers: HashMap<Field, ListProcessor>,
    release_date_parser: NumberParser,
    duration_parser: NumberParser,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            default_string_processor: Box::new(|s| s.trim().to_string()),
            string_parsers: HashMap::new(),
            list_parsers: HashMap::new(),
            release_date_parser: Box::new(|s| to_timestamp(s).into()),
            duration_parser: Box::new(|s| to_duration(s).into()),
        }
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("string_parsers", &self.string_parsers.keys().collect::<Vec<_>>())
            .field("list_parsers", &self.list_parsers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DecodeOptions {
    /// Applied to every matched string unless the field has its own parser.
    pub fn with_default_string_processor(
        mut self,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.default_string_processor = Box::new(f);
        self
    }

    /// Replace the processing of a single-valued string field.
    pub fn with_string_parser(
        mut self,
        field: Field,
        f: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.string_parsers.insert(field, Box::new(f));
        self
    }

    /// Replace the processing of a list field. Receives the raw matches.
    pub fn with_list_parser(
        mut self,
        field: Field,
        f: impl Fn(Vec<String>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.list_parsers.insert(field, Box::new(f));
        self
    }

    pub fn with_release_date_parser(
        mut self,
        f: impl Fn(&str) -> Parsed<i64> + Send + Sync + 'static,
    ) -> Self {
        self.release_date_parser = Box::new(f);
        self
    }

    pub fn with_duration_parser(
        mut self,
        f: impl Fn(&str) -> Parsed<i64> + Send + Sync + 'static,
    ) -> Self {
        self.duration_parser = Box::new(f);
        self
    }

    fn string(&self, field: Field, raw: &str) -> String {
        match self.string_parsers.get(&field) {
            Some(parser) => parser(raw),
            None => (self.default_string_processor)(raw),
        }
    }

    fn list(&self, field: Field, raw: Vec<String>) -> Vec<String> {
        match self.list_parsers.get(&field) {
            Some(parser) => parser(raw),
            None => raw
                .iter()
                .map(|s| (self.default_string_processor)(s))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Result of decoding one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub meta: AvMeta,
    /// Whether the identifier field came out non-empty.
    pub has_number: bool,
    /// Fields whose text was present but could not be parsed.
    pub degraded: Vec<Field>,
}

/// Extraction rule table: one XPath expression per field. An empty
/// expression means the field is not extracted for this source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XPathHtmlDecoder {
    pub number_expr: String,
    pub title_expr: String,
    pub plot_expr: String,
    pub actor_list_expr: String,
    pub release_date_expr: String,
    pub duration_expr: String,
    pub studio_expr: String,
    pub label_expr: String,
    pub director_expr: String,
    pub series_expr: String,
    pub genre_list_expr: String,
    pub cover_expr: String,
    pub poster_expr: String,
    pub sample_image_list_expr: String,
}

impl XPathHtmlDecoder {
    fn rules(&self) -> [(Field, &str); 14] {
        [
            (Field::Number, &self.number_expr),
            (Field::Title, &self.title_expr),
            (Field::Plot, &self.plot_expr),
            (Field::Actors, &self.actor_list_expr),
            (Field::ReleaseDate, &self.release_date_expr),
            (Field::Duration, &self.duration_expr),
            (Field::Studio, &self.studio_expr),
            (Field::Label, &self.label_expr),
            (Field::Director, &self.director_expr),
            (Field::Series, &self.series_expr),
            (Field::Genres, &self.genre_list_expr),
            (Field::Cover, &self.cover_expr),
            (Field::Poster, &self.poster_expr),
            (Field::SampleImages, &self.sample_image_list_expr),
        ]
    }

    /// Compile every non-empty expression, reporting the first bad one.
    pub fn validate(&self) -> Result<(), DecodeError> {
        for (field, expr) in self.rules() {
            compile_rule(field, expr)?;
        }
        Ok(())
    }

    /// Decode raw response bytes. Non-UTF-8 input is decoded lossily.
    pub fn decode_html(&self, data: &[u8], opts: &DecodeOptions) -> Result<Decoded, DecodeError> {
        let html = Html::parse_document(&String::from_utf8_lossy(data));
        self.decode_document(&html, opts)
    }

    pub fn decode_document(&self, html: &Html, opts: &DecodeOptions) -> Result<Decoded, DecodeError> {
        let mut meta = AvMeta::default();
        let mut degraded = Vec::new();

        for (field, expr) in self.rules() {
            let Some(query) = compile_rule(field, expr)? else {
                continue;
            };
            let matches = query.select(html);

            match field {
                Field::Number => meta.number = first_string(opts, field, &matches),
                Field::Title => meta.title = first_string(opts, field, &matches),
                Field::Plot => meta.plot = first_string(opts, field, &matches),
                Field::Studio => meta.studio = first_string(opts, field, &matches),
                Field::Label => meta.label = first_string(opts, field, &matches),
                Field::Director => meta.director = first_string(opts, field, &matches),
                Field::Series => meta.series = first_string(opts, field, &matches),
                Field::Actors => meta.actors = opts.list(field, matches),
                Field::Genres => meta.genres = opts.list(field, matches),
                Field::ReleaseDate | Field::Duration => {
                    let Some(raw) = matches.first() else {
                        continue;
                    };
                    let parsed = if field == Field::ReleaseDate {
                        (opts.release_date_parser)(raw)
                    } else {
                        (opts.duration_parser)(raw)
                    };
                    if parsed.is_defaulted() {
                        tracing::debug!(%field, raw = %raw, "field value could not be parsed");
                        degraded.push(field);
                    }
                    let value = parsed.into_value();
                    if field == Field::ReleaseDate {
                        meta.release_date = value;
                    } else {
                        meta.duration = value;
                    }
                }
                Field::Cover => meta.cover = first_file(opts, field, &matches),
                Field::Poster => meta.poster = first_file(opts, field, &matches),
                Field::SampleImages => {
                    meta.sample_images = opts
                        .list(field, matches)
                        .into_iter()
                        .map(File::from_url)
                        .collect()
                }
            }
        }

        Ok(Decoded {
            has_number: meta.is_found(),
            meta,
            degraded,
        })
    }
}

fn compile_rule(field: Field, expr: &str) -> Result<Option<XPath>, DecodeError> {
    if expr.trim().is_empty() {
        return Ok(None);
    }
    XPath::compile(expr)
        .map(Some)
        .map_err(|source| DecodeError::Expression { field, source })
}

fn first_string(opts: &DecodeOptions, field: Field, matches: &[String]) -> String {
    matches
        .first()
        .map(|raw| opts.string(field, raw))
        .unwrap_or_default()
}

fn first_file(opts: &DecodeOptions, field: Field, matches: &[String]) -> Option<File> {
    let url = first_string(opts, field, matches);
    (!url.is_empty()).then(|| File::from_url(url))
}

/// All string values matched by `expr`, untrimmed.
pub fn decode_list(html: &Html, expr: &str) -> Result<Vec<String>, DecodeError> {
    Ok(XPath::compile(expr)?.select(html))
}

/// First value matched by `expr`, if any.
pub fn decode_single(html: &Html, expr: &str) -> Result<Option<String>, DecodeError> {
    Ok(XPath::compile(expr)?.select_first(html))
}
