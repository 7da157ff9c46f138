//! Identifier normalization.
//!
//! Turns a raw file name or user string into the canonical media code used as
//! the search key. Plugins only ever read a [`Number`].

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "wmv", "mov", "ts", "m4v", "rmvb", "flv", "iso", "mpg", "mpeg", "webm",
];

static FC2_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FC2[-_ ]?(?:PPV[-_ ]?)?(\d{5,8})").unwrap());

static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]{2,10})[-_ ]?(\d{2,6})").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumberError {
    #[error("empty identifier")]
    Empty,
    #[error("unrecognized identifier: {0}")]
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Fc2 { id: String },
    Code { prefix: String, digits: String },
}

/// A canonical media identifier plus the raw input it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Number {
    raw: String,
    number: String,
    shape: Shape,
}

impl Number {
    /// Normalize a raw string (file name, path or bare code).
    pub fn parse(raw: &str) -> Result<Self, NumberError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NumberError::Empty);
        }

        let stem = strip_extension(file_name(trimmed)).to_uppercase();

        let shape = if let Some(caps) = FC2_RE.captures(&stem) {
            Shape::Fc2 {
                id: caps[1].to_string(),
            }
        } else if let Some(caps) = CODE_RE.captures(&stem) {
            Shape::Code {
                prefix: caps[1].to_string(),
                digits: caps[2].to_string(),
            }
        } else {
            return Err(NumberError::Unrecognized(trimmed.to_string()));
        };

        let number = match &shape {
            Shape::Fc2 { id } => format!("FC2-PPV-{id}"),
            Shape::Code { prefix, digits } => format!("{prefix}-{digits}"),
        };

        Ok(Self {
            raw: raw.to_string(),
            number,
            shape,
        })
    }

    /// Canonical form, e.g. `ABC-123` or `FC2-PPV-1234567`.
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Alternative spellings, canonical first.
    pub fn variants(&self) -> Vec<String> {
        match &self.shape {
            Shape::Fc2 { id } => vec![
                self.number.clone(),
                format!("FC2PPV{id}"),
                format!("FC2-{id}"),
            ],
            Shape::Code { prefix, digits } => vec![
                self.number.clone(),
                format!("{prefix}{digits}"),
                format!("{prefix}_{digits}"),
            ],
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.number)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => name,
    }
}
