use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GaldynError;

static NEW_STYLE_EPRINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").unwrap());
static OLD_STYLE_EPRINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z\-]*(\.[A-Z]{2})?/\d{7}(v\d+)?$").unwrap());

/// Which tool performs the actual network transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Wget,
    Curl,
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Wget => write!(f, "wget"),
            TransportKind::Curl => write!(f, "curl"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

/// A remote address together with the transport that should fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    url: String,
    transport: TransportKind,
}

impl SourceLocator {
    pub fn new(url: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eprint(String);

impl Eprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the identifier; old-style ids contain a `/`.
    pub fn file_stem(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Eprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Eprint {
    type Err = GaldynError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let trimmed = trimmed
            .strip_prefix("arXiv:")
            .or_else(|| trimmed.strip_prefix("arxiv:"))
            .unwrap_or(trimmed);
        if NEW_STYLE_EPRINT.is_match(trimmed) || OLD_STYLE_EPRINT.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(GaldynError::InvalidEprint(value.to_string()))
        }
    }
}
