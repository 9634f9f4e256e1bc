use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

pub const UNKNOWN_DATASET: &str = "unknown_dataset";
pub const UNKNOWN_DISTRIBUTION: &str = "unknown_distribution";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    DataJson,
    Dcat,
}

impl fmt::Display for CatalogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogFormat::DataJson => write!(f, "datajson"),
            CatalogFormat::Dcat => write!(f, "dcat"),
        }
    }
}

/// A distribution that resolved to a downloadable URL, before any destination
/// path has been derived for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCandidate {
    pub dataset_id: String,
    pub distribution_id: String,
    pub source_url: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub dataset_id: String,
    pub distribution_id: String,
    pub source_url: String,
    pub destination: Utf8PathBuf,
}

/// Returns the first candidate that is non-empty after trimming.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Resolves an identifier used as a directory name: the first candidate that
/// survives sanitizing wins, otherwise `fallback`.
pub fn resolve_identifier<'a, I>(candidates: I, fallback: &str) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .find_map(sanitize_component)
        .unwrap_or_else(|| fallback.to_string())
}

/// File name precedence: explicit catalog field, then the last path segment of
/// the source URL, then `dist_<distribution_id>`.
pub fn resolve_file_name(
    explicit: Option<&str>,
    source_url: &str,
    distribution_id: &str,
) -> String {
    let from_url = file_name_from_url(source_url);
    [explicit, from_url.as_deref()]
        .into_iter()
        .flatten()
        .find_map(sanitize_component)
        .unwrap_or_else(|| format!("dist_{distribution_id}"))
}

pub fn file_name_from_url(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url.trim()).ok()?;
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_string())
}

/// Trailing path segment of a resource URI, e.g. the CKAN UUID at the end of
/// `https://example.org/dataset/<uuid>/resource/<uuid>`.
pub fn last_uri_segment(uri: &str) -> Option<&str> {
    uri.rsplit('/').next().filter(|segment| !segment.is_empty())
}

/// Stable 16-hex-digit identifier derived from `value`. Used for resources
/// the catalog leaves anonymous, so re-runs map them to the same directory.
pub fn digest_id(value: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(value.trim().as_bytes()));
    digest[..16].to_string()
}

/// Makes a catalog-provided value safe to use as a single path component.
pub fn sanitize_component(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }
    let cleaned = trimmed
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    Some(cleaned)
}
