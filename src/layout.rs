use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use url::Url;

use crate::domain::{CatalogFormat, TaskCandidate, file_name_from_url, sanitize_component};
use crate::error::RescueError;

/// On-disk layout of one mirrored portal:
///
/// ```text
/// <output>/<host>/data.json            raw catalog snapshot
/// <output>/<host>/logs.txt             run log
/// <output>/<host>/data/<dataset>/<distribution>/<file>
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    host: String,
    base: Utf8PathBuf,
}

impl OutputLayout {
    pub fn for_portal(output_dir: &Utf8Path, catalog_url: &str) -> Result<Self, RescueError> {
        let host = portal_host(catalog_url)?;
        let base = output_dir.join(&host);
        Ok(Self { host, base })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base
    }

    pub fn data_dir(&self) -> Utf8PathBuf {
        self.base.join("data")
    }

    pub fn logs_path(&self) -> Utf8PathBuf {
        self.base.join("logs.txt")
    }

    pub fn snapshot_path(&self, format: CatalogFormat, catalog_url: &str) -> Utf8PathBuf {
        match format {
            CatalogFormat::DataJson => self.base.join("data.json"),
            CatalogFormat::Dcat => {
                let name = file_name_from_url(catalog_url)
                    .and_then(|name| sanitize_component(&name))
                    .filter(|name| name != "data" && name != "logs.txt")
                    .unwrap_or_else(|| "catalog.rdf".to_string());
                self.base.join(name)
            }
        }
    }

    pub fn destination(&self, candidate: &TaskCandidate) -> Utf8PathBuf {
        self.data_dir()
            .join(&candidate.dataset_id)
            .join(&candidate.distribution_id)
            .join(&candidate.file_name)
    }

    pub fn ensure_dirs(&self) -> Result<(), RescueError> {
        fs::create_dir_all(self.data_dir().as_std_path())
            .map_err(|err| RescueError::Filesystem(format!("create {}: {err}", self.data_dir())))
    }

    pub fn write_snapshot(path: &Utf8Path, content: &[u8]) -> Result<(), RescueError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| RescueError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| RescueError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| RescueError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Host (and port, when present) of the catalog URL, usable as a directory name.
pub fn portal_host(catalog_url: &str) -> Result<String, RescueError> {
    let url = Url::parse(catalog_url.trim())
        .map_err(|err| RescueError::InvalidPortalUrl(format!("{catalog_url}: {err}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| RescueError::InvalidPortalUrl(format!("{catalog_url}: missing host")))?;
    let netloc = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    sanitize_component(&netloc)
        .ok_or_else(|| RescueError::InvalidPortalUrl(format!("{catalog_url}: invalid host")))
}
