use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RescueError {
    #[error("invalid portal URL: {0}")]
    InvalidPortalUrl(String),

    #[error("catalog request failed: {0}")]
    CatalogFetch(String),

    #[error("catalog server returned status {status} for {url}")]
    CatalogStatus { status: u16, url: String },

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("unsupported catalog format: {0}")]
    #[diagnostic(help("use a .ttl, .rdf, .xml, .nt, .nq, .trig or .n3 catalog URL"))]
    UnsupportedCatalogFormat(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned status {status}")]
    HttpStatus { status: u16 },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
