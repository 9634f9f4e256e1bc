//! Catalog normalization.
//!
//! A catalog (data.json or a DCAT graph) is flattened into [`TaskCandidate`]s.
//! Discovering tasks is format specific; executing them is not, so every
//! catalog variant only has to implement [`TaskSource`].

pub mod datajson;
pub mod dcat;

use tracing::debug;

use crate::domain::{CatalogFormat, TaskCandidate};
use crate::error::RescueError;

pub use datajson::DataJsonCatalog;
pub use dcat::{CatalogGraph, DcatCatalog};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub candidates: Vec<TaskCandidate>,
    /// Every distribution visited, including those without a usable URL.
    pub distributions_seen: usize,
    pub datasets_total: usize,
    pub datasets_selected: usize,
}

pub trait TaskSource {
    fn format(&self) -> CatalogFormat;
    fn extract(&self) -> Extraction;
}

/// Parses raw catalog bytes into the matching [`TaskSource`].
///
/// `content_type` is only consulted for DCAT when the URL extension does not
/// identify the serialization.
pub fn parse_catalog(
    format: CatalogFormat,
    bytes: &[u8],
    catalog_url: &str,
    content_type: Option<&str>,
    dataset_limit: Option<usize>,
) -> Result<Box<dyn TaskSource>, RescueError> {
    match format {
        CatalogFormat::DataJson => Ok(Box::new(DataJsonCatalog::from_slice(bytes)?)),
        CatalogFormat::Dcat => {
            let rdf_format = dcat::guess_format(catalog_url, content_type)?;
            let graph = CatalogGraph::parse(bytes, rdf_format, Some(catalog_url))?;
            debug!(triples = graph.len(), format = rdf_format.name(), "parsed DCAT graph");
            Ok(Box::new(DcatCatalog::new(graph, dataset_limit)))
        }
    }
}
