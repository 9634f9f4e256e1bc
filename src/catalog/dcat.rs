use std::path::Path;

use oxrdf::vocab::rdf;
use oxrdf::{NamedNodeRef, Subject, SubjectRef, TermRef, Triple};
use oxrdfio::{RdfFormat, RdfParser};
use tracing::{debug, warn};

use crate::catalog::{Extraction, TaskSource};
use crate::domain::{
    CatalogFormat, TaskCandidate, UNKNOWN_DATASET, UNKNOWN_DISTRIBUTION, digest_id,
    first_non_empty, last_uri_segment, resolve_file_name, resolve_identifier,
};
use crate::error::RescueError;

pub const DCAT_DATASET: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#Dataset");
pub const DCAT_DISTRIBUTION: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#distribution");
pub const DCAT_DOWNLOAD_URL: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#downloadURL");
pub const DCAT_ACCESS_URL: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#accessURL");
pub const DCT_IDENTIFIER: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/identifier");

/// Parsed catalog. Named graphs are merged into one indexed graph, and
/// `dcat:Dataset` subjects are kept in the order they first appear.
#[derive(Debug)]
pub struct CatalogGraph {
    triples: oxrdf::Graph,
    datasets: Vec<Subject>,
}

impl CatalogGraph {
    pub fn parse(
        bytes: &[u8],
        format: RdfFormat,
        base_iri: Option<&str>,
    ) -> Result<Self, RescueError> {
        let mut parser = RdfParser::from_format(format);
        if let Some(base) = base_iri {
            parser = parser
                .with_base_iri(base)
                .map_err(|err| RescueError::CatalogParse(err.to_string()))?;
        }

        let mut triples = oxrdf::Graph::new();
        let mut datasets = Vec::new();
        for quad in parser.for_reader(bytes) {
            let quad = quad.map_err(|err| RescueError::CatalogParse(err.to_string()))?;
            let triple = Triple::new(quad.subject, quad.predicate, quad.object);
            let is_dataset = triple.predicate.as_ref() == rdf::TYPE
                && triple.object.as_ref() == TermRef::NamedNode(DCAT_DATASET);
            if triples.insert(&triple) && is_dataset {
                datasets.push(triple.subject);
            }
        }
        Ok(Self { triples, datasets })
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn datasets(&self) -> &[Subject] {
        &self.datasets
    }

    /// Objects of `predicate` that are themselves resources (IRIs or blank nodes).
    fn resources<'a>(
        &'a self,
        subject: SubjectRef<'a>,
        predicate: NamedNodeRef<'static>,
    ) -> impl Iterator<Item = SubjectRef<'a>> + 'a {
        self.triples
            .objects_for_subject_predicate(subject, predicate)
            .filter_map(|term| match term {
                TermRef::NamedNode(node) => Some(SubjectRef::from(node)),
                TermRef::BlankNode(node) => Some(SubjectRef::from(node)),
                _ => None,
            })
    }

    fn text<'a>(
        &'a self,
        subject: SubjectRef<'a>,
        predicate: NamedNodeRef<'static>,
    ) -> Option<&'a str> {
        match self.triples.object_for_subject_predicate(subject, predicate)? {
            TermRef::NamedNode(node) => Some(node.as_str()),
            TermRef::Literal(literal) => Some(literal.value()),
            _ => None,
        }
    }

    fn identifier(&self, resource: SubjectRef<'_>, fallback: &str) -> String {
        let declared = self
            .triples
            .objects_for_subject_predicate(resource, DCT_IDENTIFIER)
            .find_map(|term| match term {
                TermRef::Literal(literal) => Some(literal.value()),
                _ => None,
            });
        // Blank node labels change on every parse and never name a resource.
        let segment = match resource {
            SubjectRef::NamedNode(node) => last_uri_segment(node.as_str()),
            _ => None,
        };
        resolve_identifier([declared, segment], fallback)
    }
}

/// Picks the RDF serialization from the catalog URL extension, then from the
/// response content type.
pub fn guess_format(
    catalog_url: &str,
    content_type: Option<&str>,
) -> Result<RdfFormat, RescueError> {
    let path = url::Url::parse(catalog_url)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| catalog_url.to_string());
    let extension = Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let by_extension = match extension.as_deref() {
        Some("rdf" | "owl" | "xml") => Some(RdfFormat::RdfXml),
        Some("ttl") => Some(RdfFormat::Turtle),
        Some("nt") => Some(RdfFormat::NTriples),
        Some("nq") => Some(RdfFormat::NQuads),
        Some("trig") => Some(RdfFormat::TriG),
        Some("n3") => Some(RdfFormat::N3),
        _ => None,
    };
    if let Some(format) = by_extension {
        return Ok(format);
    }

    content_type
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .and_then(|mime| RdfFormat::from_media_type(mime.essence_str()))
        .ok_or_else(|| {
            RescueError::UnsupportedCatalogFormat(
                extension.unwrap_or_else(|| content_type.unwrap_or("unknown").to_string()),
            )
        })
}

#[derive(Debug)]
pub struct DcatCatalog {
    graph: CatalogGraph,
    dataset_limit: Option<usize>,
}

impl DcatCatalog {
    /// `dataset_limit` caps how many `dcat:Dataset` subjects are mirrored;
    /// `None` mirrors all of them.
    pub fn new(graph: CatalogGraph, dataset_limit: Option<usize>) -> Self {
        Self {
            graph,
            dataset_limit,
        }
    }

    fn download_url<'a>(&'a self, distribution: SubjectRef<'a>) -> Option<&'a str> {
        // Some portals only fill accessURL, sometimes with a landing page. The
        // download engine warns about HTML responses for this catalog type.
        first_non_empty([
            self.graph.text(distribution, DCAT_DOWNLOAD_URL),
            self.graph.text(distribution, DCAT_ACCESS_URL),
        ])
    }
}

impl TaskSource for DcatCatalog {
    fn format(&self) -> CatalogFormat {
        CatalogFormat::Dcat
    }

    fn extract(&self) -> Extraction {
        let datasets = self.graph.datasets();
        let limit = self.dataset_limit.unwrap_or(datasets.len());
        let selected = &datasets[..datasets.len().min(limit)];
        if selected.len() < datasets.len() {
            warn!(
                total = datasets.len(),
                limit,
                "dataset limit reached, remaining DCAT datasets are not mirrored"
            );
        }

        let mut extraction = Extraction {
            datasets_total: datasets.len(),
            datasets_selected: selected.len(),
            ..Extraction::default()
        };

        for dataset in selected {
            let dataset = dataset.as_ref();
            let dataset_id = self.graph.identifier(dataset, UNKNOWN_DATASET);

            for distribution in self.graph.resources(dataset, DCAT_DISTRIBUTION) {
                extraction.distributions_seen += 1;

                let source_url = self.download_url(distribution);
                let fallback = source_url
                    .map(digest_id)
                    .unwrap_or_else(|| UNKNOWN_DISTRIBUTION.to_string());
                let distribution_id = self.graph.identifier(distribution, &fallback);
                let Some(source_url) = source_url else {
                    debug!(
                        dataset = %dataset_id,
                        distribution = %distribution_id,
                        "distribution has neither downloadURL nor accessURL"
                    );
                    continue;
                };

                extraction.candidates.push(TaskCandidate {
                    dataset_id: dataset_id.clone(),
                    file_name: resolve_file_name(None, source_url, &distribution_id),
                    distribution_id,
                    source_url: source_url.to_string(),
                });
            }
        }

        extraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIXES: &str = "@prefix dcat: <http://www.w3.org/ns/dcat#> .\n\
                            @prefix dct: <http://purl.org/dc/terms/> .\n";

    fn catalog(turtle: &str, limit: Option<usize>) -> DcatCatalog {
        let source = format!("{PREFIXES}{turtle}");
        let graph = CatalogGraph::parse(source.as_bytes(), RdfFormat::Turtle, None).unwrap();
        DcatCatalog::new(graph, limit)
    }

    fn candidate<'a>(extraction: &'a Extraction, distribution_id: &str) -> &'a TaskCandidate {
        extraction
            .candidates
            .iter()
            .find(|candidate| candidate.distribution_id == distribution_id)
            .unwrap()
    }

    #[test]
    fn dataset_cap_is_applied() {
        let turtle: String = (0..8)
            .map(|n| {
                format!(
                    "<https://portal.example/dataset/ds{n}> a dcat:Dataset ;\n\
                     \tdcat:distribution <https://portal.example/dataset/ds{n}/resource/r{n}> .\n\
                     <https://portal.example/dataset/ds{n}/resource/r{n}>\n\
                     \tdcat:downloadURL <https://portal.example/files/f{n}.csv> .\n"
                )
            })
            .collect();

        let capped = catalog(&turtle, Some(5)).extract();
        assert_eq!(capped.datasets_total, 8);
        assert_eq!(capped.datasets_selected, 5);
        assert_eq!(capped.candidates.len(), 5);
        assert_eq!(capped.candidates[0].dataset_id, "ds0");
        assert_eq!(capped.candidates[4].dataset_id, "ds4");

        let uncapped = catalog(&turtle, None).extract();
        assert_eq!(uncapped.candidates.len(), 8);
    }

    #[test]
    fn access_url_is_used_when_download_url_is_missing() {
        let extraction = catalog(
            r#"
            <https://portal.example/dataset/abc> a dcat:Dataset ;
                dcat:distribution <https://portal.example/dataset/abc/resource/r1>,
                    <https://portal.example/dataset/abc/resource/r3>,
                    [
                        dct:identifier "dump" ;
                        dcat:accessURL <https://portal.example/landing> ;
                        dcat:downloadURL <https://portal.example/dump.zip>
                    ] .

            <https://portal.example/dataset/abc/resource/r1>
                dcat:accessURL <https://portal.example/dataset/abc/resource/r1> .
            "#,
            Some(5),
        )
        .extract();

        assert_eq!(extraction.distributions_seen, 3);
        assert_eq!(extraction.candidates.len(), 2);

        let access_only = candidate(&extraction, "r1");
        assert_eq!(access_only.dataset_id, "abc");
        assert_eq!(access_only.file_name, "r1");

        let both = candidate(&extraction, "dump");
        assert_eq!(both.source_url, "https://portal.example/dump.zip");
        assert_eq!(both.file_name, "dump.zip");
    }

    #[test]
    fn parses_turtle_catalog() {
        let extraction = catalog(
            r#"
            <https://portal.example/dataset/d1> a dcat:Dataset ;
                dct:identifier "d1-uuid" ;
                dcat:distribution <https://portal.example/dataset/d1/resource/r1> .

            <https://portal.example/dataset/d1/resource/r1> a dcat:Distribution ;
                dcat:downloadURL <https://portal.example/files/report.csv> .
            "#,
            Some(5),
        )
        .extract();

        assert_eq!(
            extraction.candidates,
            vec![TaskCandidate {
                dataset_id: "d1-uuid".to_string(),
                distribution_id: "r1".to_string(),
                source_url: "https://portal.example/files/report.csv".to_string(),
                file_name: "report.csv".to_string(),
            }]
        );
    }

    #[test]
    fn anonymous_resources_get_the_same_ids_on_every_parse() {
        let turtle = r#"
            [] a dcat:Dataset ;
                dcat:distribution [ dcat:downloadURL <https://portal.example/files/a.csv> ] .
        "#;

        let first = catalog(turtle, None).extract();
        let second = catalog(turtle, None).extract();

        assert_eq!(first, second);
        assert_eq!(first.candidates.len(), 1);
        assert_eq!(first.candidates[0].dataset_id, UNKNOWN_DATASET);
        assert_eq!(
            first.candidates[0].distribution_id,
            digest_id("https://portal.example/files/a.csv")
        );
        assert_eq!(first.candidates[0].file_name, "a.csv");
    }

    #[test]
    fn datasets_keep_document_order_and_are_counted_once() {
        let graph = CatalogGraph::parse(
            format!(
                "{PREFIXES}<https://p/d/z> a dcat:Dataset .\n\
                 <https://p/d/a> a dcat:Dataset .\n\
                 <https://p/d/z> a dcat:Dataset .\n"
            )
            .as_bytes(),
            RdfFormat::Turtle,
            None,
        )
        .unwrap();

        assert!(!graph.is_empty());
        assert_eq!(graph.len(), 2);
        let names: Vec<_> = graph
            .datasets()
            .iter()
            .map(|subject| subject.to_string())
            .collect();
        assert_eq!(names, ["<https://p/d/z>", "<https://p/d/a>"]);
    }

    #[test]
    fn format_is_guessed_from_extension_then_content_type() {
        assert_eq!(
            guess_format("https://portal.example/catalog.ttl", None).unwrap(),
            RdfFormat::Turtle
        );
        assert_eq!(
            guess_format("https://portal.example/catalog.xml", Some("text/turtle")).unwrap(),
            RdfFormat::RdfXml
        );
        assert_eq!(
            guess_format("https://portal.example/catalog", Some("text/turtle; charset=utf-8"))
                .unwrap(),
            RdfFormat::Turtle
        );
        assert!(guess_format("https://portal.example/catalog", None).is_err());
    }
}
