use serde_json::Value;
use tracing::debug;

use crate::catalog::{Extraction, TaskSource};
use crate::domain::{
    CatalogFormat, TaskCandidate, UNKNOWN_DATASET, UNKNOWN_DISTRIBUTION, first_non_empty,
    resolve_file_name, resolve_identifier,
};
use crate::error::RescueError;

/// A DCAT-US / Project Open Data `data.json` document.
#[derive(Debug, Clone)]
pub struct DataJsonCatalog {
    root: Value,
}

impl DataJsonCatalog {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RescueError> {
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|err| RescueError::CatalogParse(err.to_string()))?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self, RescueError> {
        if !root.is_object() {
            return Err(RescueError::CatalogParse(
                "data.json root must be a JSON object".to_string(),
            ));
        }
        Ok(Self { root })
    }
}

impl TaskSource for DataJsonCatalog {
    fn format(&self) -> CatalogFormat {
        CatalogFormat::DataJson
    }

    fn extract(&self) -> Extraction {
        let datasets = array_field(&self.root, "dataset");
        let mut extraction = Extraction {
            datasets_total: datasets.len(),
            datasets_selected: datasets.len(),
            ..Extraction::default()
        };

        for dataset in datasets {
            let dataset_id =
                resolve_identifier([string_field(dataset, "identifier")], UNKNOWN_DATASET);

            for distribution in array_field(dataset, "distribution") {
                extraction.distributions_seen += 1;

                let Some(source_url) = first_non_empty([string_field(distribution, "downloadURL")])
                else {
                    debug!(dataset = %dataset_id, "distribution has no downloadURL");
                    continue;
                };

                let distribution_id = resolve_identifier(
                    [string_field(distribution, "identifier")],
                    UNKNOWN_DISTRIBUTION,
                );
                let file_name = resolve_file_name(
                    string_field(distribution, "fileName"),
                    source_url,
                    &distribution_id,
                );

                extraction.candidates.push(TaskCandidate {
                    dataset_id: dataset_id.clone(),
                    distribution_id,
                    source_url: source_url.to_string(),
                    file_name,
                });
            }
        }

        extraction
    }
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(|value| value.as_array())
        .map(|array| array.as_slice())
        .unwrap_or_default()
}

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|value| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(root: Value) -> Extraction {
        DataJsonCatalog::from_value(root).unwrap().extract()
    }

    #[test]
    fn one_task_per_distribution_with_download_url() {
        let extraction = extract(json!({
            "dataset": [
                {
                    "identifier": "A",
                    "distribution": [{"identifier": "a1", "downloadURL": "http://x/a.csv"}]
                },
                {
                    "identifier": "B",
                    "distribution": [{"identifier": "b1", "accessURL": "http://x/b"}]
                }
            ]
        }));

        assert_eq!(extraction.distributions_seen, 2);
        assert_eq!(
            extraction.candidates,
            vec![TaskCandidate {
                dataset_id: "A".to_string(),
                distribution_id: "a1".to_string(),
                source_url: "http://x/a.csv".to_string(),
                file_name: "a.csv".to_string(),
            }]
        );
    }

    #[test]
    fn missing_identifiers_use_sentinels() {
        let extraction = extract(json!({
            "dataset": [
                {"distribution": [{"downloadURL": "http://x/", "fileName": ""}]}
            ]
        }));

        let candidate = &extraction.candidates[0];
        assert_eq!(candidate.dataset_id, UNKNOWN_DATASET);
        assert_eq!(candidate.distribution_id, UNKNOWN_DISTRIBUTION);
        assert_eq!(candidate.file_name, "dist_unknown_distribution");
    }

    #[test]
    fn malformed_fields_degrade_instead_of_failing() {
        let extraction = extract(json!({
            "dataset": [
                {"identifier": 42, "distribution": "nope"},
                {"identifier": "ok", "distribution": [{"downloadURL": 7}, {"downloadURL": "  "}]}
            ]
        }));

        assert_eq!(extraction.datasets_total, 2);
        assert_eq!(extraction.distributions_seen, 2);
        assert!(extraction.candidates.is_empty());
    }

    #[test]
    fn catalog_without_datasets_is_empty() {
        let extraction =
            extract(json!({"conformsTo": "https://project-open-data.cio.gov/v1.1/schema"}));
        assert_eq!(extraction, Extraction::default());
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(DataJsonCatalog::from_slice(b"[1, 2]").is_err());
        assert!(DataJsonCatalog::from_slice(b"<html>").is_err());
    }
}
