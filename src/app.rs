use std::io::Read;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::catalog::parse_catalog;
use crate::config::MirrorConfig;
use crate::domain::CatalogFormat;
use crate::engine::{CancelToken, DownloadEngine, EngineOptions};
use crate::error::RescueError;
use crate::http::HttpClient;
use crate::layout::OutputLayout;
use crate::ledger::FailureRecord;
use crate::plan::plan_tasks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Summary of one mirror run. Per-file failures do not turn a run into an
/// error; only catalog retrieval and parsing can do that.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub portal: String,
    pub catalog_url: String,
    pub format: CatalogFormat,
    pub outcome: RunOutcome,
    pub datasets_total: usize,
    pub datasets_selected: usize,
    pub distributions_seen: usize,
    pub total_tasks: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub completed: usize,
    pub not_started: usize,
    pub failures: Vec<FailureRecord>,
    pub logs_path: String,
    pub started_at: String,
    pub finished_at: String,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct Mirror<C: HttpClient> {
    client: C,
    config: MirrorConfig,
}

impl<C: HttpClient> Mirror<C> {
    pub fn new(client: C, config: MirrorConfig) -> Self {
        Self { client, config }
    }

    pub fn layout(&self, catalog_url: &str) -> Result<OutputLayout, RescueError> {
        OutputLayout::for_portal(&self.config.output_dir, catalog_url)
    }

    /// Mirrors every file the catalog at `catalog_url` points to.
    ///
    /// Returns `Err` only when the catalog itself cannot be fetched or parsed
    /// (or the output root is unusable); no download is attempted then.
    pub fn run(
        &self,
        format: CatalogFormat,
        catalog_url: &str,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, RescueError> {
        let started_at = iso_timestamp();
        let start = Instant::now();
        let layout = self.layout(catalog_url)?;
        let logs_path = layout.logs_path();

        sink.event(ProgressEvent::message("Creating directory structure..."));
        layout.ensure_dirs()?;

        sink.event(ProgressEvent::message(format!(
            "Fetching {format} catalog from {catalog_url}"
        )));
        let (bytes, content_type) = self.fetch_catalog(catalog_url).inspect_err(|err| {
            error!("Error fetching catalog {catalog_url}: {err}");
        })?;
        save_snapshot(&layout, format, catalog_url, &bytes)?;

        sink.event(ProgressEvent::message(format!(
            "Processing portal: {}",
            layout.host()
        )));
        let source = parse_catalog(
            format,
            &bytes,
            catalog_url,
            content_type.as_deref(),
            self.config.dcat_dataset_limit,
        )
        .inspect_err(|err| error!("Error parsing catalog {catalog_url}: {err}"))?;
        drop(bytes);

        let extraction = source.extract();
        info!(
            datasets = extraction.datasets_selected,
            distributions = extraction.distributions_seen,
            candidates = extraction.candidates.len(),
            "catalog normalized"
        );
        let mut report = RunReport {
            portal: layout.host().to_string(),
            catalog_url: catalog_url.to_string(),
            format: source.format(),
            outcome: RunOutcome::Completed,
            datasets_total: extraction.datasets_total,
            datasets_selected: extraction.datasets_selected,
            distributions_seen: extraction.distributions_seen,
            total_tasks: 0,
            skipped: 0,
            duplicates: 0,
            completed: 0,
            not_started: 0,
            failures: Vec::new(),
            logs_path: logs_path.to_string(),
            started_at,
            finished_at: String::new(),
        };

        let plan = plan_tasks(extraction.candidates, &layout);
        report.total_tasks = plan.tasks.len();
        report.skipped = plan.skipped;
        report.duplicates = plan.duplicates;
        report.failures = plan.failures;

        sink.event(ProgressEvent::message(format!(
            "Found {} files to download",
            plan.tasks.len()
        )));
        if plan.tasks.is_empty() {
            sink.event(ProgressEvent::message(format!(
                "No files to download. See {logs_path} for details."
            )));
            report.finished_at = iso_timestamp();
            return Ok(report);
        }

        sink.event(ProgressEvent::message(format!(
            "Download in progress. See {logs_path} for details."
        )));
        let engine = DownloadEngine::new(
            &self.client,
            EngineOptions {
                workers: self.config.threads,
                warn_on_html: format == CatalogFormat::Dcat,
            },
        );
        let result = engine.run(plan.tasks, cancel);

        report.completed = result.completed;
        report.not_started = result.not_started;
        report.failures.extend(result.failures);
        if result.cancelled {
            report.outcome = RunOutcome::Cancelled;
        }
        report.finished_at = iso_timestamp();

        let summary = match (report.outcome, report.failures.len()) {
            (RunOutcome::Cancelled, _) => format!(
                "Run cancelled: {} downloaded, {} failed, {} not started. \
                 See {logs_path} for details.",
                report.completed,
                report.failures.len(),
                report.not_started
            ),
            (RunOutcome::Completed, 0) => "All downloads completed successfully.".to_string(),
            (RunOutcome::Completed, failed) => {
                format!("{failed} downloads failed. See {logs_path} for details.")
            }
        };
        sink.event(ProgressEvent {
            message: summary,
            elapsed: Some(start.elapsed()),
        });

        Ok(report)
    }

    fn fetch_catalog(&self, catalog_url: &str) -> Result<(Vec<u8>, Option<String>), RescueError> {
        let mut response = self
            .client
            .get(catalog_url)
            .map_err(|err| RescueError::CatalogFetch(err.to_string()))?;
        if !response.is_success() {
            return Err(RescueError::CatalogStatus {
                status: response.status,
                url: catalog_url.to_string(),
            });
        }
        let mut bytes = Vec::new();
        response
            .body
            .read_to_end(&mut bytes)
            .map_err(|err| RescueError::CatalogFetch(err.to_string()))?;
        Ok((bytes, response.content_type))
    }
}

fn save_snapshot(
    layout: &OutputLayout,
    format: CatalogFormat,
    catalog_url: &str,
    bytes: &[u8],
) -> Result<(), RescueError> {
    let path = layout.snapshot_path(format, catalog_url);
    OutputLayout::write_snapshot(&path, bytes)?;
    info!("Saved catalog snapshot to {path}");
    Ok(())
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
