use std::collections::HashSet;
use std::fs;

use tracing::{error, info, warn};

use crate::domain::{DownloadTask, TaskCandidate};
use crate::layout::OutputLayout;
use crate::ledger::FailureRecord;

#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Tasks to download, in catalog order.
    pub tasks: Vec<DownloadTask>,
    /// Destinations that already exist as regular files.
    pub skipped: usize,
    /// Candidates whose destination was already claimed earlier in this run.
    pub duplicates: usize,
    /// Candidates whose directory could not be created; never scheduled.
    pub failures: Vec<FailureRecord>,
}

/// Turns candidates into download tasks. Existing files are never scheduled
/// again, and the directory for every retained task exists on return.
pub fn plan_tasks(candidates: Vec<TaskCandidate>, layout: &OutputLayout) -> Plan {
    let mut plan = Plan::default();
    let mut claimed = HashSet::new();

    for candidate in candidates {
        let destination = layout.destination(&candidate);

        if !claimed.insert(destination.clone()) {
            warn!(
                url = %candidate.source_url,
                "Skipping download: {destination} is already targeted by another distribution."
            );
            plan.duplicates += 1;
            continue;
        }

        if destination.as_std_path().is_file() {
            info!("Skipping download: {destination} already exists.");
            plan.skipped += 1;
            continue;
        }

        if let Some(parent) = destination.parent()
            && let Err(err) = fs::create_dir_all(parent.as_std_path())
        {
            error!("Failed to create {parent} for {}: {err}", candidate.source_url);
            plan.failures.push(FailureRecord {
                url: candidate.source_url,
                message: format!("filesystem error: create {parent}: {err}"),
            });
            continue;
        }

        plan.tasks.push(DownloadTask {
            dataset_id: candidate.dataset_id,
            distribution_id: candidate.distribution_id,
            source_url: candidate.source_url,
            destination,
        });
    }

    plan
}
