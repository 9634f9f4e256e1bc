//! Bounded download worker pool.
//!
//! All tasks are seeded into one shared queue before the workers start. Each
//! worker pops the next task until the queue is empty (or the run is
//! cancelled), so faster workers naturally take more tasks. A task moves
//! `Queued -> InFlight -> Completed | Failed` exactly once; failures are
//! recorded in the [`FailureLedger`] and never retried.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use camino::Utf8Path;
use tracing::{error, info, warn};

use crate::domain::DownloadTask;
use crate::error::RescueError;
use crate::http::HttpClient;
use crate::ledger::{FailureLedger, FailureRecord};

/// Cooperative cancellation flag. Raising it stops workers from taking new
/// tasks; downloads already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub workers: usize,
    /// Warn when a response is declared as `text/html`. The body is still saved.
    pub warn_on_html: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EngineReport {
    pub completed: usize,
    pub failures: Vec<FailureRecord>,
    /// Tasks left in the queue because the run was cancelled.
    pub not_started: usize,
    pub cancelled: bool,
}

struct TaskQueue {
    pending: Mutex<VecDeque<DownloadTask>>,
}

impl TaskQueue {
    fn new(tasks: Vec<DownloadTask>) -> Self {
        Self {
            pending: Mutex::new(tasks.into()),
        }
    }

    fn pop(&self) -> Option<DownloadTask> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

pub struct DownloadEngine<'a, C: HttpClient> {
    client: &'a C,
    options: EngineOptions,
}

impl<'a, C: HttpClient> DownloadEngine<'a, C> {
    pub fn new(client: &'a C, options: EngineOptions) -> Self {
        Self { client, options }
    }

    /// Runs every task and returns once each one has reached a terminal state
    /// (or was never started because of cancellation).
    pub fn run(&self, tasks: Vec<DownloadTask>, cancel: &CancelToken) -> EngineReport {
        let worker_count = self.options.workers.max(1).min(tasks.len());
        let queue = TaskQueue::new(tasks);
        let ledger = FailureLedger::new();
        let completed = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| self.worker(&queue, &ledger, &completed, cancel));
            }
        });

        EngineReport {
            completed: completed.into_inner(),
            failures: ledger.into_records(),
            not_started: queue.len(),
            cancelled: cancel.is_cancelled(),
        }
    }

    fn worker(
        &self,
        queue: &TaskQueue,
        ledger: &FailureLedger,
        completed: &AtomicUsize,
        cancel: &CancelToken,
    ) {
        while !cancel.is_cancelled() {
            let Some(task) = queue.pop() else {
                break;
            };

            info!("Downloading: {}", task.destination);
            match self.download(&task) {
                Ok(()) => {
                    info!("Downloaded: {}", task.destination);
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    error!("Failed to download {}: {err}", task.source_url);
                    ledger.record(&task.source_url, err.to_string());
                }
            }
        }
    }

    fn download(&self, task: &DownloadTask) -> Result<(), RescueError> {
        let mut response = self.client.get(&task.source_url)?;
        if !response.is_success() {
            return Err(RescueError::HttpStatus {
                status: response.status,
            });
        }
        if self.options.warn_on_html && response.is_html() {
            warn!(
                url = %task.source_url,
                "The download URL of {} might not be a file (got text/html)",
                task.distribution_id
            );
        }
        write_atomic(&mut response.body, &task.destination)
    }
}

/// Streams `body` into a temp file beside `destination` and renames it into
/// place, so an interrupted download never leaves a file behind.
fn write_atomic(body: &mut dyn io::Read, destination: &Utf8Path) -> Result<(), RescueError> {
    let parent = destination
        .parent()
        .ok_or_else(|| RescueError::Filesystem(format!("invalid destination {destination}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".ckan-rescue")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RescueError::Filesystem(err.to_string()))?;
    io::copy(body, &mut temp).map_err(|err| RescueError::Http(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| RescueError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use camino::Utf8PathBuf;
    use std::collections::HashMap;
    use std::fs;
    use std::io::Cursor;
    use std::time::Duration;

    #[derive(Default)]
    struct MockClient {
        bodies: HashMap<String, (u16, Option<&'static str>, &'static [u8])>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
        cancel_after_first: Option<CancelToken>,
    }

    impl MockClient {
        fn with(mut self, url: &str, status: u16, body: &'static [u8]) -> Self {
            self.bodies.insert(url.to_string(), (status, None, body));
            self
        }
    }

    impl HttpClient for MockClient {
        fn get(&self, url: &str) -> Result<HttpResponse, RescueError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let (status, content_type, body) = self
                .bodies
                .get(url)
                .copied()
                .ok_or_else(|| RescueError::Http(format!("connection refused: {url}")))?;
            Ok(HttpResponse {
                status,
                content_type: content_type.map(|value| value.to_string()),
                body: Box::new(Cursor::new(body.to_vec())),
            })
        }
    }

    fn tasks(root: &Utf8PathBuf, count: usize) -> Vec<DownloadTask> {
        (0..count)
            .map(|n| {
                let dir = root.join(format!("ds{n}")).join(format!("r{n}"));
                fs::create_dir_all(&dir).unwrap();
                DownloadTask {
                    dataset_id: format!("ds{n}"),
                    distribution_id: format!("r{n}"),
                    source_url: format!("http://x/f{n}.csv"),
                    destination: dir.join(format!("f{n}.csv")),
                }
            })
            .collect()
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    fn options(workers: usize) -> EngineOptions {
        EngineOptions {
            workers,
            warn_on_html: false,
        }
    }

    #[test]
    fn one_failure_does_not_stop_the_others() {
        let (_temp, root) = scratch();
        let client = MockClient::default()
            .with("http://x/f0.csv", 200, b"zero")
            .with("http://x/f2.csv", 200, b"two")
            .with("http://x/f3.csv", 200, b"three");
        let tasks = tasks(&root, 4);
        let failing = tasks[1].destination.clone();

        let report = DownloadEngine::new(&client, options(2)).run(tasks, &CancelToken::new());

        assert_eq!(report.completed, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, "http://x/f1.csv");
        assert!(!failing.exists());
        assert_eq!(fs::read(root.join("ds3/r3/f3.csv")).unwrap(), b"three");
    }

    #[test]
    fn non_success_status_is_a_failure() {
        let (_temp, root) = scratch();
        let client = MockClient::default().with("http://x/f0.csv", 404, b"missing");

        let report =
            DownloadEngine::new(&client, options(1)).run(tasks(&root, 1), &CancelToken::new());

        assert_eq!(report.completed, 0);
        assert_eq!(report.failures[0].message, "server returned status 404");
        assert!(!root.join("ds0/r0/f0.csv").exists());
    }

    #[test]
    fn html_body_is_still_written() {
        let (_temp, root) = scratch();
        let mut client = MockClient::default();
        client.bodies.insert(
            "http://x/f0.csv".to_string(),
            (200, Some("text/html; charset=utf-8"), &b"<html>landing</html>"[..]),
        );
        let engine = DownloadEngine::new(
            &client,
            EngineOptions {
                workers: 1,
                warn_on_html: true,
            },
        );

        let report = engine.run(tasks(&root, 1), &CancelToken::new());

        assert_eq!(report.completed, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            fs::read(root.join("ds0/r0/f0.csv")).unwrap(),
            b"<html>landing</html>"
        );
    }

    #[test]
    fn in_flight_fetches_never_exceed_worker_count() {
        let (_temp, root) = scratch();
        let mut client = MockClient {
            delay: Some(Duration::from_millis(20)),
            ..MockClient::default()
        };
        for n in 0..12 {
            client
                .bodies
                .insert(format!("http://x/f{n}.csv"), (200, None, &b"ok"[..]));
        }

        let report =
            DownloadEngine::new(&client, options(3)).run(tasks(&root, 12), &CancelToken::new());

        assert_eq!(report.completed, 12);
        let max = client.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "max in flight was {max}");
        assert!(max >= 1);
    }

    #[test]
    fn cancellation_stops_dequeuing() {
        let (_temp, root) = scratch();
        let cancel = CancelToken::new();
        let mut client = MockClient {
            cancel_after_first: Some(cancel.clone()),
            ..MockClient::default()
        };
        for n in 0..5 {
            client
                .bodies
                .insert(format!("http://x/f{n}.csv"), (200, None, &b"ok"[..]));
        }

        let report = DownloadEngine::new(&client, options(1)).run(tasks(&root, 5), &cancel);

        assert!(report.cancelled);
        assert_eq!(report.completed, 1);
        assert_eq!(report.not_started, 4);
    }

    #[test]
    fn empty_task_list_spawns_nothing() {
        let client = MockClient::default();
        let report = DownloadEngine::new(&client, options(5)).run(Vec::new(), &CancelToken::new());
        assert_eq!(report.completed, 0);
        assert!(report.failures.is_empty());
        assert!(!report.cancelled);
    }
}
