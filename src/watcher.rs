// src/watcher.rs
//! The polling loop that turns new remote documents into posts.
//!
//! Each cycle lists the watched folder, keeps the supported documents that
//! were created within the recency window, and drives each one through
//! download → publish → remote delete → local cleanup. Failures are recorded
//! per step and never stop the cycle; the next file is processed regardless.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::publish::{PostBackend, PublishOutcome, WordPressStore};
use crate::storage::{folder_documents, RemoteFile, RemoteStorage, StorageError};

/// Granularity at which a sleeping loop notices the stop flag.
const SHUTDOWN_POLL_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Remote folder to watch
    pub folder: String,
    /// Seconds after creation during which a file is considered new
    pub freshness_window: u64,
    /// Pause between the end of one cycle and the start of the next
    pub poll_interval: Duration,
    /// Local directory documents are downloaded into
    pub download_dir: PathBuf,
    /// Skip the remote delete when publishing failed
    pub keep_on_publish_failure: bool,
}

/// Pipeline stage a per-file failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Download,
    Read,
    Publish,
    DeleteRemote,
    RemoveLocal,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Download => "download",
            Step::Read => "read",
            Step::Publish => "publish",
            Step::DeleteRemote => "remote delete",
            Step::RemoveLocal => "local cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: Step,
    pub message: String,
}

/// What happened to one fresh file during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub name: String,
    pub path: String,
    pub title: String,
    /// Set once the publish step returned successfully
    pub published: Option<PublishOutcome>,
    pub remote_deleted: bool,
    /// False only when removing an existing local copy failed
    pub local_removed: bool,
    pub failures: Vec<StepFailure>,
}

impl FileReport {
    fn new(file: &RemoteFile) -> Self {
        Self {
            name: file.name.clone(),
            path: file.path.clone(),
            title: file.title(),
            published: None,
            remote_deleted: false,
            local_removed: false,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, step: Step, message: impl fmt::Display) {
        let message = message.to_string();
        error!("Error processing {} ({step}): {message}", self.name);
        self.failures.push(StepFailure { step, message });
    }

    pub fn failed_at(&self, step: Step) -> bool {
        self.failures.iter().any(|f| f.step == step)
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Entries returned by the listing, directories included
    pub listed: usize,
    /// Supported documents among them
    pub documents: usize,
    /// Documents skipped for being older than the window
    pub stale: usize,
    /// One report per fresh document, in listing order
    pub files: Vec<FileReport>,
}

impl CycleReport {
    pub fn found_new(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Local path a remote file is downloaded to. Only the final name
/// component is used so a remote name can never escape `dir`.
pub fn local_path(dir: &Path, name: &str) -> PathBuf {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| name.into());
    dir.join(base)
}

/// Remove `path`; a file that is already gone is not an error.
fn remove_local(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub struct Watcher {
    settings: PollSettings,
}

impl Watcher {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// List the watched folder and keep the supported documents, split into
    /// (fresh, stale) relative to `now`. An expired access token is renewed
    /// once and the listing repeated.
    pub fn scan<S: RemoteStorage + ?Sized>(
        &self,
        storage: &S,
        now: i64,
    ) -> Result<(usize, Vec<RemoteFile>, Vec<RemoteFile>), StorageError> {
        let listing = match storage.list(&self.settings.folder, true) {
            Err(e) if e.is_expired_token() => {
                warn!("Access token rejected ({e}), renewing");
                if !storage.renew_token()? {
                    return Err(e);
                }
                storage.list(&self.settings.folder, true)?
            }
            listing => listing?,
        };
        let listed = listing.len();
        let (fresh, stale): (Vec<_>, Vec<_>) = folder_documents(listing)
            .into_iter()
            .partition(|f| f.is_fresh(now, self.settings.freshness_window));
        Ok((listed, fresh, stale))
    }

    /// Run a single cycle at time `now` (Unix seconds). Only a listing
    /// failure is returned as an error; per-file failures end up in the
    /// report.
    pub fn poll_once<S, B>(
        &self,
        storage: &S,
        store: &mut WordPressStore<B>,
        now: i64,
    ) -> Result<CycleReport, StorageError>
    where
        S: RemoteStorage + ?Sized,
        B: PostBackend,
    {
        let (listed, fresh, stale) = self.scan(storage, now)?;
        let mut report = CycleReport {
            listed,
            documents: fresh.len() + stale.len(),
            stale: stale.len(),
            files: Vec::with_capacity(fresh.len()),
        };

        for file in &fresh {
            report.files.push(self.process_file(storage, store, file));
        }

        if !report.found_new() {
            info!("No new files");
        }
        Ok(report)
    }

    fn process_file<S, B>(
        &self,
        storage: &S,
        store: &mut WordPressStore<B>,
        file: &RemoteFile,
    ) -> FileReport
    where
        S: RemoteStorage + ?Sized,
        B: PostBackend,
    {
        let mut report = FileReport::new(file);
        let local = local_path(&self.settings.download_dir, &file.name);

        self.publish_and_delete(storage, store, file, &local, &mut report);

        // Runs whatever happened above so downloads never pile up.
        match remove_local(&local) {
            Ok(()) => report.local_removed = true,
            Err(e) => report.fail(Step::RemoveLocal, e),
        }
        report
    }

    fn publish_and_delete<S, B>(
        &self,
        storage: &S,
        store: &mut WordPressStore<B>,
        file: &RemoteFile,
        local: &Path,
        report: &mut FileReport,
    ) where
        S: RemoteStorage + ?Sized,
        B: PostBackend,
    {
        info!("Downloading {}", file.name);
        if let Err(e) = storage.download(file, local) {
            report.fail(Step::Download, e);
            return;
        }

        let content = match std::fs::read(local) {
            Ok(content) => content,
            Err(e) => {
                report.fail(Step::Read, e);
                return;
            }
        };

        match store.publish(&report.title, &content) {
            Ok(outcome) => report.published = Some(outcome),
            Err(e) => {
                report.fail(Step::Publish, e);
                if self.settings.keep_on_publish_failure {
                    warn!("Keeping {} on the remote store after failed publish", file.path);
                    return;
                }
            }
        }

        match storage.delete(&file.path) {
            Ok(()) => report.remote_deleted = true,
            Err(e) => report.fail(Step::DeleteRemote, e),
        }
    }

    /// Poll forever, sleeping `poll_interval` between cycles, until
    /// `shutdown` is set or `max_cycles` cycles have run. Returns the
    /// number of cycles run.
    pub fn run<S, B>(
        &self,
        storage: &S,
        store: &mut WordPressStore<B>,
        shutdown: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> u64
    where
        S: RemoteStorage + ?Sized,
        B: PostBackend,
    {
        let mut cycles = 0u64;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Received shutdown signal");
                break;
            }

            let now = chrono::Utc::now().timestamp();
            match self.poll_once(storage, store, now) {
                Ok(report) => {
                    let failed = report.files.iter().filter(|f| !f.succeeded()).count();
                    info!(
                        "Cycle done: {} listed, {} documents, {} new, {} stale, {} with errors",
                        report.listed,
                        report.documents,
                        report.files.len(),
                        report.stale,
                        failed
                    );
                }
                Err(e) => error!("Failed to list {}: {e}", self.settings.folder),
            }
            cycles += 1;

            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            if sleep_or_shutdown(self.settings.poll_interval, shutdown) {
                info!("Received shutdown signal");
                break;
            }
        }

        cycles
    }
}

/// Sleep for `duration`, but return early if shutdown is signaled.
/// Returns true if shutdown was requested.
pub fn sleep_or_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Relaxed) {
            return true;
        }
        let sleep_time = remaining.min(SHUTDOWN_POLL_STEP);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
    shutdown.load(Ordering::Relaxed)
}
