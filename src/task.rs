//! # Merge jobs
//!
//! A [`MergeRequest`] names everything a merge needs. [`run`] executes it on
//! the calling thread; [`MergeTask::spawn`] executes it on one background
//! worker and hands back a [`TaskHandle`] for progress, cancellation and the
//! final report.

use crate::error::MergeError;
use crate::merge::merge_tables;
use crate::merge::ColumnSelection;
use crate::merge::MergeOptions;
use crate::progress::CancellationToken;
use crate::progress::Progress;
use crate::progress::Stage;
use crate::progress::Tracker;
use crate::report::MergeReport;
use crate::spreadsheet::table::LoadOptions;
use crate::spreadsheet::table::SourceTable;
use crate::writer::write_merged;
use log::debug;
use log::error;
use log::warn;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;

/// One input spreadsheet and the columns taken from it.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSpec {
    pub path: PathBuf,
    /// Worksheet to read; the active one when `None`
    pub sheet: Option<String>,
    pub columns: ColumnSelection,
}

impl InputSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            columns: ColumnSelection::All,
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_columns(mut self, columns: ColumnSelection) -> Self {
        self.columns = columns;
        self
    }
}

/// Everything a merge job needs.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeRequest {
    pub inputs: Vec<InputSpec>,
    /// Reference column; rows align by position when `None`
    pub key: Option<String>,
    pub output: PathBuf,
    pub options: MergeOptions,
}

/// Loads, merges and writes on the calling thread.
///
/// Nothing is written unless every input loads and validates.
pub fn run(
    request: &MergeRequest,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<MergeReport, MergeError> {
    let tables = load_inputs(request, token, progress)?;
    let selections = request
        .inputs
        .iter()
        .map(|input| input.columns.clone())
        .collect::<Vec<_>>();
    merge_to_file(&tables, &selections, request, token, progress)
}

/// Merges tables already in memory into the requested output.
pub fn merge_to_file(
    tables: &[SourceTable],
    selections: &[ColumnSelection],
    request: &MergeRequest,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<MergeReport, MergeError> {
    let key = request.key.as_deref();
    let (merged, warnings) = merge_tables(tables, selections, key, &request.options, token, progress)?;
    for warning in &warnings {
        warn!("{warning}");
    }
    write_merged(tables, &merged, &request.output, &request.options, token, progress)?;

    Ok(MergeReport {
        output: request.output.to_owned(),
        rows: merged.rows.len(),
        columns: merged.columns.len(),
        warnings,
    })
}

fn load_inputs(
    request: &MergeRequest,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<SourceTable>, MergeError> {
    let mut tracker = Tracker::new(Stage::Loading, request.inputs.len(), 1, token, progress)?;
    let mut tables = Vec::with_capacity(request.inputs.len());
    for input in &request.inputs {
        let options = LoadOptions {
            sheet: input.sheet.to_owned(),
        };
        tables.push(SourceTable::load(&input.path, &options)?);
        tracker.advance()?;
    }
    tracker.finish()?;
    Ok(tables)
}

/// State of a background merge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A merge job to run on a background thread.
pub struct MergeTask {
    request: MergeRequest,
    token: CancellationToken,
}

impl MergeTask {
    pub fn new(request: MergeRequest) -> Self {
        Self {
            request,
            token: CancellationToken::new(),
        }
    }

    /// Runs the job on a new worker thread.
    pub fn spawn(self) -> TaskHandle {
        let status = Arc::new(Mutex::new(TaskStatus::Pending));
        let (sender, receiver) = mpsc::channel();
        let token = self.token.clone();

        let worker_status = Arc::clone(&status);
        let worker = std::thread::spawn(move || {
            set_status(&worker_status, TaskStatus::Running);
            // A dropped receiver only means nobody watches progress
            let mut report = |progress: Progress| {
                debug!("{progress}");
                let _ = sender.send(progress);
            };
            let result = run(&self.request, &self.token, &mut report);
            let final_status = match &result {
                Ok(_) => TaskStatus::Completed,
                Err(error) if error.is_cancelled() => TaskStatus::Cancelled,
                Err(error) => {
                    error!("{error}");
                    TaskStatus::Failed
                }
            };
            set_status(&worker_status, final_status);
            result
        });

        TaskHandle {
            token,
            status,
            progress: receiver,
            worker,
        }
    }
}

fn set_status(status: &Mutex<TaskStatus>, value: TaskStatus) {
    // A poisoned lock still holds a usable status
    let mut guard = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = value;
}

/// Handle of a running merge job.
pub struct TaskHandle {
    token: CancellationToken,
    status: Arc<Mutex<TaskStatus>>,
    progress: mpsc::Receiver<Progress>,
    worker: JoinHandle<Result<MergeReport, MergeError>>,
}

impl TaskHandle {
    /// Requests cancellation; the worker stops at its next check.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Progress reports sent so far, and further ones as they arrive.
    pub fn progress(&self) -> &mpsc::Receiver<Progress> {
        &self.progress
    }

    /// Blocks until the worker finishes.
    pub fn wait(self) -> Result<MergeReport, MergeError> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => {
                set_status(&self.status, TaskStatus::Failed);
                Err(MergeError::WorkerError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(inputs: Vec<InputSpec>, output: PathBuf) -> MergeRequest {
        MergeRequest {
            inputs,
            key: None,
            output,
            options: MergeOptions::default(),
        }
    }

    #[test]
    fn builds_input_specs() {
        let input = InputSpec::new("a.xlsx")
            .with_sheet("Q1")
            .with_columns(ColumnSelection::columns(["id"]));
        assert_eq!(input.path, PathBuf::from("a.xlsx"));
        assert_eq!(input.sheet.as_deref(), Some("Q1"));
        assert_eq!(input.columns, ColumnSelection::Columns(vec!["id".to_owned()]));
    }

    #[test]
    fn fails_without_inputs() {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("out.xlsx");
        let error = run(&request(Vec::new(), output.to_owned()), &CancellationToken::new(), &mut |_| ()).unwrap_err();
        assert_eq!(error.to_string(), "No input spreadsheets were given");
        assert!(!output.exists());
    }

    #[test]
    fn background_task_reports_failure() {
        let directory = tempfile::tempdir().unwrap();
        let missing = directory.path().join("missing.xlsx");
        let output = directory.path().join("out.xlsx");
        let handle = MergeTask::new(request(vec![InputSpec::new(missing)], output.to_owned())).spawn();
        let result = handle.wait();
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn cancelled_task_ends_cancelled() {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("out.xlsx");
        let task = MergeTask::new(request(vec![InputSpec::new("unused.xlsx")], output.to_owned()));
        task.token.cancel();
        let handle = task.spawn();
        let status = Arc::clone(&handle.status);
        let error = handle.wait().unwrap_err();
        assert!(error.is_cancelled());
        assert_eq!(*status.lock().unwrap(), TaskStatus::Cancelled);
        assert!(TaskStatus::Cancelled.is_finished());
    }
}
