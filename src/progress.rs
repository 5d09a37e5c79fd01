//! Progress reporting and cooperative cancellation.

use crate::error::MergeError;
use log::debug;
use std::fmt::Display;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A cancellation flag shared between a caller and a running merge.
///
/// Cancelling is advisory: the merge checks the flag between batches of rows
/// and between stages.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`MergeError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), MergeError> {
        if self.is_cancelled() {
            Err(MergeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Stage of a merge job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Reading input files; counted in files
    Loading,
    /// Matching source rows; counted in source rows
    Aligning,
    /// Rendering output rows; counted in rows
    Writing,
    /// Saving and committing the output file
    Saving,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Aligning => "aligning",
            Self::Writing => "writing",
            Self::Saving => "saving",
        };
        write!(f, "{name}")
    }
}

/// Advancement of one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    /// Completion of the stage from 0 to 100.
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            (self.processed.min(self.total) * 100 / self.total) as u8
        }
    }
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{} ({}%)", self.stage, self.processed, self.total, self.percentage())
    }
}

/// Counts the work of one stage, reporting progress and checking for
/// cancellation every `batch` items.
pub(crate) struct Tracker<'a> {
    stage: Stage,
    processed: usize,
    total: usize,
    batch: usize,
    token: &'a CancellationToken,
    sink: &'a mut dyn FnMut(Progress),
}

impl<'a> Tracker<'a> {
    pub(crate) fn new(
        stage: Stage,
        total: usize,
        batch: usize,
        token: &'a CancellationToken,
        sink: &'a mut dyn FnMut(Progress),
    ) -> Result<Self, MergeError> {
        token.check()?;
        let mut tracker = Tracker {
            stage,
            processed: 0,
            total,
            batch: batch.max(1),
            token,
            sink,
        };
        tracker.report();
        Ok(tracker)
    }

    pub(crate) fn advance(&mut self) -> Result<(), MergeError> {
        self.processed += 1;
        if self.processed % self.batch == 0 {
            self.token.check()?;
            self.report();
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<(), MergeError> {
        self.token.check()?;
        if self.processed % self.batch != 0 {
            self.report();
        }
        debug!("Finished {} stage", self.stage);
        Ok(())
    }

    fn report(&mut self) {
        (self.sink)(Progress {
            stage: self.stage,
            processed: self.processed,
            total: self.total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_percentages() {
        let progress = |processed, total| Progress { stage: Stage::Aligning, processed, total };
        assert_eq!(progress(0, 0).percentage(), 100);
        assert_eq!(progress(1, 3).percentage(), 33);
        assert_eq!(progress(5, 4).percentage(), 100);
        assert_eq!(progress(1, 4).to_string(), "aligning 1/4 (25%)");
    }

    #[test]
    fn reports_every_batch() -> Result<(), MergeError> {
        let token = CancellationToken::new();
        let mut seen = Vec::new();
        let mut sink = |progress: Progress| seen.push(progress.processed);
        let mut tracker = Tracker::new(Stage::Writing, 5, 2, &token, &mut sink)?;
        for _ in 0..5 {
            tracker.advance()?;
        }
        tracker.finish()?;
        assert_eq!(seen, vec![0, 2, 4, 5]);
        Ok(())
    }

    #[test]
    fn stops_once_cancelled() {
        let token = CancellationToken::new();
        let mut sink = |_: Progress| ();
        let mut tracker = Tracker::new(Stage::Aligning, 10, 2, &token, &mut sink).unwrap();
        tracker.advance().unwrap();
        token.cancel();
        assert!(tracker.advance().unwrap_err().is_cancelled());
        assert!(token.clone().is_cancelled());
    }
}
