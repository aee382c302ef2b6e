use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use colored::Colorize;

use crate::namer::types::{Outcome, SkipReason};

/// Run counters shared between the worker and the front end.
///
/// Only the worker writes, the front end polls [`SharedStats::snapshot`].
#[derive(Debug, Default)]
pub struct SharedStats {
    total: AtomicUsize,
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    skip_no_number: AtomicUsize,
    skip_no_set_dir: AtomicUsize,
    skip_empty_set: AtomicUsize,
    skip_no_quality_tag: AtomicUsize,
    skip_cancelled: AtomicUsize,
    transfer_errors: AtomicUsize,
    missing_after_ok: AtomicUsize,
    done: AtomicBool,
}

/// Point-in-time copy of [`SharedStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub skip_no_number: usize,
    pub skip_no_set_dir: usize,
    pub skip_empty_set: usize,
    pub skip_no_quality_tag: usize,
    pub skip_cancelled: usize,
    pub transfer_errors: usize,
    pub missing_after_ok: usize,
    pub done: bool,
}

impl SharedStats {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total: AtomicUsize::new(total),
            ..Self::default()
        }
    }

    /// Count one finished record.
    pub fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Transferred { .. } => &self.succeeded,
            Outcome::Skipped(reason) => match reason {
                SkipReason::NoNumber => &self.skip_no_number,
                SkipReason::NoSetDir => &self.skip_no_set_dir,
                SkipReason::EmptySet { .. } => &self.skip_empty_set,
                SkipReason::NoQualityTag => &self.skip_no_quality_tag,
                SkipReason::Cancelled => &self.skip_cancelled,
            },
            Outcome::Failed { .. } => &self.transfer_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Release);
    }

    pub fn set_missing_after_ok(&self, count: usize) {
        self.missing_after_ok.store(count, Ordering::Relaxed);
    }

    /// Flip the done flag. Calling it again has no effect.
    pub fn mark_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> RunStats {
        let done = self.is_done();
        RunStats {
            total: self.total(),
            processed: self.processed(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skip_no_number: self.skip_no_number.load(Ordering::Relaxed),
            skip_no_set_dir: self.skip_no_set_dir.load(Ordering::Relaxed),
            skip_empty_set: self.skip_empty_set.load(Ordering::Relaxed),
            skip_no_quality_tag: self.skip_no_quality_tag.load(Ordering::Relaxed),
            skip_cancelled: self.skip_cancelled.load(Ordering::Relaxed),
            transfer_errors: self.transfer_errors.load(Ordering::Relaxed),
            missing_after_ok: self.missing_after_ok.load(Ordering::Relaxed),
            done,
        }
    }
}

impl RunStats {
    /// Records skipped for any reason. Transfer errors are not included.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skip_no_number + self.skip_no_set_dir + self.skip_empty_set + self.skip_no_quality_tag + self.skip_cancelled
    }

    pub fn print_summary(&self, elapsed: Duration, manifest: Option<&Path>) {
        println!("{}", "\n--- Namer Summary ---".bold().magenta());
        println!("Succeeded:              {}/{}", self.succeeded.to_string().green(), self.total);
        println!("Skipped:                {}", self.skipped());
        if self.skipped() > 0 {
            println!("  - No number:          {}", self.skip_no_number);
            println!("  - No set folder:      {}", self.skip_no_set_dir);
            println!("  - Empty set folder:   {}", self.skip_empty_set);
            println!("  - No quality tag:     {}", self.skip_no_quality_tag);
            if self.skip_cancelled > 0 {
                println!("  - Cancelled:          {}", self.skip_cancelled);
            }
        }
        println!(
            "Transfer errors:        {}",
            if self.transfer_errors > 0 {
                self.transfer_errors.to_string().red()
            } else {
                "0".normal()
            }
        );
        if self.missing_after_ok > 0 {
            println!("Missing after OK:       {}", self.missing_after_ok.to_string().red());
        }
        match manifest {
            Some(path) => println!("Manifest:               {}", path.display()),
            None => println!("Manifest:               {}", "not written".yellow()),
        }
        println!("Total time:             {}", crate::format_duration(elapsed));
    }
}

#[cfg(test)]
mod stats_tests {
    use super::*;

    use std::path::PathBuf;

    use crate::namer::types::TransferAction;

    #[test]
    fn record_counts_each_outcome_once() {
        let stats = SharedStats::new(5);
        stats.record(&Outcome::Transferred {
            destination: PathBuf::from("a"),
            action: TransferAction::Moved,
        });
        stats.record(&Outcome::Skipped(SkipReason::NoNumber));
        stats.record(&Outcome::Skipped(SkipReason::EmptySet { samples: Vec::new() }));
        stats.record(&Outcome::Skipped(SkipReason::Cancelled));
        stats.record(&Outcome::Failed {
            destination: PathBuf::from("b"),
            error: "boom".to_string(),
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.processed, 5);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.skip_no_number, 1);
        assert_eq!(snapshot.skip_empty_set, 1);
        assert_eq!(snapshot.skip_cancelled, 1);
        assert_eq!(snapshot.transfer_errors, 1);
        assert_eq!(snapshot.skipped(), 3);
        assert!(!snapshot.done);
    }

    #[test]
    fn done_flag_flips_once() {
        let stats = SharedStats::new(0);
        assert!(!stats.is_done());
        stats.mark_done();
        stats.mark_done();
        assert!(stats.is_done());
        assert!(stats.snapshot().done);
    }
}
