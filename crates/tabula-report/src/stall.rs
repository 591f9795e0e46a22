//! Stall detection
//!
//! An execution is stalled when every step reports a terminal status but
//! the overall status never does. The detector counts consecutive stalled
//! observations and gives up at a threshold.

use crate::progress::ExecutionProgress;
use serde::{Deserialize, Serialize};

/// Why a stalled execution was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallKind {
    /// At least one step errored and the executor never reported failure
    StepsErrored,
    /// All steps completed but no final report arrived
    NoReportProduced,
}

impl StallKind {
    #[must_use]
    pub fn classify(progress: &ExecutionProgress) -> Self {
        if progress.any_step_errored() {
            Self::StepsErrored
        } else {
            Self::NoReportProduced
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::StepsErrored => "One or more steps failed and the report never finished",
            Self::NoReportProduced => "All steps completed but no report was produced",
        }
    }
}

/// Result of feeding one progress snapshot to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    /// Work is still moving; the counter was reset
    Progressing,
    /// All steps terminal; `consecutive` observations so far
    Stalled { consecutive: u32 },
    /// Threshold reached
    TimedOut(StallKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallDetector {
    threshold: u32,
    consecutive: u32,
}

impl StallDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    #[inline]
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    /// Record one non-terminal progress snapshot
    pub fn observe(&mut self, progress: &ExecutionProgress) -> StallVerdict {
        if progress.status.is_terminal() || !progress.all_steps_terminal() {
            self.reset();
            return StallVerdict::Progressing;
        }

        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            StallVerdict::TimedOut(StallKind::classify(progress))
        } else {
            StallVerdict::Stalled {
                consecutive: self.consecutive,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ExecutionStatus, StepProgress, StepStatus};
    use tabula_core::ReportId;

    fn progress(steps: &[StepStatus]) -> ExecutionProgress {
        let mut progress = ExecutionProgress::starting(ReportId::new("r1"));
        progress.status = ExecutionStatus::InProgress;
        progress.steps = (1u32..)
            .zip(steps)
            .map(|(n, status)| StepProgress::new(n, *status))
            .collect();
        progress
    }

    #[test]
    fn counts_up_to_threshold() {
        let mut detector = StallDetector::new(3);
        let stuck = progress(&[StepStatus::Completed, StepStatus::Completed]);

        assert_eq!(detector.observe(&stuck), StallVerdict::Stalled { consecutive: 1 });
        assert_eq!(detector.observe(&stuck), StallVerdict::Stalled { consecutive: 2 });
        assert_eq!(
            detector.observe(&stuck),
            StallVerdict::TimedOut(StallKind::NoReportProduced)
        );
    }

    #[test]
    fn movement_resets_counter() {
        let mut detector = StallDetector::new(24);
        detector.observe(&progress(&[StepStatus::Completed]));
        detector.observe(&progress(&[StepStatus::Completed]));
        assert_eq!(detector.consecutive(), 2);

        let verdict = detector.observe(&progress(&[StepStatus::Completed, StepStatus::Started]));
        assert_eq!(verdict, StallVerdict::Progressing);
        assert_eq!(detector.consecutive(), 0);
    }

    #[test]
    fn empty_steps_never_stall() {
        let mut detector = StallDetector::new(1);
        assert_eq!(detector.observe(&progress(&[])), StallVerdict::Progressing);
    }

    #[test]
    fn errored_steps_classified() {
        let mut detector = StallDetector::new(1);
        assert_eq!(
            detector.observe(&progress(&[StepStatus::Completed, StepStatus::Error])),
            StallVerdict::TimedOut(StallKind::StepsErrored)
        );
    }

    #[test]
    fn zero_threshold_clamped() {
        assert_eq!(StallDetector::new(0).threshold(), 1);
    }
}
