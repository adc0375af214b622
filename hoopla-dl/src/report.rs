//! Batch summary with per stage counts and timings.

use crate::{
    batch::BatchReport,
    workflow::{Stage, StageOutcome},
};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Timing {
    pub count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub stdev_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Timing {
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len();
        let mean = sorted.iter().sum::<u64>() as f64 / count as f64;
        let median = if count % 2 == 0 {
            (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
        } else {
            sorted[count / 2] as f64
        };
        // Sample deviation, zero for a single run.
        let stdev = if count > 1 {
            (sorted
                .iter()
                .map(|x| (*x as f64 - mean).powi(2))
                .sum::<f64>()
                / (count - 1) as f64)
                .sqrt()
        } else {
            0.0
        };

        Some(Self {
            count,
            mean_ms: mean,
            median_ms: median,
            stdev_ms: stdev,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StageSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unavailable: usize,
    pub not_attempted: usize,
    pub timing: Option<Timing>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub items: usize,
    pub succeeded: usize,
    pub not_started: usize,
    pub stages: BTreeMap<Stage, StageSummary>,
}

impl Summary {
    pub fn new(report: &BatchReport) -> Self {
        let mut stages = BTreeMap::new();

        for stage in Stage::ALL {
            let mut summary = StageSummary::default();
            let mut samples = vec![];

            for result in &report.results {
                let outcome = result.outcome(stage);

                match outcome {
                    StageOutcome::Succeeded { .. } => summary.succeeded += 1,
                    StageOutcome::Failed { .. } => summary.failed += 1,
                    StageOutcome::Skipped { .. } => summary.skipped += 1,
                    StageOutcome::Unavailable { .. } => summary.unavailable += 1,
                    StageOutcome::NotAttempted => summary.not_attempted += 1,
                }

                samples.extend(outcome.elapsed_ms());
            }

            summary.timing = Timing::from_samples(&samples);
            stages.insert(stage, summary);
        }

        Self {
            items: report.results.len() + report.not_started.len(),
            succeeded: report.succeeded(),
            not_started: report.not_started.len(),
            stages,
        }
    }

    /// Human readable table.
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "{} of {} item(s) succeeded{}",
            self.succeeded.to_string().as_str().bold(),
            self.items,
            if self.not_started > 0 {
                format!(", {} not started", self.not_started)
            } else {
                String::new()
            }
        )];

        for (stage, x) in &self.stages {
            let timing = x
                .timing
                .as_ref()
                .map(|t| {
                    format!(
                        "mean {:.0}ms median {:.0}ms stdev {:.0}ms min {}ms max {}ms",
                        t.mean_ms, t.median_ms, t.stdev_ms, t.min_ms, t.max_ms
                    )
                })
                .unwrap_or_default();

            lines.push(format!(
                "  {:<16} ok {:<3} failed {:<3} skipped {:<3} unavailable {:<3} {}",
                stage.as_str(),
                x.succeeded,
                x.failed,
                x.skipped,
                x.unavailable,
                timing.as_str().dimmed()
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing() {
        let timing = Timing::from_samples(&[30, 10, 20, 40]).unwrap();

        assert_eq!(timing.count, 4);
        assert_eq!(timing.mean_ms, 25.0);
        assert_eq!(timing.median_ms, 25.0);
        assert_eq!((timing.min_ms, timing.max_ms), (10, 40));
        assert!((timing.stdev_ms - 12.909).abs() < 0.001);

        assert_eq!(Timing::from_samples(&[7]).unwrap().stdev_ms, 0.0);
        assert!(Timing::from_samples(&[]).is_none());
    }
}
