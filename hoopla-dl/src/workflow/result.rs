use super::{Stage, StageOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

static NOT_ATTEMPTED: StageOutcome = StageOutcome::NotAttempted;

/// Final record of one item, persisted as `result.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub item_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: BTreeMap<Stage, StageOutcome>,
    pub success: bool,
}

impl WorkflowResult {
    pub(crate) fn new(
        item_id: String,
        started_at: DateTime<Utc>,
        mut stages: BTreeMap<Stage, StageOutcome>,
    ) -> Self {
        for stage in Stage::ALL {
            stages.entry(stage).or_insert(StageOutcome::NotAttempted);
        }

        let success = Self::evaluate(&stages);

        Self {
            item_id,
            started_at,
            finished_at: Utc::now(),
            stages,
            success,
        }
    }

    /// Manifest, download and decrypt must have run, and nothing may have failed.
    fn evaluate(stages: &BTreeMap<Stage, StageOutcome>) -> bool {
        let required = [Stage::Manifest, Stage::Download, Stage::Decrypt]
            .iter()
            .all(|x| stages.get(x).is_some_and(|x| x.is_attempted()));

        required && !stages.values().any(|x| x.is_failed())
    }

    pub fn outcome(&self, stage: Stage) -> &StageOutcome {
        self.stages.get(&stage).unwrap_or(&NOT_ATTEMPTED)
    }

    /// First stage which failed, in execution order.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|(_, x)| x.is_failed())
            .map(|(x, _)| *x)
    }

    /// Every artifact written by the workflow, in stage order.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.stages
            .values()
            .flat_map(|x| x.artifacts().iter().cloned())
            .collect()
    }
}
