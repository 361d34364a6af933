//! Report model for one verification run.
//!
//! A run walks the fixed sequence in [`Phase::all`]. Every phase produces
//! exactly one `PhaseReport`, whether it passed, failed or was skipped, so
//! the report always has one entry per phase in that order.

use crate::spec::DeploymentSpec;
use crate::types::{ResourceProbeResult, WorkflowRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    IdentityCheck,
    StorageCheck,
    ArtifactCheck,
    RegistryCheck,
    WorkflowTokenAcquire,
    WorkflowCommandExec,
    WorkflowOutputExtract,
    WorkflowFilter,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::IdentityCheck,
            Phase::StorageCheck,
            Phase::ArtifactCheck,
            Phase::RegistryCheck,
            Phase::WorkflowTokenAcquire,
            Phase::WorkflowCommandExec,
            Phase::WorkflowOutputExtract,
            Phase::WorkflowFilter,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::IdentityCheck => "identity_check",
            Phase::StorageCheck => "storage_check",
            Phase::ArtifactCheck => "artifact_check",
            Phase::RegistryCheck => "registry_check",
            Phase::WorkflowTokenAcquire => "workflow_token_acquire",
            Phase::WorkflowCommandExec => "workflow_command_exec",
            Phase::WorkflowOutputExtract => "workflow_output_extract",
            Phase::WorkflowFilter => "workflow_filter",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PhaseOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Passed {
        summary: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        results: Vec<ResourceProbeResult>,
        /// One line per observed item (object, version, image, DAG).
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        details: Vec<String>,
    },
    Failed {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

impl PhaseOutcome {
    pub fn passed(summary: impl Into<String>) -> Self {
        Self::Passed {
            summary: summary.into(),
            results: Vec::new(),
            details: Vec::new(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Passed { .. } => "passed",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }

    /// Summary, error or skip reason, whichever applies.
    pub fn message(&self) -> &str {
        match self {
            Self::Passed { summary, .. } => summary,
            Self::Failed { error } => error,
            Self::Skipped { reason } => reason,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

// ---------------------------------------------------------------------------
// PhaseReport / VerificationReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Identifier of the resource the phase looked at.
    pub resource: String,
    #[serde(flatten)]
    pub outcome: PhaseOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub project: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseReport>,
    pub matching_dags: Vec<WorkflowRecord>,
}

impl VerificationReport {
    pub fn begin(spec: &DeploymentSpec) -> Self {
        Self {
            project: spec.metadata.project.clone(),
            environment: spec.metadata.environment.clone(),
            started_at: Utc::now(),
            finished_at: None,
            phases: Vec::new(),
            matching_dags: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn has_failures(&self) -> bool {
        self.phases.iter().any(|p| p.outcome.is_failed())
    }

    pub fn passed(&self) -> usize {
        self.phases.iter().filter(|p| p.outcome.is_passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.phases.iter().filter(|p| p.outcome.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.phases.iter().filter(|p| p.outcome.is_skipped()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_fixed() {
        let names: Vec<_> = Phase::all().iter().map(|p| p.as_str()).collect();
        assert_eq!(names.first(), Some(&"identity_check"));
        assert_eq!(names.last(), Some(&"workflow_filter"));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn phase_report_serializes_flat_status() {
        let report = PhaseReport {
            phase: Phase::StorageCheck,
            resource: "bucket/raw".to_string(),
            outcome: PhaseOutcome::Failed {
                error: "invalid argument: empty storage container name".to_string(),
            },
            duration_ms: 3,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "storage_check");
        assert_eq!(json["status"], "failed");
        assert!(json["error"].as_str().unwrap().contains("empty"));
    }

    #[test]
    fn counts_and_failure_flag() {
        let mut report = VerificationReport::begin(&DeploymentSpec::default());
        for (phase, outcome) in [
            (Phase::IdentityCheck, PhaseOutcome::passed("ok")),
            (
                Phase::StorageCheck,
                PhaseOutcome::Failed {
                    error: "boom".to_string(),
                },
            ),
            (
                Phase::ArtifactCheck,
                PhaseOutcome::Skipped {
                    reason: "n/a".to_string(),
                },
            ),
        ] {
            report.phases.push(PhaseReport {
                phase,
                resource: String::new(),
                outcome,
                duration_ms: 0,
            });
        }
        assert!(report.has_failures());
        assert_eq!((report.passed(), report.failed(), report.skipped()), (1, 1, 1));
        assert_eq!(
            report.phase(Phase::StorageCheck).unwrap().outcome.message(),
            "boom"
        );
        assert!(report.phase(Phase::WorkflowFilter).is_none());
    }
}
