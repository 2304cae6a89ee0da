//! Injectability validation.
//!
//! Decides whether an artifact may be handed to the work pool. Pure: reads
//! the artifact, its content summary and the dangling edges the index found,
//! and returns the list of issues. An empty list means injectable.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Artifact;
use crate::store::ContentSummary;

use super::graph::DanglingEdge;

/// Machine-readable issue codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    /// Status demands a plan but the plan is empty
    EmptyPlanForActiveStatus,

    /// Status is terminal (superseded, historical, ...)
    TerminalStatusNotInjectable,

    /// A `created_after` entry does not resolve
    BrokenCausalLink,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmptyPlanForActiveStatus => "EmptyPlanForActiveStatus",
            Self::TerminalStatusNotInjectable => "TerminalStatusNotInjectable",
            Self::BrokenCausalLink => "BrokenCausalLink",
        };
        f.write_str(s)
    }
}

/// One reason an artifact cannot be injected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Validate an artifact for injection.
///
/// Status rules come first, then one `BrokenCausalLink` per missing parent
/// in id order. Only edges whose child is this artifact are considered.
pub fn validate_injectable(
    artifact: &Artifact,
    content: &ContentSummary,
    dangling: &[DanglingEdge],
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if artifact.status.is_terminal() {
        issues.push(ValidationIssue {
            code: IssueCode::TerminalStatusNotInjectable,
            message: format!(
                "{} '{}' has terminal status {}; terminal artifacts cannot be injected",
                artifact.kind, artifact.id, artifact.status
            ),
        });
    } else if artifact.status.requires_plan() && !content.has_substantive_plan {
        issues.push(ValidationIssue {
            code: IssueCode::EmptyPlanForActiveStatus,
            message: format!(
                "{} '{}' is {} but its plan is empty; write a plan, or revert the status to {}",
                artifact.kind,
                artifact.id,
                artifact.status,
                planning_status_hint(artifact)
            ),
        });
    }

    let mut missing: Vec<&str> = dangling
        .iter()
        .filter(|edge| edge.child == artifact.id)
        .map(|edge| edge.missing_parent.as_str())
        .collect();
    missing.sort_unstable();
    missing.dedup();

    for parent in missing {
        issues.push(ValidationIssue {
            code: IssueCode::BrokenCausalLink,
            message: format!(
                "'{}' lists '{}' in created_after, but no such {} exists locally or in any remote",
                artifact.id, parent, artifact.kind
            ),
        });
    }

    issues
}

/// The pre-planning status to suggest when a plan is missing
fn planning_status_hint(artifact: &Artifact) -> &'static str {
    use crate::domain::ArtifactKind;

    match artifact.kind {
        ArtifactKind::Chunk => "FUTURE",
        ArtifactKind::Narrative => "DRAFTING",
        ArtifactKind::Investigation => "DEFERRED",
        ArtifactKind::Subsystem => "DOCUMENTED",
    }
}
