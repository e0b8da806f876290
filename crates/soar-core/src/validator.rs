// crates/soar-core/src/validator.rs
// ============================================================================
// Module: Playbook Validator
// Description: Structural validation of a playbook DSL before it may activate.
// Purpose: Enforce the rule table in §4.2 with one helper per rule.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Validation runs a fixed sequence of `ensure_*` checks over a
//! [`PlaybookDsl`](crate::model::PlaybookDsl), each producing zero or more
//! [`ValidationIssue`]s. Checks do not short-circuit each other: a playbook
//! with three independent problems reports all three in one pass, matching
//! how playbook authors iterate on a draft.

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::StepId;
use crate::model::PlaybookDsl;
use crate::model::StepKind;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    /// The playbook may not be activated until this is fixed.
    Error,
    /// The playbook may still activate; worth a second look.
    Warning,
}

/// One validation finding against a playbook draft (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable machine-readable rule code.
    pub code: &'static str,
    /// Whether this blocks activation.
    pub severity: ValidationSeverity,
    /// Human-readable explanation.
    pub message: String,
    /// Suggested fix, when one is obvious.
    pub remediation: Option<String>,
}

impl ValidationIssue {
    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, severity: ValidationSeverity::Error, message: message.into(), remediation: None }
    }

    fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

/// Runs every validation rule against `dsl` and returns all findings.
///
/// An empty return value means the playbook may be activated.
#[must_use]
pub fn validate_playbook(dsl: &PlaybookDsl) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    ensure_has_steps(dsl, &mut issues);
    if issues.iter().any(|issue| issue.code == "NO_STEPS") {
        return issues;
    }
    ensure_start_step_exists(dsl, &mut issues);
    ensure_branches_resolve(dsl, &mut issues);
    ensure_conditions_have_branches(dsl, &mut issues);
    ensure_approvals_have_timeout(dsl, &mut issues);
    ensure_connector_actions_well_formed(dsl, &mut issues);
    ensure_enrichment_to_action_has_condition(dsl, &mut issues);
    issues
}

fn ensure_has_steps(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    if dsl.steps.is_empty() {
        issues.push(
            ValidationIssue::error("NO_STEPS", "playbook has no steps")
                .with_remediation("add at least one step and set start_step"),
        );
    }
}

fn ensure_start_step_exists(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    if !dsl.steps.contains_key(&dsl.start_step) {
        issues.push(ValidationIssue::error(
            "UNRESOLVED_BRANCH",
            format!("start_step {} does not reference an existing step", dsl.start_step),
        ));
    }
}

fn branch_targets(kind: &StepKind) -> Vec<Option<&StepId>> {
    match kind {
        StepKind::Notification { on_success, .. } => vec![on_success.as_ref()],
        StepKind::Condition { on_true, on_false, .. } => vec![on_true.as_ref(), on_false.as_ref()],
        StepKind::Approval { on_approved, on_rejected, on_timeout, .. } => {
            vec![on_approved.as_ref(), on_rejected.as_ref(), on_timeout.as_ref()]
        }
        StepKind::Enrichment { on_success, on_failure, .. } | StepKind::Action { on_success, on_failure, .. } => {
            vec![on_success.as_ref(), on_failure.as_ref()]
        }
    }
}

fn ensure_branches_resolve(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    for step in dsl.steps.values() {
        for target in branch_targets(&step.kind).into_iter().flatten() {
            if !dsl.steps.contains_key(target) {
                issues.push(ValidationIssue::error(
                    "UNRESOLVED_BRANCH",
                    format!("step {} branches to non-existent step {target}", step.step_id),
                ));
            }
        }
    }
    let mut seen = std::collections::BTreeSet::new();
    for step_id in dsl.steps.keys() {
        if !seen.insert(step_id) {
            issues.push(ValidationIssue::error("DUP_STEP_ID", format!("duplicate step id {step_id}")));
        }
    }
}

fn ensure_conditions_have_branches(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    for step in dsl.steps.values() {
        if let StepKind::Condition { on_true, on_false, .. } = &step.kind {
            if on_true.is_none() && on_false.is_none() {
                issues.push(ValidationIssue::error(
                    "CONDITION_NO_BRANCH",
                    format!("condition step {} declares neither on_true nor on_false", step.step_id),
                ));
            }
        }
    }
}

fn ensure_approvals_have_timeout(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    for step in dsl.steps.values() {
        if let StepKind::Approval { timeout_seconds, on_timeout, .. } = &step.kind {
            if *timeout_seconds == 0 || on_timeout.is_none() {
                issues.push(ValidationIssue::error(
                    "APPROVAL_NO_TIMEOUT",
                    format!("approval step {} must declare a positive timeout and an on_timeout branch", step.step_id),
                ));
            }
        }
    }
}

fn ensure_connector_actions_well_formed(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    for step in dsl.steps.values() {
        let connector_and_action = match &step.kind {
            StepKind::Action { connector, action_type, .. } | StepKind::Enrichment { connector, action_type, .. } => {
                Some((connector, action_type))
            }
            _ => None,
        };
        let Some((connector, action_type)) = connector_and_action else {
            continue;
        };
        if connector.as_str().is_empty() {
            issues.push(ValidationIssue::error(
                "CONNECTOR_MISSING_ID",
                format!("step {} does not reference a connector", step.step_id),
            ));
        }
        if action_type.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "CONNECTOR_MISSING_ACTION_TYPE",
                format!("step {} does not declare an action_type", step.step_id),
            ));
        }
    }
}

fn ensure_enrichment_to_action_has_condition(dsl: &PlaybookDsl, issues: &mut Vec<ValidationIssue>) {
    for step in dsl.steps.values() {
        if let StepKind::Enrichment { on_success: Some(next), .. } = &step.kind {
            if let Some(next_step) = dsl.steps.get(next) {
                if matches!(next_step.kind, StepKind::Action { .. }) {
                    issues.push(
                        ValidationIssue {
                            code: "ENRICHMENT_TO_ACTION_NO_CONDITION",
                            severity: ValidationSeverity::Warning,
                            message: format!(
                                "enrichment step {} flows directly into action step {} with no intervening condition",
                                step.step_id, next_step.step_id
                            ),
                            remediation: None,
                        }
                        .with_remediation("insert a condition step to gate the action on the enriched data"),
                    );
                }
            }
        }
    }
}

/// Normalizes the accepted-synonym spelling of a rejection branch label.
///
/// Resolves Open Question 3: `"fail"` is canonical; `"stop"` is accepted as
/// a synonym and normalized to `"fail"` at validation and resume time.
#[must_use]
pub fn normalize_rejection_label(label: &str) -> &str {
    if label == "stop" { "fail" } else { label }
}

/// Validates a caller-supplied playbook identifier against `PB-[A-Z0-9_-]+`
/// (§6): a literal `PB-` prefix followed by one or more uppercase
/// alphanumerics, underscores, or hyphens.
#[must_use]
pub fn validate_playbook_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("PB-") else {
        return false;
    };
    !rest.is_empty() && rest.bytes().all(|byte| byte.is_ascii_uppercase() || byte.is_ascii_digit() || byte == b'_' || byte == b'-')
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::Step;

    fn dsl_with(steps: Vec<Step>, start: &str) -> PlaybookDsl {
        PlaybookDsl {
            start_step: StepId::new(start),
            steps: steps.into_iter().map(|step| (step.step_id.clone(), step)).collect::<BTreeMap<_, _>>(),
            shadow_mode: false,
        }
    }

    #[test]
    fn empty_playbook_reports_no_steps() {
        let dsl = dsl_with(vec![], "start");
        let issues = validate_playbook(&dsl);
        assert!(issues.iter().any(|issue| issue.code == "NO_STEPS"));
    }

    #[test]
    fn condition_without_branches_is_flagged() {
        let dsl = dsl_with(
            vec![Step {
                step_id: StepId::new("c1"),
                kind: StepKind::Condition {
                    trigger: crate::model::Trigger {
                        trigger_id: crate::identifiers::TriggerId::new("T-1"),
                        webhook_id: crate::identifiers::WebhookId::new("WH-1"),
                        playbook_id: crate::identifiers::PlaybookId::new("PB-1"),
                        match_mode: soar_logic::MatchMode::All,
                        conditions: vec![],
                        enabled: true,
                    },
                    on_true: None,
                    on_false: None,
                },
            }],
            "c1",
        );
        let issues = validate_playbook(&dsl);
        assert!(issues.iter().any(|issue| issue.code == "CONDITION_NO_BRANCH"));
    }

    #[test]
    fn approval_requires_timeout_and_branch() {
        let dsl = dsl_with(
            vec![Step {
                step_id: StepId::new("a1"),
                kind: StepKind::Approval { timeout_seconds: 0, on_approved: None, on_rejected: None, on_timeout: None },
            }],
            "a1",
        );
        let issues = validate_playbook(&dsl);
        assert!(issues.iter().any(|issue| issue.code == "APPROVAL_NO_TIMEOUT"));
    }

    #[test]
    fn rejection_synonym_normalizes_to_fail() {
        assert_eq!(normalize_rejection_label("stop"), "fail");
        assert_eq!(normalize_rejection_label("fail"), "fail");
    }

    #[test]
    fn playbook_id_requires_the_pb_prefix_and_allowed_charset() {
        assert!(validate_playbook_id("PB-ALPHA_1"));
        assert!(!validate_playbook_id("PB-"));
        assert!(!validate_playbook_id("pb-alpha"));
        assert!(!validate_playbook_id("ALPHA"));
        assert!(!validate_playbook_id("PB-alpha"));
    }
}
