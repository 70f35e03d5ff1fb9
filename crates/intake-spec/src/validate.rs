use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::answers::AnswerMap;
use crate::schema::ValidationRuleSet;
use crate::visibility::{ActiveNode, active_nodes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    Required,
    TypeMismatch,
    InvalidOption,
    Inactive,
}

/// Per-field problem surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub question_id: String,
    pub code: IssueCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_required: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_fields: Vec<String>,
}

impl ValidationReport {
    pub fn issue_count(&self) -> usize {
        self.errors.len() + self.missing_required.len() + self.unknown_fields.len()
    }

    pub fn into_result(self) -> Result<(), ValidationFailed> {
        if self.valid { Ok(()) } else { Err(ValidationFailed(self)) }
    }
}

/// Submission blocked until every listed field is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed with {} issue(s)", .0.issue_count())]
pub struct ValidationFailed(pub ValidationReport);

/// Validates the active part of the answers. Answers of inactive nodes are ignored.
pub fn validate(rules: &ValidationRuleSet, answers: &AnswerMap) -> ValidationReport {
    let active = active_nodes(rules.tree(), answers);
    report_for(rules, answers, &active)
}

fn report_for(
    rules: &ValidationRuleSet,
    answers: &AnswerMap,
    active: &[ActiveNode<'_>],
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for node in active {
        let Some(rule) = rules.rule(node.id()) else {
            continue;
        };
        match answers.get(node.id()) {
            None => {
                if rule.required {
                    missing_required.push(rule.question_id.clone());
                }
            }
            Some(value) => {
                if let Some(issue) = rule.check_value(value) {
                    errors.push(issue);
                }
            }
        }
    }

    let unknown_fields: Vec<String> = answers
        .ids()
        .filter(|id| !rules.tree().contains(id))
        .map(str::to_string)
        .collect();

    ValidationReport {
        valid: errors.is_empty() && missing_required.is_empty() && unknown_fields.is_empty(),
        errors,
        missing_required,
        unknown_fields,
    }
}

/// Result of re-evaluating a questionnaire after an edit.
#[derive(Debug, Clone)]
pub struct Recompute<'a> {
    pub active: Vec<ActiveNode<'a>>,
    pub report: ValidationReport,
}

impl Recompute<'_> {
    pub fn active_ids(&self) -> Vec<&str> {
        self.active.iter().map(|node| node.id()).collect()
    }
}

/// Synchronous recomputation invoked by the caller after every `set_answer`.
pub fn recompute<'a>(rules: &'a ValidationRuleSet, answers: &AnswerMap) -> Recompute<'a> {
    let active = active_nodes(rules.tree(), answers);
    let report = report_for(rules, answers, &active);
    Recompute { active, report }
}
