//! Compiles a question tree into per-node validation rules.
//!
//! Type rules are static. Required-ness is a predicate over the live answers: a node
//! under a branch is only required while every branch on its path is active.

use serde_json::{Map, Value, json};

use crate::answers::{AnswerMap, AnswerValue};
use crate::spec::question::{QuestionKind, QuestionNode};
use crate::tree::{QuestionTree, SpecError};
use crate::validate::{IssueCode, ValidationIssue};
use crate::visibility::{active_nodes, is_active};

/// Condition under which a rule's required-ness applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Always,
    WhenBranch { parent: String, trigger: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub question_id: String,
    pub kind: QuestionKind,
    /// Allowed tokens for choice kinds, in declaration order.
    pub allowed: Vec<String>,
    pub required: bool,
    pub activation: Activation,
}

impl Rule {
    /// Checks a present value against the node's type contract.
    pub fn check_value(&self, value: &AnswerValue) -> Option<ValidationIssue> {
        let well_typed = match (self.kind, value) {
            (QuestionKind::Text, AnswerValue::Text(text))
            | (QuestionKind::LongText, AnswerValue::LongText(text)) => {
                if text.trim().is_empty() {
                    return Some(self.issue(IssueCode::Required, "answer is empty"));
                }
                true
            }
            (QuestionKind::Number, AnswerValue::Number(number)) => number.is_finite(),
            (QuestionKind::SingleChoice, AnswerValue::Single(token)) => {
                if !self.allows(token) {
                    return Some(self.invalid_option(token));
                }
                true
            }
            (QuestionKind::MultiChoice, AnswerValue::Multi(tokens)) => {
                if let Some(token) = tokens.iter().find(|token| !self.allows(token)) {
                    return Some(self.invalid_option(token));
                }
                true
            }
            _ => false,
        };

        if well_typed {
            None
        } else {
            Some(self.issue(IssueCode::TypeMismatch, "type mismatch"))
        }
    }

    fn allows(&self, token: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == token)
    }

    fn invalid_option(&self, token: &str) -> ValidationIssue {
        self.issue(
            IssueCode::InvalidOption,
            &format!("'{}' is not a valid option", token),
        )
    }

    fn issue(&self, code: IssueCode, message: &str) -> ValidationIssue {
        ValidationIssue {
            question_id: self.question_id.clone(),
            code,
            message: message.to_string(),
        }
    }

    fn json_schema(&self, title: &str) -> Value {
        let allowed: Vec<Value> = self.allowed.iter().cloned().map(Value::String).collect();
        match self.kind {
            QuestionKind::Text | QuestionKind::LongText => {
                json!({ "type": "string", "title": title, "minLength": 1 })
            }
            QuestionKind::Number => json!({ "type": "number", "title": title }),
            QuestionKind::SingleChoice => {
                json!({ "type": "string", "title": title, "enum": allowed })
            }
            QuestionKind::MultiChoice => json!({
                "type": "array",
                "title": title,
                "items": { "type": "string", "enum": allowed },
                "uniqueItems": true,
            }),
        }
    }
}

/// Compiled form of a question tree: the arena plus one rule per node.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRuleSet {
    tree: QuestionTree,
    // arena order, aligned with NodeIndex
    rules: Vec<Rule>,
}

pub fn compile(questions: &[QuestionNode]) -> Result<ValidationRuleSet, SpecError> {
    let tree = QuestionTree::build(questions)?;
    let mut rules = Vec::with_capacity(tree.len());
    for idx in tree.indices() {
        let node = tree.node(idx);
        let activation = match &node.parent {
            None => Activation::Always,
            Some(edge) => Activation::WhenBranch {
                parent: tree.node(edge.parent).id.clone(),
                trigger: edge.trigger.clone(),
            },
        };
        rules.push(Rule {
            question_id: node.id.clone(),
            kind: node.kind,
            allowed: node.option_values().map(str::to_string).collect(),
            required: node.required,
            activation,
        });
    }
    Ok(ValidationRuleSet { tree, rules })
}

impl ValidationRuleSet {
    pub fn tree(&self) -> &QuestionTree {
        &self.tree
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.tree.index_of(id).map(|idx| &self.rules[idx.get()])
    }

    /// Rules in pre-order of the tree.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.tree
            .preorder()
            .into_iter()
            .map(move |idx| &self.rules[idx.get()])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Required-ness predicate evaluated against the live answers.
    pub fn is_required(&self, id: &str, answers: &AnswerMap) -> bool {
        match self.tree.index_of(id) {
            Some(idx) => self.rules[idx.get()].required && is_active(&self.tree, answers, idx),
            None => false,
        }
    }

    /// JSON Schema of the answers accepted in the current state.
    pub fn to_json_schema(&self, answers: &AnswerMap) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for active in active_nodes(&self.tree, answers) {
            let rule = &self.rules[active.index.get()];
            properties.insert(
                rule.question_id.clone(),
                rule.json_schema(&active.node.text),
            );
            if rule.required {
                required.push(Value::String(rule.question_id.clone()));
            }
        }
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
