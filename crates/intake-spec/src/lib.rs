#![allow(missing_docs)]

pub mod answers;
pub mod catalog;
pub mod consent;
pub mod flatten;
pub mod record;
pub mod schema;
pub mod session;
pub mod spec;
pub mod tree;
pub mod validate;
pub mod visibility;

pub use answers::{AnswerError, AnswerMap, AnswerValue};
pub use catalog::{Catalog, CompiledQuestionnaire, TOMOGRAFIA_DEFINITION, builtin_tomografia};
pub use consent::{Consent, ConsentError};
pub use flatten::{
    AnswerLabels, ResponseAnswer, ResponseEntry, ResponseList, UNANSWERED_LABEL, flatten,
};
pub use record::{
    DocumentRecord, DocumentRecordDraft, RecordHeader, RecordId, Technician, Technicians,
};
pub use schema::{Activation, Rule, ValidationRuleSet, compile};
pub use session::{DraftError, IntakeSession};
pub use spec::{Branch, DependsOn, QuestionKind, QuestionNode, QuestionOption, Questionnaire};
pub use tree::{NodeIndex, QuestionTree, SpecError, TreeNode};
pub use validate::{
    IssueCode, Recompute, ValidationFailed, ValidationIssue, ValidationReport, recompute,
    validate,
};
pub use visibility::{ActiveNode, BranchStep, VisibilityMap, active_nodes, resolve_visibility};
