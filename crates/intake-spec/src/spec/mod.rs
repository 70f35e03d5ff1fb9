pub mod question;
pub mod questionnaire;

pub use question::{Branch, DependsOn, QuestionKind, QuestionNode, QuestionOption};
pub use questionnaire::Questionnaire;
