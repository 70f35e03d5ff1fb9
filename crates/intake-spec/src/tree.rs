//! Arena representation of a question tree.
//!
//! Definitions arrive either nested (`conditional_questions`) or flat (`depends_on`).
//! Both shapes are normalized into one arena keyed by node id, with explicit
//! parent-branch edges, so id uniqueness and reachability can be checked once at
//! compile time and visibility can be re-evaluated without cloning definitions.

use std::collections::HashMap;

use thiserror::Error;

use crate::spec::question::{QuestionKind, QuestionNode, QuestionOption};

/// Configuration errors in a question definition. Never user-recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("question id '{0}' is declared more than once")]
    DuplicateNodeId(String),
    #[error("question '{id}' depends on unknown question '{reference}'")]
    DanglingReference { id: String, reference: String },
    #[error("question '{id}' declares more than one branch for trigger '{trigger}'")]
    DuplicateTrigger { id: String, trigger: String },
    #[error("question '{0}' is not reachable from any top-level question")]
    CyclicDependency(String),
    #[error("nested question '{0}' cannot also declare depends_on")]
    NestedDependency(String),
    #[error("choice question '{0}' declares no options")]
    MissingOptions(String),
    #[error("question '{id}' declares option value '{value}' more than once")]
    DuplicateOptionValue { id: String, value: String },
    #[error("questionnaire '{0}' is declared more than once")]
    DuplicateQuestionnaire(String),
}

/// Position of a node inside its [`QuestionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Edge from a child node back to the branch that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchEdge {
    pub parent: NodeIndex,
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBranch {
    pub trigger: String,
    pub children: Vec<NodeIndex>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    pub required: bool,
    pub options: Vec<QuestionOption>,
    pub parent: Option<BranchEdge>,
    pub branches: Vec<TreeBranch>,
}

impl TreeNode {
    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }

    pub fn option_values(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|option| option.value.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionTree {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeIndex>,
    index: HashMap<String, NodeIndex>,
}

struct PendingLink {
    child: NodeIndex,
    parent_id: String,
    trigger: String,
}

impl QuestionTree {
    pub fn build(questions: &[QuestionNode]) -> Result<Self, SpecError> {
        let mut tree = QuestionTree::default();
        let mut pending = Vec::new();

        for question in questions {
            let idx = tree.insert(question, None)?;
            match &question.depends_on {
                Some(link) => pending.push(PendingLink {
                    child: idx,
                    parent_id: link.question_id.clone(),
                    trigger: link.value.clone(),
                }),
                None => tree.roots.push(idx),
            }
        }

        for link in pending {
            let parent = tree.index_of(&link.parent_id).ok_or_else(|| {
                SpecError::DanglingReference {
                    id: tree.nodes[link.child.0].id.clone(),
                    reference: link.parent_id.clone(),
                }
            })?;
            tree.attach(parent, &link.trigger, link.child);
        }

        tree.warn_undeclared_triggers();
        tree.ensure_reachable()?;
        Ok(tree)
    }

    fn insert(
        &mut self,
        question: &QuestionNode,
        parent: Option<BranchEdge>,
    ) -> Result<NodeIndex, SpecError> {
        if self.index.contains_key(&question.id) {
            return Err(SpecError::DuplicateNodeId(question.id.clone()));
        }
        if parent.is_some() && question.depends_on.is_some() {
            return Err(SpecError::NestedDependency(question.id.clone()));
        }

        let options = if question.kind.is_choice() {
            if question.options.is_empty() {
                return Err(SpecError::MissingOptions(question.id.clone()));
            }
            for (pos, option) in question.options.iter().enumerate() {
                if question.options[..pos]
                    .iter()
                    .any(|earlier| earlier.value == option.value)
                {
                    return Err(SpecError::DuplicateOptionValue {
                        id: question.id.clone(),
                        value: option.value.clone(),
                    });
                }
            }
            question.options.clone()
        } else {
            Vec::new()
        };

        let idx = NodeIndex(self.nodes.len());
        self.nodes.push(TreeNode {
            id: question.id.clone(),
            text: question.text.clone(),
            kind: question.kind,
            required: question.required,
            options,
            parent,
            branches: Vec::new(),
        });
        self.index.insert(question.id.clone(), idx);

        for (pos, branch) in question.conditional_questions.iter().enumerate() {
            if question.conditional_questions[..pos]
                .iter()
                .any(|earlier| earlier.value == branch.value)
            {
                return Err(SpecError::DuplicateTrigger {
                    id: question.id.clone(),
                    trigger: branch.value.clone(),
                });
            }
            let mut children = Vec::with_capacity(branch.questions.len());
            for child in &branch.questions {
                let edge = BranchEdge {
                    parent: idx,
                    trigger: branch.value.clone(),
                };
                children.push(self.insert(child, Some(edge))?);
            }
            self.nodes[idx.0].branches.push(TreeBranch {
                trigger: branch.value.clone(),
                children,
            });
        }

        Ok(idx)
    }

    fn attach(&mut self, parent: NodeIndex, trigger: &str, child: NodeIndex) {
        let branches = &mut self.nodes[parent.0].branches;
        match branches.iter_mut().find(|branch| branch.trigger == trigger) {
            Some(branch) => branch.children.push(child),
            None => branches.push(TreeBranch {
                trigger: trigger.to_string(),
                children: vec![child],
            }),
        }
        self.nodes[child.0].parent = Some(BranchEdge {
            parent,
            trigger: trigger.to_string(),
        });
    }

    // A choice branch keyed on an undeclared value compiles but never opens.
    fn warn_undeclared_triggers(&self) {
        for node in self.nodes.iter().filter(|node| node.kind.is_choice()) {
            for branch in node.branches.iter().filter(|b| !node.has_option(&b.trigger)) {
                tracing::warn!(
                    question = %node.id,
                    trigger = %branch.trigger,
                    "branch trigger is not one of the question's options"
                );
            }
        }
    }

    fn ensure_reachable(&self) -> Result<(), SpecError> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIndex> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx.0], true) {
                continue;
            }
            for branch in &self.nodes[idx.0].branches {
                stack.extend(branch.children.iter().rev().copied());
            }
        }
        match seen.iter().position(|visited| !visited) {
            Some(pos) => Err(SpecError::CyclicDependency(self.nodes[pos].id.clone())),
            None => Ok(()),
        }
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub fn node(&self, idx: NodeIndex) -> &TreeNode {
        &self.nodes[idx.0]
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.index_of(id).map(|idx| self.node(idx))
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node in arena (declaration) order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> {
        (0..self.nodes.len()).map(NodeIndex)
    }

    /// Every node in pre-order, regardless of activity.
    pub fn preorder(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeIndex> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            order.push(idx);
            for branch in self.nodes[idx.0].branches.iter().rev() {
                stack.extend(branch.children.iter().rev().copied());
            }
        }
        order
    }
}
