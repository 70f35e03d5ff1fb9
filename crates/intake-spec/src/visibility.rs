use crate::answers::AnswerMap;
use crate::tree::{NodeIndex, QuestionTree, TreeNode};

pub type VisibilityMap = std::collections::BTreeMap<String, bool>;

/// One step on the path from a root to an active node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchStep<'a> {
    pub question_id: &'a str,
    pub trigger: &'a str,
}

/// A node that is currently visible and enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveNode<'a> {
    pub index: NodeIndex,
    pub node: &'a TreeNode,
    /// Branches taken from the root down to this node; empty for top-level nodes.
    pub trail: Vec<BranchStep<'a>>,
}

impl ActiveNode<'_> {
    pub fn id(&self) -> &str {
        &self.node.id
    }

    pub fn depth(&self) -> usize {
        self.trail.len()
    }
}

/// Active nodes in pre-order: each node is followed by the active children of its
/// matching branches, branches taken in declaration order.
pub fn active_nodes<'a>(tree: &'a QuestionTree, answers: &AnswerMap) -> Vec<ActiveNode<'a>> {
    let mut active = Vec::new();
    let mut trail = Vec::new();
    for &root in tree.roots() {
        visit(tree, answers, root, &mut trail, &mut active);
    }
    active
}

fn visit<'a>(
    tree: &'a QuestionTree,
    answers: &AnswerMap,
    idx: NodeIndex,
    trail: &mut Vec<BranchStep<'a>>,
    out: &mut Vec<ActiveNode<'a>>,
) {
    let node = tree.node(idx);
    out.push(ActiveNode {
        index: idx,
        node,
        trail: trail.clone(),
    });

    let Some(answer) = answers.get(&node.id) else {
        return;
    };
    for branch in &node.branches {
        if !answer.matches_trigger(&branch.trigger) {
            continue;
        }
        trail.push(BranchStep {
            question_id: &node.id,
            trigger: &branch.trigger,
        });
        for &child in &branch.children {
            visit(tree, answers, child, trail, out);
        }
        trail.pop();
    }
}

/// Whether a single node is active, following its parent edges up to a root.
pub fn is_active(tree: &QuestionTree, answers: &AnswerMap, idx: NodeIndex) -> bool {
    let mut current = tree.node(idx);
    while let Some(edge) = &current.parent {
        let parent = tree.node(edge.parent);
        let matched = answers
            .get(&parent.id)
            .is_some_and(|answer| answer.matches_trigger(&edge.trigger));
        if !matched {
            return false;
        }
        current = parent;
    }
    true
}

/// Visibility flag for every node in the tree, keyed by id.
pub fn resolve_visibility(tree: &QuestionTree, answers: &AnswerMap) -> VisibilityMap {
    let mut map: VisibilityMap = tree
        .preorder()
        .into_iter()
        .map(|idx| (tree.node(idx).id.clone(), false))
        .collect();
    for active in active_nodes(tree, answers) {
        map.insert(active.node.id.clone(), true);
    }
    map
}
