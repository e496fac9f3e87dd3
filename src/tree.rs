//! Derivation trees stored as an arena of nodes addressed by [`NodeId`].

use std::fmt;

use crate::grammar::is_nonterminal;

/// Index of a node inside its [`DerivationTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// Expansion state of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Queued for expansion, not yet resolved
    Pending,
    /// Token without rules. Contributes its text verbatim, unless it is a
    /// `<name>` token, which is an unexpanded non-terminal and yields nothing.
    Leaf,
    /// Non-terminal expanded with the rule at index `rule` of its symbol
    Expanded { rule: usize, children: Vec<NodeId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub symbol: String,
    pub state: NodeState,
}

impl Node {
    pub fn children(&self) -> &[NodeId] {
        match &self.state {
            NodeState::Expanded { children, .. } => children,
            NodeState::Pending | NodeState::Leaf => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DerivationTree {
    /// A tree holding only a pending root for `symbol`
    pub fn new(symbol: &str) -> Self {
        DerivationTree {
            nodes: vec![Node {
                symbol: symbol.to_string(),
                state: NodeState::Pending,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes allocated so far, including pending ones
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn push(&mut self, symbol: &str, state: NodeState) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            symbol: symbol.to_string(),
            state,
        });
        id
    }

    pub(crate) fn resolve(&mut self, id: NodeId, state: NodeState) {
        self.nodes[id.0].state = state;
    }

    /// True once no node is left pending
    pub fn is_complete(&self) -> bool {
        self.nodes
            .iter()
            .all(|node| node.state != NodeState::Pending)
    }

    /// Pre-order walk yielding each reachable node with its depth below the root
    pub fn walk(&self) -> Vec<(usize, &Node)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0, self.root)];
        while let Some((depth, id)) = stack.pop() {
            let node = self.node(id);
            out.push((depth, node));
            stack.extend(node.children().iter().rev().map(|child| (depth + 1, *child)));
        }
        out
    }

    /// Depth of the deepest node; a lone root has depth 0
    pub fn depth(&self) -> usize {
        self.walk()
            .into_iter()
            .map(|(depth, _)| depth)
            .max()
            .unwrap_or(0)
    }

    /// Concatenate the leaf terminals left to right.
    ///
    /// Uses an explicit stack, so arbitrarily deep trees flatten without
    /// recursion. Pending nodes and `<name>` leaves contribute nothing.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            match &node.state {
                NodeState::Leaf if !is_nonterminal(&node.symbol) => out.push_str(&node.symbol),
                NodeState::Leaf => {}
                NodeState::Expanded { children, .. } => stack.extend(children.iter().rev()),
                NodeState::Pending => {}
            }
        }
        out
    }
}

impl fmt::Display for DerivationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// <start> -> [<digit>, "+", <digit>] with digits 4 and 2
    fn sample() -> DerivationTree {
        let mut tree = DerivationTree::new("<start>");
        let left = tree.push("<digit>", NodeState::Pending);
        let plus = tree.push("+", NodeState::Leaf);
        let right = tree.push("<digit>", NodeState::Pending);
        tree.resolve(
            tree.root(),
            NodeState::Expanded {
                rule: 0,
                children: vec![left, plus, right],
            },
        );
        for (id, digit, rule) in [(left, "4", 4), (right, "2", 2)] {
            let leaf = tree.push(digit, NodeState::Leaf);
            tree.resolve(
                id,
                NodeState::Expanded {
                    rule,
                    children: vec![leaf],
                },
            );
        }
        tree
    }

    #[test]
    fn test_flatten_in_child_order() {
        let tree = sample();
        assert!(tree.is_complete());
        assert_eq!(tree.flatten(), "4+2");
        assert_eq!(tree.to_string(), "4+2");
    }

    #[test]
    fn test_walk_and_depth() {
        let tree = sample();
        let symbols: Vec<(usize, &str)> = tree
            .walk()
            .into_iter()
            .map(|(depth, node)| (depth, node.symbol.as_str()))
            .collect();
        assert_eq!(
            symbols,
            vec![
                (0, "<start>"),
                (1, "<digit>"),
                (2, "4"),
                (1, "+"),
                (1, "<digit>"),
                (2, "2"),
            ]
        );
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.node_count(), 6);
    }

    #[test]
    fn test_pending_tree() {
        let tree = DerivationTree::new("<start>");
        assert!(!tree.is_complete());
        assert_eq!(tree.flatten(), "");
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_undefined_nonterminal_leaf_flattens_to_nothing() {
        let mut tree = DerivationTree::new("<start>");
        let a = tree.push("a", NodeState::Leaf);
        let typo = tree.push("<digt>", NodeState::Leaf);
        let b = tree.push("b", NodeState::Leaf);
        tree.resolve(
            tree.root(),
            NodeState::Expanded {
                rule: 0,
                children: vec![a, typo, b],
            },
        );
        assert_eq!(tree.flatten(), "ab");

        let mut lone = DerivationTree::new("<begin>");
        lone.resolve(lone.root(), NodeState::Leaf);
        assert_eq!(lone.flatten(), "");
    }

    #[test]
    fn test_empty_expansion_flattens_to_nothing() {
        let mut tree = DerivationTree::new("<opt>");
        tree.resolve(
            tree.root(),
            NodeState::Expanded {
                rule: 1,
                children: Vec::new(),
            },
        );
        assert!(tree.is_complete());
        assert_eq!(tree.flatten(), "");
    }
}
