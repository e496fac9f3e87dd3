//! Depth-bounded derivation engines.
//!
//! Both engines apply the same rule-choice policy to every grammar symbol
//! they expand at tree depth `depth`:
//!
//! * `depth <= max_depth`: any rule of the symbol, uniformly at random;
//! * `depth > max_depth`: only the symbol's finite minimum-cost rules,
//!   uniformly at random among ties.
//!
//! Past the budget each chosen rule only contains symbols strictly cheaper
//! than the one being expanded, so every derivation terminates. A symbol with
//! no rules fails with [`GrammarError::EmptyRuleSet`]; a symbol whose rules
//! all cost infinity fails with [`GrammarError::Unproductive`] once it is
//! reached past the budget.

use std::collections::VecDeque;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::cost::CostTable;
use crate::grammar::Grammar;
use crate::tree::{DerivationTree, NodeId, NodeState};
use crate::utils::{GrammarError, Result};

/// Builds one derivation tree per call
pub trait Generator {
    fn generate<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<DerivationTree>;
}

/// Caps the number of nodes a single derivation may allocate
#[derive(Debug, Clone, Copy)]
struct NodeBudget(Option<usize>);

impl NodeBudget {
    fn check(self, tree: &DerivationTree) -> Result<()> {
        match self.0 {
            Some(limit) if tree.node_count() > limit => {
                Err(GrammarError::NodeLimitExceeded(limit))
            }
            _ => Ok(()),
        }
    }
}

fn state_for(grammar: &Grammar, token: &str) -> NodeState {
    if grammar.has_non_terminal(token) {
        NodeState::Pending
    } else {
        NodeState::Leaf
    }
}

/// Depth-first engine expanding on the call stack.
///
/// Kept as the simple reference for [`QueueGenerator`]; the minimum-cost
/// rules are recomputed from the rule costs at each restricted expansion.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveGenerator<'a> {
    grammar: &'a Grammar,
    costs: &'a CostTable,
    budget: NodeBudget,
}

impl<'a> RecursiveGenerator<'a> {
    pub fn new(grammar: &'a Grammar, costs: &'a CostTable) -> Self {
        RecursiveGenerator {
            grammar,
            costs,
            budget: NodeBudget(None),
        }
    }

    pub fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.budget = NodeBudget(limit);
        self
    }

    fn choose_rule<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<usize> {
        let rules = self.grammar.rules_of(symbol);
        if rules.is_empty() {
            return Err(GrammarError::EmptyRuleSet(symbol.to_string()));
        }
        if depth <= max_depth {
            return Ok(rng.gen_range(0..rules.len()));
        }

        let costs = self.costs.rule_costs(symbol);
        let min = costs.iter().copied().min();
        let tied: Vec<usize> = costs
            .iter()
            .enumerate()
            .filter(|(_, cost)| cost.is_finite() && Some(**cost) == min)
            .map(|(index, _)| index)
            .collect();
        tied.choose(rng)
            .copied()
            .ok_or_else(|| GrammarError::Unproductive(symbol.to_string()))
    }

    fn gen_key<R: Rng + ?Sized>(
        &self,
        tree: &mut DerivationTree,
        id: NodeId,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<()> {
        let symbol = tree.node(id).symbol.clone();
        let rule = self.choose_rule(&symbol, depth, max_depth, rng)?;

        let mut children = Vec::new();
        for token in self.grammar.rules_of(&symbol)[rule].tokens() {
            let child = tree.push(token, state_for(self.grammar, token));
            self.budget.check(tree)?;
            if tree.node(child).state == NodeState::Pending {
                self.gen_key(tree, child, depth + 1, max_depth, rng)?;
            }
            children.push(child);
        }

        tree.resolve(id, NodeState::Expanded { rule, children });
        Ok(())
    }
}

impl Generator for RecursiveGenerator<'_> {
    fn generate<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<DerivationTree> {
        let mut tree = DerivationTree::new(symbol);
        let root = tree.root();
        if self.grammar.has_non_terminal(symbol) {
            self.gen_key(&mut tree, root, 0, max_depth, rng)?;
        } else {
            tree.resolve(root, NodeState::Leaf);
        }
        Ok(tree)
    }
}

/// Breadth-first engine driven by an explicit work queue.
///
/// Stack usage stays flat regardless of derivation depth.
#[derive(Debug, Clone, Copy)]
pub struct QueueGenerator<'a> {
    grammar: &'a Grammar,
    costs: &'a CostTable,
    budget: NodeBudget,
}

impl<'a> QueueGenerator<'a> {
    pub fn new(grammar: &'a Grammar, costs: &'a CostTable) -> Self {
        QueueGenerator {
            grammar,
            costs,
            budget: NodeBudget(None),
        }
    }

    pub fn with_node_limit(mut self, limit: Option<usize>) -> Self {
        self.budget = NodeBudget(limit);
        self
    }

    fn choose_rule<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<usize> {
        let rules = self.grammar.rules_of(symbol);
        if rules.is_empty() {
            return Err(GrammarError::EmptyRuleSet(symbol.to_string()));
        }
        if depth <= max_depth {
            Ok(rng.gen_range(0..rules.len()))
        } else {
            self.costs
                .cheap_rules(symbol)
                .choose(rng)
                .copied()
                .ok_or_else(|| GrammarError::Unproductive(symbol.to_string()))
        }
    }
}

impl Generator for QueueGenerator<'_> {
    fn generate<R: Rng + ?Sized>(
        &self,
        symbol: &str,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<DerivationTree> {
        let mut tree = DerivationTree::new(symbol);
        let root = tree.root();
        if !self.grammar.has_non_terminal(symbol) {
            tree.resolve(root, NodeState::Leaf);
            return Ok(tree);
        }

        let mut queue = VecDeque::from([(0, root)]);
        while let Some((depth, id)) = queue.pop_front() {
            if tree.node(id).state != NodeState::Pending {
                continue;
            }
            let symbol = tree.node(id).symbol.clone();
            let rule = self.choose_rule(&symbol, depth, max_depth, rng)?;

            let mut children = Vec::new();
            for token in self.grammar.rules_of(&symbol)[rule].tokens() {
                let state = state_for(self.grammar, token);
                let pending = state == NodeState::Pending;
                let child = tree.push(token, state);
                self.budget.check(&tree)?;
                if pending {
                    queue.push_back((depth + 1, child));
                }
                children.push(child);
            }
            tree.resolve(id, NodeState::Expanded { rule, children });
        }

        Ok(tree)
    }
}
