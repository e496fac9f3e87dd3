//! Minimum-depth cost analysis.
//!
//! The cost of a rule is the length of the longest chain of dependent
//! expansions needed to turn it into terminals when every nested symbol takes
//! its own cheapest rule. The cost of a symbol is the minimum over its rules.
//! Symbols that can only ever re-enter themselves never reach a finite value
//! and stay at [`Cost::Infinite`].
//!
//! Costs are computed as a least fixed point: every symbol starts at infinity
//! and each pass lowers symbols whose rules got cheaper, until a pass changes
//! nothing. The result does not depend on symbol or rule order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::grammar::{Grammar, Rule};

/// Minimum expansion depth of a symbol or rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cost {
    Finite(usize),
    /// No finite derivation exists
    Infinite,
}

impl Cost {
    pub fn is_finite(self) -> bool {
        matches!(self, Cost::Finite(_))
    }

    pub fn value(self) -> Option<usize> {
        match self {
            Cost::Finite(n) => Some(n),
            Cost::Infinite => None,
        }
    }

    fn succ(self) -> Cost {
        match self {
            Cost::Finite(n) => Cost::Finite(n + 1),
            Cost::Infinite => Cost::Infinite,
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Finite(n) => write!(f, "{}", n),
            Cost::Infinite => write!(f, "inf"),
        }
    }
}

impl Serialize for Cost {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cost::Finite(n) => serializer.serialize_u64(*n as u64),
            Cost::Infinite => serializer.serialize_str("inf"),
        }
    }
}

/// Per-symbol and per-rule costs of a grammar, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostTable {
    key_cost: HashMap<String, Cost>,
    /// Parallel to `Grammar::rules_of(symbol)`
    rule_cost: HashMap<String, Vec<Cost>>,
    /// Indices of the finite rules whose cost equals the symbol's cost
    cheap: HashMap<String, Vec<usize>>,
}

impl CostTable {
    pub fn compute(grammar: &Grammar) -> Self {
        let mut key_cost: HashMap<String, Cost> = grammar
            .rules()
            .iter()
            .map(|(symbol, rules)| {
                // Vacuous minimum
                let initial = if rules.is_empty() {
                    Cost::Finite(0)
                } else {
                    Cost::Infinite
                };
                (symbol.clone(), initial)
            })
            .collect();

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            for (symbol, rules) in grammar.rules() {
                let best = rules
                    .iter()
                    .map(|rule| expansion_cost(&key_cost, rule))
                    .min();
                if let Some(best) = best {
                    let current = key_cost.entry(symbol.clone()).or_insert(Cost::Infinite);
                    if best < *current {
                        *current = best;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut rule_cost = HashMap::with_capacity(grammar.len());
        let mut cheap = HashMap::with_capacity(grammar.len());
        for (symbol, rules) in grammar.rules() {
            let costs: Vec<Cost> = rules
                .iter()
                .map(|rule| expansion_cost(&key_cost, rule))
                .collect();
            let min = costs.iter().copied().min().unwrap_or(Cost::Infinite);
            let indices: Vec<usize> = costs
                .iter()
                .enumerate()
                .filter(|(_, cost)| cost.is_finite() && **cost == min)
                .map(|(index, _)| index)
                .collect();
            cheap.insert(symbol.clone(), indices);
            rule_cost.insert(symbol.clone(), costs);
        }

        let infinite = key_cost.values().filter(|cost| !cost.is_finite()).count();
        debug!(
            symbols = grammar.len(),
            passes, infinite, "computed grammar cost table"
        );

        CostTable {
            key_cost,
            rule_cost,
            cheap,
        }
    }

    /// Cost of `symbol`; tokens without a grammar entry cost nothing
    pub fn symbol_cost(&self, symbol: &str) -> Cost {
        self.key_cost
            .get(symbol)
            .copied()
            .unwrap_or(Cost::Finite(0))
    }

    /// Costs of the rules of `symbol`, in grammar order
    pub fn rule_costs(&self, symbol: &str) -> &[Cost] {
        self.rule_cost
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rule_cost(&self, symbol: &str, index: usize) -> Option<Cost> {
        self.rule_costs(symbol).get(index).copied()
    }

    /// Cost of expanding `rule` given the final symbol costs
    pub fn expansion_cost(&self, rule: &Rule) -> Cost {
        expansion_cost(&self.key_cost, rule)
    }

    /// Indices of the minimum-cost rules of `symbol`.
    ///
    /// Empty when the symbol has no rules or every rule costs infinity.
    pub fn cheap_rules(&self, symbol: &str) -> &[usize] {
        self.cheap.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sorted, serializable view of the table
    pub fn report(&self) -> BTreeMap<&str, SymbolCost<'_>> {
        self.key_cost
            .iter()
            .map(|(symbol, cost)| {
                (
                    symbol.as_str(),
                    SymbolCost {
                        cost: *cost,
                        rules: self.rule_costs(symbol),
                        cheap: self.cheap_rules(symbol),
                    },
                )
            })
            .collect()
    }
}

/// One entry of [`CostTable::report`]
#[derive(Debug, Serialize)]
pub struct SymbolCost<'a> {
    pub cost: Cost,
    pub rules: &'a [Cost],
    pub cheap: &'a [usize],
}

/// One step plus the deepest grammar symbol of the rule
fn expansion_cost(key_cost: &HashMap<String, Cost>, rule: &Rule) -> Cost {
    rule.tokens()
        .iter()
        .filter_map(|token| key_cost.get(token))
        .copied()
        .max()
        .unwrap_or(Cost::Finite(0))
        .succ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;
    use pretty_assertions::assert_eq;

    fn digits() -> Grammar {
        GrammarBuilder::new()
            .add_rule("<start>", &["<expr>"])
            .add_rule("<expr>", &["<digit>"])
            .add_rule("<digit>", &["0"])
            .add_rule("<digit>", &["1"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_chain_costs() {
        let costs = CostTable::compute(&digits());
        assert_eq!(costs.symbol_cost("<digit>"), Cost::Finite(1));
        assert_eq!(costs.symbol_cost("<expr>"), Cost::Finite(2));
        assert_eq!(costs.symbol_cost("<start>"), Cost::Finite(3));
        assert_eq!(costs.rule_costs("<digit>"), &[Cost::Finite(1), Cost::Finite(1)]);
        assert_eq!(costs.cheap_rules("<digit>"), &[0, 1]);
    }

    #[test]
    fn test_terminals_cost_nothing() {
        let costs = CostTable::compute(&digits());
        assert_eq!(costs.symbol_cost("0"), Cost::Finite(0));
        assert_eq!(costs.symbol_cost("<unknown>"), Cost::Finite(0));
        assert_eq!(costs.expansion_cost(&Rule::new(["a", "b"])), Cost::Finite(1));
        assert_eq!(costs.expansion_cost(&Rule::default()), Cost::Finite(1));
    }

    #[test]
    fn test_self_recursion_with_escape() {
        let grammar = GrammarBuilder::new()
            .add_rule("<a>", &["<a>"])
            .add_rule("<a>", &["x"])
            .build()
            .unwrap();
        let costs = CostTable::compute(&grammar);
        assert_eq!(costs.symbol_cost("<a>"), Cost::Finite(1));
        assert_eq!(costs.rule_costs("<a>"), &[Cost::Finite(2), Cost::Finite(1)]);
        assert_eq!(costs.cheap_rules("<a>"), &[1]);
    }

    #[test]
    fn test_self_recursion_without_escape() {
        let grammar = GrammarBuilder::new().add_rule("<a>", &["<a>"]).build().unwrap();
        let costs = CostTable::compute(&grammar);
        assert_eq!(costs.symbol_cost("<a>"), Cost::Infinite);
        assert_eq!(costs.rule_costs("<a>"), &[Cost::Infinite]);
        assert!(costs.cheap_rules("<a>").is_empty());
    }

    #[test]
    fn test_indirect_cycle_keeps_escape() {
        // <b> only reaches terminals through <a>'s escape
        let grammar = GrammarBuilder::new()
            .add_rule("<a>", &["<b>"])
            .add_rule("<a>", &["x"])
            .add_rule("<b>", &["<a>", "<a>"])
            .add_rule("<c>", &["<d>"])
            .add_rule("<d>", &["<c>"])
            .build()
            .unwrap();
        let costs = CostTable::compute(&grammar);
        assert_eq!(costs.symbol_cost("<a>"), Cost::Finite(1));
        assert_eq!(costs.symbol_cost("<b>"), Cost::Finite(2));
        assert_eq!(costs.symbol_cost("<c>"), Cost::Infinite);
        assert_eq!(costs.symbol_cost("<d>"), Cost::Infinite);
    }

    #[test]
    fn test_cost_independent_of_visit_order() {
        // <c> is first reached while <b> is still being resolved through <a>
        let grammar = GrammarBuilder::new()
            .add_rule("<a>", &["<b>"])
            .add_rule("<a>", &["<c>"])
            .add_rule("<a>", &["x"])
            .add_rule("<b>", &["<a>"])
            .add_rule("<c>", &["<b>"])
            .build()
            .unwrap();
        let costs = CostTable::compute(&grammar);
        assert_eq!(costs.symbol_cost("<a>"), Cost::Finite(1));
        assert_eq!(costs.symbol_cost("<b>"), Cost::Finite(2));
        assert_eq!(costs.symbol_cost("<c>"), Cost::Finite(3));
        assert_eq!(
            costs.rule_costs("<a>"),
            &[Cost::Finite(3), Cost::Finite(4), Cost::Finite(1)]
        );
    }

    #[test]
    fn test_max_not_sum_over_siblings() {
        let grammar = GrammarBuilder::new()
            .add_rule("<pair>", &["<digit>", "<digit>", "<digit>"])
            .add_rule("<digit>", &["7"])
            .build()
            .unwrap();
        let costs = CostTable::compute(&grammar);
        assert_eq!(costs.symbol_cost("<pair>"), Cost::Finite(2));
    }

    #[test]
    fn test_empty_rule_list_costs_zero() {
        let grammar = GrammarBuilder::new()
            .add_rule("<start>", &["<none>"])
            .add_symbol("<none>")
            .build()
            .unwrap();
        let costs = CostTable::compute(&grammar);
        assert_eq!(costs.symbol_cost("<none>"), Cost::Finite(0));
        assert_eq!(costs.symbol_cost("<start>"), Cost::Finite(1));
        assert!(costs.cheap_rules("<none>").is_empty());
    }

    #[test]
    fn test_symbol_cost_is_min_of_rule_costs() {
        let grammar = Grammar::expr();
        let costs = CostTable::compute(&grammar);
        for (symbol, rules) in grammar.rules() {
            let min = costs.rule_costs(symbol).iter().copied().min();
            assert_eq!(min, Some(costs.symbol_cost(symbol)), "{}", symbol);
            for (index, rule) in rules.iter().enumerate() {
                assert_eq!(costs.rule_cost(symbol, index), Some(costs.expansion_cost(rule)));
            }
        }
        assert_eq!(costs.symbol_cost("<digit>"), Cost::Finite(1));
        assert_eq!(costs.symbol_cost("<integer>"), Cost::Finite(2));
        assert_eq!(costs.symbol_cost("<factor>"), Cost::Finite(3));
        assert_eq!(costs.symbol_cost("<start>"), Cost::Finite(6));
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let grammar = Grammar::expr();
        assert_eq!(CostTable::compute(&grammar), CostTable::compute(&grammar));
    }

    #[test]
    fn test_report_serializes_infinity() {
        let grammar = GrammarBuilder::new()
            .add_rule("<a>", &["<a>"])
            .add_rule("<b>", &["y"])
            .build()
            .unwrap();
        let costs = CostTable::compute(&grammar);
        let json = serde_json::to_value(costs.report()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "<a>": { "cost": "inf", "rules": ["inf"], "cheap": [] },
                "<b>": { "cost": 1, "rules": [1], "cheap": [0] },
            })
        );
    }
}
