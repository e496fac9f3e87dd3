use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cost::CostTable;
use crate::generator::{Generator, QueueGenerator, RecursiveGenerator};
use crate::grammar::{Grammar, is_nonterminal};
use crate::tree::DerivationTree;
use crate::utils::{GrammarError, Result};

/// Which derivation engine `fuzz` runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Breadth-first work queue
    #[default]
    Queue,
    /// Depth-first recursion
    Recursive,
}

/// Configuration options for fuzzer behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzerConfig {
    /// Symbol expanded by [`Fuzzer::generate`]
    pub start_symbol: String,
    /// Deepest tree level at which any rule may still be chosen
    pub max_depth: usize,
    pub strategy: Strategy,
    /// Maximum number of tree nodes per derivation
    pub node_limit: Option<usize>,
    /// Reject grammars referencing `<symbols>` that have no rules
    pub strict: bool,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        FuzzerConfig {
            start_symbol: "<start>".to_string(),
            max_depth: 10,
            strategy: Strategy::Queue,
            node_limit: None,
            strict: false,
        }
    }
}

/// A grammar together with its cost table.
///
/// Generation never mutates the fuzzer, so one instance can be shared across
/// threads; each call owns its tree and queue.
#[derive(Debug, Clone)]
pub struct Fuzzer {
    grammar: Grammar,
    costs: CostTable,
    config: FuzzerConfig,
}

impl Fuzzer {
    /// Create a fuzzer with the default configuration
    pub fn new(grammar: Grammar) -> Result<Self> {
        Self::with_config(grammar, FuzzerConfig::default())
    }

    /// Create a fuzzer with custom configuration
    pub fn with_config(grammar: Grammar, config: FuzzerConfig) -> Result<Self> {
        let undefined = grammar.undefined_nonterminals();
        if let Some(symbol) = undefined.iter().next() {
            if config.strict {
                return Err(GrammarError::UnknownNonTerminal(symbol.to_string()));
            }
            for symbol in &undefined {
                warn!(symbol, "non-terminal has no rules, it will expand to nothing");
            }
        }

        let costs = CostTable::compute(&grammar);
        debug!(
            symbols = grammar.len(),
            strategy = ?config.strategy,
            max_depth = config.max_depth,
            "fuzzer ready"
        );

        Ok(Fuzzer {
            grammar,
            costs,
            config,
        })
    }

    /// Generate one string from `start_symbol` with the thread-local RNG
    pub fn fuzz(&self, start_symbol: &str, max_depth: usize) -> Result<String> {
        self.fuzz_with_rng(start_symbol, max_depth, &mut rand::thread_rng())
    }

    /// Generate one string from `start_symbol` drawing choices from `rng`
    pub fn fuzz_with_rng<R: Rng + ?Sized>(
        &self,
        start_symbol: &str,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<String> {
        Ok(self.derive(start_symbol, max_depth, rng)?.flatten())
    }

    /// Generate one string using the configured start symbol and depth
    pub fn generate(&self) -> Result<String> {
        self.fuzz(&self.config.start_symbol, self.config.max_depth)
    }

    /// Build a derivation tree with the configured strategy
    pub fn derive<R: Rng + ?Sized>(
        &self,
        start_symbol: &str,
        max_depth: usize,
        rng: &mut R,
    ) -> Result<DerivationTree> {
        if self.config.strict
            && is_nonterminal(start_symbol)
            && !self.grammar.has_non_terminal(start_symbol)
        {
            return Err(GrammarError::UnknownNonTerminal(start_symbol.to_string()));
        }

        let tree = match self.config.strategy {
            Strategy::Queue => QueueGenerator::new(&self.grammar, &self.costs)
                .with_node_limit(self.config.node_limit)
                .generate(start_symbol, max_depth, rng)?,
            Strategy::Recursive => RecursiveGenerator::new(&self.grammar, &self.costs)
                .with_node_limit(self.config.node_limit)
                .generate(start_symbol, max_depth, rng)?,
        };
        debug!(
            start_symbol,
            nodes = tree.node_count(),
            depth = tree.depth(),
            "derived tree"
        );
        Ok(tree)
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    /// Get a reference to the fuzzer's configuration
    pub fn config(&self) -> &FuzzerConfig {
        &self.config
    }

    /// Set a new configuration; the cost table is unaffected
    pub fn set_config(&mut self, config: FuzzerConfig) {
        self.config = config;
    }
}
