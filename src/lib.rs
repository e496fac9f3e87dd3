//! Limit-Fuzz is a grammar-based fuzzer for producing random test inputs.
//!
//! A grammar maps `<non-terminals>` to lists of rules, each rule a sequence
//! of tokens. Before generating anything the fuzzer computes, for every
//! symbol, the minimum expansion depth needed to reach terminals. While a
//! derivation is shallower than the depth budget, rules are picked uniformly
//! at random; past the budget only minimum-cost rules are allowed, so even
//! heavily recursive grammars always terminate.
//!
//! # Example
//!
//! ```rust
//! use limit_fuzz::{Fuzzer, GrammarBuilder};
//!
//! let grammar = GrammarBuilder::new()
//!     .add_rule("<start>", &["<expr>"])
//!     .add_rule("<expr>", &["<digit>"])
//!     .add_rule("<digit>", &["0"])
//!     .add_rule("<digit>", &["1"])
//!     .build()?;
//!
//! let fuzzer = Fuzzer::new(grammar)?;
//! let text = fuzzer.fuzz("<start>", 5)?;
//! assert!(text == "0" || text == "1");
//! # Ok::<(), limit_fuzz::GrammarError>(())
//! ```

pub mod cost;
pub mod fuzzer;
pub mod generator;
pub mod grammar;
pub mod tree;
pub mod utils;

pub use cost::{Cost, CostTable};
pub use fuzzer::{Fuzzer, FuzzerConfig, Strategy};
pub use generator::{Generator, QueueGenerator, RecursiveGenerator};
pub use grammar::{Grammar, GrammarBuilder, Rule, is_nonterminal};
pub use tree::{DerivationTree, Node, NodeId, NodeState};
pub use utils::{GrammarError, Result};
