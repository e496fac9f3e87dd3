use std::io;
use thiserror::Error;

/// Custom error types for the grammar fuzzer
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Malformed grammar: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("Unknown non-terminal: {0}")]
    UnknownNonTerminal(String),

    #[error("Empty rule set: {0}")]
    EmptyRuleSet(String),

    #[error("Unproductive symbol past depth budget: {0}")]
    Unproductive(String),

    #[error("Derivation exceeded node limit of {0}")]
    NodeLimitExceeded(usize),
}

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Trait extension for Option<T> to convert to GrammarError
pub trait OptionExt<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_grammar_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| GrammarError::InvalidGrammar(f()))
    }
}
