use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::utils::{GrammarError, OptionExt, Result};

/// Returns true if `token` follows the `<name>` non-terminal convention.
pub fn is_nonterminal(token: &str) -> bool {
    token.len() >= 2 && token.starts_with('<') && token.ends_with('>')
}

/// One alternative expansion of a non-terminal: an ordered sequence of tokens.
///
/// An empty rule is legal and expands to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule {
    tokens: Vec<String>,
}

impl Rule {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rule {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over the tokens of this rule that use the non-terminal convention
    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .filter(|token| is_nonterminal(token))
    }
}

impl fmt::Display for Rule {
    /// Renders the rule in the bracketed text grammar syntax.
    ///
    /// Terminals are always double quoted with `\\`, `\"`, `\n`, `\r` and `\t`
    /// escapes, so any token reads back unchanged through [`Grammar::from_text`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            // `<a>b>` is not a single bare token to the parser
            if is_nonterminal(token) && token.find('>') == Some(token.len() - 1) {
                write!(f, "{}", token)?;
            } else {
                write!(f, "\"")?;
                for ch in token.chars() {
                    match ch {
                        '\\' => write!(f, "\\\\")?,
                        '"' => write!(f, "\\\"")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\t' => write!(f, "\\t")?,
                        ch => write!(f, "{}", ch)?,
                    }
                }
                write!(f, "\"")?;
            }
        }
        write!(f, "]")
    }
}

/// A context-free grammar mapping each non-terminal to its ordered rule list.
///
/// The rule order of a symbol never changes once added, so rule indices are
/// stable keys for the cost table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grammar {
    rules: BTreeMap<String, Vec<Rule>>,
}

impl Grammar {
    /// Create a new empty grammar
    pub fn new() -> Self {
        Grammar {
            rules: BTreeMap::new(),
        }
    }

    /// Add a rule to the grammar
    pub fn add_rule(&mut self, non_terminal: &str, tokens: Vec<&str>) -> Result<&mut Self> {
        check_symbol(non_terminal)?;
        self.rules
            .entry(non_terminal.to_string())
            .or_default()
            .push(Rule::new(tokens));
        Ok(self)
    }

    /// Declare a non-terminal without adding any rule to it.
    ///
    /// A symbol with an empty rule list is legal here; expanding it fails with
    /// [`GrammarError::EmptyRuleSet`].
    pub fn add_symbol(&mut self, non_terminal: &str) -> Result<&mut Self> {
        check_symbol(non_terminal)?;
        self.rules.entry(non_terminal.to_string()).or_default();
        Ok(self)
    }

    /// The rules of `symbol`, empty if the symbol has no entry
    pub fn rules_of(&self, symbol: &str) -> &[Rule] {
        self.rules.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if the grammar contains an entry for `symbol`
    pub fn has_non_terminal(&self, symbol: &str) -> bool {
        self.rules.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Get a reference to the grammar's rules
    pub fn rules(&self) -> &BTreeMap<String, Vec<Rule>> {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Bracketed tokens referenced by some rule that have no grammar entry.
    ///
    /// These expand as terminals, which usually points at a typo.
    pub fn undefined_nonterminals(&self) -> BTreeSet<&str> {
        self.rules
            .values()
            .flatten()
            .flat_map(Rule::nonterminals)
            .filter(|token| !self.rules.contains_key(*token))
            .collect()
    }

    /// Parse a grammar from a file, choosing the format by extension.
    ///
    /// `.json` files hold a map of rule lists; anything else is read as the
    /// text format accepted by [`Grammar::from_text`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_text(&source),
        }
    }

    /// Parse a grammar from JSON of the form `{"<start>": [["<expr>"]], ...}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let grammar: Grammar = serde_json::from_str(json)?;
        for symbol in grammar.symbols() {
            check_symbol(symbol)?;
        }
        Ok(grammar)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a grammar from the line-oriented text format.
    ///
    /// ```text
    /// # comment
    /// <start> ::= [<expr>]
    /// <expr>  ::= [<term>, " + ", <expr>]
    /// <expr>  ::= [<term>]
    /// ```
    ///
    /// A rule may continue over several lines until its closing `]`; comment
    /// lines in between are skipped.
    pub fn from_text(source: &str) -> Result<Self> {
        let rule_regex = Regex::new(r"(?s)^\s*(<[^>]+>)\s*::=\s*\[(.*)\]\s*$")?;
        let mut grammar = Grammar::new();

        // Start line and accumulated text of a rule spanning several lines
        let mut pending: Option<(usize, String)> = None;

        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = line.trim();

            if trimmed.starts_with('#') || (pending.is_none() && trimmed.is_empty()) {
                continue;
            }

            let (start_line, mut buffer) = pending.take().unwrap_or((line_no, String::new()));
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(trimmed);

            if !buffer.ends_with(']') {
                pending = Some((start_line, buffer));
                continue;
            }

            let captures = rule_regex.captures(&buffer).ok_or_else(|| GrammarError::Parse {
                line: start_line,
                message: format!("expected `<symbol> ::= [tokens]`, found `{}`", buffer),
            })?;
            let symbol = captures
                .get(1)
                .ok_or_grammar_err(|| format!("missing symbol on line {}", start_line))?
                .as_str();
            let tokens = captures
                .get(2)
                .ok_or_grammar_err(|| format!("missing rule body on line {}", start_line))?
                .as_str();

            let rule = Self::parse_production(tokens, start_line)?;
            grammar
                .rules
                .entry(symbol.to_string())
                .or_default()
                .push(rule);
        }

        if let Some((line, _)) = pending {
            return Err(GrammarError::Parse {
                line,
                message: "rule is missing its closing `]`".to_string(),
            });
        }

        Ok(grammar)
    }

    /// Render the grammar in the text format read by [`Grammar::from_text`]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (symbol, rules) in &self.rules {
            for rule in rules {
                out.push_str(&format!("{} ::= {}\n", symbol, rule));
            }
        }
        out
    }

    /// Parse the body of a bracketed rule into its tokens.
    ///
    /// Tokens are separated by commas or whitespace. `<name>` is kept whole,
    /// single or double quotes delimit terminals that contain separators, and
    /// an empty body yields the empty rule. Inside quotes a backslash escapes
    /// the next character, with `\n`, `\r` and `\t` standing for control
    /// characters.
    pub fn parse_production(elements_str: &str, line: usize) -> Result<Rule> {
        let mut tokens = Vec::new();
        let mut pos = 0;

        while let Some(c) = elements_str[pos..].chars().next() {
            let rest = &elements_str[pos..];
            match c {
                ',' => pos += 1,
                c if c.is_whitespace() => pos += c.len_utf8(),
                '<' => {
                    let end = rest.find('>').ok_or_else(|| GrammarError::Parse {
                        line,
                        message: format!("unterminated non-terminal in `{}`", rest),
                    })? + 1;
                    tokens.push(rest[..end].to_string());
                    pos += end;
                }
                '"' | '\'' => {
                    let (token, consumed) = parse_quoted(rest, c, line)?;
                    tokens.push(token);
                    pos += consumed;
                }
                _ => {
                    let end = rest
                        .find(|ch: char| ch == ',' || ch == '<' || ch.is_whitespace())
                        .unwrap_or(rest.len());
                    tokens.push(rest[..end].to_string());
                    pos += end;
                }
            }
        }

        Ok(Rule { tokens })
    }

    /// Arithmetic expression grammar used as the default fuzzing target
    pub fn expr() -> Self {
        let mut grammar = Grammar::new();
        let rules: [(&str, &[&[&str]]); 6] = [
            ("<start>", &[&["<expr>"]]),
            (
                "<expr>",
                &[
                    &["<term>", " + ", "<expr>"],
                    &["<term>", " - ", "<expr>"],
                    &["<term>"],
                ],
            ),
            (
                "<term>",
                &[
                    &["<factor>", " * ", "<term>"],
                    &["<factor>", " / ", "<term>"],
                    &["<factor>"],
                ],
            ),
            (
                "<factor>",
                &[
                    &["+", "<factor>"],
                    &["-", "<factor>"],
                    &["(", "<expr>", ")"],
                    &["<integer>", ".", "<integer>"],
                    &["<integer>"],
                ],
            ),
            ("<integer>", &[&["<digit>", "<integer>"], &["<digit>"]]),
            (
                "<digit>",
                &[
                    &["0"],
                    &["1"],
                    &["2"],
                    &["3"],
                    &["4"],
                    &["5"],
                    &["6"],
                    &["7"],
                    &["8"],
                    &["9"],
                ],
            ),
        ];
        for (symbol, alternatives) in rules {
            grammar.rules.insert(
                symbol.to_string(),
                alternatives
                    .iter()
                    .map(|tokens| Rule::new(tokens.iter().copied()))
                    .collect(),
            );
        }
        grammar
    }
}

/// Read a quoted terminal at the start of `rest`, returning the unescaped
/// token and the number of bytes consumed including both quotes
fn parse_quoted(rest: &str, quote: char, line: usize) -> Result<(String, usize)> {
    let mut token = String::new();
    let mut chars = rest.char_indices().skip(1);
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars.next().ok_or_else(|| GrammarError::Parse {
                    line,
                    message: format!("dangling escape in `{}`", rest),
                })?;
                token.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            ch if ch == quote => return Ok((token, i + ch.len_utf8())),
            ch => token.push(ch),
        }
    }
    Err(GrammarError::Parse {
        line,
        message: format!("unterminated quote in `{}`", rest),
    })
}

fn check_symbol(symbol: &str) -> Result<()> {
    if is_nonterminal(symbol) {
        Ok(())
    } else {
        Err(GrammarError::InvalidGrammar(format!(
            "rule key `{}` is not a <non-terminal>",
            symbol
        )))
    }
}

/// Builder for constructing Grammar instances
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    grammar: Grammar,
    error: Option<GrammarError>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        GrammarBuilder::default()
    }

    /// Add a rule to the grammar; the first error is reported by `build`
    pub fn add_rule(mut self, non_terminal: &str, tokens: &[&str]) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.grammar.add_rule(non_terminal, tokens.to_vec()) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Declare a non-terminal with no rules
    pub fn add_symbol(mut self, non_terminal: &str) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.grammar.add_symbol(non_terminal) {
                self.error = Some(err);
            }
        }
        self
    }

    pub fn build(self) -> Result<Grammar> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.grammar),
        }
    }
}
