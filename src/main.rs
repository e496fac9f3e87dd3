use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use limit_fuzz::{Fuzzer, FuzzerConfig, Grammar, Strategy};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Depth-bounded grammar fuzzer
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Grammar file (`.json` or text); defaults to the built-in expression grammar
    grammar_file: Option<PathBuf>,

    /// Starting non-terminal symbol
    #[arg(short, long, default_value = "<start>")]
    start: String,

    /// Number of inputs to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Tree depth past which only minimum-cost rules are chosen
    #[arg(short = 'd', long, default_value_t = 10)]
    max_depth: usize,

    /// Derivation engine
    #[arg(long, value_enum, default_value_t = Strategy::Queue)]
    strategy: Strategy,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Fail any derivation that grows past this many tree nodes
    #[arg(long)]
    node_limit: Option<usize>,

    /// Reject grammars that reference undefined non-terminals
    #[arg(long)]
    strict: bool,

    /// Print the cost table as JSON instead of generating
    #[arg(long)]
    costs: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the built-in expression grammar
    Example {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(Commands::Example { format }) = cli.command {
        let grammar = Grammar::expr();
        match format {
            Format::Text => print!("{}", grammar.to_text()),
            Format::Json => println!("{}", grammar.to_json_string()?),
        }
        return Ok(());
    }

    let grammar = match &cli.grammar_file {
        Some(path) => {
            info!(path = %path.display(), "loading grammar");
            Grammar::from_file(path)?
        }
        None => Grammar::expr(),
    };
    info!(symbols = grammar.len(), "loaded grammar");

    let config = FuzzerConfig {
        start_symbol: cli.start.clone(),
        max_depth: cli.max_depth,
        strategy: cli.strategy,
        node_limit: cli.node_limit,
        strict: cli.strict,
    };
    let fuzzer = Fuzzer::with_config(grammar, config)?;

    if cli.costs {
        println!("{}", serde_json::to_string_pretty(&fuzzer.costs().report())?);
        return Ok(());
    }

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    for _ in 0..cli.count {
        let text = fuzzer.fuzz_with_rng(&cli.start, cli.max_depth, &mut rng)?;
        println!("{}", text);
    }

    Ok(())
}
