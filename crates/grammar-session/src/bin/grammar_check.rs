//! A small command-line front end for the grammar session: validate a
//! grammar file, or drive a session through it deterministically and print
//! what it accepted.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use grammar_session::tokenizer::ByteTokenizer;
use grammar_session::{Grammar, TokenizerOracle};

#[derive(Parser)]
#[command(name = "grammar-check", about = "Validate and exercise token-constrained-decoding grammars")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a grammar file, printing diagnostics on failure.
    Validate {
        /// Path to a `.grammar` source file.
        path: PathBuf,
    },
    /// Drive a session through the grammar, greedily picking the
    /// lowest-id allowed token at each step, up to a token budget.
    Drive {
        /// Path to a `.grammar` source file.
        path: PathBuf,
        /// Maximum number of tokens to sample before giving up.
        #[arg(long, default_value_t = 64)]
        tokens: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { path } => validate(&path),
        Command::Drive { path, tokens } => drive(&path, tokens),
    }
}

fn read_source(path: &PathBuf) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn validate(path: &PathBuf) -> Result<()> {
    let source = read_source(path)?;
    match grammar_parser::Grammar::parse(&source) {
        Ok(grammar) => {
            let rule_count = grammar.rules().count();
            println!("ok: {rule_count} rule(s), root present");
            Ok(())
        }
        Err(err) => {
            eprint!("{}", err.report(&source));
            bail!("grammar did not validate");
        }
    }
}

fn drive(path: &PathBuf, budget: usize) -> Result<()> {
    let source = read_source(path)?;
    let tokenizer = Arc::new(ByteTokenizer::new());
    let mut session = Grammar::new(&source, tokenizer.clone()).map_err(|err| {
        if let grammar_session::SessionError::Parse(parse_err) = &err {
            eprint!("{}", parse_err.report(&source));
        }
        anyhow::anyhow!(err)
    })?;

    let eos_id = tokenizer.eos_id();
    let mut emitted = String::new();
    for step in 0..budget {
        if session.is_finished() {
            println!("done after {step} token(s): {emitted:?}");
            return Ok(());
        }
        let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
        session.mask_scores(&mut scores);
        let Some((id, _)) = scores
            .iter()
            .enumerate()
            .find(|&(_, &score)| score.is_finite())
        else {
            bail!("no token is allowed at step {step}; grammar is unsatisfiable from here");
        };
        let id = id as u32;
        if id != eos_id {
            emitted.push_str(&tokenizer.decode(id));
        }
        session.advance(id)?;
    }
    bail!("did not finish within {budget} token(s); emitted so far: {emitted:?}")
}
