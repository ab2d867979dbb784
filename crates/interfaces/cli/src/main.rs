//! Interactive REPL for the conversational-intent resolution core.
//!
//! Parses CLI args, loads config, initializes logging, then loops reading
//! lines from stdin and feeding them through one turn at a time.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clause_bot::{Bot, Session};
use clause_config::BotConfig;
use clause_text::WhitespaceTokenizer;

#[derive(Debug, Parser)]
#[command(name = "clause", version, about = "Conversational-intent resolution REPL")]
struct Cli {
    /// Path to a TOML config file; falls back to defaults when absent.
    #[arg(long, default_value = "clause.toml")]
    config: String,
    /// Filesystem root under which `<bot_id>/<build_version>` bundles live.
    /// Overrides the config file's `runtime.workarea` when given.
    #[arg(long)]
    workarea: Option<String>,
    #[arg(long)]
    bot_id: String,
    #[arg(long, default_value = "main")]
    branch: String,
    #[arg(long)]
    build_version: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = BotConfig::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;
    if let Some(workarea) = &cli.workarea {
        config.runtime.workarea = workarea.into();
    }

    let bot = Bot::open(
        &cli.bot_id,
        &cli.branch,
        &cli.build_version,
        &config,
        Box::new(WhitespaceTokenizer),
    )
    .with_context(|| format!("opening bot {}/{}", cli.bot_id, cli.build_version))?;

    if bot.ner_degraded() {
        eprintln!("warning: CRF model failed to load; slot extraction will be degraded");
    }

    let stdin = io::stdin();
    let mut session = Session::new();

    println!("clause REPL — bot {} ({})", bot.bot_id(), bot.build_version());
    print!("> ");
    io::stdout().flush().ok();

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            print!("> ");
            io::stdout().flush().ok();
            continue;
        }
        if line == ":reset" {
            session = Session::new();
            println!("session reset.");
            print!("> ");
            io::stdout().flush().ok();
            continue;
        }

        let (next_session, reply) = bot.turn(line, &[], session)?;
        session = next_session;

        match reply {
            Some(reply) => println!("bot: {}", reply.text),
            None if !session.intent_name.is_empty() && session.resolved => {
                println!("bot: (resolved) intent={}", session.intent_name);
                for entity in &session.entities {
                    println!("  {} = {:?}", entity.name, entity.val);
                }
            }
            None if session.intent_name.is_empty() => {
                println!("bot: (no matching intent)");
            }
            None => println!("bot: (listening)"),
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
