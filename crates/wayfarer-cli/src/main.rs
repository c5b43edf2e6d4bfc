//! `wayfarer` – tile-world explorer agent.
//!
//! This binary:
//!
//! 1. Loads `~/.wayfarer/config.toml` (or `--config`), then applies
//!    environment and command-line overrides.
//! 2. Initialises tracing (and OTLP export when configured).
//! 3. Builds the decision engine: LLM-backed when an API key is available and
//!    random-only mode is off, random otherwise.
//! 4. Connects to the world server and answers observations until the
//!    connection fails or **Ctrl-C** is pressed.

mod config;
mod traits;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

use config::{Config, FramingMode};
use wayfarer_memory::MemoryStore;
use wayfarer_middleware::ConnectionManager;
use wayfarer_runtime::{AgentLoop, DecisionEngine, LlmClient, LlmStrategy, init_tracing};
use wayfarer_types::AgentError;

#[derive(Parser, Debug)]
#[command(name = "wayfarer")]
#[command(author, version, about = "Explorer agent for a tile-based world server", long_about = None)]
struct Args {
    /// World server host
    #[arg(long)]
    host: Option<String>,

    /// World server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (default ~/.wayfarer/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Newline-delimited persona trait file
    #[arg(short, long)]
    traits: Option<PathBuf>,

    /// Never call the LLM; move randomly
    #[arg(long)]
    random_only: bool,

    /// Use newline-delimited JSON framing on the wire
    #[arg(long)]
    ndjson: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the effective configuration (minus the API key) to the config
    /// path and exit
    #[arg(long)]
    write_config: bool,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.server_host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server_port = port;
        }
        if let Some(path) = &self.traits {
            cfg.traits_path = Some(path.clone());
        }
        if self.random_only {
            cfg.random_only = true;
        }
        if self.ndjson {
            cfg.framing = FramingMode::Ndjson;
        }
        if self.verbose {
            cfg.verbose = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::config_path);

    let mut cfg = match config::load_from(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut cfg);

    if args.write_config {
        let mut to_write = cfg.clone();
        to_write.llm_api_key.clear();
        return match config::save_to(&to_write, &config_path) {
            Ok(()) => {
                println!("{} wrote {}", "✓".green().bold(), config_path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} {e}", "error:".red().bold());
                ExitCode::FAILURE
            }
        };
    }

    let _guard = init_tracing("wayfarer", &cfg.log_settings());
    print_banner(&cfg);

    match run(&cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "agent terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: &Config) -> Result<(), AgentError> {
    let engine = build_engine(cfg)?;
    let connection = ConnectionManager::connect_with(
        &cfg.server_host,
        cfg.server_port,
        cfg.framing.into(),
        cfg.read_timeout(),
    )
    .await?;

    let mut agent = AgentLoop::new(connection, engine);
    let result = tokio::select! {
        err = agent.run() => Err(AgentError::from(err)),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("Ctrl-C received; shutting down");
            Ok(())
        }
    };
    info!(cycles = agent.cycles(), "agent stopped");
    agent.shutdown().await;
    result
}

fn build_engine(cfg: &Config) -> Result<DecisionEngine, AgentError> {
    if cfg.random_only {
        info!("random-only mode");
        return Ok(DecisionEngine::random_only());
    }
    if cfg.llm_api_key.is_empty() {
        warn!("no LLM API key configured (set OPENAI_API_KEY); falling back to random moves");
        return Ok(DecisionEngine::random_only());
    }

    let client = match LlmClient::new(&cfg.llm_base_url, &cfg.llm_model, cfg.llm_api_key.as_str())
        .and_then(|c| c.with_timeout(cfg.llm_timeout()))
    {
        Ok(c) => c.with_context_window(cfg.context_window),
        Err(e) => {
            warn!(error = %e, "could not build the LLM client; falling back to random moves");
            return Ok(DecisionEngine::random_only());
        }
    };

    let traits = traits::load_traits(&cfg.traits_path());
    let mut strategy = LlmStrategy::new(client, traits);
    match MemoryStore::open_for_run(cfg.memory_dir()) {
        Ok(store) => strategy = strategy.with_memory(store),
        Err(e) => warn!(
            dir = %cfg.memory_dir().display(),
            error = %e,
            "memory store unavailable; running without reflections"
        ),
    }
    Ok(DecisionEngine::new(Some(Box::new(strategy)), false))
}

fn print_banner(cfg: &Config) {
    let brain = if cfg.random_only { "random" } else { cfg.llm_model.as_str() };
    println!();
    println!("{}", "  wayfarer".bold().cyan());
    println!(
        "  server {}:{}  framing {:?}  model {}",
        cfg.server_host.bold(),
        cfg.server_port,
        cfg.framing,
        brain.bold()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "wayfarer", "--host", "sim", "-p", "9100", "--random-only", "--ndjson", "-v",
        ]);
        let mut cfg = Config::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.server_host, "sim");
        assert_eq!(cfg.server_port, 9100);
        assert!(cfg.random_only);
        assert!(cfg.verbose);
        assert_eq!(cfg.framing, FramingMode::Ndjson);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::parse_from(["wayfarer"]);
        let mut cfg = Config::default();
        cfg.random_only = true;
        args.apply(&mut cfg);
        assert!(cfg.random_only);
        assert_eq!(cfg.server_host, "localhost");
    }

    #[test]
    fn engine_is_random_without_api_key() {
        let mut cfg = Config::default();
        cfg.llm_api_key.clear();
        let engine = build_engine(&cfg).unwrap();
        assert_eq!(engine.strategy_name(), "random");
    }

    #[test]
    fn engine_uses_llm_with_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.llm_api_key = "sk-test".to_string();
        cfg.memory_dir = Some(dir.path().to_path_buf());
        cfg.traits_path = Some(dir.path().join("traits.txt"));
        let engine = build_engine(&cfg).unwrap();
        assert_eq!(engine.strategy_name(), "llm");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unusable_memory_dir_still_builds_llm_engine() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "plain file").unwrap();

        let mut cfg = Config::default();
        cfg.llm_api_key = "sk-test".to_string();
        cfg.memory_dir = Some(blocker.join("memories"));
        cfg.traits_path = Some(dir.path().join("traits.txt"));
        let engine = build_engine(&cfg).unwrap();
        assert_eq!(engine.strategy_name(), "llm");
    }
}
