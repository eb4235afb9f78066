//! `repodoc` command-line entry point.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use repodoc::capabilities::Registry;
use repodoc::core::state::RunStatus;
use repodoc::engine::{Engine, RunOutcome};
use repodoc::exit_codes;
use repodoc::io::config::{DEFAULT_CONFIG_FILE, RepodocConfig, load_config, write_config};
use repodoc::logging;

#[derive(Parser)]
#[command(
    name = "repodoc",
    version,
    about = "Synthesize a requirements document from a source repository"
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a repository and write the requirements document.
    Run {
        /// Repository root to analyze.
        repo: PathBuf,
        /// Config file. Without it the built-in defaults apply.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory override.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Iteration ceiling override.
        #[arg(short = 'm', long)]
        max_iterations: Option<u32>,
    },
    /// Print the capability catalog offered to the oracle.
    Capabilities,
    /// Invoke one capability against a repository.
    Call {
        repo: PathBuf,
        name: String,
        /// JSON object with the capability arguments.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Write a config file with every default spelled out.
    InitConfig {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

/// Failure before anything ran; maps to [`exit_codes::INVALID`].
#[derive(Debug)]
struct Invalid(anyhow::Error);

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(Invalid(err)) => {
            eprintln!("error: {err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Command) -> Result<i32, Invalid> {
    match command {
        Command::Run {
            repo,
            config,
            output,
            max_iterations,
        } => cmd_run(&repo, config.as_deref(), output, max_iterations),
        Command::Capabilities => cmd_capabilities().map_err(Invalid),
        Command::Call { repo, name, args } => cmd_call(&repo, &name, &args).map_err(Invalid),
        Command::InitConfig { path, force } => cmd_init_config(&path, force).map_err(Invalid),
    }
}

fn cmd_run(
    repo: &Path,
    config_path: Option<&Path>,
    output: Option<PathBuf>,
    max_iterations: Option<u32>,
) -> Result<i32, Invalid> {
    let config = resolve_config(config_path, output, max_iterations).map_err(Invalid)?;
    let engine = Engine::from_config(config).map_err(Invalid)?;
    let root = fs::canonicalize(repo).unwrap_or_else(|_| repo.to_path_buf());

    let outcome = engine.run(&root);
    print_summary(&outcome);
    Ok(match outcome.state.status() {
        RunStatus::Completed => exit_codes::OK,
        RunStatus::Running | RunStatus::Error => exit_codes::FAILED,
    })
}

/// Config comes only from an explicit path; files inside the analyzed repository are never read.
fn resolve_config(
    config_path: Option<&Path>,
    output: Option<PathBuf>,
    max_iterations: Option<u32>,
) -> Result<RepodocConfig> {
    if let Some(path) = config_path
        && !path.is_file()
    {
        bail!("config file {} does not exist", path.display());
    }
    let mut config = load_config(config_path)?;
    if let Some(output) = output {
        config.output.output_dir = if output.is_absolute() {
            output
        } else {
            env::current_dir()
                .context("resolve current directory")?
                .join(output)
        };
    }
    if let Some(max_iterations) = max_iterations {
        config.agent.max_iterations = max_iterations;
    }
    config.validate()?;
    Ok(config)
}

fn print_summary(outcome: &RunOutcome) {
    let state = &outcome.state;
    println!("status: {}", state.status().as_str());
    println!(
        "iterations: {} / {}",
        state.iteration_count, state.max_iterations
    );
    println!("artifact length: {} chars", state.artifact.chars().count());
    match state.confidence {
        Some(confidence) => println!("confidence: {confidence:.2}"),
        None => println!("confidence: n/a"),
    }
    println!("versions: {}", state.artifact_versions.len());
    if state.forced_completion {
        println!("stopped by iteration ceiling");
    }
    if let Some(paths) = &outcome.persisted {
        println!("artifact: {}", paths.artifact.display());
        println!("report: {}", paths.report.display());
        println!("snapshot: {}", paths.snapshot.display());
    }
    if let Some(error) = &state.error {
        eprintln!("error: {error}");
    }
}

fn cmd_capabilities() -> Result<i32> {
    let registry = Registry::builtin()?;
    println!("{}", registry.render_catalog());
    Ok(exit_codes::OK)
}

fn cmd_call(repo: &Path, name: &str, raw_args: &str) -> Result<i32> {
    if !repo.is_dir() {
        bail!("repository root {} is not a directory", repo.display());
    }
    let registry = Registry::builtin()?;
    let args: Map<String, Value> =
        serde_json::from_str(raw_args).context("parse --args as a JSON object")?;
    match registry.invoke(repo, name, &args) {
        Ok(text) => {
            println!("{text}");
            Ok(exit_codes::OK)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(path, &RepodocConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}
