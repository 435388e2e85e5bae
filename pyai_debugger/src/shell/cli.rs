//! # PyAI Debugger CLI
//!
//! Command-line definition and the `run` entry point used by the binary.

use crate::{
    config::DebuggerConfig,
    convergence::{Convergence, wait_for_file},
    pipeline::{ArtifactPaths, Pipeline, PipelineRequest, write_verdict},
    utils::logging::init_logging,
    verdict::Verdict,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// PyAI Debugger: rewrite a Python script for unattended execution, run it in a
/// resource-bounded sandbox and write a verdict for the repair agent.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "pyai_debugger processes one script per invocation:

1. Audits imports and writes the import report.
2. Rewrites input() calls, required arguments and file paths.
3. Runs new_script.py under memory and time limits.
4. Writes codetest.txt (verdict) and handoff.json next to the input.

Example: pyai_debugger --input ./script.py --context ./notes.txt
Example: pyai_debugger --input ./script.py --AIONLY true"
)]
pub struct Cli {
    /// Script to process
    #[arg(long)]
    pub input: PathBuf,

    /// Auxiliary context for the repair agent, copied into the handoff document
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Skip the sandbox run and only rewrite (true/false, 1/0, yes/no, on/off)
    #[arg(
        long = "AIONLY",
        alias = "ai-only",
        value_name = "BOOL",
        action = clap::ArgAction::Set,
        value_parser = parse_bool_flag,
        default_value = "false"
    )]
    pub ai_only: bool,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory all script file access is redirected into
    #[arg(long)]
    pub sandbox_root: Option<PathBuf>,

    /// Python interpreter for the sandbox run and import probe
    #[arg(long)]
    pub python: Option<String>,

    /// Wall-clock limit for the sandbox run in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Undo the rewrites in new_script.py when the run passes
    #[arg(long)]
    pub restore_on_pass: bool,

    /// After the pipeline, wait for this file to stop changing and print it to stdout
    #[arg(long)]
    pub await_agent_output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log to stderr instead of file
    #[arg(long)]
    pub log_to_stderr: bool,
}

impl Cli {
    /// Configuration after file, environment and command-line overrides.
    pub fn resolve_config(&self) -> Result<DebuggerConfig> {
        let mut config = DebuggerConfig::load(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(root) = &self.sandbox_root {
            config.sandbox_root = root.clone();
        }
        if let Some(python) = &self.python {
            config.interpreter = python.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config.validate().context("Invalid command-line overrides")?;
        Ok(config)
    }

    /// [`Cli::resolve_config`], writing a `DEBUGGING ERROR` verdict next to the
    /// input when the configuration is unusable.
    pub fn resolve_config_or_report(&self) -> Result<DebuggerConfig> {
        self.resolve_config().inspect_err(|e| {
            tracing::error!(error = %format!("{e:#}"), "Configuration rejected");
            let paths = ArtifactPaths::for_input(&self.input, &DebuggerConfig::default());
            write_verdict(&paths, &Verdict::error(&format!("DEBUGGING ERROR:\n{e:#}")));
        })
    }

    pub fn request(&self) -> PipelineRequest {
        PipelineRequest {
            input: self.input.clone(),
            context: self.context.clone(),
            ai_only: self.ai_only,
            restore_on_pass: self.restore_on_pass,
        }
    }
}

/// Lenient boolean parser for flags that take a value.
pub fn parse_bool_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("expected true/false, got '{other}'")),
    }
}

/// Main entry point for the binary.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, !cli.log_to_stderr)?;

    let config = cli.resolve_config_or_report()?;
    let convergence = config.convergence.clone();
    let pipeline = Pipeline::new(config);
    let outcome = pipeline.run(&cli.request()).await;
    tracing::info!(
        passed = outcome.verdict.passed,
        verdict = %outcome.paths.verdict.display(),
        "Verdict written"
    );

    match &cli.await_agent_output {
        Some(path) => match wait_for_file(&convergence, path).await {
            Convergence::Converged(text) => println!("{text}"),
            Convergence::TimedOut(Some(text)) => {
                tracing::warn!(path = %path.display(), "Agent output still changing, printing last read");
                println!("{text}");
            }
            Convergence::TimedOut(None) => {
                tracing::warn!(path = %path.display(), "No agent output appeared");
            }
        },
        None => print!("{}", outcome.verdict.text),
    }
    Ok(())
}
