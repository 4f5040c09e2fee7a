//! Flowdesk CLI - run three-step text workflows from the terminal
//!
//! Usage:
//!   flowdesk login [--api-key <KEY>]
//!   flowdesk run (--template <KEY> | --steps <A,B,C>) [--input <FILE>]
//!
//! Example:
//!   flowdesk templates
//!   flowdesk run --template quick --input notes.txt
//!   cat email.txt | flowdesk run --steps clean,classify,tone

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use flowdesk::board::{BoardUpdate, RunBoard, StepStatus};
use flowdesk::catalog::{self, ACTIONS};
use flowdesk::gate::FileSessionStore;
use flowdesk::stream::RunObserver;
use flowdesk::{ClientConfig, Controller, HttpWorkflowApi, RunOutcome, Step, WorkflowApi};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "flowdesk", version, about = "Run three-step text workflows")]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend URL, overrides config and FLOWDESK_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available actions
    Actions,
    /// List the backend's workflow templates
    Templates,
    /// Validate an API key and remember it for this session
    Login {
        /// Key to validate; read from stdin when omitted
        #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Run a workflow and stream its output
    Run {
        /// Template to apply
        #[arg(short, long, conflicts_with = "steps")]
        template: Option<String>,
        /// Exactly three comma-separated actions
        #[arg(short, long, value_delimiter = ',')]
        steps: Vec<String>,
        /// Input file; stdin when omitted or "-"
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Key to use instead of the remembered one
        #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Show recent runs
    Runs {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: u32,
    },
    /// Check backend health
    Health,
}

/// Prints panel changes as they stream in
struct TerminalObserver {
    stdout: std::io::Stdout,
}

impl RunObserver for TerminalObserver {
    fn on_update(&mut self, board: &RunBoard, update: &BoardUpdate) {
        let mut out = self.stdout.lock();
        match update {
            BoardUpdate::StepStarted(step) => {
                let panel = board.panel(*step);
                let _ = writeln!(
                    out,
                    "\n{}",
                    format!("── Step {}: {} ──", step.number(), panel.action_label)
                        .cyan()
                        .bold()
                );
            }
            BoardUpdate::Chunk { text, .. } => {
                let _ = write!(out, "{}", text);
            }
            BoardUpdate::StepRetrying { step, reason } => {
                let _ = writeln!(
                    out,
                    "\n{}",
                    format!(
                        "↻ Step {} retrying ({})",
                        step.number(),
                        reason.as_deref().unwrap_or("no reason given")
                    )
                    .yellow()
                );
            }
            BoardUpdate::StepCompleted(step) => {
                let _ = writeln!(
                    out,
                    "\n{}",
                    format!("✓ Step {} {}", step.number(), StepStatus::Completed.label()).green()
                );
            }
            BoardUpdate::WorkflowCompleted { run_id } => {
                if let Some(run_id) = run_id {
                    let _ = writeln!(out, "{}", format!("run {}", run_id).dimmed());
                }
            }
            BoardUpdate::Failed { .. } => {}
        }
        let _ = out.flush();
    }

    fn on_malformed_line(&mut self, line: &str) {
        eprintln!("{}", format!("(skipped malformed line: {})", line).dimmed());
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read input from stdin")?;
            Ok(text)
        }
    }
}

fn print_actions() {
    eprintln!("{}", "ACTIONS:".bold());
    for action in ACTIONS.iter() {
        eprintln!("    {:<12} {}", action.value, action.label.dimmed());
    }
}

async fn print_templates(controller: &mut Controller) {
    controller.load_templates().await;
    if controller.templates().is_empty() {
        eprintln!("{}", "No templates available".yellow());
        return;
    }
    eprintln!("{}", "TEMPLATES:".bold());
    for (key, template) in controller.templates().iter() {
        let steps: Vec<&str> = template.steps.iter().map(|s| catalog::label_for(s)).collect();
        eprintln!(
            "    {:<10} {}  {}",
            key,
            template.label.bold(),
            steps.join(" → ").dimmed()
        );
        if let Some(description) = &template.description {
            eprintln!("               {}", description.dimmed());
        }
    }
}

async fn login(controller: &mut Controller, api_key: Option<String>) -> Result<()> {
    let key = match api_key {
        Some(key) => key,
        None => {
            eprint!("API key: ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read API key")?;
            line
        }
    };

    if controller.submit_key(&key).await {
        eprintln!("{}", "✓ API key accepted".green());
        Ok(())
    } else {
        bail!(
            "{}",
            controller.gate().error().text().unwrap_or("Invalid API Key")
        )
    }
}

async fn run(
    controller: &mut Controller,
    template: Option<String>,
    steps: Vec<String>,
    input: Option<PathBuf>,
    api_key: Option<String>,
) -> Result<()> {
    match api_key {
        Some(key) => login(controller, Some(key)).await?,
        None => {
            controller.restore_session().await;
        }
    }

    if let Some(key) = template {
        controller.load_templates().await;
        if !controller.apply_template(&key) {
            bail!("Unknown or incomplete template: {}", key);
        }
    } else if !steps.is_empty() {
        if steps.len() != 3 {
            bail!("Exactly 3 steps are required, got {}", steps.len());
        }
        for (step, value) in Step::ALL.into_iter().zip(&steps) {
            controller.select(step, value.trim())?;
        }
    }

    let input_text = read_input(input.as_ref())?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut observer = TerminalObserver {
        stdout: std::io::stdout(),
    };
    match controller.run(&input_text, &mut observer, &cancel).await {
        Ok(RunOutcome::Completed { .. }) => Ok(()),
        Ok(RunOutcome::Cancelled { workflow_id }) => {
            let message = match workflow_id {
                Some(id) => format!("Cancelled (workflow {})", id),
                None => "Cancelled before the workflow was created".to_string(),
            };
            eprintln!("\n{}", message.yellow());
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

async fn print_runs(api: &dyn WorkflowApi, skip: u32, limit: u32) -> Result<()> {
    let runs = api.recent_runs(skip, limit).await?;
    if runs.is_empty() {
        eprintln!("{}", "No runs yet".dimmed());
    }
    for run in runs {
        let status = match run.status.as_str() {
            "completed" => run.status.green(),
            "failed" => run.status.red(),
            _ => run.status.yellow(),
        };
        eprintln!("{} {} {}", run.id.bold(), status, run.created_at.dimmed());
        for step in &run.step_runs {
            let preview: String = step.output_text.chars().take(70).collect();
            eprintln!(
                "    {}. {:<10} {}",
                step.step_order,
                step.step_type,
                preview.replace('\n', " ").dimmed()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    debug!(base_url = %config.base_url, "Using backend");

    let api = Arc::new(HttpWorkflowApi::new(&config).context("Failed to create HTTP client")?);
    let store = FileSessionStore::new(&config.session_file);
    let mut controller = Controller::new(api.clone(), Box::new(store), &config.workflow_name);

    match cli.command {
        Command::Actions => print_actions(),
        Command::Templates => print_templates(&mut controller).await,
        Command::Login { api_key } => login(&mut controller, api_key).await?,
        Command::Run {
            template,
            steps,
            input,
            api_key,
        } => run(&mut controller, template, steps, input, api_key).await?,
        Command::Runs { skip, limit } => print_runs(api.as_ref(), skip, limit).await?,
        Command::Health => {
            let health = api.health().await?;
            eprintln!(
                "{} {}",
                health.status.green(),
                health.database.unwrap_or_default().dimmed()
            );
        }
    }

    Ok(())
}
