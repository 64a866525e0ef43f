//! CLI tool to drive a creative build from the terminal.
//!
//! Usage:
//!   boardchain init --template boards.json --output ad.automerge
//!   boardchain run --document ad.automerge next substep next
//!   boardchain inspect --document ad.automerge [--json]
//!   boardchain restore --document ad.automerge Step_1
//!   boardchain config > workflow.json

mod input;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use boardchain::document::DocumentManager;
use boardchain::workflow::{BuildSession, Command, SessionStatus};
use boardchain::WorkflowConfig;
use input::InputTemplate;

#[derive(Parser, Debug)]
#[command(
    name = "boardchain",
    about = "Build multi-device ad creatives step by step",
    version
)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workflow configuration JSON (defaults to the built-in ad workflow)
    #[arg(short, long, global = true, env = "BOARDCHAIN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a document from a board template
    Init {
        #[arg(short, long)]
        template: PathBuf,
        /// Output path (defaults to the template path with .automerge extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run workflow commands (next, prev, substep) in order
    Run {
        #[arg(short, long)]
        document: PathBuf,
        #[arg(required = true)]
        commands: Vec<String>,
        /// Keep going after a failed command
        #[arg(long, default_value = "false")]
        keep_going: bool,
    },
    /// Print the current step, snapshots and sequences
    Inspect {
        #[arg(short, long)]
        document: PathBuf,
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Restore a snapshot by name
    Restore {
        #[arg(short, long)]
        document: PathBuf,
        name: String,
    },
    /// Print the workflow configuration in effect
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { template, output } => init(&template, output, config),
        Commands::Run {
            document,
            commands,
            keep_going,
        } => run(&document, &commands, keep_going, config),
        Commands::Inspect { document, json } => inspect(&document, json, config),
        Commands::Restore { document, name } => restore(&document, &name, config),
        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<WorkflowConfig> {
    match path {
        Some(path) => WorkflowConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(WorkflowConfig::standard()),
    }
}

fn open(path: &Path, config: WorkflowConfig) -> Result<BuildSession<DocumentManager>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let document = DocumentManager::from_bytes(&bytes).context("Failed to load document")?;
    BuildSession::init(document, config).context("Failed to open build session")
}

fn save(session: BuildSession<DocumentManager>, path: &Path) -> Result<()> {
    let mut document = session.teardown();
    std::fs::write(path, document.save())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "document saved");
    Ok(())
}

fn init(template: &Path, output: Option<PathBuf>, config: WorkflowConfig) -> Result<()> {
    if !template.exists() {
        anyhow::bail!("Template file does not exist: {}", template.display());
    }
    let json = std::fs::read_to_string(template).context("Failed to read template file")?;
    let input: InputTemplate = serde_json::from_str(&json).context("Failed to parse template")?;
    let boards = input.boards.into_iter().map(Into::into).collect();

    let document =
        DocumentManager::with_nodes(&input.name, boards).context("Failed to create document")?;
    // Opening a session validates the config against the fresh document.
    let session = BuildSession::init(document, config).context("Failed to open build session")?;
    let boards = session.creative().len();

    let output = output.unwrap_or_else(|| {
        let mut path = template.to_path_buf();
        path.set_extension("automerge");
        path
    });
    save(session, &output)?;
    println!(
        "Created {} ({} sequence boards recognized)",
        output.display(),
        boards
    );
    Ok(())
}

fn run(path: &Path, commands: &[String], keep_going: bool, config: WorkflowConfig) -> Result<()> {
    let commands = commands
        .iter()
        .map(|c| c.parse::<Command>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid command")?;

    let mut session = open(path, config)?;
    let mut failed = false;
    for command in commands {
        let outcome = session
            .dispatch(command)
            .with_context(|| format!("Command '{}' failed", command))?;
        let mark = if outcome.success { "ok" } else { "FAILED" };
        println!(
            "{:<8} {:<7} step {}: {}",
            command, mark, outcome.step, outcome.message
        );
        if !outcome.success {
            failed = true;
            if !keep_going {
                break;
            }
        }
    }
    save(session, path)?;
    if failed {
        anyhow::bail!("One or more commands failed");
    }
    Ok(())
}

fn inspect(path: &Path, json: bool, config: WorkflowConfig) -> Result<()> {
    let session = open(path, config)?;
    let status = session.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    print_status(&status, session.config().steps.len());
    Ok(())
}

fn restore(path: &Path, name: &str, config: WorkflowConfig) -> Result<()> {
    let mut session = open(path, config)?;
    let step = session
        .restore_snapshot(name)
        .with_context(|| format!("Failed to restore {}", name))?;
    save(session, path)?;
    println!("Restored {} (step {})", name, step);
    Ok(())
}

fn print_status(status: &SessionStatus, total_steps: usize) {
    println!(
        "Step {}/{}: {} ({})",
        status.step + 1,
        total_steps,
        status.step_name,
        status.step_id
    );
    if !status.directions.is_empty() {
        println!("  {}", status.directions);
    }
    for (device, count) in &status.substeps {
        println!("  {} sub-steps: {}", device, count);
    }

    println!();
    println!("Sequences:");
    for (device, sequences) in &status.creative.sequences {
        for (name, sequence) in sequences {
            let boards: Vec<&str> = sequence.artboards.iter().map(|e| e.name.as_str()).collect();
            println!("  {:<8} {:<10} {}", device, name, boards.join(", "));
        }
    }

    println!();
    if status.snapshots.is_empty() {
        println!("No snapshots");
    } else {
        println!("Snapshots: {}", status.snapshots.join(", "));
    }
}
