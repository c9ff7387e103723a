use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phaseplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Render, diff and execute declarative multi-phase plans", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render a plan into the ordered phase manifest
    Render(RenderArgs),

    /// Check a plan's shape, dependency graph and phase configuration
    Validate(PlanArgs),

    /// Execute every phase of a plan in dependency order
    Execute(ExecuteArgs),

    /// Show what apply would change, and drift from a live snapshot
    Plan(DiffArgs),

    /// Execute the changes since the last apply and record the new state
    Apply(ApplyArgs),

    /// Post the rendered plan to a submission endpoint
    Submit(SubmitArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

/// Locates the plan file
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Directory containing the plan file (default file name: plan.yaml)
    #[arg(short, long)]
    pub directory: Option<String>,

    /// Plan file name, relative to --directory when given
    #[arg(short, long)]
    pub file: Option<String>,
}

// ============================================================================
// Command arguments
// ============================================================================

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Stop after this phase and its dependencies
    #[arg(short, long)]
    pub target: Option<String>,

    /// Write the rendered plan to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also record the rendered resources next to the plan file
    #[arg(long)]
    pub save: bool,
}

#[derive(Args)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Stop after this phase and its dependencies
    #[arg(short, long)]
    pub target: Option<String>,

    /// Overall timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Number of independent phases run at once
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Stop after this phase and its dependencies
    #[arg(short, long)]
    pub target: Option<String>,

    /// Live environment snapshot (JSON list of resources) to check for drift
    #[arg(short, long)]
    pub environment: Option<PathBuf>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Stop after this phase and its dependencies
    #[arg(short, long)]
    pub target: Option<String>,

    /// Execute and report everything, but do not record state
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Overall timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,
}

#[derive(Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Stop after this phase and its dependencies
    #[arg(short, long)]
    pub target: Option<String>,

    /// Submission endpoint; the plan is posted to <endpoint>/plan
    #[arg(long, env = "PHASEPLAN_ENDPOINT")]
    pub endpoint: Option<String>,
}
