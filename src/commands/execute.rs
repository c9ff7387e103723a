use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ExecuteOptions, Phase, PhaseExecutor, RunReport, execute_plan};

use crate::Context;
use crate::cli::ExecuteArgs;
use crate::progress::BarProgress;
use crate::{config, loader, paths, ui};

pub fn run(ctx: &Context, args: &ExecuteArgs) -> Result<()> {
    let path = paths::resolve_plan_path(&args.plan)?;
    let plan = loader::load_plan(&path)?;

    let phases: Vec<Phase> = plan
        .ordered(args.target.as_deref())?
        .into_iter()
        .cloned()
        .collect();

    let timeout = args
        .timeout
        .or(ctx.settings.execute.timeout_secs)
        .map(config::seconds)
        .transpose()?;
    let options = ExecuteOptions {
        jobs: args.jobs.unwrap_or(ctx.settings.execute.jobs),
        timeout,
    };

    if !ctx.quiet {
        ui::header(&format!("Executing {} phase(s)", phases.len()));
    }

    let mut progress = BarProgress::new(phases.len(), ctx.quiet);
    let report = execute_plan(&phases, &PhaseExecutor::default(), &options, &mut progress);
    progress.finish();
    let report = report?;

    if !ctx.quiet {
        for entry in &report.results {
            super::print_result(ctx, &entry.phase, &entry.result);
        }
        print_summary(&report);
    }

    if !report.is_success() {
        let summary = &report.summary;
        bail!(
            "{} of {} phase(s) did not succeed",
            summary.total() - summary.succeeded,
            summary.total()
        );
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!();
    if summary.is_success() {
        println!("  {} All phases succeeded", "✓".green().bold());
    } else {
        println!("  {} Plan finished with failures", "⚠".yellow().bold());
    }

    if summary.succeeded > 0 {
        println!("    • {} succeeded", summary.succeeded);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
    if summary.timed_out > 0 {
        println!("    • {} {}", summary.timed_out, "timed out".red());
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
}
