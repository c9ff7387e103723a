use anyhow::{Result, bail};
use declarative::{ApplyOptions, ApplyReport, PhaseExecutor, Reconciler, StateStore};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::state::JsonStateStore;
use crate::{config, loader, paths, ui};

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let path = paths::resolve_plan_path(&args.plan)?;
    let plan = loader::load_plan(&path)?;
    let desired = plan.resources(args.target.as_deref())?;

    let store = JsonStateStore::for_plan(&path, &ctx.settings.state.file_name);
    let stored = store.load()?;
    let reconciler = Reconciler::new(&desired, &stored, &[]);

    let diff = reconciler.diff_against_state();
    if diff.is_empty() {
        ui::success("No changes. State is up to date.");
        return Ok(());
    }

    ui::header("Changes");
    super::print_diff(ctx, &diff);

    if !args.dry_run && !args.yes && !confirm_proceed()? {
        ui::info("Aborted.");
        return Ok(());
    }

    let timeout = args
        .timeout
        .or(ctx.settings.execute.timeout_secs)
        .map(config::seconds)
        .transpose()?;
    let options = ApplyOptions {
        dry_run: args.dry_run,
        timeout,
    };

    let report = reconciler.apply(&PhaseExecutor::default(), &options, &store)?;
    print_report(ctx, &report);

    if report.persisted {
        ui::success(&format!("State saved to {}", store.path().display()));
    }
    if !report.is_success() {
        bail!("Apply finished with failed phases");
    }
    Ok(())
}

fn print_report(ctx: &Context, report: &ApplyReport) {
    println!();
    for action in &report.actions {
        println!("{}: {}", action.change.as_str(), action.key);
        if let Some(result) = &action.result {
            super::print_result(ctx, &action.key.id, result);
        }
    }
    for key in &report.deleted {
        println!("Deleting: {key}");
    }
    if report.dry_run {
        println!();
        ui::dim("(dry-run: no changes made)");
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
