use anyhow::Result;
use declarative::{Reconciler, StateStore};

use crate::Context;
use crate::cli::DiffArgs;
use crate::state::JsonStateStore;
use crate::{loader, paths, ui};

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<()> {
    let path = paths::resolve_plan_path(&args.plan)?;
    let plan = loader::load_plan(&path)?;
    let desired = plan.resources(args.target.as_deref())?;

    let store = JsonStateStore::for_plan(&path, &ctx.settings.state.file_name);
    let stored = store.load()?;
    let environment = match &args.environment {
        Some(snapshot) => loader::load_environment(snapshot)?,
        None => Vec::new(),
    };

    let reconciler = Reconciler::new(&desired, &stored, &environment);

    ui::header("Plan");
    if stored.is_empty() {
        ui::dim(&format!("No state at {}", store.path().display()));
    }
    super::print_diff(ctx, &reconciler.diff_against_state());

    if let Some(snapshot) = &args.environment {
        ui::section(&format!("Drift ({})", snapshot.display()));
        ui::dim("+ recorded but missing, ~ changed, - not recorded");
        super::print_diff(ctx, &reconciler.diff_against_environment());
    }

    Ok(())
}
