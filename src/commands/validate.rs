use anyhow::{Result, bail};

use crate::Context;
use crate::cli::PlanArgs;
use crate::{loader, paths, ui};

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let path = paths::resolve_plan_path(args)?;

    let checked = loader::load_plan(&path).and_then(|plan| {
        plan.validate()?;
        Ok(plan)
    });

    let plan = match checked {
        Ok(plan) => plan,
        Err(err) => {
            let Some(plan_err) = err.downcast_ref::<declarative::Error>() else {
                return Err(err);
            };
            let category = plan_err.category();
            ui::error(&format!("{}: {plan_err}", category.description()));
            ui::dim(category.advice());
            bail!("Plan is invalid: {}", path.display());
        }
    };

    ui::success("Plan is valid.");
    if ctx.verbose > 0 {
        let order: Vec<&str> = plan.ordered(None)?.iter().map(|p| p.id.as_str()).collect();
        ui::kv("Phases", &plan.phases.len().to_string());
        ui::kv("Resources", &plan.pool.len().to_string());
        ui::kv("Order", &order.join(" → "));
        if let Some(target) = &plan.target_phase {
            ui::kv("Target", target);
        }
    }
    Ok(())
}
