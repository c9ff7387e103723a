use anyhow::{Context as AnyhowContext, Result};
use declarative::Plan;
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::RenderArgs;
use crate::{loader, paths, ui};

/// Rendered resources recorded next to the plan file by `--save`
pub const RENDER_FILE: &str = ".plan_render.json";

pub fn run(ctx: &Context, args: &RenderArgs) -> Result<()> {
    let path = paths::resolve_plan_path(&args.plan)?;
    let plan = loader::load_plan(&path)?;
    let target = args.target.as_deref();

    let rendered = plan.render(target)?;
    let json = serde_json::to_string_pretty(&rendered).context("Failed to encode rendered plan")?;

    match &args.output {
        Some(output) => {
            fs::write(output, format!("{json}\n"))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !ctx.quiet {
                ui::success(&format!(
                    "Rendered {} document(s) to {}",
                    rendered.len(),
                    output.display()
                ));
            }
        }
        None => println!("{json}"),
    }

    if args.save {
        let saved = save_render(&plan, target, &path)?;
        if !ctx.quiet {
            ui::dim(&format!("Saved rendered resources to {}", saved.display()));
        }
    }

    Ok(())
}

/// Write the rendered resources to [`RENDER_FILE`] beside the plan
fn save_render(plan: &Plan, target: Option<&str>, plan_path: &Path) -> Result<std::path::PathBuf> {
    let resources = plan.resources(target)?;
    let path = paths::plan_dir(plan_path).join(RENDER_FILE);
    let content = serde_json::to_string_pretty(&resources).context("Failed to encode resources")?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    log::debug!("Saved {} resource(s) to {}", resources.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_render_writes_resource_records() {
        let dir = tempfile::tempdir().unwrap();
        let plan_path = dir.path().join("plan.yaml");
        let plan = Plan::from_manifest(&json!({
            "plan": {"a": {"description": "first"}, "b": {"waitFor": {"dependsOn": "a"}}}
        }))
        .unwrap();

        let saved = save_render(&plan, None, &plan_path).unwrap();
        assert_eq!(saved, dir.path().join(RENDER_FILE));

        let records: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(saved).unwrap()).unwrap();
        assert_eq!(records[0]["kind"], "Phase");
        assert_eq!(records[0]["id"], "a");
        assert_eq!(records[0]["spec"]["description"], "first");
        assert_eq!(records[1]["id"], "b");
    }
}
