use anyhow::{Result, bail};
use std::time::Duration;

use crate::Context;
use crate::cli::SubmitArgs;
use crate::submit::{SubmitClient, SubmitError, SubmitOutcome};
use crate::{loader, paths, ui};

pub fn run(ctx: &Context, args: &SubmitArgs) -> Result<()> {
    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| ctx.settings.submit.endpoint.clone())
        .ok_or(SubmitError::NoEndpoint)?;

    let path = paths::resolve_plan_path(&args.plan)?;
    let plan = loader::load_plan(&path)?;
    let rendered = plan.render(args.target.as_deref())?;

    let client = SubmitClient::new(
        endpoint,
        Duration::from_secs(ctx.settings.submit.timeout_secs),
    );
    if !ctx.quiet {
        ui::info(&format!(
            "Submitting {} document(s) to {}",
            rendered.len(),
            client.plan_url()
        ));
    }

    match client.submit(&rendered)? {
        SubmitOutcome::Accepted { body } => {
            ui::success("Plan accepted");
            if ctx.verbose > 0 && !body.is_empty() {
                ui::dim(&body);
            }
            Ok(())
        }
        SubmitOutcome::Rejected { body } => bail!("Plan rejected as invalid: {body}"),
        SubmitOutcome::Conflict { body } => bail!("Another plan is already in flight: {body}"),
        SubmitOutcome::Unexpected { status, body } => {
            ui::warn(&format!("Unexpected response {status}: {body}"));
            Ok(())
        }
    }
}
