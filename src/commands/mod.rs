pub mod apply;
pub mod execute;
pub mod plan;
pub mod render;
pub mod submit;
pub mod validate;

use colored::Colorize;
use declarative::{Diff, ExecutionResult};

use crate::Context;
use crate::ui::{self, ChangeKind};

/// Print one phase result, with its log when verbose or unsuccessful
pub(crate) fn print_result(ctx: &Context, id: &str, result: &ExecutionResult) {
    println!(
        "  {} {:<24} {}",
        ui::status_symbol(result.status),
        id,
        result.status.as_str().dimmed()
    );
    if ctx.verbose > 0 || !result.success {
        for line in &result.logs {
            println!("      {}", line.dimmed());
        }
    }
}

/// Print a diff listing; updates show their spec changes
pub(crate) fn print_diff(ctx: &Context, diff: &Diff) {
    if diff.is_empty() {
        ui::success("No changes");
        return;
    }

    for resource in &diff.add {
        ui::change(ChangeKind::Add, resource);
        if ctx.verbose > 0 {
            for line in ui::pretty(&resource.spec).lines() {
                println!("      {}", line.dimmed());
            }
        }
    }
    for update in &diff.update {
        ui::change(ChangeKind::Update, &update.desired);
        ui::spec_diff(&update.current.spec, &update.desired.spec);
    }
    for resource in &diff.delete {
        ui::change(ChangeKind::Delete, resource);
    }

    let summary = diff.summary();
    println!();
    println!(
        "  {} to add, {} to change, {} to delete",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
}
