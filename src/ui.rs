use colored::{ColoredString, Colorize};
use declarative::{PhaseStatus, Resource};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan output
// ============================================================================

/// Kind of change shown in a diff listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn symbol(self) -> ColoredString {
        match self {
            Self::Add => "+".green(),
            Self::Update => "~".yellow(),
            Self::Delete => "-".red(),
        }
    }
}

/// Print one line of a diff listing
pub fn change(kind: ChangeKind, resource: &Resource) {
    println!("  {} {}", kind.symbol(), resource.key());
}

/// Symbol for a finished phase
pub fn status_symbol(status: PhaseStatus) -> ColoredString {
    match status {
        PhaseStatus::Succeeded => "✓".green(),
        PhaseStatus::Failed => "✗".red(),
        PhaseStatus::TimedOut => "⏱".red(),
        PhaseStatus::Skipped => "⊘".dimmed(),
    }
}

/// Pretty JSON for display; a value that cannot be encoded shows as `null`
pub fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Changed lines between two specs, as `(tag, line)` pairs
pub fn spec_changes(current: &serde_json::Value, desired: &serde_json::Value) -> Vec<(char, String)> {
    let old = pretty(current);
    let new = pretty(desired);
    let diff = similar::TextDiff::from_lines(&old, &new);

    diff.iter_all_changes()
        .filter_map(|change| {
            let tag = match change.tag() {
                similar::ChangeTag::Delete => '-',
                similar::ChangeTag::Insert => '+',
                similar::ChangeTag::Equal => return None,
            };
            Some((tag, change.value().trim_end().to_string()))
        })
        .collect()
}

/// Print a line diff between two specs
pub fn spec_diff(current: &serde_json::Value, desired: &serde_json::Value) {
    for (tag, line) in spec_changes(current, desired) {
        let line = format!("{tag} {line}");
        if tag == '-' {
            println!("      {}", line.red());
        } else {
            println!("      {}", line.green());
        }
    }
}
