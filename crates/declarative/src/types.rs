//! Core types for declarative phase plans

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// Label set attached to resources, selectors and handler outcomes
pub type Labels = BTreeMap<String, Value>;

/// Kind assumed for documents that do not declare one
pub const DEFAULT_KIND: &str = "Phase";

static TIMEOUT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)(ms|s|m|h)?$").expect("regex for timeout grammar"));

// ============================================================================
// Phase configuration
// ============================================================================

/// Label-match predicate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    /// Labels a resource must carry with exactly these values
    #[serde(
        rename = "matchLabels",
        alias = "match_labels",
        default,
        deserialize_with = "null_default"
    )]
    pub match_labels: Labels,
}

/// Dependency and wait configuration of a phase
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WaitFor {
    /// Phases that must finish before this one starts
    #[serde(
        rename = "dependsOn",
        alias = "depends_on",
        default,
        deserialize_with = "one_or_many"
    )]
    pub depends_on: Vec<String>,
    /// Delay before the first attempt, e.g. `300ms`
    #[serde(default, deserialize_with = "string_or_number")]
    pub timeout: Option<String>,
}

/// Retry policy of a phase
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Retry {
    /// Raw attempt budget; an integer or a numeric string
    #[serde(rename = "maxAttempts", alias = "max_attempts", default)]
    pub max_attempts: Option<Value>,
}

impl Retry {
    /// Coerce the configured attempt budget, defaulting to a single attempt
    pub fn max_attempts(&self, phase: &str) -> Result<u32> {
        let invalid = |value: String| Error::InvalidRetry {
            phase: phase.to_string(),
            value,
        };

        match &self.max_attempts {
            None => Ok(1),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(n.to_string())),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| invalid(s.clone())),
            Some(other) => Err(invalid(other.to_string())),
        }
    }
}

/// When a phase's resources are instantiated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceMode {
    #[default]
    Immediate,
    #[serde(alias = "on_use")]
    OnUse,
}

impl InstanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnUse => "onUse",
        }
    }
}

/// Outcome handler (`onSuccess` / `onFailure`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Handler {
    /// Lines appended verbatim to the execution log
    #[serde(default, deserialize_with = "one_or_many")]
    pub message: Vec<String>,
    /// Notification channel -> target
    #[serde(default, deserialize_with = "null_default")]
    pub notify: Map<String, Value>,
    /// Labels reported on the execution result
    #[serde(default, deserialize_with = "null_default")]
    pub labels: Labels,
}

impl Handler {
    /// One-line summary of the notify targets, e.g. `slack=#ops, email=oncall@example.com`
    pub fn notify_summary(&self) -> String {
        self.notify
            .iter()
            .map(|(channel, target)| format!("{channel}={}", display_value(target)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Handlers may be written flat or nested under a `spec` key
#[derive(Deserialize)]
#[serde(untagged)]
enum HandlerDoc {
    Nested { spec: Handler },
    Flat(Handler),
}

/// Typed view of a phase configuration
///
/// Accepts the camelCase manifest keys as well as the snake_case keys of
/// the rendered wire format, so rendered or stored phases can be executed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub selector: Selector,
    #[serde(default, alias = "wait_for", deserialize_with = "null_default")]
    pub wait_for: WaitFor,
    #[serde(default, deserialize_with = "null_default")]
    pub retry: Retry,
    #[serde(default, alias = "instance_mode")]
    pub instance_mode: Option<InstanceMode>,
    #[serde(default, alias = "on_success", deserialize_with = "handler")]
    pub on_success: Option<Handler>,
    #[serde(default, alias = "on_failure", deserialize_with = "handler")]
    pub on_failure: Option<Handler>,
}

impl PhaseSpec {
    /// Wait before the first attempt
    pub fn wait_duration(&self) -> Result<Duration> {
        parse_timeout(self.wait_for.timeout.as_deref().unwrap_or_default())
    }

    /// Handler selected by outcome
    pub fn handler(&self, success: bool) -> Option<&Handler> {
        if success {
            self.on_success.as_ref()
        } else {
            self.on_failure.as_ref()
        }
    }
}

/// A named unit of orchestrated work
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    /// Stable identity within one plan
    pub id: String,
    /// Optional display name
    pub name: Option<String>,
    /// Typed configuration
    pub spec: PhaseSpec,
    /// Configuration as written, kept for lossless rendering
    pub raw: Map<String, Value>,
}

impl Phase {
    /// Build a phase from its configuration mapping
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let id = id.into();
        let raw = match config {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(Error::Format(format!(
                    "phase {id} must be a mapping, got {}",
                    value_kind(other)
                )));
            }
        };

        let spec: PhaseSpec = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|source| Error::InvalidPhase {
                phase: id.clone(),
                source,
            })?;
        let name = raw.get("name").and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            id,
            name,
            spec,
            raw,
        })
    }

    /// Replace the display name
    pub fn with_name(mut self, name: Option<String>) -> Self {
        if name.is_some() {
            self.name = name;
        }
        self
    }

    /// Name shown in logs, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Declared dependencies in declaration order
    pub fn dependencies(&self) -> &[String] {
        &self.spec.wait_for.depends_on
    }

    /// Check the timeout and retry configuration without running anything
    pub fn validate(&self) -> Result<()> {
        self.spec.wait_duration()?;
        self.spec.retry.max_attempts(&self.id)?;
        Ok(())
    }
}

/// Parse a timeout of the form `<integer>[ms|s|m|h]`; no unit means seconds
///
/// An empty string means no wait.
pub fn parse_timeout(value: &str) -> Result<Duration> {
    if value.is_empty() {
        return Ok(Duration::ZERO);
    }

    let invalid = || Error::InvalidTimeout {
        value: value.to_string(),
    };
    let caps = TIMEOUT_PATTERN.captures(value).ok_or_else(invalid)?;
    let amount: u64 = caps[1].parse().map_err(|_| invalid())?;

    let seconds = |factor: u64| {
        amount
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    };

    match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => Ok(Duration::from_millis(amount)),
        None | Some("s") => seconds(1),
        Some("m") => seconds(60),
        Some("h") => seconds(3600),
        Some(_) => Err(invalid()),
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Identity of a resource within a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub id: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Unit compared by reconciliation and produced by selector matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
}

const IDENTITY_KEYS: [&str; 6] = ["kind", "Kind", "id", "Id", "name", "metadata"];

impl Resource {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, spec: Value) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            spec,
            labels: Labels::new(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.kind.clone(),
            id: self.id.clone(),
        }
    }

    pub fn is_phase(&self) -> bool {
        self.kind == DEFAULT_KIND
    }

    /// Read a resource from a manifest or rendered document
    ///
    /// Understands both manifest keys (`kind`, `id`/`name`, `spec`) and the
    /// rendered wire keys (`Kind`, `Id`, `Spec`). Without a spec block the
    /// remaining non-identity keys form the spec.
    pub fn from_document(doc: &Value) -> Result<Self> {
        let Value::Object(map) = doc else {
            return Err(Error::Format(format!(
                "resource must be a mapping, got {}",
                value_kind(doc)
            )));
        };

        let kind = lookup(map, &["kind", "Kind"])
            .and_then(scalar_text)
            .unwrap_or_else(|| DEFAULT_KIND.to_string());

        let id = lookup(map, &["id", "Id", "name"])
            .and_then(scalar_text)
            .or_else(|| {
                map.get("metadata")
                    .and_then(|m| m.get("name"))
                    .and_then(scalar_text)
            })
            .ok_or_else(|| Error::MissingResourceId(doc.to_string()))?;

        let spec = match lookup(map, &["spec", "Spec"]) {
            Some(spec) => spec.clone(),
            None => Value::Object(
                map.iter()
                    .filter(|(key, _)| !IDENTITY_KEYS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
        };

        Ok(Self {
            kind,
            id,
            spec,
            labels: document_labels(doc),
        })
    }

    /// Interpret this resource's spec as a phase configuration
    pub fn to_phase(&self) -> Result<Phase> {
        Phase::from_config(self.id.clone(), &self.spec)
    }
}

/// `metadata.labels` of a document, empty when absent
pub fn document_labels(doc: &Value) -> Labels {
    doc.get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Execution results
// ============================================================================

/// Final status of one phase execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Succeeded,
    Failed,
    /// Overall deadline reached before the phase could succeed
    TimedOut,
    /// Not run because a dependency did not succeed
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of executing one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub status: PhaseStatus,
    pub message: String,
    pub logs: Vec<String>,
    pub labels: Labels,
    /// Attempts started
    pub attempts: u32,
}

impl ExecutionResult {
    /// Result for a phase that never ran because `blocker` did not succeed
    pub fn skipped(phase: &Phase, blocker: &str) -> Self {
        Self {
            success: false,
            status: PhaseStatus::Skipped,
            message: format!("Skipped phase {}", phase.display_name()),
            logs: vec![format!("Skipped: dependency {blocker} did not succeed")],
            labels: Labels::new(),
            attempts: 0,
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

impl ExecuteSummary {
    /// Total number of phases accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.skipped
    }

    /// Check if every phase succeeded
    pub fn is_success(&self) -> bool {
        self.total() == self.succeeded
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ExecutionResult) {
        match result.status {
            PhaseStatus::Succeeded => self.succeeded += 1,
            PhaseStatus::Failed => self.failed += 1,
            PhaseStatus::TimedOut => self.timed_out += 1,
            PhaseStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Options for plan execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of phases of one dependency level run at once
    pub jobs: usize,
    /// Overall wall-clock budget
    pub timeout: Option<Duration>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            timeout: None,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(list)) => list,
    })
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn null_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn handler<'de, D>(deserializer: D) -> std::result::Result<Option<Handler>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<HandlerDoc>::deserialize(deserializer)?.map(|doc| match doc {
            HandlerDoc::Nested { spec } => spec,
            HandlerDoc::Flat(handler) => handler,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("").unwrap(), Duration::ZERO);
        assert_eq!(parse_timeout("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_timeout("5").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_timeout("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_timeout("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_timeout_rejects_malformed() {
        for bad in ["abc", "5x", "1.5s", " 5", "-1", "ms"] {
            let err = parse_timeout(bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidTimeout { ref value } if value == bad),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_max_attempts_coercion() {
        let retry = |v: Value| Retry {
            max_attempts: Some(v),
        };
        assert_eq!(Retry::default().max_attempts("p").unwrap(), 1);
        assert_eq!(retry(json!(3)).max_attempts("p").unwrap(), 3);
        assert_eq!(retry(json!("4")).max_attempts("p").unwrap(), 4);
        assert!(retry(json!(0)).max_attempts("p").is_err());
        assert!(retry(json!(-2)).max_attempts("p").is_err());
        assert!(retry(json!("many")).max_attempts("p").is_err());
        assert!(retry(json!(true)).max_attempts("p").is_err());
    }

    #[test]
    fn test_phase_spec_camel_and_snake_keys() {
        let camel = Phase::from_config(
            "setup",
            &json!({
                "selector": {"matchLabels": {"tier": "db"}},
                "waitFor": {"dependsOn": "init", "timeout": "300ms"},
                "retry": {"maxAttempts": 2},
                "instanceMode": "onUse"
            }),
        )
        .unwrap();
        let snake = Phase::from_config(
            "setup",
            &json!({
                "selector": {"match_labels": {"tier": "db"}},
                "wait_for": {"depends_on": ["init"], "timeout": "300ms"},
                "retry": {"maxAttempts": 2},
                "instance_mode": "onUse"
            }),
        )
        .unwrap();

        assert_eq!(camel.spec, snake.spec);
        assert_eq!(camel.dependencies().to_vec(), vec!["init".to_string()]);
        assert_eq!(camel.spec.instance_mode, Some(InstanceMode::OnUse));
        assert_eq!(
            camel.spec.wait_duration().unwrap(),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn test_handler_flat_and_nested() {
        let phase = Phase::from_config(
            "p",
            &json!({
                "onSuccess": {"message": ["done"], "labels": {"state": "ready"}},
                "onFailure": {"spec": {"message": "broken", "notify": {"slack": "#ops"}}}
            }),
        )
        .unwrap();

        let success = phase.spec.handler(true).unwrap();
        assert_eq!(success.message, vec!["done".to_string()]);
        assert_eq!(success.labels.get("state"), Some(&json!("ready")));

        let failure = phase.spec.handler(false).unwrap();
        assert_eq!(failure.message, vec!["broken".to_string()]);
        assert_eq!(failure.notify_summary(), "slack=#ops");
    }

    #[test]
    fn test_phase_rejects_non_mapping() {
        assert!(matches!(
            Phase::from_config("p", &json!("text")),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            Phase::from_config("p", &json!({"retry": "often"})),
            Err(Error::InvalidPhase { .. })
        ));
    }

    #[test]
    fn test_validate_reports_parse_errors() {
        let phase = Phase::from_config("p", &json!({"waitFor": {"timeout": "5x"}})).unwrap();
        assert!(matches!(
            phase.validate(),
            Err(Error::InvalidTimeout { .. })
        ));

        let phase = Phase::from_config("p", &json!({"waitFor": {"timeout": 5}})).unwrap();
        assert!(phase.validate().is_ok());
    }

    #[test]
    fn test_resource_from_manifest_document() {
        let doc = json!({
            "kind": "Database",
            "name": "orders",
            "metadata": {"labels": {"tier": "db"}},
            "spec": {"size": "small"}
        });
        let resource = Resource::from_document(&doc).unwrap();
        assert_eq!(resource.kind, "Database");
        assert_eq!(resource.id, "orders");
        assert_eq!(resource.spec, json!({"size": "small"}));
        assert_eq!(resource.labels.get("tier"), Some(&json!("db")));
    }

    #[test]
    fn test_resource_from_wire_document() {
        let doc = json!({"Kind": "Phase", "Id": "setup", "Spec": {"description": "x"}});
        let resource = Resource::from_document(&doc).unwrap();
        assert!(resource.is_phase());
        assert_eq!(resource.key().to_string(), "Phase/setup");
        assert_eq!(resource.spec, json!({"description": "x"}));
    }

    #[test]
    fn test_resource_defaults_and_identity() {
        let resource = Resource::from_document(&json!({"id": 7, "size": 3})).unwrap();
        assert_eq!(resource.kind, DEFAULT_KIND);
        assert_eq!(resource.id, "7");
        assert_eq!(resource.spec, json!({"size": 3}));

        let resource =
            Resource::from_document(&json!({"metadata": {"name": "meta"}, "spec": {}})).unwrap();
        assert_eq!(resource.id, "meta");

        assert!(matches!(
            Resource::from_document(&json!({"spec": {}})),
            Err(Error::MissingResourceId(_))
        ));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        let phase = Phase::from_config("p", &json!({})).unwrap();
        summary.add_result(&ExecutionResult::skipped(&phase, "q"));
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.total(), 1);
    }
}
