//! Plan rendering - manifest shapes, normalisation and the wire format
//!
//! Three manifest shapes are accepted and normalised once into a [`Plan`]:
//!
//! - `{ phases: [ {metadata: {name}, spec: {...}}, ... ] }`
//! - legacy `{ plan: { <phase>: {...}, targetPhase, defaultInstanceMode } }`
//! - a list of documents, exactly one carrying a `plan` key; the rest form
//!   the resource pool used for selector matching
//!
//! Rendering emits each phase in resolver order as
//! `{"Kind": "Phase", "Id": ..., "Spec": {...}}` with snake_case keys,
//! followed by the pool documents its selector matches.

use crate::error::{Error, Result};
use crate::resolver::resolve_order;
use crate::types::{DEFAULT_KIND, InstanceMode, Phase, Resource, value_kind};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

const TARGET_PHASE: &str = "targetPhase";
const DEFAULT_INSTANCE_MODE: &str = "defaultInstanceMode";

/// Raw manifest, classified by shape
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    /// Document with a `phases` list
    Phases {
        phases: Vec<Value>,
        settings: Map<String, Value>,
    },
    /// Document with a single `plan` mapping of phase name to config
    Legacy { plan: Map<String, Value> },
    /// Document list with one plan document and freestanding resources
    Documents {
        plan: Map<String, Value>,
        pool: Vec<Value>,
    },
}

impl Manifest {
    /// Classify a parsed manifest
    ///
    /// # Errors
    /// - [`Error::Format`] for any other shape
    /// - [`Error::MissingPlan`] when a document list has zero or several plan documents
    pub fn parse(doc: &Value) -> Result<Self> {
        match doc {
            Value::Object(map) if map.contains_key("phases") => {
                let phases = match &map["phases"] {
                    Value::Array(list) => list.clone(),
                    Value::Null => Vec::new(),
                    other => {
                        return Err(Error::Format(format!(
                            "`phases` must be a list, got {}",
                            value_kind(other)
                        )));
                    }
                };
                let settings = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "phases")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Ok(Self::Phases { phases, settings })
            }
            Value::Object(map) if map.contains_key("plan") => Ok(Self::Legacy {
                plan: plan_section(&map["plan"])?,
            }),
            Value::Array(docs) => {
                let plans: Vec<&Value> = docs
                    .iter()
                    .filter_map(|doc| doc.as_object().and_then(|m| m.get("plan")))
                    .collect();
                if plans.len() != 1 {
                    return Err(Error::MissingPlan { found: plans.len() });
                }

                let pool = docs
                    .iter()
                    .filter(|doc| doc.as_object().is_some_and(|m| !m.contains_key("plan")))
                    .cloned()
                    .collect();
                Ok(Self::Documents {
                    plan: plan_section(plans[0])?,
                    pool,
                })
            }
            Value::Object(_) => Err(Error::Format(
                "expected a `phases` list or a `plan` mapping".to_string(),
            )),
            other => Err(Error::Format(format!(
                "expected a mapping or a document list, got {}",
                value_kind(other)
            ))),
        }
    }
}

fn plan_section(value: &Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(Error::Format(format!(
            "`plan` must be a mapping, got {}",
            value_kind(other)
        ))),
    }
}

/// Normalised plan, independent of the manifest shape it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Phases in declaration order
    pub phases: Vec<Phase>,
    /// Target phase declared in the manifest
    pub target_phase: Option<String>,
    /// Instance mode for phases that do not declare one
    pub default_instance_mode: InstanceMode,
    /// Freestanding resources available to selectors
    pub pool: Vec<Value>,
}

impl Plan {
    /// Parse and normalise a manifest
    pub fn from_manifest(doc: &Value) -> Result<Self> {
        match Manifest::parse(doc)? {
            Manifest::Phases { phases, settings } => {
                Self::from_phase_list(&phases, &settings, Vec::new())
            }
            Manifest::Legacy { plan } => Self::from_plan_section(&plan, Vec::new()),
            Manifest::Documents { plan, pool } => Self::from_plan_section(&plan, pool),
        }
    }

    fn from_phase_list(
        items: &[Value],
        settings: &Map<String, Value>,
        pool: Vec<Value>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut phases = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(Error::Format(format!(
                    "phase entry {index} must be a mapping, got {}",
                    value_kind(item)
                )));
            }
            let metadata = item.get("metadata");
            let id = metadata
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map_or_else(|| format!("phase-{index}"), str::to_string);
            let name = metadata
                .and_then(|m| m.get("annotations"))
                .and_then(|a| a.get("displayName"))
                .and_then(Value::as_str)
                .map(str::to_string);

            if !seen.insert(id.clone()) {
                return Err(Error::DuplicatePhase { phase: id });
            }

            let spec = item.get("spec").unwrap_or(&Value::Null);
            phases.push(Phase::from_config(id, spec)?.with_name(name));
        }

        Ok(Self {
            phases,
            target_phase: target_of(settings),
            default_instance_mode: instance_mode_of(settings)?,
            pool,
        })
    }

    fn from_plan_section(plan: &Map<String, Value>, pool: Vec<Value>) -> Result<Self> {
        let phases = plan
            .iter()
            .filter(|(key, value)| {
                key.as_str() != TARGET_PHASE
                    && key.as_str() != DEFAULT_INSTANCE_MODE
                    && value.is_object()
            })
            .map(|(key, value)| Phase::from_config(key.clone(), value))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            phases,
            target_phase: target_of(plan),
            default_instance_mode: instance_mode_of(plan)?,
            pool,
        })
    }

    /// Phase by id
    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// Phases in execution order
    ///
    /// An explicit `target` overrides the target declared in the manifest.
    pub fn ordered(&self, target: Option<&str>) -> Result<Vec<&Phase>> {
        let target = target.or(self.target_phase.as_deref());
        let order = resolve_order(&self.phases, target)?;
        Ok(order.into_iter().filter_map(|id| self.phase(id)).collect())
    }

    /// Render the ordered wire list
    pub fn render(&self, target: Option<&str>) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for phase in self.ordered(target)? {
            out.push(json!({
                "Kind": DEFAULT_KIND,
                "Id": phase.id,
                "Spec": self.wire_spec(phase),
            }));

            let matched = phase.spec.selector.select(&self.pool);
            log::debug!("Phase {} selects {} resource(s)", phase.id, matched.len());
            out.extend(matched.into_iter().cloned());
        }
        Ok(out)
    }

    /// Rendered documents as resources, the desired side of reconciliation
    pub fn resources(&self, target: Option<&str>) -> Result<Vec<Resource>> {
        self.render(target)?
            .iter()
            .map(Resource::from_document)
            .collect()
    }

    /// Check the dependency graph and every phase configuration
    pub fn validate(&self) -> Result<()> {
        resolve_order(&self.phases, None)?;
        if let Some(target) = &self.target_phase {
            resolve_order(&self.phases, Some(target))?;
        }
        for phase in &self.phases {
            phase.validate()?;
        }
        Ok(())
    }

    fn wire_spec(&self, phase: &Phase) -> Value {
        let raw = &phase.raw;
        let field = |keys: &[&str]| keys.iter().find_map(|key| raw.get(*key));
        let empty = || Value::Object(Map::new());

        let mut spec = Map::new();
        spec.insert(
            "description".to_string(),
            field(&["description"]).cloned().unwrap_or_else(|| json!("")),
        );
        spec.insert(
            "selector".to_string(),
            field(&["selector"]).map_or_else(empty, snake_keys),
        );
        spec.insert(
            "instance_mode".to_string(),
            json!(
                phase
                    .spec
                    .instance_mode
                    .unwrap_or(self.default_instance_mode)
                    .as_str()
            ),
        );
        spec.insert(
            "wait_for".to_string(),
            field(&["waitFor", "wait_for"]).map_or_else(empty, snake_keys),
        );
        spec.insert(
            "retry".to_string(),
            field(&["retry"]).cloned().unwrap_or_else(empty),
        );
        spec.insert(
            "on_failure".to_string(),
            field(&["onFailure", "on_failure"])
                .cloned()
                .unwrap_or_else(empty),
        );
        spec.insert(
            "on_success".to_string(),
            field(&["onSuccess", "on_success"])
                .cloned()
                .unwrap_or_else(empty),
        );

        for (key, value) in raw {
            let key = to_snake_case(key);
            if !spec.contains_key(&key) {
                spec.insert(key, value.clone());
            }
        }

        Value::Object(spec)
    }
}

fn target_of(settings: &Map<String, Value>) -> Option<String> {
    settings
        .get(TARGET_PHASE)
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn instance_mode_of(settings: &Map<String, Value>) -> Result<InstanceMode> {
    match settings.get(DEFAULT_INSTANCE_MODE) {
        None | Some(Value::Null) => Ok(InstanceMode::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
            Error::Format(format!("invalid {DEFAULT_INSTANCE_MODE}: {value}"))
        }),
    }
}

/// Shallow key transcoding of a mapping; other values pass through
fn snake_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (to_snake_case(key), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// `dependsOn` -> `depends_on`, `HTTPPort` -> `http_port`
///
/// A word starts at a lower-to-upper change, or at the last capital of an
/// acronym that is followed by a lower-case letter.
pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
