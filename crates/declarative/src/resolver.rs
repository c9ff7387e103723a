//! Dependency resolution - orders phases so every phase follows its dependencies

use crate::error::{Error, Result};
use crate::types::Phase;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current traversal path
    Visiting,
    /// Appended to the output
    Done,
}

struct Resolver<'a> {
    index: HashMap<&'a str, &'a Phase>,
    marks: HashMap<&'a str, Mark>,
    order: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn new(phases: &'a [Phase]) -> Result<Self> {
        let mut index = HashMap::with_capacity(phases.len());
        for phase in phases {
            if index.insert(phase.id.as_str(), phase).is_some() {
                return Err(Error::DuplicatePhase {
                    phase: phase.id.clone(),
                });
            }
        }

        Ok(Self {
            index,
            marks: HashMap::new(),
            order: Vec::with_capacity(phases.len()),
        })
    }

    fn visit(&mut self, name: &'a str) -> Result<()> {
        match self.marks.get(name) {
            Some(Mark::Visiting) => {
                return Err(Error::CircularDependency {
                    phase: name.to_string(),
                });
            }
            Some(Mark::Done) => return Ok(()),
            None => {}
        }

        let phase = *self.index.get(name).ok_or_else(|| Error::UnknownPhase {
            phase: name.to_string(),
        })?;

        self.marks.insert(name, Mark::Visiting);
        for dep in phase.dependencies() {
            self.visit(dep)?;
        }
        self.marks.insert(name, Mark::Done);
        self.order.push(name);
        Ok(())
    }
}

/// Resolve the execution order of `phases`
///
/// Phases are visited depth-first in declaration order, so independent
/// phases keep their declared order. With a `target`, traversal starts at
/// the target and stops once it is appended: only the target and its
/// transitive dependencies are returned, in discovery order.
///
/// # Errors
/// - [`Error::DuplicatePhase`] when two phases share an id
/// - [`Error::CircularDependency`] naming a phase on the cycle (self-dependencies included)
/// - [`Error::UnknownPhase`] for a dependency or target that names no phase
pub fn resolve_order<'a>(phases: &'a [Phase], target: Option<&str>) -> Result<Vec<&'a str>> {
    let mut resolver = Resolver::new(phases)?;

    match target {
        Some(target) => {
            let phase = resolver
                .index
                .get(target)
                .copied()
                .ok_or_else(|| Error::UnknownPhase {
                    phase: target.to_string(),
                })?;
            resolver.visit(&phase.id)?;
        }
        None => {
            for phase in phases {
                resolver.visit(&phase.id)?;
            }
        }
    }

    log::debug!("Resolved phase order: {}", resolver.order.join(" -> "));
    Ok(resolver.order)
}

/// Group phases into dependency levels
///
/// Level 0 holds phases without dependencies; a phase sits one level above
/// its deepest dependency. Phases of one level never depend on each other.
/// Each level lists indices into `phases` in declaration order.
pub fn levels(phases: &[Phase]) -> Result<Vec<Vec<usize>>> {
    let order = resolve_order(phases, None)?;
    let position: HashMap<&str, usize> = phases
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();

    let mut depth: HashMap<&str, usize> = HashMap::with_capacity(order.len());
    for name in &order {
        let phase = &phases[position[name]];
        let level = phase
            .dependencies()
            .iter()
            .filter_map(|dep| depth.get(dep.as_str()))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(name, level);
    }

    let height = depth.values().copied().max().map_or(0, |d| d + 1);
    let mut grouped = vec![Vec::new(); height];
    for (i, phase) in phases.iter().enumerate() {
        if let Some(level) = depth.get(phase.id.as_str()) {
            grouped[*level].push(i);
        }
    }

    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn phase(id: &str, config: Value) -> Phase {
        Phase::from_config(id, &config).unwrap()
    }

    fn depends(id: &str, deps: &[&str]) -> Phase {
        phase(id, json!({"waitFor": {"dependsOn": deps}}))
    }

    fn scenario() -> Vec<Phase> {
        vec![
            phase("preflight", json!({})),
            phase(
                "initialization",
                json!({"waitFor": {"dependsOn": "preflight", "timeout": "300ms"}}),
            ),
            depends("setup", &["initialization"]),
            phase("lazy", json!({"instanceMode": "onUse"})),
        ]
    }

    fn assert_topological(phases: &[Phase], order: &[&str]) {
        for p in phases {
            let at = order.iter().position(|n| *n == p.id).unwrap();
            for dep in p.dependencies() {
                let dep_at = order.iter().position(|n| n == dep).unwrap();
                assert!(dep_at < at, "{dep} must come before {}", p.id);
            }
        }
    }

    #[test]
    fn test_scenario_order() {
        let phases = scenario();
        let order = resolve_order(&phases, None).unwrap();
        assert_eq!(order, vec!["preflight", "initialization", "setup", "lazy"]);
    }

    #[test]
    fn test_dependencies_declared_later() {
        let phases = vec![
            depends("deploy", &["build", "test"]),
            depends("test", &["build"]),
            depends("build", &[]),
            depends("docs", &[]),
        ];
        let order = resolve_order(&phases, None).unwrap();
        assert_eq!(order, vec!["build", "test", "deploy", "docs"]);
        assert_topological(&phases, &order);
    }

    #[test]
    fn test_diamond_is_topological() {
        let phases = vec![
            depends("d", &["b", "c"]),
            depends("c", &["a"]),
            depends("b", &["a"]),
            depends("a", &[]),
        ];
        let order = resolve_order(&phases, None).unwrap();
        assert_eq!(order.len(), 4);
        assert_topological(&phases, &order);
    }

    #[test]
    fn test_self_dependency_is_circular() {
        let phases = vec![depends("loop", &["loop"])];
        let err = resolve_order(&phases, None).unwrap_err();
        assert!(matches!(err, Error::CircularDependency { phase } if phase == "loop"));
    }

    #[test]
    fn test_cycle_names_phase_on_cycle() {
        let phases = vec![
            depends("start", &[]),
            depends("a", &["c"]),
            depends("b", &["a"]),
            depends("c", &["b"]),
        ];
        match resolve_order(&phases, None).unwrap_err() {
            Error::CircularDependency { phase } => {
                assert!(["a", "b", "c"].contains(&phase.as_str()));
            }
            other => panic!("expected circular dependency, got {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let phases = vec![depends("a", &["missing"])];
        let err = resolve_order(&phases, None).unwrap_err();
        assert!(matches!(err, Error::UnknownPhase { phase } if phase == "missing"));
    }

    #[test]
    fn test_target_returns_dependency_closure() {
        let phases = vec![
            depends("unrelated", &[]),
            depends("base", &[]),
            depends("middle", &["base"]),
            depends("target", &["middle"]),
            depends("after", &["target"]),
        ];
        let order = resolve_order(&phases, Some("target")).unwrap();
        assert_eq!(order, vec!["base", "middle", "target"]);
    }

    #[test]
    fn test_target_in_scenario() {
        let phases = scenario();
        let order = resolve_order(&phases, Some("initialization")).unwrap();
        assert_eq!(order, vec!["preflight", "initialization"]);
    }

    #[test]
    fn test_unknown_target() {
        let phases = scenario();
        assert!(matches!(
            resolve_order(&phases, Some("nope")),
            Err(Error::UnknownPhase { .. })
        ));
    }

    #[test]
    fn test_levels() {
        let phases = scenario();
        let grouped = levels(&phases).unwrap();
        assert_eq!(grouped, vec![vec![0, 3], vec![1], vec![2]]);
    }

    #[test]
    fn test_levels_diamond() {
        let phases = vec![
            depends("d", &["b", "c"]),
            depends("c", &["a"]),
            depends("b", &["a"]),
            depends("a", &[]),
        ];
        let grouped = levels(&phases).unwrap();
        assert_eq!(grouped, vec![vec![3], vec![1, 2], vec![0]]);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let phases = vec![
            phase("a", json!({})),
            phase("b", json!({})),
            phase("a", json!({"description": "again"})),
        ];
        assert!(matches!(
            resolve_order(&phases, None),
            Err(Error::DuplicatePhase { ref phase }) if phase == "a"
        ));
        assert!(matches!(levels(&phases), Err(Error::DuplicatePhase { .. })));
    }
}
