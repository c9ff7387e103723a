//! Reconciliation - add/update/delete diffs between resource collections
//!
//! Two independent diffs are computed from the same primitive:
//! desired vs last-applied state (what an apply would change) and
//! last-applied vs the live environment (drift).

use crate::cancel::CancelToken;
use crate::context::StateStore;
use crate::executor::PhaseExecutor;
use crate::types::{ExecutionResult, Resource, ResourceKey};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A resource present on both sides with a different spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    pub current: Resource,
    pub desired: Resource,
}

/// Partition of resource keys into additions, updates and deletions
///
/// Unchanged resources appear in none of the three lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    /// In desired, absent from the baseline (desired order)
    pub add: Vec<Resource>,
    /// In both, spec differs (desired order)
    pub update: Vec<Update>,
    /// In the baseline, absent from desired (baseline order)
    pub delete: Vec<Resource>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            additions: self.add.len(),
            modifications: self.update.len(),
            removals: self.delete.len(),
        }
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to modify
    pub modifications: usize,
    /// Number of resources to remove
    pub removals: usize,
}

impl DiffSummary {
    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.removals
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Collapse duplicate keys: the last resource wins, the first position is kept
fn index(resources: &[Resource]) -> (Vec<&Resource>, HashMap<ResourceKey, usize>) {
    let mut unique: Vec<&Resource> = Vec::with_capacity(resources.len());
    let mut positions = HashMap::with_capacity(resources.len());

    for resource in resources {
        match positions.get(&resource.key()) {
            Some(&at) => unique[at] = resource,
            None => {
                positions.insert(resource.key(), unique.len());
                unique.push(resource);
            }
        }
    }

    (unique, positions)
}

/// Compare `desired` against a `current` baseline by `(kind, id)`
///
/// Only the spec is compared; label differences alone are not an update.
pub fn compute_diff(desired: &[Resource], current: &[Resource]) -> Diff {
    let (desired, desired_keys) = index(desired);
    let (current, current_keys) = index(current);

    let mut diff = Diff::default();

    for resource in &desired {
        match current_keys.get(&resource.key()) {
            None => diff.add.push((*resource).clone()),
            Some(&at) if current[at].spec != resource.spec => diff.update.push(Update {
                current: current[at].clone(),
                desired: (*resource).clone(),
            }),
            Some(_) => {}
        }
    }

    diff.delete = current
        .iter()
        .filter(|resource| !desired_keys.contains_key(&resource.key()))
        .map(|resource| (*resource).clone())
        .collect();

    diff
}

/// Options for [`Reconciler::apply`]
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Traverse and execute everything but do not persist state
    pub dry_run: bool,
    /// Overall wall-clock budget for the executed phases
    pub timeout: Option<Duration>,
}

/// What happened to one added or updated resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Create,
    Update,
}

impl Change {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Creating",
            Self::Update => "Updating",
        }
    }
}

/// One planned action and, for phases, its execution result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedAction {
    pub change: Change,
    pub key: ResourceKey,
    /// `None` for resources that are not phases
    pub result: Option<ExecutionResult>,
}

/// Outcome of an apply
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub diff: Diff,
    pub actions: Vec<AppliedAction>,
    /// Reported only; deletions are never executed
    pub deleted: Vec<ResourceKey>,
    pub dry_run: bool,
    /// Whether the desired collection was saved as the new state
    pub persisted: bool,
}

impl ApplyReport {
    /// Check if every executed phase succeeded
    pub fn is_success(&self) -> bool {
        self.actions
            .iter()
            .filter_map(|a| a.result.as_ref())
            .all(|r| r.success)
    }
}

/// Three resource collections and the diffs between them
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    pub desired: &'a [Resource],
    pub stored: &'a [Resource],
    pub environment: &'a [Resource],
}

impl<'a> Reconciler<'a> {
    pub fn new(desired: &'a [Resource], stored: &'a [Resource], environment: &'a [Resource]) -> Self {
        Self {
            desired,
            stored,
            environment,
        }
    }

    /// What an apply would change relative to the last-applied state
    pub fn diff_against_state(&self) -> Diff {
        compute_diff(self.desired, self.stored)
    }

    /// Drift of the live environment from the last-applied state
    pub fn diff_against_environment(&self) -> Diff {
        compute_diff(self.stored, self.environment)
    }

    /// Execute the state diff
    ///
    /// Additions and updates (with the desired side) run in desired order.
    /// Every phase is validated before the first one runs. Phases go through
    /// the executor; other kinds are recorded only. A phase whose dependency
    /// failed in this apply is skipped. Deletions are reported, never
    /// executed. A dry run takes the same path and skips only the final save.
    ///
    /// The saved state keeps the previous version of every phase that did
    /// not succeed, so the next diff offers it again.
    pub fn apply(
        &self,
        executor: &PhaseExecutor,
        options: &ApplyOptions,
        store: &dyn StateStore,
    ) -> Result<ApplyReport> {
        let diff = self.diff_against_state();
        let cancel = options
            .timeout
            .map_or_else(CancelToken::new, CancelToken::with_deadline);

        let mut position: HashMap<ResourceKey, usize> = HashMap::with_capacity(self.desired.len());
        for (i, resource) in self.desired.iter().enumerate() {
            position.entry(resource.key()).or_insert(i);
        }

        let mut planned: Vec<(Change, &Resource)> = diff
            .add
            .iter()
            .map(|r| (Change::Create, r))
            .chain(diff.update.iter().map(|u| (Change::Update, &u.desired)))
            .collect();
        planned.sort_by_key(|(_, r)| position.get(&r.key()).copied().unwrap_or(usize::MAX));

        let phases = planned
            .iter()
            .map(|(_, resource)| {
                if !resource.is_phase() {
                    return Ok(None);
                }
                let phase = resource.to_phase()?;
                phase.validate()?;
                Ok(Some(phase))
            })
            .collect::<crate::error::Result<Vec<_>>>()
            .context("Invalid phase in plan")?;

        // Outcomes of phases executed by this apply; unchanged phases count as done
        let mut finished: HashMap<String, bool> = HashMap::new();
        let mut actions = Vec::with_capacity(planned.len());

        for ((change, resource), phase) in planned.iter().zip(&phases) {
            log::info!("{}: {}", change.as_str(), resource.key());
            let result = match phase {
                Some(phase) => {
                    let blocker = phase
                        .dependencies()
                        .iter()
                        .find(|dep| finished.get(dep.as_str()) == Some(&false));
                    let result = match blocker {
                        Some(blocker) => {
                            log::warn!(
                                "Skipping phase {}: dependency {blocker} did not succeed",
                                phase.id
                            );
                            ExecutionResult::skipped(phase, blocker)
                        }
                        None => executor.execute(phase, &cancel)?,
                    };
                    finished.insert(phase.id.clone(), result.success);
                    Some(result)
                }
                None => None,
            };
            actions.push(AppliedAction {
                change: *change,
                key: resource.key(),
                result,
            });
        }

        let deleted: Vec<ResourceKey> = diff.delete.iter().map(Resource::key).collect();
        for key in &deleted {
            log::info!("Deleting: {key}");
        }

        let persisted = if options.dry_run {
            log::info!("dry-run: no changes made");
            false
        } else {
            let state = self.applied_state(&actions);
            store.save(&state).context("Failed to save applied state")?;
            true
        };

        Ok(ApplyReport {
            diff,
            actions,
            deleted,
            dry_run: options.dry_run,
            persisted,
        })
    }

    /// Desired resources, with unsuccessful phases reverted to their stored version
    fn applied_state(&self, actions: &[AppliedAction]) -> Vec<Resource> {
        let unsuccessful: HashSet<&ResourceKey> = actions
            .iter()
            .filter(|a| a.result.as_ref().is_some_and(|r| !r.success))
            .map(|a| &a.key)
            .collect();
        if unsuccessful.is_empty() {
            return self.desired.to_vec();
        }

        for key in &unsuccessful {
            log::warn!("Not recording {key} as applied");
        }
        self.desired
            .iter()
            .filter_map(|resource| {
                let key = resource.key();
                if !unsuccessful.contains(&key) {
                    return Some(resource.clone());
                }
                self.stored.iter().rev().find(|s| s.key() == key).cloned()
            })
            .collect()
    }
}
