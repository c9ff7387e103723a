//! Level-parallel plan driver
//!
//! Phases are grouped into dependency levels. Each level runs on a rayon
//! pool and is joined before the next one starts, so a phase never starts
//! before every phase it depends on has finished.

use crate::cancel::CancelToken;
use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::executor::PhaseExecutor;
use crate::resolver::{levels, resolve_order};
use crate::types::{ExecuteOptions, ExecuteSummary, ExecutionResult, Phase};
use rayon::prelude::*;
use std::collections::HashMap;

/// Result of one phase within a run
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: String,
    pub result: ExecutionResult,
}

/// Results of a whole run, in resolver order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub results: Vec<PhaseReport>,
    pub summary: ExecuteSummary,
}

impl RunReport {
    /// Result of the phase with the given id
    pub fn get(&self, phase: &str) -> Option<&ExecutionResult> {
        self.results
            .iter()
            .find(|r| r.phase == phase)
            .map(|r| &r.result)
    }

    /// Check if every phase succeeded
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

/// Execute every phase of a plan
///
/// The overall budget of `options.timeout` becomes the deadline of a fresh
/// [`CancelToken`].
pub fn execute_plan<P: ProgressCallback>(
    phases: &[Phase],
    executor: &PhaseExecutor,
    options: &ExecuteOptions,
    progress: &mut P,
) -> Result<RunReport> {
    let cancel = options
        .timeout
        .map_or_else(CancelToken::new, CancelToken::with_deadline);
    execute_plan_with_token(phases, executor, options, &cancel, progress)
}

/// Execute every phase of a plan, observing an external cancellation token
///
/// All phases are validated before anything runs. Dependents of a phase
/// that did not succeed are skipped without dispatching handlers.
///
/// # Errors
/// Duplicate ids, graph and parse errors abort before the first phase starts.
pub fn execute_plan_with_token<P: ProgressCallback>(
    phases: &[Phase],
    executor: &PhaseExecutor,
    options: &ExecuteOptions,
    cancel: &CancelToken,
    progress: &mut P,
) -> Result<RunReport> {
    for phase in phases {
        phase.validate()?;
    }
    let order = resolve_order(phases, None)?;
    let grouped = levels(phases)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let mut finished: HashMap<&str, ExecutionResult> = HashMap::with_capacity(phases.len());

    for (level, members) in grouped.iter().enumerate() {
        progress.on_level_start(level, members.len());
        log::info!(
            "Level {level}: {}",
            members
                .iter()
                .map(|&i| phases[i].id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut runnable = Vec::with_capacity(members.len());
        let mut level_results: Vec<(usize, ExecutionResult)> = Vec::with_capacity(members.len());

        for &i in members {
            let phase = &phases[i];
            let blocker = phase
                .dependencies()
                .iter()
                .find(|dep| !finished.get(dep.as_str()).is_some_and(|r| r.success));

            match blocker {
                Some(blocker) => {
                    log::warn!(
                        "Skipping phase {}: dependency {blocker} did not succeed",
                        phase.id
                    );
                    level_results.push((i, ExecutionResult::skipped(phase, blocker)));
                }
                None => {
                    progress.on_phase_start(&phase.id, phase.display_name());
                    runnable.push(i);
                }
            }
        }

        // Progress callbacks are not thread-safe; results are reported after the join
        let executed: Vec<(usize, Result<ExecutionResult>)> = pool.install(|| {
            runnable
                .par_iter()
                .map(|&i| (i, executor.execute(&phases[i], cancel)))
                .collect()
        });

        for (i, result) in executed {
            level_results.push((i, result?));
        }
        level_results.sort_by_key(|(i, _)| *i);

        for (i, result) in level_results {
            let id = phases[i].id.as_str();
            progress.on_phase_complete(id, &result);
            finished.insert(id, result);
        }
        progress.on_level_complete();
    }

    let mut report = RunReport::default();
    for id in order {
        if let Some(result) = finished.remove(id) {
            report.summary.add_result(&result);
            report.results.push(PhaseReport {
                phase: id.to_string(),
                result,
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AttemptOutcome, AttemptPolicy, NoProgress};
    use crate::types::PhaseStatus;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn phase(id: &str, config: Value) -> Phase {
        Phase::from_config(id, &config).unwrap()
    }

    /// Fails the named phases, records attempt start/end for the rest
    #[derive(Default)]
    struct Recorder {
        failing: Vec<String>,
        events: Mutex<Vec<String>>,
    }

    impl AttemptPolicy for Recorder {
        fn attempt(&self, phase: &Phase, _attempt: u32) -> AttemptOutcome {
            self.events.lock().unwrap().push(phase.id.clone());
            if self.failing.contains(&phase.id) {
                AttemptOutcome::Failed {
                    reason: "configured to fail".to_string(),
                }
            } else {
                AttemptOutcome::Succeeded
            }
        }
    }

    #[derive(Default)]
    struct Collect {
        levels: Vec<usize>,
        completed: Vec<String>,
    }

    impl ProgressCallback for Collect {
        fn on_level_start(&mut self, _level: usize, count: usize) {
            self.levels.push(count);
        }
        fn on_phase_start(&mut self, _id: &str, _name: &str) {}
        fn on_phase_complete(&mut self, id: &str, _result: &ExecutionResult) {
            self.completed.push(id.to_string());
        }
        fn on_level_complete(&mut self) {}
    }

    fn scenario() -> Vec<Phase> {
        vec![
            phase("preflight", json!({})),
            phase(
                "initialization",
                json!({"waitFor": {"dependsOn": "preflight", "timeout": "300ms"}}),
            ),
            phase("setup", json!({"waitFor": {"dependsOn": ["initialization"]}})),
            phase("lazy", json!({"instanceMode": "onUse"})),
        ]
    }

    #[test]
    fn test_runs_levels_in_order() {
        let mut progress = Collect::default();
        let report = execute_plan(
            &scenario(),
            &PhaseExecutor::default(),
            &ExecuteOptions::default(),
            &mut progress,
        )
        .unwrap();

        assert!(report.is_success());
        assert_eq!(report.summary.succeeded, 4);
        let order: Vec<_> = report.results.iter().map(|r| r.phase.as_str()).collect();
        assert_eq!(order, vec!["preflight", "initialization", "setup", "lazy"]);

        assert_eq!(progress.levels, vec![2, 1, 1]);
        assert_eq!(
            progress.completed,
            vec!["preflight", "lazy", "initialization", "setup"]
        );
    }

    #[test]
    fn test_dependents_of_failed_phase_are_skipped() {
        let recorder = Arc::new(Recorder {
            failing: vec!["initialization".to_string()],
            ..Default::default()
        });
        let executor = PhaseExecutor::default().with_policy(recorder.clone());
        let report = execute_plan(
            &scenario(),
            &executor,
            &ExecuteOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.get("initialization").unwrap().status, PhaseStatus::Failed);
        let setup = report.get("setup").unwrap();
        assert_eq!(setup.status, PhaseStatus::Skipped);
        assert_eq!(setup.attempts, 0);
        assert!(report.get("lazy").unwrap().success);
        assert!(!recorder.events.lock().unwrap().contains(&"setup".to_string()));

        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
    }

    #[test]
    fn test_skip_is_transitive() {
        let phases = vec![
            phase("a", json!({})),
            phase("b", json!({"waitFor": {"dependsOn": "a"}})),
            phase("c", json!({"waitFor": {"dependsOn": "b"}})),
        ];
        let executor = PhaseExecutor::default().with_policy(Arc::new(Recorder {
            failing: vec!["a".to_string()],
            ..Default::default()
        }));
        let report =
            execute_plan(&phases, &executor, &ExecuteOptions::default(), &mut NoProgress).unwrap();

        assert_eq!(report.get("b").unwrap().status, PhaseStatus::Skipped);
        let c = report.get("c").unwrap();
        assert_eq!(c.status, PhaseStatus::Skipped);
        assert_eq!(c.logs, vec!["Skipped: dependency b did not succeed".to_string()]);
    }

    #[test]
    fn test_validation_runs_before_any_phase() {
        let recorder = Arc::new(Recorder::default());
        let phases = vec![
            phase("ok", json!({})),
            phase("bad", json!({"waitFor": {"timeout": "soon"}})),
        ];
        let executor = PhaseExecutor::default().with_policy(recorder.clone());
        let err = execute_plan(&phases, &executor, &ExecuteOptions::default(), &mut NoProgress)
            .unwrap_err();

        assert!(matches!(err, Error::InvalidTimeout { .. }));
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_graph_errors_abort() {
        let phases = vec![phase("a", json!({"waitFor": {"dependsOn": "a"}}))];
        let err = execute_plan(
            &phases,
            &PhaseExecutor::default(),
            &ExecuteOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CircularDependency { .. }));
    }

    #[test]
    fn test_duplicate_phase_ids_abort() {
        let recorder = Arc::new(Recorder::default());
        let phases = vec![phase("a", json!({})), phase("a", json!({}))];
        let executor = PhaseExecutor::default().with_policy(recorder.clone());
        let err = execute_plan(&phases, &executor, &ExecuteOptions::default(), &mut NoProgress)
            .unwrap_err();

        assert!(matches!(err, Error::DuplicatePhase { .. }));
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_independent_phases_run_concurrently() {
        let phases: Vec<_> = (0..4)
            .map(|i| phase(&format!("p{i}"), json!({"waitFor": {"timeout": "200ms"}})))
            .collect();
        let options = ExecuteOptions {
            jobs: 4,
            timeout: None,
        };

        let start = Instant::now();
        let report =
            execute_plan(&phases, &PhaseExecutor::default(), &options, &mut NoProgress).unwrap();

        assert!(report.is_success());
        assert!(start.elapsed() < Duration::from_millis(700));
    }

    #[test]
    fn test_overall_timeout_reports_timed_out() {
        let phases = vec![
            phase("slow", json!({"waitFor": {"timeout": "1h"}})),
            phase("after", json!({"waitFor": {"dependsOn": "slow"}})),
        ];
        let options = ExecuteOptions {
            jobs: 2,
            timeout: Some(Duration::from_millis(50)),
        };

        let start = Instant::now();
        let report =
            execute_plan(&phases, &PhaseExecutor::default(), &options, &mut NoProgress).unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(report.get("slow").unwrap().status, PhaseStatus::TimedOut);
        assert_eq!(report.get("after").unwrap().status, PhaseStatus::Skipped);
        assert_eq!(report.summary.timed_out, 1);
    }
}
