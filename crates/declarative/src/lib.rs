//! # Declarative
//!
//! A framework for declarative, multi-phase execution plans.
//!
//! A plan is a set of named phases. Each phase carries a label selector,
//! dependencies on other phases, a wait timeout, a retry budget and
//! success/failure handlers. This crate normalises plans, orders their
//! phases, diffs them against recorded state and drives their execution.
//!
//! ## Core Concepts
//!
//! - **Plan**: normalised form of one of the accepted manifest shapes ([`render`])
//! - **Resolver**: depth-first topological order with cycle detection ([`resolver`])
//! - **Reconciler**: add/update/delete diffs between resource collections ([`reconcile`])
//! - **PhaseExecutor**: wait, retry and handler dispatch as an explicit state machine ([`executor`])
//! - **Scheduler**: runs independent phases of a dependency level in parallel ([`scheduler`])
//!
//! ## Example
//!
//! ```
//! use declarative::{ExecuteOptions, NoProgress, PhaseExecutor, Plan, execute_plan};
//! use serde_json::json;
//!
//! let plan = Plan::from_manifest(&json!({
//!     "plan": {
//!         "build": {},
//!         "deploy": {"waitFor": {"dependsOn": "build"}, "retry": {"maxAttempts": 3}}
//!     }
//! }))?;
//!
//! let phases: Vec<_> = plan.ordered(None)?.into_iter().cloned().collect();
//! let report = execute_plan(
//!     &phases,
//!     &PhaseExecutor::default(),
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//! )?;
//! assert!(report.is_success());
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`AttemptPolicy`]: performs the work behind an attempt
//! - [`NotificationSink`]: delivers handler notifications
//! - [`ProgressCallback`]: receives progress updates
//! - [`StateStore`]: loads and saves the last-applied resources
//!
//! This allows the crate to be used without hard dependencies on
//! specific transports, storage backends or UI frameworks.

pub mod cancel;
pub mod context;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod render;
pub mod resolver;
pub mod scheduler;
pub mod selector;
pub mod types;

// Re-export main types at crate root
pub use cancel::{CancelToken, Cancelled};
pub use context::{
    AlwaysSucceed, AttemptOutcome, AttemptPolicy, LogNotifier, NoProgress, NotificationSink,
    ProgressCallback, StateStore,
};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{PhaseExecutor, PhaseState};
pub use reconcile::{
    AppliedAction, ApplyOptions, ApplyReport, Change, Diff, DiffSummary, Reconciler, Update,
    compute_diff,
};
pub use render::{Manifest, Plan};
pub use resolver::{levels, resolve_order};
pub use scheduler::{PhaseReport, RunReport, execute_plan, execute_plan_with_token};
pub use types::{
    ExecuteOptions, ExecuteSummary, ExecutionResult, Handler, InstanceMode, Labels, Phase,
    PhaseSpec, PhaseStatus, Resource, ResourceKey, Retry, Selector, WaitFor, parse_timeout,
};
