//! Planning and applying slot count changes across all scopes.

use std::ops::RangeInclusive;

use serde::Serialize;
use tracing::{error, info, warn};

use super::{
    error::{CustomVarsError, Result},
    schema::{SchemaInspector, SlotRegistry},
    scope::Scope,
    slot::DEFAULT_SLOT_COUNT,
};

/// Schema mutations for one scope. Implementations must serialize calls
/// against each other.
pub trait SlotProvisioner {
    /// Adds a slot at `highest + 1` and returns its index.
    fn add_slot(&self, scope: Scope) -> Result<u32>;

    /// Drops the highest slot; `None` when the scope has none left.
    fn remove_slot(&self, scope: Scope) -> Result<Option<u32>>;
}

impl<T: SlotProvisioner + ?Sized> SlotProvisioner for &T {
    fn add_slot(&self, scope: Scope) -> Result<u32> {
        (**self).add_slot(scope)
    }

    fn remove_slot(&self, scope: Scope) -> Result<Option<u32>> {
        (**self).remove_slot(scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotChangeKind {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopePlan {
    pub scope: Scope,
    pub current_count: u32,
    pub highest_index: u32,
    pub kind: Option<SlotChangeKind>,
    pub changes: u32,
}

impl ScopePlan {
    /// Indexes that will be created or dropped.
    pub fn affected_indexes(&self) -> Option<RangeInclusive<u32>> {
        match self.kind? {
            SlotChangeKind::Add => Some(self.highest_index + 1..=self.highest_index + self.changes),
            SlotChangeKind::Remove => {
                Some(self.highest_index + 1 - self.changes..=self.highest_index)
            }
        }
    }

    pub fn describe(&self) -> Option<String> {
        let range = self.affected_indexes()?;
        let indexes = if range.start() == range.end() {
            range.start().to_string()
        } else {
            format!("{} - {}", range.start(), range.end())
        };
        Some(match self.kind? {
            SlotChangeKind::Add => format!(
                "{} new custom variables having the index(es) {} will be ADDED",
                self.changes, indexes
            ),
            SlotChangeKind::Remove => format!(
                "{} existing custom variables having the index(es) {} will be REMOVED.",
                self.changes, indexes
            ),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPlan {
    pub target: u32,
    pub scopes: Vec<ScopePlan>,
}

impl SlotPlan {
    pub fn total_changes(&self) -> u32 {
        self.scopes.iter().map(|scope| scope.changes).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.total_changes() == 0
    }
}

/// A single slot add or remove that went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    pub scope: Scope,
    pub kind: SlotChangeKind,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedChange {
    pub scope: Scope,
    pub kind: SlotChangeKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub applied: Vec<AppliedChange>,
    pub failed: Vec<FailedChange>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Rejects targets below the default slot count.
pub fn validate_target(target: u32) -> Result<u32> {
    if target < DEFAULT_SLOT_COUNT {
        return Err(CustomVarsError::InvalidSlotCount(format!(
            "there has to be at least {DEFAULT_SLOT_COUNT} custom variables, got {target}"
        )));
    }
    Ok(target)
}

pub fn plan_slot_changes<I: SchemaInspector>(
    registry: &SlotRegistry<I>,
    target: u32,
) -> Result<SlotPlan> {
    let target = validate_target(target)?;
    let mut scopes = Vec::with_capacity(Scope::ALL.len());
    for scope in Scope::ALL {
        let slots = registry.slots(scope)?;
        let current_count = slots.count() as u32;
        let kind = match target.cmp(&current_count) {
            std::cmp::Ordering::Greater => Some(SlotChangeKind::Add),
            std::cmp::Ordering::Less => Some(SlotChangeKind::Remove),
            std::cmp::Ordering::Equal => None,
        };
        scopes.push(ScopePlan {
            scope,
            current_count,
            highest_index: slots.highest(),
            kind,
            changes: target.abs_diff(current_count),
        });
    }
    Ok(SlotPlan { target, scopes })
}

/// Applies every change of `plan`. A failed step is logged and recorded, and
/// the remaining steps still run.
pub fn apply_plan<P, F>(provisioner: &P, plan: &SlotPlan, mut on_change: F) -> ApplyOutcome
where
    P: SlotProvisioner + ?Sized,
    F: FnMut(&AppliedChange),
{
    let mut outcome = ApplyOutcome::default();
    for scope_plan in &plan.scopes {
        let Some(kind) = scope_plan.kind else {
            continue;
        };
        for _ in 0..scope_plan.changes {
            let result = match kind {
                SlotChangeKind::Add => provisioner.add_slot(scope_plan.scope).map(Some),
                SlotChangeKind::Remove => provisioner.remove_slot(scope_plan.scope),
            };
            match result {
                Ok(Some(index)) => {
                    let change = AppliedChange {
                        scope: scope_plan.scope,
                        kind,
                        index,
                    };
                    info!(scope = %change.scope, index, ?kind, "custom variable slot changed");
                    on_change(&change);
                    outcome.applied.push(change);
                }
                Ok(None) => {
                    warn!(scope = %scope_plan.scope, "no custom variable slot left to remove");
                    outcome.failed.push(FailedChange {
                        scope: scope_plan.scope,
                        kind,
                        message: "no slot left to remove".to_string(),
                    });
                }
                Err(err) => {
                    error!(scope = %scope_plan.scope, ?kind, "failed to change custom variable slot: {err}");
                    outcome.failed.push(FailedChange {
                        scope: scope_plan.scope,
                        kind,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
    outcome
}

/// Tops every scope up to the default slot count. Never removes slots.
/// A scope that fails is logged and the next scope is still processed.
pub fn install_default_slots<I, P>(registry: &SlotRegistry<I>, provisioner: &P) -> ApplyOutcome
where
    I: SchemaInspector,
    P: SlotProvisioner + ?Sized,
{
    let mut outcome = ApplyOutcome::default();
    for scope in Scope::ALL {
        let missing = match registry.slot_count(scope) {
            Ok(count) => DEFAULT_SLOT_COUNT.saturating_sub(count as u32),
            Err(err) => {
                error!(%scope, "failed to inspect custom variable slots: {err}");
                outcome.failed.push(FailedChange {
                    scope,
                    kind: SlotChangeKind::Add,
                    message: err.to_string(),
                });
                continue;
            }
        };
        for _ in 0..missing {
            match provisioner.add_slot(scope) {
                Ok(index) => outcome.applied.push(AppliedChange {
                    scope,
                    kind: SlotChangeKind::Add,
                    index,
                }),
                Err(err) => {
                    error!(%scope, "failed to add custom variable: {err}");
                    outcome.failed.push(FailedChange {
                        scope,
                        kind: SlotChangeKind::Add,
                        message: err.to_string(),
                    });
                    break;
                }
            }
        }
    }
    outcome
}

/// Drops every slot of every scope, highest index first.
pub fn remove_all_slots<P: SlotProvisioner + ?Sized>(provisioner: &P) -> Result<Vec<AppliedChange>> {
    let mut removed = Vec::new();
    for scope in Scope::ALL {
        while let Some(index) = provisioner.remove_slot(scope)? {
            removed.push(AppliedChange {
                scope,
                kind: SlotChangeKind::Remove,
                index,
            });
        }
    }
    Ok(removed)
}
