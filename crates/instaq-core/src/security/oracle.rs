//! The access oracle seam and memoized decisions.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::error::{AccessError, AccessResult};
use instaq_proto::Instance;

/// Answers "may the current caller view this instance".
///
/// Implementations must be side-effect free and give the same answer for the
/// same instance within one evaluation.
pub trait AccessOracle {
    /// Decide whether `instance` is visible.
    fn is_allowed(&self, instance: &Instance) -> AccessResult<bool>;
}

impl<F> AccessOracle for F
where
    F: Fn(&Instance) -> bool,
{
    fn is_allowed(&self, instance: &Instance) -> AccessResult<bool> {
        Ok(self(instance))
    }
}

/// Oracle that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessOracle for AllowAll {
    fn is_allowed(&self, _instance: &Instance) -> AccessResult<bool> {
        Ok(true)
    }
}

/// Oracle that denies a fixed set of instances and allows the rest.
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    denied: HashSet<Instance>,
}

impl DenyList {
    /// Create an empty deny list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny an instance.
    pub fn deny(mut self, instance: Instance) -> Self {
        self.denied.insert(instance);
        self
    }
}

impl FromIterator<Instance> for DenyList {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        Self {
            denied: iter.into_iter().collect(),
        }
    }
}

impl AccessOracle for DenyList {
    fn is_allowed(&self, instance: &Instance) -> AccessResult<bool> {
        Ok(!self.denied.contains(instance))
    }
}

/// Per-instance access decisions for one evaluation.
///
/// Each instance is put to the oracle at most once. A failing oracle counts as
/// a denial.
#[derive(Debug, Clone, Default)]
pub struct AccessDecisions {
    decisions: HashMap<Instance, bool>,
    failures: usize,
}

impl AccessDecisions {
    /// Create an empty decision table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide `instance`, asking `oracle` only the first time.
    pub fn check(&mut self, oracle: &dyn AccessOracle, instance: &Instance) -> bool {
        if let Some(&allowed) = self.decisions.get(instance) {
            return allowed;
        }
        let allowed = match oracle.is_allowed(instance) {
            Ok(allowed) => allowed,
            Err(err) => {
                warn!(instance = %instance, error = %err, "access check failed, denying");
                self.failures += 1;
                false
            }
        };
        self.decisions.insert(instance.clone(), allowed);
        allowed
    }

    /// A recorded decision; instances never checked are denied.
    pub fn is_allowed(&self, instance: &Instance) -> bool {
        self.decisions.get(instance).copied().unwrap_or(false)
    }

    /// Check whether `instance` was decided.
    pub fn is_decided(&self, instance: &Instance) -> bool {
        self.decisions.contains_key(instance)
    }

    /// Instances that were denied, in no particular order.
    pub fn denied(&self) -> impl Iterator<Item = &Instance> {
        self.decisions
            .iter()
            .filter(|(_, allowed)| !**allowed)
            .map(|(instance, _)| instance)
    }

    /// Number of oracle calls that failed.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Number of decided instances.
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// Check if nothing was decided.
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Oracle whose every call fails.
#[derive(Debug, Clone, Default)]
pub struct FailingOracle {
    message: String,
}

impl FailingOracle {
    /// Create an oracle failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl AccessOracle for FailingOracle {
    fn is_allowed(&self, _instance: &Instance) -> AccessResult<bool> {
        Err(AccessError::Oracle(self.message.clone()))
    }
}
