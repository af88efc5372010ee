//! Percentage normalization for the split step.
//!
//! Two policies live here, one per caller:
//!
//! - [`normalize_after_edit`] runs when a source edit settles. It repairs the sum
//!   to exactly 100 while keeping the numbers the user actually typed.
//! - [`redistribute_slider`] runs on every slider move in the form. It pushes the
//!   change onto neighbouring splits and tolerates a temporarily invalid sum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::steps::split::{SplitName, SplitParams};

const FULL: i64 = 100;

/// Percentages for the active splits, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub percentages: BTreeMap<SplitName, u32>,
    pub order: Vec<SplitName>,
    pub include_validation: bool,
}

impl SplitPlan {
    pub fn from_params(params: &SplitParams) -> Self {
        let percentages = SplitName::ALL
            .iter()
            .map(|n| (*n, params.percent(*n)))
            .collect();
        Self {
            percentages,
            order: params.active_order(),
            include_validation: params.include_validation,
        }
    }

    /// Write the percentages back onto `params`.
    pub fn apply_to(&self, params: &mut SplitParams) {
        for (name, value) in &self.percentages {
            params.set_percent(*name, *value);
        }
    }

    pub fn percent(&self, name: SplitName) -> u32 {
        self.percentages.get(&name).copied().unwrap_or(0)
    }

    /// Sum over the active splits only.
    pub fn total(&self) -> u32 {
        self.order.iter().map(|n| self.percent(*n)).sum()
    }

    /// A plan can be executed only when its active splits add up to 100.
    pub fn is_valid(&self) -> bool {
        !self.order.is_empty() && self.total() == 100
    }

    fn get(&self, name: SplitName) -> i64 {
        i64::from(self.percent(name))
    }

    fn set(&mut self, name: SplitName, value: i64) {
        let clamped = value.clamp(0, FULL);
        self.percentages.insert(name, clamped as u32);
    }
}

/// Repair the plan parsed from edited source so it sums to exactly 100.
///
/// Values are clamped to `[0, 100]`. A split counts as touched when its value
/// differs from `before` (or it was not active there). The whole discrepancy goes
/// to the first untouched split in order; whatever that split cannot absorb
/// without leaving `[0, 100]` moves on to the next untouched split, then to the
/// touched ones. When every split was touched the first split in order absorbs it.
pub fn normalize_after_edit(parsed: &SplitPlan, before: &SplitPlan) -> SplitPlan {
    let mut plan = parsed.clone();
    if plan.order.is_empty() {
        return plan;
    }
    let order = plan.order.clone();
    for name in &order {
        let value = plan.get(*name);
        plan.set(*name, value);
    }

    let sum: i64 = order.iter().map(|n| plan.get(*n)).sum();
    let mut remaining = FULL - sum;
    if remaining == 0 {
        return plan;
    }

    let is_touched =
        |name: &SplitName| !before.order.contains(name) || before.percent(*name) != plan.percent(*name);
    let (touched, untouched): (Vec<SplitName>, Vec<SplitName>) =
        order.iter().copied().partition(|n| is_touched(n));

    let mut absorbers = 0;
    for name in untouched.into_iter().chain(touched) {
        if remaining == 0 {
            break;
        }
        let current = plan.get(name);
        let next = (current + remaining).clamp(0, FULL);
        remaining -= next - current;
        plan.set(name, next);
        absorbers += 1;
    }

    if absorbers > 1 {
        tracing::debug!(
            absorbers,
            total = plan.total(),
            "split discrepancy spilled past the first absorbing split"
        );
    }
    plan
}

/// Apply a slider move to `changed`, taking the difference from the splits to its
/// right first and then from the splits to its left.
///
/// A neighbour gives (or receives) at most its own current value. Anything left
/// over stays unresolved, so the plan may be invalid afterwards.
pub fn redistribute_slider(plan: &SplitPlan, changed: SplitName, new_value: u32) -> SplitPlan {
    let mut out = plan.clone();
    let new_value = i64::from(new_value.min(100));
    let delta = new_value - out.get(changed);
    out.set(changed, new_value);
    if delta == 0 {
        return out;
    }

    let order = out.order.clone();
    let (right, left): (Vec<SplitName>, Vec<SplitName>) = match order.iter().position(|n| *n == changed) {
        Some(idx) => (
            order[idx + 1..].to_vec(),
            order[..idx].iter().rev().copied().collect(),
        ),
        None => (order.clone(), Vec::new()),
    };

    let mut remaining = delta;
    for name in right.into_iter().chain(left) {
        if remaining == 0 {
            break;
        }
        let available = out.get(name);
        let take = available.min(remaining.abs()) * remaining.signum();
        out.set(name, available - take);
        remaining -= take;
    }
    out
}
