use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{CompareOp, Expr, Span};
use crate::lattice::NullQualifier;

/// Nullness of one value at a program point, as far as local flow can tell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FlowFact {
    NonNull,
    /// Definitely null: a `null` literal flowed here directly.
    Null,
    Nullable,
    Unknown,
}

impl FlowFact {
    pub(crate) fn from_qualifier(qualifier: NullQualifier) -> FlowFact {
        match qualifier {
            NullQualifier::NonNull => FlowFact::NonNull,
            NullQualifier::Nullable => FlowFact::Nullable,
            NullQualifier::Unspecified => FlowFact::Unknown,
        }
    }

    pub(crate) fn join(self, other: FlowFact) -> FlowFact {
        if self == other { self } else { FlowFact::Unknown }
    }
}

/// Per-method flow state: facts about locals plus the set of locals whose
/// dereference was already reported (protected by previous dereference).
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct FlowState {
    facts: BTreeMap<String, FlowFact>,
    reported: BTreeSet<String>,
}

impl FlowState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fact(&self, name: &str) -> Option<FlowFact> {
        self.facts.get(name).copied()
    }

    pub(crate) fn set(&mut self, name: &str, fact: FlowFact) {
        self.facts.insert(name.to_string(), fact);
    }

    /// Record that a dereference of `name` was reported; later dereferences
    /// of the same value stay quiet, and the value is treated as non-null
    /// from here on (it did not throw).
    pub(crate) fn mark_reported(&mut self, name: &str) {
        self.reported.insert(name.to_string());
        self.set(name, FlowFact::NonNull);
    }

    pub(crate) fn is_protected(&self, name: &str) -> bool {
        self.reported.contains(name)
    }

    /// Merge two branch states: facts agree or degrade to unknown; the
    /// reported set intersects, so suppression only survives when both
    /// branches reported.
    pub(crate) fn join(&self, other: &FlowState) -> FlowState {
        let mut facts = BTreeMap::new();
        for (name, fact) in &self.facts {
            if let Some(other_fact) = other.facts.get(name) {
                facts.insert(name.clone(), fact.join(*other_fact));
            }
        }
        let reported = self
            .reported
            .intersection(&other.reported)
            .cloned()
            .collect();
        FlowState { facts, reported }
    }
}

/// A recognized `x == null` / `x != null` comparison.
#[derive(Clone, Debug)]
pub(crate) struct NullComparison<'a> {
    pub(crate) name: &'a str,
    pub(crate) op: CompareOp,
    pub(crate) span: Span,
}

/// Recognize a null comparison against a simple name, in either operand
/// order.
pub(crate) fn null_comparison(cond: &Expr) -> Option<NullComparison<'_>> {
    let Expr::Compare { left, op, right, span } = cond else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (Expr::Name { name, .. }, Expr::Null { .. })
        | (Expr::Null { .. }, Expr::Name { name, .. }) => Some(NullComparison {
            name,
            op: *op,
            span: *span,
        }),
        _ => None,
    }
}

/// Split a state along a null-check guard into (then, else) branch states.
pub(crate) fn apply_guard(state: &FlowState, comparison: &NullComparison<'_>) -> (FlowState, FlowState) {
    let mut then_state = state.clone();
    let mut else_state = state.clone();
    match comparison.op {
        CompareOp::Eq => {
            then_state.set(comparison.name, FlowFact::Null);
            else_state.set(comparison.name, FlowFact::NonNull);
        }
        CompareOp::Ne => {
            then_state.set(comparison.name, FlowFact::NonNull);
            else_state.set(comparison.name, FlowFact::Null);
        }
    }
    (then_state, else_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(value: &str) -> Expr {
        Expr::Name {
            name: value.to_string(),
            span: Span::default(),
        }
    }

    fn compare(left: Expr, op: CompareOp, right: Expr) -> Expr {
        Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
            span: Span::new(4, 0, 0),
        }
    }

    #[test]
    fn eq_guard_refines_both_branches() {
        let mut state = FlowState::new();
        state.set("s", FlowFact::Nullable);
        let cond = compare(name("s"), CompareOp::Eq, Expr::Null { span: Span::default() });
        let comparison = null_comparison(&cond).expect("null comparison");
        let (then_state, else_state) = apply_guard(&state, &comparison);
        assert_eq!(then_state.fact("s"), Some(FlowFact::Null));
        assert_eq!(else_state.fact("s"), Some(FlowFact::NonNull));
    }

    #[test]
    fn ne_guard_refines_inverted() {
        let state = FlowState::new();
        let cond = compare(Expr::Null { span: Span::default() }, CompareOp::Ne, name("s"));
        let comparison = null_comparison(&cond).expect("null comparison");
        let (then_state, else_state) = apply_guard(&state, &comparison);
        assert_eq!(then_state.fact("s"), Some(FlowFact::NonNull));
        assert_eq!(else_state.fact("s"), Some(FlowFact::Null));
    }

    #[test]
    fn non_null_comparisons_are_not_recognized() {
        let cond = compare(name("a"), CompareOp::Eq, name("b"));
        assert!(null_comparison(&cond).is_none());
        assert!(null_comparison(&name("a")).is_none());
    }

    #[test]
    fn join_degrades_disagreeing_facts() {
        let mut left = FlowState::new();
        left.set("s", FlowFact::NonNull);
        left.set("t", FlowFact::Null);
        let mut right = FlowState::new();
        right.set("s", FlowFact::NonNull);
        right.set("t", FlowFact::NonNull);
        let joined = left.join(&right);
        assert_eq!(joined.fact("s"), Some(FlowFact::NonNull));
        assert_eq!(joined.fact("t"), Some(FlowFact::Unknown));
    }

    #[test]
    fn reported_dereference_protects_and_promotes() {
        let mut state = FlowState::new();
        state.set("s", FlowFact::Nullable);
        assert!(!state.is_protected("s"));
        state.mark_reported("s");
        assert!(state.is_protected("s"));
        assert_eq!(state.fact("s"), Some(FlowFact::NonNull));
    }

    #[test]
    fn join_intersects_reported_sets() {
        let mut left = FlowState::new();
        left.set("s", FlowFact::Nullable);
        left.mark_reported("s");
        let mut right = FlowState::new();
        right.set("s", FlowFact::Nullable);
        let joined = left.join(&right);
        assert!(!joined.is_protected("s"));
    }
}
