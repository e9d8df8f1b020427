use std::fmt;

use serde::{Deserialize, Serialize};

/// Nullness qualifier attached to one structural type position.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub(crate) enum NullQualifier {
    NonNull,
    Nullable,
    #[default]
    Unspecified,
}

impl NullQualifier {
    pub(crate) fn is_explicit(self) -> bool {
        self != NullQualifier::Unspecified
    }

    /// Prefix used by the canonical type renderer, including a trailing
    /// space; empty for unspecified positions.
    pub(crate) fn prefix(self) -> &'static str {
        match self {
            NullQualifier::NonNull => "@NonNull ",
            NullQualifier::Nullable => "@Nullable ",
            NullQualifier::Unspecified => "",
        }
    }
}

impl fmt::Display for NullQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullQualifier::NonNull => write!(f, "@NonNull"),
            NullQualifier::Nullable => write!(f, "@Nullable"),
            NullQualifier::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Merge a locally written qualifier with one inherited from an enclosing
/// scope. An explicit local annotation always wins over the inherited
/// default; contradictions between two explicit annotations never reach this
/// function (the builder reports them before combining).
pub(crate) fn combine(local: NullQualifier, inherited: NullQualifier) -> NullQualifier {
    if local.is_explicit() { local } else { inherited }
}

/// Pick the stronger of two qualifiers: the one less likely to admit null.
/// Used when merging inherited return contracts.
pub(crate) fn stronger(a: NullQualifier, b: NullQualifier) -> NullQualifier {
    if a == NullQualifier::NonNull || b == NullQualifier::NonNull {
        return NullQualifier::NonNull;
    }
    if a == NullQualifier::Unspecified || b == NullQualifier::Unspecified {
        return NullQualifier::Unspecified;
    }
    NullQualifier::Nullable
}

/// Pick the weaker of two qualifiers: the one admitting the most values.
/// Used when merging inherited parameter contracts.
pub(crate) fn weaker(a: NullQualifier, b: NullQualifier) -> NullQualifier {
    if a == NullQualifier::Nullable || b == NullQualifier::Nullable {
        return NullQualifier::Nullable;
    }
    if a == NullQualifier::Unspecified || b == NullQualifier::Unspecified {
        return NullQualifier::Unspecified;
    }
    NullQualifier::NonNull
}
