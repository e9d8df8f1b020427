use anyhow::Result;

use crate::diagnostics::Diagnostic;
use crate::engine::AnalysisContext;

pub(crate) mod support;

// Check modules are auto-discovered by build.rs — do not edit manually.
include!(concat!(env!("OUT_DIR"), "/check_modules.rs"));

/// Metadata describing an analysis check.
#[derive(Clone, Debug)]
pub(crate) struct CheckMetadata {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
}

/// Check interface for analysis execution.
pub(crate) trait Check {
    fn metadata(&self) -> CheckMetadata;
    fn run(&self, context: &AnalysisContext) -> Result<Vec<Diagnostic>>;
}

/// Wrapper struct for check factory functions to enable inventory collection.
pub(crate) struct CheckFactory(pub fn() -> Box<dyn Check + Sync>);

inventory::collect!(CheckFactory);

/// Macro to register a check implementation.
///
/// Usage: `register_check!(CheckName);`
/// This macro creates a factory function and registers it with inventory.
#[macro_export]
macro_rules! register_check {
    ($check_type:ty) => {
        inventory::submit! {
            $crate::checks::CheckFactory(|| Box::new(<$check_type>::default()))
        }
    };
}

/// Returns all registered checks as boxed trait objects.
pub(crate) fn all_checks() -> Vec<Box<dyn Check + Sync>> {
    inventory::iter::<CheckFactory>
        .into_iter()
        .map(|factory| (factory.0)())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_checks_have_unique_ids() {
        let checks = all_checks();
        assert!(!checks.is_empty(), "At least one check must be registered");

        let mut ids: Vec<_> = checks.iter().map(|c| c.metadata().id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total, "Check IDs must be unique");
    }

    #[test]
    fn all_checks_have_non_empty_metadata() {
        for check in all_checks() {
            let meta = check.metadata();
            assert!(!meta.id.is_empty(), "Check ID must not be empty");
            assert!(!meta.name.is_empty(), "Check name must not be empty");
            assert!(
                !meta.description.is_empty(),
                "Check description must not be empty"
            );
        }
    }
}
