use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::lattice::NullQualifier;

/// Analysis configuration: annotation-name aliases plus severity toggles.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AnalysisConfig {
    /// Annotation simple or qualified names treated as `@NonNull`.
    pub(crate) nonnull_annotations: Vec<String>,
    /// Annotation simple or qualified names treated as `@Nullable`.
    pub(crate) nullable_annotations: Vec<String>,
    /// Report potential null dereferences as errors rather than warnings.
    pub(crate) potential_null_is_error: bool,
    /// Let `assert expr != null;` refine flow facts.
    pub(crate) include_asserts: bool,
    /// Tolerate overriding methods that drop an inherited parameter
    /// annotation instead of repeating it.
    pub(crate) tolerate_dropped_parameter_annotations: bool,
    /// Report annotations that restate the effective default of their scope.
    pub(crate) report_redundant_annotations: bool,
    /// Report redundant null checks as errors rather than warnings.
    pub(crate) redundant_check_is_error: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            nonnull_annotations: vec![
                "NonNull".to_string(),
                "org.eclipse.jdt.annotation.NonNull".to_string(),
                "org.jspecify.annotations.NonNull".to_string(),
            ],
            nullable_annotations: vec![
                "Nullable".to_string(),
                "org.eclipse.jdt.annotation.Nullable".to_string(),
                "org.jspecify.annotations.Nullable".to_string(),
            ],
            potential_null_is_error: true,
            include_asserts: false,
            tolerate_dropped_parameter_annotations: false,
            report_redundant_annotations: true,
            redundant_check_is_error: true,
        }
    }
}

impl AnalysisConfig {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let deserializer = &mut serde_json::Deserializer::from_str(&contents);
        let config: AnalysisConfig = serde_path_to_error::deserialize(deserializer)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Rewrite an annotation reference to its canonical qualifier tag.
    /// Unrecognized annotations are not nullness annotations at all.
    pub(crate) fn classify(&self, annotation_name: &str) -> Option<NullQualifier> {
        if self.matches(&self.nonnull_annotations, annotation_name) {
            return Some(NullQualifier::NonNull);
        }
        if self.matches(&self.nullable_annotations, annotation_name) {
            return Some(NullQualifier::Nullable);
        }
        None
    }

    fn matches(&self, names: &[String], annotation_name: &str) -> bool {
        names.iter().any(|name| {
            name == annotation_name
                || name
                    .rsplit('.')
                    .next()
                    .is_some_and(|simple| simple == annotation_name)
                || annotation_name
                    .rsplit('.')
                    .next()
                    .is_some_and(|simple| simple == name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_classify() {
        let config = AnalysisConfig::default();
        assert_eq!(config.classify("NonNull"), Some(NullQualifier::NonNull));
        assert_eq!(config.classify("Nullable"), Some(NullQualifier::Nullable));
        assert_eq!(
            config.classify("org.eclipse.jdt.annotation.NonNull"),
            Some(NullQualifier::NonNull)
        );
        assert_eq!(config.classify("Override"), None);
    }

    #[test]
    fn custom_alias_classifies_like_builtin() {
        let mut config = AnalysisConfig::default();
        config
            .nonnull_annotations
            .push("com.example.Required".to_string());
        assert_eq!(
            config.classify("com.example.Required"),
            Some(NullQualifier::NonNull)
        );
        assert_eq!(config.classify("Required"), Some(NullQualifier::NonNull));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AnalysisConfig::default();
        let json = serde_json::to_string(&config).expect("serialize config");
        let parsed: AnalysisConfig = serde_json::from_str(&json).expect("parse config");
        assert_eq!(parsed.nonnull_annotations, config.nonnull_annotations);
        assert_eq!(
            parsed.potential_null_is_error,
            config.potential_null_is_error
        );
    }

    #[test]
    fn empty_json_uses_defaults() {
        let parsed: AnalysisConfig = serde_json::from_str("{}").expect("parse empty config");
        assert!(parsed.potential_null_is_error);
        assert!(!parsed.include_asserts);
    }
}
