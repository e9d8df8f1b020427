use serde_sarif::sarif::{
    ArtifactLocation, Location, LogicalLocation, Message, MultiformatMessageString,
    PhysicalLocation, Region, ReportingDescriptor, Result as SarifResult, ResultLevel,
};

use crate::ir::Span;
use crate::lattice::NullQualifier;

/// Fixed set of findings the checker can produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum DiagnosticKind {
    ContradictoryAnnotation,
    ContradictoryInferredAnnotation,
    IllegalAnnotationLocation,
    MalformedArrayAnnotation,
    NullConstraintMismatch,
    NullTypeMismatch,
    OverrideNullnessIncompatible,
    PotentialNullPointerAccess,
    RawTypeUsage,
    RedundantAnnotation,
    RedundantNullCheck,
    UncheckedNullConversion,
}

impl DiagnosticKind {
    pub(crate) const ALL: [DiagnosticKind; 12] = [
        DiagnosticKind::ContradictoryAnnotation,
        DiagnosticKind::ContradictoryInferredAnnotation,
        DiagnosticKind::IllegalAnnotationLocation,
        DiagnosticKind::MalformedArrayAnnotation,
        DiagnosticKind::NullConstraintMismatch,
        DiagnosticKind::NullTypeMismatch,
        DiagnosticKind::OverrideNullnessIncompatible,
        DiagnosticKind::PotentialNullPointerAccess,
        DiagnosticKind::RawTypeUsage,
        DiagnosticKind::RedundantAnnotation,
        DiagnosticKind::RedundantNullCheck,
        DiagnosticKind::UncheckedNullConversion,
    ];

    pub(crate) fn id(self) -> &'static str {
        match self {
            DiagnosticKind::ContradictoryAnnotation => "CONTRADICTORY_ANNOTATION",
            DiagnosticKind::ContradictoryInferredAnnotation => "CONTRADICTORY_INFERRED_ANNOTATION",
            DiagnosticKind::IllegalAnnotationLocation => "ILLEGAL_ANNOTATION_LOCATION",
            DiagnosticKind::MalformedArrayAnnotation => "MALFORMED_ARRAY_ANNOTATION",
            DiagnosticKind::NullConstraintMismatch => "NULL_CONSTRAINT_MISMATCH",
            DiagnosticKind::NullTypeMismatch => "NULL_TYPE_MISMATCH",
            DiagnosticKind::OverrideNullnessIncompatible => "OVERRIDE_NULLNESS_INCOMPATIBLE",
            DiagnosticKind::PotentialNullPointerAccess => "POTENTIAL_NULL_ACCESS",
            DiagnosticKind::RawTypeUsage => "RAW_TYPE_USAGE",
            DiagnosticKind::RedundantAnnotation => "REDUNDANT_ANNOTATION",
            DiagnosticKind::RedundantNullCheck => "REDUNDANT_NULL_CHECK",
            DiagnosticKind::UncheckedNullConversion => "UNCHECKED_NULL_CONVERSION",
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            DiagnosticKind::ContradictoryAnnotation => "Contradictory null annotations",
            DiagnosticKind::ContradictoryInferredAnnotation => {
                "Contradictory inferred null annotations"
            }
            DiagnosticKind::IllegalAnnotationLocation => "Illegal annotation location",
            DiagnosticKind::MalformedArrayAnnotation => "Malformed array annotation",
            DiagnosticKind::NullConstraintMismatch => "Null constraint mismatch",
            DiagnosticKind::NullTypeMismatch => "Null type mismatch",
            DiagnosticKind::OverrideNullnessIncompatible => "Incompatible override nullness",
            DiagnosticKind::PotentialNullPointerAccess => "Potential null pointer access",
            DiagnosticKind::RawTypeUsage => "Raw type usage",
            DiagnosticKind::RedundantAnnotation => "Redundant nullness annotation",
            DiagnosticKind::RedundantNullCheck => "Redundant null check",
            DiagnosticKind::UncheckedNullConversion => "Unchecked null conversion",
        }
    }

    pub(crate) fn description(self) -> &'static str {
        match self {
            DiagnosticKind::ContradictoryAnnotation => {
                "Both @NonNull and @Nullable specified at one structural position"
            }
            DiagnosticKind::ContradictoryInferredAnnotation => {
                "Inference combined @NonNull and @Nullable for one occurrence"
            }
            DiagnosticKind::IllegalAnnotationLocation => {
                "Nullness annotation at a structurally disallowed position"
            }
            DiagnosticKind::MalformedArrayAnnotation => {
                "Array dimension annotations do not match the declared brackets"
            }
            DiagnosticKind::NullConstraintMismatch => {
                "Generic substitution violates a declared type-variable nullness bound"
            }
            DiagnosticKind::NullTypeMismatch => {
                "Definite incompatibility between required and provided nullness"
            }
            DiagnosticKind::OverrideNullnessIncompatible => {
                "Override relaxes parameter nullness or narrows return nullness"
            }
            DiagnosticKind::PotentialNullPointerAccess => {
                "Dereference of a possibly-null expression without a guard"
            }
            DiagnosticKind::RawTypeUsage => {
                "Raw use of a generic type strips type-argument nullness"
            }
            DiagnosticKind::RedundantAnnotation => {
                "Annotation restates the effective default of its scope"
            }
            DiagnosticKind::RedundantNullCheck => {
                "Null check against an expression that is statically @NonNull"
            }
            DiagnosticKind::UncheckedNullConversion => {
                "Conversion from unspecified to annotated nullness"
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn sarif_level(self) -> ResultLevel {
        match self {
            Severity::Error => ResultLevel::Error,
            Severity::Warning => ResultLevel::Warning,
        }
    }
}

/// One checker finding, ordered by source position for emission.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Diagnostic {
    pub(crate) kind: DiagnosticKind,
    pub(crate) severity: Severity,
    pub(crate) unit_path: String,
    /// Logical owner, e.g. `com.example.Sample.value()`.
    pub(crate) logical: String,
    pub(crate) span: Span,
    pub(crate) message: String,
    pub(crate) required: Option<String>,
    pub(crate) provided: Option<String>,
}

impl Diagnostic {
    pub(crate) fn new(
        kind: DiagnosticKind,
        severity: Severity,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            unit_path: String::new(),
            logical: String::new(),
            span,
            message: message.into(),
            required: None,
            provided: None,
        }
    }

    pub(crate) fn with_types(mut self, required: impl Into<String>, provided: impl Into<String>) -> Self {
        self.required = Some(required.into());
        self.provided = Some(provided.into());
        self
    }

    pub(crate) fn with_required(mut self, required: impl Into<String>) -> Self {
        self.required = Some(required.into());
        self
    }

    pub(crate) fn at(mut self, unit_path: &str, logical: impl Into<String>) -> Self {
        self.unit_path = unit_path.to_string();
        self.logical = logical.into();
        self
    }

    /// Key used to restore per-unit source order after parallel checking.
    pub(crate) fn sort_key(&self) -> (String, Span, &'static str, String) {
        (
            self.unit_path.clone(),
            self.span,
            self.kind.id(),
            self.message.clone(),
        )
    }

    pub(crate) fn to_sarif(&self) -> SarifResult {
        let logical = LogicalLocation::builder()
            .name(self.logical.clone())
            .kind("member")
            .build();
        let artifact_location = ArtifactLocation::builder()
            .uri(self.unit_path.clone())
            .build();
        let physical = if self.span.line > 0 {
            let region = Region::builder().start_line(self.span.line as i64).build();
            PhysicalLocation::builder()
                .artifact_location(artifact_location)
                .region(region)
                .build()
        } else {
            PhysicalLocation::builder()
                .artifact_location(artifact_location)
                .build()
        };
        let location = Location::builder()
            .logical_locations(vec![logical])
            .physical_location(physical)
            .build();
        let mut result = SarifResult::builder()
            .rule_id(self.kind.id())
            .level(self.severity.sarif_level())
            .message(Message::builder().text(self.message.clone()).build())
            .locations(vec![location])
            .build();
        let mut properties = std::collections::BTreeMap::new();
        if let Some(required) = &self.required {
            properties.insert(
                "nullspect.required_type".to_string(),
                serde_json::json!(required),
            );
        }
        if let Some(provided) = &self.provided {
            properties.insert(
                "nullspect.provided_type".to_string(),
                serde_json::json!(provided),
            );
        }
        if !properties.is_empty() {
            result.properties = Some(
                serde_sarif::sarif::PropertyBag::builder()
                    .additional_properties(properties)
                    .build(),
            );
        }
        result
    }
}

/// SARIF reporting descriptors for every diagnostic kind.
pub(crate) fn reporting_descriptors() -> Vec<ReportingDescriptor> {
    DiagnosticKind::ALL
        .iter()
        .map(|kind| {
            ReportingDescriptor::builder()
                .id(kind.id())
                .name(kind.name())
                .short_description(
                    MultiformatMessageString::builder()
                        .text(kind.description())
                        .build(),
                )
                .build()
        })
        .collect()
}

// Message constructors below follow the canonical wording of the surrounding
// compiler's reporting surface.

pub(crate) fn contradictory_annotation(span: Span) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::ContradictoryAnnotation,
        Severity::Error,
        span,
        "Contradictory null specification; only one of @NonNull and @Nullable can be specified at any location",
    )
}

pub(crate) fn contradictory_inferred(span: Span, signature: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::ContradictoryInferredAnnotation,
        Severity::Error,
        span,
        format!(
            "Contradictory null annotations: method was inferred as '{signature}', but only one of '@NonNull' and '@Nullable' can be effective at any location"
        ),
    )
}

pub(crate) fn illegal_location(span: Span, annotation_name: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::IllegalAnnotationLocation,
        Severity::Error,
        span,
        format!("The nullness annotation '{annotation_name}' is not applicable at this location"),
    )
}

pub(crate) fn malformed_array_annotation(span: Span, declared: usize, annotated: usize) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::MalformedArrayAnnotation,
        Severity::Error,
        span,
        format!(
            "Annotated array dimensions do not match the declaration: {declared} declared but {annotated} annotated"
        ),
    )
}

pub(crate) fn constraint_mismatch(
    span: Span,
    actual: &str,
    param: &str,
    constraint: NullQualifier,
) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::NullConstraintMismatch,
        Severity::Error,
        span,
        format!(
            "Null constraint mismatch: The type '{actual}' is not a valid substitute for the type parameter '{param}' which is constrained as '{constraint}'"
        ),
    )
    .with_required(param.to_string())
}

pub(crate) fn mismatch_null_value(span: Span, required: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::NullTypeMismatch,
        Severity::Error,
        span,
        format!("Null type mismatch: required '{required}' but the provided value is null"),
    )
    .with_required(required.to_string())
}

pub(crate) fn mismatch_inferred_nullable(span: Span, required: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::NullTypeMismatch,
        Severity::Error,
        span,
        format!(
            "Null type mismatch: required '{required}' but the provided value is inferred as @Nullable"
        ),
    )
    .with_required(required.to_string())
}

pub(crate) fn mismatch_types(
    span: Span,
    required: &str,
    provided: &str,
    supertype_hint: Option<&str>,
) -> Diagnostic {
    let message = match supertype_hint {
        Some(hint) => format!(
            "Null type mismatch (type annotations): required '{required}' but this expression has type '{provided}', corresponding supertype is '{hint}'"
        ),
        None => format!(
            "Null type mismatch (type annotations): required '{required}' but this expression has type '{provided}'"
        ),
    };
    Diagnostic::new(DiagnosticKind::NullTypeMismatch, Severity::Error, span, message)
        .with_types(required.to_string(), provided.to_string())
}

pub(crate) fn mismatch_descriptor_parameter(
    span: Span,
    position: usize,
    required: &str,
    provided: &str,
    descriptor: &str,
) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::NullTypeMismatch,
        Severity::Error,
        span,
        format!(
            "Null type mismatch at parameter {position}: required '{required}' but provided '{provided}' via method descriptor {descriptor}"
        ),
    )
    .with_types(required.to_string(), provided.to_string())
}

pub(crate) fn unchecked_descriptor_parameter(
    span: Span,
    position: usize,
    required: &str,
    descriptor: &str,
) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UncheckedNullConversion,
        Severity::Warning,
        span,
        format!(
            "Null type safety: parameter {position} provided via method descriptor {descriptor} needs unchecked conversion to conform to '{required}'"
        ),
    )
    .with_required(required.to_string())
}

pub(crate) fn override_return(span: Span, ancestor: &str, method: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::OverrideNullnessIncompatible,
        Severity::Error,
        span,
        format!("The return type is incompatible with the @NonNull return from {ancestor}.{method}"),
    )
}

pub(crate) fn override_parameter(
    span: Span,
    param: &str,
    ancestor: &str,
    inherited: Option<NullQualifier>,
) -> Diagnostic {
    let message = match inherited {
        Some(qualifier) => format!(
            "Illegal redefinition of parameter {param}, inherited method from {ancestor} declares this parameter as {qualifier}"
        ),
        None => format!(
            "Illegal redefinition of parameter {param}, inherited method from {ancestor} does not constrain this parameter"
        ),
    };
    Diagnostic::new(
        DiagnosticKind::OverrideNullnessIncompatible,
        Severity::Error,
        span,
        message,
    )
}

pub(crate) fn potential_access_nullable_expression(span: Span, severity: Severity) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::PotentialNullPointerAccess,
        severity,
        span,
        "Potential null pointer access: this expression has a '@Nullable' type",
    )
}

pub(crate) fn potential_access_method_return(
    span: Span,
    method: &str,
    severity: Severity,
) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::PotentialNullPointerAccess,
        severity,
        span,
        format!("Potential null pointer access: The method {method} may return null"),
    )
}

pub(crate) fn potential_access_variable(span: Span, name: &str, severity: Severity) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::PotentialNullPointerAccess,
        severity,
        span,
        format!("Potential null pointer access: The variable {name} may be null at this location"),
    )
}

pub(crate) fn potential_access_array_element(span: Span, severity: Severity) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::PotentialNullPointerAccess,
        severity,
        span,
        "Potential null pointer access: array element may be null",
    )
}

pub(crate) fn missing_inherited_annotation(
    span: Span,
    param: &str,
    ancestor: &str,
    inherited: NullQualifier,
) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UncheckedNullConversion,
        Severity::Warning,
        span,
        format!(
            "Missing nullness annotation: parameter {param} drops the {inherited} annotation inherited from {ancestor}"
        ),
    )
}

pub(crate) fn definite_null_access(span: Span, name: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::PotentialNullPointerAccess,
        Severity::Error,
        span,
        format!("Null pointer access: The variable {name} can only be null at this location"),
    )
}

pub(crate) fn raw_type_usage(span: Span, name: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::RawTypeUsage,
        Severity::Warning,
        span,
        format!("{name} is a raw type. References to generic type {name} should be parameterized"),
    )
}

pub(crate) fn redundant_annotation(span: Span) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::RedundantAnnotation,
        Severity::Warning,
        span,
        "The nullness annotation is redundant with a default that applies to this location",
    )
}

pub(crate) fn redundant_default(span: Span, scope: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::RedundantAnnotation,
        Severity::Warning,
        span,
        format!("Nullness default is redundant with a default specified for the enclosing {scope}"),
    )
}

pub(crate) fn redundant_check_comparison(span: Span, rendered: &str, severity: Severity) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::RedundantNullCheck,
        severity,
        span,
        format!("Redundant null check: comparing '{rendered}' against null"),
    )
}

pub(crate) fn redundant_check_flow(span: Span, name: &str, severity: Severity) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::RedundantNullCheck,
        severity,
        span,
        format!("Redundant null check: The variable {name} cannot be null at this location"),
    )
}

pub(crate) fn unchecked_conversion(span: Span, provided: &str, required: &str) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::UncheckedNullConversion,
        Severity::Warning,
        span,
        format!(
            "Null type safety (type annotations): The expression of type '{provided}' needs unchecked conversion to conform to '{required}'"
        ),
    )
    .with_types(required.to_string(), provided.to_string())
}
