use anyhow::Result;
use opentelemetry::KeyValue;
use rayon::prelude::*;

use crate::annotated::TypeId;
use crate::checks::support::{
    BodyVisitor, MethodScope, check_functional, check_value, walk_field, walk_method,
};
use crate::checks::{Check, CheckMetadata};
use crate::diagnostics::{self, Diagnostic, Severity};
use crate::engine::AnalysisContext;
use crate::flow::{FlowFact, NullComparison};
use crate::ir::Expr;
use crate::lattice::NullQualifier;
use crate::substitute::effective_qualifier;

/// Check that every assignment-shaped position (local initializer, field
/// initializer, assignment, return, array store) receives a value whose
/// nullness fits the declared type, consulting local flow facts.
#[derive(Default)]
pub(crate) struct AssignmentsCheck;

crate::register_check!(AssignmentsCheck);

impl Check for AssignmentsCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "ASSIGNMENTS",
            name: "Assignment nullness",
            description: "Nullness compatibility of assignments, returns, and array stores",
        }
    }

    fn run(&self, context: &AnalysisContext) -> Result<Vec<Diagnostic>> {
        let per_unit: Vec<Vec<Diagnostic>> = context
            .units()
            .par_iter()
            .map(|unit| {
                let mut unit_diagnostics = Vec::new();
                for class in &unit.classes {
                    let attributes = [KeyValue::new("nullspect.class", class.name.clone())];
                    context.with_span("class", &attributes, || {
                        if let Some(mut scope) = MethodScope::for_fields(context, unit, class) {
                            let mut visitor = AssignmentVisitor;
                            for field in &class.fields {
                                walk_field(&mut scope, &mut visitor, field);
                            }
                            unit_diagnostics.append(&mut scope.diagnostics);
                        }
                        for method in &class.methods {
                            let Some(mut scope) =
                                MethodScope::new(context, unit, class, method, true)
                            else {
                                continue;
                            };
                            let mut visitor = AssignmentVisitor;
                            walk_method(&mut scope, &mut visitor);
                            unit_diagnostics.append(&mut scope.diagnostics);
                        }
                    });
                }
                unit_diagnostics
            })
            .collect();
        Ok(per_unit.into_iter().flatten().collect())
    }
}

struct AssignmentVisitor;

impl BodyVisitor for AssignmentVisitor {
    fn on_assignment(&mut self, scope: &mut MethodScope<'_>, required: TypeId, value: &Expr) {
        if check_functional(scope, required, value) {
            return;
        }
        check_value(scope, required, value);
    }

    fn on_null_comparison(&mut self, scope: &mut MethodScope<'_>, comparison: &NullComparison<'_>) {
        report_redundant_check(scope, comparison);
    }
}

fn report_redundant_check(scope: &mut MethodScope<'_>, comparison: &NullComparison<'_>) {
    let severity = if scope.context.config().redundant_check_is_error {
        Severity::Error
    } else {
        Severity::Warning
    };
    let declared = scope.locals.get(comparison.name).copied().or_else(|| {
        scope
            .context
            .types_of(&scope.class.name)
            .and_then(|types| types.fields.get(comparison.name).copied())
    });
    if let Some(declared) = declared {
        if effective_qualifier(&scope.arena, declared) == NullQualifier::NonNull {
            let rendered = scope.arena.render_required(declared);
            scope.emit(diagnostics::redundant_check_comparison(
                comparison.span,
                &rendered,
                severity,
            ));
            return;
        }
    }
    if scope.flow.fact(comparison.name) == Some(FlowFact::NonNull) {
        scope.emit(diagnostics::redundant_check_flow(
            comparison.span,
            comparison.name,
            severity,
        ));
    }
}
