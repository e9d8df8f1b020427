use anyhow::Result;
use opentelemetry::KeyValue;
use rayon::prelude::*;

use crate::checks::support::{
    BodyVisitor, MethodScope, check_functional, check_value, expr_type, fact_of, method_display,
    resolve_call, walk_field, walk_method,
};
use crate::checks::{Check, CheckMetadata};
use crate::diagnostics::{self, Diagnostic, Severity};
use crate::engine::{AnalysisContext, declared_param_qualifier};
use crate::flow::FlowFact;
use crate::ir::{Expr, TypeUse};
use crate::lattice::NullQualifier;
use crate::substitute::{
    BoundCheckOutcome, check_argument_bound, effective_qualifier, render_method_signature,
};

/// Check method invocations: receiver dereferences, nullness of every
/// argument against the substituted parameter types, lambda and
/// method-reference target typing, and contradictions introduced by
/// inferred type arguments.
#[derive(Default)]
pub(crate) struct InvocationsCheck;

crate::register_check!(InvocationsCheck);

impl Check for InvocationsCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "INVOCATIONS",
            name: "Invocation nullness",
            description: "Receiver dereferences and argument nullness at call sites",
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
                            let mut visitor = InvocationVisitor;
                            for field in &class.fields {
                                walk_field(&mut scope, &mut visitor, field);
                            }
                            unit_diagnostics.append(&mut scope.diagnostics);
                        }
                        for method in &class.methods {
                            let Some(mut scope) =
                                MethodScope::new(context, unit, class, method, false)
                            else {
                                continue;
                            };
                            let mut visitor = InvocationVisitor;
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

struct InvocationVisitor;

impl BodyVisitor for InvocationVisitor {
    fn on_expression(&mut self, scope: &mut MethodScope<'_>, expr: &Expr) {
        match expr {
            Expr::Call {
                receiver,
                method,
                args,
                type_args,
                inferred_type_args,
                span,
            } => {
                if let Some(receiver) = receiver {
                    report_dereference(scope, receiver);
                }
                handle_call(
                    scope,
                    receiver.as_deref(),
                    method,
                    args,
                    type_args,
                    inferred_type_args,
                    *span,
                );
            }
            Expr::ArrayAccess { array, .. } => {
                report_dereference(scope, array);
            }
            _ => {}
        }
    }
}

fn handle_call(
    scope: &mut MethodScope<'_>,
    receiver: Option<&Expr>,
    method_name: &str,
    args: &[Expr],
    type_args: &[TypeUse],
    inferred_type_args: &[TypeUse],
    span: crate::ir::Span,
) {
    let Some(call) = resolve_call(
        scope,
        receiver,
        method_name,
        args.len(),
        type_args,
        inferred_type_args,
    ) else {
        return;
    };

    if call.conflict.is_some() && call.used_inferred_args {
        let signature = render_method_signature(
            &scope.arena,
            &call.method.name,
            call.return_type,
            &call.params,
        );
        scope.emit(diagnostics::contradictory_inferred(span, &signature));
    }

    // Explicit type arguments are checked against the declared bounds of the
    // method's type parameters.
    let config = scope.context.config();
    let contracts: Vec<_> = call
        .method
        .type_params
        .iter()
        .map(|param| {
            (
                param.name.clone(),
                declared_param_qualifier(param, config),
            )
        })
        .collect();
    for ((param_name, constraint), arg_use) in contracts.iter().zip(type_args.iter()) {
        if !constraint.is_explicit() {
            continue;
        }
        let built = scope.build_type_silently(arg_use);
        let contract = crate::annotated::TypeParamContract {
            name: param_name.clone(),
            qualifier: *constraint,
        };
        match check_argument_bound(&scope.arena, &contract, built) {
            BoundCheckOutcome::Ok => {}
            BoundCheckOutcome::Unchecked => {
                let provided = scope.arena.render(built);
                let required = format!("{}{}", constraint.prefix(), param_name);
                scope.emit(diagnostics::unchecked_conversion(
                    arg_use.span,
                    &provided,
                    &required,
                ));
            }
            BoundCheckOutcome::Mismatch => {
                let provided = scope.arena.render(built);
                scope.emit(diagnostics::constraint_mismatch(
                    arg_use.span,
                    &provided,
                    param_name,
                    *constraint,
                ));
            }
        }
    }

    for (required, arg) in call.params.iter().zip(args.iter()) {
        if check_functional(scope, *required, arg) {
            continue;
        }
        check_value(scope, *required, arg);
    }
}

fn potential_severity(scope: &MethodScope<'_>) -> Severity {
    if scope.context.config().potential_null_is_error {
        Severity::Error
    } else {
        Severity::Warning
    }
}

/// Report a dereference of a possibly-null receiver, honoring the
/// "protected by previous dereference" suppression.
fn report_dereference(scope: &mut MethodScope<'_>, receiver: &Expr) {
    let severity = potential_severity(scope);
    match receiver {
        Expr::Name { name, span } => {
            if scope.flow.is_protected(name) {
                return;
            }
            match fact_of(scope, receiver) {
                FlowFact::Null => {
                    scope.emit(diagnostics::definite_null_access(*span, name));
                    scope.flow.mark_reported(name);
                }
                FlowFact::Nullable => {
                    let declared_nullable = expr_type(scope, receiver)
                        .map(|id| effective_qualifier(&scope.arena, id) == NullQualifier::Nullable)
                        .unwrap_or(false);
                    let diagnostic = if declared_nullable {
                        diagnostics::potential_access_nullable_expression(*span, severity)
                    } else {
                        diagnostics::potential_access_variable(*span, name, severity)
                    };
                    scope.emit(diagnostic);
                    scope.flow.mark_reported(name);
                }
                _ => {
                    // A successful dereference leaves the value non-null.
                    scope.flow.set(name, FlowFact::NonNull);
                }
            }
        }
        Expr::Call {
            receiver: inner_receiver,
            method,
            args,
            type_args,
            inferred_type_args,
            ..
        } => {
            if fact_of(scope, receiver) == FlowFact::Nullable {
                let display = resolve_call(
                    scope,
                    inner_receiver.as_deref(),
                    method,
                    args.len(),
                    type_args,
                    inferred_type_args,
                )
                .map(|call| method_display(call.method))
                .unwrap_or_else(|| format!("{method}()"));
                scope.emit(diagnostics::potential_access_method_return(
                    receiver.span(),
                    &display,
                    severity,
                ));
            }
        }
        Expr::ArrayAccess { .. } => {
            if let Some(element) = expr_type(scope, receiver) {
                if effective_qualifier(&scope.arena, element) == NullQualifier::Nullable {
                    scope.emit(diagnostics::potential_access_array_element(
                        receiver.span(),
                        severity,
                    ));
                }
            }
        }
        _ => {
            if fact_of(scope, receiver) == FlowFact::Nullable {
                scope.emit(diagnostics::potential_access_nullable_expression(
                    receiver.span(),
                    severity,
                ));
            }
        }
    }
}
