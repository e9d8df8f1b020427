use anyhow::Result;
use opentelemetry::KeyValue;
use rayon::prelude::*;

use crate::annotated::simple_name;
use crate::checks::support::method_display;
use crate::checks::{Check, CheckMetadata};
use crate::diagnostics::{self, Diagnostic};
use crate::engine::AnalysisContext;
use crate::ir::{ClassDecl, CompilationUnit, MethodDecl};
use crate::lattice::NullQualifier;
use crate::substitute::effective_qualifier;

/// Check override compatibility against the effective inherited contract:
/// parameter nullness may only widen, return nullness may only strengthen.
/// Findings are reported once at the overriding declaration.
#[derive(Default)]
pub(crate) struct OverridesCheck;

crate::register_check!(OverridesCheck);

impl Check for OverridesCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "OVERRIDES",
            name: "Override nullness",
            description: "Inherited nullness contracts of overriding methods",
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
                        for method in &class.methods {
                            check_method(context, unit, class, method, &mut unit_diagnostics);
                        }
                    });
                }
                unit_diagnostics
            })
            .collect();
        Ok(per_unit.into_iter().flatten().collect())
    }
}

fn check_method(
    context: &AnalysisContext,
    unit: &CompilationUnit,
    class: &ClassDecl,
    method: &MethodDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if method.is_static || method.is_constructor {
        return;
    }
    let key = method.key();
    let Some(contract) = context.effective_contract(&class.name, &key) else {
        return;
    };
    let Some(types) = context.types_of(&class.name) else {
        return;
    };
    let Some(own) = types.methods.get(&key) else {
        return;
    };
    if own.malformed {
        return;
    }
    let signatures = context.inherited_signatures(&class.name, &key);
    let logical = format!("{}.{}()", class.name, method.name);

    // Return: the override must not promise less than any ancestor.
    let own_return = own
        .return_type
        .map(|id| effective_qualifier(&types.arena, id))
        .unwrap_or(NullQualifier::Unspecified);
    if contract.return_qualifier == NullQualifier::NonNull && own_return == NullQualifier::Nullable
    {
        let ancestor = signatures
            .iter()
            .find(|signature| signature.return_qualifier == NullQualifier::NonNull);
        if let Some(ancestor) = ancestor {
            let display = ancestor_method_display(context, &ancestor.class_name, &key)
                .unwrap_or_else(|| format!("{}()", ancestor.method_name));
            diagnostics.push(
                diagnostics::override_return(
                    method.span,
                    simple_name(&ancestor.class_name),
                    &display,
                )
                .at(&unit.path, logical.clone()),
            );
        }
    }

    // Parameters: narrowing an inherited requirement is illegal, dropping an
    // inherited annotation is reported unless tolerated.
    let tolerate_drop = context.config().tolerate_dropped_parameter_annotations;
    for (index, param) in method.params.iter().enumerate() {
        let own_qualifier = own
            .params
            .get(index)
            .map(|id| effective_qualifier(&types.arena, *id))
            .unwrap_or(NullQualifier::Unspecified);
        let inherited = contract
            .param_qualifiers
            .get(index)
            .copied()
            .unwrap_or(NullQualifier::Unspecified);
        match (inherited, own_qualifier) {
            (NullQualifier::Nullable, NullQualifier::NonNull) => {
                let ancestor = signatures.iter().find(|signature| {
                    signature.param_qualifiers.get(index).copied()
                        == Some(NullQualifier::Nullable)
                });
                if let Some(ancestor) = ancestor {
                    diagnostics.push(
                        diagnostics::override_parameter(
                            method.span,
                            &param.name,
                            simple_name(&ancestor.class_name),
                            Some(NullQualifier::Nullable),
                        )
                        .at(&unit.path, logical.clone()),
                    );
                }
            }
            (NullQualifier::Unspecified, NullQualifier::NonNull) => {
                let ancestor = signatures.first();
                if let Some(ancestor) = ancestor {
                    diagnostics.push(
                        diagnostics::override_parameter(
                            method.span,
                            &param.name,
                            simple_name(&ancestor.class_name),
                            None,
                        )
                        .at(&unit.path, logical.clone()),
                    );
                }
            }
            (inherited_qualifier, NullQualifier::Unspecified)
                if inherited_qualifier.is_explicit() && !tolerate_drop =>
            {
                let ancestor = signatures.iter().find(|signature| {
                    signature.param_qualifiers.get(index).copied() == Some(inherited_qualifier)
                });
                if let Some(ancestor) = ancestor {
                    diagnostics.push(
                        diagnostics::missing_inherited_annotation(
                            param.span,
                            &param.name,
                            simple_name(&ancestor.class_name),
                            inherited_qualifier,
                        )
                        .at(&unit.path, logical.clone()),
                    );
                }
            }
            _ => {}
        }
    }
}

fn ancestor_method_display(
    context: &AnalysisContext,
    class_name: &str,
    key: &str,
) -> Option<String> {
    let decl = context.class(class_name)?;
    let method = decl.methods.iter().find(|method| method.key() == key)?;
    Some(method_display(method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotated::testutil::annotated;
    use crate::config::AnalysisConfig;
    use crate::diagnostics::{DiagnosticKind, Severity};
    use crate::engine::build_context;
    use crate::ir::{ParamDecl, Span, TypeUse};

    fn unit(classes: Vec<ClassDecl>) -> CompilationUnit {
        CompilationUnit {
            path: "com/example/Sample.java".to_string(),
            package: Some("com.example".to_string()),
            default_nullness: None,
            classes,
        }
    }

    fn class(name: &str) -> ClassDecl {
        ClassDecl {
            name: name.to_string(),
            is_interface: false,
            annotations: Vec::new(),
            type_params: Vec::new(),
            default_nullness: None,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            span: Span::default(),
        }
    }

    fn foo(return_annotations: &[&str], param_annotations: &[&str]) -> MethodDecl {
        MethodDecl {
            name: "foo".to_string(),
            is_static: false,
            is_abstract: false,
            is_constructor: false,
            is_varargs: false,
            type_params: Vec::new(),
            params: vec![ParamDecl {
                name: "l".to_string(),
                ty: annotated("java.lang.String", param_annotations),
                dim_annotations: None,
                span: Span::default(),
            }],
            return_type: Some(annotated("java.lang.Object", return_annotations)),
            dim_annotations: None,
            receiver_annotations: Vec::new(),
            receiver_qualifier: None,
            default_nullness: None,
            throws: Vec::new(),
            body: Vec::new(),
            span: Span::new(10, 0, 0),
        }
    }

    fn run_check(units: Vec<CompilationUnit>) -> Vec<Diagnostic> {
        let context = build_context(units, AnalysisConfig::default());
        OverridesCheck.run(&context).expect("overrides check")
    }

    #[test]
    fn narrowed_return_and_parameter_yield_two_errors() {
        // Base: @NonNull Object foo(@Nullable String l)
        // Derived: @Nullable Object foo(@NonNull String l)
        let mut base = class("com.example.Base");
        base.methods = vec![foo(&["NonNull"], &["Nullable"])];
        let mut derived = class("com.example.Derived");
        derived.superclass = Some(TypeUse::named("com.example.Base"));
        derived.methods = vec![foo(&["Nullable"], &["NonNull"])];

        let diagnostics = run_check(vec![unit(vec![base, derived])]);
        let override_diagnostics: Vec<_> = diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.kind == DiagnosticKind::OverrideNullnessIncompatible)
            .collect();
        assert_eq!(override_diagnostics.len(), 2, "diagnostics: {diagnostics:?}");
        assert!(override_diagnostics.iter().all(|d| d.severity == Severity::Error));
        assert!(
            override_diagnostics.iter().any(|d| d.message
                == "The return type is incompatible with the @NonNull return from Base.foo(String)")
        );
        assert!(override_diagnostics.iter().any(|d| d.message
            == "Illegal redefinition of parameter l, inherited method from Base declares this parameter as @Nullable"));
    }

    #[test]
    fn widening_parameter_and_strengthening_return_are_legal() {
        // Base: @Nullable Object foo(@NonNull String l)
        // Derived: @NonNull Object foo(@Nullable String l)
        let mut base = class("com.example.Base");
        base.methods = vec![foo(&["Nullable"], &["NonNull"])];
        let mut derived = class("com.example.Derived");
        derived.superclass = Some(TypeUse::named("com.example.Base"));
        derived.methods = vec![foo(&["NonNull"], &["Nullable"])];

        let diagnostics = run_check(vec![unit(vec![base, derived])]);
        assert!(
            diagnostics
                .iter()
                .all(|d| d.kind != DiagnosticKind::OverrideNullnessIncompatible),
            "diagnostics: {diagnostics:?}"
        );
    }

    #[test]
    fn constraining_an_unconstrained_inherited_parameter_is_reported() {
        let mut base = class("com.example.Base");
        base.methods = vec![foo(&[], &[])];
        let mut derived = class("com.example.Derived");
        derived.superclass = Some(TypeUse::named("com.example.Base"));
        derived.methods = vec![foo(&[], &["NonNull"])];

        let diagnostics = run_check(vec![unit(vec![base, derived])]);
        assert_eq!(diagnostics.len(), 1, "diagnostics: {diagnostics:?}");
        assert_eq!(
            diagnostics[0].message,
            "Illegal redefinition of parameter l, inherited method from Base does not constrain this parameter"
        );
    }

    #[test]
    fn dropping_an_inherited_annotation_warns_unless_tolerated() {
        let mut base = class("com.example.Base");
        base.methods = vec![foo(&[], &["Nullable"])];
        let mut derived = class("com.example.Derived");
        derived.superclass = Some(TypeUse::named("com.example.Base"));
        derived.methods = vec![foo(&[], &[])];

        let diagnostics = run_check(vec![unit(vec![base.clone(), derived.clone()])]);
        assert_eq!(diagnostics.len(), 1, "diagnostics: {diagnostics:?}");
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UncheckedNullConversion);

        let mut config = AnalysisConfig::default();
        config.tolerate_dropped_parameter_annotations = true;
        let context = build_context(vec![unit(vec![base, derived])], config);
        let diagnostics = OverridesCheck.run(&context).expect("overrides check");
        assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:?}");
    }

    #[test]
    fn contract_from_deep_ancestor_still_applies() {
        // I: @NonNull Object foo(String); Mid: no annotations; Leaf narrows
        // the return to @Nullable — the interface promise still binds.
        let mut interface = class("com.example.I");
        interface.is_interface = true;
        interface.methods = vec![foo(&["NonNull"], &[])];
        let mut mid = class("com.example.Mid");
        mid.interfaces = vec![TypeUse::named("com.example.I")];
        mid.methods = vec![foo(&[], &[])];
        let mut leaf = class("com.example.Leaf");
        leaf.superclass = Some(TypeUse::named("com.example.Mid"));
        leaf.methods = vec![foo(&["Nullable"], &[])];

        let diagnostics = run_check(vec![unit(vec![interface, mid, leaf])]);
        assert!(
            diagnostics.iter().any(|d| {
                d.kind == DiagnosticKind::OverrideNullnessIncompatible
                    && d.message.contains("incompatible with the @NonNull return from I.foo")
                    && d.logical == "com.example.Leaf.foo()"
            }),
            "diagnostics: {diagnostics:?}"
        );
    }
}
