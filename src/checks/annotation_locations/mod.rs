use anyhow::Result;
use opentelemetry::KeyValue;
use rayon::prelude::*;

use crate::annotated::simple_name;
use crate::checks::{Check, CheckMetadata};
use crate::config::AnalysisConfig;
use crate::diagnostics::{self, Diagnostic};
use crate::engine::AnalysisContext;
use crate::ir::{
    AnnotationUse, ClassDecl, CompilationUnit, Expr, MethodDecl, Stmt, TypeUse, TypeUseShape,
};
use crate::location::{AnnotationTarget, is_legal};

/// Reject nullness annotations at structurally illegal positions,
/// independent of whether the nullness semantics would otherwise hold.
/// Each denied occurrence is reported once.
#[derive(Default)]
pub(crate) struct AnnotationLocationsCheck;

crate::register_check!(AnnotationLocationsCheck);

impl Check for AnnotationLocationsCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "ANNOTATION_LOCATIONS",
            name: "Annotation locations",
            description: "Nullness annotations at structurally disallowed positions",
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
                        let mut validator = Validator {
                            context,
                            unit,
                            logical: class.name.clone(),
                            diagnostics: Vec::new(),
                        };
                        validator.class(class);
                        unit_diagnostics.append(&mut validator.diagnostics);
                    });
                }
                unit_diagnostics
            })
            .collect();
        Ok(per_unit.into_iter().flatten().collect())
    }
}

struct Validator<'a> {
    context: &'a AnalysisContext,
    unit: &'a CompilationUnit,
    logical: String,
    diagnostics: Vec<Diagnostic>,
}

impl Validator<'_> {
    fn config(&self) -> &AnalysisConfig {
        self.context.config()
    }

    fn report_all(&mut self, annotations: &[AnnotationUse], target: AnnotationTarget) {
        if is_legal(target) {
            return;
        }
        let config = self.config();
        let offending: Vec<(String, crate::ir::Span)> = annotations
            .iter()
            .filter(|annotation| config.classify(&annotation.name).is_some())
            .map(|annotation| (annotation.name.clone(), annotation.span))
            .collect();
        for (name, span) in offending {
            self.diagnostics.push(
                diagnostics::illegal_location(span, simple_name(&name))
                    .at(&self.unit.path, self.logical.clone()),
            );
        }
    }

    fn class(&mut self, class: &ClassDecl) {
        self.report_all(&class.annotations, AnnotationTarget::TypeDeclaration);
        for param in &class.type_params {
            if let Some(bound) = &param.bound {
                self.declared_type(bound, AnnotationTarget::TypeVariableBound);
            }
        }
        for field in &class.fields {
            self.declared_type(&field.ty, AnnotationTarget::FieldType);
            if let Some(init) = &field.init {
                self.expr(init, class);
            }
        }
        for method in &class.methods {
            self.method(method, class);
        }
    }

    fn method(&mut self, method: &MethodDecl, class: &ClassDecl) {
        self.logical = format!("{}.{}()", class.name, method.name);
        for throws in &method.throws {
            self.whole_type(throws, AnnotationTarget::ThrowsType);
        }
        self.report_all(
            &method.receiver_annotations,
            AnnotationTarget::Receiver {
                qualified: method.receiver_qualifier.is_some(),
            },
        );
        for param in &method.type_params {
            if let Some(bound) = &param.bound {
                self.declared_type(bound, AnnotationTarget::TypeVariableBound);
            }
        }
        for param in &method.params {
            self.declared_type(&param.ty, AnnotationTarget::ParamType);
        }
        if let Some(return_type) = &method.return_type {
            self.declared_type(return_type, AnnotationTarget::ReturnType);
        }
        self.stmts(&method.body, class);
        self.logical = class.name.clone();
    }

    fn stmts(&mut self, stmts: &[Stmt], class: &ClassDecl) {
        for stmt in stmts {
            match stmt {
                Stmt::Local { ty, init, .. } => {
                    self.declared_type(ty, AnnotationTarget::LocalType);
                    if let Some(init) = init {
                        self.expr(init, class);
                    }
                }
                Stmt::Assign { target, value, .. } => {
                    self.expr(target, class);
                    self.expr(value, class);
                }
                Stmt::Expr { expr, .. } => self.expr(expr, class),
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        self.expr(value, class);
                    }
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                    ..
                } => {
                    self.expr(cond, class);
                    self.stmts(then_body, class);
                    self.stmts(else_body, class);
                }
                Stmt::Assert { cond, .. } => self.expr(cond, class),
                Stmt::Try { body, catches, .. } => {
                    self.stmts(body, class);
                    for catch in catches {
                        self.whole_type(&catch.ty, AnnotationTarget::CatchType);
                        self.stmts(&catch.body, class);
                    }
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr, class: &ClassDecl) {
        match expr {
            Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.expr(receiver, class);
                }
                for arg in args {
                    self.expr(arg, class);
                }
            }
            Expr::New {
                class: allocated,
                args,
                ..
            } => {
                self.report_all(&allocated.annotations, AnnotationTarget::AllocationClassName);
                // Type arguments of the allocation are ordinary argument
                // positions.
                if let TypeUseShape::Named { args: type_args, .. } = &allocated.shape {
                    for arg in type_args {
                        self.declared_type(arg, AnnotationTarget::TypeArgument);
                    }
                }
                for arg in args {
                    self.expr(arg, class);
                }
            }
            Expr::Lambda { body, .. } => {
                if let Some(body) = body {
                    self.expr(body, class);
                }
            }
            Expr::MethodRef { qualifier, .. } => {
                self.whole_type(qualifier, AnnotationTarget::MethodRefQualifier);
            }
            Expr::ArrayAccess { array, .. } => self.expr(array, class),
            Expr::Cast { ty, expr, .. } => {
                self.whole_type_if(
                    ty,
                    AnnotationTarget::Cast {
                        parameterized_or_array: is_parameterized_or_array(ty),
                    },
                );
                self.expr(expr, class);
            }
            Expr::InstanceOf { expr, ty, .. } => {
                self.whole_type_if(
                    ty,
                    AnnotationTarget::InstanceOf {
                        parameterized_or_array: is_parameterized_or_array(ty),
                    },
                );
                self.expr(expr, class);
            }
            Expr::Compare { left, right, .. } => {
                self.expr(left, class);
                self.expr(right, class);
            }
            Expr::Null { .. } | Expr::Literal { .. } | Expr::Name { .. } => {}
        }
    }

    /// Validate one type occurrence against the allow/deny list, descending
    /// with the structural target of each inner position.
    fn declared_type(&mut self, ty: &TypeUse, target: AnnotationTarget) {
        match &ty.shape {
            TypeUseShape::Primitive { .. } => {
                self.report_all(&ty.annotations, AnnotationTarget::PrimitiveType);
            }
            TypeUseShape::Named {
                args, enclosing, name, ..
            } => {
                self.report_all(&ty.annotations, target);
                if let Some(enclosing) = enclosing {
                    self.enclosing_qualifier(enclosing, name);
                }
                for arg in args {
                    self.declared_type(arg, AnnotationTarget::TypeArgument);
                }
            }
            TypeUseShape::Array { element } => {
                self.report_all(&ty.annotations, AnnotationTarget::ArrayDimension);
                self.declared_type(element, target);
            }
            TypeUseShape::Wildcard { bound } => {
                self.report_all(&ty.annotations, AnnotationTarget::TypeArgument);
                if let Some(bound) = bound {
                    self.declared_type(&bound.ty, AnnotationTarget::WildcardBound);
                }
            }
            TypeUseShape::Variable { .. } => {
                self.report_all(&ty.annotations, target);
            }
        }
    }

    fn enclosing_qualifier(&mut self, enclosing: &TypeUse, inner_name: &str) {
        if let TypeUseShape::Named {
            name: enclosing_name,
            enclosing: outer,
            ..
        } = &enclosing.shape
        {
            let directly_nested = self.context.class(enclosing_name).is_some()
                && inner_name
                    .strip_prefix(enclosing_name.as_str())
                    .is_some_and(|rest| rest.starts_with('.'));
            self.report_all(
                &enclosing.annotations,
                AnnotationTarget::EnclosingQualifier { directly_nested },
            );
            if let Some(outer) = outer {
                self.enclosing_qualifier(outer, enclosing_name);
            }
        }
    }

    /// Deny every nullness annotation anywhere inside the occurrence.
    fn whole_type(&mut self, ty: &TypeUse, target: AnnotationTarget) {
        self.report_all(&ty.annotations, target);
        match &ty.shape {
            TypeUseShape::Named { args, enclosing, .. } => {
                for arg in args {
                    self.whole_type(arg, target);
                }
                if let Some(enclosing) = enclosing {
                    self.whole_type(enclosing, target);
                }
            }
            TypeUseShape::Array { element } => self.whole_type(element, target),
            TypeUseShape::Wildcard { bound } => {
                if let Some(bound) = bound {
                    self.whole_type(&bound.ty, target);
                }
            }
            TypeUseShape::Variable { .. } | TypeUseShape::Primitive { .. } => {}
        }
    }

    /// Deny annotations only when the target itself is illegal; otherwise
    /// the occurrence is an ordinary type position.
    fn whole_type_if(&mut self, ty: &TypeUse, target: AnnotationTarget) {
        if is_legal(target) {
            return;
        }
        self.whole_type(ty, target);
    }
}

fn is_parameterized_or_array(ty: &TypeUse) -> bool {
    match &ty.shape {
        TypeUseShape::Array { .. } => true,
        TypeUseShape::Named { args, .. } => !args.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotated::testutil::{annotated, array_of, parameterized};
    use crate::config::AnalysisConfig;
    use crate::diagnostics::DiagnosticKind;
    use crate::engine::build_context;
    use crate::ir::{CatchClause, ParamDecl, Span};

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

    fn method(name: &str, body: Vec<Stmt>) -> MethodDecl {
        MethodDecl {
            name: name.to_string(),
            is_static: false,
            is_abstract: false,
            is_constructor: false,
            is_varargs: false,
            type_params: Vec::new(),
            params: Vec::new(),
            return_type: Some(TypeUse::named("void")),
            dim_annotations: None,
            receiver_annotations: Vec::new(),
            receiver_qualifier: None,
            default_nullness: None,
            throws: Vec::new(),
            body,
            span: Span::default(),
        }
    }

    fn run_check(units: Vec<CompilationUnit>) -> Vec<Diagnostic> {
        let context = build_context(units, AnalysisConfig::default());
        AnnotationLocationsCheck
            .run(&context)
            .expect("annotation locations check")
    }

    fn expected_message(annotation: &str) -> String {
        format!("The nullness annotation '{annotation}' is not applicable at this location")
    }

    #[test]
    fn annotation_on_the_type_declaration_is_illegal() {
        let mut sample = class("com.example.Sample");
        sample.annotations = vec![AnnotationUse::named("NonNull")];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::IllegalAnnotationLocation);
        assert_eq!(diagnostics[0].message, expected_message("NonNull"));
    }

    #[test]
    fn non_nullness_annotations_are_ignored() {
        let mut sample = class("com.example.Sample");
        sample.annotations = vec![AnnotationUse::named("Deprecated")];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn throws_clause_annotations_are_illegal() {
        let mut sample = class("com.example.Sample");
        let mut throwing = method("m", Vec::new());
        throwing.throws = vec![annotated("java.io.IOException", &["Nullable"])];
        sample.methods = vec![throwing];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, expected_message("Nullable"));
    }

    #[test]
    fn catch_type_annotations_are_illegal() {
        let mut sample = class("com.example.Sample");
        sample.methods = vec![method(
            "m",
            vec![Stmt::Try {
                body: Vec::new(),
                catches: vec![CatchClause {
                    ty: annotated("java.lang.Exception", &["NonNull"]),
                    name: "e".to_string(),
                    body: Vec::new(),
                    span: Span::new(4, 0, 0),
                }],
                span: Span::new(3, 0, 0),
            }],
        )];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::IllegalAnnotationLocation);
    }

    #[test]
    fn instanceof_against_parameterized_or_array_is_illegal() {
        let mut sample = class("com.example.Sample");
        sample.methods = vec![method(
            "m",
            vec![
                Stmt::Expr {
                    expr: Expr::InstanceOf {
                        expr: Box::new(Expr::Name {
                            name: "x".to_string(),
                            span: Span::new(3, 0, 0),
                        }),
                        ty: parameterized(
                            "java.util.List",
                            &[],
                            vec![annotated("java.lang.String", &["NonNull"])],
                        ),
                        span: Span::new(3, 0, 0),
                    },
                    span: Span::new(3, 0, 0),
                },
                Stmt::Expr {
                    expr: Expr::InstanceOf {
                        expr: Box::new(Expr::Name {
                            name: "y".to_string(),
                            span: Span::new(4, 0, 0),
                        }),
                        ty: array_of(annotated("java.lang.String", &["NonNull"]), &[]),
                        span: Span::new(4, 0, 0),
                    },
                    span: Span::new(4, 0, 0),
                },
            ],
        )];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 2, "diagnostics: {diagnostics:?}");
    }

    #[test]
    fn instanceof_against_plain_scalar_is_legal() {
        let mut sample = class("com.example.Sample");
        sample.methods = vec![method(
            "m",
            vec![Stmt::Expr {
                expr: Expr::InstanceOf {
                    expr: Box::new(Expr::Name {
                        name: "x".to_string(),
                        span: Span::new(3, 0, 0),
                    }),
                    ty: annotated("java.lang.String", &["NonNull"]),
                    span: Span::new(3, 0, 0),
                },
                span: Span::new(3, 0, 0),
            }],
        )];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:?}");
    }

    #[test]
    fn allocation_class_name_annotation_is_illegal() {
        let mut sample = class("com.example.Sample");
        sample.methods = vec![method(
            "m",
            vec![Stmt::Expr {
                expr: Expr::New {
                    class: annotated("java.lang.Object", &["NonNull"]),
                    args: Vec::new(),
                    span: Span::new(3, 0, 0),
                },
                span: Span::new(3, 0, 0),
            }],
        )];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, expected_message("NonNull"));
    }

    #[test]
    fn method_reference_qualifier_annotation_is_illegal() {
        let mut sample = class("com.example.Sample");
        sample.methods = vec![method(
            "m",
            vec![Stmt::Expr {
                expr: Expr::MethodRef {
                    qualifier: annotated("com.example.Sink", &["NonNull"]),
                    method: "sink".to_string(),
                    span: Span::new(3, 0, 0),
                },
                span: Span::new(3, 0, 0),
            }],
        )];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn primitive_type_annotation_is_illegal() {
        let mut sample = class("com.example.Sample");
        let mut with_param = method("m", Vec::new());
        with_param.params = vec![ParamDecl {
            name: "count".to_string(),
            ty: TypeUse {
                annotations: vec![AnnotationUse::named("NonNull")],
                shape: TypeUseShape::Primitive {
                    name: "int".to_string(),
                },
                span: Span::new(2, 0, 0),
            },
            dim_annotations: None,
            span: Span::new(2, 0, 0),
        }];
        sample.methods = vec![with_param];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn qualified_receiver_annotation_is_illegal() {
        let mut sample = class("com.example.Sample");
        let mut qualified = method("m", Vec::new());
        qualified.receiver_annotations = vec![AnnotationUse::named("NonNull")];
        qualified.receiver_qualifier = Some("com.example.Outer".to_string());
        let mut unqualified = method("n", Vec::new());
        unqualified.receiver_annotations = vec![AnnotationUse::named("NonNull")];
        sample.methods = vec![qualified, unqualified];
        let diagnostics = run_check(vec![unit(vec![sample])]);
        assert_eq!(diagnostics.len(), 1, "diagnostics: {diagnostics:?}");
        assert_eq!(diagnostics[0].logical, "com.example.Sample.m()");
    }

    #[test]
    fn enclosing_qualifier_requires_direct_nesting() {
        let outer = class("com.example.Outer");
        let mut sample = class("com.example.Sample");
        // com.example.Outer.Inner with an annotation on the Outer segment is
        // fine; an annotated segment that is not a directly-enclosing class
        // is not.
        sample.fields = vec![
            crate::ir::FieldDecl {
                name: "ok".to_string(),
                ty: TypeUse {
                    annotations: Vec::new(),
                    shape: TypeUseShape::Named {
                        name: "com.example.Outer.Inner".to_string(),
                        args: Vec::new(),
                        enclosing: Some(Box::new(annotated("com.example.Outer", &["NonNull"]))),
                        raw: false,
                    },
                    span: Span::new(2, 0, 0),
                },
                dim_annotations: None,
                init: None,
                span: Span::new(2, 0, 0),
            },
            crate::ir::FieldDecl {
                name: "bad".to_string(),
                ty: TypeUse {
                    annotations: Vec::new(),
                    shape: TypeUseShape::Named {
                        name: "com.example.Elsewhere.Inner".to_string(),
                        args: Vec::new(),
                        enclosing: Some(Box::new(annotated("com.example.Unrelated", &["NonNull"]))),
                        raw: false,
                    },
                    span: Span::new(3, 0, 0),
                },
                dim_annotations: None,
                init: None,
                span: Span::new(3, 0, 0),
            },
        ];
        let diagnostics = run_check(vec![unit(vec![outer, sample])]);
        assert_eq!(diagnostics.len(), 1, "diagnostics: {diagnostics:?}");
        assert_eq!(diagnostics[0].span.line, 0);
    }
}
