use std::collections::BTreeMap;

use anyhow::Result;
use opentelemetry::KeyValue;
use rayon::prelude::*;

use crate::annotated::{AnnotatedTypeBuilder, DefaultScope, TypeArena, TypeParamResolver};
use crate::checks::{Check, CheckMetadata};
use crate::diagnostics::{self, Diagnostic};
use crate::engine::{AnalysisContext, type_param_qualifiers};
use crate::ir::{ClassDecl, CompilationUnit, Expr, MethodDecl, Stmt, TypeUse, TypeUseShape};
use crate::lattice::NullQualifier;
use crate::substitute::{BoundCheckOutcome, check_argument_bound};

/// Check every parameterized type occurrence against the declared nullness
/// bounds of the instantiated type parameters, wherever the occurrence
/// appears (field, parameter, return, local, allocation).
#[derive(Default)]
pub(crate) struct TypeArgumentsCheck;

crate::register_check!(TypeArgumentsCheck);

impl Check for TypeArgumentsCheck {
    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: "TYPE_ARGUMENTS",
            name: "Type argument nullness",
            description: "Instantiation-site arguments against declared type-variable bounds",
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
                        scan_class(context, unit, class, &mut unit_diagnostics);
                    });
                }
                unit_diagnostics
            })
            .collect();
        Ok(per_unit.into_iter().flatten().collect())
    }
}

struct Scan<'a> {
    context: &'a AnalysisContext,
    unit: &'a CompilationUnit,
    arena: TypeArena,
    type_params: BTreeMap<String, NullQualifier>,
    logical: String,
    diagnostics: Vec<Diagnostic>,
}

fn scan_class(
    context: &AnalysisContext,
    unit: &CompilationUnit,
    class: &ClassDecl,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let class_params = type_param_qualifiers(&class.type_params, &[], context.config());
    for field in &class.fields {
        let mut scan = Scan {
            context,
            unit,
            arena: TypeArena::new(),
            type_params: class_params.clone(),
            logical: format!("{}.{}", class.name, field.name),
            diagnostics: Vec::new(),
        };
        scan.type_use(&field.ty);
        diagnostics.append(&mut scan.diagnostics);
    }
    for method in &class.methods {
        let mut scan = Scan {
            context,
            unit,
            arena: TypeArena::new(),
            type_params: type_param_qualifiers(
                &class.type_params,
                &method.type_params,
                context.config(),
            ),
            logical: format!("{}.{}()", class.name, method.name),
            diagnostics: Vec::new(),
        };
        scan.method(method);
        diagnostics.append(&mut scan.diagnostics);
    }
}

impl Scan<'_> {
    fn method(&mut self, method: &MethodDecl) {
        for param in &method.params {
            self.type_use(&param.ty);
        }
        if let Some(return_type) = &method.return_type {
            self.type_use(return_type);
        }
        self.stmts(&method.body);
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Local { ty, init, .. } => {
                    self.type_use(ty);
                    if let Some(init) = init {
                        self.expr(init);
                    }
                }
                Stmt::Assign { target, value, .. } => {
                    self.expr(target);
                    self.expr(value);
                }
                Stmt::Expr { expr, .. } => self.expr(expr),
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        self.expr(value);
                    }
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                    ..
                } => {
                    self.expr(cond);
                    self.stmts(then_body);
                    self.stmts(else_body);
                }
                Stmt::Assert { cond, .. } => self.expr(cond),
                Stmt::Try { body, catches, .. } => {
                    self.stmts(body);
                    for catch in catches {
                        self.stmts(&catch.body);
                    }
                }
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.expr(receiver);
                }
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::New { class, args, .. } => {
                self.type_use(class);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::Lambda { body, .. } => {
                if let Some(body) = body {
                    self.expr(body);
                }
            }
            Expr::ArrayAccess { array, .. } => self.expr(array),
            Expr::Cast { ty, expr, .. } => {
                self.type_use(ty);
                self.expr(expr);
            }
            Expr::InstanceOf { expr, .. } => self.expr(expr),
            Expr::Compare { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Null { .. }
            | Expr::Literal { .. }
            | Expr::Name { .. }
            | Expr::MethodRef { .. } => {}
        }
    }

    fn type_use(&mut self, ty: &TypeUse) {
        match &ty.shape {
            TypeUseShape::Named {
                name,
                args,
                enclosing,
                raw,
            } => {
                if let Some(enclosing) = enclosing {
                    self.type_use(enclosing);
                }
                if *raw {
                    return;
                }
                let contracts = self.context.type_params_of(name);
                for (index, arg) in args.iter().enumerate() {
                    if let Some(contract) = contracts.get(index) {
                        if contract.qualifier.is_explicit() {
                            self.check_bound(contract, arg);
                        }
                    }
                    self.type_use(arg);
                }
            }
            TypeUseShape::Array { element } => self.type_use(element),
            TypeUseShape::Wildcard { bound } => {
                if let Some(bound) = bound {
                    self.type_use(&bound.ty);
                }
            }
            TypeUseShape::Variable { .. } | TypeUseShape::Primitive { .. } => {}
        }
    }

    fn check_bound(&mut self, contract: &crate::annotated::TypeParamContract, arg: &TypeUse) {
        let built = {
            let context = self.context;
            let mut builder = AnnotatedTypeBuilder::new(
                &mut self.arena,
                context.config(),
                context,
                self.type_params.clone(),
            );
            let id = builder.build(arg, &DefaultScope::none());
            let _ = builder.take_diagnostics();
            id
        };
        match check_argument_bound(&self.arena, contract, built) {
            BoundCheckOutcome::Ok => {}
            BoundCheckOutcome::Unchecked => {
                let provided = self.arena.render(built);
                let required = format!("{}{}", contract.qualifier.prefix(), contract.name);
                self.diagnostics.push(
                    diagnostics::unchecked_conversion(arg.span, &provided, &required)
                        .at(&self.unit.path, self.logical.clone()),
                );
            }
            BoundCheckOutcome::Mismatch => {
                let provided = self.arena.render(built);
                self.diagnostics.push(
                    diagnostics::constraint_mismatch(
                        arg.span,
                        &provided,
                        &contract.name,
                        contract.qualifier,
                    )
                    .at(&self.unit.path, self.logical.clone()),
                );
            }
        }
    }
}
