use std::collections::BTreeMap;

use crate::annotated::{
    AnnotatedTypeBuilder, DefaultScope, QualifierOrigin, Shape, TypeArena, TypeId,
};
use crate::diagnostics::Diagnostic;
use crate::engine::AnalysisContext;
use crate::flow::{FlowFact, FlowState, NullComparison, apply_guard, null_comparison};
use crate::ir::{
    ClassDecl, CompareOp, CompilationUnit, DimUse, Expr, MethodDecl, Stmt, TypeUse,
};
use crate::lattice::NullQualifier;
use crate::substitute::{
    Substitution, capture_wildcards, effective_qualifier, find_conflict, substitute,
};

/// Per-method checking state shared by the body-walking checks: a private
/// copy of the class arena (cached ids stay valid), the declared types of
/// locals, and the flow facts at the current program point.
pub(crate) struct MethodScope<'a> {
    pub(crate) context: &'a AnalysisContext,
    pub(crate) unit: &'a CompilationUnit,
    pub(crate) class: &'a ClassDecl,
    pub(crate) method: Option<&'a MethodDecl>,
    pub(crate) arena: TypeArena,
    pub(crate) locals: BTreeMap<String, TypeId>,
    pub(crate) flow: FlowState,
    pub(crate) return_type: Option<TypeId>,
    pub(crate) type_params: BTreeMap<String, NullQualifier>,
    pub(crate) logical: String,
    /// Only one check may surface builder diagnostics for local declarations,
    /// or they would be reported once per walking check.
    report_type_diagnostics: bool,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> MethodScope<'a> {
    /// Returns None for declarations that are structurally malformed; the
    /// rest of the compilation unit is unaffected.
    pub(crate) fn new(
        context: &'a AnalysisContext,
        unit: &'a CompilationUnit,
        class: &'a ClassDecl,
        method: &'a MethodDecl,
        report_type_diagnostics: bool,
    ) -> Option<Self> {
        let types = context.types_of(&class.name)?;
        let method_types = types.methods.get(&method.key())?;
        if method_types.malformed {
            return None;
        }
        let arena = types.arena.clone();
        let mut locals = BTreeMap::new();
        let mut flow = FlowState::new();
        for (param, id) in method.params.iter().zip(method_types.params.iter()) {
            locals.insert(param.name.clone(), *id);
            flow.set(
                &param.name,
                FlowFact::from_qualifier(effective_qualifier(&arena, *id)),
            );
        }
        Some(Self {
            context,
            unit,
            class,
            method: Some(method),
            arena,
            locals,
            flow,
            return_type: method_types.return_type,
            type_params: method_types.type_params.clone(),
            logical: format!("{}.{}()", class.name, method.name),
            report_type_diagnostics,
            diagnostics: Vec::new(),
        })
    }

    /// Scope for checking field initializers of a class.
    pub(crate) fn for_fields(
        context: &'a AnalysisContext,
        unit: &'a CompilationUnit,
        class: &'a ClassDecl,
    ) -> Option<Self> {
        let types = context.types_of(&class.name)?;
        let arena = types.arena.clone();
        let mut type_params = BTreeMap::new();
        for contract in crate::engine::type_param_contracts(&class.type_params, context.config()) {
            type_params.insert(contract.name, contract.qualifier);
        }
        Some(Self {
            context,
            unit,
            class,
            method: None,
            arena,
            locals: BTreeMap::new(),
            flow: FlowState::new(),
            return_type: None,
            type_params,
            logical: class.name.clone(),
            report_type_diagnostics: false,
            diagnostics: Vec::new(),
        })
    }

    pub(crate) fn emit(&mut self, diagnostic: Diagnostic) {
        let stamped = diagnostic.at(&self.unit.path, self.logical.clone());
        self.diagnostics.push(stamped);
    }

    /// Build a local declared type; diagnostics surface only for the check
    /// that owns local declarations.
    pub(crate) fn build_type(&mut self, ty: &TypeUse, dims: Option<&[DimUse]>) -> TypeId {
        let context = self.context;
        let mut builder = AnnotatedTypeBuilder::new(
            &mut self.arena,
            context.config(),
            context,
            self.type_params.clone(),
        );
        // Local variable types never receive scope defaults; their nullness
        // is the flow refiner's business.
        let id = builder.build_declared(ty, dims, &DefaultScope::none());
        let built = builder.take_diagnostics();
        if self.report_type_diagnostics {
            for diagnostic in built {
                self.emit(diagnostic);
            }
        }
        id
    }

    /// Build a type occurrence without surfacing builder diagnostics
    /// (already reported elsewhere, or owned by the location check).
    pub(crate) fn build_type_silently(&mut self, ty: &TypeUse) -> TypeId {
        let context = self.context;
        let mut builder = AnnotatedTypeBuilder::new(
            &mut self.arena,
            context.config(),
            context,
            self.type_params.clone(),
        );
        let id = builder.build(ty, &DefaultScope::none());
        let _ = builder.take_diagnostics();
        id
    }
}

/// A call site resolved against the declarations in the context, with the
/// callee signature substituted into the caller's arena.
pub(crate) struct ResolvedCall<'a> {
    pub(crate) method: &'a MethodDecl,
    pub(crate) params: Vec<TypeId>,
    pub(crate) return_type: Option<TypeId>,
    /// First substituted position carrying the contradictory dual tag.
    pub(crate) conflict: Option<TypeId>,
    /// Type arguments came from resolver inference, not source.
    pub(crate) used_inferred_args: bool,
}

pub(crate) fn resolve_call<'a>(
    scope: &mut MethodScope<'a>,
    receiver: Option<&Expr>,
    method_name: &str,
    arity: usize,
    type_args: &[TypeUse],
    inferred_type_args: &[TypeUse],
) -> Option<ResolvedCall<'a>> {
    let (owner_name, receiver_ty) = match receiver {
        Some(receiver_expr) => {
            let ty = expr_type(scope, receiver_expr)?;
            let name = match &scope.arena.node(ty).shape {
                Shape::Scalar { name, .. } | Shape::Parameterized { name, .. } => name.clone(),
                _ => return None,
            };
            (name, Some(ty))
        }
        None => (scope.class.name.clone(), None),
    };
    let (owner, method) = scope.context.find_method(&owner_name, method_name, arity)?;
    let owner_types = scope.context.types_of(&owner.name)?;
    let method_types = owner_types.methods.get(&method.key())?;
    if method_types.malformed {
        return None;
    }

    let mut subst = Substitution::new();
    if !owner.type_params.is_empty() {
        if let Some(receiver_ty) = receiver_ty {
            if let Some(instantiated) =
                crate::compat::HierarchyResolver::corresponding_supertype(
                    scope.context,
                    &mut scope.arena,
                    receiver_ty,
                    &owner.name,
                )
            {
                if let Shape::Parameterized { args, .. } =
                    scope.arena.node(instantiated).shape.clone()
                {
                    for (param, arg) in owner.type_params.iter().zip(args.iter()) {
                        subst.insert(&param.name, arg.ty);
                    }
                }
            }
        }
    }
    let explicit_args = if type_args.is_empty() {
        inferred_type_args
    } else {
        type_args
    };
    let used_inferred_args = type_args.is_empty() && !inferred_type_args.is_empty();
    for (param, arg) in method.type_params.iter().zip(explicit_args.iter()) {
        let built = scope.build_type_silently(arg);
        subst.insert(&param.name, built);
    }

    let params: Vec<TypeId> = method_types
        .params
        .iter()
        .map(|id| {
            let imported = scope.arena.import(&owner_types.arena, *id);
            let substituted = substitute(&mut scope.arena, imported, &subst);
            capture_wildcards(&mut scope.arena, substituted)
        })
        .collect();
    let return_type = method_types.return_type.map(|id| {
        let imported = scope.arena.import(&owner_types.arena, id);
        let substituted = substitute(&mut scope.arena, imported, &subst);
        capture_wildcards(&mut scope.arena, substituted)
    });

    let conflict = params
        .iter()
        .copied()
        .chain(return_type)
        .find_map(|id| find_conflict(&scope.arena, id));

    Some(ResolvedCall {
        method,
        params,
        return_type,
        conflict,
        used_inferred_args,
    })
}

/// Static annotated type of an expression, allocated in the scope arena.
pub(crate) fn expr_type(scope: &mut MethodScope<'_>, expr: &Expr) -> Option<TypeId> {
    match expr {
        Expr::Null { .. } => Some(scope.arena.null_type()),
        Expr::Literal { .. } => Some(scope.arena.scalar("java.lang.Object", NullQualifier::NonNull)),
        Expr::Name { name, .. } => {
            if let Some(id) = scope.locals.get(name) {
                return Some(*id);
            }
            scope
                .context
                .types_of(&scope.class.name)?
                .fields
                .get(name)
                .copied()
        }
        Expr::Call {
            receiver,
            method,
            args,
            type_args,
            inferred_type_args,
            ..
        } => resolve_call(
            scope,
            receiver.as_deref(),
            method,
            args.len(),
            type_args,
            inferred_type_args,
        )?
        .return_type,
        Expr::New { class, .. } => {
            let id = scope.build_type_silently(class);
            Some(
                scope
                    .arena
                    .with_qualifier(id, NullQualifier::NonNull, QualifierOrigin::Unspecified),
            )
        }
        Expr::ArrayAccess { array, .. } => {
            let array_ty = expr_type(scope, array)?;
            match &scope.arena.node(array_ty).shape {
                Shape::Array { element } => Some(*element),
                _ => None,
            }
        }
        Expr::Cast { ty, expr: inner, .. } => {
            let id = scope.build_type_silently(ty);
            // An unannotated cast keeps the operand's nullness.
            if !scope.arena.qualifier(id).is_explicit() {
                if let Some(inner_ty) = expr_type(scope, inner) {
                    let qualifier = effective_qualifier(&scope.arena, inner_ty);
                    if qualifier.is_explicit() {
                        return Some(scope.arena.with_qualifier(
                            id,
                            qualifier,
                            QualifierOrigin::Unspecified,
                        ));
                    }
                }
            }
            Some(id)
        }
        Expr::InstanceOf { .. } | Expr::Compare { .. } => Some(scope.arena.primitive("boolean")),
        Expr::Lambda { .. } | Expr::MethodRef { .. } => None,
    }
}

/// Flow-level nullness of an expression at the current program point.
pub(crate) fn fact_of(scope: &mut MethodScope<'_>, expr: &Expr) -> FlowFact {
    match expr {
        Expr::Null { .. } => FlowFact::Null,
        Expr::Literal { .. } | Expr::New { .. } => FlowFact::NonNull,
        Expr::Name { name, .. } => {
            if let Some(fact) = scope.flow.fact(name) {
                return fact;
            }
            match expr_type(scope, expr) {
                Some(id) => FlowFact::from_qualifier(effective_qualifier(&scope.arena, id)),
                None => FlowFact::Unknown,
            }
        }
        Expr::Cast { expr: inner, .. } => match expr_type(scope, expr) {
            Some(id) if scope.arena.qualifier(id).is_explicit() => {
                FlowFact::from_qualifier(scope.arena.qualifier(id))
            }
            _ => fact_of(scope, inner),
        },
        Expr::Call { .. } | Expr::ArrayAccess { .. } => match expr_type(scope, expr) {
            Some(id) => FlowFact::from_qualifier(effective_qualifier(&scope.arena, id)),
            None => FlowFact::Unknown,
        },
        _ => FlowFact::Unknown,
    }
}

/// Static type of an expression adjusted by flow facts: a guarded local
/// counts as non-null, one assigned `null` counts as nullable.
pub(crate) fn provided_type(scope: &mut MethodScope<'_>, expr: &Expr) -> Option<TypeId> {
    let base = expr_type(scope, expr)?;
    if let Expr::Name { name, .. } = expr {
        if let Some(fact) = scope.flow.fact(name) {
            let declared = effective_qualifier(&scope.arena, base);
            let adjusted = match fact {
                FlowFact::NonNull if declared != NullQualifier::NonNull => {
                    Some(NullQualifier::NonNull)
                }
                FlowFact::Null | FlowFact::Nullable if declared != NullQualifier::Nullable => {
                    Some(NullQualifier::Nullable)
                }
                _ => None,
            };
            if let Some(qualifier) = adjusted {
                return Some(scope.arena.with_qualifier(
                    base,
                    qualifier,
                    QualifierOrigin::Unspecified,
                ));
            }
        }
    }
    Some(base)
}

/// Display form of a method for diagnostics, e.g. `get(int)`.
pub(crate) fn method_display(method: &MethodDecl) -> String {
    let params: Vec<&str> = method
        .params
        .iter()
        .map(|param| type_use_display(&param.ty))
        .collect();
    format!("{}({})", method.name, params.join(", "))
}

pub(crate) fn type_use_display(ty: &TypeUse) -> &str {
    match &ty.shape {
        crate::ir::TypeUseShape::Named { name, .. } => {
            name.rsplit('.').next().unwrap_or(name)
        }
        crate::ir::TypeUseShape::Array { element } => type_use_display(element),
        crate::ir::TypeUseShape::Variable { name } => name,
        crate::ir::TypeUseShape::Primitive { name } => name,
        crate::ir::TypeUseShape::Wildcard { .. } => "?",
    }
}

/// Statement/expression events a body-walking check subscribes to. The
/// walker owns flow maintenance; visitors only observe.
pub(crate) trait BodyVisitor {
    fn on_assignment(&mut self, _scope: &mut MethodScope<'_>, _required: TypeId, _value: &Expr) {}
    fn on_expression(&mut self, _scope: &mut MethodScope<'_>, _expr: &Expr) {}
    fn on_null_comparison(
        &mut self,
        _scope: &mut MethodScope<'_>,
        _comparison: &NullComparison<'_>,
    ) {
    }
}

pub(crate) fn walk_method(scope: &mut MethodScope<'_>, visitor: &mut dyn BodyVisitor) {
    let Some(method) = scope.method else {
        return;
    };
    walk_stmts(scope, visitor, &method.body);
}

/// Walk one field initializer, treating it as an assignment to the field.
pub(crate) fn walk_field(
    scope: &mut MethodScope<'_>,
    visitor: &mut dyn BodyVisitor,
    field: &crate::ir::FieldDecl,
) {
    let Some(init) = &field.init else {
        return;
    };
    let required = scope
        .context
        .types_of(&scope.class.name)
        .and_then(|types| types.fields.get(&field.name).copied());
    walk_expr(scope, visitor, init);
    if let Some(required) = required {
        visitor.on_assignment(scope, required, init);
    }
}

/// Returns true when the statement list definitely returned.
fn walk_stmts(scope: &mut MethodScope<'_>, visitor: &mut dyn BodyVisitor, stmts: &[Stmt]) -> bool {
    for stmt in stmts {
        match stmt {
            Stmt::Local {
                name,
                ty,
                dim_annotations,
                init,
                ..
            } => {
                let id = scope.build_type(ty, dim_annotations.as_deref());
                scope.locals.insert(name.clone(), id);
                if let Some(init) = init {
                    walk_expr(scope, visitor, init);
                    visitor.on_assignment(scope, id, init);
                    let fact = fact_of(scope, init);
                    scope.flow.set(name, fact);
                }
            }
            Stmt::Assign { target, value, .. } => {
                walk_expr(scope, visitor, value);
                match target {
                    Expr::Name { name, .. } => {
                        let required = scope.locals.get(name).copied().or_else(|| {
                            scope
                                .context
                                .types_of(&scope.class.name)
                                .and_then(|types| types.fields.get(name).copied())
                        });
                        if let Some(required) = required {
                            visitor.on_assignment(scope, required, value);
                        }
                        let fact = fact_of(scope, value);
                        scope.flow.set(name, fact);
                    }
                    Expr::ArrayAccess { array, .. } => {
                        walk_expr(scope, visitor, array);
                        let element = expr_type(scope, array).and_then(|array_ty| {
                            match &scope.arena.node(array_ty).shape {
                                Shape::Array { element } => Some(*element),
                                _ => None,
                            }
                        });
                        if let Some(element) = element {
                            visitor.on_assignment(scope, element, value);
                        }
                    }
                    other => walk_expr(scope, visitor, other),
                }
            }
            Stmt::Expr { expr, .. } => walk_expr(scope, visitor, expr),
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    walk_expr(scope, visitor, value);
                    if let Some(required) = scope.return_type {
                        visitor.on_assignment(scope, required, value);
                    }
                }
                return true;
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                walk_expr(scope, visitor, cond);
                let (then_flow, else_flow) = match null_comparison(cond) {
                    Some(comparison) => apply_guard(&scope.flow, &comparison),
                    None => (scope.flow.clone(), scope.flow.clone()),
                };
                let saved_locals = scope.locals.clone();
                scope.flow = then_flow;
                let then_terminated = walk_stmts(scope, visitor, then_body);
                let after_then = scope.flow.clone();
                scope.locals = saved_locals.clone();
                scope.flow = else_flow;
                let else_terminated = walk_stmts(scope, visitor, else_body);
                let after_else = scope.flow.clone();
                scope.locals = saved_locals;
                if then_terminated && else_terminated {
                    return true;
                }
                scope.flow = if then_terminated {
                    after_else
                } else if else_terminated {
                    after_then
                } else {
                    after_then.join(&after_else)
                };
            }
            Stmt::Assert { cond, .. } => {
                walk_expr(scope, visitor, cond);
                if scope.context.config().include_asserts {
                    if let Some(comparison) = null_comparison(cond) {
                        if comparison.op == CompareOp::Ne {
                            scope.flow.set(comparison.name, FlowFact::NonNull);
                        }
                    }
                }
            }
            Stmt::Try { body, catches, .. } => {
                let pre_flow = scope.flow.clone();
                let saved_locals = scope.locals.clone();
                walk_stmts(scope, visitor, body);
                // Exceptions may leave the body anywhere: catches start from
                // the pre-try state, and everything joins afterwards.
                let mut merged = scope.flow.join(&pre_flow);
                for catch in catches {
                    scope.locals = saved_locals.clone();
                    scope.flow = pre_flow.clone();
                    let caught = scope
                        .arena
                        .scalar(exception_name(&catch.ty), NullQualifier::NonNull);
                    scope.locals.insert(catch.name.clone(), caught);
                    scope.flow.set(&catch.name, FlowFact::NonNull);
                    walk_stmts(scope, visitor, &catch.body);
                    merged = merged.join(&scope.flow);
                }
                scope.locals = saved_locals;
                scope.flow = merged;
            }
        }
    }
    false
}

/// Emit the canonical diagnostic for one required/provided value position
/// (assignment, return, array store, or call argument).
pub(crate) fn check_value(scope: &mut MethodScope<'_>, required: TypeId, value: &Expr) {
    let Some(provided) = provided_type(scope, value) else {
        return;
    };
    let context = scope.context;
    let result = crate::compat::check(
        &mut scope.arena,
        required,
        provided,
        crate::compat::CheckMode::Compatible,
        context,
    );
    match result.verdict {
        crate::compat::Verdict::Ok => {}
        crate::compat::Verdict::Unchecked => {
            let provided_rendered = scope.arena.render(provided);
            let required_rendered = scope.arena.render(required);
            scope.emit(crate::diagnostics::unchecked_conversion(
                value.span(),
                &provided_rendered,
                &required_rendered,
            ));
        }
        crate::compat::Verdict::Mismatch => {
            if value.is_null_literal() {
                let required_rendered = scope.arena.render_required(required);
                scope.emit(crate::diagnostics::mismatch_null_value(
                    value.span(),
                    &required_rendered,
                ));
            } else if flow_inferred_nullable(scope, value) {
                let required_rendered = scope.arena.render_required(required);
                scope.emit(crate::diagnostics::mismatch_inferred_nullable(
                    value.span(),
                    &required_rendered,
                ));
            } else {
                // The full rendering names the failing dimension or argument
                // through its per-position qualifiers.
                let hint = result.supertype_hint.map(|id| scope.arena.render(id));
                let required_rendered = scope.arena.render_required(required);
                let provided_rendered = scope.arena.render(provided);
                scope.emit(crate::diagnostics::mismatch_types(
                    value.span(),
                    &required_rendered,
                    &provided_rendered,
                    hint.as_deref(),
                ));
            }
        }
    }
}

/// A mismatching value whose nullness came from flow, not its declared type.
fn flow_inferred_nullable(scope: &mut MethodScope<'_>, value: &Expr) -> bool {
    let Expr::Name { name, .. } = value else {
        return false;
    };
    if !matches!(
        scope.flow.fact(name),
        Some(FlowFact::Null | FlowFact::Nullable)
    ) {
        return false;
    }
    let declared = scope.locals.get(name).copied().or_else(|| {
        scope
            .context
            .types_of(&scope.class.name)
            .and_then(|types| types.fields.get(name).copied())
    });
    match declared {
        Some(id) => effective_qualifier(&scope.arena, id) != NullQualifier::Nullable,
        None => true,
    }
}

/// The single-abstract-method descriptor of a functional-interface target
/// type, substituted with the target's type arguments.
pub(crate) struct FunctionalDescriptor {
    pub(crate) params: Vec<TypeId>,
    pub(crate) return_type: Option<TypeId>,
    pub(crate) display: String,
}

pub(crate) fn functional_descriptor(
    scope: &mut MethodScope<'_>,
    required: TypeId,
) -> Option<FunctionalDescriptor> {
    let node = scope.arena.node(required).clone();
    let (name, args) = match node.shape {
        Shape::Parameterized { name, args, .. } => (name, args),
        Shape::Scalar { name, .. } => (name, Vec::new()),
        _ => return None,
    };
    let decl = scope.context.class(&name)?;
    let sam = decl.functional_descriptor()?;
    let types = scope.context.types_of(&decl.name)?;
    let method_types = types.methods.get(&sam.key())?;
    let mut subst = Substitution::new();
    for (param, arg) in decl.type_params.iter().zip(args.iter()) {
        subst.insert(&param.name, arg.ty);
    }
    let params: Vec<TypeId> = method_types
        .params
        .iter()
        .map(|id| {
            let imported = scope.arena.import(&types.arena, *id);
            substitute(&mut scope.arena, imported, &subst)
        })
        .collect();
    let return_type = method_types.return_type.map(|id| {
        let imported = scope.arena.import(&types.arena, id);
        substitute(&mut scope.arena, imported, &subst)
    });
    let display = format!("{}.{}", scope.arena.render(required), method_display(sam));
    Some(FunctionalDescriptor {
        params,
        return_type,
        display,
    })
}

/// Target-type a lambda or method reference against a functional-interface
/// required type. Returns true when the value was handled here.
pub(crate) fn check_functional(scope: &mut MethodScope<'_>, required: TypeId, value: &Expr) -> bool {
    match value {
        Expr::Lambda { params, .. } => {
            let Some(descriptor) = functional_descriptor(scope, required) else {
                return true;
            };
            for (lambda_param, descriptor_param) in params.iter().zip(descriptor.params.iter()) {
                let Some(ty) = &lambda_param.ty else {
                    continue;
                };
                let explicit = scope.build_type_silently(ty);
                let lambda_qualifier = scope.arena.qualifier(explicit);
                let descriptor_qualifier = effective_qualifier(&scope.arena, *descriptor_param);
                // The descriptor's nullness wins over the lambda's explicit
                // parameter type; a @NonNull parameter cannot implement a
                // @Nullable descriptor position.
                if lambda_qualifier == NullQualifier::NonNull
                    && descriptor_qualifier == NullQualifier::Nullable
                {
                    let required_rendered = scope.arena.render(*descriptor_param);
                    let provided_rendered = scope.arena.render(explicit);
                    scope.emit(crate::diagnostics::mismatch_types(
                        value.span(),
                        &required_rendered,
                        &provided_rendered,
                        None,
                    ));
                }
            }
            true
        }
        Expr::MethodRef {
            qualifier,
            method,
            span,
        } => {
            let Some(descriptor) = functional_descriptor(scope, required) else {
                return true;
            };
            check_method_reference(scope, &descriptor, qualifier, method, *span);
            true
        }
        _ => false,
    }
}

fn check_method_reference(
    scope: &mut MethodScope<'_>,
    descriptor: &FunctionalDescriptor,
    qualifier: &TypeUse,
    method_name: &str,
    span: crate::ir::Span,
) {
    let Some(owner_name) = (match &qualifier.shape {
        crate::ir::TypeUseShape::Named { name, .. } => Some(name.clone()),
        _ => None,
    }) else {
        return;
    };
    let Some(owner) = scope.context.class(&owner_name) else {
        return;
    };
    let referenced = owner
        .methods
        .iter()
        .find(|candidate| {
            candidate.name == method_name && candidate.params.len() == descriptor.params.len()
        })
        .or_else(|| {
            owner.methods.iter().find(|candidate| {
                candidate.name == method_name
                    && candidate.is_varargs
                    && candidate.params.len() <= descriptor.params.len()
            })
        });
    let Some(referenced) = referenced else {
        return;
    };
    let Some(owner_types) = scope.context.types_of(&owner.name) else {
        return;
    };
    let Some(referenced_types) = owner_types.methods.get(&referenced.key()) else {
        return;
    };
    let referenced_params: Vec<TypeId> = referenced_types
        .params
        .iter()
        .map(|id| scope.arena.import(&owner_types.arena, *id))
        .collect();
    let referenced_return = referenced_types
        .return_type
        .map(|id| scope.arena.import(&owner_types.arena, id));

    // Each positional parameter of the synthetic descriptor is checked
    // independently, including the one-element vs. pass-through-array
    // varargs forms.
    for (index, provided) in descriptor.params.iter().enumerate() {
        let required = if index < referenced_params.len() {
            let candidate = referenced_params[index];
            let is_last = index == referenced_params.len() - 1;
            if referenced.is_varargs && is_last && descriptor.params.len() > referenced_params.len()
            {
                varargs_element(scope, candidate)
            } else if referenced.is_varargs && is_last {
                // Exact arity: array-to-array passes through, otherwise the
                // element form applies.
                let provided_is_array =
                    matches!(scope.arena.node(*provided).shape, Shape::Array { .. });
                if provided_is_array {
                    candidate
                } else {
                    varargs_element(scope, candidate)
                }
            } else {
                candidate
            }
        } else if referenced.is_varargs {
            let last = *referenced_params.last().expect("varargs parameter");
            varargs_element(scope, last)
        } else {
            break;
        };
        let context = scope.context;
        let result = crate::compat::check(
            &mut scope.arena,
            required,
            *provided,
            crate::compat::CheckMode::Compatible,
            context,
        );
        match result.verdict {
            crate::compat::Verdict::Ok => {}
            crate::compat::Verdict::Unchecked => {
                let required_rendered = scope.arena.render(required);
                scope.emit(crate::diagnostics::unchecked_descriptor_parameter(
                    span,
                    index + 1,
                    &required_rendered,
                    &descriptor.display,
                ));
            }
            crate::compat::Verdict::Mismatch => {
                let required_rendered = scope.arena.render_required(required);
                let provided_rendered = scope.arena.render(*provided);
                scope.emit(crate::diagnostics::mismatch_descriptor_parameter(
                    span,
                    index + 1,
                    &required_rendered,
                    &provided_rendered,
                    &descriptor.display,
                ));
            }
        }
    }

    if let (Some(required_return), Some(provided_return)) =
        (descriptor.return_type, referenced_return)
    {
        let context = scope.context;
        let result = crate::compat::check(
            &mut scope.arena,
            required_return,
            provided_return,
            crate::compat::CheckMode::Compatible,
            context,
        );
        if result.verdict == crate::compat::Verdict::Mismatch {
            let required_rendered = scope.arena.render_required(required_return);
            let provided_rendered = scope.arena.render(provided_return);
            scope.emit(crate::diagnostics::mismatch_types(
                span,
                &required_rendered,
                &provided_rendered,
                None,
            ));
        }
    }
}

fn varargs_element(scope: &MethodScope<'_>, array: TypeId) -> TypeId {
    match &scope.arena.node(array).shape {
        Shape::Array { element } => *element,
        _ => array,
    }
}

fn exception_name(ty: &TypeUse) -> &str {
    match &ty.shape {
        crate::ir::TypeUseShape::Named { name, .. } => name,
        _ => "java.lang.Throwable",
    }
}

fn walk_expr(scope: &mut MethodScope<'_>, visitor: &mut dyn BodyVisitor, expr: &Expr) {
    visitor.on_expression(scope, expr);
    if let Some(comparison) = null_comparison(expr) {
        visitor.on_null_comparison(scope, &comparison);
    }
    match expr {
        Expr::Call { receiver, args, .. } => {
            if let Some(receiver) = receiver {
                walk_expr(scope, visitor, receiver);
            }
            for arg in args {
                walk_expr(scope, visitor, arg);
            }
        }
        Expr::New { args, .. } => {
            for arg in args {
                walk_expr(scope, visitor, arg);
            }
        }
        Expr::ArrayAccess { array, .. } => walk_expr(scope, visitor, array),
        Expr::Cast { expr: inner, .. } | Expr::InstanceOf { expr: inner, .. } => {
            walk_expr(scope, visitor, inner)
        }
        Expr::Compare { left, right, .. } => {
            walk_expr(scope, visitor, left);
            walk_expr(scope, visitor, right);
        }
        Expr::Lambda { params, body, .. } => {
            if let Some(body) = body {
                let saved_locals = scope.locals.clone();
                for param in params {
                    if let Some(ty) = &param.ty {
                        let id = scope.build_type_silently(ty);
                        scope.locals.insert(param.name.clone(), id);
                    }
                }
                walk_expr(scope, visitor, body);
                scope.locals = saved_locals;
            }
        }
        Expr::Null { .. } | Expr::Literal { .. } | Expr::Name { .. } | Expr::MethodRef { .. } => {}
    }
}
