use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use opentelemetry::KeyValue;
use serde_sarif::sarif::{ReportingDescriptor, Result as SarifResult};

use crate::annotated::{
    AnnotatedTypeBuilder, DefaultScope, Shape, TypeArena, TypeId, TypeParamContract,
    TypeParamResolver, simple_name,
};
use crate::checks::{Check, all_checks};
use crate::compat::HierarchyResolver;
use crate::config::AnalysisConfig;
use crate::diagnostics::{self, Diagnostic, Severity};
use crate::ir::{AnnotationUse, ClassDecl, CompilationUnit, MethodDecl, TypeParamDecl};
use crate::lattice::{self, NullQualifier};
use crate::substitute::{Substitution, substitute};
use crate::telemetry::{Telemetry, with_span};

/// Annotated types built once per class and read by every check.
pub(crate) struct ClassTypes {
    pub(crate) arena: TypeArena,
    /// Field name to its declared annotated type.
    pub(crate) fields: BTreeMap<String, TypeId>,
    /// Method key (`name/arity`) to its declared annotated signature.
    pub(crate) methods: BTreeMap<String, MethodTypes>,
    /// Diagnostics produced while building (contradictions, malformed
    /// dimensions, redundant annotations, raw-type usage).
    pub(crate) diagnostics: Vec<Diagnostic>,
}

pub(crate) struct MethodTypes {
    pub(crate) params: Vec<TypeId>,
    pub(crate) return_type: Option<TypeId>,
    /// Non-constructor without a resolvable return type: the declaration is
    /// skipped as a whole, the rest of the unit is unaffected.
    pub(crate) malformed: bool,
    /// Type variables in scope inside the method (class + method params).
    pub(crate) type_params: BTreeMap<String, NullQualifier>,
    pub(crate) scope: DefaultScope,
}

/// Nullness signature of an inherited method declaration.
#[derive(Clone, Debug)]
pub(crate) struct AncestorSignature {
    pub(crate) class_name: String,
    pub(crate) method_name: String,
    pub(crate) return_qualifier: NullQualifier,
    pub(crate) param_qualifiers: Vec<NullQualifier>,
}

/// Effective inherited contract of a method, merged over all ancestor
/// declarations via the qualifier lattice.
#[derive(Clone, Debug)]
pub(crate) struct MethodContract {
    pub(crate) return_qualifier: NullQualifier,
    pub(crate) param_qualifiers: Vec<NullQualifier>,
}

/// Inputs shared by analysis checks.
pub(crate) struct AnalysisContext {
    units: Vec<CompilationUnit>,
    config: AnalysisConfig,
    /// Qualified and (unambiguous) simple class names to their position.
    class_index: BTreeMap<String, (usize, usize)>,
    types: BTreeMap<String, ClassTypes>,
    /// `class\u{0}method-key` to the ancestor declarations, nearest first.
    contracts: BTreeMap<String, Vec<AncestorSignature>>,
    telemetry: Option<Arc<Telemetry>>,
}

/// Timing breakdown for context construction.
pub(crate) struct ContextTimings {
    pub(crate) type_cache_duration_ms: u128,
    pub(crate) contract_duration_ms: u128,
}

impl AnalysisContext {
    pub(crate) fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub(crate) fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub(crate) fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_deref()
    }

    pub(crate) fn with_span<T, F>(&self, name: &str, attributes: &[KeyValue], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        with_span(self.telemetry(), name, attributes, f)
    }

    pub(crate) fn class(&self, name: &str) -> Option<&ClassDecl> {
        let (unit_index, class_index) = self.class_index.get(name)?;
        Some(&self.units[*unit_index].classes[*class_index])
    }

    pub(crate) fn types_of(&self, class_name: &str) -> Option<&ClassTypes> {
        if let Some(types) = self.types.get(class_name) {
            return Some(types);
        }
        let qualified = self.class(class_name)?.name.clone();
        self.types.get(&qualified)
    }

    /// Direct and transitive supertype declarations, nearest first.
    pub(crate) fn supertype_decls(&self, class: &ClassDecl) -> Vec<&ClassDecl> {
        let mut result = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        if let Some(superclass) = &class.superclass {
            if let Some(name) = type_use_name(superclass) {
                queue.push_back(name.to_string());
            }
        }
        for interface in &class.interfaces {
            if let Some(name) = type_use_name(interface) {
                queue.push_back(name.to_string());
            }
        }
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(decl) = self.class(&name) else {
                continue;
            };
            result.push(decl);
            if let Some(superclass) = &decl.superclass {
                if let Some(name) = type_use_name(superclass) {
                    queue.push_back(name.to_string());
                }
            }
            for interface in &decl.interfaces {
                if let Some(name) = type_use_name(interface) {
                    queue.push_back(name.to_string());
                }
            }
        }
        result
    }

    /// Resolve a method by name and arity on a class or its supertypes.
    pub(crate) fn find_method(
        &self,
        class_name: &str,
        method_name: &str,
        arity: usize,
    ) -> Option<(&ClassDecl, &MethodDecl)> {
        let decl = self.class(class_name)?;
        let key = format!("{method_name}/{arity}");
        if let Some(method) = decl.methods.iter().find(|m| m.key() == key) {
            return Some((decl, method));
        }
        for ancestor in self.supertype_decls(decl) {
            if let Some(method) = ancestor.methods.iter().find(|m| m.key() == key) {
                return Some((ancestor, method));
            }
        }
        None
    }

    /// Ancestor declarations of `method_key` above `class_name`, nearest
    /// first; empty when the method overrides nothing.
    pub(crate) fn inherited_signatures(
        &self,
        class_name: &str,
        method_key: &str,
    ) -> &[AncestorSignature] {
        self.contracts
            .get(&contract_key(class_name, method_key))
            .map(|signatures| signatures.as_slice())
            .unwrap_or(&[])
    }

    /// The effective inherited contract, merged across all ancestor layers:
    /// returns combine toward the strongest promise, parameters toward the
    /// weakest requirement.
    pub(crate) fn effective_contract(
        &self,
        class_name: &str,
        method_key: &str,
    ) -> Option<MethodContract> {
        let signatures = self.inherited_signatures(class_name, method_key);
        let first = signatures.first()?;
        let mut contract = MethodContract {
            return_qualifier: first.return_qualifier,
            param_qualifiers: first.param_qualifiers.clone(),
        };
        for signature in &signatures[1..] {
            contract.return_qualifier =
                lattice::stronger(contract.return_qualifier, signature.return_qualifier);
            for (merged, next) in contract
                .param_qualifiers
                .iter_mut()
                .zip(signature.param_qualifiers.iter())
            {
                *merged = lattice::weaker(*merged, *next);
            }
        }
        Some(contract)
    }

    fn construction_diagnostics(&self) -> Vec<Diagnostic> {
        self.types
            .values()
            .flat_map(|types| types.diagnostics.iter().cloned())
            .collect()
    }
}

impl TypeParamResolver for AnalysisContext {
    fn type_params_of(&self, class_name: &str) -> Vec<TypeParamContract> {
        let Some(decl) = self.class(class_name) else {
            return Vec::new();
        };
        type_param_contracts(&decl.type_params, &self.config)
    }
}

impl HierarchyResolver for AnalysisContext {
    fn corresponding_supertype(
        &self,
        arena: &mut TypeArena,
        provided: TypeId,
        required_name: &str,
    ) -> Option<TypeId> {
        self.supertype_with_name(arena, provided, required_name, 0)
    }
}

impl AnalysisContext {
    fn supertype_with_name(
        &self,
        arena: &mut TypeArena,
        provided: TypeId,
        required_name: &str,
        depth: usize,
    ) -> Option<TypeId> {
        if depth > 16 {
            return None;
        }
        let node = arena.node(provided).clone();
        let (name, args) = match node.shape {
            Shape::Parameterized { name, args, .. } => (name, args),
            Shape::Scalar { name, .. } => (name, Vec::new()),
            _ => return None,
        };
        if simple_name(&name) == simple_name(required_name) {
            return Some(provided);
        }
        let decl = self.class(&name)?;
        let mut subst = Substitution::new();
        for (param, arg) in decl.type_params.iter().zip(args.iter()) {
            subst.insert(&param.name, arg.ty);
        }
        let scope_params = type_param_qualifiers(&decl.type_params, &[], &self.config);
        let supertype_uses = decl
            .superclass
            .iter()
            .chain(decl.interfaces.iter())
            .cloned()
            .collect::<Vec<_>>();
        for supertype_use in supertype_uses {
            let built = {
                let mut builder =
                    AnnotatedTypeBuilder::new(arena, &self.config, self, scope_params.clone());
                let id = builder.build(&supertype_use, &DefaultScope::none());
                // Diagnostics for supertype clauses were already reported
                // when the declaring class was cached.
                let _ = builder.take_diagnostics();
                id
            };
            let instantiated = substitute(arena, built, &subst);
            if let Some(found) =
                self.supertype_with_name(arena, instantiated, required_name, depth + 1)
            {
                return Some(found);
            }
        }
        None
    }
}

fn contract_key(class_name: &str, method_key: &str) -> String {
    format!("{class_name}\u{0}{method_key}")
}

fn type_use_name(ty: &crate::ir::TypeUse) -> Option<&str> {
    match &ty.shape {
        crate::ir::TypeUseShape::Named { name, .. } => Some(name),
        _ => None,
    }
}

/// Explicit nullness qualifier written in an annotation list, plus whether
/// both tags were present.
pub(crate) fn explicit_qualifier(
    annotations: &[AnnotationUse],
    config: &AnalysisConfig,
) -> (Option<NullQualifier>, bool) {
    let mut explicit = None;
    let mut conflict = false;
    for annotation in annotations {
        let Some(tag) = config.classify(&annotation.name) else {
            continue;
        };
        match explicit {
            None => explicit = Some(tag),
            Some(previous) if previous != tag => conflict = true,
            Some(_) => {}
        }
    }
    (explicit, conflict)
}

/// Declared bound qualifiers of type parameters: a direct annotation on the
/// parameter wins, else the top-level annotation of its bound.
pub(crate) fn type_param_qualifiers(
    class_params: &[TypeParamDecl],
    method_params: &[TypeParamDecl],
    config: &AnalysisConfig,
) -> BTreeMap<String, NullQualifier> {
    let mut map = BTreeMap::new();
    for param in class_params.iter().chain(method_params.iter()) {
        map.insert(param.name.clone(), declared_param_qualifier(param, config));
    }
    map
}

pub(crate) fn declared_param_qualifier(
    param: &TypeParamDecl,
    config: &AnalysisConfig,
) -> NullQualifier {
    let (direct, _) = explicit_qualifier(&param.annotations, config);
    if let Some(tag) = direct {
        return tag;
    }
    if let Some(bound) = &param.bound {
        let (from_bound, _) = explicit_qualifier(&bound.annotations, config);
        if let Some(tag) = from_bound {
            return tag;
        }
    }
    NullQualifier::Unspecified
}

pub(crate) fn type_param_contracts(
    params: &[TypeParamDecl],
    config: &AnalysisConfig,
) -> Vec<TypeParamContract> {
    params
        .iter()
        .map(|param| TypeParamContract {
            name: param.name.clone(),
            qualifier: declared_param_qualifier(param, config),
        })
        .collect()
}

/// Build the per-class annotated-type cache and effective contracts.
pub(crate) fn build_context_with_timings(
    units: Vec<CompilationUnit>,
    config: AnalysisConfig,
    telemetry: Option<Arc<Telemetry>>,
) -> (AnalysisContext, ContextTimings) {
    let mut class_index = BTreeMap::new();
    let mut ambiguous_simple = BTreeSet::new();
    for (unit_index, unit) in units.iter().enumerate() {
        for (position, class) in unit.classes.iter().enumerate() {
            class_index.insert(class.name.clone(), (unit_index, position));
            let simple = class.simple_name().to_string();
            if simple != class.name {
                if class_index.contains_key(&simple) {
                    ambiguous_simple.insert(simple);
                } else {
                    class_index.insert(simple, (unit_index, position));
                }
            }
        }
    }
    for simple in ambiguous_simple {
        class_index.remove(&simple);
    }

    let mut context = AnalysisContext {
        units,
        config,
        class_index,
        types: BTreeMap::new(),
        contracts: BTreeMap::new(),
        telemetry,
    };

    let cache_started_at = Instant::now();
    let mut types = BTreeMap::new();
    for unit in &context.units {
        for class in &unit.classes {
            let class_types = with_span(
                context.telemetry(),
                "class_types",
                &[KeyValue::new("nullspect.class", class.name.clone())],
                || build_class_types(unit, class, &context.config, &context),
            );
            types.insert(class.name.clone(), class_types);
        }
    }
    context.types = types;
    let type_cache_duration_ms = cache_started_at.elapsed().as_millis();

    let contract_started_at = Instant::now();
    let mut contracts = BTreeMap::new();
    for unit in &context.units {
        for class in &unit.classes {
            for method in &class.methods {
                if method.is_constructor || method.is_static {
                    continue;
                }
                let signatures = inherited_signatures_of(&context, class, method);
                if !signatures.is_empty() {
                    contracts.insert(contract_key(&class.name, &method.key()), signatures);
                }
            }
        }
    }
    context.contracts = contracts;
    let contract_duration_ms = contract_started_at.elapsed().as_millis();

    (
        context,
        ContextTimings {
            type_cache_duration_ms,
            contract_duration_ms,
        },
    )
}

#[cfg(test)]
pub(crate) fn build_context(units: Vec<CompilationUnit>, config: AnalysisConfig) -> AnalysisContext {
    let (context, _) = build_context_with_timings(units, config, None);
    context
}

fn build_class_types(
    unit: &CompilationUnit,
    class: &ClassDecl,
    config: &AnalysisConfig,
    resolver: &AnalysisContext,
) -> ClassTypes {
    let mut arena = TypeArena::new();
    let mut diagnostics = Vec::new();
    let class_scope = DefaultScope::resolve(unit.default_nullness, class.default_nullness, None);
    let class_params = type_param_qualifiers(&class.type_params, &[], config);

    if config.report_redundant_annotations
        && class.default_nullness.is_some()
        && class.default_nullness == unit.default_nullness
    {
        let scope = match &unit.package {
            Some(package) => format!("package {package}"),
            None => "compilation unit".to_string(),
        };
        diagnostics
            .push(diagnostics::redundant_default(class.span, &scope).at(&unit.path, &class.name));
    }

    for param in &class.type_params {
        let (_, conflict) = explicit_qualifier(&param.annotations, config);
        if conflict {
            diagnostics.push(
                diagnostics::contradictory_annotation(param.span).at(&unit.path, &class.name),
            );
        }
    }

    let mut fields = BTreeMap::new();
    for field in &class.fields {
        let mut builder =
            AnnotatedTypeBuilder::new(&mut arena, config, resolver, class_params.clone());
        let id = builder.build_declared(&field.ty, field.dim_annotations.as_deref(), &class_scope);
        for diagnostic in builder.take_diagnostics() {
            diagnostics.push(diagnostic.at(&unit.path, format!("{}.{}", class.name, field.name)));
        }
        fields.insert(field.name.clone(), id);
    }

    let mut methods = BTreeMap::new();
    for method in &class.methods {
        let scope = DefaultScope::resolve(
            unit.default_nullness,
            class.default_nullness,
            method.default_nullness,
        );
        if config.report_redundant_annotations
            && method.default_nullness.is_some()
            && method.default_nullness == class.default_nullness.or(unit.default_nullness)
        {
            diagnostics.push(
                diagnostics::redundant_default(
                    method.span,
                    &format!("type {}", class.simple_name()),
                )
                .at(&unit.path, format!("{}.{}", class.name, method.name)),
            );
        }
        let logical = format!("{}.{}()", class.name, method.name);
        let type_params = type_param_qualifiers(&class.type_params, &method.type_params, config);
        for param in &method.type_params {
            let (_, conflict) = explicit_qualifier(&param.annotations, config);
            if conflict {
                diagnostics.push(
                    diagnostics::contradictory_annotation(param.span).at(&unit.path, &logical),
                );
            }
        }
        let mut builder =
            AnnotatedTypeBuilder::new(&mut arena, config, resolver, type_params.clone());
        let params: Vec<TypeId> = method
            .params
            .iter()
            .map(|param| builder.build_declared(&param.ty, param.dim_annotations.as_deref(), &scope))
            .collect();
        let return_type = method
            .return_type
            .as_ref()
            .map(|ty| builder.build_declared(ty, method.dim_annotations.as_deref(), &scope));
        let malformed = !method.is_constructor && method.return_type.is_none();
        if malformed {
            tracing::warn!(
                class = class.name.as_str(),
                method = method.name.as_str(),
                "skipping declaration without a resolvable return type"
            );
        }
        for diagnostic in builder.take_diagnostics() {
            diagnostics.push(diagnostic.at(&unit.path, logical.clone()));
        }
        methods.insert(
            method.key(),
            MethodTypes {
                params,
                return_type,
                malformed,
                type_params,
                scope,
            },
        );
    }

    ClassTypes {
        arena,
        fields,
        methods,
        diagnostics,
    }
}

fn inherited_signatures_of(
    context: &AnalysisContext,
    class: &ClassDecl,
    method: &MethodDecl,
) -> Vec<AncestorSignature> {
    let key = method.key();
    let mut signatures = Vec::new();
    for ancestor in context.supertype_decls(class) {
        let Some(declared) = ancestor
            .methods
            .iter()
            .find(|candidate| !candidate.is_static && candidate.key() == key)
        else {
            continue;
        };
        let Some(types) = context.types.get(&ancestor.name) else {
            continue;
        };
        let Some(method_types) = types.methods.get(&key) else {
            continue;
        };
        if method_types.malformed {
            continue;
        }
        let return_qualifier = method_types
            .return_type
            .map(|id| crate::substitute::effective_qualifier(&types.arena, id))
            .unwrap_or(NullQualifier::Unspecified);
        let param_qualifiers = method_types
            .params
            .iter()
            .map(|id| crate::substitute::effective_qualifier(&types.arena, *id))
            .collect();
        signatures.push(AncestorSignature {
            class_name: ancestor.name.clone(),
            method_name: declared.name.clone(),
            return_qualifier,
            param_qualifiers,
        });
    }
    signatures
}

/// Analysis engine that executes the registered checks.
pub(crate) struct Engine {
    checks: Vec<Box<dyn Check + Sync>>,
}

/// Aggregated SARIF payload from check execution.
pub(crate) struct EngineOutput {
    pub(crate) rules: Vec<ReportingDescriptor>,
    pub(crate) results: Vec<SarifResult>,
    pub(crate) error_count: usize,
    pub(crate) warning_count: usize,
}

impl Engine {
    pub(crate) fn new() -> Self {
        let mut checks = all_checks();
        checks.sort_by(|a, b| a.metadata().id.cmp(b.metadata().id));
        Self { checks }
    }

    pub(crate) fn analyze(&self, context: &AnalysisContext) -> Result<EngineOutput> {
        let mut diagnostics = context.construction_diagnostics();

        for check in &self.checks {
            let metadata = check.metadata();
            let span_attributes = [KeyValue::new("nullspect.check_id", metadata.id)];
            let check_diagnostics = with_span(
                context.telemetry(),
                &format!("check:{}", metadata.id),
                &span_attributes,
                || check.run(context),
            )?;
            diagnostics.extend(check_diagnostics);
        }

        diagnostics.sort_by_key(|diagnostic| diagnostic.sort_key());

        let error_count = diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity == Severity::Error)
            .count();
        let warning_count = diagnostics.len() - error_count;
        let results = diagnostics.iter().map(Diagnostic::to_sarif).collect();

        Ok(EngineOutput {
            rules: diagnostics::reporting_descriptors(),
            results,
            error_count,
            warning_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotated::testutil::annotated;
    use crate::ir::{FieldDecl, Span, TypeUse};

    fn class_with_fields(name: &str, fields: Vec<FieldDecl>) -> ClassDecl {
        ClassDecl {
            name: name.to_string(),
            is_interface: false,
            annotations: Vec::new(),
            type_params: Vec::new(),
            default_nullness: None,
            superclass: None,
            interfaces: Vec::new(),
            fields,
            methods: Vec::new(),
            span: Span::default(),
        }
    }

    fn unit_with(classes: Vec<ClassDecl>) -> CompilationUnit {
        CompilationUnit {
            path: "com/example/Sample.java".to_string(),
            package: Some("com.example".to_string()),
            default_nullness: None,
            classes,
        }
    }

    fn field(name: &str, ty: TypeUse) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            ty,
            dim_annotations: None,
            init: None,
            span: Span::default(),
        }
    }

    fn make_value_method(annotations: &[&str]) -> MethodDecl {
        MethodDecl {
            name: "value".to_string(),
            is_static: false,
            is_abstract: false,
            is_constructor: false,
            is_varargs: false,
            type_params: Vec::new(),
            params: Vec::new(),
            return_type: Some(annotated("java.lang.String", annotations)),
            dim_annotations: None,
            receiver_annotations: Vec::new(),
            receiver_qualifier: None,
            default_nullness: None,
            throws: Vec::new(),
            body: Vec::new(),
            span: Span::default(),
        }
    }

    #[test]
    fn context_caches_field_types_per_class() {
        let class = class_with_fields(
            "com.example.Sample",
            vec![field("value", annotated("java.lang.String", &["NonNull"]))],
        );
        let context = build_context(vec![unit_with(vec![class])], AnalysisConfig::default());
        let types = context.types_of("com.example.Sample").expect("class types");
        let id = types.fields["value"];
        assert_eq!(types.arena.render(id), "@NonNull String");
    }

    #[test]
    fn class_lookup_works_by_simple_name() {
        let class = class_with_fields("com.example.Sample", Vec::new());
        let context = build_context(vec![unit_with(vec![class])], AnalysisConfig::default());
        assert!(context.class("Sample").is_some());
        assert!(context.class("com.example.Sample").is_some());
        assert!(context.class("Missing").is_none());
    }

    #[test]
    fn effective_contract_merges_over_ancestor_layers() {
        // interface I { @NonNull String value(); }
        // class Base implements I { String value(); }
        // class Derived extends Base { String value(); }
        let interface = ClassDecl {
            name: "com.example.I".to_string(),
            is_interface: true,
            annotations: Vec::new(),
            type_params: Vec::new(),
            default_nullness: None,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: vec![make_value_method(&["NonNull"])],
            span: Span::default(),
        };
        let mut base = class_with_fields("com.example.Base", Vec::new());
        base.interfaces = vec![TypeUse::named("com.example.I")];
        base.methods = vec![make_value_method(&[])];
        let mut derived = class_with_fields("com.example.Derived", Vec::new());
        derived.superclass = Some(TypeUse::named("com.example.Base"));
        derived.methods = vec![make_value_method(&[])];

        let context = build_context(
            vec![unit_with(vec![interface, base, derived])],
            AnalysisConfig::default(),
        );
        let contract = context
            .effective_contract("com.example.Derived", "value/0")
            .expect("inherited contract");
        // The @NonNull promise from the interface survives the unannotated
        // intermediate layer.
        assert_eq!(contract.return_qualifier, NullQualifier::NonNull);
    }

    #[test]
    fn corresponding_supertype_substitutes_type_arguments() {
        // class MyList<T> implements List<T>: a MyList<@Nullable String>
        // corresponds to List<@Nullable String>.
        let list = ClassDecl {
            name: "java.util.List".to_string(),
            is_interface: true,
            annotations: Vec::new(),
            type_params: vec![TypeParamDecl {
                name: "E".to_string(),
                annotations: Vec::new(),
                bound: None,
                span: Span::default(),
            }],
            default_nullness: None,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            span: Span::default(),
        };
        let mut my_list = class_with_fields("com.example.MyList", Vec::new());
        my_list.type_params = vec![TypeParamDecl {
            name: "T".to_string(),
            annotations: Vec::new(),
            bound: None,
            span: Span::default(),
        }];
        my_list.interfaces = vec![TypeUse {
            annotations: Vec::new(),
            shape: crate::ir::TypeUseShape::Named {
                name: "java.util.List".to_string(),
                args: vec![TypeUse {
                    annotations: Vec::new(),
                    shape: crate::ir::TypeUseShape::Variable {
                        name: "T".to_string(),
                    },
                    span: Span::default(),
                }],
                enclosing: None,
                raw: false,
            },
            span: Span::default(),
        }];
        let context = build_context(
            vec![unit_with(vec![list, my_list])],
            AnalysisConfig::default(),
        );

        let mut arena = TypeArena::new();
        let nullable_string = arena.scalar("java.lang.String", NullQualifier::Nullable);
        let provided = arena.alloc(crate::annotated::AnnotatedNode {
            qualifier: NullQualifier::Unspecified,
            origin: crate::annotated::QualifierOrigin::Unspecified,
            conflict: false,
            shape: Shape::Parameterized {
                name: "com.example.MyList".to_string(),
                args: vec![crate::annotated::TypeArg {
                    param: None,
                    ty: nullable_string,
                }],
                enclosing: None,
            },
        });
        let supertype = context
            .corresponding_supertype(&mut arena, provided, "java.util.List")
            .expect("corresponding supertype");
        assert_eq!(arena.render(supertype), "List<@Nullable String>");
    }

    #[test]
    fn malformed_method_is_marked_and_skipped() {
        let mut broken = make_value_method(&[]);
        broken.name = "broken".to_string();
        broken.return_type = None;
        let mut class = class_with_fields("com.example.Sample", Vec::new());
        class.methods = vec![broken];
        let context = build_context(vec![unit_with(vec![class])], AnalysisConfig::default());
        let types = context.types_of("com.example.Sample").expect("class types");
        assert!(types.methods["broken/0"].malformed);
    }
}
