use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::diagnostics::{
    self, Diagnostic,
};
use crate::ir::{
    AnnotationUse, BoundKind, DefaultNullness, DimUse, Span, TypeUse, TypeUseShape,
};
use crate::lattice::{self, NullQualifier};

/// Index of an [`AnnotatedNode`] inside a [`TypeArena`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct TypeId(u32);

/// Arena holding annotated type trees for one compilation unit. Nodes are
/// immutable once allocated; recursive structural types are representable
/// because children are indices, not ownership pointers.
#[derive(Clone, Debug, Default)]
pub(crate) struct TypeArena {
    nodes: Vec<AnnotatedNode>,
}

/// Where a position's qualifier came from; drives unchecked-conversion and
/// redundant-annotation decisions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum QualifierOrigin {
    Explicit,
    Default,
    Unspecified,
}

/// One structural type position with its nullness qualifier.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AnnotatedNode {
    pub(crate) qualifier: NullQualifier,
    pub(crate) origin: QualifierOrigin,
    /// Both explicit tags were written here; the printer renders the dual
    /// tag, the lattice never sees a fourth value.
    pub(crate) conflict: bool,
    pub(crate) shape: Shape,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Shape {
    Scalar {
        name: String,
        enclosing: Option<TypeId>,
    },
    Primitive {
        name: String,
    },
    Array {
        element: TypeId,
    },
    Parameterized {
        name: String,
        args: Vec<TypeArg>,
        enclosing: Option<TypeId>,
    },
    WildcardExtends {
        bound: TypeId,
    },
    WildcardSuper {
        bound: TypeId,
    },
    WildcardUnbound,
    Variable {
        name: String,
        bound_qualifier: NullQualifier,
    },
    /// Capture of a wildcard at a call site; participates in compatibility
    /// like a type variable but is never re-substituted.
    Capture {
        kind: Option<BoundKind>,
        bound: Option<TypeId>,
    },
    /// The type of the `null` literal.
    Null,
}

/// A type argument paired with the declaration-side contract of the type
/// parameter it instantiates.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TypeArg {
    pub(crate) param: Option<TypeParamContract>,
    pub(crate) ty: TypeId,
}

/// Declaration-side view of one type parameter: its name and the nullness
/// bound written on its declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TypeParamContract {
    pub(crate) name: String,
    pub(crate) qualifier: NullQualifier,
}

/// Resolves a class name to the nullness contracts of its type parameters.
pub(crate) trait TypeParamResolver {
    fn type_params_of(&self, class_name: &str) -> Vec<TypeParamContract>;
}

impl TypeParamResolver for BTreeMap<String, Vec<TypeParamContract>> {
    fn type_params_of(&self, class_name: &str) -> Vec<TypeParamContract> {
        self.get(class_name).cloned().unwrap_or_default()
    }
}

impl TypeArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, node: AnnotatedNode) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub(crate) fn node(&self, id: TypeId) -> &AnnotatedNode {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn qualifier(&self, id: TypeId) -> NullQualifier {
        self.node(id).qualifier
    }

    /// Allocate a copy of `id` with a different top-level qualifier.
    pub(crate) fn with_qualifier(
        &mut self,
        id: TypeId,
        qualifier: NullQualifier,
        origin: QualifierOrigin,
    ) -> TypeId {
        let mut node = self.node(id).clone();
        node.qualifier = qualifier;
        node.origin = origin;
        self.alloc(node)
    }

    /// Allocate a copy of `id` that carries the contradictory dual tag.
    pub(crate) fn with_conflict(&mut self, id: TypeId) -> TypeId {
        let mut node = self.node(id).clone();
        node.qualifier = NullQualifier::NonNull;
        node.origin = QualifierOrigin::Explicit;
        node.conflict = true;
        self.alloc(node)
    }

    pub(crate) fn scalar(&mut self, name: &str, qualifier: NullQualifier) -> TypeId {
        let origin = if qualifier.is_explicit() {
            QualifierOrigin::Explicit
        } else {
            QualifierOrigin::Unspecified
        };
        self.alloc(AnnotatedNode {
            qualifier,
            origin,
            conflict: false,
            shape: Shape::Scalar {
                name: name.to_string(),
                enclosing: None,
            },
        })
    }

    pub(crate) fn primitive(&mut self, name: &str) -> TypeId {
        self.alloc(AnnotatedNode {
            qualifier: NullQualifier::Unspecified,
            origin: QualifierOrigin::Unspecified,
            conflict: false,
            shape: Shape::Primitive {
                name: name.to_string(),
            },
        })
    }

    pub(crate) fn null_type(&mut self) -> TypeId {
        self.alloc(AnnotatedNode {
            qualifier: NullQualifier::Nullable,
            origin: QualifierOrigin::Unspecified,
            conflict: false,
            shape: Shape::Null,
        })
    }

    pub(crate) fn is_null_type(&self, id: TypeId) -> bool {
        matches!(self.node(id).shape, Shape::Null)
    }

    /// Deep-copy a type from another arena into this one.
    pub(crate) fn import(&mut self, other: &TypeArena, id: TypeId) -> TypeId {
        let node = other.node(id).clone();
        let shape = match node.shape {
            Shape::Scalar { name, enclosing } => Shape::Scalar {
                name,
                enclosing: enclosing.map(|enc| self.import(other, enc)),
            },
            Shape::Primitive { name } => Shape::Primitive { name },
            Shape::Array { element } => Shape::Array {
                element: self.import(other, element),
            },
            Shape::Parameterized {
                name,
                args,
                enclosing,
            } => Shape::Parameterized {
                name,
                args: args
                    .into_iter()
                    .map(|arg| TypeArg {
                        param: arg.param,
                        ty: self.import(other, arg.ty),
                    })
                    .collect(),
                enclosing: enclosing.map(|enc| self.import(other, enc)),
            },
            Shape::WildcardExtends { bound } => Shape::WildcardExtends {
                bound: self.import(other, bound),
            },
            Shape::WildcardSuper { bound } => Shape::WildcardSuper {
                bound: self.import(other, bound),
            },
            Shape::WildcardUnbound => Shape::WildcardUnbound,
            Shape::Variable {
                name,
                bound_qualifier,
            } => Shape::Variable {
                name,
                bound_qualifier,
            },
            Shape::Capture { kind, bound } => Shape::Capture {
                kind,
                bound: bound.map(|b| self.import(other, b)),
            },
            Shape::Null => Shape::Null,
        };
        self.alloc(AnnotatedNode {
            qualifier: node.qualifier,
            origin: node.origin,
            conflict: node.conflict,
            shape,
        })
    }

    /// Structural equality across arenas, qualifiers included.
    pub(crate) fn same(&self, id: TypeId, other: &TypeArena, other_id: TypeId) -> bool {
        let a = self.node(id);
        let b = other.node(other_id);
        if a.qualifier != b.qualifier || a.conflict != b.conflict {
            return false;
        }
        match (&a.shape, &b.shape) {
            (
                Shape::Scalar { name: n1, enclosing: e1 },
                Shape::Scalar { name: n2, enclosing: e2 },
            ) => {
                simple_name(n1) == simple_name(n2)
                    && match (e1, e2) {
                        (Some(e1), Some(e2)) => self.same(*e1, other, *e2),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Shape::Primitive { name: n1 }, Shape::Primitive { name: n2 }) => n1 == n2,
            (Shape::Array { element: e1 }, Shape::Array { element: e2 }) => {
                self.same(*e1, other, *e2)
            }
            (
                Shape::Parameterized { name: n1, args: a1, enclosing: e1 },
                Shape::Parameterized { name: n2, args: a2, enclosing: e2 },
            ) => {
                simple_name(n1) == simple_name(n2)
                    && a1.len() == a2.len()
                    && a1
                        .iter()
                        .zip(a2.iter())
                        .all(|(x, y)| self.same(x.ty, other, y.ty))
                    && match (e1, e2) {
                        (Some(e1), Some(e2)) => self.same(*e1, other, *e2),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Shape::WildcardExtends { bound: b1 }, Shape::WildcardExtends { bound: b2 })
            | (Shape::WildcardSuper { bound: b1 }, Shape::WildcardSuper { bound: b2 }) => {
                self.same(*b1, other, *b2)
            }
            (Shape::WildcardUnbound, Shape::WildcardUnbound) => true,
            (
                Shape::Variable { name: n1, .. },
                Shape::Variable { name: n2, .. },
            ) => n1 == n2,
            (Shape::Null, Shape::Null) => true,
            _ => false,
        }
    }

    /// Render a required type for diagnostics: a type variable with no
    /// explicit qualifier shows its declared bound instead (`@NonNull T`).
    pub(crate) fn render_required(&self, id: TypeId) -> String {
        let node = self.node(id);
        if let Shape::Variable { name, bound_qualifier } = &node.shape {
            if !node.qualifier.is_explicit() && bound_qualifier.is_explicit() {
                return format!("{}{}", bound_qualifier.prefix(), name);
            }
        }
        self.render(id)
    }

    /// Render a type with the canonical diagnostic grammar.
    pub(crate) fn render(&self, id: TypeId) -> String {
        let node = self.node(id);
        let prefix = render_prefix(node);
        match &node.shape {
            Shape::Scalar { name, enclosing } => match enclosing {
                Some(enc) => format!("{}.{}{}", self.render(*enc), prefix, simple_name(name)),
                None => format!("{}{}", prefix, simple_name(name)),
            },
            Shape::Primitive { name } => name.clone(),
            Shape::Array { .. } => {
                // Qualifier follows each dimension's bracket, innermost-last.
                let mut dims = Vec::new();
                let mut current = id;
                loop {
                    let node = self.node(current);
                    match &node.shape {
                        Shape::Array { element } => {
                            dims.push(render_prefix(node));
                            current = *element;
                        }
                        _ => break,
                    }
                }
                let mut out = self.render(current);
                for dim in dims {
                    if dim.is_empty() {
                        out.push_str("[]");
                    } else {
                        out.push(' ');
                        out.push_str(dim.trim_end());
                        out.push_str("[]");
                    }
                }
                out
            }
            Shape::Parameterized { name, args, enclosing } => {
                let rendered_args: Vec<String> =
                    args.iter().map(|arg| self.render(arg.ty)).collect();
                let base = format!("{}<{}>", simple_name(name), rendered_args.join(","));
                match enclosing {
                    Some(enc) => format!("{}.{}{}", self.render(*enc), prefix, base),
                    None => format!("{prefix}{base}"),
                }
            }
            Shape::WildcardExtends { bound } => {
                format!("{}? extends {}", prefix, self.render(*bound))
            }
            Shape::WildcardSuper { bound } => {
                format!("{}? super {}", prefix, self.render(*bound))
            }
            Shape::WildcardUnbound => format!("{prefix}?"),
            Shape::Variable { name, .. } => format!("{prefix}{name}"),
            Shape::Capture { kind, bound } => {
                let inner = match (kind, bound) {
                    (Some(BoundKind::Extends), Some(bound)) => {
                        format!("? extends {}", self.render(*bound))
                    }
                    (Some(BoundKind::Super), Some(bound)) => {
                        format!("? super {}", self.render(*bound))
                    }
                    _ => "?".to_string(),
                };
                format!("{prefix}capture#of {inner}")
            }
            Shape::Null => "null".to_string(),
        }
    }
}

fn render_prefix(node: &AnnotatedNode) -> String {
    if node.conflict {
        return "@NonNull @Nullable ".to_string();
    }
    node.qualifier.prefix().to_string()
}

pub(crate) fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Default nullness threaded into builder calls, innermost scope first.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DefaultScope {
    pub(crate) qualifier: Option<NullQualifier>,
}

impl DefaultScope {
    pub(crate) fn none() -> Self {
        Self { qualifier: None }
    }

    /// Resolve the effective default from unit, class, and method scopes;
    /// the innermost specified scope wins.
    pub(crate) fn resolve(
        unit: Option<DefaultNullness>,
        class: Option<DefaultNullness>,
        method: Option<DefaultNullness>,
    ) -> Self {
        let effective = method.or(class).or(unit);
        Self {
            qualifier: effective.map(|default| match default {
                DefaultNullness::NonNull => NullQualifier::NonNull,
                DefaultNullness::Nullable => NullQualifier::Nullable,
            }),
        }
    }
}

/// Builds [`AnnotatedNode`] trees from syntactic type occurrences, resolving
/// annotation aliases, applying scope defaults, and reporting structural
/// annotation problems.
pub(crate) struct AnnotatedTypeBuilder<'a> {
    arena: &'a mut TypeArena,
    config: &'a AnalysisConfig,
    resolver: &'a dyn TypeParamResolver,
    /// In-scope type variables and their declared bound qualifiers.
    type_params: BTreeMap<String, NullQualifier>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> AnnotatedTypeBuilder<'a> {
    pub(crate) fn new(
        arena: &'a mut TypeArena,
        config: &'a AnalysisConfig,
        resolver: &'a dyn TypeParamResolver,
        type_params: BTreeMap<String, NullQualifier>,
    ) -> Self {
        Self {
            arena,
            config,
            resolver,
            type_params,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Build a declared type, grafting declarator-suffix dimension
    /// annotations onto the corresponding array nesting levels.
    pub(crate) fn build_declared(
        &mut self,
        ty: &TypeUse,
        dim_annotations: Option<&[DimUse]>,
        scope: &DefaultScope,
    ) -> TypeId {
        if let Some(dims) = dim_annotations {
            let declared = ty.array_dimensions();
            if dims.len() != declared {
                let span = dims.first().map(|dim| dim.span).unwrap_or(ty.span);
                self.diagnostics
                    .push(diagnostics::malformed_array_annotation(span, declared, dims.len()));
                return self.build_at(ty, scope, &[]);
            }
            return self.build_at(ty, scope, dims);
        }
        self.build_at(ty, scope, &[])
    }

    pub(crate) fn build(&mut self, ty: &TypeUse, scope: &DefaultScope) -> TypeId {
        self.build_at(ty, scope, &[])
    }

    /// `pending_dims[0]` holds extra annotations for the outermost remaining
    /// array dimension.
    fn build_at(&mut self, ty: &TypeUse, scope: &DefaultScope, pending_dims: &[DimUse]) -> TypeId {
        match &ty.shape {
            TypeUseShape::Array { element } => {
                let (own, rest) = match pending_dims.split_first() {
                    Some((own, rest)) => (Some(own), rest),
                    None => (None, pending_dims),
                };
                let mut annotations: Vec<&AnnotationUse> = ty.annotations.iter().collect();
                if let Some(dim) = own {
                    annotations.extend(dim.annotations.iter());
                }
                let (qualifier, origin, conflict) =
                    self.resolve_position(&annotations, ty.span, &DefaultScope::none());
                let element_id = self.build_at(element, scope, rest);
                self.arena.alloc(AnnotatedNode {
                    qualifier,
                    origin,
                    conflict,
                    shape: Shape::Array { element: element_id },
                })
            }
            TypeUseShape::Named { name, args, enclosing, raw } => {
                let annotations: Vec<&AnnotationUse> = ty.annotations.iter().collect();
                let (qualifier, origin, conflict) =
                    self.resolve_position(&annotations, ty.span, scope);
                let enclosing_id =
                    enclosing.as_ref().map(|enc| self.build_at(enc, &DefaultScope::none(), &[]));
                if *raw {
                    let contracts = self.resolver.type_params_of(name);
                    if !contracts.is_empty() {
                        self.diagnostics
                            .push(diagnostics::raw_type_usage(ty.span, simple_name(name)));
                    }
                    // Erasure: argument-level qualifiers are gone entirely.
                    return self.arena.alloc(AnnotatedNode {
                        qualifier,
                        origin,
                        conflict,
                        shape: Shape::Scalar {
                            name: name.clone(),
                            enclosing: enclosing_id,
                        },
                    });
                }
                if args.is_empty() {
                    return self.arena.alloc(AnnotatedNode {
                        qualifier,
                        origin,
                        conflict,
                        shape: Shape::Scalar {
                            name: name.clone(),
                            enclosing: enclosing_id,
                        },
                    });
                }
                let contracts = self.resolver.type_params_of(name);
                let built_args: Vec<TypeArg> = args
                    .iter()
                    .enumerate()
                    .map(|(index, arg)| TypeArg {
                        param: contracts.get(index).cloned(),
                        ty: self.build_at(arg, scope, &[]),
                    })
                    .collect();
                self.arena.alloc(AnnotatedNode {
                    qualifier,
                    origin,
                    conflict,
                    shape: Shape::Parameterized {
                        name: name.clone(),
                        args: built_args,
                        enclosing: enclosing_id,
                    },
                })
            }
            TypeUseShape::Wildcard { bound } => {
                let annotations: Vec<&AnnotationUse> = ty.annotations.iter().collect();
                // Wildcards never inherit scope defaults.
                let (qualifier, origin, conflict) =
                    self.resolve_position(&annotations, ty.span, &DefaultScope::none());
                let shape = match bound {
                    Some(bound) => {
                        let bound_id = self.build_at(&bound.ty, &DefaultScope::none(), &[]);
                        match bound.kind {
                            BoundKind::Extends => Shape::WildcardExtends { bound: bound_id },
                            BoundKind::Super => Shape::WildcardSuper { bound: bound_id },
                        }
                    }
                    None => Shape::WildcardUnbound,
                };
                self.arena.alloc(AnnotatedNode {
                    qualifier,
                    origin,
                    conflict,
                    shape,
                })
            }
            TypeUseShape::Variable { name } => {
                let annotations: Vec<&AnnotationUse> = ty.annotations.iter().collect();
                let (qualifier, origin, conflict) =
                    self.resolve_position(&annotations, ty.span, &DefaultScope::none());
                let bound_qualifier = self
                    .type_params
                    .get(name)
                    .copied()
                    .unwrap_or(NullQualifier::Unspecified);
                self.arena.alloc(AnnotatedNode {
                    qualifier,
                    origin,
                    conflict,
                    shape: Shape::Variable {
                        name: name.clone(),
                        bound_qualifier,
                    },
                })
            }
            TypeUseShape::Primitive { name } => self.arena.alloc(AnnotatedNode {
                // Annotations here are the location validator's concern.
                qualifier: NullQualifier::Unspecified,
                origin: QualifierOrigin::Unspecified,
                conflict: false,
                shape: Shape::Primitive { name: name.clone() },
            }),
        }
    }

    /// Resolve the explicit annotations written at one position plus the
    /// scope default into a single qualifier.
    fn resolve_position(
        &mut self,
        annotations: &[&AnnotationUse],
        span: Span,
        scope: &DefaultScope,
    ) -> (NullQualifier, QualifierOrigin, bool) {
        let mut explicit: Option<NullQualifier> = None;
        let mut conflict = false;
        for annotation in annotations {
            let Some(tag) = self.config.classify(&annotation.name) else {
                continue;
            };
            match explicit {
                None => explicit = Some(tag),
                Some(previous) if previous != tag => {
                    if !conflict {
                        self.diagnostics
                            .push(diagnostics::contradictory_annotation(annotation.span));
                    }
                    conflict = true;
                }
                Some(_) => {}
            }
        }
        if let Some(tag) = explicit {
            if !conflict
                && self.config.report_redundant_annotations
                && scope.qualifier == Some(tag)
            {
                self.diagnostics.push(diagnostics::redundant_annotation(span));
            }
            return (tag, QualifierOrigin::Explicit, conflict);
        }
        match scope.qualifier {
            Some(default) => (
                lattice::combine(NullQualifier::Unspecified, default),
                QualifierOrigin::Default,
                false,
            ),
            None => (NullQualifier::Unspecified, QualifierOrigin::Unspecified, false),
        }
    }
}
