use std::collections::BTreeMap;

use crate::annotated::{
    AnnotatedNode, QualifierOrigin, Shape, TypeArena, TypeId, TypeParamContract,
};
use crate::ir::BoundKind;
use crate::lattice::NullQualifier;

/// Mapping from type-variable names to the actual annotated arguments
/// supplied at a call or instantiation site.
#[derive(Clone, Debug, Default)]
pub(crate) struct Substitution {
    map: BTreeMap<String, TypeId>,
}

impl Substitution {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, var: &str, actual: TypeId) {
        self.map.insert(var.to_string(), actual);
    }

    pub(crate) fn of(&self, var: &str) -> Option<TypeId> {
        self.map.get(var).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Substitute type variables in `ty`, merging declaration-site bound
/// qualifiers with use-site qualifiers. A merge of two contradicting
/// explicit qualifiers leaves a conflict marker on the substituted node;
/// callers surface it via [`find_conflict`].
pub(crate) fn substitute(arena: &mut TypeArena, ty: TypeId, subst: &Substitution) -> TypeId {
    if subst.is_empty() {
        return ty;
    }
    let node = arena.node(ty).clone();
    match node.shape {
        Shape::Variable {
            ref name,
            bound_qualifier,
        } => {
            let Some(actual) = subst.of(name) else {
                return ty;
            };
            // Explicit use-site annotation on the occurrence itself wins.
            if node.origin == QualifierOrigin::Explicit {
                return arena.with_qualifier(actual, node.qualifier, QualifierOrigin::Explicit);
            }
            let actual_qualifier = arena.qualifier(actual);
            if bound_qualifier.is_explicit()
                && actual_qualifier.is_explicit()
                && bound_qualifier != actual_qualifier
            {
                return arena.with_conflict(actual);
            }
            if bound_qualifier.is_explicit() && !actual_qualifier.is_explicit() {
                return arena.with_qualifier(actual, bound_qualifier, QualifierOrigin::Default);
            }
            actual
        }
        Shape::Array { element } => {
            let substituted = substitute(arena, element, subst);
            if substituted == element {
                return ty;
            }
            arena.alloc(AnnotatedNode {
                shape: Shape::Array {
                    element: substituted,
                },
                ..node
            })
        }
        Shape::Parameterized {
            ref name,
            ref args,
            enclosing,
        } => {
            let new_args: Vec<_> = args
                .iter()
                .map(|arg| crate::annotated::TypeArg {
                    param: arg.param.clone(),
                    ty: substitute(arena, arg.ty, subst),
                })
                .collect();
            let new_enclosing = enclosing.map(|enc| substitute(arena, enc, subst));
            if new_args.iter().zip(args.iter()).all(|(a, b)| a.ty == b.ty)
                && new_enclosing == enclosing
            {
                return ty;
            }
            arena.alloc(AnnotatedNode {
                shape: Shape::Parameterized {
                    name: name.clone(),
                    args: new_args,
                    enclosing: new_enclosing,
                },
                ..node
            })
        }
        Shape::WildcardExtends { bound } => {
            let substituted = substitute(arena, bound, subst);
            if substituted == bound {
                return ty;
            }
            arena.alloc(AnnotatedNode {
                shape: Shape::WildcardExtends { bound: substituted },
                ..node
            })
        }
        Shape::WildcardSuper { bound } => {
            let substituted = substitute(arena, bound, subst);
            if substituted == bound {
                return ty;
            }
            arena.alloc(AnnotatedNode {
                shape: Shape::WildcardSuper { bound: substituted },
                ..node
            })
        }
        // Captures are never re-substituted; other shapes have no variables
        // at the top level.
        Shape::Capture { .. }
        | Shape::Scalar { .. }
        | Shape::Primitive { .. }
        | Shape::WildcardUnbound
        | Shape::Null => ty,
    }
}

/// Capture wildcard type arguments of `ty` as fresh synthetic types. The
/// capture inherits the wildcard's qualifier, falling back to the bound's.
pub(crate) fn capture_wildcards(arena: &mut TypeArena, ty: TypeId) -> TypeId {
    let node = arena.node(ty).clone();
    let Shape::Parameterized {
        name,
        args,
        enclosing,
    } = node.shape
    else {
        return ty;
    };
    let mut changed = false;
    let new_args: Vec<_> = args
        .into_iter()
        .map(|arg| {
            let arg_node = arena.node(arg.ty).clone();
            let (kind, bound) = match arg_node.shape {
                Shape::WildcardExtends { bound } => (Some(BoundKind::Extends), Some(bound)),
                Shape::WildcardSuper { bound } => (Some(BoundKind::Super), Some(bound)),
                Shape::WildcardUnbound => (None, None),
                _ => return arg,
            };
            changed = true;
            let qualifier = if arg_node.qualifier.is_explicit() {
                arg_node.qualifier
            } else {
                bound.map(|b| arena.qualifier(b)).unwrap_or(NullQualifier::Unspecified)
            };
            let captured = arena.alloc(AnnotatedNode {
                qualifier,
                origin: if qualifier.is_explicit() {
                    QualifierOrigin::Explicit
                } else {
                    QualifierOrigin::Unspecified
                },
                conflict: arg_node.conflict,
                shape: Shape::Capture { kind, bound },
            });
            crate::annotated::TypeArg {
                param: arg.param,
                ty: captured,
            }
        })
        .collect();
    if !changed {
        return ty;
    }
    arena.alloc(AnnotatedNode {
        qualifier: node.qualifier,
        origin: node.origin,
        conflict: node.conflict,
        shape: Shape::Parameterized {
            name,
            args: new_args,
            enclosing,
        },
    })
}

/// Search a substituted type for a position carrying the contradictory dual
/// tag, depth-first, outermost first.
pub(crate) fn find_conflict(arena: &TypeArena, ty: TypeId) -> Option<TypeId> {
    let node = arena.node(ty);
    if node.conflict {
        return Some(ty);
    }
    match &node.shape {
        Shape::Array { element } => find_conflict(arena, *element),
        Shape::Parameterized { args, enclosing, .. } => {
            if let Some(enc) = enclosing {
                if let Some(found) = find_conflict(arena, *enc) {
                    return Some(found);
                }
            }
            args.iter().find_map(|arg| find_conflict(arena, arg.ty))
        }
        Shape::WildcardExtends { bound } | Shape::WildcardSuper { bound } => {
            find_conflict(arena, *bound)
        }
        Shape::Capture { bound, .. } => bound.and_then(|b| find_conflict(arena, b)),
        Shape::Scalar { .. }
        | Shape::Primitive { .. }
        | Shape::Variable { .. }
        | Shape::WildcardUnbound
        | Shape::Null => None,
    }
}

/// Effective qualifier of a position: the explicit one, or the declared
/// bound qualifier for type variables.
pub(crate) fn effective_qualifier(arena: &TypeArena, ty: TypeId) -> NullQualifier {
    let node = arena.node(ty);
    if node.qualifier.is_explicit() {
        return node.qualifier;
    }
    match &node.shape {
        Shape::Variable { bound_qualifier, .. } => *bound_qualifier,
        _ => node.qualifier,
    }
}

/// Outcome of checking one actual type argument against its parameter's
/// declared nullness bound.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BoundCheckOutcome {
    Ok,
    Unchecked,
    Mismatch,
}

/// Check an instantiation-site argument against the type parameter's
/// declared constraint (`<@NonNull T>` style bounds).
pub(crate) fn check_argument_bound(
    arena: &TypeArena,
    param: &TypeParamContract,
    arg: TypeId,
) -> BoundCheckOutcome {
    if !param.qualifier.is_explicit() {
        return BoundCheckOutcome::Ok;
    }
    let provided = effective_qualifier(arena, arg);
    if provided == param.qualifier {
        return BoundCheckOutcome::Ok;
    }
    if !provided.is_explicit() {
        return BoundCheckOutcome::Unchecked;
    }
    BoundCheckOutcome::Mismatch
}

/// Render a method signature for contradiction diagnostics, e.g.
/// `@NonNull @Nullable String m1(@NonNull String)`.
pub(crate) fn render_method_signature(
    arena: &TypeArena,
    name: &str,
    return_type: Option<TypeId>,
    params: &[TypeId],
) -> String {
    let rendered_params: Vec<String> = params.iter().map(|p| arena.render(*p)).collect();
    match return_type {
        Some(ret) => format!(
            "{} {}({})",
            arena.render(ret),
            name,
            rendered_params.join(", ")
        ),
        None => format!("{}({})", name, rendered_params.join(", ")),
    }
}
