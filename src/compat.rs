use crate::annotated::{Shape, TypeArena, TypeId};
use crate::lattice::NullQualifier;
use crate::substitute::effective_qualifier;

/// Outcome severity of one compatibility check, ordered by badness.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Verdict {
    Ok,
    Unchecked,
    Mismatch,
}

impl Verdict {
    pub(crate) fn max(self, other: Verdict) -> Verdict {
        if self < other { other } else { self }
    }
}

/// Check mode: `Compatible` is plain assignment compatibility; `Exact` is
/// the invariant comparison used below the top level (generic arguments and
/// inner array dimensions).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CheckMode {
    Compatible,
    Exact,
}

/// Result of a structural compatibility check.
#[derive(Clone, Debug)]
pub(crate) struct Compatibility {
    pub(crate) verdict: Verdict,
    /// Substructure pair where the verdict degraded; used to name the
    /// failing dimension or argument instead of the outermost type.
    pub(crate) detail: Option<(TypeId, TypeId)>,
    /// Corresponding instantiated supertype of the provided type, when the
    /// comparison had to go through the hierarchy.
    pub(crate) supertype_hint: Option<TypeId>,
}

impl Compatibility {
    fn ok() -> Self {
        Self {
            verdict: Verdict::Ok,
            detail: None,
            supertype_hint: None,
        }
    }

    fn of(verdict: Verdict, required: TypeId, provided: TypeId) -> Self {
        Self {
            verdict,
            detail: if verdict > Verdict::Ok {
                Some((required, provided))
            } else {
                None
            },
            supertype_hint: None,
        }
    }

    fn merge(self, other: Compatibility) -> Compatibility {
        let verdict = self.verdict.max(other.verdict);
        let detail = if other.verdict >= self.verdict {
            other.detail.or(self.detail)
        } else {
            self.detail.or(other.detail)
        };
        Compatibility {
            verdict,
            detail,
            supertype_hint: self.supertype_hint.or(other.supertype_hint),
        }
    }
}

/// Maps a provided type to its instantiated supertype with the given base
/// name, allocating the result into the arena. Implemented by the analysis
/// context, which owns the class declarations.
pub(crate) trait HierarchyResolver {
    fn corresponding_supertype(
        &self,
        arena: &mut TypeArena,
        provided: TypeId,
        required_name: &str,
    ) -> Option<TypeId>;
}

/// A resolver for contexts with no hierarchy information; supertype
/// correspondence is simply skipped.
pub(crate) struct NoHierarchy;

impl HierarchyResolver for NoHierarchy {
    fn corresponding_supertype(
        &self,
        _arena: &mut TypeArena,
        _provided: TypeId,
        _required_name: &str,
    ) -> Option<TypeId> {
        None
    }
}

/// Core relation: is `provided` compatible with `required` under `mode`?
///
/// The recursion never short-circuits a whole tree on the first finding;
/// sibling substructures are still visited so a single statement can yield
/// several diagnostics (the caller reads `detail` for the worst one).
pub(crate) fn check(
    arena: &mut TypeArena,
    required: TypeId,
    provided: TypeId,
    mode: CheckMode,
    hierarchy: &dyn HierarchyResolver,
) -> Compatibility {
    // The null literal has no structure: only the top-level requirement
    // matters.
    if arena.is_null_type(provided) {
        let required_q = required_qualifier(arena, required, mode);
        if required_q == NullQualifier::NonNull {
            return Compatibility::of(Verdict::Mismatch, required, provided);
        }
        return Compatibility::ok();
    }
    if arena.same(required, arena, provided) {
        return Compatibility::ok();
    }

    let required_node = arena.node(required).clone();
    let provided_node = arena.node(provided).clone();

    match (&required_node.shape, &provided_node.shape) {
        (Shape::Array { element: required_element }, Shape::Array { element: provided_element }) => {
            let top = scalar_check(arena, required, provided, mode);
            let element = check(
                arena,
                *required_element,
                *provided_element,
                CheckMode::Exact,
                hierarchy,
            );
            top.merge(element)
        }
        (Shape::Parameterized { name, args, enclosing }, _) => {
            let mut result = scalar_check(arena, required, provided, mode);
            match &provided_node.shape {
                Shape::Parameterized {
                    name: provided_name,
                    args: provided_args,
                    enclosing: provided_enclosing,
                } => {
                    if crate::annotated::simple_name(name)
                        == crate::annotated::simple_name(provided_name)
                    {
                        for (required_arg, provided_arg) in args.iter().zip(provided_args.iter()) {
                            let arg_result =
                                check_argument(arena, required_arg.ty, provided_arg.ty, hierarchy);
                            result = result.merge(arg_result);
                        }
                        if let (Some(required_enc), Some(provided_enc)) =
                            (enclosing, provided_enclosing)
                        {
                            let enc_result =
                                check(arena, *required_enc, *provided_enc, mode, hierarchy);
                            result = result.merge(enc_result);
                        }
                    } else if let Some(supertype) =
                        hierarchy.corresponding_supertype(arena, provided, name)
                    {
                        let mut through = check(arena, required, supertype, mode, hierarchy);
                        if through.verdict > Verdict::Ok {
                            through.supertype_hint = Some(supertype);
                        }
                        result = result.merge(through);
                    }
                }
                // Raw or erased provided type: argument nullness is unknown.
                Shape::Scalar { .. } => {
                    result = result.merge(Compatibility::of(
                        Verdict::Unchecked,
                        required,
                        provided,
                    ));
                }
                _ => {}
            }
            result
        }
        (Shape::WildcardExtends { bound }, _) => {
            // Covariant site: provided must fit under the bound.
            let provided_view = wildcard_view(arena, provided, WildcardSide::Upper);
            check(arena, *bound, provided_view, CheckMode::Compatible, hierarchy)
        }
        (Shape::WildcardSuper { bound }, _) => {
            // Contravariant site: the bound must be storable into provided.
            let provided_view = wildcard_view(arena, provided, WildcardSide::Lower);
            check(arena, provided_view, *bound, CheckMode::Compatible, hierarchy)
        }
        (Shape::WildcardUnbound, _) => Compatibility::ok(),
        _ => scalar_check(arena, required, provided, mode),
    }
}

/// One invariant generic-argument position.
fn check_argument(
    arena: &mut TypeArena,
    required_arg: TypeId,
    provided_arg: TypeId,
    hierarchy: &dyn HierarchyResolver,
) -> Compatibility {
    let required_shape = arena.node(required_arg).shape.clone();
    match required_shape {
        Shape::WildcardExtends { .. } | Shape::WildcardSuper { .. } | Shape::WildcardUnbound => {
            check(arena, required_arg, provided_arg, CheckMode::Compatible, hierarchy)
        }
        _ => check(arena, required_arg, provided_arg, CheckMode::Exact, hierarchy),
    }
}

enum WildcardSide {
    Upper,
    Lower,
}

/// When the provided side is itself a wildcard or capture, compare through
/// the matching bound.
fn wildcard_view(arena: &TypeArena, provided: TypeId, side: WildcardSide) -> TypeId {
    match &arena.node(provided).shape {
        Shape::WildcardExtends { bound } => match side {
            WildcardSide::Upper => *bound,
            WildcardSide::Lower => provided,
        },
        Shape::WildcardSuper { bound } => match side {
            WildcardSide::Upper => provided,
            WildcardSide::Lower => *bound,
        },
        Shape::Capture { bound: Some(bound), .. } => *bound,
        _ => provided,
    }
}

fn scalar_check(
    arena: &TypeArena,
    required: TypeId,
    provided: TypeId,
    mode: CheckMode,
) -> Compatibility {
    let required_q = required_qualifier(arena, required, mode);
    let provided_q = effective_qualifier(arena, provided);
    let verdict = scalar_verdict(required_q, provided_q, mode);
    Compatibility::of(verdict, required, provided)
}

/// The required side's effective qualifier. A free type variable may be
/// instantiated as `@NonNull`, so in compatible mode an unconstrained
/// variable pessimistically requires non-null.
fn required_qualifier(arena: &TypeArena, required: TypeId, mode: CheckMode) -> NullQualifier {
    let node = arena.node(required);
    if node.qualifier.is_explicit() {
        return node.qualifier;
    }
    match &node.shape {
        Shape::Variable { bound_qualifier, .. } => {
            if bound_qualifier.is_explicit() {
                *bound_qualifier
            } else if mode == CheckMode::Compatible {
                NullQualifier::NonNull
            } else {
                NullQualifier::Unspecified
            }
        }
        Shape::WildcardExtends { bound } | Shape::WildcardSuper { bound } => {
            effective_qualifier(arena, *bound)
        }
        Shape::Capture { bound: Some(bound), .. } => effective_qualifier(arena, *bound),
        _ => NullQualifier::Unspecified,
    }
}

/// Qualifier table for one structural position.
pub(crate) fn scalar_verdict(
    required: NullQualifier,
    provided: NullQualifier,
    mode: CheckMode,
) -> Verdict {
    match mode {
        CheckMode::Compatible => match required {
            NullQualifier::NonNull => match provided {
                NullQualifier::NonNull => Verdict::Ok,
                NullQualifier::Nullable => Verdict::Mismatch,
                NullQualifier::Unspecified => Verdict::Unchecked,
            },
            NullQualifier::Nullable | NullQualifier::Unspecified => Verdict::Ok,
        },
        CheckMode::Exact => {
            if required == provided {
                Verdict::Ok
            } else if required == NullQualifier::Unspecified
                || provided == NullQualifier::Unspecified
            {
                Verdict::Unchecked
            } else {
                Verdict::Mismatch
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotated::testutil::*;
    use crate::annotated::{AnnotatedTypeBuilder, DefaultScope, TypeParamContract};
    use crate::config::AnalysisConfig;
    use crate::ir::TypeUse;
    use std::collections::BTreeMap;

    fn build(arena: &mut TypeArena, ty: &TypeUse) -> TypeId {
        let config = AnalysisConfig::default();
        let resolver = empty_resolver();
        let mut builder = AnnotatedTypeBuilder::new(arena, &config, &resolver, BTreeMap::new());
        let id = builder.build(ty, &DefaultScope::none());
        assert!(builder.take_diagnostics().is_empty(), "unexpected build diagnostics");
        id
    }

    fn check_simple(arena: &mut TypeArena, required: TypeId, provided: TypeId) -> Compatibility {
        check(arena, required, provided, CheckMode::Compatible, &NoHierarchy)
    }

    #[test]
    fn nonnull_provided_never_mismatches_any_scalar_requirement() {
        for required in [
            NullQualifier::NonNull,
            NullQualifier::Nullable,
            NullQualifier::Unspecified,
        ] {
            assert_ne!(
                scalar_verdict(required, NullQualifier::NonNull, CheckMode::Compatible),
                Verdict::Mismatch,
                "required {required:?}"
            );
        }
    }

    #[test]
    fn nullable_into_nonnull_is_always_a_mismatch() {
        assert_eq!(
            scalar_verdict(
                NullQualifier::NonNull,
                NullQualifier::Nullable,
                CheckMode::Compatible
            ),
            Verdict::Mismatch
        );
    }

    #[test]
    fn unspecified_into_nonnull_needs_unchecked_conversion() {
        assert_eq!(
            scalar_verdict(
                NullQualifier::NonNull,
                NullQualifier::Unspecified,
                CheckMode::Compatible
            ),
            Verdict::Unchecked
        );
    }

    #[test]
    fn null_literal_against_nonnull_scalar() {
        let mut arena = TypeArena::new();
        let required = build(&mut arena, &annotated("java.lang.String", &["NonNull"]));
        let provided = arena.null_type();
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Mismatch);
    }

    #[test]
    fn null_literal_against_nullable_scalar_is_fine() {
        let mut arena = TypeArena::new();
        let required = build(&mut arena, &annotated("java.lang.String", &["Nullable"]));
        let provided = arena.null_type();
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Ok);
    }

    #[test]
    fn invariant_argument_qualifiers_must_match_exactly() {
        let mut arena = TypeArena::new();
        let required = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("java.lang.String", &["NonNull"])],
            ),
        );
        let provided = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("java.lang.String", &["Nullable"])],
            ),
        );
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Mismatch);
        // The detail names the failing argument, not the list itself.
        let (required_detail, provided_detail) = result.detail.expect("detail");
        assert_eq!(arena.render(required_detail), "@NonNull String");
        assert_eq!(arena.render(provided_detail), "@Nullable String");

        // Covariance is not permitted either way at invariant positions.
        let result = check_simple(&mut arena, provided, required);
        assert_eq!(result.verdict, Verdict::Mismatch);
    }

    #[test]
    fn unspecified_argument_is_unchecked_not_mismatch() {
        let mut arena = TypeArena::new();
        let required = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("java.lang.String", &["NonNull"])],
            ),
        );
        let provided = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("java.lang.String", &[])],
            ),
        );
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Unchecked);
    }

    #[test]
    fn array_dimensions_are_checked_independently() {
        let mut arena = TypeArena::new();
        // @NonNull String @Nullable[][] — outer dimension nullable, element
        // non-null, middle dimension unspecified.
        let required = build(
            &mut arena,
            &array_of(
                array_of(annotated("java.lang.String", &["NonNull"]), &[]),
                &["Nullable"],
            ),
        );
        let provided_inner_mismatch = build(
            &mut arena,
            &array_of(
                array_of(annotated("java.lang.String", &["Nullable"]), &[]),
                &["Nullable"],
            ),
        );
        let result = check_simple(&mut arena, required, provided_inner_mismatch);
        assert_eq!(result.verdict, Verdict::Mismatch);
        let (required_detail, _) = result.detail.expect("detail");
        assert_eq!(arena.render(required_detail), "@NonNull String");

        // Outer dimension annotation does not leak into the element check.
        let provided_matching = build(
            &mut arena,
            &array_of(
                array_of(annotated("java.lang.String", &["NonNull"]), &[]),
                &["Nullable"],
            ),
        );
        let result = check_simple(&mut arena, required, provided_matching);
        assert_eq!(result.verdict, Verdict::Ok);
    }

    #[test]
    fn array_mismatch_at_outer_dimension_names_the_array() {
        let mut arena = TypeArena::new();
        let required = build(
            &mut arena,
            &array_of(annotated("java.lang.String", &[]), &["NonNull"]),
        );
        let provided = build(
            &mut arena,
            &array_of(annotated("java.lang.String", &[]), &["Nullable"]),
        );
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Mismatch);
        let (required_detail, provided_detail) = result.detail.expect("detail");
        assert_eq!(arena.render(required_detail), "String @NonNull[]");
        assert_eq!(arena.render(provided_detail), "String @Nullable[]");
    }

    #[test]
    fn extends_wildcard_checks_covariantly() {
        let mut arena = TypeArena::new();
        let required = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![wildcard_extends(annotated("X", &["Nullable"]), &[])],
            ),
        );
        let provided_ok = build(
            &mut arena,
            &parameterized("java.util.List", &[], vec![annotated("X", &["NonNull"])]),
        );
        let result = check_simple(&mut arena, required, provided_ok);
        assert_eq!(result.verdict, Verdict::Ok);

        let required_nonnull = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![wildcard_extends(annotated("X", &["NonNull"]), &[])],
            ),
        );
        let provided_nullable = build(
            &mut arena,
            &parameterized("java.util.List", &[], vec![annotated("X", &["Nullable"])]),
        );
        let result = check_simple(&mut arena, required_nonnull, provided_nullable);
        assert_eq!(result.verdict, Verdict::Mismatch);
    }

    #[test]
    fn super_wildcard_checks_contravariantly() {
        let mut arena = TypeArena::new();
        // List<? super @Nullable B> = List<@NonNull A> is a mismatch: the
        // required cell must accept storing a nullable value.
        let required = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![wildcard_super(annotated("B", &["Nullable"]), &[])],
            ),
        );
        let provided = build(
            &mut arena,
            &parameterized("java.util.List", &[], vec![annotated("A", &["NonNull"])]),
        );
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Mismatch);

        // List<? super @NonNull B> = List<@NonNull A> is fine.
        let required_ok = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![wildcard_super(annotated("B", &["NonNull"]), &[])],
            ),
        );
        let result = check_simple(&mut arena, required_ok, provided);
        assert_eq!(result.verdict, Verdict::Ok);
    }

    #[test]
    fn free_type_variable_requires_nonnull_in_compatible_mode() {
        let mut arena = TypeArena::new();
        let config = AnalysisConfig::default();
        let resolver = empty_resolver();
        let mut params = BTreeMap::new();
        params.insert("T".to_string(), NullQualifier::NonNull);
        let mut builder = AnnotatedTypeBuilder::new(&mut arena, &config, &resolver, params);
        let required = builder.build(
            &TypeUse {
                annotations: Vec::new(),
                shape: crate::ir::TypeUseShape::Variable {
                    name: "T".to_string(),
                },
                span: crate::ir::Span::default(),
            },
            &DefaultScope::none(),
        );
        let provided = arena.null_type();
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Mismatch);
    }

    #[test]
    fn supertype_correspondence_reports_through_hint() {
        struct FixedSupertype {
            supertype: std::cell::Cell<Option<TypeId>>,
        }
        impl HierarchyResolver for FixedSupertype {
            fn corresponding_supertype(
                &self,
                _arena: &mut TypeArena,
                _provided: TypeId,
                _required_name: &str,
            ) -> Option<TypeId> {
                self.supertype.get()
            }
        }

        let mut arena = TypeArena::new();
        let required = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("Person", &["NonNull"])],
            ),
        );
        let provided = build(
            &mut arena,
            &parameterized(
                "java.util.ArrayList",
                &[],
                vec![annotated("Person", &["Nullable"])],
            ),
        );
        let supertype = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("Person", &["Nullable"])],
            ),
        );
        let hierarchy = FixedSupertype {
            supertype: std::cell::Cell::new(Some(supertype)),
        };
        let result = check(&mut arena, required, provided, CheckMode::Compatible, &hierarchy);
        assert_eq!(result.verdict, Verdict::Mismatch);
        let hint = result.supertype_hint.expect("supertype hint");
        assert_eq!(arena.render(hint), "List<@Nullable Person>");
    }

    #[test]
    fn raw_provided_type_degrades_to_unchecked() {
        let mut arena = TypeArena::new();
        let required = build(
            &mut arena,
            &parameterized(
                "java.util.List",
                &[],
                vec![annotated("java.lang.String", &["NonNull"])],
            ),
        );
        let provided = arena.scalar("java.util.List", NullQualifier::Unspecified);
        let result = check_simple(&mut arena, required, provided);
        assert_eq!(result.verdict, Verdict::Unchecked);
    }
}
