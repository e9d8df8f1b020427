/// Structural positions a nullness annotation can occupy in source.
///
/// Validation is purely structural: a denied position is illegal regardless
/// of whether the nullness semantics would otherwise be satisfiable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum AnnotationTarget {
    FieldType,
    ParamType,
    ReturnType,
    LocalType,
    TypeArgument,
    ArrayDimension,
    /// Receiver parameter; illegal when the declaration involves an
    /// enclosing-type qualifier.
    Receiver { qualified: bool },
    /// The class/interface declaration itself.
    TypeDeclaration,
    /// Enclosing-type segment of a nested reference; legal only when the
    /// inner type is directly nested in the annotated segment.
    EnclosingQualifier { directly_nested: bool },
    CatchType,
    ThrowsType,
    InstanceOf { parameterized_or_array: bool },
    Cast { parameterized_or_array: bool },
    /// Class name of an unqualified allocation expression.
    AllocationClassName,
    /// Qualifying type of a method or constructor reference.
    MethodRefQualifier,
    PrimitiveType,
    WildcardBound,
    TypeVariableBound,
}

/// Decide whether a nullness annotation is structurally legal at `target`.
pub(crate) fn is_legal(target: AnnotationTarget) -> bool {
    match target {
        AnnotationTarget::FieldType
        | AnnotationTarget::ParamType
        | AnnotationTarget::ReturnType
        | AnnotationTarget::LocalType
        | AnnotationTarget::TypeArgument
        | AnnotationTarget::ArrayDimension
        | AnnotationTarget::WildcardBound
        | AnnotationTarget::TypeVariableBound => true,
        AnnotationTarget::Receiver { qualified } => !qualified,
        AnnotationTarget::EnclosingQualifier { directly_nested } => directly_nested,
        AnnotationTarget::InstanceOf {
            parameterized_or_array,
        }
        | AnnotationTarget::Cast {
            parameterized_or_array,
        } => !parameterized_or_array,
        AnnotationTarget::TypeDeclaration
        | AnnotationTarget::CatchType
        | AnnotationTarget::ThrowsType
        | AnnotationTarget::AllocationClassName
        | AnnotationTarget::MethodRefQualifier
        | AnnotationTarget::PrimitiveType => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_positions_are_legal() {
        assert!(is_legal(AnnotationTarget::FieldType));
        assert!(is_legal(AnnotationTarget::ParamType));
        assert!(is_legal(AnnotationTarget::ReturnType));
        assert!(is_legal(AnnotationTarget::LocalType));
        assert!(is_legal(AnnotationTarget::TypeArgument));
        assert!(is_legal(AnnotationTarget::ArrayDimension));
    }

    #[test]
    fn receiver_legal_only_without_qualifier() {
        assert!(is_legal(AnnotationTarget::Receiver { qualified: false }));
        assert!(!is_legal(AnnotationTarget::Receiver { qualified: true }));
    }

    #[test]
    fn enclosing_qualifier_requires_direct_nesting() {
        assert!(is_legal(AnnotationTarget::EnclosingQualifier {
            directly_nested: true
        }));
        assert!(!is_legal(AnnotationTarget::EnclosingQualifier {
            directly_nested: false
        }));
    }

    #[test]
    fn exception_and_reference_positions_are_denied() {
        assert!(!is_legal(AnnotationTarget::TypeDeclaration));
        assert!(!is_legal(AnnotationTarget::CatchType));
        assert!(!is_legal(AnnotationTarget::ThrowsType));
        assert!(!is_legal(AnnotationTarget::AllocationClassName));
        assert!(!is_legal(AnnotationTarget::MethodRefQualifier));
        assert!(!is_legal(AnnotationTarget::PrimitiveType));
    }

    #[test]
    fn instanceof_and_cast_depend_on_shape() {
        assert!(is_legal(AnnotationTarget::InstanceOf {
            parameterized_or_array: false
        }));
        assert!(!is_legal(AnnotationTarget::InstanceOf {
            parameterized_or_array: true
        }));
        assert!(is_legal(AnnotationTarget::Cast {
            parameterized_or_array: false
        }));
        assert!(!is_legal(AnnotationTarget::Cast {
            parameterized_or_array: true
        }));
    }
}
