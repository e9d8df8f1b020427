use serde::{Deserialize, Serialize};

/// Intermediate representation for resolved compilation units.
///
/// The surrounding compiler's parser and resolver produce this model: nominal
/// types are resolved, generic declarations are known, and every syntactic
/// type occurrence arrives as a [`TypeUse`] tree carrying the annotation
/// names written at each structural position. The checker only adds and
/// validates the nullness dimension.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct CompilationUnit {
    pub(crate) path: String,
    #[serde(default)]
    pub(crate) package: Option<String>,
    /// Project- or package-wide default for otherwise-unspecified positions.
    #[serde(default)]
    pub(crate) default_nullness: Option<DefaultNullness>,
    #[serde(default)]
    pub(crate) classes: Vec<ClassDecl>,
}

/// Scope-level default applied to unannotated field/parameter/return types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) enum DefaultNullness {
    NonNull,
    Nullable,
}

/// Line/column span into the original source of a compilation unit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub(crate) struct Span {
    pub(crate) line: u32,
    #[serde(default)]
    pub(crate) start: u32,
    #[serde(default)]
    pub(crate) end: u32,
}

impl Span {
    pub(crate) fn new(line: u32, start: u32, end: u32) -> Self {
        Self { line, start, end }
    }
}

/// A class or interface declaration, already resolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ClassDecl {
    /// Source-qualified name, e.g. `p.Outer.Inner`.
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) is_interface: bool,
    /// Annotations written on the declaration itself (always illegal for
    /// nullness annotations).
    #[serde(default)]
    pub(crate) annotations: Vec<AnnotationUse>,
    #[serde(default)]
    pub(crate) type_params: Vec<TypeParamDecl>,
    #[serde(default)]
    pub(crate) default_nullness: Option<DefaultNullness>,
    #[serde(default)]
    pub(crate) superclass: Option<TypeUse>,
    #[serde(default)]
    pub(crate) interfaces: Vec<TypeUse>,
    #[serde(default)]
    pub(crate) fields: Vec<FieldDecl>,
    #[serde(default)]
    pub(crate) methods: Vec<MethodDecl>,
    #[serde(default)]
    pub(crate) span: Span,
}

impl ClassDecl {
    /// Simple name without enclosing qualification.
    pub(crate) fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// True when this interface declares exactly one abstract method,
    /// making it a functional-interface target for lambdas.
    pub(crate) fn functional_descriptor(&self) -> Option<&MethodDecl> {
        if !self.is_interface {
            return None;
        }
        let mut abstracts = self.methods.iter().filter(|m| m.is_abstract);
        let descriptor = abstracts.next()?;
        if abstracts.next().is_some() {
            return None;
        }
        Some(descriptor)
    }
}

/// A type parameter declaration such as `<@NonNull T extends Bound>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct TypeParamDecl {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) annotations: Vec<AnnotationUse>,
    #[serde(default)]
    pub(crate) bound: Option<TypeUse>,
    #[serde(default)]
    pub(crate) span: Span,
}

/// One annotation reference as written in source, pre-alias-resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct AnnotationUse {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) span: Span,
}

impl AnnotationUse {
    pub(crate) fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            span: Span::default(),
        }
    }
}

/// A syntactic type occurrence: the resolved type shape with the annotation
/// names collected at every structural position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct TypeUse {
    #[serde(default)]
    pub(crate) annotations: Vec<AnnotationUse>,
    pub(crate) shape: TypeUseShape,
    #[serde(default)]
    pub(crate) span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum TypeUseShape {
    /// A class or interface reference, possibly parameterized or nested.
    Named {
        name: String,
        #[serde(default)]
        args: Vec<TypeUse>,
        #[serde(default)]
        enclosing: Option<Box<TypeUse>>,
        /// Raw use of a generic declaration, e.g. `List l`.
        #[serde(default)]
        raw: bool,
    },
    /// One array dimension; nesting encodes multi-dimensional arrays.
    Array { element: Box<TypeUse> },
    Wildcard {
        #[serde(default)]
        bound: Option<WildcardBound>,
    },
    /// A reference to a type variable in scope.
    Variable { name: String },
    /// A primitive type; nullness annotations never apply here.
    Primitive { name: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct WildcardBound {
    pub(crate) kind: BoundKind,
    pub(crate) ty: Box<TypeUse>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) enum BoundKind {
    Extends,
    Super,
}

/// Per-dimension annotations written in declarator-suffix position
/// (`String f @NonNull [] @Nullable []`), outermost dimension first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct DimUse {
    #[serde(default)]
    pub(crate) annotations: Vec<AnnotationUse>,
    #[serde(default)]
    pub(crate) span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct FieldDecl {
    pub(crate) name: String,
    pub(crate) ty: TypeUse,
    /// Present when the declarator carried its own bracket annotations.
    #[serde(default)]
    pub(crate) dim_annotations: Option<Vec<DimUse>>,
    #[serde(default)]
    pub(crate) init: Option<Expr>,
    #[serde(default)]
    pub(crate) span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct MethodDecl {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) is_static: bool,
    #[serde(default)]
    pub(crate) is_abstract: bool,
    #[serde(default)]
    pub(crate) is_constructor: bool,
    #[serde(default)]
    pub(crate) is_varargs: bool,
    #[serde(default)]
    pub(crate) type_params: Vec<TypeParamDecl>,
    #[serde(default)]
    pub(crate) params: Vec<ParamDecl>,
    /// Absent for constructors; absent otherwise means the declaration is
    /// structurally malformed and is skipped as a whole.
    #[serde(default)]
    pub(crate) return_type: Option<TypeUse>,
    #[serde(default)]
    pub(crate) dim_annotations: Option<Vec<DimUse>>,
    /// Annotations on an explicit receiver parameter (`Outer.this`).
    #[serde(default)]
    pub(crate) receiver_annotations: Vec<AnnotationUse>,
    /// Qualifying type written on the receiver parameter, if any.
    #[serde(default)]
    pub(crate) receiver_qualifier: Option<String>,
    #[serde(default)]
    pub(crate) default_nullness: Option<DefaultNullness>,
    #[serde(default)]
    pub(crate) throws: Vec<TypeUse>,
    #[serde(default)]
    pub(crate) body: Vec<Stmt>,
    #[serde(default)]
    pub(crate) span: Span,
}

impl MethodDecl {
    /// Lookup key: overload resolution proper belongs to the resolver, so
    /// name plus arity is enough to identify the chosen declaration.
    pub(crate) fn key(&self) -> String {
        format!("{}/{}", self.name, self.params.len())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ParamDecl {
    pub(crate) name: String,
    pub(crate) ty: TypeUse,
    #[serde(default)]
    pub(crate) dim_annotations: Option<Vec<DimUse>>,
    #[serde(default)]
    pub(crate) span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum Stmt {
    Local {
        name: String,
        ty: TypeUse,
        #[serde(default)]
        dim_annotations: Option<Vec<DimUse>>,
        #[serde(default)]
        init: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    Assign {
        target: Expr,
        value: Expr,
        #[serde(default)]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default)]
        span: Span,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    If {
        cond: Expr,
        #[serde(default)]
        then_body: Vec<Stmt>,
        #[serde(default)]
        else_body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    Assert {
        cond: Expr,
        #[serde(default)]
        span: Span,
    },
    Try {
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        catches: Vec<CatchClause>,
        #[serde(default)]
        span: Span,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct CatchClause {
    pub(crate) ty: TypeUse,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) body: Vec<Stmt>,
    #[serde(default)]
    pub(crate) span: Span,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum Expr {
    /// The `null` literal.
    Null {
        #[serde(default)]
        span: Span,
    },
    /// Any non-null constant (string/number/boolean literal).
    Literal {
        #[serde(default)]
        span: Span,
    },
    /// A simple name: local variable first, then field of the current class.
    Name {
        name: String,
        #[serde(default)]
        span: Span,
    },
    Call {
        #[serde(default)]
        receiver: Option<Box<Expr>>,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
        /// Explicit type arguments written at the call site.
        #[serde(default)]
        type_args: Vec<TypeUse>,
        /// Type arguments the external resolver inferred for this call.
        #[serde(default)]
        inferred_type_args: Vec<TypeUse>,
        #[serde(default)]
        span: Span,
    },
    New {
        class: TypeUse,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    Lambda {
        #[serde(default)]
        params: Vec<LambdaParam>,
        #[serde(default)]
        body: Option<Box<Expr>>,
        #[serde(default)]
        span: Span,
    },
    MethodRef {
        qualifier: TypeUse,
        method: String,
        #[serde(default)]
        span: Span,
    },
    ArrayAccess {
        array: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    Cast {
        ty: TypeUse,
        expr: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeUse,
        #[serde(default)]
        span: Span,
    },
    /// `left == null` / `left != null` style comparison.
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
        #[serde(default)]
        span: Span,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
}

impl Expr {
    pub(crate) fn span(&self) -> Span {
        match self {
            Expr::Null { span }
            | Expr::Literal { span }
            | Expr::Name { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Lambda { span, .. }
            | Expr::MethodRef { span, .. }
            | Expr::ArrayAccess { span, .. }
            | Expr::Cast { span, .. }
            | Expr::InstanceOf { span, .. }
            | Expr::Compare { span, .. } => *span,
        }
    }

    pub(crate) fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Null { .. })
    }
}

impl TypeUse {
    pub(crate) fn named(name: &str) -> Self {
        TypeUse {
            annotations: Vec::new(),
            shape: TypeUseShape::Named {
                name: name.to_string(),
                args: Vec::new(),
                enclosing: None,
                raw: false,
            },
            span: Span::default(),
        }
    }

    /// Number of array dimensions at the top of this occurrence.
    pub(crate) fn array_dimensions(&self) -> usize {
        match &self.shape {
            TypeUseShape::Array { element } => 1 + element.array_dimensions(),
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct LambdaParam {
    pub(crate) name: String,
    /// Explicit parameter type, when the lambda is not implicitly typed.
    #[serde(default)]
    pub(crate) ty: Option<TypeUse>,
    #[serde(default)]
    pub(crate) span: Span,
}
